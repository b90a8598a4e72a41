fn main() {
    if let Err(e) = rxledger_lib::run() {
        eprintln!("rxledger: {e}");
        std::process::exit(1);
    }
}
