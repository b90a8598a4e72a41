use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "RxLedger";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Digits in a one-time code.
pub const OTP_CODE_LENGTH: u32 = 6;

/// One-time code lifetime (5 minutes).
pub const OTP_TTL_SECS: i64 = 300;

/// Environment variable overriding the database location.
pub const DB_PATH_ENV: &str = "RXLEDGER_DB";

/// Get the application data directory
/// ~/RxLedger/ on all platforms, current directory when no home is known
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the ledger database path, honouring `RXLEDGER_DB`
pub fn database_path() -> PathBuf {
    std::env::var_os(DB_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| app_data_dir().join("ledger.db"))
}

/// Log filter used when `RUST_LOG` is unset
pub fn default_log_filter() -> &'static str {
    "rxledger=info,rxledger_lib=info"
}
