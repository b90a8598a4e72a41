pub mod config;
pub mod db;
pub mod demo;
pub mod directory; // Directory collaborator: doctors, patients, pharmacies
pub mod ledger; // Shared handle for concurrent callers
pub mod models;
pub mod otp; // One-time code authenticator
pub mod prescriptions; // Prescription lifecycle

use tracing_subscriber::EnvFilter;

use crate::ledger::LedgerError;

/// Console entry point: set up logging, open the local ledger and run the
/// walkthrough.
pub fn run() -> Result<(), LedgerError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let path = config::database_path();
    let (ledger, directory) = demo::open_local(&path)?;
    let cast = demo::seed_directory(&directory)?;
    demo::run_demo(&ledger, cast)
}
