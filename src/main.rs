use std::{env, str::FromStr, sync::Arc};

use colored::{Color, Colorize};
use log::{error, info, warn};
use thiserror::Error;
use tokio::{
    runtime::{self, Runtime},
    time,
};
use townbook_collab::{DatabaseError, Library, PgDatabase};
use townbook_core::Config;
use townbook_server::DEFAULT_PORT;

mod logging;

pub struct TownBook {
    library: Arc<Library>,
    port: u16,
    runtime: Runtime,
}

#[derive(Debug, Error)]
enum TownBookError {
    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),

    #[error("{name} is invalid: {reason}")]
    Environment { name: &'static str, reason: String },

    #[error("Server stopped: {0}")]
    Server(#[from] std::io::Error),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl TownBook {
    fn new() -> Result<Self, TownBookError> {
        info!("Building async runtime...");
        let runtime = runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("townbook-async")
            .build()
            .map_err(|e| TownBookError::Fatal(e.to_string()))?;

        let port = env_var("TOWNBOOK_SERVER_PORT")?.unwrap_or(DEFAULT_PORT);
        let config = config_from_env()?;

        let library = match env::var("TOWNBOOK_DATABASE_URL") {
            Ok(url) => {
                info!("Connecting to database...");
                let database = runtime.block_on(PgDatabase::new(&url))?;

                Library::new(config, Arc::new(database))
            }
            Err(_) => {
                warn!("TOWNBOOK_DATABASE_URL is not set, data will be lost when TownBook stops");
                Library::in_memory(config)
            }
        };

        Ok(Self {
            library: Arc::new(library),
            port,
            runtime,
        })
    }

    fn run(&self) -> Result<(), TownBookError> {
        self.runtime.block_on(async move {
            tokio::spawn(reconcile_periodically(self.library.clone()));
            townbook_server::run_server(self.library.clone(), self.port).await
        })?;

        Ok(())
    }
}

impl TownBookError {
    fn hint(&self) -> String {
        match self {
            TownBookError::Database(_) => "This is a database error. Make sure TOWNBOOK_DATABASE_URL points to a running PostgreSQL instance, then try again.".to_string(),
            TownBookError::Environment { name, .. } => format!("Fix or unset {name} and try again."),
            TownBookError::Server(_) => format!("Make sure nothing else is listening on the port, or set TOWNBOOK_SERVER_PORT (default {DEFAULT_PORT})."),
            TownBookError::Fatal(_) => "This error is fatal, and should not happen.".to_string(),
        }
    }
}

/// Repairs inventory drift on the configured interval
async fn reconcile_periodically(library: Arc<Library>) {
    let mut interval = time::interval(library.config().reconcile_interval());

    loop {
        interval.tick().await;

        if let Err(e) = library.reconciler.sweep(None).await {
            error!("Reconciliation failed: {}", e);
        }
    }
}

fn config_from_env() -> Result<Config, TownBookError> {
    let mut config = Config::default();

    if let Some(seconds) = env_var::<u64>("TOWNBOOK_RECONCILE_INTERVAL")? {
        if seconds == 0 {
            return Err(TownBookError::Environment {
                name: "TOWNBOOK_RECONCILE_INTERVAL",
                reason: "must be at least one second".to_string(),
            });
        }

        config.reconcile_interval_in_seconds = seconds;
    }

    if let Some(days) = env_var("TOWNBOOK_LOAN_PERIOD_DAYS")? {
        config.loan_period_in_days = days;
    }

    Ok(config)
}

/// Reads and parses an optional environment variable
fn env_var<T>(name: &'static str) -> Result<Option<T>, TownBookError>
where
    T: FromStr,
    T::Err: ToString,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| TownBookError::Environment {
                name,
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

fn main() {
    if let Err(e) = logging::init_logger() {
        eprintln!("Logging could not be initialized: {e}");
    }

    let result = TownBook::new().and_then(|townbook| {
        info!("Initialized successfully.");
        townbook.run()
    });

    if let Err(error) = result {
        error!("{} Read the error below to troubleshoot the issue.", "TownBook failed to start!".bold().color(Color::Red));
        error!("{}", error);
        error!(
            "{}",
            format!("Hint: {}", error.hint()).bright_black().italic()
        );
    }
}
