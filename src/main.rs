use backseat_server::{ConfigError, ProxyConfig};
use colored::Colorize;
use log::{error, info, warn};
use thiserror::Error;
use tokio::runtime;

mod logging;

#[derive(Debug, Error)]
enum BackseatError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not build the async runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Server stopped: {0}")]
    Server(std::io::Error),
}

impl BackseatError {
    fn hint(&self) -> String {
        match self {
            BackseatError::Config(_) => "Check the BACKSEAT_ and STREAMING_ environment variables, then try again.".to_string(),
            BackseatError::Runtime(_) => "This error is fatal, and should not happen.".to_string(),
            BackseatError::Server(_) => "Make sure the port is free, or pick another with BACKSEAT_SERVER_PORT.".to_string(),
        }
    }
}

fn run() -> Result<(), BackseatError> {
    let config = ProxyConfig::from_env()?;

    if config.streaming.client_id.is_empty() {
        warn!("STREAMING_CLIENT_ID is not set, authorization will be refused");
    }

    info!("Building async runtime...");
    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("backseat-async")
        .build()
        .map_err(BackseatError::Runtime)?;

    runtime
        .block_on(backseat_server::run_server(config))
        .map_err(BackseatError::Server)
}

fn main() {
    let verbose = std::env::var("BACKSEAT_LOG").is_ok_and(|x| x == "debug");

    if let Err(error) = logging::init_logger(verbose) {
        eprintln!("Could not initialize logging: {}", error);
        return;
    }

    if let Err(error) = run() {
        error!(
            "{} Read the error below to troubleshoot the issue.",
            "Backseat failed to start!".bold().red()
        );
        error!("{}", error);
        error!(
            "{}",
            format!("Hint: {}", error.hint()).dimmed().italic()
        );
        std::process::exit(1);
    }
}
