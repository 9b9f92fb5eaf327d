//! Podgate - Entry Point
//!
//! A miniature container orchestrator with a built-in HTTP reverse proxy.
//! Launches and supervises a deployment's pods, rolls out upstream releases,
//! and forwards inbound traffic to the healthy instances.

use std::collections::HashMap;
use std::env;

use podgate::app::run::run;
use podgate::config::load_config;
use podgate::logs::{init_logging, LogOptions};
use podgate::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version_info()).unwrap());
        return;
    }

    // Initialize logging
    let mut log_options = LogOptions::default();
    if let Some(level) = cli_args.get("log-level") {
        match level.parse() {
            Ok(level) => log_options.log_level = level,
            Err(e) => println!("Ignoring --log-level: {e}"),
        }
    }
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    // Load the configuration
    let config = match load_config().await {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Starting podgate {}", version_info().version);

    // Run the orchestrator
    let result = run(config, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run podgate: {e}");
        std::process::exit(1);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).unwrap();
        let mut sigint = signal(SignalKind::interrupt()).unwrap();

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
