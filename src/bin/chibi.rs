//! chibi: event-driven automation engine
//!
//! Loads the configuration, connects the configured event stores, registers
//! every subscriber and runs the startup hooks. On SIGINT/SIGTERM it runs the
//! shutdown hooks and closes every connection.
//!
//! ## Configuration
//! - `--config.file` / CHIBI_CONFIG: path to the YAML configuration
//! - `--print.config`: print the resolved configuration to stderr
//! - CHIBI_LOG: tracing filter, overrides `log_level`

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use chibi::action::ActionFactory;
use chibi::config::{Config, LogLevel, CONFIG_ENV_VAR};
use chibi::event_store::EventStoreManager;
use chibi::hook::HookManager;
use chibi::pipeline::PipelineRunner;
use chibi::subscriber::SubscriberManager;
use chibi::utils::bootstrap::{init_tracing, shutdown_signal};
use chibi::vars::Vars;

#[derive(Debug, Parser)]
#[command(name = "chibi", version, about = "Event-driven automation engine")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long = "config.file", env = CONFIG_ENV_VAR)]
    config_file: PathBuf,

    /// Print the resolved configuration to stderr.
    #[arg(long = "print.config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config_file) {
        Ok(config) => {
            init_tracing(config.log_level);
            config
        }
        Err(e) => {
            init_tracing(LogLevel::default());
            error!(path = %cli.config_file.display(), error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    run(cli, config).await.map_err(|e| {
        error!(error = %e, "chibi terminated");
        e
    })
}

async fn run(cli: Cli, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if cli.print_config {
        eprintln!("{}", config.to_yaml()?);
    }

    info!(
        config = %cli.config_file.display(),
        event_stores = config.event_stores.len(),
        subscribers = config.subscribers.len(),
        "Starting chibi"
    );

    let stores = Arc::new(EventStoreManager::from_config(&config.event_stores)?);
    info!(stores = ?stores.names().collect::<Vec<_>>(), "Registered event stores");
    let vars = Arc::new(Vars::global(&config.vars));
    let runner = Arc::new(PipelineRunner::new(ActionFactory::new(stores.clone())));

    let subscribers =
        SubscriberManager::new(config.subscribers, stores.clone(), runner.clone(), vars.clone());
    let hooks = HookManager::new(config.hooks, runner, vars);

    subscribers.init().await?;
    hooks.startup().await?;

    info!("chibi running, press Ctrl+C to exit");
    shutdown_signal().await?;
    info!("Shutting down");

    if let Err(e) = hooks.shutdown().await {
        error!(error = %e, "Shutdown hook failed");
    }
    stores.destroy_all().await;

    Ok(())
}
