use bridge::backend::{AgentZeroClient, Backend};
use bridge::backoff::ReconnectState;
use bridge::config::{LoadedConfig, MissingConfig};
use bridge::continuity::ContinuityStore;
use bridge::dispatch::EventDispatcher;
use bridge::supervisor::{wait_for_shutdown_signal, ConnectionSupervisor};
use bridge::transport::{ChatTransport, MattermostTransport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "agent-bridge")]
#[command(about = "Relay Mattermost messages to an Agent Zero backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the bridge until SIGINT/SIGTERM (default when no subcommand is given).
    Run {
        /// Config file path (default: BRIDGE_CONFIG_PATH or ~/.agent-bridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Load and validate the configuration, print the non-secret settings, and exit.
    Check {
        /// Config file path (default: BRIDGE_CONFIG_PATH or ~/.agent-bridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run { config: None }) {
        Commands::Version => {
            println!("agent-bridge {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Check { config } => {
            if let Err(e) = run_check(config) {
                report_startup_error(&e);
                std::process::exit(1);
            }
        }
        Commands::Run { config } => {
            if let Err(e) = run_bridge(config).await {
                report_startup_error(&e);
                std::process::exit(1);
            }
        }
    }
}

fn report_startup_error(e: &anyhow::Error) {
    eprintln!("ERROR: {:#}", e);
    if e.downcast_ref::<MissingConfig>().is_some() {
        eprintln!();
        eprintln!("Set them via:");
        eprintln!("   1. Environment variables (export VAR=value)");
        eprintln!("   2. A .env file in the working directory");
    }
}

fn init_logging(default_level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn run_check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let LoadedConfig {
        config,
        path,
        from_file,
    } = bridge::config::load_config(config_path)?;
    if from_file {
        println!("config file: {}", path.display());
    } else {
        println!("config file: {} (not found, using defaults)", path.display());
    }
    for line in config.summary() {
        println!("{}", line);
    }
    config.validate()?;
    println!("configuration ok");
    Ok(())
}

async fn run_bridge(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let loaded = bridge::config::load_config(config_path)?;
    let credentials = loaded.config.validate()?;
    init_logging(&loaded.config.log_level);
    log_banner(&loaded);
    let config = loaded.config;

    let transport: Arc<dyn ChatTransport> = Arc::new(MattermostTransport::new(
        &config.mattermost,
        credentials.chat_token,
    ));
    let backend: Arc<dyn Backend> = Arc::new(
        AgentZeroClient::new(&config.backend.url, credentials.api_key)
            .with_timeout(config.backend_timeout()),
    );
    let dispatcher = Arc::new(EventDispatcher::new(
        backend,
        transport.clone(),
        ContinuityStore::new(),
    ));

    let shutdown = CancellationToken::new();
    let supervisor = ConnectionSupervisor::new(
        transport,
        dispatcher,
        ReconnectState::new(config.min_reconnect_delay(), config.max_reconnect_delay()),
        shutdown.clone(),
    )
    .with_grace(config.shutdown_grace());

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown.cancel();
    });

    supervisor.run().await;
    Ok(())
}

fn log_banner(loaded: &LoadedConfig) {
    log::info!("agent-bridge {} starting", env!("CARGO_PKG_VERSION"));
    if loaded.from_file {
        log::info!("config file: {}", loaded.path.display());
    } else {
        log::info!(
            "config file not found, using defaults: {}",
            loaded.path.display()
        );
    }
    for line in loaded.config.summary() {
        log::info!("{}", line);
    }
}
