use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::task::LocalSet;
use tracing::{error, info, warn};

use loiter::client::BridgeConnector;
use loiter::config::{BotConfig, DEFAULT_HOST};
use loiter::logging::init_logging;
use loiter::session::{shutdown_signal, SessionManager};

#[derive(Parser)]
#[command(version = env!("VERSION_STRING"), about, long_about = None)]
pub struct Cli {
    /// Enables debug logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Config file to load (default: ~/.config/loiter/config.toml, if present)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Server host (overrides SERVER_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides SERVER_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bot username (overrides BOT_USERNAME)
    #[arg(short, long)]
    username: Option<String>,

    /// Protocol version to pin, or "auto" (overrides MINECRAFT_VERSION)
    #[arg(long, value_name = "VERSION")]
    game_version: Option<String>,

    /// Client bridge address (overrides BRIDGE_ADDR)
    #[arg(long, value_name = "ADDRESS")]
    bridge: Option<String>,

    /// Also write logs to the data directory
    #[arg(long)]
    log_file: bool,

    /// Print the resolved configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

/// Defaults, then config file, then environment, then CLI flags
fn load_config(cli: &Cli) -> anyhow::Result<BotConfig> {
    let mut config = BotConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    config.apply_env(|key| std::env::var(key).ok());

    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(username) = &cli.username {
        config.identity.username = username.clone();
    }
    if let Some(version) = &cli.game_version {
        config.identity.version = Some(version.clone());
    }
    if let Some(bridge) = &cli.bridge {
        config.bridge.address = bridge.clone();
    }

    config.validate()?;
    Ok(config)
}

fn print_banner(config: &BotConfig) {
    info!("loiter {} starting...", env!("VERSION_STRING"));
    info!("Configuration:");
    info!("  Server: {}", config.server);
    info!("  Username: {}", config.identity.username);
    info!(
        "  Version: {}",
        config.identity.protocol_version().unwrap_or("auto-detect")
    );
    info!("  Movement interval: {}s", config.movement.interval_secs);
    info!(
        "  Chat interval: {}s ({} commands)",
        config.chat.interval_secs,
        config.chat.commands.len()
    );
    info!("  Client bridge: {}", config.bridge.address);

    if config.is_default_host() {
        warn!(
            "Server host is set to {}. Set SERVER_HOST or --host to the actual server address.",
            DEFAULT_HOST
        );
        warn!("  Example: SERVER_HOST=192.168.1.100 loiter");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(cli.debug > 0, cli.log_file) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Uncaught fault: {}", panic_info);
    }));

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.print_config {
        return match config.to_toml() {
            Ok(text) => {
                print!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to render config: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    print_banner(&config);

    let connector = BridgeConnector::new(config.bridge.address.clone());
    let mut session = SessionManager::new(config, connector);

    // A panic inside the session unwinds this task only; dropping the
    // session on the way out stops its timers.
    let local = LocalSet::new();
    let task = local.spawn_local(async move { session.run(shutdown_signal()).await });

    match local.run_until(task).await {
        Ok(Ok(())) => {
            info!("Bot stopped");
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
        Err(e) if e.is_panic() => {
            error!("Session task panicked, exiting");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Session task was cancelled: {}", e);
            ExitCode::FAILURE
        }
    }
}
