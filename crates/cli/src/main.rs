use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "botrelay")]
#[command(about = "Chat webhook relay to a hosted inference endpoint", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a default configuration file if none exists.
    Init {
        /// Config file path (default: BOTRELAY_CONFIG_PATH or ~/.botrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Load config and fetch secrets without serving; exits non-zero on failure.
    Check {
        /// Config file path (default: BOTRELAY_CONFIG_PATH or ~/.botrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Serve POST /api/messages until SIGINT or SIGTERM.
    Serve {
        /// Config file path (default: BOTRELAY_CONFIG_PATH or ~/.botrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Bind address (default from HOST, config, or localhost)
        #[arg(long)]
        host: Option<String>,

        /// HTTP port (default from PORT, config, or 3978)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("botrelay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Check { config }) => {
            if let Err(e) = run_check(config).await {
                log::error!("check failed: {:#}", e);
                std::process::exit(1);
            }
            println!("configuration and secrets ok");
        }
        Some(Commands::Serve { config, host, port }) => {
            if let Err(e) = run_serve(config, host, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    if relay::config::write_default_config(&path)? {
        println!("wrote default configuration to {}", path.display());
    } else {
        println!("configuration already exists at {}", path.display());
    }
    Ok(())
}

async fn load(
    config_path: Option<PathBuf>,
) -> anyhow::Result<(relay::config::Config, relay::secrets::RelaySecrets)> {
    let (mut config, path) = relay::config::load_config(config_path)?;
    relay::config::apply_env_overrides(&mut config)?;
    relay::config::validate(&config)?;
    let secrets = relay::secrets::load_relay_secrets(&config, &path).await?;
    Ok((config, secrets))
}

async fn run_check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _secrets) = load(config_path).await?;
    log::info!(
        "config ok: {}:{} -> {}",
        config.gateway.bind,
        config.gateway.port,
        config.responder.endpoint_url.as_deref().unwrap_or("")
    );
    Ok(())
}

async fn run_serve(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, secrets) = load(config_path).await?;
    relay::config::apply_cli_overrides(&mut config, host, port);
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    relay::gateway::run_gateway(config, secrets).await
}
