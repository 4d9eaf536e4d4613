//! # collab-cli
//!
//! CLI tool for joining diagram collaboration sessions.
//!
//! ## Commands
//!
//! - `join`: Join a session and drive it from stdin
//! - `share`: Print the join link for a session
//! - `config`: Show the effective client configuration
//!
//! ## Example
//!
//! ```bash
//! # Join a room; type `lock n1`, `cursor 10 20`, `who`, `locks` or `quit`
//! collab-cli join --session room-1 --name "Ada"
//!
//! # Print a link others can open
//! collab-cli share --session room-1
//!
//! # Inspect configuration
//! collab-cli --config ./collab.toml config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use collab_types::{SessionId, UserId};
use commands::{join, share, show_config};

/// CLI tool for joining diagram collaboration sessions.
#[derive(Parser, Debug)]
#[command(name = "collab-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Client configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for storing the local identity
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Use mock transport instead of a real WebSocket (for testing/demo)
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Join a session and drive it from stdin
    Join {
        /// Session to join
        #[arg(long, short)]
        session: String,

        /// User id (defaults to the stored identity)
        #[arg(long)]
        user_id: Option<String>,

        /// Display name (defaults to the stored identity)
        #[arg(long, short)]
        name: Option<String>,

        /// Relay host (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Relay port (overrides the config file)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the join link for a session
    Share {
        /// Session to share
        #[arg(long, short)]
        session: String,

        /// Web app base URL (overrides the config file)
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Show the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut client_config = config::load_client_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Join {
            session,
            user_id,
            name,
            host,
            port,
        } => {
            if let Some(host) = host {
                client_config.server.host = host;
            }
            if let Some(port) = port {
                client_config.server.port = port;
            }

            let data_dir = match cli.data_dir {
                Some(dir) => dir,
                None => default_data_dir()?,
            };
            tokio::fs::create_dir_all(&data_dir)
                .await
                .context("Failed to create data directory")?;

            let mut identity = config::Identity::load_or_create(&data_dir, name.as_deref()).await?;
            if let Some(user_id) = user_id {
                identity.user_id = UserId::from(user_id);
            }

            join::run(client_config, identity, SessionId::from(session), cli.mock).await?;
        }
        Commands::Share { session, base_url } => {
            if let Some(base_url) = base_url {
                client_config.share.base_url = base_url;
            }
            share::run(&client_config, &SessionId::from(session))?;
        }
        Commands::Config => {
            show_config::run(&client_config)?;
        }
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for collab-cli.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "ydun", "collab-cli")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
