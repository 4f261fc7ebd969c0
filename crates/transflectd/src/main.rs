//! transflectd: the transflect file server.
//!
//! # Usage
//!
//! ```text
//! transflectd serve --config transflect.toml --port 3000 --root ./public
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use transflectd::{DaemonConfig, Server};

#[derive(Parser)]
#[command(name = "transflectd", about = "Transflect file server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve a directory over HTTP.
    Serve {
        /// Config file (defaults to ./transflect.toml when present).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on, overriding the config file.
        #[arg(long)]
        port: Option<u16>,

        /// Directory to serve, overriding the config file.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Read size for streamed files, in bytes.
        #[arg(long)]
        chunk_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,transflectd=debug,transflect=debug")
            }),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            root,
            chunk_size,
        } => run_serve(config, port, root, chunk_size).await,
    }
}

async fn run_serve(
    config: Option<PathBuf>,
    port: Option<u16>,
    root: Option<PathBuf>,
    chunk_size: Option<usize>,
) -> anyhow::Result<()> {
    let config = DaemonConfig::load(config.as_deref())
        .context("failed to load configuration")?
        .with_overrides(port, root, chunk_size);

    anyhow::ensure!(
        config.server.root.is_dir(),
        "root {} is not a directory",
        config.server.root.display()
    );
    info!(
        bind = %config.server.bind,
        root = %config.server.root.display(),
        chunk_size = config.server.chunk_size,
        "transflectd starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => {
                error!(error = %err, "failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            }
        }
    });

    Server::new(&config.server).serve(shutdown_rx).await?;

    info!("transflectd stopped");
    Ok(())
}
