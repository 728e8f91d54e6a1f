//! s3browser gateway
//!
//! Single-user, password-gated HTTP gateway in front of S3-compatible
//! object stores. Credentials live encrypted in a local vault; every S3
//! operation runs server-side and is exposed as the REST/JSON API the
//! browser UI consumes.

mod auth_middleware;
mod cancel;
mod error;
mod export;
mod handlers;
mod routes;
mod sessions;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use s3browser_common::config::AppConfig;
use s3browser_vault::Vault;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "s3browser-gateway")]
#[command(about = "Password-gated HTTP gateway for S3-compatible stores")]
#[command(version)]
struct Args {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1:3001")]
    bind: String,

    /// Data directory (vault, key and password files)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting s3browser gateway");

    let config = match args.data_dir {
        Some(dir) => AppConfig::new(dir),
        None => AppConfig::from_home().context("cannot locate data directory")?,
    };
    config
        .ensure_data_dir()
        .context("cannot prepare data directory")?;

    // Both secrets must resolve before anything listens; a misconfigured
    // instance exits non-zero instead of serving.
    let master_secret = config
        .load_encryption_key()
        .context("encryption key configuration")?;
    let login_password = config
        .load_login_password()
        .context("login password configuration")?;

    let vault = Vault::open(&config.db_path, &master_secret)
        .context("opening the credential vault")?;
    info!(path = %config.db_path.display(), "vault ready");

    let addr: SocketAddr = args
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {:?}", args.bind))?;

    let state = Arc::new(AppState::new(
        config,
        Arc::new(vault),
        login_password.into_bytes(),
    ));
    let app = routes::router(state);

    info!("Listening on http://{addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    info!("Gateway shut down gracefully");
    Ok(())
}
