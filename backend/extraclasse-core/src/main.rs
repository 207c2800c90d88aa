// src/main.rs
use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

mod api;
mod config;
mod export;
mod local_cache;
mod model;
mod remote;
mod report_draft;
mod schedule;
mod seed;
mod serde_lenient;
mod session;
mod state;
mod sync;

#[cfg(test)]
mod remote_tests;
#[cfg(test)]
mod test_support;

use crate::api::{router, AppState};
use crate::config::AppConfig;
use crate::export::HtmlPageRenderer;
use crate::local_cache::LocalStorage;
use crate::remote::{AppsScriptClient, RemoteError, RemoteStore};
use crate::sync::{Connector, Store};

#[derive(Parser, Debug)]
#[command(name = "extraclasse", about = "Extra-duty activity report service")]
struct Cli {
    /// Address to listen on (overrides EXTRACLASSE_BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// Directory for the local fallback cache (overrides EXTRACLASSE_STORAGE_DIR)
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Alternative .env file
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // --- Setup ---
    match &cli.env_file {
        Some(path) => {
            dotenv::from_path(path).with_context(|| format!("Failed to load {:?}", path))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let mut app_config = AppConfig::from_env().context("Failed to read configuration")?;
    if let Some(bind) = cli.bind {
        app_config.bind_addr = bind;
    }
    if let Some(dir) = cli.storage_dir {
        app_config.storage_dir = dir;
    }
    let addr = app_config.socket_addr()?;
    let tls_paths = app_config.tls_paths()?;
    info!("App configuration loaded.");

    // --- State ---
    let storage = LocalStorage::open(&app_config.storage_dir, app_config.default_endpoint()?)
        .context("Failed to open local storage")?;
    let timeout = app_config.remote_timeout();
    let connector: Connector = Arc::new(
        move |url: &Url| -> Result<Arc<dyn RemoteStore>, RemoteError> {
            Ok(Arc::new(AppsScriptClient::new(url.clone(), timeout)?))
        },
    );
    let store = Store::open(storage, connector)
        .await
        .context("Failed to load application data")?;
    info!("Application state initialized from {}.", store.source().await);

    let app = router(AppState {
        store: Arc::new(store),
        renderer: Arc::new(HtmlPageRenderer),
    });

    // --- Run Web Server ---
    match tls_paths {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .with_context(|| {
                    format!("Failed to load TLS cert/key from {:?} and {:?}", cert_path, key_path)
                })?;
            info!("Starting server on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("Starting server on http://{}", addr);
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
