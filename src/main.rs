//! visa-server binary

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use visa_server::api::{create_offline_router, create_router, AppState};
use visa_server::config::{AppConfig, LogFormat};
use visa_server::service::VisaService;
use visa_server::storage::{create_store, DocumentStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config)?;

    let router = build_router(&config).await;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!(%addr, "Visa server is running");

    axum::serve(listener, router).await?;

    Ok(())
}

/// Connect the store and mount the resource routes. A store that cannot be
/// configured or reached is logged and only the banner routes are served.
async fn build_router(config: &AppConfig) -> Router {
    let store_config = match config.storage_runtime() {
        Ok(store_config) => store_config,
        Err(err) => {
            tracing::error!(error = %format!("{:#}", err), "Invalid storage configuration");
            return create_offline_router();
        }
    };

    let backend = store_config.backend();
    tracing::info!(backend, "Connecting to document store");

    match create_store(store_config).await {
        Ok(store) => {
            let store: Arc<dyn DocumentStore> = Arc::from(store);
            let service =
                VisaService::new(store).with_join_concurrency(config.api.join_concurrency);
            create_router(AppState::new(service))
        }
        Err(err) => {
            tracing::error!(error = %err, backend, "Failed to connect to document store");
            create_offline_router()
        }
    }
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.level.clone()))
        .unwrap_or_else(|_| EnvFilter::new("visa_server=info,tower_http=info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format {
        LogFormat::Json => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Text => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
