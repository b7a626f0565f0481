//! wms-daemon entry point.
//!
//! Thin: tracing, config, pool, background tasks, middleware, serve. All
//! route handlers live in `routes.rs`; shared state lives in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};
use wms_config::{FulfillmentConfig, LoadedConfig, UnusedKeyPolicy};
use wms_daemon::{routes, state};

/// Comma-separated list of YAML layers, later files override earlier ones.
const ENV_CONFIG_PATHS: &str = "WMS_CONFIG";
const ENV_DAEMON_ADDR: &str = "WMS_DAEMON_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = match std::env::var(ENV_CONFIG_PATHS) {
        Ok(list) if !list.trim().is_empty() => wms_config::load_from_path_list(&list)
            .with_context(|| format!("load config from {ENV_CONFIG_PATHS}"))?,
        _ => LoadedConfig::empty()?,
    };
    let unused = wms_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for ptr in &unused.unused_leaf_pointers {
        warn!(pointer = %ptr, "config key is not consumed by any reader");
    }
    let config = FulfillmentConfig::from_config_json(&loaded.config_json)?;

    let db_url = wms_config::resolve_database_url(&loaded.config_json)?;
    let pool = wms_db::connect(db_url.expose(), config.max_connections)
        .await
        .with_context(|| format!("connect using {}", db_url.env_var))?;
    wms_db::migrate(&pool).await?;

    let shared = Arc::new(state::AppState::new(pool, config, loaded.config_hash.clone()));
    info!(config_hash = %loaded.config_hash, "configuration loaded");

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_stale_claim_reaper(Arc::clone(&shared));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("wms-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    info!("wms-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var(ENV_DAEMON_ADDR).ok()?.parse().ok()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl_c handler failed; shutting down");
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
