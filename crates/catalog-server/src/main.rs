//! Binary entrypoint for the catalog server.
use anyhow::Context;
use axum::http::HeaderValue;
use catalog_server::{auth::TokenRegistry, build_router, config::ServerConfig, packages::PackageStore, store, telemetry, AppState};
use std::{sync::Arc, time::Duration};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() { return CorsLayer::permissive(); }
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| match HeaderValue::from_str(o) {
        Ok(v) => Some(v),
        Err(_) => { warn!(origin=%o, "cors_origin_invalid"); None }
    }).collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(allowed)).allow_methods(Any).allow_headers(Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await { warn!(error=%e, "ctrl_c_handler_failed"); }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => { s.recv().await; }
            Err(e) => { warn!(error=%e, "sigterm_handler_failed"); std::future::pending::<()>().await; }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = terminate => {} }
    info!(target: "shutdown.signal", "shutdown requested");
    tokio::time::sleep(Duration::from_millis(200)).await; // drain window
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = ServerConfig::load().context("loading configuration")?;
    telemetry::init_tracing(&cfg.log_level, cfg.log_format);
    telemetry::init_metrics();
    if cfg.api_tokens.is_empty() { warn!("no API tokens configured; only public endpoints are usable"); }

    let store = store::from_config(&cfg).await.context("initializing store")?;
    let packages = PackageStore::from_config(&cfg);
    packages.init().await.with_context(|| format!("creating package directory {:?}", packages.dir()))?;
    let state = AppState {
        store,
        packages: Arc::new(packages),
        tokens: Arc::new(TokenRegistry::new(&cfg.api_tokens)),
        download_requires_auth: cfg.download_requires_auth,
    };
    info!(tokens = state.tokens.len(), download_requires_auth = cfg.download_requires_auth, max_upload_bytes = cfg.max_upload_bytes, "state.ready");

    let app = build_router(state).layer(cors_layer(&cfg.cors_origins));
    let listener = tokio::net::TcpListener::bind(cfg.bind).await.with_context(|| format!("binding {}", cfg.bind))?;
    info!(addr=%cfg.bind, "catalog-server listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}
