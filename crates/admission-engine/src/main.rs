//! policy-admission webhook.
//!
//! - Config: first argument, or `policy-admission.yaml`
//! - Routes: POST /validate, GET /healthz
//! - Plugins stopped and cache sweeper ended on ctrl-c

use tracing_subscriber::{fmt, EnvFilter};

use admission_core::error::{AdmissionError, Result};
use admission_engine::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "policy-admission exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "policy-admission.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.server.listen_addr()?;

    let state = app_state::AppState::new(&cfg)?;
    let sweeper = state.namespace_cache().spawn_sweeper();
    let app = router::build_router(state.clone());

    tracing::info!(%listen, plugins = ?state.dispatcher().plugin_names(), "policy-admission starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| AdmissionError::Internal(format!("failed to bind {listen}: {e}")))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await;

    sweeper.abort();
    state.shutdown().await;

    served.map_err(|e| AdmissionError::Internal(format!("server failed: {e}")))
}
