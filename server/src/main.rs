mod app;
mod config;
mod descriptor;
mod routes;
mod state;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::state::{AppState, DescriptorPayload};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let asset_dir = config::asset_dir();
    let dist_dir = config::client_dist_dir();
    tracing::info!(asset_dir = %asset_dir.display(), "Building map descriptor...");
    let descriptor = match descriptor::build_descriptor(&asset_dir) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            tracing::error!(error = %e, "failed to build map descriptor");
            return;
        }
    };
    let payload = match DescriptorPayload::new(&descriptor) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize map descriptor");
            return;
        }
    };

    if let Some(out) = config::descriptor_out() {
        match descriptor::write_descriptor(&payload.json, &out) {
            Ok(()) => tracing::info!(path = %out.display(), "Wrote map descriptor"),
            Err(e) => tracing::warn!(error = %e, "failed to write map descriptor"),
        }
    }

    let app = app::build_app(AppState::new(payload), &asset_dir, &dist_dir);

    let addr = format!("0.0.0.0:{}", config::server_port());
    tracing::info!("Group map server listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind TCP listener");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server failed");
    }

    tracing::info!("Server shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
