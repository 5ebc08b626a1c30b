use contact_relay::{config, handler::AppState, router, service::Relay, smtp::SmtpTransport};
use tracing_subscriber::EnvFilter;

use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Log setup
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load config
    let cfg = config::load_config().unwrap_or_else(|e| {
        tracing::error!("Failed to load configuration: {e}");
        panic!("failed to load configuration: {e}");
    });
    tracing::info!("Successfully loaded contact relay config");

    if cfg.sender.credentials().is_none() {
        tracing::error!("SMTP_USER or SMTP_PASS is missing, contact form will report errors");
    }

    // Transport is built once and shared by every request
    let transport = SmtpTransport::from_config(&cfg).unwrap_or_else(|e| {
        tracing::error!("Failed to configure SMTP transport: {e}");
        panic!("failed to configure SMTP transport: {e}");
    });

    let state = Arc::new(AppState {
        relay: Relay::new(&cfg, Arc::new(transport)),
        mode: cfg.mode,
    });

    let router = router::build_router(state, &cfg);

    // Start server
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", cfg.port))
        .await
        .expect("Failed to bind to address");
    let addr = listener.local_addr().expect("Failed to read bound address");

    tracing::info!("Contact relay starting, listening on {}", addr);
    tracing::info!("Mode: {}", cfg.mode.as_str());

    axum::serve(listener, router)
        .await
        .expect("Failed to start server");
}
