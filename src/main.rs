use clap::Parser;

use llm_gateway::api;
use llm_gateway::settings::Settings;
use llm_gateway::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let settings = Settings::parse();
    let state = AppState::new(settings).expect("Failed to build HTTP client");

    // the download runs detached so startup never blocks on the network;
    // requests only ever observe its progress
    let acquisition = state.acquisition.clone();
    tokio::spawn(async move {
        if let Err(e) = acquisition.acquire().await {
            tracing::error!(error = %e, "model acquisition failed");
        }
    });

    let bind_addr = state.settings.bind_addr.clone();
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind listen address");

    tracing::info!("llm-gateway starting on http://{}", bind_addr);
    tracing::info!("Available endpoints:");
    tracing::info!("  - GET  /health          - Health check");
    tracing::info!("  - GET  /model-info      - Model name and acquisition progress");
    tracing::info!("  - POST /chat-completion - Streaming chat completion");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
