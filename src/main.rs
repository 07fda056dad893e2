//! ONLYTECH Leaf Scan Server
//!
//! Serves `GET /`, `GET /health` and `POST /scan`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use onlytech_scan::{config::Config, create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "onlytech_scan=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    tracing::info!("{} Scan Server starting...", config.service_name);
    tracing::info!("Model: {}", config.model_path.display());
    match &config.labels_path {
        Some(path) => tracing::info!("Labels: {}", path.display()),
        None => tracing::info!("Labels: model metadata"),
    }
    tracing::info!("CORS origins: {}", config.allowed_origins.join(", "));

    let addr = config.bind_addr();
    let state = AppState::from_config(config)?;

    let app = create_router(state);

    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
