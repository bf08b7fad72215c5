use tracing::{info, warn};

use bot_council::catalog::ModelCatalog;
use bot_council::config::RelayConfig;
use bot_council::routes::{router, RelayState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bot_council=debug,tower_http=debug".into()),
        )
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config = RelayConfig::from_env();
    if config.api_key.is_none() {
        warn!("OPENROUTER_API_KEY is not set; /api/chat will answer 500 until it is");
    }

    let catalog = match ModelCatalog::load(&config.models_file).await {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!("{e}; serving an empty model list");
            ModelCatalog::default()
        }
    };
    info!("{} models available", catalog.len());

    // ── Router ────────────────────────────────────────────────────────────────
    let port = config.port;
    let app = router(RelayState::new(config, catalog));

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Relay listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
