//! Replate report server
//!
//! # Configuration
//!
//! Environment variables:
//! - `REPLATE_PORT`: Port to listen on (default: 8080)
//! - `REPLATE_DATABASE_PATH`: SQLite database path (default: ~/.local/share/replate/replate.db)
//! - `REPLATE_API_KEYS`: Path to API key file (default: ~/.config/replate/keys.yaml)
//!
//! # API Key File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! ```
//!
//! The sharing extension (token issuance and the public rendering route) is
//! only registered when authentication is configured; without API keys the
//! server still runs but exposes no sharing surface.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use replate::auth::ApiKeyStore;
use replate::config::Config;
use replate::db::{init_db, TemplateRepository};
use replate::render::Renderer;
use replate::server::{build_router, AppState};
use replate::sharing::{Capabilities, SharingExtension};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "replate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    let pool = match init_db(config.database_path.clone()).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!("API key file: {}", config.api_keys_path.display());

    let api_keys = Arc::new(ApiKeyStore::load(&config.api_keys_path));

    // Capability check: the sharing extension is composed in only when the
    // host subsystems it needs are present
    let capabilities = Capabilities {
        templates: true,
        authentication: !api_keys.is_empty(),
        authorization: !api_keys.is_empty(),
    };
    let extension = SharingExtension::register(&capabilities);
    if let Some(ext) = &extension {
        for route in ext.public_routes() {
            tracing::info!("Public route: {}", route);
        }
    }

    let state = AppState {
        repo: Arc::new(TemplateRepository::new(pool)),
        renderer: Renderer::new(),
        api_keys,
    };
    let app = build_router(state, extension);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
