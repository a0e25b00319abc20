use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use backend::{
    auth::{AuthService, GoogleClient, TokenService},
    build_router,
    config::Settings,
    db,
    repository::{InMemoryUserStore, PgUserStore, UserStore},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env().context("Failed to load settings")?;
    tracing::info!("Loaded settings: {:?}", settings);

    let users: Arc<dyn UserStore> = if settings.database_url.starts_with("memory://") {
        tracing::warn!("Using in-memory user store; users are lost on restart");
        Arc::new(InMemoryUserStore::new())
    } else {
        let pool = db::establish_connection_pool(&settings.database_url)?;
        Arc::new(PgUserStore::new(pool))
    };

    let provider = Arc::new(GoogleClient::new(&settings));
    let tokens = TokenService::from_settings(&settings);
    let auth = AuthService::new(provider, users, tokens);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .context("Failed to parse bind address")?;

    let app = build_router(AppState::new(settings, auth));

    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
