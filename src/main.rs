//! Cyclone - A Pinterest-style image pinboard

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cyclone::{
    api::{self, AppState},
    config::Config,
    db,
    services::{mailer_from_config, MailQueue},
    templates::TemplateEngine,
};

/// How often expired sessions are purged
const SESSION_CLEANUP_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cyclone=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Cyclone...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {}", config.database.url);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    tokio::fs::create_dir_all(&config.upload.path).await?;

    // Templates and outbound mail
    let templates = Arc::new(TemplateEngine::new(config.templates.path.as_deref())?);
    let mailer = mailer_from_config(&config.mail)?;
    let (mail_queue, mail_rx) = MailQueue::channel();
    MailQueue::spawn_worker(mail_rx, templates.clone(), mailer);

    let state = AppState::new(pool, &config, templates, mail_queue);

    // Start session cleanup task
    {
        let user_service = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(SESSION_CLEANUP_SECS));
            loop {
                interval.tick().await;
                match user_service.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!("Removed {} expired sessions", removed),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
            }
        });
    }

    // Build router
    let app = api::build_router(state, &config.upload);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
