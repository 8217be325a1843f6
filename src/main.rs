use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use voice_studio_backend::config::AppConfig;
use voice_studio_backend::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("voice_studio_backend=debug,tower_http=debug")),
        )
        .init();

    let env_file = std::env::var("STUDIO_ENV_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".env"));
    let config = AppConfig::load(&env_file)
        .with_context(|| format!("Could not load configuration from {}", env_file.display()))?;
    info!("Loaded configuration (env file: {})", env_file.display());

    let host = config.host.clone();
    let port = config.port;
    let sweep_every = (config.session_idle_timeout() / 4).max(Duration::from_secs(1));
    let app_state = AppState::new(config)?;
    let sweeper = app_state.sessions.spawn_sweeper(sweep_every);
    let app = voice_studio_backend::app(app_state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Could not bind {}:{}", host, port))?;
    info!("Starting server on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    sweeper.abort();

    Ok(())
}
