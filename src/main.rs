use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use userauth::config::Config;
use userauth::email::{MailSender, SystemMailer};
use userauth::state::SharedState;
use userauth::storage::{S3Storage, StorageClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.log_level)
        }))
        .init();

    tracing::info!("Starting userauth");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations applied");

    let s3 = config
        .s3
        .as_ref()
        .ok_or("Object storage is not configured (USERAUTH_S3_BUCKET, USERAUTH_S3_ACCESS_KEY, USERAUTH_S3_SECRET_KEY)")?;
    let storage: Arc<dyn StorageClient> = Arc::new(S3Storage::new(s3).await);

    let mailer: Option<Arc<dyn MailSender>> = match config.smtp.as_ref().map(SystemMailer::new) {
        Some(Ok(mailer)) => {
            tracing::info!("System SMTP configured");
            Some(Arc::new(mailer))
        }
        Some(Err(e)) => {
            tracing::warn!("System SMTP not available: {e}");
            None
        }
        None => None,
    };

    let addr = SocketAddr::new(config.host, config.port);
    let (app, state) = userauth::build_app(pool, config, storage, mailer);

    tokio::spawn(sweep_rate_limiters(state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn sweep_rate_limiters(state: SharedState) {
    let mut interval = tokio::time::interval(Duration::from_secs(5 * 60));
    loop {
        interval.tick().await;
        state.login_limiter.cleanup();
        state.reset_limiter.cleanup();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
