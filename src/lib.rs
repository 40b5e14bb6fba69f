pub mod auth;
pub mod avatar;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod reset;
pub mod routes;
pub mod state;
pub mod storage;

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::email::MailSender;
use crate::rate_limit::AttemptLimiter;
use crate::state::{AppState, SharedState};
use crate::storage::StorageClient;

pub fn build_app(
    pool: PgPool,
    config: Config,
    storage: Arc<dyn StorageClient>,
    mailer: Option<Arc<dyn MailSender>>,
) -> (Router, SharedState) {
    let cors = cors_layer(&config.client_url);
    let max_upload_size = config.max_upload_size;

    let state: SharedState = Arc::new(AppState {
        pool,
        config,
        storage,
        mailer,
        login_limiter: AttemptLimiter::for_login(),
        reset_limiter: AttemptLimiter::for_reset_requests(),
    });

    let app = Router::new()
        .merge(routes::api_routes(max_upload_size))
        .route("/health", axum::routing::get(health))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

/// The browser client sends the session cookie cross-origin, so only its origin is allowed.
fn cors_layer(client_url: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match HeaderValue::from_str(client_url.trim_end_matches('/')) {
        Ok(origin) => base.allow_origin(origin),
        Err(e) => {
            tracing::warn!("Invalid client URL {client_url}, cross-origin requests disabled: {e}");
            base
        }
    }
}

async fn health() -> &'static str {
    "ok"
}
