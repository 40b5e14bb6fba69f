use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::email::MailSender;
use crate::rate_limit::AttemptLimiter;
use crate::storage::StorageClient;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub storage: Arc<dyn StorageClient>,
    /// None when SMTP is not configured; reset links are then only logged.
    pub mailer: Option<Arc<dyn MailSender>>,
    pub login_limiter: AttemptLimiter,
    pub reset_limiter: AttemptLimiter,
}
