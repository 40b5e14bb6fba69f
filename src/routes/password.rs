use axum::extract::{Path, State};
use axum::response::Redirect;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::password;
use crate::db;
use crate::email::send_password_reset;
use crate::error::AppError;
use crate::models::user::normalize_email;
use crate::reset::{token, Carrier, CarrierInput};
use crate::routes::auth::{EmailRequest, MessageResponse};
use crate::state::SharedState;

/// Client page shown when a confirmation link is rejected.
pub const LINK_EXPIRED_PATH: &str = "/link_expired";

#[derive(Deserialize)]
pub struct UpdatePasswordRequest {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    #[serde(rename = "isAuthor")]
    pub carrier: CarrierInput,
    pub password: String,
    #[serde(rename = "confirmPassword", default)]
    pub confirm_password: Option<String>,
}

pub fn confirmation_link(base_url: &str, user_id: Uuid, token: &str) -> String {
    format!(
        "{}/request/authenticate_url/{user_id}/{token}",
        base_url.trim_end_matches('/')
    )
}

pub async fn request_reset(
    State(state): State<SharedState>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = normalize_email(&req.email);
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }

    if let Err(retry_after) = state.reset_limiter.check(&email) {
        return Err(AppError::RateLimited {
            message: "Too many reset requests. Please try again later.".to_string(),
            retry_after,
        });
    }

    let user = db::users::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::NotFound("No account with that email".to_string()))?;

    let reset_token = token::issue(
        &state.config.reset_secret,
        user.id,
        &user.email,
        &user.password_hash,
    )?;
    let link = confirmation_link(&state.config.base_url, user.id, &reset_token);

    match &state.mailer {
        Some(mailer) => {
            send_password_reset(mailer.as_ref(), &user.email, &user.user_name, &link)
                .await
                .map_err(AppError::Transport)?;
            tracing::info!("Password reset link sent to user {}", user.id);
        }
        None => {
            tracing::warn!("System SMTP not configured. Password reset link: {link}");
        }
    }
    // Only delivered links count against the limit.
    state.reset_limiter.record(&email);

    Ok(Json(MessageResponse {
        message: "A password reset link has been sent to your email.".to_string(),
    }))
}

/// Target of the emailed link. Redirects the browser to the client's reset page with the
/// still-valid token in a carrier, or to the expired-link page.
pub async fn authenticate_url(
    State(state): State<SharedState>,
    Path((user_id, reset_token)): Path<(String, String)>,
) -> Redirect {
    let client_url = state.config.client_url.trim_end_matches('/');
    match carrier_redirect(&state, &user_id, &reset_token).await {
        Ok(url) => Redirect::to(&url),
        Err(AppError::InvalidToken) => {
            tracing::info!("Rejected reset link for {user_id}");
            Redirect::to(&format!("{client_url}{LINK_EXPIRED_PATH}"))
        }
        Err(e) => {
            tracing::error!("Could not check reset link for {user_id}: {e}");
            Redirect::to(&format!("{client_url}{LINK_EXPIRED_PATH}"))
        }
    }
}

async fn carrier_redirect(
    state: &SharedState,
    user_id: &str,
    reset_token: &str,
) -> Result<String, AppError> {
    let user_id: Uuid = user_id.parse().map_err(|_| AppError::InvalidToken)?;
    let user = db::users::find_by_id(&state.pool, user_id)
        .await?
        .ok_or(AppError::InvalidToken)?;

    token::verify(
        reset_token,
        &state.config.reset_secret,
        user.id,
        &user.email,
        &user.password_hash,
    )?;

    Ok(Carrier::new(user.id, reset_token).redirect_url(&state.config.client_url, user.id)?)
}

pub async fn update_password(
    State(state): State<SharedState>,
    Json(req): Json<UpdatePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    password::validate_new(&req.password).map_err(AppError::BadRequest)?;
    if req
        .confirm_password
        .as_deref()
        .is_some_and(|confirm| confirm != req.password)
    {
        return Err(AppError::BadRequest("Passwords do not match".to_string()));
    }

    let carrier = req.carrier.into_carrier()?;
    let reset_token = carrier.token_for(req.user_id)?;

    let user = db::users::find_by_id(&state.pool, req.user_id)
        .await?
        .ok_or(AppError::InvalidToken)?;

    // Verified against the pre-update hash; the swap below retires it.
    token::verify(
        reset_token,
        &state.config.reset_secret,
        user.id,
        &user.email,
        &user.password_hash,
    )?;

    let new_hash = password::hash(&req.password).map_err(AppError::Hashing)?;
    let swapped =
        db::users::update_password(&state.pool, user.id, &user.password_hash, &new_hash).await?;
    if !swapped {
        tracing::info!("Concurrent password change for user {}; reset rejected", user.id);
        return Err(AppError::InvalidToken);
    }

    tracing::info!("Password reset completed for user {}", user.id);
    Ok(Json(MessageResponse {
        message: "Password changed successfully".to_string(),
    }))
}
