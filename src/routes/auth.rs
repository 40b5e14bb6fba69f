use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::extractor::{AuthUser, SESSION_COOKIE};
use crate::auth::jwt::{encode_token, SessionClaims};
use crate::auth::password;
use crate::avatar::Avatar;
use crate::config::Config;
use crate::db;
use crate::db::users::NewUser;
use crate::error::AppError;
use crate::models::user::normalize_email;
use crate::models::UserProfile;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct EmailLookupResponse {
    pub exists: bool,
    #[serde(rename = "userName", skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur_hash: Option<String>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Default)]
struct SignupForm {
    user_name: String,
    email: String,
    password: String,
    avatar: Option<Bytes>,
}

fn session_cookie(config: &Config, token: &str) -> CookieJar {
    // The client is served from another origin, so a secure cookie must be SameSite=None.
    let same_site = if config.cookie_secure {
        SameSite::None
    } else {
        SameSite::Lax
    };
    let cookie = Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(same_site)
        .max_age(time::Duration::hours(config.session_ttl_hours))
        .build();
    CookieJar::new().add(cookie)
}

fn clear_session_cookie() -> CookieJar {
    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    CookieJar::new().add(cookie)
}

fn start_session(config: &Config, user_id: Uuid) -> Result<CookieJar, AppError> {
    let claims = SessionClaims::new(user_id, config.session_ttl_hours);
    let token = encode_token(&claims, &config.jwt_secret).map_err(AppError::Internal)?;
    Ok(session_cookie(config, &token))
}

async fn parse_signup_form(headers: &HeaderMap, body: Bytes) -> Result<SignupForm, String> {
    let boundary = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or_else(|| "Expected multipart/form-data".to_string())?;

    let stream = futures_util::stream::once(async move { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut form = SignupForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Multipart error: {e}"))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "avatar" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| format!("Field read error: {e}"))?;
                form.avatar = Some(data);
            }
            "userName" | "email" | "password" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| format!("Field read error: {e}"))?;
                match name.as_str() {
                    "userName" => form.user_name = value.trim().to_string(),
                    "email" => form.email = normalize_email(&value),
                    _ => form.password = value,
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

pub async fn email_verify(
    State(state): State<SharedState>,
    Json(req): Json<EmailRequest>,
) -> Result<Json<EmailLookupResponse>, AppError> {
    let email = normalize_email(&req.email);
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }

    let response = match db::users::find_by_email(&state.pool, &email).await? {
        Some(user) => EmailLookupResponse {
            exists: true,
            user_name: Some(user.user_name),
            avatar: Some(user.avatar_url),
            blur_hash: Some(user.blur_hash),
        },
        None => EmailLookupResponse {
            exists: false,
            user_name: None,
            avatar: None,
            blur_hash: None,
        },
    };
    Ok(Json(response))
}

pub async fn signup(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, CookieJar, Json<UserProfile>), AppError> {
    let form = parse_signup_form(&headers, body)
        .await
        .map_err(AppError::BadRequest)?;

    if form.user_name.is_empty() || form.email.is_empty() || form.password.is_empty() {
        return Err(AppError::BadRequest("All fields are required".to_string()));
    }
    if !form.email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    password::validate_new(&form.password).map_err(AppError::BadRequest)?;
    let upload = form
        .avatar
        .filter(|b| !b.is_empty())
        .ok_or_else(|| AppError::BadRequest("Avatar is required".to_string()))?;

    if db::users::find_by_email(&state.pool, &form.email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let avatar = Avatar::from_upload(upload).map_err(AppError::BadRequest)?;
    let pw_hash = password::hash(&form.password).map_err(AppError::Hashing)?;

    let user_id = Uuid::now_v7();
    let key = avatar.object_key(user_id);
    state
        .storage
        .put_object(&key, avatar.body.clone(), &avatar.content_type)
        .await
        .map_err(AppError::Storage)?;
    let avatar_url = state.storage.public_url(&key);

    let created = db::users::create(
        &state.pool,
        &NewUser {
            id: user_id,
            email: &form.email,
            password_hash: &pw_hash,
            user_name: &form.user_name,
            avatar_url: &avatar_url,
            blur_hash: &avatar.blur_hash,
        },
    )
    .await;

    let user = match created {
        Ok(user) => user,
        Err(err) => {
            if let Err(e) = state.storage.delete_object(&key).await {
                tracing::warn!("Failed to remove orphaned avatar {key}: {e}");
            }
            if db::users::is_unique_violation(&err) {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
            return Err(err.into());
        }
    };

    tracing::info!("User {} signed up", user.id);

    let jar = start_session(&state.config, user.id)?;
    Ok((StatusCode::CREATED, jar, Json(user.into())))
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<UserProfile>), AppError> {
    let email = normalize_email(&req.email);

    if let Err(retry_after) = state.login_limiter.check(&email) {
        return Err(AppError::RateLimited {
            message: "Too many login attempts. Please try again later.".to_string(),
            retry_after,
        });
    }

    let user = db::users::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    let valid = password::verify(&req.password, &user.password_hash).map_err(AppError::Hashing)?;
    if !valid {
        state.login_limiter.record(&email);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }
    state.login_limiter.reset(&email);

    let jar = start_session(&state.config, user.id)?;
    Ok((jar, Json(user.into())))
}

pub async fn logout() -> (CookieJar, Json<MessageResponse>) {
    (
        clear_session_cookie(),
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    )
}

pub async fn current_user(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> Result<Json<UserProfile>, AppError> {
    let user = db::users::find_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;
    Ok(Json(user.into()))
}
