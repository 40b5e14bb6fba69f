use std::net::IpAddr;

use axum::http::HeaderValue;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Global half of the per-user reset signing key.
    pub reset_secret: String,
    pub host: IpAddr,
    pub port: u16,
    /// Public URL of this service, used to build the emailed confirmation link.
    pub base_url: String,
    /// URL of the browser client that owns the reset-password page.
    pub client_url: String,
    pub cookie_secure: bool,
    pub session_ttl_hours: i64,
    pub max_upload_size: usize,
    pub log_level: String,
    pub smtp: Option<SmtpConfig>,
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Base URL objects are publicly served from, e.g. a CDN or `https://<bucket>.s3.amazonaws.com`.
    pub public_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let jwt_secret = env_required("JWT_SECRET")?;
        let reset_secret = env_required("RESET_TOKEN_SECRET")?;

        let host: IpAddr = env_or("USERAUTH_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid USERAUTH_HOST: {e}"))?;

        let port: u16 = env_or("USERAUTH_PORT", "8080")
            .parse()
            .map_err(|e| format!("Invalid USERAUTH_PORT: {e}"))?;

        let base_url = redirect_safe_url(
            "USERAUTH_BASE_URL",
            env_or("USERAUTH_BASE_URL", &format!("http://{host}:{port}")),
        )?;
        let client_url = redirect_safe_url(
            "USERAUTH_CLIENT_URL",
            env_or("USERAUTH_CLIENT_URL", "http://localhost:5173"),
        )?;

        let cookie_secure = env_or("USERAUTH_COOKIE_SECURE", "true") != "false";

        let session_ttl_hours: i64 = env_or("USERAUTH_SESSION_TTL_HOURS", "168")
            .parse()
            .map_err(|e| format!("Invalid USERAUTH_SESSION_TTL_HOURS: {e}"))?;

        let max_upload_size: usize = env_or("USERAUTH_MAX_UPLOAD_SIZE", "5242880")
            .parse()
            .map_err(|e| format!("Invalid USERAUTH_MAX_UPLOAD_SIZE: {e}"))?;

        let log_level = env_or("USERAUTH_LOG_LEVEL", "info");

        let smtp = match (
            std::env::var("USERAUTH_SMTP_HOST").ok(),
            std::env::var("USERAUTH_SMTP_PORT").ok(),
            std::env::var("USERAUTH_SMTP_USER").ok(),
            std::env::var("USERAUTH_SMTP_PASS").ok(),
            std::env::var("USERAUTH_SMTP_FROM").ok(),
        ) {
            (Some(host), Some(port), Some(user), Some(pass), Some(from)) => Some(SmtpConfig {
                host,
                port: port
                    .parse()
                    .map_err(|e| format!("Invalid USERAUTH_SMTP_PORT: {e}"))?,
                user,
                pass,
                from,
            }),
            _ => None,
        };

        let s3 = match (
            std::env::var("USERAUTH_S3_BUCKET").ok(),
            std::env::var("USERAUTH_S3_ACCESS_KEY").ok(),
            std::env::var("USERAUTH_S3_SECRET_KEY").ok(),
        ) {
            (Some(bucket), Some(access_key), Some(secret_key)) => {
                let region = env_or("USERAUTH_S3_REGION", "us-east-1");
                let endpoint = std::env::var("USERAUTH_S3_ENDPOINT").ok();
                let public_url = match std::env::var("USERAUTH_S3_PUBLIC_URL") {
                    Ok(url) => url,
                    Err(_) => match &endpoint {
                        Some(ep) => format!("{}/{bucket}", ep.trim_end_matches('/')),
                        None => format!("https://{bucket}.s3.{region}.amazonaws.com"),
                    },
                };
                Some(S3Config {
                    endpoint,
                    bucket,
                    region,
                    access_key,
                    secret_key,
                    public_url,
                })
            }
            _ => None,
        };

        Ok(Config {
            database_url,
            jwt_secret,
            reset_secret,
            host,
            port,
            base_url,
            client_url,
            cookie_secure,
            session_ttl_hours,
            max_upload_size,
            log_level,
            smtp,
            s3,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Both URLs end up in `Location` headers and the CORS origin, so they must be
/// absolute http(s) URLs made of header-safe bytes.
fn redirect_safe_url(key: &str, value: String) -> Result<String, String> {
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(format!("Invalid {key}: expected an http(s) URL, got {value:?}"));
    }
    HeaderValue::from_str(&value).map_err(|e| format!("Invalid {key}: {e}"))?;
    Ok(value)
}
