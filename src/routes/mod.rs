pub mod auth;
pub mod password;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;

use crate::state::SharedState;

pub fn api_routes(max_upload_size: usize) -> Router<SharedState> {
    Router::new()
        // Account
        .route("/user/email_verify", post(auth::email_verify))
        .route(
            "/user/signup",
            post(auth::signup).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/user/login", post(auth::login))
        .route("/user/logout", get(auth::logout))
        .route("/current_loggedInUser", get(auth::current_user))
        // Password reset
        .route(
            "/user/request/reset_password",
            post(password::request_reset),
        )
        .route(
            "/request/authenticate_url/{user_id}/{token}",
            get(password::authenticate_url),
        )
        .route("/user/update_password", put(password::update_password))
}
