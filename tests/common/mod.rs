use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageBuffer, ImageOutputFormat, Rgba};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use userauth::config::Config;
use userauth::email::MailSender;
use userauth::storage::StorageClient;

pub const CLIENT_URL: &str = "http://client.test";
pub const RESET_SECRET: &str = "test-reset-secret";

/// Object storage kept in memory.
#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<HashMap<String, (Bytes, String)>>,
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), String> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), String> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://cdn.test/{key}")
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Records outgoing mail, or fails every send when `fail` is set.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<SentMail>>,
    pub fail: bool,
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), String> {
        if self.fail {
            return Err("connection refused".to_string());
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html_body.to_string(),
        });
        Ok(())
    }
}

/// A running test server instance with a dedicated test database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub pool: PgPool,
    pub client: Client,
    pub db_name: String,
    pub storage: Arc<MemoryStorage>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Sign up with a generated PNG avatar.
    pub async fn signup(&self, email: &str, password: &str, name: &str) -> (Value, StatusCode, Option<String>) {
        self.signup_with_avatar(email, password, name, Some(png_bytes()))
            .await
    }

    pub async fn signup_with_avatar(
        &self,
        email: &str,
        password: &str,
        name: &str,
        avatar: Option<Vec<u8>>,
    ) -> (Value, StatusCode, Option<String>) {
        let mut form = Form::new()
            .text("userName", name.to_string())
            .text("email", email.to_string())
            .text("password", password.to_string());
        if let Some(bytes) = avatar {
            form = form.part(
                "avatar",
                Part::bytes(bytes)
                    .file_name("avatar.png")
                    .mime_str("image/png")
                    .unwrap(),
            );
        }

        let resp = self
            .client
            .post(self.url("/user/signup"))
            .multipart(form)
            .send()
            .await
            .expect("signup request failed");
        let status = resp.status();
        let cookie = session_cookie(&resp);
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status, cookie)
    }

    /// Sign up the default user and return their id.
    pub async fn bootstrap(&self) -> Uuid {
        let (body, status, _) = self.signup("ann@test.com", "password123", "Ann").await;
        assert_eq!(status, StatusCode::CREATED, "bootstrap signup failed: {body}");
        body["id"].as_str().unwrap().parse().unwrap()
    }

    pub async fn login(&self, email: &str, password: &str) -> (Value, StatusCode, Option<String>) {
        let resp = self
            .client
            .post(self.url("/user/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login request failed");
        let status = resp.status();
        let cookie = session_cookie(&resp);
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status, cookie)
    }

    pub async fn current_user(&self, cookie: Option<&str>) -> (Value, StatusCode) {
        let mut req = self.client.get(self.url("/current_loggedInUser"));
        if let Some(c) = cookie {
            req = req.header("cookie", c);
        }
        let resp = req.send().await.expect("current user request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn request_reset(&self, email: &str) -> (Value, StatusCode) {
        self.post_json("/user/request/reset_password", &json!({ "email": email }))
            .await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn update_password(&self, user_id: Uuid, carrier: &str, password: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .put(self.url("/user/update_password"))
            .json(&json!({
                "userId": user_id,
                "isAuthor": carrier,
                "password": password,
                "confirmPassword": password,
            }))
            .send()
            .await
            .expect("update password request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Follow a confirmation link without following the redirect; returns the Location.
    pub async fn open_link(&self, link: &str) -> (StatusCode, String) {
        let resp = self
            .client
            .get(link)
            .send()
            .await
            .expect("authenticate request failed");
        let status = resp.status();
        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        (status, location)
    }

    /// Link from the most recent reset email.
    pub fn last_reset_link(&self) -> String {
        let sent = self.mailer.sent.lock().unwrap();
        let mail = sent.last().expect("no mail was sent");
        extract_href(&mail.html).expect("no link in reset mail")
    }

    pub async fn password_hash(&self, email: &str) -> String {
        userauth::db::users::find_by_email(&self.pool, email)
            .await
            .unwrap()
            .expect("user not found")
            .password_hash
    }
}

/// `access_token=...` pair from the response's Set-Cookie headers.
pub fn session_cookie(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("access_token="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub fn extract_href(html: &str) -> Option<String> {
    let start = html.find("href=\"")? + "href=\"".len();
    let end = html[start..].find('"')? + start;
    Some(html[start..end].to_string())
}

/// Value of the `headers` query parameter in a client redirect.
pub fn carrier_from_location(location: &str) -> Option<String> {
    let query = location.split_once('?')?.1;
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "headers")
        .map(|(_, v)| v.into_owned())
}

pub fn png_bytes() -> Vec<u8> {
    let img = ImageBuffer::from_fn(48, 48, |x, y| {
        Rgba([(x * 5) as u8, (y * 5) as u8, 200, 255])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_mailer(RecordingMailer::default()).await
}

/// Spawn a test app with a fresh temporary database.
pub async fn spawn_app_with_mailer(mailer: RecordingMailer) -> TestApp {
    let _ = dotenvy::dotenv();

    let base_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let db_name = format!("userauth_test_{}", Uuid::now_v7().to_string().replace('-', ""));

    let admin_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.clone());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url)
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let test_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    // Bind first so the emailed links can point at the real address.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    let config = Config {
        database_url: test_url,
        jwt_secret: "test-jwt-secret-that-is-long-enough".to_string(),
        reset_secret: RESET_SECRET.to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: addr.port(),
        base_url: format!("http://{addr}"),
        client_url: CLIENT_URL.to_string(),
        cookie_secure: false,
        session_ttl_hours: 1,
        max_upload_size: 1_048_576,
        log_level: "warn".to_string(),
        smtp: None,
        s3: None,
    };

    let storage = Arc::new(MemoryStorage::default());
    let mailer = Arc::new(mailer);

    let sender: Arc<dyn MailSender> = mailer.clone();
    let (app, _state) = userauth::build_app(pool.clone(), config, storage.clone(), Some(sender));

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        addr,
        pool,
        client,
        db_name,
        storage,
        mailer,
    }
}

/// Drop the test database after tests complete.
pub async fn cleanup(app: TestApp) {
    let db_name = app.db_name.clone();
    app.pool.close().await;

    let base_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");
    let admin_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.clone());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url)
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;
}
