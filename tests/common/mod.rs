use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, Response, StatusCode};
use serde_json::{Value, json};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use storefront::config::{Config, TokenSecrets};
use storefront::db::{MemoryStore, UserStore};
use storefront::email::Mailer;
use storefront::models::{Role, User};
use storefront::state::SharedState;

pub const ADMIN_PANEL_URL: &str = "http://admin.test";
pub const CLIENT_URL: &str = "http://shop.test";

/// Captures outbound mail instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    pub codes: Mutex<Vec<(String, String)>>,
    pub resets: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_verification_code(&self, to_email: &str, code: &str) -> Result<(), String> {
        self.codes
            .lock()
            .unwrap()
            .push((to_email.to_string(), code.to_string()));
        Ok(())
    }

    async fn send_password_reset(&self, to_email: &str, reset_url: &str) -> Result<(), String> {
        self.resets
            .lock()
            .unwrap()
            .push((to_email.to_string(), reset_url.to_string()));
        Ok(())
    }
}

/// A running test server backed by the in-memory store.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub state: SharedState,
}

/// Tokens returned by a sign-up or sign-in.
pub struct Session {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/sign-up"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("sign-up request failed");
        body_and_status(resp).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Response {
        self.client
            .post(self.url("/api/v1/auth/sign-in"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("sign-in request failed")
    }

    /// Sign up and return the new session.
    pub async fn customer(&self, email: &str) -> Session {
        let (body, status) = self.sign_up(email, "password123").await;
        assert_eq!(status, StatusCode::CREATED, "sign-up failed: {body}");
        session(&body)
    }

    /// Sign up, set the role, then sign in again so the tokens carry it.
    pub async fn with_role(&self, email: &str, role: Role) -> Session {
        let created = self.customer(email).await;
        self.store
            .set_role(created.user_id.parse().unwrap(), role)
            .await
            .unwrap();
        let resp = self.sign_in(email, "password123").await;
        assert_eq!(resp.status(), StatusCode::OK);
        session(&resp.json().await.unwrap())
    }

    /// Admin-panel sign-in; returns the admin token.
    pub async fn admin_sign_in(&self, email: &str) -> (Option<String>, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/admin/auth/sign-in"))
            .json(&json!({ "email": email, "password": "password123" }))
            .send()
            .await
            .expect("admin sign-in request failed");
        let status = resp.status();
        let token = set_cookie(&resp, "adminToken");
        (token, status)
    }

    pub async fn user(&self, email: &str) -> User {
        self.store
            .find_user_by_email(email)
            .await
            .unwrap()
            .expect("user exists")
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request failed");
        body_and_status(resp).await
    }

    pub async fn patch_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .patch(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("patch request failed");
        body_and_status(resp).await
    }

    pub async fn post_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("post request failed");
        body_and_status(resp).await
    }

    /// Request carrying the admin token plus the admin panel origin.
    pub async fn admin_request(
        &self,
        method: reqwest::Method,
        path: &str,
        token: &str,
        body: Option<&Value>,
    ) -> (Value, StatusCode) {
        let mut req = self
            .client
            .request(method, self.url(path))
            .header(COOKIE, format!("adminToken={token}"))
            .header("origin", ADMIN_PANEL_URL);
        if let Some(body) = body {
            req = req.json(body);
        }
        body_and_status(req.send().await.expect("admin request failed")).await
    }
}

pub fn session(body: &Value) -> Session {
    Session {
        user_id: body["user"]["id"].as_str().unwrap().to_string(),
        access_token: body["access_token"].as_str().unwrap().to_string(),
        refresh_token: body["refresh_token"].as_str().unwrap().to_string(),
    }
}

pub async fn body_and_status(resp: Response) -> (Value, StatusCode) {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(json!(null));
    (body, status)
}

/// Every `Set-Cookie` header on the response.
pub fn set_cookies(resp: &Response) -> Vec<String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect()
}

/// Value of the named cookie set by the response.
pub fn set_cookie(resp: &Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    set_cookies(resp).into_iter().find_map(|c| {
        c.split(';')
            .next()
            .and_then(|pair| pair.strip_prefix(&prefix))
            .map(str::to_string)
    })
}

pub fn test_config() -> Config {
    Config {
        database_url: None,
        secrets: TokenSecrets {
            access: "test-access-secret".to_string(),
            refresh: "test-refresh-secret".to_string(),
            admin: "test-admin-secret".to_string(),
        },
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        base_url: "http://localhost:0".to_string(),
        client_url: CLIENT_URL.to_string(),
        admin_panel_url: Some(ADMIN_PANEL_URL.to_string()),
        max_body_size: 1_048_576,
        secure_cookies: false,
        sweep_interval: Duration::from_secs(60),
        log_level: "warn".to_string(),
        smtp: None,
        google: None,
        twitter: None,
    }
}

pub async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());

    let (app, state) = storefront::build_app(store.clone(), Some(mailer.clone()), test_config());

    // Bind to random port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Server failed");
    });

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        addr,
        client,
        store,
        mailer,
        state,
    }
}

/// A migrated throwaway Postgres database.
#[allow(dead_code)]
pub struct TestDb {
    pub pool: PgPool,
    pub db_name: String,
}

fn database_url_for(base_url: &str, db_name: &str) -> String {
    base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.to_string())
}

/// Create a fresh database next to `DATABASE_URL`. `None` when it is unset,
/// so the Postgres tests are skipped on machines without one.
#[allow(dead_code)]
pub async fn test_db() -> Option<TestDb> {
    let _ = dotenvy::dotenv();
    let Ok(base_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres store test");
        return None;
    };

    let db_name = format!("storefront_test_{}", Uuid::now_v7().simple());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url_for(&base_url, "postgres"))
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url_for(&base_url, &db_name))
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    Some(TestDb { pool, db_name })
}

/// Drop the test database.
#[allow(dead_code)]
pub async fn drop_test_db(db: TestDb) {
    db.pool.close().await;

    let base_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url_for(&base_url, "postgres"))
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!(
        "DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)",
        db.db_name
    ))
    .execute(&admin_pool)
    .await;

    admin_pool.close().await;
}
