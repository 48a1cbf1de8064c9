//! Shared fixtures for the integration tests. Everything runs in-process:
//! the file engine writes into a `tempfile` directory and the sqlite engine
//! uses an in-memory pool, so no external services are needed.

// Not every test binary uses every fixture.
#![allow(dead_code)]
#![allow(unused_macros)]

use std::sync::Arc;

use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

use taskdesk::auth::hash_password;
use taskdesk::models::{User, UserRole};
use taskdesk::store::{Database, FileStore, NewUser, SqliteStore, StorageBackend};
use taskdesk::Config;

pub fn test_config() -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        storage_backend: StorageBackend::File,
        file_db_dir: "unused".to_string(),
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test-access-secret".to_string(),
        jwt_refresh_secret: "test-refresh-secret".to_string(),
        access_token_ttl_secs: 3600,
        refresh_token_ttl_secs: 7 * 24 * 3600,
        frontend_url: "http://localhost:3000".to_string(),
        json_payload_limit: 1024 * 1024,
        rate_limit_window_secs: 60,
        rate_limit_max_requests: 1000,
        production: false,
    }
}

/// File engine backed by a fresh temp directory. The `TempDir` must be kept
/// alive for the duration of the test.
pub async fn file_db() -> (Arc<dyn Database>, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let store = FileStore::open(dir.path())
        .await
        .expect("failed to open file store");
    (Arc::new(store), dir)
}

/// In-memory sqlite engine. A single connection keeps the database alive
/// and visible across queries.
pub async fn sqlite_db() -> Arc<dyn Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory sqlite");
    let store = SqliteStore::from_pool(pool)
        .await
        .expect("failed to initialize sqlite schema");
    Arc::new(store)
}

pub async fn seed_user(
    db: &Arc<dyn Database>,
    name: &str,
    email: &str,
    password: &str,
    role: UserRole,
) -> User {
    db.create_user(NewUser {
        name: name.to_string(),
        email: email.to_string(),
        password: hash_password(password).expect("failed to hash password"),
        role,
    })
    .await
    .expect("failed to seed user")
}

pub fn data(body: &Value) -> &Value {
    assert_eq!(body["success"], Value::Bool(true), "body: {}", body);
    &body["data"]
}

/// Builds an in-process test app wired exactly like the real server, minus
/// CORS and rate limiting. Expands to an awaited `init_service`.
macro_rules! build_app {
    ($db:expr) => {{
        let config = common::test_config();
        let token_service =
            actix_web::web::Data::new(taskdesk::auth::TokenService::from_config(&config));
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::from($db.clone()))
                .app_data(token_service)
                .app_data(actix_web::web::Data::new(config))
                .service(
                    actix_web::web::scope("/api/v1")
                        .wrap(taskdesk::auth::AuthMiddleware)
                        .configure(taskdesk::routes::config),
                ),
        )
        .await
    }};
}

/// Logs `email` in through the HTTP surface and returns the access token.
macro_rules! login {
    ($app:expr, $email:expr, $password:expr) => {{
        let req = actix_web::test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(serde_json::json!({ "email": $email, "password": $password }))
            .to_request();
        let resp = actix_web::test::call_service(&$app, req).await;
        assert_eq!(
            resp.status(),
            actix_web::http::StatusCode::OK,
            "login failed for {}",
            $email
        );
        let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
        body["data"]["accessToken"]
            .as_str()
            .expect("login response missing access token")
            .to_string()
    }};
}
