//! Application configuration, assembled once at startup from the
//! environment. Signing secrets are mandatory; a missing secret is a fatal
//! `AppError::Configuration` rather than a late runtime surprise.

use std::env;

use crate::error::AppError;
use crate::store::StorageBackend;

/// Process-wide configuration. Constructed in `main` and passed explicitly
/// into the pieces that need it (token service, store, server wiring) —
/// nothing below this layer reads the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    /// Which persistence engine backs the `Database` trait.
    pub storage_backend: StorageBackend,
    /// Directory holding `users.json`/`tasks.json` for the file engine.
    pub file_db_dir: String,
    /// SQLite connection URL for the document engine.
    pub database_url: String,
    /// Secret signing access tokens. Distinct from the refresh secret so a
    /// leaked access token cannot be replayed as a refresh token.
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    /// Access token lifetime in seconds (default one hour).
    pub access_token_ttl_secs: i64,
    /// Refresh token lifetime in seconds (default seven days).
    pub refresh_token_ttl_secs: i64,
    /// Allowed CORS origin for the browser frontend.
    pub frontend_url: String,
    /// Maximum accepted JSON payload size in bytes.
    pub json_payload_limit: usize,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u32,
    /// Controls the `Secure` flag on the refresh cookie.
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Configuration("JWT_SECRET must be set".into()))?;
        let jwt_refresh_secret = env::var("JWT_REFRESH_SECRET")
            .map_err(|_| AppError::Configuration("JWT_REFRESH_SECRET must be set".into()))?;

        let storage_backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "file".to_string())
            .parse()?;

        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            server_port: parse_env("SERVER_PORT", 8080)?,
            storage_backend,
            file_db_dir: env::var("FILE_DB_DIR").unwrap_or_else(|_| "db".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://taskdesk.db".to_string()),
            jwt_secret,
            jwt_refresh_secret,
            access_token_ttl_secs: parse_env("JWT_EXPIRES_IN_SECS", 3600)?,
            refresh_token_ttl_secs: parse_env("JWT_REFRESH_EXPIRES_IN_SECS", 7 * 24 * 3600)?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            json_payload_limit: parse_env("JSON_PAYLOAD_LIMIT", 10 * 1024 * 1024)?,
            rate_limit_window_secs: parse_env("RATE_LIMIT_WINDOW_SECS", 15 * 60)?,
            rate_limit_max_requests: parse_env("RATE_LIMIT_MAX", 100)?,
            production: env::var("APP_ENV").map(|v| v == "production").unwrap_or(false),
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Configuration(format!("{} must be a number", key))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment access is process-global; keep the env-mutating tests in
    // one function so they cannot race each other.
    #[test]
    fn test_config_from_env() {
        env::remove_var("JWT_SECRET");
        env::remove_var("JWT_REFRESH_SECRET");

        // Missing secrets are a hard configuration error.
        match Config::from_env() {
            Err(AppError::Configuration(msg)) => assert!(msg.contains("JWT_SECRET")),
            other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
        }

        env::set_var("JWT_SECRET", "access-secret");
        match Config::from_env() {
            Err(AppError::Configuration(msg)) => assert!(msg.contains("JWT_REFRESH_SECRET")),
            other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
        }

        env::set_var("JWT_REFRESH_SECRET", "refresh-secret");
        let config = Config::from_env().unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.storage_backend, StorageBackend::File);
        assert_eq!(config.access_token_ttl_secs, 3600);
        assert_eq!(config.refresh_token_ttl_secs, 604800);
        assert_eq!(config.rate_limit_max_requests, 100);
        assert!(!config.production);

        env::set_var("STORAGE_BACKEND", "sqlite");
        env::set_var("SERVER_PORT", "3000");
        env::set_var("APP_ENV", "production");
        let config = Config::from_env().unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Sqlite);
        assert_eq!(config.server_port, 3000);
        assert!(config.production);
        assert_eq!(config.server_url(), "http://127.0.0.1:3000");

        env::set_var("STORAGE_BACKEND", "cassandra");
        assert!(matches!(
            Config::from_env(),
            Err(AppError::Configuration(_))
        ));

        env::remove_var("STORAGE_BACKEND");
        env::remove_var("SERVER_PORT");
        env::remove_var("APP_ENV");
    }
}
