//! Token issuance and verification.
//!
//! `TokenService` signs short-lived access tokens and longer-lived refresh
//! tokens with two distinct secrets, so a leaked access token (sent on every
//! request) can never be replayed as a refresh token. The service is built
//! once from `Config` at startup and carries no other state; it never reads
//! the environment itself.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::AppError;
use crate::models::user::User;

/// Claims encoded in both token kinds: the subject user id and expiry.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// The access/refresh pair returned by signup and login.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Why a token failed verification. Callers collapse both to 401 for the
/// client but log them distinctly.
#[derive(Debug, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Malformed,
}

impl TokenError {
    pub fn log(&self, context: &str) {
        match self {
            TokenError::Expired => log::debug!("{}: token expired", context),
            TokenError::Malformed => log::warn!("{}: malformed or mis-signed token", context),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(error: TokenError) -> AppError {
        match error {
            TokenError::Expired => AppError::Unauthorized("Token expired".into()),
            TokenError::Malformed => AppError::Unauthorized("Invalid token".into()),
        }
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl KeyPair {
    fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    fn sign(&self, user_id: &str) -> Result<String, AppError> {
        let exp = (Utc::now().timestamp() + self.ttl_secs) as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    fn verify(&self, token: &str) -> Result<String, TokenError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims.sub)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })
    }
}

pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
}

impl TokenService {
    pub fn from_config(config: &Config) -> Self {
        Self {
            access: KeyPair::new(&config.jwt_secret, config.access_token_ttl_secs),
            refresh: KeyPair::new(&config.jwt_refresh_secret, config.refresh_token_ttl_secs),
        }
    }

    /// Signs `{userId}` with each secret and its own expiry.
    pub fn issue_tokens(&self, user: &User) -> Result<AuthTokens, AppError> {
        Ok(AuthTokens {
            access_token: self.access.sign(&user.id)?,
            refresh_token: self.refresh.sign(&user.id)?,
        })
    }

    pub fn issue_access_token(&self, user_id: &str) -> Result<String, AppError> {
        self.access.sign(user_id)
    }

    pub fn verify_access(&self, token: &str) -> Result<String, TokenError> {
        self.access.verify(token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<String, TokenError> {
        self.refresh.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;
    use crate::store::StorageBackend;

    pub(crate) fn test_config() -> Config {
        Config {
            server_host: "127.0.0.1".into(),
            server_port: 0,
            storage_backend: StorageBackend::File,
            file_db_dir: "db".into(),
            database_url: "sqlite::memory:".into(),
            jwt_secret: "test-access-secret".into(),
            jwt_refresh_secret: "test-refresh-secret".into(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 7 * 24 * 3600,
            frontend_url: "http://localhost:3000".into(),
            json_payload_limit: 10 * 1024 * 1024,
            rate_limit_window_secs: 900,
            rate_limit_max_requests: 100,
            production: false,
        }
    }

    fn test_user(id: &str) -> User {
        let now = Utc::now();
        User {
            id: id.into(),
            name: "Tester".into(),
            email: "tester@example.com".into(),
            password: None,
            role: UserRole::User,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let service = TokenService::from_config(&test_config());
        let user = test_user("user-42");
        let tokens = service.issue_tokens(&user).unwrap();

        assert!(!tokens.access_token.is_empty());
        assert!(!tokens.refresh_token.is_empty());
        assert_ne!(tokens.access_token, tokens.refresh_token);

        assert_eq!(service.verify_access(&tokens.access_token).unwrap(), "user-42");
        assert_eq!(service.verify_refresh(&tokens.refresh_token).unwrap(), "user-42");
    }

    #[test]
    fn test_access_and_refresh_secrets_are_distinct() {
        let service = TokenService::from_config(&test_config());
        let tokens = service.issue_tokens(&test_user("user-1")).unwrap();

        // An access token must never pass refresh verification and vice
        // versa; the signatures come from different secrets.
        assert_eq!(
            service.verify_refresh(&tokens.access_token).unwrap_err(),
            TokenError::Malformed
        );
        assert_eq!(
            service.verify_access(&tokens.refresh_token).unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn test_expired_token_is_classified_as_expired() {
        let mut config = test_config();
        config.access_token_ttl_secs = -120;
        let service = TokenService::from_config(&config);
        let tokens = service.issue_tokens(&test_user("user-2")).unwrap();

        assert_eq!(
            service.verify_access(&tokens.access_token).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let service = TokenService::from_config(&test_config());
        assert_eq!(
            service.verify_access("not-a-jwt").unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn test_wrong_secret_is_malformed() {
        let service = TokenService::from_config(&test_config());
        let mut other_config = test_config();
        other_config.jwt_secret = "a-completely-different-secret".into();
        let other = TokenService::from_config(&other_config);

        let tokens = service.issue_tokens(&test_user("user-3")).unwrap();
        assert_eq!(
            other.verify_access(&tokens.access_token).unwrap_err(),
            TokenError::Malformed
        );
    }
}
