//! In-process HTTP client for the taskdesk API.
//!
//! Wraps `reqwest` with bearer-token handling: every call carries the current
//! access token, and a 401 triggers one refresh followed by exactly one retry.
//! Refreshing is single-flight. Concurrent callers that hit 401 at the same
//! time queue on an async mutex, and whoever acquires it second finds the
//! token already replaced and skips the network round trip.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::error::AppError;

struct TokenState {
    access: RwLock<String>,
    refresh: String,
    refresh_gate: Mutex<()>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenState>,
}

impl ApiClient {
    /// Signs in against `base_url` and returns a client holding the issued
    /// token pair.
    pub async fn login(base_url: &str, email: &str, password: &str) -> Result<Self, AppError> {
        let http = reqwest::Client::new();
        let resp = http
            .post(format!("{}/api/v1/auth/login", base_url))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Login request failed: {}", e)))?;

        if resp.status() != StatusCode::OK {
            return Err(AppError::Unauthorized("Invalid email or password".into()));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Invalid login response: {}", e)))?;
        let access = body["data"]["accessToken"]
            .as_str()
            .ok_or_else(|| AppError::Internal("Login response missing access token".into()))?
            .to_string();
        let refresh = body["data"]["refreshToken"]
            .as_str()
            .ok_or_else(|| AppError::Internal("Login response missing refresh token".into()))?
            .to_string();

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            tokens: Arc::new(TokenState {
                access: RwLock::new(access),
                refresh,
                refresh_gate: Mutex::new(()),
            }),
        })
    }

    pub async fn access_token(&self) -> String {
        self.tokens.access.read().await.clone()
    }

    /// Replaces the stored access token. Used by tests to simulate expiry.
    pub async fn set_access_token(&self, token: &str) {
        *self.tokens.access.write().await = token.to_string();
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        self.request(Method::GET, path, None::<&()>).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AppError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        self.request(Method::DELETE, path, None::<&()>).await
    }

    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, AppError> {
        let token = self.access_token().await;
        let resp = self.send(method.clone(), path, body, &token).await?;

        let resp = if resp.status() == StatusCode::UNAUTHORIZED {
            self.refresh_access_token(&token).await?;
            let token = self.access_token().await;
            self.send(method, path, body, &token).await?
        } else {
            resp
        };

        let status = resp.status();
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Invalid response body: {}", e)))?;

        if !status.is_success() {
            let message = payload["message"]
                .as_str()
                .unwrap_or("Request failed")
                .to_string();
            return Err(match status {
                StatusCode::UNAUTHORIZED => AppError::Unauthorized(message),
                StatusCode::FORBIDDEN => AppError::Forbidden(message),
                StatusCode::NOT_FOUND => AppError::NotFound(message),
                StatusCode::BAD_REQUEST => AppError::Validation(message),
                _ => AppError::Internal(message),
            });
        }

        serde_json::from_value(payload)
            .map_err(|e| AppError::Internal(format!("Invalid response body: {}", e)))
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: &str,
    ) -> Result<reqwest::Response, AppError> {
        let url = format!("{}/api/v1{}", self.base_url, path);
        let mut builder = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Request failed: {}", e)))
    }

    /// Trades the refresh token for a new access token.
    ///
    /// `stale_token` is the access token the caller just failed with. If the
    /// stored token no longer matches it by the time the gate is acquired,
    /// another caller refreshed first and this one reuses that result.
    async fn refresh_access_token(&self, stale_token: &str) -> Result<(), AppError> {
        let _gate = self.tokens.refresh_gate.lock().await;

        if *self.tokens.access.read().await != stale_token {
            return Ok(());
        }

        let resp = self
            .http
            .post(format!("{}/api/v1/auth/refresh-token", self.base_url))
            .header(
                reqwest::header::COOKIE,
                format!("refreshToken={}", self.tokens.refresh),
            )
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Refresh request failed: {}", e)))?;

        if resp.status() != StatusCode::OK {
            return Err(AppError::Unauthorized("Session expired".into()));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Invalid refresh response: {}", e)))?;
        let access = body["data"]["accessToken"]
            .as_str()
            .ok_or_else(|| AppError::Internal("Refresh response missing access token".into()))?;

        *self.tokens.access.write().await = access.to_string();
        Ok(())
    }
}
