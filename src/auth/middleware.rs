//! Per-request identity resolution.
//!
//! `AuthMiddleware` walks every request through the gate: extract the bearer
//! token, verify it as an access token, resolve the subject to a live user
//! record, and attach that `User` to the request extensions for handlers and
//! the `Identity` extractor. Any step failing rejects the request with 401;
//! expired and malformed tokens are logged distinctly but answered alike.

use std::rc::Rc;

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::ResponseError,
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use crate::auth::token::TokenService;
use crate::error::AppError;
use crate::models::User;
use crate::store::Database;

/// Tokens shorter than this cannot be a JWT; reject them before attempting
/// verification (also catches literal "null"/"undefined" from clients).
const MIN_TOKEN_LENGTH: usize = 10;

pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        // Health and the credential-exchanging auth endpoints carry no
        // bearer token by definition.
        if is_public_path(req.path()) {
            return Box::pin(async move {
                service
                    .call(req)
                    .await
                    .map(ServiceResponse::map_into_left_body)
            });
        }

        Box::pin(async move {
            // Rejections become a response here rather than a service-level
            // error, so outer middleware (CORS, logging) still sees them.
            match resolve_user(&req).await {
                Ok(user) => {
                    req.extensions_mut().insert(user);
                    service
                        .call(req)
                        .await
                        .map(ServiceResponse::map_into_left_body)
                }
                Err(err) => {
                    let response = err.error_response().map_into_right_body();
                    Ok(req.into_response(response))
                }
            }
        })
    }
}

async fn resolve_user(req: &ServiceRequest) -> Result<User, AppError> {
    let token = bearer_token(req)?;

    let token_service = req
        .app_data::<web::Data<TokenService>>()
        .ok_or_else(|| AppError::Internal("TokenService not registered".into()))?;
    let db = req
        .app_data::<web::Data<dyn Database>>()
        .ok_or_else(|| AppError::Internal("Database not registered".into()))?;

    let user_id = token_service.verify_access(&token).map_err(|err| {
        err.log("auth middleware");
        AppError::from(err)
    })?;

    // The subject may have been deleted since the token was issued.
    db.get_user_by_id(&user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid token. User not found.".into()))
}

/// Routes reachable without a bearer token. Matched exactly against the
/// full request path so nested lookalikes (`/tasks/health`, ids named
/// `login`) still go through the gate.
const PUBLIC_PATHS: &[&str] = &[
    "/api/v1/health",
    "/api/v1/auth/signup",
    "/api/v1/auth/login",
    "/api/v1/auth/refresh-token",
    "/api/v1/auth/logout",
];

fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

fn bearer_token(req: &ServiceRequest) -> Result<String, AppError> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Access denied. No token provided.".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid token format.".into()))?;

    if token.len() < MIN_TOKEN_LENGTH || token == "null" || token == "undefined" {
        return Err(AppError::Unauthorized("Invalid token format.".into()));
    }
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn request_with_auth(value: Option<&str>) -> ServiceRequest {
        let mut req = TestRequest::default();
        if let Some(value) = value {
            req = req.insert_header(("Authorization", value));
        }
        req.to_srv_request()
    }

    #[test]
    fn test_bearer_token_extraction() {
        let req = request_with_auth(Some("Bearer a.valid-looking.token"));
        assert_eq!(bearer_token(&req).unwrap(), "a.valid-looking.token");
    }

    #[test]
    fn test_missing_header_is_distinct_from_malformed() {
        let missing = bearer_token(&request_with_auth(None)).unwrap_err();
        assert!(matches!(missing, AppError::Unauthorized(msg) if msg.contains("No token")));

        let not_bearer = bearer_token(&request_with_auth(Some("Basic abc"))).unwrap_err();
        assert!(
            matches!(not_bearer, AppError::Unauthorized(msg) if msg.contains("Invalid token format"))
        );

        let too_short = bearer_token(&request_with_auth(Some("Bearer short"))).unwrap_err();
        assert!(
            matches!(too_short, AppError::Unauthorized(msg) if msg.contains("Invalid token format"))
        );

        let null_token = bearer_token(&request_with_auth(Some("Bearer undefined"))).unwrap_err();
        assert!(matches!(null_token, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_public_paths_skip_the_gate() {
        assert!(is_public_path("/api/v1/health"));
        assert!(is_public_path("/api/v1/auth/login"));
        assert!(is_public_path("/api/v1/auth/refresh-token"));
        assert!(!is_public_path("/api/v1/auth/profile"));
        assert!(!is_public_path("/api/v1/tasks"));
        // Suffix lookalikes must not slip past the gate.
        assert!(!is_public_path("/api/v1/tasks/health"));
        assert!(!is_public_path("/api/v1/users/login"));
        assert!(!is_public_path("/health"));
    }
}
