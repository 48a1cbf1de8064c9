use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::error::AppError;
use crate::models::{User, UserRole};

/// The authenticated user resolved by `AuthMiddleware`, pulled out of
/// request extensions.
///
/// Routes using this extractor must sit behind `AuthMiddleware`; if the
/// middleware did not run (or did not insert a user) the request is rejected
/// as unauthenticated rather than reaching the handler.
#[derive(Debug, Clone)]
pub struct Identity(pub User);

impl Identity {
    /// Role gate, run after identity resolution: an identity whose role is
    /// not in the allowed set gets 403, distinct from the 401 an anonymous
    /// request received earlier in the chain.
    pub fn require_role(&self, allowed: &[UserRole]) -> Result<(), AppError> {
        if allowed.contains(&self.0.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Access denied. Insufficient permissions.".into(),
            ))
        }
    }

    pub fn user(&self) -> &User {
        &self.0
    }
}

impl FromRequest for Identity {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<User>().cloned() {
            Some(user) => ready(Ok(Identity(user))),
            None => {
                let err = AppError::Unauthorized("Access denied. User not authenticated.".into());
                ready(Err(err.into()))
            }
        }
    }
}
