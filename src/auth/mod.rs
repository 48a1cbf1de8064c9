pub mod extractors;
pub mod middleware;
pub mod password;
pub mod token;

// Re-export the pieces handlers touch constantly.
pub use extractors::Identity;
pub use middleware::AuthMiddleware;
pub use password::{hash_password, verify_password};
pub use token::{AuthTokens, Claims, TokenError, TokenService};
