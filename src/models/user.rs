use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Role attached to every user account. Admins may manage other users and
/// mutate any task; regular users only their own.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

/// A user record as stored by both persistence engines.
///
/// `password` holds the bcrypt hash and is only ever `Some` on the
/// credential-lookup path used by the login flow; every other read strips it
/// before the record leaves the store, and `skip_serializing_if` keeps it out
/// of API responses regardless.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn without_password(mut self) -> Self {
        self.password = None;
        self
    }

    /// The denormalized `{id, name, email}` projection used when populating
    /// task references.
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Denormalized projection of a user embedded in populated task references.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Payload for `POST /auth/signup`.
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 2, max = 50))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
}

/// Payload for `POST /auth/login`.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
}

/// Admin payload for `PUT /users/{id}`. Role and password are deliberately
/// not updatable through this route.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 2, max = 50))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: "u1".into(),
            name: "Alice".into(),
            email: "alice@example.com".into(),
            password: Some("$2b$12$hash".into()),
            role: UserRole::User,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_password_never_serialized() {
        let user = sample_user();
        let json = serde_json::to_value(&user).unwrap();
        // Even with the hash present, serialization drops it once stripped.
        assert!(json.get("password").is_some());
        let json = serde_json::to_value(user.without_password()).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["email"], "alice@example.com");
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!(serde_json::to_string(&UserRole::Admin).unwrap(), "\"admin\"");
        let role: UserRole = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, UserRole::User);
    }

    #[test]
    fn test_signup_request_validation() {
        let valid = SignupRequest {
            name: "Test User".into(),
            email: "test@example.com".into(),
            password: "password123".into(),
        };
        assert!(valid.validate().is_ok());

        let bad_email = SignupRequest {
            name: "Test User".into(),
            email: "testexample.com".into(),
            password: "password123".into(),
        };
        assert!(bad_email.validate().is_err());

        let short_password = SignupRequest {
            name: "Test User".into(),
            email: "test@example.com".into(),
            password: "123".into(),
        };
        assert!(short_password.validate().is_err());

        let short_name = SignupRequest {
            name: "T".into(),
            email: "test@example.com".into(),
            password: "password123".into(),
        };
        assert!(short_name.validate().is_err());
    }

    #[test]
    fn test_update_user_request_allows_partial_fields() {
        let rename_only = UpdateUserRequest {
            name: Some("New Name".into()),
            email: None,
        };
        assert!(rename_only.validate().is_ok());

        let bad_email = UpdateUserRequest {
            name: None,
            email: Some("not-an-email".into()),
        };
        assert!(bad_email.validate().is_err());
    }
}
