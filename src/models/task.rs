use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;
use crate::models::user::{User, UserSummary};

/// Represents the status of a task.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Task is yet to be started. The default for new tasks.
    Pending,
    /// Task is currently being worked on.
    InProgress,
    /// Task is finished.
    Completed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

/// Represents the priority of a task.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

/// A reference to a user on a task, either populated to the `{id, name,
/// email}` projection or left as the bare identifier.
///
/// Stores persist the bare id; reads populate it when the referenced user
/// still exists and fall back to the id when it dangles. Ownership checks go
/// through [`UserRef::id`] so both shapes compare identically.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum UserRef {
    Populated(UserSummary),
    Id(String),
}

impl UserRef {
    pub fn id(&self) -> &str {
        match self {
            UserRef::Populated(summary) => &summary.id,
            UserRef::Id(id) => id,
        }
    }

    pub fn is_populated(&self) -> bool {
        matches!(self, UserRef::Populated(_))
    }

    /// The storable form: always the bare identifier.
    pub fn unpopulated(&self) -> UserRef {
        UserRef::Id(self.id().to_string())
    }
}

/// A task entity as stored and as returned by the API.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assigned_to: UserRef,
    /// Set once at creation from the caller's identity, never mutated.
    pub created_by: UserRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creator-or-admin rule for update and delete. Compares by identifier,
    /// so it holds whether `created_by` is populated or bare.
    pub fn can_be_modified_by(&self, user: &User) -> bool {
        user.is_admin() || self.created_by.id() == user.id
    }

    /// Merges an update payload into the stored task. `id` and `created_by`
    /// are immutable; both engines funnel updates through here so their
    /// merge behavior cannot drift apart.
    pub fn apply_update(&mut self, update: &UpdateTaskRequest) {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(assigned_to) = &update.assigned_to {
            self.assigned_to = UserRef::Id(assigned_to.clone());
        }
        // Outer Some(None) clears the due date; an absent key leaves it.
        if let Some(due_date) = update.due_date {
            self.due_date = due_date.map(normalize_due_date);
        }
        self.updated_at = Utc::now();
    }
}

/// Payload for `POST /tasks`. `createdBy` is never client-supplied; handlers
/// take it from the authenticated identity.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[validate(length(min = 3, max = 100))]
    pub title: String,
    #[validate(length(min = 10, max = 500))]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    pub assigned_to: String,
    pub due_date: Option<DateTime<Utc>>,
}

/// Payload for `PUT /tasks/{id}`. Every field is optional; `due_date`
/// distinguishes "clear" (explicit null, the inner `None`) from "leave
/// unchanged" (key absent, the outer `None`).
#[derive(Debug, Serialize, Deserialize, Validate, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[validate(length(min = 3, max = 100))]
    pub title: Option<String>,
    #[validate(length(min = 10, max = 500))]
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assigned_to: Option<String>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

/// Deserializes a present-but-null field as `Some(None)` while `#[serde(
/// default)]` keeps an absent field as `None`.
mod double_option {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<DateTime<Utc>>::deserialize(deserializer).map(Some)
    }

    pub fn serialize<S>(
        value: &Option<Option<DateTime<Utc>>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }
}

/// Clamps a due date to whole-second precision before it is stored. Client
/// payloads arrive with arbitrary sub-second precision, and mixed-precision
/// RFC 3339 strings do not order chronologically; uniform precision keeps
/// both engines' string-based `dueDate` sorts exact.
pub fn normalize_due_date(due_date: DateTime<Utc>) -> DateTime<Utc> {
    due_date.with_nanosecond(0).unwrap_or(due_date)
}

/// Due dates must sit strictly in the future at the moment they are set.
/// Clearing an existing due date is always allowed.
pub fn validate_due_date(due_date: DateTime<Utc>) -> Result<(), AppError> {
    if due_date <= Utc::now() {
        return Err(AppError::Validation("Due date must be in the future".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;
    use chrono::Duration;

    fn user(id: &str, role: UserRole) -> User {
        let now = Utc::now();
        User {
            id: id.into(),
            name: format!("user-{}", id),
            email: format!("{}@example.com", id),
            password: None,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    fn task(created_by: UserRef) -> Task {
        let now = Utc::now();
        Task {
            id: "t1".into(),
            title: "Write report".into(),
            description: "Quarterly report for the team".into(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            assigned_to: UserRef::Id("u2".into()),
            created_by,
            due_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_user_ref_accepts_both_shapes() {
        let bare: UserRef = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(bare.id(), "abc123");
        assert!(!bare.is_populated());

        let populated: UserRef = serde_json::from_value(serde_json::json!({
            "id": "abc123", "name": "Alice", "email": "alice@example.com"
        }))
        .unwrap();
        assert_eq!(populated.id(), "abc123");
        assert!(populated.is_populated());
        assert_eq!(populated.unpopulated(), bare);
    }

    #[test]
    fn test_creator_or_admin_rule() {
        let creator = user("u1", UserRole::User);
        let admin = user("u9", UserRole::Admin);
        let stranger = user("u2", UserRole::User);

        // Rule must hold for bare and populated createdBy alike.
        let bare = task(UserRef::Id("u1".into()));
        let populated = task(UserRef::Populated(creator.summary()));
        for t in [bare, populated] {
            assert!(t.can_be_modified_by(&creator));
            assert!(t.can_be_modified_by(&admin));
            assert!(!t.can_be_modified_by(&stranger));
        }
    }

    #[test]
    fn test_status_and_priority_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!(serde_json::to_string(&TaskPriority::High).unwrap(), "\"high\"");
        assert_eq!(TaskStatus::default(), TaskStatus::Pending);
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
    }

    #[test]
    fn test_create_task_request_validation() {
        let valid = CreateTaskRequest {
            title: "A valid title".into(),
            description: "A description long enough".into(),
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
            assigned_to: "u2".into(),
            due_date: None,
        };
        assert!(valid.validate().is_ok());

        let short_title = CreateTaskRequest { title: "ab".into(), ..valid_copy(&valid) };
        assert!(short_title.validate().is_err());

        let short_description =
            CreateTaskRequest { description: "too short".into(), ..valid_copy(&valid) };
        assert!(short_description.validate().is_err());

        let long_title = CreateTaskRequest { title: "a".repeat(101), ..valid_copy(&valid) };
        assert!(long_title.validate().is_err());
    }

    fn valid_copy(src: &CreateTaskRequest) -> CreateTaskRequest {
        CreateTaskRequest {
            title: src.title.clone(),
            description: src.description.clone(),
            status: src.status,
            priority: src.priority,
            assigned_to: src.assigned_to.clone(),
            due_date: src.due_date,
        }
    }

    #[test]
    fn test_due_date_must_be_future() {
        assert!(validate_due_date(Utc::now() + Duration::hours(1)).is_ok());
        assert!(matches!(
            validate_due_date(Utc::now() - Duration::hours(1)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_update_payload_null_clears_absent_leaves() {
        let with_null: UpdateTaskRequest =
            serde_json::from_str(r#"{"title":"New title ok","dueDate":null}"#).unwrap();
        assert_eq!(with_null.due_date, Some(None));

        let absent: UpdateTaskRequest =
            serde_json::from_str(r#"{"title":"New title ok"}"#).unwrap();
        assert_eq!(absent.due_date, None);

        let with_value: UpdateTaskRequest =
            serde_json::from_str(r#"{"dueDate":"2099-01-01T00:00:00Z"}"#).unwrap();
        assert!(matches!(with_value.due_date, Some(Some(_))));
    }

    #[test]
    fn test_due_dates_store_at_whole_second_precision() {
        let fractional = DateTime::parse_from_rfc3339("2099-01-01T10:00:00.500Z")
            .unwrap()
            .with_timezone(&Utc);
        let normalized = normalize_due_date(fractional);
        assert_eq!(
            serde_json::to_value(normalized).unwrap(),
            serde_json::json!("2099-01-01T10:00:00Z")
        );

        // A fractional second no longer makes "later" serialize before "earlier".
        let earlier = normalize_due_date(
            DateTime::parse_from_rfc3339("2099-01-01T10:00:00.900Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let later = normalize_due_date(
            DateTime::parse_from_rfc3339("2099-01-01T10:00:01Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        assert!(
            serde_json::to_string(&earlier).unwrap() < serde_json::to_string(&later).unwrap()
        );

        let mut task = task(UserRef::Id("u1".into()));
        let update: UpdateTaskRequest =
            serde_json::from_str(r#"{"dueDate":"2099-01-01T10:00:00.500Z"}"#).unwrap();
        task.apply_update(&update);
        assert_eq!(task.due_date, Some(normalized));
    }
}
