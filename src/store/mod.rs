//!
//! # Persistence Adapter
//!
//! A single `Database` trait with two interchangeable engines: a flat-file
//! JSON store (`file`) and a SQLite-backed document store (`sqlite`). The
//! engine is selected once at startup by [`connect`]; business logic only
//! ever sees `Arc<dyn Database>`.
//!
//! Both engines honor the same externally-observed contract:
//! - 1-indexed pagination, `pages = ceil(total / limit)`, out-of-range pages
//!   return an empty data list rather than an error;
//! - missing sort-key values order below any present value;
//! - equal sort keys break ties on `id` ascending in both engines;
//! - task reads populate `assignedTo`/`createdBy` to `{id, name, email}`,
//!   falling back to the bare id when the referent is gone.

pub mod file;
pub mod sqlite;

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{CreateTaskRequest, Task, UpdateTaskRequest, UpdateUserRequest, User, UserRole};

pub use file::FileStore;
pub use sqlite::SqliteStore;

/// Which engine backs the `Database` trait, from `STORAGE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    File,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(AppError::Configuration(format!(
                "Unknown storage backend \"{}\" (expected \"file\" or \"sqlite\")",
                other
            ))),
        }
    }
}

/// Selects and initializes the configured engine.
pub async fn connect(config: &Config) -> Result<Arc<dyn Database>, AppError> {
    match config.storage_backend {
        StorageBackend::File => {
            log::info!("using file-based store at {}", config.file_db_dir);
            Ok(Arc::new(FileStore::open(&config.file_db_dir).await?))
        }
        StorageBackend::Sqlite => {
            log::info!("using sqlite document store at {}", config.database_url);
            Ok(Arc::new(SqliteStore::connect(&config.database_url).await?))
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Sort keys accepted by the list endpoints. Anything else is rejected at
/// the handler boundary, which also keeps the sqlite engine's `ORDER BY`
/// free of caller-controlled strings.
pub const SORT_KEYS: &[&str] = &[
    "title",
    "status",
    "priority",
    "dueDate",
    "createdAt",
    "updatedAt",
    "name",
    "email",
];

/// Pagination/sort parameters shared by every listing operation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<SortOrder>,
}

impl ListQuery {
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(10).clamp(1, 100)
    }

    pub fn sort_by(&self) -> &str {
        self.sort_by.as_deref().unwrap_or("createdAt")
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order.unwrap_or(SortOrder::Desc)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !SORT_KEYS.contains(&self.sort_by()) {
            return Err(AppError::Validation(format!(
                "sortBy must be one of: {}",
                SORT_KEYS.join(", ")
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

/// One page of results plus the pagination summary both engines compute the
/// same way.
#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, page: u64, limit: u64, total: u64) -> Self {
        Self {
            data,
            pagination: Pagination {
                page,
                limit,
                total,
                pages: page_count(total, limit),
            },
        }
    }
}

pub fn page_count(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

/// Fields persisted for a brand-new user; ids and timestamps are assigned by
/// the engine.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    /// Already bcrypt-hashed by the caller.
    pub password: String,
    pub role: UserRole,
}

/// The uniform storage interface implemented by both engines.
#[async_trait]
pub trait Database: Send + Sync {
    // User operations
    async fn list_users(&self, query: &ListQuery) -> Result<Page<User>, AppError>;
    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, AppError>;
    /// Password stripped; safe to hand to any caller.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    /// Password hash included. Only the login flow may call this.
    async fn get_user_by_email_with_password(
        &self,
        email: &str,
    ) -> Result<Option<User>, AppError>;
    /// Fails with a `Validation` error when the email is already taken.
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError>;
    async fn update_user(
        &self,
        id: &str,
        update: &UpdateUserRequest,
    ) -> Result<Option<User>, AppError>;
    async fn delete_user(&self, id: &str) -> Result<bool, AppError>;

    // Task operations
    async fn list_tasks(&self, query: &ListQuery) -> Result<Page<Task>, AppError>;
    async fn get_task_by_id(&self, id: &str) -> Result<Option<Task>, AppError>;
    async fn create_task(
        &self,
        new_task: &CreateTaskRequest,
        created_by: &str,
    ) -> Result<Task, AppError>;
    async fn update_task(
        &self,
        id: &str,
        update: &UpdateTaskRequest,
    ) -> Result<Option<Task>, AppError>;
    async fn delete_task(&self, id: &str) -> Result<bool, AppError>;
    /// Tasks whose `assignedTo` is the given user, same pagination contract.
    async fn list_tasks_by_user(
        &self,
        user_id: &str,
        query: &ListQuery,
    ) -> Result<Page<Task>, AppError>;
}

/// Sorts raw entity documents for the file engine: primary key per the
/// query, missing/null below any present value, `id` ascending as the tie
/// break regardless of direction.
pub(crate) fn sort_documents(docs: &mut [Value], sort_by: &str, order: SortOrder) {
    docs.sort_by(|a, b| {
        let primary = compare_values(a.get(sort_by), b.get(sort_by));
        let primary = match order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| {
            let a_id = a.get("id").and_then(Value::as_str).unwrap_or("");
            let b_id = b.get("id").and_then(Value::as_str).unwrap_or("");
            a_id.cmp(b_id)
        })
    });
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (present(a), present(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            // Mixed types never occur for the whitelisted keys; fall back to
            // a stable textual comparison just in case.
            (a, b) => a.to_string().cmp(&b.to_string()),
        },
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}
