//! SQLite-backed document engine.
//!
//! Each collection is a two-column table, `id TEXT PRIMARY KEY` plus the
//! entity serialized as one JSON document. Sorting and pagination happen in
//! the store (`ORDER BY json_extract(doc, ...)` with `LIMIT`/`OFFSET`), and
//! updates are a single `UPDATE ... WHERE id = ?`, so the engine leans on
//! the database's own atomicity instead of in-process locking. A unique
//! index on the extracted email enforces the duplicate-email invariant even
//! under concurrent signups.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    normalize_due_date, CreateTaskRequest, Task, UpdateTaskRequest, UpdateUserRequest, User,
    UserRef,
};
use crate::store::{Database, ListQuery, NewUser, Page, SortOrder, SORT_KEYS};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(AppError::from)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wraps an existing pool (tests hand in an in-memory one) and ensures
    /// the schema exists.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, AppError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        sqlx::query("CREATE TABLE IF NOT EXISTS users (id TEXT PRIMARY KEY, doc TEXT NOT NULL)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email \
             ON users (json_extract(doc, '$.email'))",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS tasks (id TEXT PRIMARY KEY, doc TEXT NOT NULL)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `ORDER BY` clause for a listing. The key is validated at the handler
    /// boundary; anything unexpected falls back to `createdAt` rather than
    /// ever reaching the SQL string. Ties break on `id` ascending, matching
    /// the file engine.
    fn order_clause(query: &ListQuery) -> String {
        let key = if SORT_KEYS.contains(&query.sort_by()) {
            query.sort_by()
        } else {
            "createdAt"
        };
        let direction = match query.sort_order() {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        // SQLite sorts NULL below any value in ASC and above in DESC, which
        // is exactly the missing-key contract.
        format!(
            "ORDER BY json_extract(doc, '$.{}') {}, id ASC",
            key, direction
        )
    }

    fn offset(query: &ListQuery) -> i64 {
        ((query.page() - 1) * query.limit()) as i64
    }

    async fn fetch_user_doc(&self, id: &str) -> Result<Option<User>, AppError> {
        let doc: Option<String> = sqlx::query_scalar("SELECT doc FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        doc.map(|doc| serde_json::from_str(&doc).map_err(AppError::from))
            .transpose()
    }

    async fn fetch_task_doc(&self, id: &str) -> Result<Option<Task>, AppError> {
        let doc: Option<String> = sqlx::query_scalar("SELECT doc FROM tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        doc.map(|doc| serde_json::from_str(&doc).map_err(AppError::from))
            .transpose()
    }

    /// Populates user references on a page of tasks, resolving each distinct
    /// id once. Dangling references stay bare.
    async fn populate_tasks(&self, mut tasks: Vec<Task>) -> Result<Vec<Task>, AppError> {
        let mut resolved: HashMap<String, Option<User>> = HashMap::new();
        for task in &mut tasks {
            for reference in [&mut task.assigned_to, &mut task.created_by] {
                let id = reference.id().to_string();
                let user = match resolved.get(&id) {
                    Some(user) => user.clone(),
                    None => {
                        let user = self.fetch_user_doc(&id).await?;
                        resolved.insert(id, user.clone());
                        user
                    }
                };
                if let Some(user) = user {
                    *reference = UserRef::Populated(user.summary());
                }
            }
        }
        Ok(tasks)
    }

    async fn page_tasks(
        &self,
        assignee: Option<&str>,
        query: &ListQuery,
    ) -> Result<Page<Task>, AppError> {
        let where_clause = match assignee {
            Some(_) => "WHERE json_extract(doc, '$.assignedTo') = ?",
            None => "",
        };
        let sql = format!(
            "SELECT doc FROM tasks {} {} LIMIT ? OFFSET ?",
            where_clause,
            Self::order_clause(query)
        );
        let count_sql = format!("SELECT COUNT(*) FROM tasks {}", where_clause);

        let mut rows = sqlx::query_scalar::<_, String>(&sql);
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(user_id) = assignee {
            rows = rows.bind(user_id);
            count = count.bind(user_id);
        }
        rows = rows.bind(query.limit() as i64).bind(Self::offset(query));

        let docs = rows.fetch_all(&self.pool).await?;
        let total = count.fetch_one(&self.pool).await? as u64;

        let tasks = docs
            .iter()
            .map(|doc| serde_json::from_str(doc).map_err(AppError::from))
            .collect::<Result<Vec<Task>, _>>()?;
        let tasks = self.populate_tasks(tasks).await?;
        Ok(Page::new(tasks, query.page(), query.limit(), total))
    }
}

#[async_trait]
impl Database for SqliteStore {
    async fn list_users(&self, query: &ListQuery) -> Result<Page<User>, AppError> {
        let sql = format!(
            "SELECT doc FROM users {} LIMIT ?1 OFFSET ?2",
            Self::order_clause(query)
        );
        let docs: Vec<String> = sqlx::query_scalar(&sql)
            .bind(query.limit() as i64)
            .bind(Self::offset(query))
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let users = docs
            .iter()
            .map(|doc| {
                serde_json::from_str::<User>(doc)
                    .map(User::without_password)
                    .map_err(AppError::from)
            })
            .collect::<Result<Vec<User>, _>>()?;
        Ok(Page::new(users, query.page(), query.limit(), total as u64))
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.fetch_user_doc(id).await?.map(User::without_password))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .get_user_by_email_with_password(email)
            .await?
            .map(User::without_password))
    }

    async fn get_user_by_email_with_password(
        &self,
        email: &str,
    ) -> Result<Option<User>, AppError> {
        let doc: Option<String> =
            sqlx::query_scalar("SELECT doc FROM users WHERE json_extract(doc, '$.email') = ?1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        doc.map(|doc| serde_json::from_str(&doc).map_err(AppError::from))
            .transpose()
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: new_user.name,
            email: new_user.email,
            password: Some(new_user.password),
            role: new_user.role,
            created_at: now,
            updated_at: now,
        };
        let doc = serde_json::to_string(&user)?;
        let inserted = sqlx::query("INSERT INTO users (id, doc) VALUES (?1, ?2)")
            .bind(&user.id)
            .bind(&doc)
            .execute(&self.pool)
            .await;
        match inserted {
            Ok(_) => Ok(user.without_password()),
            Err(err)
                if err
                    .as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false) =>
            {
                Err(AppError::Validation(
                    "User with this email already exists".into(),
                ))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update_user(
        &self,
        id: &str,
        update: &UpdateUserRequest,
    ) -> Result<Option<User>, AppError> {
        let mut user = match self.fetch_user_doc(id).await? {
            Some(user) => user,
            None => return Ok(None),
        };
        if let Some(name) = &update.name {
            user.name = name.clone();
        }
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        user.updated_at = Utc::now();
        let doc = serde_json::to_string(&user)?;
        // The unique email index fires on updates too; surface it as the
        // same validation error `create_user` reports.
        let updated = sqlx::query("UPDATE users SET doc = ?2 WHERE id = ?1")
            .bind(id)
            .bind(&doc)
            .execute(&self.pool)
            .await;
        match updated {
            Ok(_) => Ok(Some(user.without_password())),
            Err(err)
                if err
                    .as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false) =>
            {
                Err(AppError::Validation(
                    "User with this email already exists".into(),
                ))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_user(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_tasks(&self, query: &ListQuery) -> Result<Page<Task>, AppError> {
        self.page_tasks(None, query).await
    }

    async fn get_task_by_id(&self, id: &str) -> Result<Option<Task>, AppError> {
        let task = match self.fetch_task_doc(id).await? {
            Some(task) => task,
            None => return Ok(None),
        };
        let mut populated = self.populate_tasks(vec![task]).await?;
        Ok(populated.pop())
    }

    async fn create_task(
        &self,
        new_task: &CreateTaskRequest,
        created_by: &str,
    ) -> Result<Task, AppError> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: new_task.title.clone(),
            description: new_task.description.clone(),
            status: new_task.status,
            priority: new_task.priority,
            assigned_to: UserRef::Id(new_task.assigned_to.clone()),
            created_by: UserRef::Id(created_by.to_string()),
            due_date: new_task.due_date.map(normalize_due_date),
            created_at: now,
            updated_at: now,
        };
        let doc = serde_json::to_string(&task)?;
        sqlx::query("INSERT INTO tasks (id, doc) VALUES (?1, ?2)")
            .bind(&task.id)
            .bind(&doc)
            .execute(&self.pool)
            .await?;
        let mut populated = self.populate_tasks(vec![task]).await?;
        populated
            .pop()
            .ok_or_else(|| AppError::Internal("Created task vanished before read-back".into()))
    }

    async fn update_task(
        &self,
        id: &str,
        update: &UpdateTaskRequest,
    ) -> Result<Option<Task>, AppError> {
        let mut task = match self.fetch_task_doc(id).await? {
            Some(task) => task,
            None => return Ok(None),
        };
        // Stored docs always hold bare references; re-bare before merging in
        // case an older row was written populated.
        task.assigned_to = task.assigned_to.unpopulated();
        task.created_by = task.created_by.unpopulated();
        task.apply_update(update);
        let doc = serde_json::to_string(&task)?;
        sqlx::query("UPDATE tasks SET doc = ?2 WHERE id = ?1")
            .bind(id)
            .bind(&doc)
            .execute(&self.pool)
            .await?;
        let mut populated = self.populate_tasks(vec![task]).await?;
        Ok(populated.pop())
    }

    async fn delete_task(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_tasks_by_user(
        &self,
        user_id: &str,
        query: &ListQuery,
    ) -> Result<Page<Task>, AppError> {
        self.page_tasks(Some(user_id), query).await
    }
}
