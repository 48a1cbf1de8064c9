//! Flat-file JSON engine.
//!
//! Each collection is one pretty-printed JSON array (`users.json`,
//! `tasks.json`) under the configured directory. Every mutation is a whole
//! file read-modify-write, serialized through an in-process mutex so
//! concurrent handlers cannot interleave writes. There is no cross-process
//! file locking; running two server processes against the same directory is
//! unsupported.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    normalize_due_date, CreateTaskRequest, Task, UpdateTaskRequest, UpdateUserRequest, User,
    UserRef,
};
use crate::store::{sort_documents, Database, ListQuery, NewUser, Page};

pub struct FileStore {
    users_path: PathBuf,
    tasks_path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens the store, creating the data directory if absent.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, AppError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            users_path: dir.join("users.json"),
            tasks_path: dir.join("tasks.json"),
            write_lock: Mutex::new(()),
        })
    }

    /// A new unique opaque id: millisecond timestamp plus a random suffix,
    /// collision-safe at in-process concurrency scale.
    fn generate_id() -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}{}", Utc::now().timestamp_millis(), &suffix[..9])
    }

    async fn read_collection<T: DeserializeOwned>(
        &self,
        path: &Path,
    ) -> Result<Vec<T>, AppError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(items) => Ok(items),
                Err(err) => {
                    log::warn!("unreadable collection {}: {}", path.display(), err);
                    Ok(Vec::new())
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes via a sibling temp file and an atomic rename, so unguarded
    /// readers see the previous complete file or the new one, never a
    /// truncated in-progress write.
    async fn write_collection<T: Serialize>(
        &self,
        path: &Path,
        items: &[T],
    ) -> Result<(), AppError> {
        let body = serde_json::to_string_pretty(items)?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, body).await?;
        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }

    async fn read_users(&self) -> Result<Vec<User>, AppError> {
        self.read_collection(&self.users_path).await
    }

    async fn read_tasks(&self) -> Result<Vec<Task>, AppError> {
        self.read_collection(&self.tasks_path).await
    }

    /// Expands bare user references to `{id, name, email}` projections,
    /// leaving dangling references as the bare id.
    fn populate(mut task: Task, users: &[User]) -> Task {
        let find = |reference: &UserRef| {
            users
                .iter()
                .find(|user| user.id == reference.id())
                .map(|user| UserRef::Populated(user.summary()))
        };
        if let Some(populated) = find(&task.assigned_to) {
            task.assigned_to = populated;
        }
        if let Some(populated) = find(&task.created_by) {
            task.created_by = populated;
        }
        task
    }

    /// Shared sort + paginate path for task listings.
    fn page_tasks(tasks: Vec<Task>, query: &ListQuery) -> Result<Page<Task>, AppError> {
        let mut docs = tasks
            .into_iter()
            .map(|task| serde_json::to_value(task).map_err(AppError::from))
            .collect::<Result<Vec<Value>, _>>()?;
        sort_documents(&mut docs, query.sort_by(), query.sort_order());
        let total = docs.len() as u64;
        let data = paginate(docs, query.page(), query.limit())
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(AppError::from))
            .collect::<Result<Vec<Task>, _>>()?;
        Ok(Page::new(data, query.page(), query.limit(), total))
    }
}

fn paginate(docs: Vec<Value>, page: u64, limit: u64) -> Vec<Value> {
    let start = ((page - 1) * limit) as usize;
    docs.into_iter().skip(start).take(limit as usize).collect()
}

#[async_trait]
impl Database for FileStore {
    async fn list_users(&self, query: &ListQuery) -> Result<Page<User>, AppError> {
        let users: Vec<User> = self
            .read_users()
            .await?
            .into_iter()
            .map(User::without_password)
            .collect();
        let mut docs = users
            .into_iter()
            .map(|user| serde_json::to_value(user).map_err(AppError::from))
            .collect::<Result<Vec<Value>, _>>()?;
        sort_documents(&mut docs, query.sort_by(), query.sort_order());
        let total = docs.len() as u64;
        let data = paginate(docs, query.page(), query.limit())
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(AppError::from))
            .collect::<Result<Vec<User>, _>>()?;
        Ok(Page::new(data, query.page(), query.limit(), total))
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let users = self.read_users().await?;
        Ok(users
            .into_iter()
            .find(|user| user.id == id)
            .map(User::without_password))
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
        let users = self.read_users().await?;
        Ok(users.into_iter().find(|user| user.email == email))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.read_users().await?;
        if users.iter().any(|user| user.email == new_user.email) {
            return Err(AppError::Validation(
                "User with this email already exists".into(),
            ));
        }
        let now = Utc::now();
        let user = User {
            id: Self::generate_id(),
            name: new_user.name,
            email: new_user.email,
            password: Some(new_user.password),
            role: new_user.role,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        self.write_collection(&self.users_path, &users).await?;
        Ok(user.without_password())
    }

    async fn update_user(
        &self,
        id: &str,
        update: &UpdateUserRequest,
    ) -> Result<Option<User>, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.read_users().await?;
        if let Some(email) = &update.email {
            if users.iter().any(|user| user.email == *email && user.id != id) {
                return Err(AppError::Validation(
                    "User with this email already exists".into(),
                ));
            }
        }
        let user = match users.iter_mut().find(|user| user.id == id) {
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
        let updated = user.clone();
        self.write_collection(&self.users_path, &users).await?;
        Ok(Some(updated.without_password()))
    }

    async fn delete_user(&self, id: &str) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.read_users().await?;
        let before = users.len();
        users.retain(|user| user.id != id);
        if users.len() == before {
            return Ok(false);
        }
        self.write_collection(&self.users_path, &users).await?;
        Ok(true)
    }

    async fn list_tasks(&self, query: &ListQuery) -> Result<Page<Task>, AppError> {
        let users = self.read_users().await?;
        let tasks = self
            .read_tasks()
            .await?
            .into_iter()
            .map(|task| Self::populate(task, &users))
            .collect();
        Self::page_tasks(tasks, query)
    }

    async fn get_task_by_id(&self, id: &str) -> Result<Option<Task>, AppError> {
        let tasks = self.read_tasks().await?;
        let task = match tasks.into_iter().find(|task| task.id == id) {
            Some(task) => task,
            None => return Ok(None),
        };
        let users = self.read_users().await?;
        Ok(Some(Self::populate(task, &users)))
    }

    async fn create_task(
        &self,
        new_task: &CreateTaskRequest,
        created_by: &str,
    ) -> Result<Task, AppError> {
        let id = {
            let _guard = self.write_lock.lock().await;
            let mut tasks = self.read_tasks().await?;
            let now = Utc::now();
            let task = Task {
                id: Self::generate_id(),
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
            let id = task.id.clone();
            tasks.push(task);
            self.write_collection(&self.tasks_path, &tasks).await?;
            id
        };
        self.get_task_by_id(&id)
            .await?
            .ok_or_else(|| AppError::Internal("Created task vanished before read-back".into()))
    }

    async fn update_task(
        &self,
        id: &str,
        update: &UpdateTaskRequest,
    ) -> Result<Option<Task>, AppError> {
        {
            let _guard = self.write_lock.lock().await;
            let mut tasks = self.read_tasks().await?;
            let task = match tasks.iter_mut().find(|task| task.id == id) {
                Some(task) => task,
                None => return Ok(None),
            };
            task.apply_update(update);
            self.write_collection(&self.tasks_path, &tasks).await?;
        }
        self.get_task_by_id(id).await
    }

    async fn delete_task(&self, id: &str) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut tasks = self.read_tasks().await?;
        let before = tasks.len();
        tasks.retain(|task| task.id != id);
        if tasks.len() == before {
            return Ok(false);
        }
        self.write_collection(&self.tasks_path, &tasks).await?;
        Ok(true)
    }

    async fn list_tasks_by_user(
        &self,
        user_id: &str,
        query: &ListQuery,
    ) -> Result<Page<Task>, AppError> {
        let users = self.read_users().await?;
        let tasks = self
            .read_tasks()
            .await?
            .into_iter()
            .filter(|task| task.assigned_to.id() == user_id)
            .map(|task| Self::populate(task, &users))
            .collect();
        Self::page_tasks(tasks, query)
    }
}
