use crate::{
    auth::Identity,
    error::AppError,
    models::{ApiResponse, Task, UpdateUserRequest, User, UserRole},
    store::{Database, ListQuery, Page},
};
use actix_web::{delete, get, put, web, HttpResponse, Responder};
use serde::Serialize;
use validator::Validate;

/// A user plus a capped sample of the tasks currently assigned to them, as
/// returned by the admin listing and the single-user view.
#[derive(Debug, Serialize)]
pub struct UserWithTasks {
    #[serde(flatten)]
    pub user: User,
    pub tasks: Vec<Task>,
}

const EMBEDDED_TASK_LIMIT: u64 = 10;

async fn with_tasks(db: &dyn Database, user: User) -> Result<UserWithTasks, AppError> {
    let query = ListQuery {
        limit: Some(EMBEDDED_TASK_LIMIT),
        ..Default::default()
    };
    let tasks = db.list_tasks_by_user(&user.id, &query).await?;
    Ok(UserWithTasks {
        user,
        tasks: tasks.data,
    })
}

/// Paginated user listing with each user's assigned tasks embedded.
/// Admin only.
#[get("")]
pub async fn get_users(
    db: web::Data<dyn Database>,
    query: web::Query<ListQuery>,
    identity: Identity,
) -> Result<impl Responder, AppError> {
    identity.require_role(&[UserRole::Admin])?;
    query.validate()?;

    let page = db.list_users(&query).await?;
    let pagination = page.pagination.clone();
    let mut data = Vec::with_capacity(page.data.len());
    for user in page.data {
        data.push(with_tasks(db.as_ref(), user).await?);
    }

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Users retrieved successfully",
        Page { data, pagination },
    )))
}

/// Fetches one user with their assigned tasks. Any authenticated caller.
#[get("/{id}")]
pub async fn get_user(
    db: web::Data<dyn Database>,
    user_id: web::Path<String>,
    _identity: Identity,
) -> Result<impl Responder, AppError> {
    let user = db
        .get_user_by_id(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let user = with_tasks(db.as_ref(), user).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("User retrieved successfully", user)))
}

/// Updates a user's name and/or email. Admin only; role and password stay
/// out of reach of this route.
#[put("/{id}")]
pub async fn update_user(
    db: web::Data<dyn Database>,
    user_id: web::Path<String>,
    payload: web::Json<UpdateUserRequest>,
    identity: Identity,
) -> Result<impl Responder, AppError> {
    identity.require_role(&[UserRole::Admin])?;
    payload.validate()?;

    let user = db
        .update_user(&user_id, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("User updated successfully", user)))
}

/// Deletes a user. Admin only, and refused while any task is still assigned
/// to them so task references cannot be silently orphaned.
#[delete("/{id}")]
pub async fn delete_user(
    db: web::Data<dyn Database>,
    user_id: web::Path<String>,
    identity: Identity,
) -> Result<impl Responder, AppError> {
    identity.require_role(&[UserRole::Admin])?;

    let assigned = db
        .list_tasks_by_user(&user_id, &ListQuery::default())
        .await?;
    if assigned.pagination.total > 0 {
        return Err(AppError::Validation(
            "Cannot delete user with assigned tasks".into(),
        ));
    }

    if !db.delete_user(&user_id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    Ok(HttpResponse::Ok().json(ApiResponse::message("User deleted successfully")))
}
