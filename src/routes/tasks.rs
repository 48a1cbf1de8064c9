use crate::{
    auth::Identity,
    error::AppError,
    models::{
        task::validate_due_date, ApiResponse, CreateTaskRequest, UpdateTaskRequest,
    },
    store::{Database, ListQuery},
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use validator::Validate;

/// Retrieves a paginated list of tasks.
///
/// ## Query Parameters:
/// - `page` (optional, default 1), `limit` (optional, default 10, max 100)
/// - `sortBy` (optional, default `createdAt`), `sortOrder` (`asc`/`desc`)
///
/// Tasks come back with `assignedTo`/`createdBy` populated to
/// `{id, name, email}` where the referenced user still exists.
#[get("")]
pub async fn get_tasks(
    db: web::Data<dyn Database>,
    query: web::Query<ListQuery>,
    _identity: Identity,
) -> Result<impl Responder, AppError> {
    query.validate()?;
    let page = db.list_tasks(&query).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Tasks retrieved successfully", page)))
}

/// Retrieves a single task by id.
#[get("/{id}")]
pub async fn get_task(
    db: web::Data<dyn Database>,
    task_id: web::Path<String>,
    _identity: Identity,
) -> Result<impl Responder, AppError> {
    let task = db
        .get_task_by_id(&task_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Task retrieved successfully", task)))
}

/// Creates a task.
///
/// `createdBy` always comes from the caller's identity, never the payload.
/// The assignee must exist and any due date must lie in the future; both are
/// rejected as validation errors before anything reaches storage.
#[post("")]
pub async fn create_task(
    db: web::Data<dyn Database>,
    payload: web::Json<CreateTaskRequest>,
    identity: Identity,
) -> Result<impl Responder, AppError> {
    payload.validate()?;
    if let Some(due_date) = payload.due_date {
        validate_due_date(due_date)?;
    }

    if db.get_user_by_id(&payload.assigned_to).await?.is_none() {
        return Err(AppError::Validation("Assigned user not found".into()));
    }

    let task = db.create_task(&payload, &identity.user().id).await?;
    Ok(HttpResponse::Created().json(ApiResponse::ok("Task created successfully", task)))
}

/// Updates a task. Only its creator or an admin may do so; a reassignment
/// re-validates that the new assignee exists.
#[put("/{id}")]
pub async fn update_task(
    db: web::Data<dyn Database>,
    task_id: web::Path<String>,
    payload: web::Json<UpdateTaskRequest>,
    identity: Identity,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let existing = db
        .get_task_by_id(&task_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;

    if !existing.can_be_modified_by(identity.user()) {
        return Err(AppError::Forbidden(
            "Not authorized to update this task".into(),
        ));
    }

    if let Some(assigned_to) = &payload.assigned_to {
        if db.get_user_by_id(assigned_to).await?.is_none() {
            return Err(AppError::Validation("Assigned user not found".into()));
        }
    }
    // Setting a due date must point at the future; clearing one is free.
    if let Some(Some(due_date)) = payload.due_date {
        validate_due_date(due_date)?;
    }

    let task = db
        .update_task(&task_id, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("Task updated successfully", task)))
}

/// Deletes a task, under the same creator-or-admin rule as updates.
#[delete("/{id}")]
pub async fn delete_task(
    db: web::Data<dyn Database>,
    task_id: web::Path<String>,
    identity: Identity,
) -> Result<impl Responder, AppError> {
    let task = db
        .get_task_by_id(&task_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;

    if !task.can_be_modified_by(identity.user()) {
        return Err(AppError::Forbidden(
            "Not authorized to delete this task".into(),
        ));
    }

    if !db.delete_task(&task_id).await? {
        return Err(AppError::NotFound("Task not found".into()));
    }
    Ok(HttpResponse::Ok().json(ApiResponse::message("Task deleted successfully")))
}
