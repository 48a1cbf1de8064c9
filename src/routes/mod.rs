pub mod auth;
pub mod health;
pub mod tasks;
pub mod users;

use actix_web::web;

/// Wires every route group under the caller's scope (mounted at `/api/v1`
/// behind `AuthMiddleware` in `main`).
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health)
        .service(
            web::scope("/auth")
                .service(auth::signup)
                .service(auth::login)
                .service(auth::refresh_token)
                .service(auth::logout)
                .service(auth::profile),
        )
        .service(
            web::scope("/tasks")
                .service(tasks::get_tasks)
                .service(tasks::create_task)
                .service(tasks::get_task)
                .service(tasks::update_task)
                .service(tasks::delete_task),
        )
        .service(
            web::scope("/users")
                .service(users::get_users)
                .service(users::get_user)
                .service(users::update_user)
                .service(users::delete_user),
        );
}
