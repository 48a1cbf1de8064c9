use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};

use taskdesk::auth::{AuthMiddleware, TokenService};
use taskdesk::error::AppError;
use taskdesk::rate_limit::RateLimiter;
use taskdesk::{routes, store, Config};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let db = match store::connect(&config).await {
        Ok(db) => db,
        Err(e) => {
            log::error!("Failed to initialize storage: {}", e);
            std::process::exit(1);
        }
    };

    let token_service = web::Data::new(TokenService::from_config(&config));
    let rate_limiter = RateLimiter::from_config(&config);
    let bind_addr = (config.server_host.clone(), config.server_port);
    let frontend_url = config.frontend_url.clone();
    let payload_limit = config.json_payload_limit;
    let config = web::Data::new(config);

    log::info!(
        "Starting taskdesk server at http://{}:{}",
        bind_addr.0,
        bind_addr.1
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
            .supports_credentials();

        let json_config = web::JsonConfig::default()
            .limit(payload_limit)
            .error_handler(|err, _req| {
                AppError::Validation(format!("Invalid JSON payload: {}", err)).into()
            });
        let query_config = web::QueryConfig::default().error_handler(|err, _req| {
            AppError::Validation(format!("Invalid query parameters: {}", err)).into()
        });

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(rate_limiter.clone())
            .app_data(web::Data::from(db.clone()))
            .app_data(token_service.clone())
            .app_data(config.clone())
            .app_data(json_config)
            .app_data(query_config)
            .service(
                web::scope("/api/v1")
                    .wrap(AuthMiddleware)
                    .configure(routes::config),
            )
    })
    .bind(bind_addr)?
    .run()
    .await
}
