use crate::{
    auth::{hash_password, verify_password, Identity, TokenService},
    config::Config,
    error::AppError,
    models::{ApiResponse, LoginRequest, SignupRequest, UserRole},
    store::{Database, NewUser},
};
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use serde_json::json;
use validator::Validate;

const REFRESH_COOKIE: &str = "refreshToken";

/// The refresh token travels only as an http-only cookie, never in response
/// bodies consumed by scripts beyond the initial issue.
fn refresh_cookie(token: &str, config: &Config) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, token.to_string())
        .path("/")
        .http_only(true)
        .secure(config.production)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(config.refresh_token_ttl_secs))
        .finish()
}

/// Register a new account and sign the user in.
#[post("/signup")]
pub async fn signup(
    db: web::Data<dyn Database>,
    tokens: web::Data<TokenService>,
    config: web::Data<Config>,
    payload: web::Json<SignupRequest>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    if db
        .get_user_by_email_with_password(&payload.email)
        .await?
        .is_some()
    {
        return Err(AppError::Validation(
            "User with this email already exists".into(),
        ));
    }

    let password = hash_password(&payload.password)?;
    let user = db
        .create_user(NewUser {
            name: payload.name.clone(),
            email: payload.email.clone(),
            password,
            role: UserRole::User,
        })
        .await?;

    let pair = tokens.issue_tokens(&user)?;
    Ok(HttpResponse::Created()
        .cookie(refresh_cookie(&pair.refresh_token, &config))
        .json(ApiResponse::ok("User created successfully", pair)))
}

/// Authenticate with email and password.
///
/// A wrong password and an unknown email produce byte-identical 401
/// responses so the endpoint does not reveal which emails exist.
#[post("/login")]
pub async fn login(
    db: web::Data<dyn Database>,
    tokens: web::Data<TokenService>,
    config: web::Data<Config>,
    payload: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let user = db.get_user_by_email_with_password(&payload.email).await?;
    let user = match user {
        Some(user) => user,
        None => return Err(AppError::Unauthorized("Invalid email or password".into())),
    };

    let hash = user.password.as_deref().unwrap_or("");
    if hash.is_empty() || !verify_password(&payload.password, hash)? {
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }

    let pair = tokens.issue_tokens(&user)?;
    Ok(HttpResponse::Ok()
        .cookie(refresh_cookie(&pair.refresh_token, &config))
        .json(ApiResponse::ok("Login successful", pair)))
}

/// Exchange the refresh cookie for a fresh access token.
#[post("/refresh-token")]
pub async fn refresh_token(
    req: HttpRequest,
    db: web::Data<dyn Database>,
    tokens: web::Data<TokenService>,
) -> Result<impl Responder, AppError> {
    let cookie = req
        .cookie(REFRESH_COOKIE)
        .ok_or_else(|| AppError::Unauthorized("Refresh token not provided".into()))?;

    let user_id = tokens.verify_refresh(cookie.value()).map_err(|err| {
        err.log("refresh token");
        AppError::Unauthorized("Invalid refresh token".into())
    })?;

    // The account may be gone even though the token still verifies.
    let user = db
        .get_user_by_id(&user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;

    let access_token = tokens.issue_access_token(&user.id)?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        "Token refreshed successfully",
        json!({ "accessToken": access_token }),
    )))
}

/// Drop the refresh cookie. Succeeds whether or not one was present.
#[post("/logout")]
pub async fn logout() -> impl Responder {
    let mut cookie = Cookie::build(REFRESH_COOKIE, "")
        .path("/")
        .http_only(true)
        .finish();
    cookie.make_removal();
    HttpResponse::Ok()
        .cookie(cookie)
        .json(ApiResponse::message("Logout successful"))
}

/// The authenticated user's own record, password never included.
#[get("/profile")]
pub async fn profile(identity: Identity) -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::ok(
        "Profile retrieved successfully",
        identity.0.without_password(),
    ))
}
