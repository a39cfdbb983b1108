use std::sync::Arc;

use axum::{
    extract::State,
    handler::Handler,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use db::models::{NewUser, PasswordReset, Session, User};
use serde::{Deserialize, Serialize};
use web::{errors::AppError, AppState};

use crate::{
    auth_middleware::{auth_middleware, optional_auth_middleware},
    common::{email, users},
    entities::Account,
    error::{ApiError, FieldError},
};

#[derive(Serialize)]
struct AuthResponse {
    user: Account,
    token: String,
}

#[derive(Serialize)]
struct EmptyJsonObject {}

#[derive(Deserialize)]
pub struct RegisterBody {
    username: String,
    email: String,
    password: String,
}

pub async fn http_post_register(
    state: State<Arc<AppState>>,
    Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, AppError> {
    let errors = users::validate_registration(&body.username, &body.email, &body.password);
    if !errors.is_empty() {
        return Ok(
            ApiError::invalid_fields(errors, StatusCode::UNPROCESSABLE_ENTITY).into_response(),
        );
    }

    let user = match User::create(
        NewUser {
            name: body.username,
            email: body.email,
            password_encrypted: users::hash_password(&body.password)?,
        },
        &state.db_pool,
    )
    .await
    {
        Ok(user) => user,
        Err(err) if users::is_unique_violation(&err) => {
            return Ok(ApiError::invalid_fields(
                vec![FieldError {
                    field: "username",
                    message: "this username or email is already taken",
                }],
                StatusCode::CONFLICT,
            )
            .into_response());
        }
        Err(err) => return Err(err.into()),
    };

    let session = Session::create(user.id.clone(), &state.db_pool).await?;
    let user_id = user.id.clone();

    Ok(Json(AuthResponse {
        user: Account::build(user, Some(&user_id)),
        token: session.token,
    })
    .into_response())
}

#[derive(Deserialize)]
pub struct SignInBody {
    username_or_email: String,
    password: String,
}

pub async fn http_post_sign_in(
    state: State<Arc<AppState>>,
    Json(body): Json<SignInBody>,
) -> Result<impl IntoResponse, AppError> {
    let user = match User::by_name_or_email(&body.username_or_email, &state.db_pool).await? {
        Some(user) => user,
        None => {
            return Ok(ApiError::invalid_fields(
                vec![FieldError {
                    field: "username_or_email",
                    message: "that username or email doesn't exist",
                }],
                StatusCode::UNAUTHORIZED,
            )
            .into_response());
        }
    };

    if !users::verify_password(&user.password_encrypted, &body.password) {
        return Ok(ApiError::invalid_fields(
            vec![FieldError {
                field: "password",
                message: "incorrect password",
            }],
            StatusCode::UNAUTHORIZED,
        )
        .into_response());
    }

    let session = Session::create(user.id.clone(), &state.db_pool).await?;
    let user_id = user.id.clone();

    Ok(Json(AuthResponse {
        user: Account::build(user, Some(&user_id)),
        token: session.token,
    })
    .into_response())
}

pub async fn http_post_sign_out(
    state: State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, AppError> {
    session.delete(&state.db_pool).await?;
    Ok(Json(EmptyJsonObject {}))
}

pub async fn http_get_me(
    state: State<Arc<AppState>>,
    Extension(session): Extension<Option<Session>>,
) -> Result<impl IntoResponse, AppError> {
    let account = match session {
        Some(session) => {
            let user = session.user(&state.db_pool).await?;
            Some(Account::build(user, Some(&session.user_id)))
        }
        None => None,
    };

    Ok(Json(account))
}

#[derive(Deserialize)]
pub struct ForgotPasswordBody {
    email: String,
}

pub async fn http_post_forgot_password(
    state: State<Arc<AppState>>,
    Json(body): Json<ForgotPasswordBody>,
) -> Result<impl IntoResponse, AppError> {
    // Unknown addresses get the same answer as known ones; the response
    // must not leak which emails have accounts.
    if let Some(user) = User::by_email(&body.email, &state.db_pool).await? {
        let mut redis = state.redis.clone();
        let reset = PasswordReset::create(user.id.clone(), &mut redis).await?;
        email::send_email(
            &user.email,
            "Reset your password",
            &format!(
                "<a href=\"https://{}/change-password/{}\">reset password</a>",
                state.config.web.domain, reset.token
            ),
        );
    }

    Ok(Json(EmptyJsonObject {}))
}

#[derive(Deserialize)]
pub struct ChangePasswordBody {
    token: String,
    new_password: String,
}

pub async fn http_post_change_password(
    state: State<Arc<AppState>>,
    Json(body): Json<ChangePasswordBody>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(error) = users::validate_password(&body.new_password) {
        return Ok(
            ApiError::invalid_fields(vec![error], StatusCode::UNPROCESSABLE_ENTITY)
                .into_response(),
        );
    }

    let mut redis = state.redis.clone();
    let reset = match PasswordReset::by_token(&body.token, &mut redis).await? {
        Some(reset) => reset,
        None => {
            return Ok(ApiError::invalid_fields(
                vec![FieldError {
                    field: "token",
                    message: "token expired",
                }],
                StatusCode::UNAUTHORIZED,
            )
            .into_response());
        }
    };

    let user = match User::by_id(&reset.user_id, &state.db_pool).await? {
        Some(user) => user,
        None => {
            return Ok(ApiError::invalid_fields(
                vec![FieldError {
                    field: "token",
                    message: "user no longer exists",
                }],
                StatusCode::UNAUTHORIZED,
            )
            .into_response());
        }
    };

    user.update_password(users::hash_password(&body.new_password)?, &state.db_pool)
        .await?;
    reset.delete(&mut redis).await?;

    // Signing the user straight in after a reset matches the web flow.
    let session = Session::create(user.id.clone(), &state.db_pool).await?;
    let user_id = user.id.clone();

    Ok(Json(AuthResponse {
        user: Account::build(user, Some(&user_id)),
        token: session.token,
    })
    .into_response())
}

pub fn auth(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/auth/register", post(http_post_register))
        .route("/api/v1/auth/sign_in", post(http_post_sign_in))
        .route(
            "/api/v1/auth/sign_out",
            post(http_post_sign_out.layer(from_fn_with_state(Arc::clone(state), auth_middleware))),
        )
        .route(
            "/api/v1/auth/me",
            get(http_get_me.layer(from_fn_with_state(
                Arc::clone(state),
                optional_auth_middleware,
            ))),
        )
        .route(
            "/api/v1/auth/forgot_password",
            post(http_post_forgot_password),
        )
        .route(
            "/api/v1/auth/change_password",
            post(http_post_change_password),
        )
}
