use std::sync::Arc;

use axum::{
    extract::{State, TypedHeader},
    headers::authorization::{Authorization, Bearer},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use db::models::Session;
use web::AppState;

use crate::error::ApiError;

async fn session_from_header(
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    state: &Arc<AppState>,
) -> Option<Session> {
    let TypedHeader(auth) = auth?;
    Session::by_token(auth.token(), &state.db_pool)
        .await
        .ok()
        .flatten()
}

/// Rejects before the handler runs; routes behind this never see an
/// unauthenticated request, so none of them can mutate anything on behalf
/// of nobody.
pub async fn auth_middleware<B>(
    State(state): State<Arc<AppState>>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request<B>,
    next: Next<B>,
) -> Result<Response, ApiError> {
    match session_from_header(auth, &state).await {
        Some(session) => {
            request.extensions_mut().insert(session);
            Ok(next.run(request).await)
        }
        None => Err(ApiError::new(
            "This method requires an authenticated user",
            StatusCode::UNAUTHORIZED,
        )),
    }
}

pub async fn optional_auth_middleware<B>(
    State(state): State<Arc<AppState>>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request<B>,
    next: Next<B>,
) -> Response {
    let session = session_from_header(auth, &state).await;
    request.extensions_mut().insert(session);
    next.run(request).await
}
