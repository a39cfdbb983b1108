use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    handler::Handler,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use db::{
    models::{NewPost, Post, PostChange, Session},
    pagination::{Pagination, PaginationQuery},
    types::{DbId, VoteDirection},
};
use serde::{Deserialize, Serialize};
use web::{errors::AppError, AppState};

use crate::{
    auth_middleware::{auth_middleware, optional_auth_middleware},
    common::votes::{self, VoteError},
    entities::PostView,
    error::{ApiError, FieldError},
    loaders::{loaders_middleware, Loaders},
};

#[derive(Serialize)]
struct PostPage {
    posts: Vec<PostView>,
    has_more: bool,
}

#[derive(Serialize)]
struct EmptyJsonObject {}

pub async fn http_get_list(
    state: State<Arc<AppState>>,
    Query(query): Query<PaginationQuery>,
    Extension(session): Extension<Option<Session>>,
    Extension(loaders): Extension<Loaders>,
) -> Result<impl IntoResponse, AppError> {
    let pagination: Pagination = query.into();
    let (posts, has_more) = Post::list(&pagination, &state.db_pool).await?;

    let viewer = session.map(|session| session.user_id);
    let posts = PostView::build_from_vec(posts, viewer.as_ref(), &loaders).await?;

    Ok(Json(PostPage { posts, has_more }))
}

pub async fn http_get_get(
    state: State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(session): Extension<Option<Session>>,
    Extension(loaders): Extension<Loaders>,
) -> Result<impl IntoResponse, AppError> {
    let id = DbId::from(id);
    let viewer = session.map(|session| session.user_id);

    match Post::by_id(&id, &state.db_pool).await? {
        Some(post) => {
            Ok(Json(PostView::build(post, viewer.as_ref(), &loaders).await?).into_response())
        }
        None => Ok(ApiError::new("Record not found", StatusCode::NOT_FOUND).into_response()),
    }
}

#[derive(Deserialize)]
pub struct PostBody {
    title: String,
    content: String,
}

pub async fn http_post_create(
    state: State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Extension(loaders): Extension<Loaders>,
    Json(body): Json<PostBody>,
) -> Result<impl IntoResponse, AppError> {
    if body.title.trim().is_empty() {
        return Ok(ApiError::invalid_fields(
            vec![FieldError {
                field: "title",
                message: "title cannot be empty",
            }],
            StatusCode::UNPROCESSABLE_ENTITY,
        )
        .into_response());
    }

    let user = session.user(&state.db_pool).await?;
    let post = Post::create(
        &user,
        NewPost {
            title: body.title,
            content: body.content,
        },
        &state.db_pool,
    )
    .await?;

    Ok(Json(PostView::build(post, Some(&user.id), &loaders).await?).into_response())
}

pub async fn http_put_update(
    state: State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(session): Extension<Session>,
    Extension(loaders): Extension<Loaders>,
    Json(body): Json<PostBody>,
) -> Result<impl IntoResponse, AppError> {
    let id = DbId::from(id);
    let change = PostChange {
        title: body.title,
        content: body.content,
        updated: Utc::now(),
    };

    // The author filter makes editing someone else's post indistinguishable
    // from editing a post that doesn't exist.
    match Post::update_own(&id, &session.user_id, change, &state.db_pool).await? {
        Some(post) => Ok(Json(
            PostView::build(post, Some(&session.user_id), &loaders).await?,
        )
        .into_response()),
        None => Ok(ApiError::new("Record not found", StatusCode::NOT_FOUND).into_response()),
    }
}

pub async fn http_delete_delete(
    state: State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, AppError> {
    let id = DbId::from(id);

    if Post::delete_own(&id, &session.user_id, &state.db_pool).await? {
        Ok(Json(EmptyJsonObject {}).into_response())
    } else {
        Ok(ApiError::new("Record not found", StatusCode::NOT_FOUND).into_response())
    }
}

pub async fn http_post_upvote(
    state: State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(session): Extension<Session>,
    Extension(loaders): Extension<Loaders>,
) -> Result<impl IntoResponse, AppError> {
    cast_vote(state, id, session, loaders, VoteDirection::Up).await
}

pub async fn http_post_downvote(
    state: State<Arc<AppState>>,
    Path(id): Path<String>,
    Extension(session): Extension<Session>,
    Extension(loaders): Extension<Loaders>,
) -> Result<impl IntoResponse, AppError> {
    cast_vote(state, id, session, loaders, VoteDirection::Down).await
}

async fn cast_vote(
    state: State<Arc<AppState>>,
    id: String,
    session: Session,
    loaders: Loaders,
    direction: VoteDirection,
) -> Result<Response, AppError> {
    let id = DbId::from(id);

    match votes::vote(&session.user_id, &id, direction, &state.db_pool).await {
        Ok(_) => {}
        Err(VoteError::NotFound) => {
            return Ok(ApiError::new("Record not found", StatusCode::NOT_FOUND).into_response());
        }
        Err(VoteError::Store(err)) => return Err(err.into()),
    }

    // Reread after commit so the view carries the fresh points total.
    match Post::by_id(&id, &state.db_pool).await? {
        Some(post) => Ok(Json(
            PostView::build(post, Some(&session.user_id), &loaders).await?,
        )
        .into_response()),
        None => Ok(ApiError::new("Record not found", StatusCode::NOT_FOUND).into_response()),
    }
}

pub fn posts(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/v1/posts",
            get(http_get_list.layer(from_fn_with_state(
                Arc::clone(state),
                optional_auth_middleware,
            )))
            .post(http_post_create.layer(from_fn_with_state(Arc::clone(state), auth_middleware))),
        )
        .route(
            "/api/v1/posts/:id",
            get(http_get_get.layer(from_fn_with_state(
                Arc::clone(state),
                optional_auth_middleware,
            )))
            .put(http_put_update.layer(from_fn_with_state(Arc::clone(state), auth_middleware)))
            .delete(
                http_delete_delete.layer(from_fn_with_state(Arc::clone(state), auth_middleware)),
            ),
        )
        .route(
            "/api/v1/posts/:id/upvote",
            post(http_post_upvote.layer(from_fn_with_state(Arc::clone(state), auth_middleware))),
        )
        .route(
            "/api/v1/posts/:id/downvote",
            post(http_post_downvote.layer(from_fn_with_state(Arc::clone(state), auth_middleware))),
        )
        .route_layer(from_fn_with_state(Arc::clone(state), loaders_middleware))
}
