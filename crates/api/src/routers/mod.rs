pub mod auth;
pub mod posts;

use std::sync::Arc;

use axum::Router;
use web::AppState;

pub fn api(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .merge(auth::auth(&state))
        .merge(posts::posts(&state))
}
