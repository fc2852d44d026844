mod extract;
mod plans;
mod response;
mod robokassa;
mod subscription;

pub use extract::{SiteKey, UserId, SITE_KEY_HEADER, USER_ID_HEADER};

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(plans::router())
        .merge(subscription::router())
        .merge(robokassa::router())
        .with_state(state)
}
