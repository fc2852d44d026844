use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::{service::plan::Plan, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/plans", get(list_plans))
        .route("/subscription/site-url", get(site_url))
}

async fn health() -> &'static str {
    "OK"
}

async fn list_plans(State(state): State<AppState>) -> Json<&'static [Plan]> {
    Json(state.services.payment.list_plans())
}

async fn site_url(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "url": state.services.payment.site_url() }))
}
