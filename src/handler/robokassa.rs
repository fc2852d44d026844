use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, RawQuery, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;

use crate::{
    service::{payment::CheckoutLink, ServiceError},
    state::AppState,
};

use super::{extract::UserId, response::json_body};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments/robokassa/checkout", post(checkout))
        .route("/payments/robokassa/result", post(result).get(result))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest {
    plan_id: String,
}

async fn checkout(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutLink>, ServiceError> {
    let body = json_body(payload)?;
    let link = state.services.payment.checkout_url(user_id, &body.plan_id).await?;
    Ok(Json(link))
}

/// Result URL callback. Accepts the query string and a form body; body fields win.
async fn result(State(state): State<AppState>, RawQuery(query): RawQuery, body: Bytes) -> impl IntoResponse {
    let mut params: HashMap<String, String> = query
        .as_deref()
        .map(|query| url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    params.extend(url::form_urlencoded::parse(&body).into_owned());

    let reply = state.services.payment.robokassa_result(&params).await;
    let status = if reply.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    (status, reply.to_string())
}
