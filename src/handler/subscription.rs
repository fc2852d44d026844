use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    service::{
        entitlement::EntitlementStatus,
        payment::{DemoGrantResponse, StoreVerifyResponse},
        ServiceError,
    },
    state::AppState,
};

use super::{
    extract::{SiteKey, UserId},
    response::json_body,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subscription/status", get(status))
        .route("/subscription/demo-grant", post(demo_grant))
        .route("/subscription/apple/verify", post(apple_verify))
        .route("/subscription/google/verify", post(google_verify))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    user: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DemoGrantRequest {
    #[serde(alias = "email", alias = "userId")]
    email_or_id: String,
    plan_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppleVerifyRequest {
    #[serde(alias = "receipt")]
    receipt_data: String,
    #[serde(default)]
    original_transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleVerifyRequest {
    purchase_token: String,
    product_id: String,
}

/// Site-to-site lookup, gated by the same key as demo grants.
async fn status(
    State(state): State<AppState>,
    site_key: SiteKey,
    Query(query): Query<StatusQuery>,
) -> Result<Json<EntitlementStatus>, ServiceError> {
    state.services.payment.authorize_site_key(site_key.as_deref())?;

    let entitlement = &state.services.entitlement;
    let user = entitlement.resolve_user(&query.user).await?;
    Ok(Json(entitlement.status(user.id).await?))
}

async fn demo_grant(
    State(state): State<AppState>,
    site_key: SiteKey,
    payload: Result<Json<DemoGrantRequest>, JsonRejection>,
) -> Result<Json<DemoGrantResponse>, ServiceError> {
    let body = json_body(payload)?;

    let response = state
        .services
        .payment
        .demo_grant(site_key.as_deref(), &body.email_or_id, &body.plan_id)
        .await?;
    Ok(Json(response))
}

async fn apple_verify(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    payload: Result<Json<AppleVerifyRequest>, JsonRejection>,
) -> Result<Json<StoreVerifyResponse>, ServiceError> {
    let body = json_body(payload)?;

    let response = state
        .services
        .payment
        .apple_verify(user_id, &body.receipt_data, body.original_transaction_id.as_deref())
        .await?;
    Ok(Json(response))
}

async fn google_verify(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    payload: Result<Json<GoogleVerifyRequest>, JsonRejection>,
) -> Result<Json<StoreVerifyResponse>, ServiceError> {
    let body = json_body(payload)?;

    let response = state
        .services
        .payment
        .google_verify(user_id, &body.purchase_token, &body.product_id)
        .await?;
    Ok(Json(response))
}
