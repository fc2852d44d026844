use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::service::entitlement::{DayCount, Store, StoreCorrelation};

/// What a store verification endpoint vouched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPurchase {
    pub product_id: String,
    pub expires_at: DateTime<Utc>,
    pub correlation: StoreCorrelation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoGrantResponse {
    pub success: bool,
    pub user_id: i64,
    pub plan_id: String,
    pub days: DayCount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreVerifyResponse {
    pub success: bool,
    pub store: Store,
    pub product_id: String,
    pub premium_until: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLink {
    pub url: String,
    pub invoice_id: u32,
    pub plan_id: String,
}
