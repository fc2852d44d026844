#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{collections::HashMap, sync::Arc};

use premium_billing::{
    config::{build_config, AppConfig},
    service::{
        entitlement::{DayPolicy, EntitlementService, StoreCorrelation},
        payment::{
            signature::result_signature, HashAlgorithm, PaymentError, PaymentService, PurchaseTokenVerifier,
            ReceiptVerifier, VerifiedPurchase,
        },
        plan::PlanCatalog,
    },
    storage::{EntitlementStore, MemoryStore},
};

pub const SITE_KEY: &str = "site-key";
pub const PASSWORD2: &str = "secret";
pub const SEEDED_USERS: i64 = 5;

pub fn config_with(extra: &[(&str, &str)]) -> AppConfig {
    let mut values: HashMap<String, String> = [
        ("SITE_API_KEY", SITE_KEY),
        ("ROBOKASSA_MERCHANT_LOGIN", "demo-shop"),
        ("ROBOKASSA_PASSWORD1", "pass1"),
        ("ROBOKASSA_PASSWORD2", PASSWORD2),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        values.insert(k.to_string(), v.to_string());
    }
    build_config(|key| values.get(key).cloned()).unwrap()
}

pub fn test_config() -> AppConfig {
    config_with(&[])
}

/// Users 1..=5 with emails `user<id>@example.com`.
pub async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    for id in 1..=SEEDED_USERS {
        let user = store.insert_user(Some(&format!("user{}@example.com", id))).await.unwrap();
        assert_eq!(user.id, id);
    }
    store
}

pub async fn engine() -> (MemoryStore, EntitlementService) {
    let store = seeded_store().await;
    let entitlement = EntitlementService::new(Arc::new(store.clone()), DayPolicy::default());
    (store, entitlement)
}

pub async fn payments(config: &AppConfig) -> (MemoryStore, EntitlementService, PaymentService) {
    let store = seeded_store().await;
    let entitlement = EntitlementService::new(Arc::new(store.clone()), config.entitlement);
    let payment = PaymentService::new(&config.payment, PlanCatalog::default(), entitlement.clone()).unwrap();
    (store, entitlement, payment)
}

pub fn assert_close(actual: DateTime<Utc>, expected: DateTime<Utc>) {
    let drift = (actual - expected).num_milliseconds().abs();
    assert!(drift < 5_000, "{} is not within 5s of {}", actual, expected);
}

/// Signed Robokassa result parameters.
pub fn robokassa_params(out_sum: &str, inv_id: &str, user_id: &str, plan_id: &str) -> HashMap<String, String> {
    let custom = vec![
        ("Shp_userId".to_string(), user_id.to_string()),
        ("Shp_planId".to_string(), plan_id.to_string()),
    ];
    let signature = result_signature(HashAlgorithm::Md5, out_sum, inv_id, PASSWORD2, &custom);

    let mut params: HashMap<String, String> = custom.into_iter().collect();
    params.insert("OutSum".to_string(), out_sum.to_string());
    params.insert("InvId".to_string(), inv_id.to_string());
    params.insert("SignatureValue".to_string(), signature);
    params
}

/// Answers every verification with a fixed purchase.
pub struct StubVerifier {
    pub result: Result<VerifiedPurchase, fn() -> PaymentError>,
}

impl StubVerifier {
    pub fn apple(product_id: &str, expires_at: DateTime<Utc>, original_transaction_id: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(VerifiedPurchase {
                product_id: product_id.to_string(),
                expires_at,
                correlation: StoreCorrelation::AppleOriginalTransaction(original_transaction_id.to_string()),
            }),
        })
    }

    pub fn google(product_id: &str, expires_at: DateTime<Utc>, token: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(VerifiedPurchase {
                product_id: product_id.to_string(),
                expires_at,
                correlation: StoreCorrelation::GooglePurchaseToken(token.to_string()),
            }),
        })
    }

    pub fn failing(error: fn() -> PaymentError) -> Arc<Self> {
        Arc::new(Self { result: Err(error) })
    }

    fn answer(&self) -> Result<VerifiedPurchase, PaymentError> {
        match &self.result {
            Ok(purchase) => Ok(purchase.clone()),
            Err(error) => Err(error()),
        }
    }
}

#[async_trait]
impl ReceiptVerifier for StubVerifier {
    async fn verify_receipt(&self, _receipt: &str) -> Result<VerifiedPurchase, PaymentError> {
        self.answer()
    }
}

#[async_trait]
impl PurchaseTokenVerifier for StubVerifier {
    async fn verify_purchase(&self, _product_id: &str, _purchase_token: &str) -> Result<VerifiedPurchase, PaymentError> {
        self.answer()
    }
}

pub fn days(n: i64) -> Duration {
    Duration::days(n)
}
