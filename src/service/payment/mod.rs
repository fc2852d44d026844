mod apple;
mod error;
mod google;
mod model;
mod robokassa;
pub mod signature;

pub use apple::{select_latest_transaction, AppleReceiptClient, AppleTransaction, VerifyReceiptResponse};
pub use error::PaymentError;
pub use google::{GooglePlayClient, ServiceAccountKey, SubscriptionPurchase};
pub use model::*;
pub use robokassa::{ResultNotification, RobokassaGateway, RobokassaReply, PLAN_ID_PARAM, USER_ID_PARAM};
pub use signature::HashAlgorithm;

use async_trait::async_trait;
use chrono::Utc;
use std::{collections::HashMap, sync::Arc};

use crate::config::PaymentConfig;

use super::{
    entitlement::{
        DayCount, EntitlementService, GrantOutcome, GrantSource, Store, StoreActivation, StoreCorrelation,
    },
    http,
    plan::{Plan, PlanCatalog},
    ServiceError,
};

/// App Store receipt validation.
#[async_trait]
pub trait ReceiptVerifier: Send + Sync {
    async fn verify_receipt(&self, receipt: &str) -> Result<VerifiedPurchase, PaymentError>;
}

/// Google Play purchase token validation.
#[async_trait]
pub trait PurchaseTokenVerifier: Send + Sync {
    async fn verify_purchase(&self, product_id: &str, purchase_token: &str) -> Result<VerifiedPurchase, PaymentError>;
}

/// Authenticates payment events and turns each valid one into exactly one entitlement change.
#[derive(Clone)]
pub struct PaymentService {
    site_api_key: Option<String>,
    subscription_site_url: String,
    plans: PlanCatalog,
    entitlement: EntitlementService,
    robokassa: RobokassaGateway,
    apple: Option<Arc<dyn ReceiptVerifier>>,
    google: Option<Arc<dyn PurchaseTokenVerifier>>,
}

impl PaymentService {
    pub fn new(config: &PaymentConfig, plans: PlanCatalog, entitlement: EntitlementService) -> Result<Self, PaymentError> {
        info!("Initializing payment service");

        let client = http::create_client(config.provider_timeout).map_err(|e| PaymentError::Provider {
            provider: "HTTP client",
            message: e.to_string(),
        })?;

        let apple: Option<Arc<dyn ReceiptVerifier>> = match config.apple.shared_secret {
            Some(_) => Some(Arc::new(AppleReceiptClient::new(client.clone(), config.apple.clone())?)),
            None => None,
        };
        let google: Option<Arc<dyn PurchaseTokenVerifier>> = if config.google.is_enabled() {
            Some(Arc::new(GooglePlayClient::new(client, config.google.clone())?))
        } else {
            None
        };

        Ok(Self {
            site_api_key: config.site_api_key.clone(),
            subscription_site_url: config.subscription_site_url.clone(),
            plans,
            entitlement,
            robokassa: RobokassaGateway::new(config.robokassa.clone()),
            apple,
            google,
        })
    }

    pub fn with_receipt_verifier(mut self, verifier: Arc<dyn ReceiptVerifier>) -> Self {
        self.apple = Some(verifier);
        self
    }

    pub fn with_purchase_verifier(mut self, verifier: Arc<dyn PurchaseTokenVerifier>) -> Self {
        self.google = Some(verifier);
        self
    }

    pub fn list_plans(&self) -> &'static [Plan] {
        self.plans.list()
    }

    pub fn site_url(&self) -> &str {
        &self.subscription_site_url
    }

    fn plan(&self, plan_id: &str) -> Result<&'static Plan, PaymentError> {
        self.plans
            .get(plan_id.trim())
            .ok_or_else(|| PaymentError::UnknownPlan(plan_id.to_string()))
    }

    /// Site API key check. A missing key disables the feature rather than falling back to a default.
    pub fn authorize_site_key(&self, presented: Option<&str>) -> Result<(), PaymentError> {
        let expected = self
            .site_api_key
            .as_deref()
            .ok_or(PaymentError::NotConfigured("Site API key"))?;

        match presented {
            Some(key) if signature::constant_time_eq(key.trim().as_bytes(), expected.as_bytes()) => Ok(()),
            _ => Err(PaymentError::Unauthorized),
        }
    }

    pub async fn demo_grant(
        &self,
        site_key: Option<&str>,
        identifier: &str,
        plan_id: &str,
    ) -> Result<DemoGrantResponse, ServiceError> {
        self.authorize_site_key(site_key)?;
        let plan = self.plan(plan_id)?;
        let user = self.entitlement.resolve_user(identifier).await?;

        let days = DayCount::from_months(plan.duration_months, self.entitlement.policy());
        let outcome = self
            .entitlement
            .grant(user.id, days, GrantSource::internal(Some(plan.id.to_string())))
            .await?;

        info!("Demo grant of plan {} to user {}", plan.id, user.id);
        Ok(DemoGrantResponse {
            success: true,
            user_id: outcome.user_id,
            plan_id: plan.id.to_string(),
            days: outcome.days,
        })
    }

    pub async fn checkout_url(&self, user_id: i64, plan_id: &str) -> Result<CheckoutLink, ServiceError> {
        let plan = self.plan(plan_id)?;
        self.entitlement.find_user(user_id).await?;

        let invoice_id = RobokassaGateway::new_invoice_id();
        let url = self.robokassa.payment_url(user_id, plan, invoice_id)?;
        info!("Created checkout invoice {} for user {} plan {}", invoice_id, user_id, plan.id);

        Ok(CheckoutLink {
            url,
            invoice_id,
            plan_id: plan.id.to_string(),
        })
    }

    /// Never fails: Robokassa only understands `OK<InvId>` and `FAIL`.
    pub async fn robokassa_result(&self, params: &HashMap<String, String>) -> RobokassaReply {
        match self.process_robokassa_result(params).await {
            Ok(inv_id) => RobokassaReply::Ok(inv_id),
            Err(e) => {
                warn!("Rejected Robokassa notification: {}", e);
                RobokassaReply::Fail
            }
        }
    }

    async fn process_robokassa_result(&self, params: &HashMap<String, String>) -> Result<String, ServiceError> {
        let notification = ResultNotification::from_params(params)?;
        self.robokassa.verify_result(&notification)?;

        let plan = self.plan(notification.plan_id()?)?;
        if !plan.matches_amount(&notification.out_sum) {
            return Err(PaymentError::AmountMismatch {
                plan_id: plan.id.to_string(),
                paid: notification.out_sum.clone(),
            }
            .into());
        }
        let user_id = notification.user_id()?;

        let days = DayCount::from_months(plan.duration_months, self.entitlement.policy());
        let mut source = GrantSource::internal(Some(plan.id.to_string()));
        if let Some(event_key) = notification.event_key(user_id, plan.id) {
            source = source.with_event_key(event_key);
        }

        let GrantOutcome { duplicate, .. } = self.entitlement.grant(user_id, days, source).await?;
        if duplicate {
            info!("Invoice {} was already credited", notification.inv_id);
        } else {
            info!(
                "Robokassa invoice {} credited {} days of {} to user {}",
                notification.inv_id, days, plan.id, user_id
            );
        }

        Ok(notification.inv_id)
    }

    pub async fn apple_verify(
        &self,
        user_id: i64,
        receipt: &str,
        original_transaction_id: Option<&str>,
    ) -> Result<StoreVerifyResponse, ServiceError> {
        let receipt = receipt.trim();
        if receipt.is_empty() {
            return Err(PaymentError::InvalidRequest("Missing receipt".to_string()).into());
        }
        let verifier = self
            .apple
            .as_ref()
            .ok_or(PaymentError::NotConfigured("App Store verification"))?;
        self.entitlement.find_user(user_id).await?;

        let purchase = verifier.verify_receipt(receipt).await?;

        if let (Some(expected), StoreCorrelation::AppleOriginalTransaction(actual)) =
            (original_transaction_id.map(str::trim).filter(|id| !id.is_empty()), &purchase.correlation)
        {
            if expected != actual.as_str() {
                return Err(PaymentError::InvalidRequest(format!(
                    "Receipt belongs to transaction {}, not {}",
                    actual, expected
                ))
                .into());
            }
        }

        self.activate(user_id, Store::Apple, purchase).await
    }

    pub async fn google_verify(
        &self,
        user_id: i64,
        purchase_token: &str,
        product_id: &str,
    ) -> Result<StoreVerifyResponse, ServiceError> {
        let (purchase_token, product_id) = (purchase_token.trim(), product_id.trim());
        if purchase_token.is_empty() || product_id.is_empty() {
            return Err(PaymentError::InvalidRequest("Missing purchaseToken or productId".to_string()).into());
        }
        let verifier = self
            .google
            .as_ref()
            .ok_or(PaymentError::NotConfigured("Google Play verification"))?;
        self.entitlement.find_user(user_id).await?;

        let purchase = verifier.verify_purchase(product_id, purchase_token).await?;
        self.activate(user_id, Store::Google, purchase).await
    }

    async fn activate(
        &self,
        user_id: i64,
        store: Store,
        purchase: VerifiedPurchase,
    ) -> Result<StoreVerifyResponse, ServiceError> {
        if purchase.expires_at <= Utc::now() {
            warn!(
                "{} purchase {} for user {} expired at {}",
                store, purchase.product_id, user_id, purchase.expires_at
            );
            return Err(PaymentError::PurchaseExpired(purchase.expires_at).into());
        }

        let outcome = self
            .entitlement
            .activate_store_subscription(
                user_id,
                StoreActivation {
                    store,
                    product_id: purchase.product_id,
                    expires_at: purchase.expires_at,
                    correlation: Some(purchase.correlation),
                },
            )
            .await?;

        Ok(StoreVerifyResponse {
            success: true,
            store: outcome.store,
            product_id: outcome.product_id,
            premium_until: outcome.premium_until,
        })
    }
}
