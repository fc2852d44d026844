use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{config::AppleConfig, service::entitlement::StoreCorrelation};

use super::{error::PaymentError, model::VerifiedPurchase, ReceiptVerifier};

const PROVIDER: &str = "App Store";

pub const STATUS_OK: i64 = 0;
/// A sandbox receipt was sent to the production endpoint.
pub const STATUS_SANDBOX_RECEIPT: i64 = 21007;

#[derive(Debug, Serialize)]
struct VerifyReceiptRequest<'a> {
    #[serde(rename = "receipt-data")]
    receipt_data: &'a str,
    password: &'a str,
    #[serde(rename = "exclude-old-transactions")]
    exclude_old_transactions: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyReceiptResponse {
    pub status: i64,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub latest_receipt_info: Vec<AppleTransaction>,
    #[serde(default)]
    pub receipt: Option<AppleReceipt>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppleReceipt {
    #[serde(default)]
    pub in_app: Vec<AppleTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppleTransaction {
    pub product_id: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub original_transaction_id: Option<String>,
    /// Epoch millis, sent as a string.
    #[serde(default)]
    pub expires_date_ms: Option<String>,
}

impl AppleTransaction {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_date_ms
            .as_deref()
            .and_then(|ms| ms.trim().parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
    }
}

/// Latest expiry wins. `latest_receipt_info` is authoritative for subscriptions; older receipts only
/// carry `receipt.in_app`.
pub fn select_latest_transaction(response: &VerifyReceiptResponse) -> Option<&AppleTransaction> {
    let transactions = if response.latest_receipt_info.is_empty() {
        response.receipt.as_ref().map(|r| r.in_app.as_slice()).unwrap_or_default()
    } else {
        response.latest_receipt_info.as_slice()
    };

    transactions
        .iter()
        .filter_map(|tx| tx.expires_at().map(|expires| (expires, tx)))
        .max_by_key(|(expires, _)| *expires)
        .map(|(_, tx)| tx)
}

fn status_message(status: i64) -> &'static str {
    match status {
        21000 => "the request to the App Store was malformed",
        21002 => "the receipt data was malformed",
        21003 => "the receipt could not be authenticated",
        21004 => "the shared secret does not match",
        21005 => "the receipt server is unavailable",
        21006 => "the subscription has expired",
        21008 => "a production receipt was sent to the sandbox",
        21009 => "internal data access error",
        21010 => "the user account cannot be found",
        _ => "the receipt was rejected",
    }
}

pub struct AppleReceiptClient {
    client: Client,
    config: AppleConfig,
    shared_secret: String,
}

impl AppleReceiptClient {
    pub fn new(client: Client, config: AppleConfig) -> Result<Self, PaymentError> {
        let shared_secret = config
            .shared_secret
            .clone()
            .ok_or(PaymentError::NotConfigured("App Store verification"))?;
        Ok(Self {
            client,
            config,
            shared_secret,
        })
    }

    async fn post_receipt(&self, url: &str, receipt: &str) -> Result<VerifyReceiptResponse, PaymentError> {
        let request = VerifyReceiptRequest {
            receipt_data: receipt,
            password: &self.shared_secret,
            exclude_old_transactions: true,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PaymentError::from_http(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(PaymentError::Provider {
                provider: PROVIDER,
                message: format!("HTTP {}", response.status()),
            });
        }

        response
            .json::<VerifyReceiptResponse>()
            .await
            .map_err(|e| PaymentError::from_http(PROVIDER, e))
    }

    /// Posts to production and, only on status 21007, exactly once more to the sandbox.
    pub async fn verify(&self, receipt: &str) -> Result<VerifyReceiptResponse, PaymentError> {
        let mut response = self.post_receipt(&self.config.verify_url, receipt).await?;

        if response.status == STATUS_SANDBOX_RECEIPT {
            info!("Sandbox receipt submitted to production, retrying against the sandbox");
            response = self.post_receipt(&self.config.sandbox_verify_url, receipt).await?;
        }

        if response.status != STATUS_OK {
            warn!("App Store rejected receipt with status {}", response.status);
            return Err(PaymentError::Rejected {
                provider: PROVIDER,
                status: response.status,
                message: status_message(response.status).to_string(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ReceiptVerifier for AppleReceiptClient {
    async fn verify_receipt(&self, receipt: &str) -> Result<VerifiedPurchase, PaymentError> {
        let response = self.verify(receipt).await?;

        let latest = select_latest_transaction(&response).ok_or_else(|| PaymentError::Rejected {
            provider: PROVIDER,
            status: response.status,
            message: "the receipt has no subscription transactions".to_string(),
        })?;

        // A transaction without an expiry was filtered out above.
        let expires_at = latest.expires_at().ok_or_else(|| PaymentError::Provider {
            provider: PROVIDER,
            message: "missing expires_date_ms".to_string(),
        })?;

        let original_transaction_id = latest
            .original_transaction_id
            .clone()
            .or_else(|| latest.transaction_id.clone())
            .ok_or_else(|| PaymentError::Provider {
                provider: PROVIDER,
                message: "missing original_transaction_id".to_string(),
            })?;

        debug!(
            "App Store receipt verified in {}: {} until {}",
            response.environment.as_deref().unwrap_or("Production"),
            latest.product_id,
            expires_at
        );

        Ok(VerifiedPurchase {
            product_id: latest.product_id.clone(),
            expires_at,
            correlation: StoreCorrelation::AppleOriginalTransaction(original_transaction_id),
        })
    }
}
