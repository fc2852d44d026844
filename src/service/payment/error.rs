#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Invalid site key")]
    Unauthorized,
    #[error("Invalid signature for invoice {0}")]
    InvalidSignature(String),
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),
    #[error("Paid amount {paid} does not match plan {plan_id}")]
    AmountMismatch { plan_id: String, paid: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("Invalid provider credentials: {0}")]
    Credentials(String),
    #[error("{provider} rejected the purchase (status {status}): {message}")]
    Rejected {
        provider: &'static str,
        status: i64,
        message: String,
    },
    #[error("{provider} request failed: {message}")]
    Provider { provider: &'static str, message: String },
    #[error("{0} did not answer in time")]
    ProviderTimeout(&'static str),
    #[error("Purchase expired at {0}")]
    PurchaseExpired(chrono::DateTime<chrono::Utc>),
}

impl PaymentError {
    pub fn from_http(provider: &'static str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            PaymentError::ProviderTimeout(provider)
        } else {
            PaymentError::Provider {
                provider,
                message: error.to_string(),
            }
        }
    }
}
