use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use url::Url;

use crate::{config::GoogleConfig, service::entitlement::StoreCorrelation};

use super::{error::PaymentError, model::VerifiedPurchase, PurchaseTokenVerifier};

const PROVIDER: &str = "Google Play";
const SCOPE: &str = "https://www.googleapis.com/auth/androidpublisher";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before Google says they expire.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// The fields of a service account JSON key this client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// `purchases.subscriptions` resource of the Android Publisher API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPurchase {
    /// Epoch millis, sent as a string.
    pub expiry_time_millis: String,
    #[serde(default)]
    pub start_time_millis: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub payment_state: Option<i64>,
    #[serde(default)]
    pub auto_renewing: Option<bool>,
}

impl SubscriptionPurchase {
    pub fn expires_at(&self) -> Result<DateTime<Utc>, PaymentError> {
        self.expiry_time_millis
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| PaymentError::Provider {
                provider: PROVIDER,
                message: format!("Invalid expiryTimeMillis: {}", self.expiry_time_millis),
            })
    }
}

/// Verifies subscription purchase tokens with a service account. The key file is read on first use.
pub struct GooglePlayClient {
    client: Client,
    credentials_path: String,
    package_name: String,
    api_base_url: String,
    key: OnceCell<ServiceAccountKey>,
    token: Mutex<Option<CachedToken>>,
}

impl GooglePlayClient {
    pub fn new(client: Client, config: GoogleConfig) -> Result<Self, PaymentError> {
        let (credentials_path, package_name) = match (config.credentials_path, config.package_name) {
            (Some(path), Some(package)) => (path, package),
            _ => return Err(PaymentError::NotConfigured("Google Play verification")),
        };

        Ok(Self {
            client,
            credentials_path,
            package_name,
            api_base_url: config.api_base_url,
            key: OnceCell::new(),
            token: Mutex::new(None),
        })
    }

    async fn service_account_key(&self) -> Result<&ServiceAccountKey, PaymentError> {
        self.key
            .get_or_try_init(|| async {
                info!("Loading Google service account key from {}", self.credentials_path);
                let raw = tokio::fs::read_to_string(&self.credentials_path)
                    .await
                    .map_err(|e| PaymentError::Credentials(format!("{}: {}", self.credentials_path, e)))?;
                serde_json::from_str::<ServiceAccountKey>(&raw)
                    .map_err(|e| PaymentError::Credentials(format!("{}: {}", self.credentials_path, e)))
            })
            .await
    }

    fn sign_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String, PaymentError> {
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: SCOPE,
            aud: &key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| PaymentError::Credentials(format!("Invalid private key: {}", e)))?;

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| PaymentError::Credentials(format!("Failed to sign assertion: {}", e)))
    }

    async fn access_token(&self) -> Result<String, PaymentError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at > now {
                return Ok(token.value.clone());
            }
        }

        let key = self.service_account_key().await?;
        let assertion = Self::sign_assertion(key, now)?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| PaymentError::from_http(PROVIDER, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Google token exchange failed with {}: {}", status, body);
            return Err(PaymentError::Credentials(format!("Token exchange failed with {}", status)));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| PaymentError::from_http(PROVIDER, e))?;

        let lifetime = token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS) - TOKEN_REFRESH_MARGIN_SECS;
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + Duration::seconds(lifetime.max(0)),
        });

        Ok(token.access_token)
    }

    fn purchase_url(&self, product_id: &str, purchase_token: &str) -> Result<Url, PaymentError> {
        let mut url = Url::parse(&self.api_base_url).map_err(|e| PaymentError::Provider {
            provider: PROVIDER,
            message: format!("Invalid API base URL: {}", e),
        })?;

        url.path_segments_mut()
            .map_err(|_| PaymentError::Provider {
                provider: PROVIDER,
                message: "API base URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend([
                "androidpublisher",
                "v3",
                "applications",
                self.package_name.as_str(),
                "purchases",
                "subscriptions",
                product_id,
                "tokens",
                purchase_token,
            ]);

        Ok(url)
    }

    pub async fn get_subscription(
        &self,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<SubscriptionPurchase, PaymentError> {
        let url = self.purchase_url(product_id, purchase_token)?;
        let access_token = self.access_token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| PaymentError::from_http(PROVIDER, e))?;

        let status = response.status();
        match status {
            s if s.is_success() => response
                .json::<SubscriptionPurchase>()
                .await
                .map_err(|e| PaymentError::from_http(PROVIDER, e)),
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::GONE => {
                let body = response.text().await.unwrap_or_default();
                warn!("Google Play rejected purchase token with {}: {}", status, body);
                Err(PaymentError::Rejected {
                    provider: PROVIDER,
                    status: i64::from(status.as_u16()),
                    message: "the purchase token is not valid for this product".to_string(),
                })
            }
            StatusCode::UNAUTHORIZED => {
                // Drop the cached token so the next call signs a fresh one
                *self.token.lock().await = None;
                Err(PaymentError::Credentials("Access token was rejected".to_string()))
            }
            _ => Err(PaymentError::Provider {
                provider: PROVIDER,
                message: format!("HTTP {}", status),
            }),
        }
    }
}

#[async_trait]
impl PurchaseTokenVerifier for GooglePlayClient {
    async fn verify_purchase(&self, product_id: &str, purchase_token: &str) -> Result<VerifiedPurchase, PaymentError> {
        let purchase = self.get_subscription(product_id, purchase_token).await?;
        let expires_at = purchase.expires_at()?;

        debug!(
            "Google Play purchase {} for {} expires at {}",
            purchase.order_id.as_deref().unwrap_or("-"),
            product_id,
            expires_at
        );

        Ok(VerifiedPurchase {
            product_id: product_id.to_string(),
            expires_at,
            correlation: StoreCorrelation::GooglePurchaseToken(purchase_token.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> GooglePlayClient {
        GooglePlayClient::new(
            Client::new(),
            GoogleConfig {
                credentials_path: Some("/nonexistent/google.json".to_string()),
                package_name: Some("com.example.finance".to_string()),
                api_base_url: base.to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_purchase_url() {
        let url = client("https://androidpublisher.googleapis.com")
            .purchase_url("premium_monthly", "abc.def-ghi")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://androidpublisher.googleapis.com/androidpublisher/v3/applications/com.example.finance/purchases/subscriptions/premium_monthly/tokens/abc.def-ghi"
        );

        // Path separators in caller input are escaped
        let url = client("http://127.0.0.1:9000/").purchase_url("premium", "a/b").unwrap();
        assert!(url.path().ends_with("/tokens/a%2Fb"));
    }

    #[test]
    fn test_expiry_parsing() {
        let purchase: SubscriptionPurchase =
            serde_json::from_str(r#"{"expiryTimeMillis":"1767225600000","paymentState":1}"#).unwrap();
        assert_eq!(purchase.expires_at().unwrap().timestamp_millis(), 1_767_225_600_000);

        let purchase: SubscriptionPurchase = serde_json::from_str(r#"{"expiryTimeMillis":"soon"}"#).unwrap();
        assert!(purchase.expires_at().is_err());
    }

    #[test]
    fn test_client_requires_config() {
        let result = GooglePlayClient::new(
            Client::new(),
            GoogleConfig {
                credentials_path: None,
                package_name: Some("com.example.finance".to_string()),
                api_base_url: String::new(),
            },
        );
        assert!(matches!(result, Err(PaymentError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_missing_key_file_is_a_credentials_error() {
        let result = client("http://127.0.0.1:9").verify_purchase("premium", "token").await;
        assert!(matches!(result, Err(PaymentError::Credentials(_))));
    }
}
