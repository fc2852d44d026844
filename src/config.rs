use std::{str::FromStr, time::Duration};

use crate::service::{entitlement::DayPolicy, payment::HashAlgorithm};

pub const DEFAULT_ROBOKASSA_PAYMENT_URL: &str = "https://auth.robokassa.ru/Merchant/Index.aspx";
pub const DEFAULT_APPLE_VERIFY_URL: &str = "https://buy.itunes.apple.com/verifyReceipt";
pub const DEFAULT_APPLE_SANDBOX_VERIFY_URL: &str = "https://sandbox.itunes.apple.com/verifyReceipt";
pub const DEFAULT_GOOGLE_API_BASE_URL: &str = "https://androidpublisher.googleapis.com";
pub const DEFAULT_SUBSCRIPTION_SITE_URL: &str = "https://premium.example.com/subscribe";
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing {0}")]
    Missing(&'static str),
    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub payment: PaymentConfig,
    pub entitlement: DayPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageConfig {
    Turso { url: String, token: String },
    Memory,
}

/// Every integration is off until its secret is provided.
#[derive(Clone, Debug, Default)]
pub struct PaymentConfig {
    pub site_api_key: Option<String>,
    pub subscription_site_url: String,
    pub provider_timeout: Duration,
    pub robokassa: RobokassaConfig,
    pub apple: AppleConfig,
    pub google: GoogleConfig,
}

#[derive(Clone, Debug, Default)]
pub struct RobokassaConfig {
    pub merchant_login: Option<String>,
    /// Signs outgoing payment links.
    pub password1: Option<String>,
    /// Verifies result notifications.
    pub password2: Option<String>,
    pub hash_algorithm: HashAlgorithm,
    pub test_mode: bool,
    pub payment_url: String,
}

#[derive(Clone, Debug, Default)]
pub struct AppleConfig {
    pub shared_secret: Option<String>,
    pub verify_url: String,
    pub sandbox_verify_url: String,
}

#[derive(Clone, Debug, Default)]
pub struct GoogleConfig {
    pub credentials_path: Option<String>,
    pub package_name: Option<String>,
    pub api_base_url: String,
}

impl GoogleConfig {
    pub fn is_enabled(&self) -> bool {
        self.credentials_path.is_some() && self.package_name.is_some()
    }
}

/// Builds the config from any key lookup: the Shuttle secret store in the server,
/// the process environment in the admin CLI.
pub fn build_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    info!("Building AppConfig...");
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let storage = match get("TURSO_URL") {
        Some(url) => StorageConfig::Turso {
            url,
            token: get("TURSO_TOKEN").ok_or(ConfigError::Missing("TURSO_TOKEN"))?,
        },
        None => StorageConfig::Memory,
    };

    let defaults = DayPolicy::default();
    let entitlement = DayPolicy {
        default_days: parse_or("ENTITLEMENT_DEFAULT_DAYS", get("ENTITLEMENT_DEFAULT_DAYS"), defaults.default_days)?,
        max_days: parse_or("ENTITLEMENT_MAX_DAYS", get("ENTITLEMENT_MAX_DAYS"), defaults.max_days)?,
    };
    if entitlement.max_days == 0 {
        return Err(ConfigError::Invalid {
            key: "ENTITLEMENT_MAX_DAYS",
            reason: "must be at least 1".to_string(),
        });
    }

    let payment = PaymentConfig {
        site_api_key: get("SITE_API_KEY"),
        subscription_site_url: get("SUBSCRIPTION_SITE_URL")
            .unwrap_or_else(|| DEFAULT_SUBSCRIPTION_SITE_URL.to_string()),
        provider_timeout: Duration::from_secs(parse_or(
            "PROVIDER_TIMEOUT_SECS",
            get("PROVIDER_TIMEOUT_SECS"),
            DEFAULT_PROVIDER_TIMEOUT_SECS,
        )?),
        robokassa: RobokassaConfig {
            merchant_login: get("ROBOKASSA_MERCHANT_LOGIN"),
            password1: get("ROBOKASSA_PASSWORD1"),
            password2: get("ROBOKASSA_PASSWORD2"),
            hash_algorithm: parse_or(
                "ROBOKASSA_HASH_ALGORITHM",
                get("ROBOKASSA_HASH_ALGORITHM"),
                HashAlgorithm::Md5,
            )?,
            test_mode: parse_or("ROBOKASSA_TEST_MODE", get("ROBOKASSA_TEST_MODE"), false)?,
            payment_url: get("ROBOKASSA_PAYMENT_URL").unwrap_or_else(|| DEFAULT_ROBOKASSA_PAYMENT_URL.to_string()),
        },
        apple: AppleConfig {
            shared_secret: get("APPLE_SHARED_SECRET"),
            verify_url: get("APPLE_VERIFY_URL").unwrap_or_else(|| DEFAULT_APPLE_VERIFY_URL.to_string()),
            sandbox_verify_url: get("APPLE_SANDBOX_VERIFY_URL")
                .unwrap_or_else(|| DEFAULT_APPLE_SANDBOX_VERIFY_URL.to_string()),
        },
        google: GoogleConfig {
            credentials_path: get("GOOGLE_CREDENTIALS_PATH"),
            package_name: get("ANDROID_PACKAGE_NAME"),
            api_base_url: get("GOOGLE_API_BASE_URL").unwrap_or_else(|| DEFAULT_GOOGLE_API_BASE_URL.to_string()),
        },
    };

    url::Url::parse(&payment.subscription_site_url).map_err(|e| ConfigError::Invalid {
        key: "SUBSCRIPTION_SITE_URL",
        reason: e.to_string(),
    })?;

    if payment.site_api_key.is_none() {
        warn!("SITE_API_KEY is not set, demo grants are disabled");
    }
    if payment.robokassa.password2.is_none() {
        warn!("ROBOKASSA_PASSWORD2 is not set, payment notifications will be rejected");
    }
    if payment.apple.shared_secret.is_none() {
        warn!("APPLE_SHARED_SECRET is not set, App Store verification is disabled");
    }
    if !payment.google.is_enabled() {
        warn!("Google Play credentials are not set, Google Play verification is disabled");
    }

    info!("AppConfig built");
    Ok(AppConfig {
        storage,
        payment,
        entitlement,
    })
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match raw {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        build_config(|key| map.get(key).cloned())
    }

    #[test]
    fn test_empty_config_disables_every_integration() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.storage, StorageConfig::Memory);
        assert!(config.payment.site_api_key.is_none());
        assert!(config.payment.robokassa.password1.is_none());
        assert!(config.payment.robokassa.password2.is_none());
        assert!(config.payment.apple.shared_secret.is_none());
        assert!(!config.payment.google.is_enabled());
        assert_eq!(config.payment.robokassa.hash_algorithm, HashAlgorithm::Md5);
        assert_eq!(config.payment.subscription_site_url, DEFAULT_SUBSCRIPTION_SITE_URL);
        assert_eq!(config.payment.apple.verify_url, DEFAULT_APPLE_VERIFY_URL);
        assert_eq!(config.payment.provider_timeout, Duration::from_secs(15));
        assert_eq!(config.entitlement, DayPolicy::default());
    }

    #[test]
    fn test_full_config() {
        let config = config_from(&[
            ("TURSO_URL", "libsql://premium.turso.io"),
            ("TURSO_TOKEN", "token"),
            ("SITE_API_KEY", "site-key"),
            ("ROBOKASSA_MERCHANT_LOGIN", "demo-shop"),
            ("ROBOKASSA_PASSWORD1", "pass1"),
            ("ROBOKASSA_PASSWORD2", "pass2"),
            ("ROBOKASSA_HASH_ALGORITHM", "sha256"),
            ("ROBOKASSA_TEST_MODE", "true"),
            ("APPLE_SHARED_SECRET", "apple-secret"),
            ("GOOGLE_CREDENTIALS_PATH", "/run/secrets/google.json"),
            ("ANDROID_PACKAGE_NAME", "com.example.finance"),
            ("PROVIDER_TIMEOUT_SECS", "5"),
            ("ENTITLEMENT_MAX_DAYS", "400"),
        ])
        .unwrap();

        assert_eq!(
            config.storage,
            StorageConfig::Turso {
                url: "libsql://premium.turso.io".to_string(),
                token: "token".to_string()
            }
        );
        assert_eq!(config.payment.site_api_key.as_deref(), Some("site-key"));
        assert_eq!(config.payment.robokassa.hash_algorithm, HashAlgorithm::Sha256);
        assert!(config.payment.robokassa.test_mode);
        assert!(config.payment.google.is_enabled());
        assert_eq!(config.payment.provider_timeout, Duration::from_secs(5));
        assert_eq!(config.entitlement.max_days, 400);
        assert_eq!(config.entitlement.default_days, 30);
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let config = config_from(&[("SITE_API_KEY", "   "), ("APPLE_SHARED_SECRET", "")]).unwrap();
        assert!(config.payment.site_api_key.is_none());
        assert!(config.payment.apple.shared_secret.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("PROVIDER_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::Invalid {
                key: "PROVIDER_TIMEOUT_SECS",
                ..
            })
        ));
        assert!(matches!(
            config_from(&[("ROBOKASSA_HASH_ALGORITHM", "crc32")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            config_from(&[("ENTITLEMENT_MAX_DAYS", "0")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            config_from(&[("SUBSCRIPTION_SITE_URL", "not a url")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            config_from(&[("TURSO_URL", "libsql://premium.turso.io")]),
            Err(ConfigError::Missing("TURSO_TOKEN"))
        ));
    }
}
