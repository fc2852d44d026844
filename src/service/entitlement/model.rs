use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntitlementError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: Option<String>,
    pub premium_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    None,
    Active,
}

/// The payment rail that issued a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Store {
    Internal,
    Apple,
    Google,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::None => write!(f, "NONE"),
            SubscriptionStatus::Active => write!(f, "ACTIVE"),
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(SubscriptionStatus::None),
            "ACTIVE" => Ok(SubscriptionStatus::Active),
            _ => Err(format!("Unknown subscription status: {}", s)),
        }
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Store::Internal => write!(f, "INTERNAL"),
            Store::Apple => write!(f, "APPLE"),
            Store::Google => write!(f, "GOOGLE"),
        }
    }
}

impl FromStr for Store {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INTERNAL" => Ok(Store::Internal),
            "APPLE" => Ok(Store::Apple),
            "GOOGLE" => Ok(Store::Google),
            _ => Err(format!("Unknown store: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: i64,
    pub status: SubscriptionStatus,
    pub store: Store,
    pub product_id: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub apple_original_transaction_id: Option<String>,
    pub google_purchase_token: Option<String>,
}

/// Both persisted halves of a user's entitlement, read together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitlementState {
    pub premium_until: Option<DateTime<Utc>>,
    pub subscription: Option<Subscription>,
}

/// A full replacement of a user's entitlement, applied atomically by the store.
///
/// `subscription: None` leaves the subscription table untouched (no record is created).
/// `event_key` is recorded alongside the write so redelivered payment events can be detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementWrite {
    pub premium_until: Option<DateTime<Utc>>,
    pub subscription: Option<Subscription>,
    pub event_key: Option<String>,
}

/// How a caller names a user: numeric strings are ids, everything else is an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Id(i64),
    Email(String),
}

impl UserLookup {
    pub fn parse(identifier: &str) -> Result<Self, EntitlementError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(EntitlementError::MissingIdentifier);
        }

        if identifier.chars().all(|c| c.is_ascii_digit()) {
            return identifier
                .parse::<i64>()
                .map(UserLookup::Id)
                .map_err(|_| EntitlementError::InvalidIdentifier(identifier.to_string()));
        }

        Ok(UserLookup::Email(identifier.to_string()))
    }
}

impl fmt::Display for UserLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserLookup::Id(id) => write!(f, "{}", id),
            UserLookup::Email(email) => write!(f, "{}", email),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPolicy {
    pub default_days: u32,
    pub max_days: u32,
}

impl Default for DayPolicy {
    fn default() -> Self {
        Self {
            default_days: 30,
            max_days: 360,
        }
    }
}

/// A validated day count, always within `1..=policy.max_days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DayCount(u32);

pub const DAYS_PER_MONTH: u32 = 30;

impl DayCount {
    pub fn clamp(days: i64, policy: &DayPolicy) -> Self {
        let max = i64::from(policy.max_days.max(1));
        Self(days.clamp(1, max) as u32)
    }

    /// Parses operator or client input. Anything that is not an integer falls back to the default.
    pub fn parse(raw: Option<&str>, policy: &DayPolicy) -> Self {
        match raw.map(str::trim).and_then(|s| s.parse::<i64>().ok()) {
            Some(days) => Self::clamp(days, policy),
            None => Self::clamp(i64::from(policy.default_days), policy),
        }
    }

    pub fn from_months(months: u32, policy: &DayPolicy) -> Self {
        Self::clamp(i64::from(months) * i64::from(DAYS_PER_MONTH), policy)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn as_duration(self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.0))
    }
}

impl fmt::Display for DayCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is granting and what for; recorded on the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantSource {
    pub store: Store,
    pub product_id: Option<String>,
    pub event_key: Option<String>,
}

impl GrantSource {
    pub fn internal(product_id: Option<String>) -> Self {
        Self {
            store: Store::Internal,
            product_id,
            event_key: None,
        }
    }

    pub fn with_event_key(mut self, event_key: impl Into<String>) -> Self {
        self.event_key = Some(event_key.into());
        self
    }
}

/// The provider correlation key stored with a store-issued subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCorrelation {
    AppleOriginalTransaction(String),
    GooglePurchaseToken(String),
}

/// An authoritative, provider-dictated entitlement window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreActivation {
    pub store: Store,
    pub product_id: String,
    pub expires_at: DateTime<Utc>,
    pub correlation: Option<StoreCorrelation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantOutcome {
    pub user_id: i64,
    pub days: DayCount,
    /// `None` when a duplicate event arrives after the window was revoked.
    pub premium_until: Option<DateTime<Utc>>,
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationOutcome {
    pub user_id: i64,
    pub store: Store,
    pub product_id: String,
    pub premium_until: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeOutcome {
    pub user_id: i64,
    pub was_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReduceOutcome {
    Reduced { user_id: i64, premium_until: DateTime<Utc> },
    Revoked { user_id: i64 },
    NothingToReduce { user_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirySource {
    PremiumUntil,
    Subscription,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementStatus {
    pub user_id: i64,
    pub email: Option<String>,
    pub active: bool,
    pub premium_until: Option<DateTime<Utc>>,
    pub days_left: i64,
    pub source: Option<ExpirySource>,
    pub store: Option<Store>,
    pub subscription_status: Option<SubscriptionStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_lookup_parse() {
        assert_eq!(UserLookup::parse("5").unwrap(), UserLookup::Id(5));
        assert_eq!(UserLookup::parse("  42 ").unwrap(), UserLookup::Id(42));
        assert_eq!(
            UserLookup::parse("Jane@Example.com").unwrap(),
            UserLookup::Email("Jane@Example.com".to_string())
        );
        assert_eq!(UserLookup::parse("-5").unwrap(), UserLookup::Email("-5".to_string()));

        assert!(matches!(UserLookup::parse(""), Err(EntitlementError::MissingIdentifier)));
        assert!(matches!(UserLookup::parse("   "), Err(EntitlementError::MissingIdentifier)));
        assert!(matches!(
            UserLookup::parse("99999999999999999999"),
            Err(EntitlementError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_day_count_parse() {
        let policy = DayPolicy::default();

        assert_eq!(DayCount::parse(Some("abc"), &policy).get(), 30);
        assert_eq!(DayCount::parse(None, &policy).get(), 30);
        assert_eq!(DayCount::parse(Some(""), &policy).get(), 30);
        assert_eq!(DayCount::parse(Some("7"), &policy).get(), 7);
        assert_eq!(DayCount::parse(Some(" 14 "), &policy).get(), 14);
        assert_eq!(DayCount::parse(Some("9999"), &policy).get(), 360);
        assert_eq!(DayCount::parse(Some("0"), &policy).get(), 1);
        assert_eq!(DayCount::parse(Some("-3"), &policy).get(), 1);
        assert_eq!(DayCount::parse(Some("12.5"), &policy).get(), 30);
    }

    #[test]
    fn test_day_count_custom_policy() {
        let policy = DayPolicy {
            default_days: 10,
            max_days: 90,
        };

        assert_eq!(DayCount::parse(Some("x"), &policy).get(), 10);
        assert_eq!(DayCount::parse(Some("365"), &policy).get(), 90);
        assert_eq!(DayCount::from_months(12, &policy).get(), 90);
    }

    #[test]
    fn test_day_count_from_months() {
        let policy = DayPolicy::default();

        assert_eq!(DayCount::from_months(1, &policy).get(), 30);
        assert_eq!(DayCount::from_months(3, &policy).get(), 90);
        assert_eq!(DayCount::from_months(12, &policy).get(), 360);
        assert_eq!(DayCount::from_months(0, &policy).get(), 1);
    }

    #[test]
    fn test_store_round_trips_through_text() {
        for store in [Store::Internal, Store::Apple, Store::Google] {
            assert_eq!(store.to_string().parse::<Store>().unwrap(), store);
        }
        assert!("PAYPAL".parse::<Store>().is_err());
        assert_eq!("ACTIVE".parse::<SubscriptionStatus>().unwrap(), SubscriptionStatus::Active);
    }
}
