//! Entitlement window arithmetic. Everything here takes `now` explicitly.

use chrono::{DateTime, Utc};

use super::model::{DayCount, EntitlementState, ExpirySource, SubscriptionStatus};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// The expiry a grant of `days` produces. Active windows are extended, lapsed ones restart at `now`.
pub fn extend_window(current: Option<DateTime<Utc>>, days: DayCount, now: DateTime<Utc>) -> DateTime<Utc> {
    let base = match current {
        Some(until) if until > now => until,
        _ => now,
    };
    base + days.as_duration()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceDecision {
    NothingToReduce,
    Revoke,
    ShortenTo(DateTime<Utc>),
}

pub fn reduce_window(current: Option<DateTime<Utc>>, days: DayCount, now: DateTime<Utc>) -> ReduceDecision {
    match current {
        Some(until) if until > now => {
            let reduced = until - days.as_duration();
            if reduced <= now {
                ReduceDecision::Revoke
            } else {
                ReduceDecision::ShortenTo(reduced)
            }
        }
        _ => ReduceDecision::NothingToReduce,
    }
}

/// `premium_until` wins when it is in the future; an active subscription record is the fallback.
pub fn effective_expiry(state: &EntitlementState, now: DateTime<Utc>) -> Option<(DateTime<Utc>, ExpirySource)> {
    if let Some(until) = state.premium_until.filter(|until| *until > now) {
        return Some((until, ExpirySource::PremiumUntil));
    }

    state
        .subscription
        .as_ref()
        .filter(|sub| sub.status == SubscriptionStatus::Active)
        .and_then(|sub| sub.current_period_end)
        .filter(|end| *end > now)
        .map(|end| (end, ExpirySource::Subscription))
}

/// Whole days remaining, rounded up. Zero once `until` has passed.
pub fn days_left(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (until - now).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::entitlement::model::{DayPolicy, Store, Subscription};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn days(n: i64) -> DayCount {
        DayCount::clamp(n, &DayPolicy::default())
    }

    fn subscription(status: SubscriptionStatus, end: Option<DateTime<Utc>>) -> Subscription {
        Subscription {
            user_id: 1,
            status,
            store: Store::Apple,
            product_id: Some("premium.monthly".to_string()),
            current_period_start: Some(now() - Duration::days(3)),
            current_period_end: end,
            apple_original_transaction_id: None,
            google_purchase_token: None,
        }
    }

    #[test]
    fn test_extend_window_starts_from_now_without_entitlement() {
        assert_eq!(extend_window(None, days(30), now()), now() + Duration::days(30));

        let lapsed = now() - Duration::days(5);
        assert_eq!(extend_window(Some(lapsed), days(30), now()), now() + Duration::days(30));
    }

    #[test]
    fn test_extend_window_stacks_on_active_entitlement() {
        let until = now() + Duration::days(10);
        assert_eq!(extend_window(Some(until), days(30), now()), until + Duration::days(30));
    }

    #[test]
    fn test_reduce_window() {
        let until = now() + Duration::days(10);

        assert_eq!(
            reduce_window(Some(until), days(3), now()),
            ReduceDecision::ShortenTo(now() + Duration::days(7))
        );
        assert_eq!(reduce_window(Some(until), days(10), now()), ReduceDecision::Revoke);
        assert_eq!(reduce_window(Some(until), days(11), now()), ReduceDecision::Revoke);
        assert_eq!(reduce_window(None, days(1), now()), ReduceDecision::NothingToReduce);
        assert_eq!(
            reduce_window(Some(now() - Duration::days(1)), days(1), now()),
            ReduceDecision::NothingToReduce
        );
    }

    #[test]
    fn test_effective_expiry_prefers_premium_until() {
        let state = EntitlementState {
            premium_until: Some(now() + Duration::days(2)),
            subscription: Some(subscription(SubscriptionStatus::Active, Some(now() + Duration::days(9)))),
        };
        assert_eq!(
            effective_expiry(&state, now()),
            Some((now() + Duration::days(2), ExpirySource::PremiumUntil))
        );
    }

    #[test]
    fn test_effective_expiry_falls_back_to_active_subscription() {
        let end = now() + Duration::days(9);
        let state = EntitlementState {
            premium_until: Some(now() - Duration::days(1)),
            subscription: Some(subscription(SubscriptionStatus::Active, Some(end))),
        };
        assert_eq!(effective_expiry(&state, now()), Some((end, ExpirySource::Subscription)));

        let inactive = EntitlementState {
            premium_until: None,
            subscription: Some(subscription(SubscriptionStatus::None, Some(end))),
        };
        assert_eq!(effective_expiry(&inactive, now()), None);

        let lapsed = EntitlementState {
            premium_until: None,
            subscription: Some(subscription(SubscriptionStatus::Active, Some(now() - Duration::hours(1)))),
        };
        assert_eq!(effective_expiry(&lapsed, now()), None);
    }

    #[test]
    fn test_days_left_rounds_up() {
        assert_eq!(days_left(now() + Duration::days(30), now()), 30);
        assert_eq!(days_left(now() + Duration::days(29) + Duration::hours(1), now()), 30);
        assert_eq!(days_left(now() + Duration::milliseconds(1), now()), 1);
        assert_eq!(days_left(now(), now()), 0);
        assert_eq!(days_left(now() - Duration::days(2), now()), 0);
    }
}
