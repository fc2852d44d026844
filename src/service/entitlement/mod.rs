mod error;
mod lock;
mod model;
pub mod window;

pub use error::EntitlementError;
pub use lock::{UserGuard, UserLocks};
pub use model::*;

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::storage::EntitlementStore;

use window::{days_left, effective_expiry, extend_window, reduce_window, ReduceDecision};

/// The entitlement state machine. Every mutation runs under the user's lock and ends in a single
/// atomic `write_entitlement`, keeping `premium_until` and the subscription record in step.
#[derive(Clone)]
pub struct EntitlementService {
    store: Arc<dyn EntitlementStore>,
    locks: UserLocks,
    policy: DayPolicy,
}

enum WindowChange<'a> {
    /// Start or replace the window and stamp who issued it.
    Open {
        until: DateTime<Utc>,
        store: Store,
        product_id: Option<&'a str>,
        correlation: Option<&'a StoreCorrelation>,
    },
    /// Move the end of an existing window, keeping its provider metadata.
    Move { until: DateTime<Utc> },
    Close,
}

impl EntitlementService {
    pub fn new(store: Arc<dyn EntitlementStore>, policy: DayPolicy) -> Self {
        info!(
            "Initializing entitlement service (default {} days, max {} days)",
            policy.default_days, policy.max_days
        );
        Self {
            store,
            locks: UserLocks::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &DayPolicy {
        &self.policy
    }

    pub async fn resolve_user(&self, identifier: &str) -> Result<User, EntitlementError> {
        let lookup = UserLookup::parse(identifier)?;
        self.store
            .find_user(&lookup)
            .await?
            .ok_or_else(|| EntitlementError::UserNotFound(lookup.to_string()))
    }

    pub async fn find_user(&self, user_id: i64) -> Result<User, EntitlementError> {
        self.store
            .find_user(&UserLookup::Id(user_id))
            .await?
            .ok_or_else(|| EntitlementError::UserNotFound(user_id.to_string()))
    }

    /// Adds `days` to the user's window. Grants stack on an active window instead of resetting it.
    pub async fn grant(
        &self,
        user_id: i64,
        days: DayCount,
        source: GrantSource,
    ) -> Result<GrantOutcome, EntitlementError> {
        self.find_user(user_id).await?;
        let _guard = self.locks.acquire(user_id).await;

        let state = self.store.read_entitlement(user_id).await?;
        let now = Utc::now();

        if let Some(event_key) = &source.event_key {
            match self.store.event_owner(event_key).await? {
                Some(owner) if owner == user_id => {
                    info!("Skipping already processed event {} for user {}", event_key, user_id);
                    return Ok(GrantOutcome {
                        user_id,
                        days,
                        premium_until: state.premium_until,
                        duplicate: true,
                    });
                }
                Some(owner) => {
                    warn!(
                        "Event {} for user {} was already applied to user {}",
                        event_key, user_id, owner
                    );
                    return Err(EntitlementError::EventConflict(event_key.clone()));
                }
                None => {}
            }
        }

        let until = extend_window(state.premium_until, days, now);
        let mut write = apply_window(
            &state,
            user_id,
            WindowChange::Open {
                until,
                store: source.store,
                product_id: source.product_id.as_deref(),
                correlation: None,
            },
            now,
        );
        write.event_key = source.event_key.clone();

        self.store.write_entitlement(user_id, &write).await?;
        info!(
            "Granted {} days to user {} via {}: premium until {}",
            days, user_id, source.store, until
        );

        Ok(GrantOutcome {
            user_id,
            days,
            premium_until: Some(until),
            duplicate: false,
        })
    }

    pub async fn revoke(&self, user_id: i64) -> Result<RevokeOutcome, EntitlementError> {
        self.find_user(user_id).await?;
        let _guard = self.locks.acquire(user_id).await;

        let state = self.store.read_entitlement(user_id).await?;
        let now = Utc::now();
        let was_active = effective_expiry(&state, now).is_some();

        let write = apply_window(&state, user_id, WindowChange::Close, now);
        self.store.write_entitlement(user_id, &write).await?;
        info!("Revoked premium for user {} (was active: {})", user_id, was_active);

        Ok(RevokeOutcome { user_id, was_active })
    }

    /// Takes `days` off an active window. Shortening to `now` or earlier is a full revoke.
    pub async fn reduce(&self, user_id: i64, days: DayCount) -> Result<ReduceOutcome, EntitlementError> {
        self.find_user(user_id).await?;
        let _guard = self.locks.acquire(user_id).await;

        let state = self.store.read_entitlement(user_id).await?;
        let now = Utc::now();

        match reduce_window(state.premium_until, days, now) {
            ReduceDecision::NothingToReduce => {
                info!("Nothing to reduce for user {}", user_id);
                Ok(ReduceOutcome::NothingToReduce { user_id })
            }
            ReduceDecision::Revoke => {
                let write = apply_window(&state, user_id, WindowChange::Close, now);
                self.store.write_entitlement(user_id, &write).await?;
                info!("Reduced user {} by {} days, premium revoked", user_id, days);
                Ok(ReduceOutcome::Revoked { user_id })
            }
            ReduceDecision::ShortenTo(until) => {
                let write = apply_window(&state, user_id, WindowChange::Move { until }, now);
                self.store.write_entitlement(user_id, &write).await?;
                info!("Reduced user {} by {} days: premium until {}", user_id, days, until);
                Ok(ReduceOutcome::Reduced {
                    user_id,
                    premium_until: until,
                })
            }
        }
    }

    /// Sets the window to a provider-reported expiry. Nothing is stacked: the store is the authority.
    /// A purchase already linked to a different user is refused.
    pub async fn activate_store_subscription(
        &self,
        user_id: i64,
        activation: StoreActivation,
    ) -> Result<ActivationOutcome, EntitlementError> {
        self.find_user(user_id).await?;
        let now = Utc::now();
        if activation.expires_at <= now {
            return Err(EntitlementError::WindowInPast(activation.expires_at));
        }

        let _guard = self.locks.acquire(user_id).await;

        if let Some(correlation) = &activation.correlation {
            if let Some(owner) = self.store.correlation_owner(correlation).await? {
                if owner != user_id {
                    warn!(
                        "{} purchase {} for user {} is linked to user {}",
                        activation.store, activation.product_id, user_id, owner
                    );
                    return Err(EntitlementError::PurchaseClaimed(activation.store));
                }
            }
        }

        let state = self.store.read_entitlement(user_id).await?;
        let write = apply_window(
            &state,
            user_id,
            WindowChange::Open {
                until: activation.expires_at,
                store: activation.store,
                product_id: Some(activation.product_id.as_str()),
                correlation: activation.correlation.as_ref(),
            },
            now,
        );
        self.store.write_entitlement(user_id, &write).await?;
        info!(
            "Activated {} subscription {} for user {} until {}",
            activation.store, activation.product_id, user_id, activation.expires_at
        );

        Ok(ActivationOutcome {
            user_id,
            store: activation.store,
            product_id: activation.product_id,
            premium_until: activation.expires_at,
        })
    }

    pub async fn status(&self, user_id: i64) -> Result<EntitlementStatus, EntitlementError> {
        let user = self.find_user(user_id).await?;
        let state = self.store.read_entitlement(user_id).await?;
        let now = Utc::now();

        let effective = effective_expiry(&state, now);
        let subscription = state.subscription.as_ref();

        Ok(EntitlementStatus {
            user_id,
            email: user.email,
            active: effective.is_some(),
            premium_until: effective.map(|(until, _)| until),
            days_left: effective.map(|(until, _)| days_left(until, now)).unwrap_or(0),
            source: effective.map(|(_, source)| source),
            store: subscription.map(|sub| sub.store),
            subscription_status: subscription.map(|sub| sub.status),
        })
    }
}

/// The single place a new entitlement is derived from the current one.
fn apply_window(
    state: &EntitlementState,
    user_id: i64,
    change: WindowChange<'_>,
    now: DateTime<Utc>,
) -> EntitlementWrite {
    match change {
        WindowChange::Open {
            until,
            store,
            product_id,
            correlation,
        } => {
            let mut sub = state.subscription.clone().unwrap_or_else(|| Subscription {
                user_id,
                status: SubscriptionStatus::None,
                store,
                product_id: None,
                current_period_start: Some(now),
                current_period_end: None,
                apple_original_transaction_id: None,
                google_purchase_token: None,
            });

            sub.status = SubscriptionStatus::Active;
            sub.store = store;
            sub.current_period_end = Some(until);
            sub.current_period_start = sub.current_period_start.or(Some(now));
            if let Some(product_id) = product_id {
                sub.product_id = Some(product_id.to_string());
            }
            match correlation {
                Some(StoreCorrelation::AppleOriginalTransaction(id)) => {
                    sub.apple_original_transaction_id = Some(id.clone())
                }
                Some(StoreCorrelation::GooglePurchaseToken(token)) => sub.google_purchase_token = Some(token.clone()),
                None => {}
            }

            EntitlementWrite {
                premium_until: Some(until),
                subscription: Some(sub),
                event_key: None,
            }
        }
        WindowChange::Move { until } => EntitlementWrite {
            premium_until: Some(until),
            subscription: state.subscription.clone().map(|mut sub| {
                sub.status = SubscriptionStatus::Active;
                sub.current_period_end = Some(until);
                sub
            }),
            event_key: None,
        },
        WindowChange::Close => EntitlementWrite {
            premium_until: None,
            subscription: state.subscription.clone().map(|mut sub| {
                sub.status = SubscriptionStatus::None;
                sub.current_period_end = None;
                sub
            }),
            event_key: None,
        },
    }
}
