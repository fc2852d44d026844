use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use crate::service::entitlement::{
    EntitlementState, EntitlementWrite, StoreCorrelation, Subscription, User, UserLookup,
};

use super::{EntitlementStore, StorageError};

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<i64, User>>,
    subscriptions: Arc<DashMap<i64, Subscription>>,
    events: Arc<DashMap<String, (i64, DateTime<Utc>)>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicI64::new(1)),
            ..Default::default()
        }
    }

    pub fn subscription(&self, user_id: i64) -> Option<Subscription> {
        self.subscriptions.get(&user_id).map(|sub| sub.value().clone())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn find_user(&self, lookup: &UserLookup) -> Result<Option<User>, StorageError> {
        let user = match lookup {
            UserLookup::Id(id) => self.users.get(id).map(|user| user.value().clone()),
            UserLookup::Email(email) => self
                .users
                .iter()
                .find(|user| user.email.as_deref() == Some(email.as_str()))
                .map(|user| user.value().clone()),
        };
        Ok(user)
    }

    async fn read_entitlement(&self, user_id: i64) -> Result<EntitlementState, StorageError> {
        let premium_until = self
            .users
            .get(&user_id)
            .ok_or_else(|| StorageError::Memory(format!("Unknown user {}", user_id)))?
            .premium_until;

        Ok(EntitlementState {
            premium_until,
            subscription: self.subscription(user_id),
        })
    }

    async fn write_entitlement(&self, user_id: i64, write: &EntitlementWrite) -> Result<(), StorageError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StorageError::Memory(format!("Unknown user {}", user_id)))?;

        // The user entry stays locked until every part of the write is applied.
        if let Some(event_key) = &write.event_key {
            if self.events.contains_key(event_key) {
                return Err(StorageError::Memory(format!("Event already processed: {}", event_key)));
            }
        }

        user.premium_until = write.premium_until;
        if let Some(subscription) = &write.subscription {
            self.subscriptions.insert(user_id, subscription.clone());
        }
        if let Some(event_key) = &write.event_key {
            self.events.insert(event_key.clone(), (user_id, Utc::now()));
        }

        Ok(())
    }

    async fn event_owner(&self, event_key: &str) -> Result<Option<i64>, StorageError> {
        Ok(self.events.get(event_key).map(|event| event.0))
    }

    async fn correlation_owner(&self, correlation: &StoreCorrelation) -> Result<Option<i64>, StorageError> {
        let owner = self
            .subscriptions
            .iter()
            .find(|sub| match correlation {
                StoreCorrelation::AppleOriginalTransaction(id) => {
                    sub.apple_original_transaction_id.as_deref() == Some(id.as_str())
                }
                StoreCorrelation::GooglePurchaseToken(token) => {
                    sub.google_purchase_token.as_deref() == Some(token.as_str())
                }
            })
            .map(|sub| *sub.key());
        Ok(owner)
    }

    async fn insert_user(&self, email: Option<&str>) -> Result<User, StorageError> {
        if let Some(email) = email {
            if self.users.iter().any(|user| user.email.as_deref() == Some(email)) {
                return Err(StorageError::Memory(format!("Email already registered: {}", email)));
            }
        }

        let user = User {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            email: email.map(str::to_string),
            premium_until: None,
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }
}
