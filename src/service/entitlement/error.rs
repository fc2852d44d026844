use crate::storage::StorageError;

use super::Store;

#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("User identifier is required")]
    MissingIdentifier,
    #[error("Invalid user identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Entitlement window already ended at {0}")]
    WindowInPast(chrono::DateTime<chrono::Utc>),
    #[error("Event {0} was already applied to another user")]
    EventConflict(String),
    #[error("This {0} purchase is linked to another user")]
    PurchaseClaimed(Store),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
