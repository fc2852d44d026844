mod error;
mod memory;
mod turso;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use turso::TursoStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::StorageConfig,
    service::entitlement::{EntitlementState, EntitlementWrite, StoreCorrelation, User, UserLookup},
};

/// Narrow accessor over the user and subscription records.
///
/// `write_entitlement` must apply the user expiry, the subscription upsert and the event key
/// as one unit: either all of them land or none do. An event key is recorded at most once.
#[async_trait]
pub trait EntitlementStore: Send + Sync + 'static {
    async fn find_user(&self, lookup: &UserLookup) -> Result<Option<User>, StorageError>;
    async fn read_entitlement(&self, user_id: i64) -> Result<EntitlementState, StorageError>;
    async fn write_entitlement(&self, user_id: i64, write: &EntitlementWrite) -> Result<(), StorageError>;
    /// The user an already processed event was applied to.
    async fn event_owner(&self, event_key: &str) -> Result<Option<i64>, StorageError>;
    /// The user whose subscription carries this store purchase.
    async fn correlation_owner(&self, correlation: &StoreCorrelation) -> Result<Option<i64>, StorageError>;
    async fn insert_user(&self, email: Option<&str>) -> Result<User, StorageError>;
}

pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn EntitlementStore>, StorageError> {
    match config {
        StorageConfig::Turso { url, token } => {
            let store = TursoStore::new_remote(url, token).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        StorageConfig::Memory => {
            warn!("No TURSO_URL configured, entitlements are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
