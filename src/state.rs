use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::AppResult,
    service::ServiceRegistry,
    storage::{self, EntitlementStore},
};

#[derive(Clone)]
pub struct AppState {
    pub services: ServiceRegistry,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> AppResult<Self> {
        let store = storage::connect(&config.storage).await?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: &AppConfig, store: Arc<dyn EntitlementStore>) -> AppResult<Self> {
        let services = ServiceRegistry::new(config, store)?;
        Ok(Self { services })
    }
}
