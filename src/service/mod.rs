use std::sync::Arc;

use crate::{config::AppConfig, storage::EntitlementStore};

pub mod entitlement;
mod error;
pub mod http;
pub mod payment;
pub mod plan;

pub use error::{ErrorClass, ServiceError};

use entitlement::EntitlementService;
use payment::PaymentService;
use plan::PlanCatalog;

#[derive(Clone)]
pub struct ServiceRegistry {
    pub plans: PlanCatalog,
    pub entitlement: EntitlementService,
    pub payment: PaymentService,
}

impl ServiceRegistry {
    pub fn new(config: &AppConfig, store: Arc<dyn EntitlementStore>) -> Result<Self, ServiceError> {
        info!("Initializing service registry");

        let plans = PlanCatalog::default();
        let entitlement = EntitlementService::new(store, config.entitlement);
        let payment = PaymentService::new(&config.payment, plans.clone(), entitlement.clone())?;

        info!("Service registry initialized");

        Ok(Self {
            plans,
            entitlement,
            payment,
        })
    }
}
