use std::net::SocketAddr;

use premium_billing::{config::build_config, error::AppError, handler, state::AppState};

#[macro_use]
extern crate log;

pub struct BillingService {
    state: AppState,
}

#[shuttle_runtime::main]
async fn shuttle_main(
    #[shuttle_runtime::Secrets] secrets: shuttle_runtime::SecretStore,
) -> Result<BillingService, shuttle_runtime::Error> {
    premium_billing::init_logging();
    info!("Starting premium billing service...");

    let config = build_config(|key| secrets.get(key)).map_err(AppError::from)?;

    info!("Initializing AppState...");
    let state = AppState::new(&config).await?;

    Ok(BillingService { state })
}

#[shuttle_runtime::async_trait]
impl shuttle_runtime::Service for BillingService {
    async fn bind(self, addr: SocketAddr) -> Result<(), shuttle_runtime::Error> {
        let router = handler::router(self.state);

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(AppError::from)?;
        info!("Listening on {}", addr);

        axum::serve(listener, router).await.map_err(AppError::from)?;

        Ok(())
    }
}
