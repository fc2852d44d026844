use std::process::ExitCode;

use premium_billing::{
    admin::{self, AdminCommand, AdminError},
    config::build_config,
    service::entitlement::EntitlementService,
    storage,
};

#[macro_use]
extern crate log;

#[tokio::main]
async fn main() -> ExitCode {
    premium_billing::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Admin command failed: {}", e);
            eprintln!("{}", e);
            if matches!(
                e.downcast_ref::<AdminError>(),
                Some(AdminError::Usage(_) | AdminError::Config(_))
            ) {
                eprintln!("{}", admin::USAGE);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> anyhow::Result<String> {
    let config = build_config(|key| std::env::var(key).ok())?;
    let command = AdminCommand::parse(args, &config.entitlement)?;
    admin::require_persistent_storage(&config.storage)?;

    let store = storage::connect(&config.storage).await?;
    let entitlement = EntitlementService::new(store, config.entitlement);

    Ok(admin::execute(&entitlement, command).await?)
}
