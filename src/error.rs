use shuttle_runtime::Error as ShuttleError;

use crate::{config::ConfigError, service::ServiceError, storage::StorageError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

impl From<AppError> for ShuttleError {
    fn from(error: AppError) -> Self {
        ShuttleError::Custom(anyhow::anyhow!(error))
    }
}

pub type AppResult<T> = Result<T, AppError>;
