use crate::storage::StorageError;

use super::{entitlement::EntitlementError, payment::PaymentError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Entitlement error: {0}")]
    Entitlement(#[from] EntitlementError),
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Response class of a rejection, independent of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    BadGateway,
    GatewayTimeout,
    ServiceUnavailable,
    Internal,
}

impl ServiceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::Entitlement(e) => match e {
                EntitlementError::UserNotFound(_) => ErrorClass::NotFound,
                EntitlementError::MissingIdentifier
                | EntitlementError::InvalidIdentifier(_)
                | EntitlementError::WindowInPast(_) => ErrorClass::BadRequest,
                EntitlementError::EventConflict(_) | EntitlementError::PurchaseClaimed(_) => ErrorClass::Conflict,
                EntitlementError::Storage(_) => ErrorClass::Internal,
            },
            ServiceError::Payment(e) => match e {
                PaymentError::Unauthorized | PaymentError::InvalidSignature(_) => ErrorClass::Unauthorized,
                PaymentError::UnknownPlan(_)
                | PaymentError::AmountMismatch { .. }
                | PaymentError::InvalidRequest(_)
                | PaymentError::Rejected { .. }
                | PaymentError::PurchaseExpired(_) => ErrorClass::BadRequest,
                PaymentError::NotConfigured(_) | PaymentError::Credentials(_) => ErrorClass::ServiceUnavailable,
                PaymentError::Provider { .. } => ErrorClass::BadGateway,
                PaymentError::ProviderTimeout(_) => ErrorClass::GatewayTimeout,
            },
            ServiceError::Storage(_) => ErrorClass::Internal,
        }
    }

    /// Message safe to show the caller. Internal failures are not spelled out.
    pub fn public_message(&self) -> String {
        match self.class() {
            ErrorClass::Internal => "Internal server error".to_string(),
            _ => match self {
                ServiceError::Entitlement(e) => e.to_string(),
                ServiceError::Payment(e) => e.to_string(),
                ServiceError::Storage(e) => e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::entitlement::Store;
    use chrono::Utc;

    #[test]
    fn test_error_classes() {
        let cases: Vec<(ServiceError, ErrorClass)> = vec![
            (PaymentError::Unauthorized.into(), ErrorClass::Unauthorized),
            (PaymentError::InvalidSignature("1".into()).into(), ErrorClass::Unauthorized),
            (PaymentError::UnknownPlan("lifetime".into()).into(), ErrorClass::BadRequest),
            (PaymentError::NotConfigured("App Store verification").into(), ErrorClass::ServiceUnavailable),
            (PaymentError::ProviderTimeout("App Store").into(), ErrorClass::GatewayTimeout),
            (PaymentError::PurchaseExpired(Utc::now()).into(), ErrorClass::BadRequest),
            (
                PaymentError::Provider {
                    provider: "Google Play",
                    message: "HTTP 500".into(),
                }
                .into(),
                ErrorClass::BadGateway,
            ),
            (EntitlementError::UserNotFound("5".into()).into(), ErrorClass::NotFound),
            (EntitlementError::MissingIdentifier.into(), ErrorClass::BadRequest),
            (EntitlementError::PurchaseClaimed(Store::Apple).into(), ErrorClass::Conflict),
            (EntitlementError::EventConflict("robokassa:1".into()).into(), ErrorClass::Conflict),
            (StorageError::Other("disk".into()).into(), ErrorClass::Internal),
        ];

        for (error, class) in cases {
            assert_eq!(error.class(), class, "{}", error);
        }
    }

    #[test]
    fn test_internal_errors_are_not_spelled_out() {
        let error: ServiceError = EntitlementError::Storage(StorageError::Other("secret path".into())).into();
        assert_eq!(error.public_message(), "Internal server error");

        let error: ServiceError = PaymentError::UnknownPlan("lifetime".into()).into();
        assert_eq!(error.public_message(), "Unknown plan: lifetime");
    }
}
