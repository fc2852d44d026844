use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::service::{payment::PaymentError, ErrorClass, ServiceError};

impl ErrorClass {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorClass::BadRequest => StatusCode::BAD_REQUEST,
            ErrorClass::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Conflict => StatusCode::CONFLICT,
            ErrorClass::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorClass::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorClass::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let class = self.class();
        match class {
            ErrorClass::Internal => error!("Request failed: {}", self),
            _ => warn!("Request rejected: {}", self),
        }

        (
            class.status_code(),
            Json(json!({ "success": false, "error": self.public_message() })),
        )
            .into_response()
    }
}

/// Unwraps a JSON body, reporting a malformed one the same way as any other bad request.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| PaymentError::InvalidRequest(rejection.body_text()).into())
}
