//! Mapping of service errors onto HTTP responses.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use payorch_core::service::{ErrorKind, ServiceError, ValidationError};
use payorch_sdk::objects::ErrorResponse;

/// Errors returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    /// A service operation failed.
    Service(ServiceError),
    /// The request could not be decoded.
    BadRequest(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Service(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::PaymentNotPaid => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::GatewayOperationFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::Persistence | ErrorKind::Inconsistency => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Interrupted => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorKind::Validation.as_str(),
                message,
            ),
            ApiError::Service(err) => {
                let kind = err.kind();
                let status = status_for(kind);
                if kind == ErrorKind::Inconsistency {
                    tracing::error!(kind = %kind, error = %err, inconsistency = true, "Request failed");
                } else if status.is_server_error() {
                    tracing::error!(kind = %kind, error = %err, "Request failed");
                } else {
                    tracing::debug!(kind = %kind, error = %err, "Request rejected");
                }
                (status, kind.as_str(), err.to_string())
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                message,
            }),
        )
            .into_response()
    }
}
