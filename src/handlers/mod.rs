pub mod carrier_webhooks;
pub mod orders;
pub mod payments;
pub mod shipping;

use crate::errors::{ErrorMessage, ServiceError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// `{ "error": message }` with the given status. Used by the endpoints the
/// storefront and admin screens call directly.
pub(crate) fn error_message(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorMessage::new(message))).into_response()
}

/// Same body shape for a [`ServiceError`]: upstream and caller errors keep
/// their own message, store and internal failures stay generic.
pub(crate) fn service_error_message(err: &ServiceError) -> Response {
    let message = match err {
        ServiceError::NotFound(m)
        | ServiceError::ValidationError(m)
        | ServiceError::InvalidInput(m)
        | ServiceError::InvalidOperation(m)
        | ServiceError::ConfigurationError(m)
        | ServiceError::GatewayError(m)
        | ServiceError::CarrierError(m)
        | ServiceError::Unauthorized(m) => m.clone(),
        other => other.response_message(),
    };
    error_message(err.status_code(), message)
}
