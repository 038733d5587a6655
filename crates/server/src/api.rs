use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use deckbot_core::errors::{ErrorCategory, ServiceError};
use serde::Serialize;
use tracing::error;

/// JSON body returned by every non-webhook API failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub category: ErrorCategory,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(event_name = "http.request.failed", error = %self.0, "request failed");
        }

        let envelope =
            ErrorEnvelope { category: self.0.category(), message: self.0.client_message() };
        (status, Json(envelope)).into_response()
    }
}

/// Used by the catch-panic layer so a panicking handler still answers with the envelope.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!(event_name = "http.handler.panicked", panic = detail, "handler panicked");

    let envelope =
        ErrorEnvelope { category: ErrorCategory::Unknown, message: "unknown error".to_string() };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response()
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use deckbot_core::errors::{ErrorKind, ServiceError};
    use serde_json::{json, Value};

    use super::{panic_response, ApiError};

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn parameter_error_maps_to_400_envelope() {
        let response = ApiError(ServiceError::message(ErrorKind::Parameter, "bad page")).into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"category": "PARAMETER_ERROR", "message": "bad page"})
        );
    }

    #[tokio::test]
    async fn external_error_keeps_upstream_status() {
        let response =
            ApiError(ServiceError::external("platform refused", Some(401), "unauthorized"))
                .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["category"], "EXTERNAL_ERROR");
    }

    #[tokio::test]
    async fn not_found_maps_to_resource_error() {
        let response =
            ApiError(ServiceError::message(ErrorKind::ResourceNotFound, "slide is not found"))
                .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["category"], "RESOURCE_ERROR");
    }

    #[tokio::test]
    async fn panic_becomes_unknown_error() {
        let response = panic_response(Box::new("boom"));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({"category": "UNKNOWN_ERROR", "message": "unknown error"})
        );
    }
}
