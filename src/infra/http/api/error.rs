use std::fmt::Display;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use blogers_api_types::ErrorResponse;

use crate::application::error::ErrorReport;

/// JSON error body `{"message": ..., "error": ...}` plus a report for the
/// response logger.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: &'static str, detail: Option<String>) -> Self {
        Self {
            status,
            message,
            detail,
        }
    }

    pub fn bad_request(message: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, None)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Authentication required", None)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, None)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed", None)
    }

    /// Store or upstream failure; the cause is echoed in `error`.
    pub fn internal(message: &'static str, cause: &dyn Display) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            Some(cause.to_string()),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = ErrorReport::from_message(
            "infra::http::api",
            self.status,
            match &self.detail {
                Some(detail) => format!("{}: {detail}", self.message),
                None => self.message.to_string(),
            },
        );
        let body = match self.detail {
            Some(detail) => ErrorResponse::with_detail(self.message, detail),
            None => ErrorResponse::new(self.message),
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn body_carries_message_and_detail() {
        let response = ApiError::internal("Failed to create blog", &"store down").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<ErrorReport>().is_some());

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: ErrorResponse = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body.message, "Failed to create blog");
        assert_eq!(body.error.as_deref(), Some("store down"));
    }

    #[test]
    fn client_errors_omit_detail() {
        let err = ApiError::bad_request("Missing required fields");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.detail.is_none());
    }
}
