//! HTTP error envelope

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::Error;

/// Error returned by handlers, rendered as `{"message": ...}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Log a backend failure and hide its detail behind `context`.
    pub fn backend(err: Error, context: &'static str) -> Self {
        tracing::error!(error = %err, "{}", context);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, context)
    }

    /// Classify a service error. Client errors keep their message; anything
    /// else becomes a generic 500 carrying `context`.
    pub fn from_service(err: Error, context: &'static str) -> Self {
        match err {
            Error::InvalidId(message) | Error::InvalidRequest(message) => {
                Self::bad_request(message)
            }
            Error::MissingIdentity(header) => {
                Self::unauthorized(format!("Missing required '{}' header", header))
            }
            Error::NotFound(message) => Self::not_found(message),
            other => Self::backend(other, context),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}
