use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::queue::QueueError;

pub mod codes {
    pub const VALIDATION: &str = "validation_error";
    pub const NOT_FOUND: &str = "not_found";
    pub const NOT_READY: &str = "not_ready";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid render request")]
    Validation(Vec<String>),

    #[error("Job not found")]
    NotFound,

    #[error("Job not found or not completed")]
    NotReady,

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::NotReady => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => codes::VALIDATION,
            Self::NotFound => codes::NOT_FOUND,
            Self::NotReady => codes::NOT_READY,
            Self::Internal(_) => codes::INTERNAL,
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(vec![rejection.body_text()])
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = self.to_string();

        let fields = match self {
            Self::Validation(fields) => Some(fields),
            Self::Internal(cause) => {
                tracing::error!(error = %cause, "Request failed");
                None
            }
            Self::NotFound | Self::NotReady => None,
        };

        let body = ApiErrorBody {
            error: code,
            message,
            fields,
        };
        (status, Json(body)).into_response()
    }
}
