//! API error responses: a status code and an `{"error": "..."}` body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::portal::PortalError;
use crate::query::QueryError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
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

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound { .. } | QueryError::NothingCached => {
                Self::bad_request(err.to_string())
            }
            QueryError::Portal(e) => e.into(),
            QueryError::ScrapeFailed | QueryError::Cache(_) => {
                error!(error = %err, "query failed");
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<PortalError> for ApiError {
    fn from(err: PortalError) -> Self {
        error!(error = %err, transient = err.is_transient(), "portal request failed");
        Self::internal(format!("portal error: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
