use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

use crate::logic::{ExtractError, QueryError, UpsertError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Request-level failures, translated to HTTP at the edge. Validation
/// problems carry the offending name in the message; everything the
/// database reports bubbles up as internal.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownTable(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("request failed: {self:#}");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<ExtractError> for ApiError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::UnknownTable(table) => ApiError::UnknownTable(table),
            ExtractError::Store(err) => ApiError::Internal(err),
            other => ApiError::Validation(other.to_string()),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::UnknownTable(table) => ApiError::UnknownTable(table),
            QueryError::Store(err) => ApiError::Internal(err),
            other => ApiError::Validation(other.to_string()),
        }
    }
}

impl From<UpsertError> for ApiError {
    fn from(err: UpsertError) -> Self {
        ApiError::Validation(err.to_string())
    }
}
