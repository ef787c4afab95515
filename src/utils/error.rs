//! API and engine error types
//!
//! `EngineError` is the domain taxonomy used inside services; `ApiError` is
//! the HTTP-facing form handlers return. Partial failure (a single rule or
//! definition failing inside a batch) is never surfaced through these types -
//! it is recorded on the item's result instead.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::services::llm::LLMError;

/// Domain errors raised by the engine pipeline
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Knowledge graph not found: {0}")]
    GraphNotFound(String),

    #[error("Ruleset not found: {0}")]
    RulesetNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No join path between {source_table} and {target}")]
    NoJoinPath { source_table: String, target: String },

    #[error("Schema object not found: {0}")]
    SchemaObjectNotFound(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Query timed out after {0}ms")]
    Timeout(u64),

    #[error("Service busy: {0}")]
    Busy(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("LLM error: {0}")]
    Llm(#[from] LLMError),
}

impl EngineError {
    /// True for backend "unknown table / invalid object" failures that the
    /// executor may retry once without the schema prefix.
    pub fn is_schema_object_error(&self) -> bool {
        matches!(self, Self::SchemaObjectNotFound(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// HTTP-facing error returned by handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    ResourceNotFound(String),

    #[error("{0}")]
    ConnectionFailed(String),

    #[error("{0}")]
    NotImplemented(String),

    #[error("{0}")]
    ServiceBusy(String),

    #[error("{0}")]
    InternalError(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::ResourceNotFound(msg.into())
    }

    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self::ServiceBusy(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            Self::ConnectionFailed(_) => StatusCode::BAD_GATEWAY,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::ServiceBusy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error: {}", self);
        }
        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::SchemaNotFound(_)
            | EngineError::GraphNotFound(_)
            | EngineError::RulesetNotFound(_) => Self::ResourceNotFound(err.to_string()),
            EngineError::InvalidRequest(_) | EngineError::NoJoinPath { .. } => {
                Self::ValidationError(err.to_string())
            },
            EngineError::Busy(_) => Self::ServiceBusy(err.to_string()),
            EngineError::SchemaObjectNotFound(_)
            | EngineError::ExecutionError(_)
            | EngineError::Timeout(_) => Self::ConnectionFailed(err.to_string()),
            EngineError::Storage(_) | EngineError::Serialization(_) | EngineError::Llm(_) => {
                Self::InternalError(err.to_string())
            },
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_maps_to_api_status() {
        let api: ApiError = EngineError::SchemaNotFound("orders".into()).into();
        assert_eq!(api.status(), StatusCode::NOT_FOUND);

        let api: ApiError =
            EngineError::NoJoinPath { source_table: "a".into(), target: "b".into() }.into();
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);

        let api: ApiError = EngineError::Busy("queue full".into()).into();
        assert_eq!(api.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn no_join_path_message_names_both_tables() {
        let err =
            EngineError::NoJoinPath { source_table: "catalog".into(), target: "vendor".into() };
        let msg = err.to_string();
        assert!(msg.contains("catalog") && msg.contains("vendor"));
    }
}
