use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use llm_common::error::GatewayError;
use serde::Serialize;

use crate::normalize::NormalizeError;
use crate::validate::{MAX_TEXT_CHARS, MIN_TEXT_CHARS};

/// Startup failures. Request-time failures use `AnalyzeError`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
}

/// Machine-readable code returned in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingFields,
    TextTooShort,
    TextTooLong,
    Timeout,
    RateLimited,
    ServiceError,
    ApiError,
    InvalidResponse,
    ParseError,
    FormatError,
    ServerError,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::MissingFields | ErrorCode::TextTooShort | ErrorCode::TextTooLong => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::Timeout => StatusCode::REQUEST_TIMEOUT,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::ServiceError
            | ErrorCode::ApiError
            | ErrorCode::InvalidResponse
            | ErrorCode::ParseError
            | ErrorCode::FormatError
            | ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingFields => "MISSING_FIELDS",
            ErrorCode::TextTooShort => "TEXT_TOO_SHORT",
            ErrorCode::TextTooLong => "TEXT_TOO_LONG",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::ServiceError => "SERVICE_ERROR",
            ErrorCode::ApiError => "API_ERROR",
            ErrorCode::InvalidResponse => "INVALID_RESPONSE",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::FormatError => "FORMAT_ERROR",
            ErrorCode::ServerError => "SERVER_ERROR",
        }
    }

    fn is_client_error(self) -> bool {
        self.status().is_client_error()
    }
}

/// Every way a single `/analyze` request can fail.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("missing required fields")]
    MissingFields,

    #[error("text has {chars} characters, minimum is {}", MIN_TEXT_CHARS)]
    TextTooShort { chars: usize },

    #[error("text has {chars} characters, maximum is {}", MAX_TEXT_CHARS)]
    TextTooLong { chars: usize },

    #[error("provider credential is not configured")]
    NotConfigured,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalyzeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AnalyzeError::MissingFields => ErrorCode::MissingFields,
            AnalyzeError::TextTooShort { .. } => ErrorCode::TextTooShort,
            AnalyzeError::TextTooLong { .. } => ErrorCode::TextTooLong,
            AnalyzeError::NotConfigured => ErrorCode::ServiceError,
            AnalyzeError::Gateway(e) => match e {
                GatewayError::RateLimited => ErrorCode::RateLimited,
                GatewayError::Timeout(_) => ErrorCode::Timeout,
                GatewayError::MalformedEnvelope(_) => ErrorCode::InvalidResponse,
                GatewayError::Upstream { .. } | GatewayError::Request(_) => ErrorCode::ApiError,
            },
            AnalyzeError::Normalize(NormalizeError::Format) => ErrorCode::FormatError,
            AnalyzeError::Normalize(NormalizeError::Parse(_)) => ErrorCode::ParseError,
            AnalyzeError::Internal(_) => ErrorCode::ServerError,
        }
    }

    /// Emit the failure at a level matching who is at fault. Called inside the request
    /// span so the event carries its fields.
    pub fn log(&self) {
        let code = self.code();
        if code.is_client_error() {
            tracing::warn!(code = code.as_str(), error = %self, "analysis rejected");
        } else {
            tracing::error!(code = code.as_str(), error = %self, "analysis failed");
        }
    }

    /// Message shown to the caller. Upstream detail goes in `details`, never here.
    fn public_message(&self) -> String {
        match self.code() {
            ErrorCode::MissingFields => "Missing required fields".to_string(),
            ErrorCode::TextTooShort => {
                format!("Text must be at least {MIN_TEXT_CHARS} characters")
            }
            ErrorCode::TextTooLong => {
                format!("Text must be at most {MAX_TEXT_CHARS} characters")
            }
            ErrorCode::Timeout => "Analysis timed out. Please try again.".to_string(),
            ErrorCode::RateLimited => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            ErrorCode::ServiceError => "Service temporarily unavailable".to_string(),
            ErrorCode::ApiError
            | ErrorCode::InvalidResponse
            | ErrorCode::ParseError
            | ErrorCode::FormatError
            | ErrorCode::ServerError => "Analysis failed. Please try again.".to_string(),
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            AnalyzeError::Gateway(GatewayError::RateLimited | GatewayError::Timeout(_)) => None,
            AnalyzeError::Gateway(e) => Some(e.to_string()),
            AnalyzeError::Normalize(e) => Some(e.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let code = self.code();
        let body = ErrorBody {
            error: self.public_message(),
            code,
            details: self.details(),
        };
        (code.status(), Json(body)).into_response()
    }
}
