use std::time::Duration;

use reqwest::StatusCode;

/// Outcome classes of a single call to the completion provider.
///
/// Every failed call lands in exactly one variant. Callers map these onto their own
/// boundary codes; nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream rate limited the request")]
    RateLimited,

    #[error("upstream returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("upstream did not respond within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("malformed response envelope: {0}")]
    MalformedEnvelope(String),
}

impl GatewayError {
    /// HTTP status reported by the provider, when there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GatewayError::RateLimited => Some(StatusCode::TOO_MANY_REQUESTS),
            GatewayError::Upstream { status, .. } => Some(*status),
            GatewayError::Request(e) => e.status(),
            GatewayError::Timeout(_) | GatewayError::MalformedEnvelope(_) => None,
        }
    }
}
