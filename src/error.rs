//! Error types for response construction

use thiserror::Error;

/// Failure while turning a handler result into an HTTP response
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("failed to serialize response body: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to build response: {0}")]
    Build(#[from] hyper::http::Error),
}
