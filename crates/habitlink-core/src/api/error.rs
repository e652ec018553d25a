use thiserror::Error;

use super::ApiRequest;

/// Failure while talking to the partner API, tagged with the endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{request} failed: {kind}")]
pub struct ApiError {
    pub request: ApiRequest,
    pub kind: ApiErrorKind,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorKind {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request body could not be encoded: {0}")]
    EncodingFailed(String),

    #[error("request failed{}: {message}", status_suffix(.status))]
    RequestFailed {
        status: Option<u16>,
        message: String,
    },

    #[error("response could not be decoded: {0}")]
    DecodingFailed(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {}", s)).unwrap_or_default()
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    pub fn new(request: ApiRequest, kind: ApiErrorKind) -> Self {
        Self { request, kind }
    }

    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(request: ApiRequest, status: reqwest::StatusCode, body: &str) -> Self {
        Self::new(
            request,
            ApiErrorKind::RequestFailed {
                status: Some(status.as_u16()),
                message: Self::truncate_body(body),
            },
        )
    }

    pub fn transport(request: ApiRequest, err: &reqwest::Error) -> Self {
        Self::new(
            request,
            ApiErrorKind::RequestFailed {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            },
        )
    }

    /// HTTP status attached to a `RequestFailed` error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            ApiErrorKind::RequestFailed { status, .. } => status,
            _ => None,
        }
    }

    /// Transport failures may succeed on a later attempt; the others are
    /// configuration or protocol bugs.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ApiErrorKind::RequestFailed { .. })
    }
}
