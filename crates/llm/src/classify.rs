//! Structured failure taxonomy for text-generation calls.
//!
//! The retry loop only ever inspects an [`ErrorClass`]; providers translate
//! their own errors into it through [`LlmProvider::classify`](crate::LlmProvider::classify).

use serde::{Deserialize, Serialize};

use crate::provider::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Connection refused, reset, DNS failure.
    Network,
    /// The call did not complete within the per-call timeout.
    Timeout,
    /// The service asked us to slow down (HTTP 429).
    RateLimit,
    /// Transient server-side failure (HTTP 5xx).
    ServerFault,
    /// The request itself is wrong or unauthorized (HTTP 4xx). Never retried.
    ClientFault,
    /// The call succeeded but produced no usable text.
    EmptyResponse,
    Unknown,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorClass::ClientFault)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Network => "network",
            ErrorClass::Timeout => "timeout",
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::ServerFault => "server_fault",
            ErrorClass::ClientFault => "client_fault",
            ErrorClass::EmptyResponse => "empty_response",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an HTTP status returned by the service.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        408 => ErrorClass::Timeout,
        429 => ErrorClass::RateLimit,
        // Conflict / too-early are transient on most gateways.
        409 | 425 => ErrorClass::Unknown,
        400..=499 => ErrorClass::ClientFault,
        500..=599 => ErrorClass::ServerFault,
        _ => ErrorClass::Unknown,
    }
}

/// Default classification used by providers that do not override it.
pub fn classify_error(error: &LlmError) -> ErrorClass {
    match error {
        LlmError::HttpError(e) => {
            if e.is_timeout() {
                ErrorClass::Timeout
            } else if e.is_connect() || e.is_request() || e.is_body() {
                ErrorClass::Network
            } else if let Some(status) = e.status() {
                classify_status(status.as_u16())
            } else {
                ErrorClass::Unknown
            }
        }
        LlmError::Connection(_) => ErrorClass::Network,
        LlmError::Timeout(_) => ErrorClass::Timeout,
        LlmError::ApiError { status, .. } => classify_status(*status),
        LlmError::ParseError(_) => ErrorClass::Unknown,
        LlmError::NotConfigured(_) => ErrorClass::ClientFault,
    }
}
