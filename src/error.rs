//! Error types for OTS client operations.
//!
//! Every failed call surfaces exactly one [`OtsError`]: either a
//! [`ClientError`] raised locally before or after the exchange (bad caller
//! input, unsupported operation, encode/decode failure) or a [`ServiceError`]
//! produced by classifying the HTTP exchange. The two never overlap.
//!
//! # Example
//!
//! ```rust,no_run
//! use ots_client::{OtsError, ServiceErrorKind};
//!
//! fn report(err: &OtsError) {
//!     match err {
//!         OtsError::Service(e) if e.kind == ServiceErrorKind::Service => {
//!             eprintln!("{} rejected by service: {} ({})", e.operation, e.code, e.message);
//!         },
//!         OtsError::Service(e) => eprintln!("exchange failed: {}", e),
//!         OtsError::Client(e) => eprintln!("bad request: {}", e),
//!     }
//! }
//! ```

use std::fmt;

use thiserror::Error;

use crate::codec::Operation;

/// Errors raised locally, without the service being involved.
///
/// None of these are ever retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// The operation name is not part of the closed operation set.
    #[error("API {0} is not supported")]
    UnsupportedOperation(String),

    /// A caller-supplied argument is missing or out of range.
    #[error("[{operation}] {reason}")]
    InvalidArgument {
        /// Operation whose arguments were rejected.
        operation: Operation,
        /// Human readable description of the problem.
        reason: String,
    },

    /// A loosely-typed value could not be mapped onto a column value.
    #[error("expect string, bool, integer, float, bytes or an infinity marker for column value, not {0}")]
    UnsupportedValueType(String),

    /// A name does not match any variant of a closed set such as column
    /// types or scan directions.
    #[error("{field} should be one of [{expected}], not {value}")]
    UnknownName {
        field: &'static str,
        expected: &'static str,
        value: String,
    },

    /// A numeric value does not fit the wire integer type.
    #[error("{0} exceeds the range of int64")]
    OutOfRange(String),

    /// The response body did not match the expected wire message.
    #[error("Response format is invalid for {operation}: {reason}")]
    Decode {
        /// Operation whose response failed to decode.
        operation: Operation,
        /// Decoder error description.
        reason: String,
    },

    /// The client configuration is unusable (bad endpoint, transport setup).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    pub(crate) fn invalid(operation: Operation, reason: impl Into<String>) -> Self {
        ClientError::InvalidArgument {
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(operation: Operation, reason: impl fmt::Display) -> Self {
        ClientError::Decode {
            operation,
            reason: reason.to_string(),
        }
    }
}

/// Classification of a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceErrorKind {
    /// The transport failed before a response was received (timeout, DNS, reset).
    Network,
    /// A response arrived but its body could not be read.
    ResponseBodyRead,
    /// Missing or malformed response headers, MD5 mismatch, stale date, or an
    /// unparseable error body.
    Protocol,
    /// The response `Authorization` header did not validate.
    Authentication,
    /// The service answered with a structured error code.
    Service,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceErrorKind::Network => write!(f, "network"),
            ServiceErrorKind::ResponseBodyRead => write!(f, "response body read"),
            ServiceErrorKind::Protocol => write!(f, "protocol violation"),
            ServiceErrorKind::Authentication => write!(f, "authentication"),
            ServiceErrorKind::Service => write!(f, "service"),
        }
    }
}

/// A classified failure of one HTTP exchange.
///
/// `code` is only populated for [`ServiceErrorKind::Service`]; the other
/// kinds carry their description in `message`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} error on {operation}{}", context_suffix(.http_status, .code, .message, .request_id))]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub operation: Operation,
    /// HTTP status of the response, absent when no response was received.
    pub http_status: Option<u16>,
    pub code: String,
    pub message: String,
    /// Value of `x-ots-requestid`, empty when the response carried none.
    pub request_id: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, operation: Operation, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation,
            http_status: None,
            code: String::new(),
            message: message.into(),
            request_id: String::new(),
        }
    }

    /// Error reported by the service itself through its error payload.
    pub fn from_service(
        operation: Operation,
        http_status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: ServiceErrorKind::Service,
            operation,
            http_status: Some(http_status),
            code: code.into(),
            message: message.into(),
            request_id: request_id.into(),
        }
    }

    pub fn with_status(mut self, http_status: u16) -> Self {
        self.http_status = Some(http_status);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// True for HTTP 5xx responses.
    pub fn is_server_error(&self) -> bool {
        matches!(self.http_status, Some(status) if (500..600).contains(&status))
    }
}

fn context_suffix(http_status: &Option<u16>, code: &str, message: &str, request_id: &str) -> String {
    let mut suffix = String::new();
    if let Some(status) = http_status {
        suffix.push_str(&format!(", HTTP status: {}", status));
    }
    if !code.is_empty() {
        suffix.push_str(&format!(", ErrorCode: {}", code));
    }
    suffix.push_str(&format!(", ErrorMessage: {}", message));
    if !request_id.is_empty() {
        suffix.push_str(&format!(", RequestID: {}", request_id));
    }
    suffix
}

/// The single error type returned by [`OtsClient`](crate::OtsClient) calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OtsError {
    #[error("[C] {0}")]
    Client(#[from] ClientError),

    #[error("[S] {0}")]
    Service(#[from] ServiceError),
}

impl OtsError {
    pub fn as_client(&self) -> Option<&ClientError> {
        match self {
            OtsError::Client(e) => Some(e),
            OtsError::Service(_) => None,
        }
    }

    pub fn as_service(&self) -> Option<&ServiceError> {
        match self {
            OtsError::Service(e) => Some(e),
            OtsError::Client(_) => None,
        }
    }
}

pub type OtsResult<T> = Result<T, OtsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_display_carries_context() {
        let err = ServiceError::from_service(
            Operation::GetRow,
            503,
            "OTSServerBusy",
            "Server is busy.",
            "0005006c-0e81-db74-4a34-ce0a5df229a1",
        );
        let text = err.to_string();
        assert!(text.contains("GetRow"));
        assert!(text.contains("HTTP status: 503"));
        assert!(text.contains("ErrorCode: OTSServerBusy"));
        assert!(text.contains("RequestID: 0005006c-0e81-db74-4a34-ce0a5df229a1"));
        assert!(err.is_server_error());
    }

    #[test]
    fn network_error_has_no_status() {
        let err = ServiceError::new(ServiceErrorKind::Network, Operation::ListTable, "connection reset");
        assert_eq!(err.http_status, None);
        assert!(!err.is_server_error());
        assert_eq!(err.to_string(), "network error on ListTable, ErrorMessage: connection reset");
    }

    #[test]
    fn ots_error_exposes_exactly_one_side() {
        let err: OtsError = ClientError::UnsupportedOperation("Foo".into()).into();
        assert!(err.as_client().is_some());
        assert!(err.as_service().is_none());
        assert_eq!(err.to_string(), "[C] API Foo is not supported");
    }
}
