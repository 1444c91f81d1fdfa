//! Signed RPC client for the OTS tabular-storage service.
//!
//! Requests are protobuf messages POSTed to `{endpoint}/{Operation}` and
//! signed with HMAC-SHA1. Responses are checked for integrity and
//! authenticity before they are decoded, and failed exchanges are retried
//! according to a [`RetryPolicy`].

pub mod classify;
pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod retry;
pub mod transport;

pub use crate::client::OtsClient;
pub use crate::codec::{ColumnMap, ColumnValue, Operation, OtsRequest, PrimaryKey};
pub use crate::config::{ClientConfig, RetryConfig, RetryPolicyKind};
pub use crate::error::{ClientError, OtsError, OtsResult, ServiceError, ServiceErrorKind};
pub use crate::retry::{DefaultRetryPolicy, NoDelayRetryPolicy, NoRetryPolicy, RetryPolicy};
pub use crate::transport::{ReqwestTransport, Transport};
