//! Retry policies and the per-call retry state machine.
//!
//! A policy answers two questions for a failed attempt: should the request be
//! resent, and after how long. [`RetryState`] applies a policy to one call,
//! counting retries and tracking where the call is in its lifecycle.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::codec::Operation;
use crate::error::{ServiceError, ServiceErrorKind};

pub const DEFAULT_MAX_RETRY_TIMES: u32 = 6;
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_SCALE_FACTOR: f64 = 2.0;
pub const DEFAULT_SERVER_THROTTLING_DELAY_FACTOR: Duration = Duration::from_millis(500);
pub const DEFAULT_STABILITY_DELAY_FACTOR: Duration = Duration::from_millis(200);
pub const NO_DELAY_MAX_RETRY_TIMES: u32 = 3;

const QUOTA_EXHAUSTED: &str = "OTSQuotaExhausted";
const TOO_FREQUENT_TABLE_OPERATIONS: &str = "Too frequent table operations.";

/// Codes retried for every operation.
const ALWAYS_RETRIABLE_CODES: [&str; 6] = [
    "OTSRowOperationConflict",
    "OTSNotEnoughCapacityUnit",
    "OTSTableNotReady",
    "OTSPartitionUnavailable",
    "OTSServerBusy",
    "OTSOperationThrottled",
];

/// Codes retried only for idempotent operations, where resending after an
/// unknown outcome is harmless.
const AMBIGUOUS_OUTCOME_CODES: [&str; 3] = ["OTSTimeout", "OTSInternalServerError", "OTSServerUnavailable"];

const THROTTLING_CODES: [&str; 3] = ["OTSServerBusy", "OTSNotEnoughCapacityUnit", "OTSOperationThrottled"];

/// Decides whether and when a failed request is resent.
///
/// `attempt` is the number of retries already performed for the call (0 on
/// the first failure). Implementations must be stateless across calls.
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    fn should_retry(&self, attempt: u32, error: &ServiceError, operation: Operation) -> bool;

    fn retry_delay(&self, attempt: u32, error: &ServiceError, operation: Operation) -> Duration;
}

fn is_quota_too_frequent(error: &ServiceError) -> bool {
    error.code == QUOTA_EXHAUSTED && error.message == TOO_FREQUENT_TABLE_OPERATIONS
}

/// Errors worth retrying whatever the operation.
pub fn should_retry_any_operation(error: &ServiceError) -> bool {
    error.kind == ServiceErrorKind::Service
        && (ALWAYS_RETRIABLE_CODES.contains(&error.code.as_str()) || is_quota_too_frequent(error))
}

/// Errors after which the request may or may not have been applied.
pub fn is_ambiguous_outcome(error: &ServiceError) -> bool {
    match error.kind {
        ServiceErrorKind::Network | ServiceErrorKind::ResponseBodyRead => true,
        ServiceErrorKind::Service => {
            AMBIGUOUS_OUTCOME_CODES.contains(&error.code.as_str()) || error.is_server_error()
        },
        ServiceErrorKind::Protocol | ServiceErrorKind::Authentication => false,
    }
}

pub fn is_server_throttling(error: &ServiceError) -> bool {
    error.kind == ServiceErrorKind::Service
        && (THROTTLING_CODES.contains(&error.code.as_str()) || is_quota_too_frequent(error))
}

fn is_retriable(error: &ServiceError, operation: Operation) -> bool {
    should_retry_any_operation(error) || (operation.is_idempotent() && is_ambiguous_outcome(error))
}

/// Exponential back-off with jitter, separating throttling from instability.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultRetryPolicy {
    pub max_retry_times: u32,
    pub max_retry_delay: Duration,
    pub scale_factor: f64,
    /// Base delay for throttling errors.
    pub server_throttling_delay_factor: Duration,
    /// Base delay for every other retriable error.
    pub stability_delay_factor: Duration,
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_times: DEFAULT_MAX_RETRY_TIMES,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            scale_factor: DEFAULT_SCALE_FACTOR,
            server_throttling_delay_factor: DEFAULT_SERVER_THROTTLING_DELAY_FACTOR,
            stability_delay_factor: DEFAULT_STABILITY_DELAY_FACTOR,
        }
    }
}

impl DefaultRetryPolicy {
    /// Upper bound of the delay before retry number `attempt + 1`.
    pub fn delay_limit(&self, attempt: u32, error: &ServiceError) -> Duration {
        let factor = if is_server_throttling(error) {
            self.server_throttling_delay_factor
        } else {
            self.stability_delay_factor
        };

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let limit_secs = factor.as_secs_f64() * self.scale_factor.powi(exponent);
        let max_secs = self.max_retry_delay.as_secs_f64();

        if limit_secs.is_nan() || limit_secs <= 0.0 {
            Duration::ZERO
        } else if limit_secs >= max_secs {
            self.max_retry_delay
        } else {
            Duration::from_secs_f64(limit_secs)
        }
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn should_retry(&self, attempt: u32, error: &ServiceError, operation: Operation) -> bool {
        attempt < self.max_retry_times && is_retriable(error, operation)
    }

    /// Uniform in `[limit / 2, limit]`.
    fn retry_delay(&self, attempt: u32, error: &ServiceError, _operation: Operation) -> Duration {
        let limit = self.delay_limit(attempt, error);
        if limit.is_zero() {
            return Duration::ZERO;
        }
        let half = limit / 2;
        half + half.mul_f64(rand::thread_rng().gen_range(0.0..=1.0))
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn should_retry(&self, _attempt: u32, _error: &ServiceError, _operation: Operation) -> bool {
        false
    }

    fn retry_delay(&self, _attempt: u32, _error: &ServiceError, _operation: Operation) -> Duration {
        Duration::ZERO
    }
}

/// Same retry rules as [`DefaultRetryPolicy`], resending immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoDelayRetryPolicy {
    pub max_retry_times: u32,
}

impl Default for NoDelayRetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_times: NO_DELAY_MAX_RETRY_TIMES,
        }
    }
}

impl RetryPolicy for NoDelayRetryPolicy {
    fn should_retry(&self, attempt: u32, error: &ServiceError, operation: Operation) -> bool {
        attempt < self.max_retry_times && is_retriable(error, operation)
    }

    fn retry_delay(&self, _attempt: u32, _error: &ServiceError, _operation: Operation) -> Duration {
        Duration::ZERO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Idle,
    Attempting,
    Retrying,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Sleep for the delay, then resend.
    Retry(Duration),
    /// Give up and surface the error.
    Fail(ServiceError),
}

/// Retry bookkeeping for a single call.
#[derive(Debug, Clone)]
pub struct RetryState {
    operation: Operation,
    attempt_count: u32,
    phase: RetryPhase,
    last_error: Option<ServiceError>,
}

impl RetryState {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            attempt_count: 0,
            phase: RetryPhase::Idle,
            last_error: None,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Retries performed so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&ServiceError> {
        self.last_error.as_ref()
    }

    pub fn begin_attempt(&mut self) {
        self.phase = RetryPhase::Attempting;
    }

    pub fn on_success(&mut self) {
        self.phase = RetryPhase::Succeeded;
    }

    /// Records a failed attempt and decides what happens next.
    ///
    /// A retry whose delay would end past `deadline` is turned into a
    /// failure carrying the current error.
    pub fn on_error(
        &mut self,
        error: ServiceError,
        policy: &dyn RetryPolicy,
        deadline: Option<Instant>,
    ) -> RetryDecision {
        if !policy.should_retry(self.attempt_count, &error, self.operation) {
            return self.fail(error);
        }

        let delay = policy.retry_delay(self.attempt_count, &error, self.operation);
        if deadline.is_some_and(|deadline| Instant::now() + delay > deadline) {
            return self.fail(error);
        }

        self.attempt_count += 1;
        self.phase = RetryPhase::Retrying;
        self.last_error = Some(error);
        RetryDecision::Retry(delay)
    }

    fn fail(&mut self, error: ServiceError) -> RetryDecision {
        self.phase = RetryPhase::Failed;
        self.last_error = Some(error.clone());
        RetryDecision::Fail(error)
    }
}
