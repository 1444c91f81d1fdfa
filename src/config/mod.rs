//! Client configuration.
//!
//! A [`ClientConfig`] is built once, either directly or through
//! [`loader::load_configuration`], and is immutable afterwards.

pub mod loader;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ClientError;
use crate::logging::mask_secret;
use crate::protocol::Credentials;
use crate::retry::{
    DEFAULT_MAX_RETRY_DELAY, DEFAULT_MAX_RETRY_TIMES, DEFAULT_SCALE_FACTOR, DEFAULT_SERVER_THROTTLING_DELAY_FACTOR,
    DEFAULT_STABILITY_DELAY_FACTOR, DefaultRetryPolicy, NO_DELAY_MAX_RETRY_TIMES, NoDelayRetryPolicy, NoRetryPolicy,
    RetryPolicy,
};

pub use loader::load_configuration;

/// Socket timeout applied to each HTTP exchange (50 seconds).
pub const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 50;

pub fn default_user_agent() -> String {
    format!("ots-client-rust/{}", env!("CARGO_PKG_VERSION"))
}

fn default_socket_timeout_secs() -> u64 {
    DEFAULT_SOCKET_TIMEOUT_SECS
}

#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    /// Service endpoint, e.g. `https://instance.region.ots.aliyuncs.com`.
    pub endpoint: String,
    pub access_id: String,
    pub access_key: String,
    pub instance_name: String,
    #[serde(default = "default_socket_timeout_secs")]
    pub socket_timeout_secs: u64,
    /// Upper bound for a whole call including retries. Unbounded when absent.
    #[serde(default)]
    pub total_timeout_ms: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl ClientConfig {
    pub fn new(
        endpoint: impl Into<String>,
        access_id: impl Into<String>,
        access_key: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_id: access_id.into(),
            access_key: access_key.into(),
            instance_name: instance_name.into(),
            socket_timeout_secs: DEFAULT_SOCKET_TIMEOUT_SECS,
            total_timeout_ms: None,
            user_agent: default_user_agent(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.access_id, &self.access_key, &self.instance_name)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    pub fn total_timeout(&self) -> Option<Duration> {
        self.total_timeout_ms.map(Duration::from_millis)
    }

    /// Checks the configuration and returns the parsed endpoint.
    pub fn validate(&self) -> Result<Url, ClientError> {
        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| ClientError::InvalidConfig(format!("invalid endpoint {}: {}", self.endpoint, e)))?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ClientError::InvalidConfig(format!(
                "protocol of endpoint must be http or https, got {}",
                endpoint.scheme()
            )));
        }
        if endpoint.host_str().is_none_or(str::is_empty) {
            return Err(ClientError::InvalidConfig(format!(
                "endpoint {} has no host",
                self.endpoint
            )));
        }

        for (name, value) in [
            ("access_id", &self.access_id),
            ("access_key", &self.access_key),
            ("instance_name", &self.instance_name),
        ] {
            if value.is_empty() {
                return Err(ClientError::InvalidConfig(format!("{} must not be empty", name)));
            }
        }
        if self.socket_timeout_secs == 0 {
            return Err(ClientError::InvalidConfig("socket_timeout_secs must be positive".to_string()));
        }
        if self.total_timeout_ms == Some(0) {
            return Err(ClientError::InvalidConfig("total_timeout_ms must be positive".to_string()));
        }

        Ok(endpoint)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("access_id", &self.access_id)
            .field("access_key", &mask_secret(&self.access_key))
            .field("instance_name", &self.instance_name)
            .field("socket_timeout_secs", &self.socket_timeout_secs)
            .field("total_timeout_ms", &self.total_timeout_ms)
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicyKind {
    #[default]
    Default,
    NoRetry,
    NoDelay,
}

/// Selects and tunes the retry policy. Unset tunables keep the policy defaults.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub policy: RetryPolicyKind,
    pub max_retry_times: Option<u32>,
    pub max_retry_delay_ms: Option<u64>,
    pub scale_factor: Option<f64>,
    pub server_throttling_delay_factor_ms: Option<u64>,
    pub stability_delay_factor_ms: Option<u64>,
}

impl RetryConfig {
    pub fn policy(policy: RetryPolicyKind) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn build(&self) -> Result<Arc<dyn RetryPolicy>, ClientError> {
        let policy: Arc<dyn RetryPolicy> = match self.policy {
            RetryPolicyKind::NoRetry => Arc::new(NoRetryPolicy),
            RetryPolicyKind::NoDelay => Arc::new(NoDelayRetryPolicy {
                max_retry_times: self.max_retry_times.unwrap_or(NO_DELAY_MAX_RETRY_TIMES),
            }),
            RetryPolicyKind::Default => {
                let scale_factor = self.scale_factor.unwrap_or(DEFAULT_SCALE_FACTOR);
                if !scale_factor.is_finite() || scale_factor < 1.0 {
                    return Err(ClientError::InvalidConfig(format!(
                        "retry scale_factor must be a finite number >= 1, got {}",
                        scale_factor
                    )));
                }
                Arc::new(DefaultRetryPolicy {
                    max_retry_times: self.max_retry_times.unwrap_or(DEFAULT_MAX_RETRY_TIMES),
                    max_retry_delay: self
                        .max_retry_delay_ms
                        .map_or(DEFAULT_MAX_RETRY_DELAY, Duration::from_millis),
                    scale_factor,
                    server_throttling_delay_factor: self
                        .server_throttling_delay_factor_ms
                        .map_or(DEFAULT_SERVER_THROTTLING_DELAY_FACTOR, Duration::from_millis),
                    stability_delay_factor: self
                        .stability_delay_factor_ms
                        .map_or(DEFAULT_STABILITY_DELAY_FACTOR, Duration::from_millis),
                })
            },
        };
        Ok(policy)
    }
}
