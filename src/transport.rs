//! HTTP transport: "send bytes, get status + headers + bytes back".
//!
//! The client only depends on the [`Transport`] trait; [`ReqwestTransport`]
//! is the production implementation.

use std::future::Future;
use std::time::{Duration, Instant};

use log::trace;
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

use crate::error::ClientError;
use crate::protocol::Headers;

/// A fully signed request ready to be POSTed.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub url: Url,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Raw HTTP response. Header keys are lower-cased.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl ResponseEnvelope {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    /// Status and headers arrived but the body could not be read.
    #[error("failed to read response body: {0}")]
    BodyRead(String),
}

impl TransportError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

pub trait Transport: Send + Sync {
    fn send(&self, request: TransportRequest) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    last_latency: RwLock<Option<(Duration, Instant)>>,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ClientError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            last_latency: RwLock::new(None),
        })
    }

    async fn update_latency(&self, duration: Duration) {
        *self.last_latency.write().await = Some((duration, Instant::now()));
    }

    /// Round-trip time of the most recent completed exchange.
    pub async fn last_latency(&self) -> Option<Duration> {
        self.last_latency.read().await.map(|(d, _)| d)
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<ResponseEnvelope, TransportError> {
        let start = Instant::now();

        let mut builder = self.client.post(request.url).body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(TransportError::from_reqwest)?;
        let status = response.status();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::BodyRead(e.to_string()))?;

        let latency = start.elapsed();
        self.update_latency(latency).await;
        trace!(status = status.as_u16(), latency_ms = latency.as_millis() as u64; "HTTP exchange completed");

        Ok(ResponseEnvelope {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: body.to_vec(),
        })
    }
}
