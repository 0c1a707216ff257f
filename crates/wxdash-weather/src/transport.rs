//! HTTP transport seam.
//!
//! The resilient client only needs "GET this URL with these query
//! parameters"; `HttpTransport` does that with reqwest and tests swap in
//! canned responses.

use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::retry::{is_retryable_status, RetryDecision, Retryable};

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("wxdash/", env!("CARGO_PKG_VERSION"));
/// Longest error body kept in a `TransportError::Status`
const MAX_ERROR_BODY: usize = 256;

/// One outbound GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub timeout: Duration,
}

impl TransportRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A successful response. Owned by one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("Request failed: {0}")]
    Request(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout => "The request timed out. Please try again.",
            Self::Connect(_) => "Unable to connect. Check your internet connection.",
            Self::Status { status: 401, .. } => "Invalid API key. Check your settings.",
            Self::Status { status: 404, .. } => "Location not found.",
            Self::Status { status: 429, .. } => {
                "Too many requests to the weather service. Please wait a moment."
            }
            Self::Status { status, .. } if *status >= 500 => {
                "The weather service is experiencing issues. Please try again later."
            }
            Self::Status { .. } | Self::Request(_) => "The request failed. Please try again.",
        }
    }
}

impl Retryable for TransportError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            Self::Timeout | Self::Connect(_) => RetryDecision::Retry,
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Request(_) => RetryDecision::NoRetry,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                retry_after: None,
                message: e.to_string(),
            }
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Performs HTTP GETs for the resilient client.
pub trait Transport: Send + Sync {
    fn get(
        &self,
        request: &TransportRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn get(
        &self,
        request: &TransportRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send {
        (**self).get(request)
    }
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Arc<Client>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }
}

impl Transport for HttpTransport {
    async fn get(&self, request: &TransportRequest) -> Result<RawResponse, TransportError> {
        tracing::debug!("GET {}", request.url);

        let response = self
            .client
            .get(&request.url)
            .query(&request.query)
            .timeout(request.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now()));
            let body = response.text().await.unwrap_or_default();
            let message: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
            tracing::debug!("{} returned {}: {}", request.url, status, message);
            return Err(TransportError::Status {
                status: status.as_u16(),
                retry_after,
                message,
            });
        }

        let body = response.bytes().await?;
        Ok(RawResponse {
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}

/// `Retry-After` is either delta-seconds or an HTTP date.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    // A date in the past means "now"
    Some(
        at.with_timezone(&Utc)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_retry_after_seconds() {
        assert_eq!(parse_retry_after("120", Utc::now()), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 5 ", Utc::now()), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_retry_after_http_date() {
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap();
        assert_eq!(
            parse_retry_after("Wed, 01 Jul 2026 12:00:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 01 Jul 2026 11:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn test_classification() {
        let status = |code| TransportError::Status {
            status: code,
            retry_after: None,
            message: String::new(),
        };
        assert_eq!(TransportError::Timeout.retry_decision(), RetryDecision::Retry);
        assert_eq!(
            TransportError::Connect("reset".into()).retry_decision(),
            RetryDecision::Retry
        );
        assert_eq!(status(503).retry_decision(), RetryDecision::Retry);
        assert_eq!(status(429).retry_decision(), RetryDecision::Retry);
        assert_eq!(status(404).retry_decision(), RetryDecision::NoRetry);
        assert_eq!(status(401).retry_decision(), RetryDecision::NoRetry);
        assert_eq!(
            TransportError::Request("bad url".into()).retry_decision(),
            RetryDecision::NoRetry
        );
    }

    #[test]
    fn test_retry_after_hint_exposed() {
        let err = TransportError::Status {
            status: 429,
            retry_after: Some(Duration::from_secs(7)),
            message: String::new(),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(TransportError::Timeout.retry_after(), None);
    }

    #[test]
    fn test_user_messages() {
        let status = |code| TransportError::Status {
            status: code,
            retry_after: None,
            message: String::new(),
        };
        assert!(status(401).user_message().contains("API key"));
        assert!(status(502).user_message().contains("experiencing issues"));
        assert!(TransportError::Timeout.user_message().contains("timed out"));
    }

    #[test]
    fn test_request_builder() {
        let request = TransportRequest::new("https://example.com/json")
            .param("lat", 33.45)
            .param("formatted", 0)
            .timeout(Duration::from_secs(3));
        assert_eq!(
            request.query,
            vec![
                ("lat".to_string(), "33.45".to_string()),
                ("formatted".to_string(), "0".to_string())
            ]
        );
        assert_eq!(request.timeout, Duration::from_secs(3));
    }
}
