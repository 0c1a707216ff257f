//! The resilient fetch pipeline.
//!
//! `fetch` checks the cache, then runs bounded retries where each attempt
//! waits on the service's rate limiter, calls the transport, and validates
//! the body structurally and by range. Only a fully validated record is
//! cached and handed to the persistence sink.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::TtlCache;
use crate::clean::{DataCleaner, ValidationError};
use crate::clock::Clock;
use crate::rate_limit::RateLimiter;
use crate::retry::{RetryConfig, RetryDecision, RetryError, RetryPolicy, Retried, Retryable};
use crate::transport::{Transport, TransportError, TransportRequest};
use crate::types::{RecordKind, RequestKey, Service, ValidatedRecord};
use crate::validate::{self, StructuralError};

pub const DEFAULT_MIN_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// How long a validated record stays cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlPolicy {
    Fixed(Duration),
    /// Sun times expire at the next sunrise or sunset; `fallback` applies
    /// once both events of the day have passed.
    UntilNextSunEvent { fallback: Duration },
}

impl TtlPolicy {
    pub fn ttl_for(&self, record: &ValidatedRecord, now: DateTime<Utc>) -> Duration {
        match self {
            Self::Fixed(ttl) => *ttl,
            Self::UntilNextSunEvent { fallback } => record
                .as_sun_times()
                .and_then(|times| times.next_event_after(now))
                .and_then(|event| event.signed_duration_since(now).to_std().ok())
                .unwrap_or(*fallback),
        }
    }
}

/// Per-service cadence, retry budget and cache lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct ServicePolicy {
    pub min_interval: Duration,
    pub retry: RetryConfig,
    pub ttl: TtlPolicy,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
            retry: RetryConfig::default(),
            ttl: TtlPolicy::Fixed(Duration::from_secs(DEFAULT_CACHE_TTL_SECS)),
        }
    }
}

/// A logical request: cache identity, expected payload and the HTTP call.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub key: RequestKey,
    pub kind: RecordKind,
    pub http: TransportRequest,
}

impl FetchRequest {
    pub fn new(key: RequestKey, kind: RecordKind, http: TransportRequest) -> Self {
        Self { key, kind, http }
    }
}

/// Where validated records go after a fetch (the record store).
pub trait RecordSink: Send + Sync {
    fn store(&self, key: &RequestKey, record: &ValidatedRecord) -> std::io::Result<()>;
}

/// The single error a fetch reports.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Not produced: limiter waits instead of failing.
    #[error("Rate limited by {0}")]
    RateLimited(Service),

    #[error("Invalid response: {0}")]
    Structural(StructuralError),

    #[error("Invalid data: {0}")]
    Validation(ValidationError),

    #[error("Gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },

    #[error(transparent)]
    Transport(TransportError),

    /// A lookup succeeded but matched nothing.
    #[error("No match for {0:?}")]
    NotFound(String),
}

impl FetchError {
    /// UI-appropriate text for weather-search call sites.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "Too many requests. Please wait a moment.",
            Self::Structural(_) | Self::Validation(_) => {
                "Received unexpected data from the weather service. Please try again."
            }
            Self::RetriesExhausted { .. } => {
                "The weather service is unavailable right now. Please try again later."
            }
            Self::Transport(e) => e.user_message(),
            Self::NotFound(_) => "Location not found. Check the city name and try again.",
        }
    }
}

/// Failure of one attempt, before retry classification
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Retryable for AttemptError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            Self::Transport(e) => e.retry_decision(),
            // A well-formed but wrong answer will not fix itself
            Self::Structural(_) | Self::Validation(_) => RetryDecision::NoRetry,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transport(e) => e.retry_after(),
            _ => None,
        }
    }
}

impl From<RetryError<AttemptError>> for FetchError {
    fn from(e: RetryError<AttemptError>) -> Self {
        match e {
            RetryError::Exhausted {
                attempts,
                last: AttemptError::Transport(last),
            } => Self::RetriesExhausted { attempts, last },
            other => match other.into_inner() {
                AttemptError::Transport(e) => Self::Transport(e),
                AttemptError::Structural(e) => Self::Structural(e),
                AttemptError::Validation(e) => Self::Validation(e),
            },
        }
    }
}

/// Cache, limiter, retry and validation around every remote call.
///
/// `Send + Sync`; share it with `Arc`.
pub struct ResilientClient {
    policies: HashMap<Service, ServicePolicy>,
    default_policy: ServicePolicy,
    limiter: RateLimiter<Service>,
    cache: TtlCache<RequestKey, Arc<ValidatedRecord>>,
    cleaner: DataCleaner,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn RecordSink>>,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("policies", &self.policies)
            .field("cleaner", &self.cleaner)
            .field("cache", &self.cache)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl ResilientClient {
    pub fn new(cleaner: DataCleaner, clock: Arc<dyn Clock>) -> Self {
        let default_policy = ServicePolicy::default();
        Self {
            policies: HashMap::new(),
            limiter: RateLimiter::new(default_policy.min_interval),
            cache: TtlCache::new(Duration::from_secs(DEFAULT_CACHE_TTL_SECS), clock.clone()),
            default_policy,
            cleaner,
            clock,
            sink: None,
        }
    }

    pub fn with_policy(mut self, service: Service, policy: ServicePolicy) -> Self {
        self.limiter = self.limiter.with_interval(service, policy.min_interval);
        self.policies.insert(service, policy);
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = self.cache.with_capacity(capacity);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn policy(&self, service: Service) -> &ServicePolicy {
        self.policies.get(&service).unwrap_or(&self.default_policy)
    }

    pub fn cleaner(&self) -> &DataCleaner {
        &self.cleaner
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Drop a cached record so the next fetch goes to the network.
    pub fn invalidate(&self, key: &RequestKey) {
        self.cache.remove(key);
    }

    /// Fetch and validate one record.
    ///
    /// # Errors
    /// Exactly one `FetchError`; invalid responses are never cached.
    #[tracing::instrument(skip_all, fields(key = %request.key))]
    pub async fn fetch<T: Transport>(
        &self,
        request: &FetchRequest,
        transport: &T,
    ) -> Result<Arc<ValidatedRecord>, FetchError> {
        if let Some(record) = self.cache.get(&request.key) {
            tracing::debug!("Cache hit");
            return Ok(record);
        }

        let policy = self.policy(request.key.service());
        let retry = RetryPolicy::new(policy.retry.clone());
        let Retried { value, attempts } = retry
            .execute(|| self.attempt(request, transport))
            .await
            .map_err(|e| {
                tracing::warn!("Fetch failed after {} attempt(s): {}", e.attempts(), e);
                FetchError::from(e)
            })?;

        let record = Arc::new(value);
        let ttl = policy.ttl.ttl_for(&record, self.clock.now());
        tracing::debug!("Fetched in {} attempt(s), caching for {:?}", attempts, ttl);
        self.cache
            .put(request.key.clone(), record.clone(), ttl);

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.store(&request.key, &record) {
                tracing::warn!("Failed to persist {}: {}", request.key, e);
            }
        }

        Ok(record)
    }

    async fn attempt<T: Transport>(
        &self,
        request: &FetchRequest,
        transport: &T,
    ) -> Result<ValidatedRecord, AttemptError> {
        self.limiter.acquire(&request.key.service()).await;
        let response = transport.get(&request.http).await?;
        let raw = validate::parse(&response.body)?;
        let raw = validate::check(&raw, request.kind.required_paths())?;
        Ok(self.cleaner.clean(raw, request.kind)?)
    }
}
