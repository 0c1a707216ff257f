//! Resilient weather data access for wxdash
//!
//! Rate-limited, retried, validated and cached access to the remote
//! weather, geolocation and sunrise/sunset services, plus the scheduler
//! behind the automatic day/night theme.

pub mod api;
pub mod cache;
pub mod clean;
pub mod client;
pub mod clock;
pub mod rate_limit;
pub mod retry;
pub mod service;
pub mod theme;
pub mod transport;
pub mod types;
pub mod validate;

pub use api::{Endpoints, WeatherApi};
pub use cache::TtlCache;
pub use clean::{DataCleaner, FieldIssue, ValidationError};
pub use client::{FetchError, FetchRequest, RecordSink, ResilientClient, ServicePolicy, TtlPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limit::RateLimiter;
pub use retry::{RetryConfig, RetryDecision, RetryError, RetryPolicy, Retried, Retryable};
pub use service::WeatherServiceMessage;
pub use theme::{ChannelPublisher, SchedulerEvent, ThemeDecision, ThemePublisher, ThemeScheduler};
pub use transport::{HttpTransport, RawResponse, Transport, TransportError, TransportRequest};
pub use types::*;
pub use validate::StructuralError;
