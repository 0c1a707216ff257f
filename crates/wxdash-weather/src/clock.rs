//! Wall-clock abstraction so cache expiry and day/night decisions can be
//! tested without waiting for real time to pass.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.current.lock() = time;
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock();
        if let Some(next) = chrono::Duration::from_std(by)
            .ok()
            .and_then(|delta| current.checked_add_signed(delta))
        {
            *current = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}
