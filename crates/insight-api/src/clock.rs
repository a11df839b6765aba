//! Clock implementations
//!
//! [`SystemClock`] is used in production. [`ManualClock`] never blocks: each
//! `sleep` advances its time instantly, which lets device-code polling run to
//! its deadline in tests.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use insight_core::ports::IClock;

/// Wall-clock time and `tokio` sleeps
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait::async_trait]
impl IClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock whose time only moves when slept on or advanced
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            slept: Mutex::new(Vec::new()),
        }
    }

    /// Moves time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        if let (Ok(mut now), Ok(delta)) = (self.now.lock(), chrono::Duration::from_std(duration)) {
            *now += delta;
        }
    }

    /// Every duration passed to `sleep`, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[async_trait::async_trait]
impl IClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
        self.advance(duration);
    }
}
