//! Clock port
//!
//! Device-code polling is bounded by a deadline and sleeps between polls.
//! Both go through this trait so the loop can be driven without real time
//! passing.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of the current time and of delays
#[async_trait::async_trait]
pub trait IClock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Waits for `duration`
    async fn sleep(&self, duration: Duration);
}
