//! Time source for the scheduler.
//!
//! Every "now" and every wait goes through [`Clock`], so the loop and the
//! retry driver can be run against a simulated clock in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Wait for `duration` (non-positive durations return immediately).
    async fn sleep(&self, duration: chrono::Duration);
}

/// Wall clock + tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: chrono::Duration) {
        if let Ok(std_duration) = duration.to_std() {
            tokio::time::sleep(std_duration).await;
        }
    }
}
