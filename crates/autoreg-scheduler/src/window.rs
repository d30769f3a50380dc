//! Attempt window planning.
//!
//! ```text
//!   attempt_start      official_open                 attempt_end
//!        |<-- lead -->|                                   |
//!        |<------------------ attempt duration ---------->|
//! ```
//! An event first seen after its ideal `attempt_end` gets a short catch-up
//! window starting now instead.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use autoreg_core::config::{MAX_REGISTRATION_LEAD_MINUTES, TimingConfig};

/// Which rule produced the window end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowKind {
    Normal,
    CatchUp,
}

impl std::fmt::Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowKind::Normal => write!(f, "normal"),
            WindowKind::CatchUp => write!(f, "catch-up"),
        }
    }
}

/// Registration window for one event, recomputed on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationWindow {
    pub official_open: DateTime<Utc>,
    pub attempt_start: DateTime<Utc>,
    pub attempt_end: DateTime<Utc>,
    pub kind: WindowKind,
}

/// Planner verdict for one event at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    /// Nothing to do before `attempt_start`.
    NotYetDue {
        attempt_start: DateTime<Utc>,
        official_open: DateTime<Utc>,
    },
    Due(RegistrationWindow),
}

/// Timing constants the planner needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub registration_lead: Duration,
    pub attempt_lead: Duration,
    pub attempt_duration: Duration,
    pub catch_up_duration: Duration,
}

impl WindowPolicy {
    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self {
            registration_lead: minutes(timing.registration_lead_minutes),
            attempt_lead: secs(timing.attempt_lead_secs),
            attempt_duration: secs(timing.attempt_duration_secs),
            catch_up_duration: secs(timing.catch_up_duration_secs),
        }
    }

    /// When the vendor opens registration for a class starting at `start_time`.
    pub fn official_open(&self, start_time: DateTime<Utc>) -> DateTime<Utc> {
        sub(start_time, self.registration_lead)
    }

    /// When attempts for a class starting at `start_time` should begin.
    pub fn attempt_start(&self, start_time: DateTime<Utc>) -> DateTime<Utc> {
        sub(self.official_open(start_time), self.attempt_lead)
    }

    pub fn plan(&self, start_time: DateTime<Utc>, now: DateTime<Utc>) -> WindowDecision {
        let official_open = self.official_open(start_time);
        let attempt_start = sub(official_open, self.attempt_lead);

        if now < attempt_start {
            return WindowDecision::NotYetDue {
                attempt_start,
                official_open,
            };
        }

        let ideal_end = add(attempt_start, self.attempt_duration);
        let (attempt_end, kind) = if now > ideal_end {
            (add(now, self.catch_up_duration), WindowKind::CatchUp)
        } else {
            (ideal_end, WindowKind::Normal)
        };

        WindowDecision::Due(RegistrationWindow {
            official_open,
            attempt_start,
            attempt_end,
            kind,
        })
    }
}

/// Caps configured durations so date arithmetic cannot overflow.
const MAX_CONFIG_SECS: u64 = 100 * 365 * 24 * 60 * 60;

pub(crate) fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_CONFIG_SECS) as i64)
}

fn minutes(value: i64) -> Duration {
    Duration::minutes(value.clamp(0, MAX_REGISTRATION_LEAD_MINUTES))
}

fn sub(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_sub_signed(by).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn add(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
