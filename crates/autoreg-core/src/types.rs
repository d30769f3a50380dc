//! Domain types exchanged between the scheduler and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bookable class instance from one schedule snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Opaque vendor id, stable across fetches.
    pub id: String,
    pub class_name: String,
    pub start_time: DateTime<Utc>,
    pub location: String,
    /// Calendar day as reported by the vendor (`YYYY-MM-DD`).
    #[serde(default)]
    pub date: String,
    /// Local start time label, e.g. "6:30 PM".
    #[serde(default)]
    pub start_label: String,
    #[serde(default)]
    pub day_of_week: String,
    #[serde(default)]
    pub day_part: String,
}

impl Event {
    /// Event with only the fields the planner needs; the rest default empty.
    pub fn new(id: &str, class_name: &str, start_time: DateTime<Utc>, location: &str) -> Self {
        Self {
            id: id.to_string(),
            class_name: class_name.to_string(),
            start_time,
            location: location.to_string(),
            date: start_time.format("%Y-%m-%d").to_string(),
            start_label: start_time.format("%H:%M UTC").to_string(),
            day_of_week: start_time.format("%A").to_string(),
            day_part: String::new(),
        }
    }

    /// "2025-05-08 6:30 PM" style label for notifications.
    pub fn when(&self) -> String {
        if self.date.is_empty() && self.start_label.is_empty() {
            self.start_time.format("%Y-%m-%d %H:%M UTC").to_string()
        } else {
            format!("{} {}", self.date, self.start_label).trim().to_string()
        }
    }
}

/// Session token pair issued by the vendor login endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionTokens {
    /// `x-ltf-jwe` header value.
    pub jwe: String,
    /// `x-ltf-ssoid` header value.
    pub ssoid: String,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("jwe", &"<redacted>")
            .field("ssoid", &self.ssoid)
            .finish()
    }
}

/// Login credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Result of the first registration step.
#[derive(Debug, Clone, Default)]
pub struct InitiateResponse {
    pub registration_id: Option<String>,
    pub agreement_id: Option<String>,
    /// Full vendor body (JSON when decodable, otherwise the raw text as a string).
    pub diagnostic: Option<serde_json::Value>,
    /// HTTP status when the call reached the vendor.
    pub status: Option<u16>,
}

/// Result of the second registration step.
#[derive(Debug, Clone, Default)]
pub struct CompleteResponse {
    pub success: bool,
    pub status: Option<u16>,
    pub diagnostic: Option<serde_json::Value>,
}

/// One registration attempt (both steps) as seen by the outcome classifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationReport {
    /// Both steps succeeded.
    pub completed: bool,
    pub message: String,
    pub diagnostic: Option<serde_json::Value>,
}

impl RegistrationReport {
    pub fn failed(message: impl Into<String>, diagnostic: Option<serde_json::Value>) -> Self {
        Self {
            completed: false,
            message: message.into(),
            diagnostic,
        }
    }
}

/// Notification priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotifyPriority {
    Low,
    Normal,
    High,
    Urgent,
}

/// A human-readable status message for the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub priority: NotifyPriority,
    /// Which component or event produced it.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(title: &str, body: &str, source: &str, priority: NotifyPriority) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            priority,
            source: source.to_string(),
            timestamp: Utc::now(),
        }
    }
}
