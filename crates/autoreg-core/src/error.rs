//! Error taxonomy shared by every AutoReg crate.

use thiserror::Error;

/// All failures the scheduler and its collaborators can report.
///
/// Registration attempts are not represented here: an attempt that reaches the
/// vendor always produces a report that the outcome classifier interprets.
/// `Registration` only covers transport failures (timeouts, refused
/// connections, undecodable bodies).
#[derive(Debug, Error)]
pub enum AutoRegError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Schedule fetch failed: {0}")]
    Fetch(String),

    #[error("Registration transport error: {0}")]
    Registration(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AutoRegError>;
