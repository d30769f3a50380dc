//! # AutoReg Core
//! Shared configuration, error taxonomy, domain types and the traits the
//! scheduler uses to talk to the outside world.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::AutoRegConfig;
pub use error::{AutoRegError, Result};
