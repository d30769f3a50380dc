//! # AutoReg Providers
//!
//! reqwest-backed implementations of the vendor-facing collaborator traits.
//!
//! ```text
//! LifetimeClient (shared reqwest::Client + header profile)
//!   ├── LifetimeAuth          POST /auth/v2/login
//!   ├── LifetimeSchedule      GET  /ux/web-schedules/v2/schedules/classes → ScheduleFilter
//!   └── LifetimeRegistration  POST /sys/registrations/V3/ux/event
//!                             PUT  /sys/registrations/V3/ux/event/{regId}/complete
//! ```

pub mod auth;
pub mod client;
pub mod registration;
pub mod schedule;

pub use auth::LifetimeAuth;
pub use client::LifetimeClient;
pub use registration::LifetimeRegistration;
pub use schedule::{LifetimeSchedule, ScheduleFilter};
