//! # AutoReg Scheduler
//!
//! Single-task scheduling loop that registers for classes the moment their
//! registration window opens.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (one tokio task)
//!   ├── refresh (every refresh interval)
//!   │     Authenticator::login → ScheduleSource::fetch → snapshot
//!   │     └── digest → NotifyRouter (Low)
//!   ├── evaluate (each cycle, ascending start time)
//!   │     WindowPolicy::plan → NotYetDue | Due(window)
//!   │     └── RetryDriver: initiate → complete → classify
//!   │           ├── SUCCESS / FATAL / WINDOW_EXPIRED → Ledger + NotifyRouter
//!   │           └── TOO_SOON at window end → pending, re-evaluated next cycle
//!   └── sleep until earliest deadline (clamped)
//! ```

pub mod classifier;
pub mod clock;
pub mod engine;
pub mod ledger;
pub mod notify;
pub mod retry;
pub mod window;

#[cfg(test)]
mod testing;

pub use classifier::{AttemptOutcome, FatalReason, OutcomeClassifier, OutcomeKind, VendorClassifier};
pub use clock::{Clock, SystemClock};
pub use engine::{Collaborators, CycleReport, SchedulerEngine, SchedulerSettings, SchedulerState};
pub use ledger::{Ledger, ProcessedRecord, RecordStatus};
pub use notify::NotifyRouter;
pub use retry::{Disposition, RetryDriver, RetryPolicy, attempt_registration};
pub use window::{RegistrationWindow, WindowDecision, WindowKind, WindowPolicy};
