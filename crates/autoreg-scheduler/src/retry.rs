//! Retry driver: runs bounded registration attempts inside one window.
//!
//! ```text
//! ATTEMPTING ──success──▶ SUCCEEDED        (record + notify)
//!     │      ──fatal────▶ FATAL_TERMINAL   (record + notify)
//!     │      ──window end, last outcome too-soon ──▶ pending (no record)
//!     └──────window end, anything else ────────────▶ WINDOW_EXPIRED (record + notify)
//! ```

use autoreg_core::traits::RegistrationTransport;
use autoreg_core::types::{Event, NotifyPriority, RegistrationReport, SessionTokens};
use chrono::Duration;

use crate::classifier::{AttemptOutcome, FatalReason, OutcomeClassifier, OutcomeKind};
use crate::clock::Clock;
use crate::ledger::{Ledger, ProcessedRecord, RecordStatus};
use crate::notify::NotifyRouter;
use crate::window::RegistrationWindow;

/// Spacing and cap for attempts within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_interval: Duration,
    /// Optional hard cap on attempts per window.
    pub max_attempts: Option<u32>,
}

/// How the driver left an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Succeeded,
    Fatal(FatalReason),
    WindowExpired,
    /// Window ended while the vendor still said "too soon": re-evaluate next cycle.
    Pending,
}

impl Disposition {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Disposition::Pending)
    }

    fn record_status(&self) -> Option<RecordStatus> {
        match self {
            Disposition::Succeeded => Some(RecordStatus::Success),
            Disposition::Fatal(FatalReason::AlreadyRegistered) => {
                Some(RecordStatus::FatalAlreadyRegistered)
            }
            Disposition::Fatal(FatalReason::ReservationConflict) => {
                Some(RecordStatus::FatalReservationConflict)
            }
            Disposition::Fatal(FatalReason::ApiError) => Some(RecordStatus::FatalApiError),
            Disposition::WindowExpired => Some(RecordStatus::FailureWindowExpired),
            Disposition::Pending => None,
        }
    }
}

/// Result of driving one event through one window.
#[derive(Debug, Clone)]
pub struct DriveReport {
    pub disposition: Disposition,
    pub attempts: u32,
    pub last_outcome: Option<AttemptOutcome>,
}

impl DriveReport {
    pub fn last_message(&self) -> &str {
        self.last_outcome
            .as_ref()
            .map(|o| o.message.as_str())
            .unwrap_or("No attempt was made")
    }
}

/// One registration attempt: initiate, then complete.
///
/// Any failure in the first step skips the second; the caller only ever sees
/// a single report for the pair.
pub async fn attempt_registration(
    transport: &dyn RegistrationTransport,
    event_id: &str,
    member_ids: &[u64],
    tokens: &SessionTokens,
) -> RegistrationReport {
    let initiated = match transport.initiate(event_id, member_ids, tokens).await {
        Ok(resp) => resp,
        Err(e) => return RegistrationReport::failed(format!("Step 1 (initiate) failed: {e}"), None),
    };

    let fatal = initiated
        .diagnostic
        .as_ref()
        .and_then(|d| d.pointer("/validation/isFatal"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let status = initiated
        .status
        .map(|s| format!(" (HTTP {s})"))
        .unwrap_or_default();

    let (registration_id, agreement_id) = match (
        fatal,
        initiated.registration_id.as_deref(),
        initiated.agreement_id.as_deref(),
    ) {
        (true, _, _) => {
            return RegistrationReport::failed(
                format!("Step 1 rejected: fatal validation error{status}"),
                initiated.diagnostic,
            );
        }
        (false, None, _) => {
            return RegistrationReport::failed(
                format!("Step 1 returned no registration id{status}"),
                initiated.diagnostic,
            );
        }
        (false, Some(_), None) => {
            return RegistrationReport::failed(
                format!("Step 1 returned no agreement id{status}"),
                initiated.diagnostic,
            );
        }
        (false, Some(reg), Some(agreement)) => (reg.to_string(), agreement.to_string()),
    };

    tracing::debug!("Step 1 ok for {event_id} (reg id {registration_id}), completing");

    match transport
        .complete(&registration_id, member_ids, &agreement_id, tokens)
        .await
    {
        Ok(done) if done.success => RegistrationReport {
            completed: true,
            message: format!("Registration completed for event {event_id}"),
            diagnostic: done.diagnostic,
        },
        Ok(done) => RegistrationReport::failed(
            format!(
                "Step 2 (complete) rejected{}",
                done.status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
            ),
            done.diagnostic,
        ),
        Err(e) => RegistrationReport::failed(format!("Step 2 (complete) failed: {e}"), None),
    }
}

/// Drives one due event to a disposition, records it and notifies.
pub struct RetryDriver<'a> {
    transport: &'a dyn RegistrationTransport,
    classifier: &'a dyn OutcomeClassifier,
    clock: &'a dyn Clock,
    policy: RetryPolicy,
    member_ids: &'a [u64],
}

impl<'a> RetryDriver<'a> {
    pub fn new(
        transport: &'a dyn RegistrationTransport,
        classifier: &'a dyn OutcomeClassifier,
        clock: &'a dyn Clock,
        policy: RetryPolicy,
        member_ids: &'a [u64],
    ) -> Self {
        Self {
            transport,
            classifier,
            clock,
            policy,
            member_ids,
        }
    }

    /// Drive, then write the ledger and notify for terminal dispositions.
    pub async fn run(
        &self,
        event: &Event,
        window: &RegistrationWindow,
        tokens: &SessionTokens,
        ledger: &mut Ledger,
        router: &NotifyRouter,
    ) -> DriveReport {
        let report = self.drive(event, window, tokens).await;

        let Some(status) = report.disposition.record_status() else {
            tracing::info!(
                "⏳ {} ({}) still too soon after {} attempt(s); leaving pending: {}",
                event.class_name,
                event.id,
                report.attempts,
                report.last_message()
            );
            return report;
        };

        let record = ProcessedRecord {
            event_id: event.id.clone(),
            class_name: Some(event.class_name.clone()),
            event_time: Some(event.start_time),
            registration_open_time: Some(window.official_open),
            status,
            message: report.last_message().to_string(),
            attempts_made: report.attempts,
            processed_at: self.clock.now(),
        };
        if let Err(e) = ledger.upsert(record) {
            tracing::error!("❌ Ledger save failed after {} ({}): {e}", event.id, status);
        }

        let (title, body, priority) = describe(event, &report);
        router.notify(&title, &body, &event.id, priority).await;
        report
    }

    /// The attempt loop itself. The first attempt is unconditional (the
    /// planner already judged the event due); later ones only happen while
    /// more than one retry interval of the window remains.
    pub async fn drive(
        &self,
        event: &Event,
        window: &RegistrationWindow,
        tokens: &SessionTokens,
    ) -> DriveReport {
        let mut attempts = 0u32;
        let mut last_outcome: Option<AttemptOutcome> = None;

        loop {
            if let Some(max) = self.policy.max_attempts
                && attempts >= max
            {
                tracing::info!("🛑 Attempt cap ({max}) reached for {}", event.id);
                break;
            }

            attempts += 1;
            tracing::info!(
                "🎯 Attempt {attempts} for {} ({}), window ends {}",
                event.class_name,
                event.id,
                window.attempt_end.format("%H:%M:%S UTC")
            );

            let report =
                attempt_registration(self.transport, &event.id, self.member_ids, tokens).await;
            let outcome = self.classifier.classify(&report);

            match outcome.kind {
                OutcomeKind::Success => {
                    tracing::info!("✅ Registered for {} ({}): {}", event.class_name, event.id, outcome.message);
                    return DriveReport {
                        disposition: Disposition::Succeeded,
                        attempts,
                        last_outcome: Some(outcome),
                    };
                }
                OutcomeKind::Fatal(reason) => {
                    tracing::warn!(
                        "🚫 Fatal response for {} ({}) [{reason:?}]: {}",
                        event.class_name,
                        event.id,
                        outcome.message
                    );
                    return DriveReport {
                        disposition: Disposition::Fatal(reason),
                        attempts,
                        last_outcome: Some(outcome),
                    };
                }
                OutcomeKind::TooSoon => {
                    tracing::info!("⏰ Too soon for {}: {}", event.id, outcome.message);
                }
                OutcomeKind::RetryableFailure => {
                    tracing::warn!("⚠️ Attempt {attempts} failed for {}: {}", event.id, outcome.message);
                }
            }
            last_outcome = Some(outcome);

            let remaining = window.attempt_end - self.clock.now();
            if remaining <= self.policy.retry_interval {
                break;
            }
            self.clock.sleep(self.policy.retry_interval).await;
        }

        let disposition = match last_outcome.as_ref().map(|o| o.kind) {
            Some(OutcomeKind::TooSoon) => Disposition::Pending,
            _ => Disposition::WindowExpired,
        };
        if disposition == Disposition::WindowExpired {
            tracing::error!(
                "❌ Registration FAILED for {} ({}) after {attempts} attempt(s)",
                event.class_name,
                event.id
            );
        }
        DriveReport {
            disposition,
            attempts,
            last_outcome,
        }
    }
}

/// Operator-facing subject, body and priority for a terminal disposition.
fn describe(event: &Event, report: &DriveReport) -> (String, String, NotifyPriority) {
    let msg = report.last_message();
    match report.disposition {
        Disposition::Succeeded => (
            format!("Registered for {}", event.class_name),
            format!(
                "Successfully registered for: {}\nDate: {}\nLoc: {}\nConfirm: {msg}",
                event.class_name,
                event.when(),
                event.location
            ),
            NotifyPriority::High,
        ),
        Disposition::Fatal(_) => (
            format!("NOT Registered (Ineligible): {}", event.class_name),
            format!(
                "Could not register for: {} on {}.\nReason: {msg}",
                event.class_name,
                event.when()
            ),
            NotifyPriority::High,
        ),
        Disposition::WindowExpired | Disposition::Pending => (
            format!("FAILED to Register: {}", event.class_name),
            format!(
                "Failed to register for: {} on {} after {} attempts.\nLast error: {msg}",
                event.class_name,
                event.when(),
                report.attempts
            ),
            NotifyPriority::Urgent,
        ),
    }
}
