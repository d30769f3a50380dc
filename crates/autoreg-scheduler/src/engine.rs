//! Scheduler Engine: the long-running loop.
//!
//! Each cycle: refresh the schedule snapshot when stale, evaluate every
//! unprocessed event against its registration window (driving retries for
//! the due ones), then sleep until the earliest upcoming deadline.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use autoreg_core::config::AutoRegConfig;
use autoreg_core::error::Result;
use autoreg_core::traits::{Authenticator, RegistrationTransport, ScheduleSource};
use autoreg_core::types::{Credentials, Event, NotifyPriority, SessionTokens};
use chrono::{DateTime, Duration, Utc};

use crate::classifier::{OutcomeClassifier, VendorClassifier};
use crate::clock::Clock;
use crate::ledger::Ledger;
use crate::notify::NotifyRouter;
use crate::retry::{Disposition, RetryDriver, RetryPolicy};
use crate::window::{WindowDecision, WindowPolicy, secs};

/// Longest digest body handed to the router.
const DIGEST_LIMIT: usize = 4000;

/// Everything the loop needs from configuration, resolved to durations.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub window: WindowPolicy,
    pub retry: RetryPolicy,
    pub refresh_interval: Duration,
    pub min_sleep: Duration,
    pub max_sleep: Duration,
    pub fetch_backoff: Duration,
    pub idle_retry: Duration,
    /// Consecutive too-soon windows before a misconfiguration warning.
    pub too_soon_warn_cycles: u32,
    pub member_ids: Vec<u64>,
    pub credentials: Credentials,
}

impl SchedulerSettings {
    pub fn from_config(config: &AutoRegConfig) -> Self {
        let t = &config.timing;
        Self {
            window: WindowPolicy::from_timing(t),
            retry: RetryPolicy {
                retry_interval: secs(t.retry_interval_secs),
                max_attempts: t.max_attempts,
            },
            refresh_interval: secs(t.refresh_interval_secs),
            min_sleep: secs(t.min_sleep_secs),
            max_sleep: secs(t.max_sleep_secs),
            fetch_backoff: secs(t.fetch_backoff_secs),
            idle_retry: secs(t.idle_retry_secs),
            too_soon_warn_cycles: t.too_soon_warn_cycles,
            member_ids: config.account.member_ids.clone(),
            credentials: config.credentials(),
        }
    }
}

/// Mutable loop state kept between cycles.
#[derive(Debug, Default)]
pub struct SchedulerState {
    /// Latest schedule snapshot; replaced wholesale on refresh.
    pub snapshot: Vec<Event>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub tokens: Option<SessionTokens>,
    /// event_id → consecutive windows that ended still too soon.
    pub too_soon_streaks: HashMap<String, u32>,
}

impl SchedulerState {
    pub fn refresh_due(&self, now: DateTime<Utc>, refresh_interval: Duration) -> bool {
        match self.last_refresh {
            None => true,
            Some(at) => now - at >= refresh_interval || self.tokens.is_none(),
        }
    }

    /// Earliest instant the loop must wake for: a not-yet-due attempt start,
    /// `now` for an event that is due but still pending, or the next refresh.
    pub fn next_deadline(
        &self,
        ledger: &Ledger,
        policy: &WindowPolicy,
        refresh_interval: Duration,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let refresh_at = self.last_refresh.map(|at| at + refresh_interval);
        let event_at = self
            .snapshot
            .iter()
            .filter(|e| e.start_time > now && !ledger.contains(&e.id))
            .map(|e| policy.attempt_start(e.start_time).max(now))
            .min();
        [refresh_at, event_at].into_iter().flatten().min()
    }
}

/// How long to sleep before the next cycle.
pub fn sleep_duration(
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    settings: &SchedulerSettings,
) -> Duration {
    match deadline {
        Some(at) => (at - now).max(settings.min_sleep).min(settings.max_sleep),
        None => settings.idle_retry,
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub refreshed: bool,
    pub refresh_failed: bool,
    pub attempted: usize,
    pub succeeded: usize,
    pub fatal: usize,
    pub expired: usize,
    pub pending: usize,
    pub sleep: Duration,
}

/// Vendor-facing collaborators.
pub struct Collaborators {
    pub auth: Box<dyn Authenticator>,
    pub source: Box<dyn ScheduleSource>,
    pub transport: Box<dyn RegistrationTransport>,
}

/// The scheduler engine. Owns the ledger, the snapshot and the channels.
pub struct SchedulerEngine {
    settings: SchedulerSettings,
    auth: Box<dyn Authenticator>,
    source: Box<dyn ScheduleSource>,
    transport: Box<dyn RegistrationTransport>,
    classifier: Box<dyn OutcomeClassifier>,
    clock: Arc<dyn Clock>,
    router: NotifyRouter,
    ledger: Ledger,
    state: SchedulerState,
}

impl SchedulerEngine {
    pub fn new(
        settings: SchedulerSettings,
        collaborators: Collaborators,
        ledger: Ledger,
        router: NotifyRouter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            auth: collaborators.auth,
            source: collaborators.source,
            transport: collaborators.transport,
            classifier: Box::new(VendorClassifier),
            clock,
            router,
            ledger,
            state: SchedulerState::default(),
        }
    }

    /// Swap the outcome classifier.
    pub fn with_classifier(mut self, classifier: Box<dyn OutcomeClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn router(&self) -> &NotifyRouter {
        &self.router
    }

    /// Run cycles until `shutdown` resolves (or after one cycle with `once`),
    /// then flush the ledger.
    pub async fn run<F>(&mut self, shutdown: F, once: bool) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            "⏰ Scheduler started ({} processed events, {} channel(s): {})",
            self.ledger.len(),
            self.router.channel_names().len(),
            self.router.channel_names().join(", ")
        );
        tokio::pin!(shutdown);

        loop {
            let report = tokio::select! {
                report = self.run_cycle() => report,
                _ = &mut shutdown => {
                    tracing::info!("🛑 Shutdown requested during cycle");
                    break;
                }
            };

            if once {
                tracing::info!("🏁 Single cycle finished: {report:?}");
                break;
            }

            tracing::info!(
                "😴 Sleeping {}s until next cycle",
                report.sleep.num_seconds()
            );
            let clock = self.clock.clone();
            tokio::select! {
                _ = clock.sleep(report.sleep) => {}
                _ = &mut shutdown => {
                    tracing::info!("🛑 Shutdown requested");
                    break;
                }
            }
        }

        self.ledger.flush()?;
        tracing::info!("👋 Scheduler stopped ({} processed events)", self.ledger.len());
        Ok(())
    }

    /// One refresh/evaluate/plan pass.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        if self
            .state
            .refresh_due(self.clock.now(), self.settings.refresh_interval)
        {
            match self.refresh().await {
                Ok(count) => {
                    report.refreshed = true;
                    tracing::info!("📥 Schedule refreshed: {count} candidate classes");
                }
                Err(e) => {
                    tracing::error!(
                        "❌ Schedule refresh failed: {e}; retrying in {}s",
                        self.settings.fetch_backoff.num_seconds()
                    );
                    report.refresh_failed = true;
                    report.sleep = self.settings.fetch_backoff;
                    return report;
                }
            }
        }

        self.evaluate(&mut report).await;

        let now = self.clock.now();
        let deadline = self.state.next_deadline(
            &self.ledger,
            &self.settings.window,
            self.settings.refresh_interval,
            now,
        );
        report.sleep = sleep_duration(deadline, now, &self.settings);
        report
    }

    /// Login and fetch; the snapshot only changes when both succeed.
    async fn refresh(&mut self) -> Result<usize> {
        tracing::info!("🔑 Logging in to refresh schedule");
        let tokens = self.auth.login(&self.settings.credentials).await?;
        let events = self.source.fetch(&tokens).await?;

        self.state.tokens = Some(tokens);
        self.state.snapshot = events;
        self.state.last_refresh = Some(self.clock.now());

        self.log_watch_list();
        self.send_digest().await;
        Ok(self.state.snapshot.len())
    }

    async fn evaluate(&mut self, report: &mut CycleReport) {
        let Some(tokens) = self.state.tokens.clone() else {
            tracing::warn!("⚠️ No session tokens; skipping evaluation");
            return;
        };

        let mut seen = HashSet::new();
        let mut candidates: Vec<Event> = self
            .state
            .snapshot
            .iter()
            .filter(|e| seen.insert(e.id.clone()))
            .filter(|e| !self.ledger.contains(&e.id))
            .cloned()
            .collect();
        candidates.sort_by_key(|e| e.start_time);

        for event in candidates {
            let now = self.clock.now();
            if event.start_time <= now {
                tracing::debug!("⏭️ {} ({}) already started, skipping", event.class_name, event.id);
                continue;
            }

            let window = match self.settings.window.plan(event.start_time, now) {
                WindowDecision::NotYetDue {
                    attempt_start,
                    official_open,
                } => {
                    tracing::debug!(
                        "🕒 {} ({}) not due: attempts from {attempt_start}, opens {official_open}",
                        event.class_name,
                        event.id
                    );
                    continue;
                }
                WindowDecision::Due(window) => window,
            };

            tracing::info!(
                ">>> Registration window OPEN ({}) for {} ({}) until {}",
                window.kind,
                event.class_name,
                event.id,
                window.attempt_end.format("%H:%M:%S UTC")
            );
            report.attempted += 1;

            let driver = RetryDriver::new(
                self.transport.as_ref(),
                self.classifier.as_ref(),
                self.clock.as_ref(),
                self.settings.retry,
                &self.settings.member_ids,
            );
            let outcome = driver
                .run(&event, &window, &tokens, &mut self.ledger, &self.router)
                .await;

            match outcome.disposition {
                Disposition::Succeeded => report.succeeded += 1,
                Disposition::Fatal(_) => report.fatal += 1,
                Disposition::WindowExpired => report.expired += 1,
                Disposition::Pending => report.pending += 1,
            }
            self.track_too_soon(&event, outcome.disposition);
        }
    }

    fn track_too_soon(&mut self, event: &Event, disposition: Disposition) {
        if disposition.is_terminal() {
            self.state.too_soon_streaks.remove(&event.id);
            return;
        }
        let streak = self
            .state
            .too_soon_streaks
            .entry(event.id.clone())
            .or_insert(0);
        *streak += 1;
        if *streak >= self.settings.too_soon_warn_cycles {
            tracing::warn!(
                "⚠️ {} ({}) reported too soon for {} consecutive windows; check timing.registration_lead_minutes ({})",
                event.class_name,
                event.id,
                streak,
                self.settings.window.registration_lead.num_minutes()
            );
        }
    }

    fn log_watch_list(&self) {
        let watching: Vec<&Event> = self
            .state
            .snapshot
            .iter()
            .filter(|e| !self.ledger.contains(&e.id))
            .collect();
        tracing::info!("👀 Watching {} unprocessed classes", watching.len());
        for event in watching {
            tracing::info!(
                "  • {} on {} at {}, registration opens {}",
                event.class_name,
                event.when(),
                event.location,
                self.settings
                    .window
                    .official_open(event.start_time)
                    .format("%Y-%m-%d %H:%M UTC")
            );
        }
    }

    async fn send_digest(&self) {
        if self.state.snapshot.is_empty() {
            return;
        }
        let title = format!(
            "🗓️ Schedule Update: {} Classes Fetched",
            self.state.snapshot.len()
        );
        let body = digest_body(&self.state.snapshot, &self.settings.window);
        self.router
            .notify(&title, &body, "scheduler", NotifyPriority::Low)
            .await;
    }
}

/// Markdown list of fetched classes with their registration open times.
pub fn digest_body(events: &[Event], policy: &WindowPolicy) -> String {
    let mut sorted: Vec<&Event> = events.iter().collect();
    sorted.sort_by_key(|e| e.start_time);

    let mut body = String::new();
    for event in sorted {
        let entry = format!(
            "- **{}**\n  - Class Time: {}\n  - Reg. Opens: {}\n",
            event.class_name,
            event.when(),
            policy
                .official_open(event.start_time)
                .format("%Y-%m-%d %H:%M UTC")
        );
        if body.len() + entry.len() > DIGEST_LIMIT {
            body.push_str("...");
            break;
        }
        body.push_str(&entry);
    }
    body
}
