//! In-crate fakes for the collaborator traits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use autoreg_core::error::{AutoRegError, Result};
use autoreg_core::traits::{Authenticator, Notifier, RegistrationTransport, ScheduleSource};
use autoreg_core::types::{
    CompleteResponse, Credentials, Event, InitiateResponse, Notification, NotifyPriority,
    SessionTokens,
};
use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;

/// Simulated clock: `sleep` advances time instantly.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        if duration > Duration::zero() {
            self.advance(duration);
        }
    }
}

/// One scripted registration attempt.
#[derive(Debug, Clone)]
pub enum Step {
    /// Both steps succeed.
    Success,
    /// Initiate answers with this body and no registration id.
    Reject(serde_json::Value),
    /// Initiate never reaches the vendor.
    NetworkError,
    /// Initiate succeeds, complete fails with this body.
    CompleteFails(serde_json::Value),
}

/// Registration transport replaying a script; the last step repeats forever.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    initiate_calls: Arc<AtomicU32>,
    complete_calls: Arc<AtomicU32>,
    clock: Option<(Arc<FakeClock>, Duration)>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        let last = steps.last().cloned().unwrap_or(Step::NetworkError);
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(last),
            initiate_calls: Arc::new(AtomicU32::new(0)),
            complete_calls: Arc::new(AtomicU32::new(0)),
            clock: None,
        }
    }

    /// Every initiate call advances `clock` by `latency`.
    pub fn with_latency(mut self, clock: Arc<FakeClock>, latency: Duration) -> Self {
        self.clock = Some((clock, latency));
        self
    }

    pub fn initiate_calls(&self) -> Arc<AtomicU32> {
        self.initiate_calls.clone()
    }

    pub fn complete_calls(&self) -> Arc<AtomicU32> {
        self.complete_calls.clone()
    }

    fn current(&self) -> Step {
        let mut steps = self.steps.lock().unwrap();
        match steps.pop_front() {
            Some(step) => {
                *self.last.lock().unwrap() = step.clone();
                step
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

#[async_trait]
impl RegistrationTransport for ScriptedTransport {
    async fn initiate(
        &self,
        _event_id: &str,
        _member_ids: &[u64],
        _tokens: &SessionTokens,
    ) -> Result<InitiateResponse> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((clock, latency)) = &self.clock {
            clock.advance(*latency);
        }
        match self.current() {
            Step::Success | Step::CompleteFails(_) => Ok(InitiateResponse {
                registration_id: Some("reg-1".into()),
                agreement_id: Some("77".into()),
                diagnostic: Some(serde_json::json!({"regId": "reg-1"})),
                status: Some(200),
            }),
            Step::Reject(body) => Ok(InitiateResponse {
                registration_id: None,
                agreement_id: None,
                diagnostic: Some(body),
                status: Some(400),
            }),
            Step::NetworkError => Err(AutoRegError::Registration("connection reset".into())),
        }
    }

    async fn complete(
        &self,
        _registration_id: &str,
        _member_ids: &[u64],
        _agreement_id: &str,
        _tokens: &SessionTokens,
    ) -> Result<CompleteResponse> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let last = self.last.lock().unwrap().clone();
        match last {
            Step::CompleteFails(body) => Ok(CompleteResponse {
                success: false,
                status: Some(500),
                diagnostic: Some(body),
            }),
            _ => Ok(CompleteResponse {
                success: true,
                status: Some(200),
                diagnostic: Some(serde_json::json!({"status": "COMPLETED"})),
            }),
        }
    }
}

/// Notifier that records what it was asked to send.
pub struct RecordingNotifier {
    name: String,
    min_priority: NotifyPriority,
    fail: bool,
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            min_priority: NotifyPriority::Low,
            fail: false,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn min_priority(mut self, priority: NotifyPriority) -> Self {
        self.min_priority = priority;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn sent(&self) -> Arc<Mutex<Vec<Notification>>> {
        self.sent.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, priority: NotifyPriority) -> bool {
        priority >= self.min_priority
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        if self.fail {
            return Err(AutoRegError::Notification("smtp down".into()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Authenticator that fails a fixed number of times, then succeeds.
pub struct FakeAuth {
    failures_left: AtomicU32,
    calls: Arc<AtomicU32>,
}

impl FakeAuth {
    pub fn new(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }
}

#[async_trait]
impl Authenticator for FakeAuth {
    async fn login(&self, _credentials: &Credentials) -> Result<SessionTokens> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(AutoRegError::Auth("401 Unauthorized".into()));
        }
        Ok(SessionTokens {
            jwe: "jwe".into(),
            ssoid: "sso".into(),
        })
    }
}

/// Schedule source returning a fixed snapshot, or failing.
pub struct FakeSource {
    events: Mutex<Option<Vec<Event>>>,
    calls: Arc<AtomicU32>,
}

impl FakeSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: Mutex::new(Some(events)),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            events: Mutex::new(None),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }
}

#[async_trait]
impl ScheduleSource for FakeSource {
    async fn fetch(&self, _tokens: &SessionTokens) -> Result<Vec<Event>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AutoRegError::Fetch("503 Service Unavailable".into()))
    }
}

pub fn tokens() -> SessionTokens {
    SessionTokens {
        jwe: "jwe".into(),
        ssoid: "sso".into(),
    }
}
