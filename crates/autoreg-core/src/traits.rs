//! Collaborator seams. The scheduler only knows these traits; the vendor
//! client and the notification channels implement them.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    CompleteResponse, Credentials, Event, InitiateResponse, Notification, NotifyPriority,
    SessionTokens,
};

/// Exchanges credentials for a session token pair.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<SessionTokens>;
}

/// Returns the current, already filtered, list of candidate events.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn fetch(&self, tokens: &SessionTokens) -> Result<Vec<Event>>;
}

/// The vendor's two-step registration protocol.
///
/// `Err` means the call never produced a vendor answer (timeout, connection
/// failure). Vendor-side rejections come back as `Ok` with the body attached.
#[async_trait]
pub trait RegistrationTransport: Send + Sync {
    async fn initiate(
        &self,
        event_id: &str,
        member_ids: &[u64],
        tokens: &SessionTokens,
    ) -> Result<InitiateResponse>;

    async fn complete(
        &self,
        registration_id: &str,
        member_ids: &[u64],
        agreement_id: &str,
        tokens: &SessionTokens,
    ) -> Result<CompleteResponse>;
}

/// A best-effort notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this channel wants notifications of the given priority.
    fn accepts(&self, _priority: NotifyPriority) -> bool {
        true
    }

    async fn send(&self, notification: &Notification) -> Result<()>;
}
