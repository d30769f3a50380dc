//! # AutoReg Channels
//!
//! Best-effort notification channels. Each implements
//! [`autoreg_core::traits::Notifier`] and is registered with the scheduler's
//! router; a channel that fails only logs.

pub mod discord;
pub mod sms;

pub use discord::DiscordNotifier;
pub use sms::SmsGatewayNotifier;
