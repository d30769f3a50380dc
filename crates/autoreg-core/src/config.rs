//! AutoReg configuration system.
//!
//! A TOML file (`~/.autoreg/config.toml`) supplies everything; environment
//! variables override the operator surface and secrets afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AutoRegError, Result};
use crate::types::Credentials;

/// Longest registration lead accepted from configuration (100 years).
pub const MAX_REGISTRATION_LEAD_MINUTES: i64 = 100 * 365 * 24 * 60;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoRegConfig {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub state: StateConfig,
}

impl AutoRegConfig {
    /// Load config from the default path (~/.autoreg/config.toml), then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path (no env overrides).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AutoRegError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AutoRegError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the AutoReg home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".autoreg")
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("LIFETIME_USERNAME") {
            self.account.username = v;
        }
        if let Some(v) = get("LIFETIME_PASSWORD") {
            self.account.password = v;
        }
        if let Some(v) = get("LIFETIME_MEMBER_IDS") {
            match parse_member_ids(&v) {
                Ok(ids) => self.account.member_ids = ids,
                Err(e) => tracing::warn!("⚠️ Ignoring LIFETIME_MEMBER_IDS: {e}"),
            }
        }
        if let Some(v) = get("SMS_RECIPIENT_EMAIL") {
            self.notify.sms.recipient = v;
        }
        if let Some(v) = get("EMAIL_SENDER_ADDRESS") {
            self.notify.sms.sender = v;
        }
        if let Some(v) = get("EMAIL_SENDER_PASSWORD") {
            self.notify.sms.password = v;
        }
        if let Some(v) = get("SMTP_SERVER") {
            self.notify.sms.smtp_host = v;
        }
        if let Some(v) = get("SMTP_PORT") {
            match v.parse() {
                Ok(port) => self.notify.sms.smtp_port = port,
                Err(_) => tracing::warn!("⚠️ Ignoring SMTP_PORT: '{v}' is not a port number"),
            }
        }
        if let Some(v) = get("DISCORD_WEBHOOK_URL") {
            self.notify.discord.webhook_url = v;
        }
        if let Some(v) = get("AUTOREG_LEDGER_PATH") {
            self.state.ledger_path = v;
        }
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.account.member_ids.is_empty() {
            return Err(AutoRegError::Config(
                "No member ids configured (account.member_ids / LIFETIME_MEMBER_IDS)".into(),
            ));
        }
        if self.account.username.is_empty() || self.account.password.is_empty() {
            return Err(AutoRegError::Config(
                "Missing login credentials (LIFETIME_USERNAME / LIFETIME_PASSWORD)".into(),
            ));
        }
        let t = &self.timing;
        if t.retry_interval_secs == 0 {
            return Err(AutoRegError::Config("timing.retry_interval_secs must be > 0".into()));
        }
        if t.min_sleep_secs > t.max_sleep_secs {
            return Err(AutoRegError::Config(format!(
                "timing.min_sleep_secs ({}) exceeds timing.max_sleep_secs ({})",
                t.min_sleep_secs, t.max_sleep_secs
            )));
        }
        if t.refresh_interval_secs == 0 {
            return Err(AutoRegError::Config("timing.refresh_interval_secs must be > 0".into()));
        }
        if !(1..=MAX_REGISTRATION_LEAD_MINUTES).contains(&t.registration_lead_minutes) {
            return Err(AutoRegError::Config(format!(
                "timing.registration_lead_minutes ({}) must be between 1 and {MAX_REGISTRATION_LEAD_MINUTES}",
                t.registration_lead_minutes
            )));
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.account.username.clone(),
            password: self.account.password.clone(),
        }
    }

    /// Ledger path with `~` expanded.
    pub fn ledger_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.state.ledger_path).to_string())
    }
}

/// Parse a comma-separated member id list ("115608390, 115608391").
pub fn parse_member_ids(raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| AutoRegError::Config(format!("Invalid member id: '{s}'")))
        })
        .collect()
}

/// Vendor account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub member_ids: Vec<u64>,
}

/// Registration-window and loop timing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// How long before class start the vendor opens registration.
    #[serde(default = "default_registration_lead_minutes")]
    pub registration_lead_minutes: i64,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Start attempting this long before the official open time.
    #[serde(default = "default_attempt_lead")]
    pub attempt_lead_secs: u64,
    #[serde(default = "default_attempt_duration")]
    pub attempt_duration_secs: u64,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
    /// Window length for events discovered after their ideal window ended.
    #[serde(default = "default_catch_up_duration")]
    pub catch_up_duration_secs: u64,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_min_sleep")]
    pub min_sleep_secs: u64,
    #[serde(default = "default_max_sleep")]
    pub max_sleep_secs: u64,
    #[serde(default = "default_fetch_backoff")]
    pub fetch_backoff_secs: u64,
    #[serde(default = "default_idle_retry")]
    pub idle_retry_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_too_soon_warn_cycles")]
    pub too_soon_warn_cycles: u32,
}

fn default_registration_lead_minutes() -> i64 { 11400 }
fn default_refresh_interval() -> u64 { 24 * 60 * 60 }
fn default_attempt_lead() -> u64 { 10 }
fn default_attempt_duration() -> u64 { 300 }
fn default_retry_interval() -> u64 { 2 }
fn default_catch_up_duration() -> u64 { 60 }
fn default_min_sleep() -> u64 { 5 }
fn default_max_sleep() -> u64 { 3600 }
fn default_fetch_backoff() -> u64 { 60 }
fn default_idle_retry() -> u64 { 60 }
fn default_request_timeout() -> u64 { 30 }
fn default_too_soon_warn_cycles() -> u32 { 3 }

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            registration_lead_minutes: default_registration_lead_minutes(),
            refresh_interval_secs: default_refresh_interval(),
            attempt_lead_secs: default_attempt_lead(),
            attempt_duration_secs: default_attempt_duration(),
            retry_interval_secs: default_retry_interval(),
            catch_up_duration_secs: default_catch_up_duration(),
            max_attempts: None,
            min_sleep_secs: default_min_sleep(),
            max_sleep_secs: default_max_sleep(),
            fetch_backoff_secs: default_fetch_backoff(),
            idle_retry_secs: default_idle_retry(),
            request_timeout_secs: default_request_timeout(),
            too_soon_warn_cycles: default_too_soon_warn_cycles(),
        }
    }
}

/// Static schedule query and filter rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_include_terms")]
    pub include_terms: Vec<String>,
    #[serde(default = "default_exclude_terms")]
    pub exclude_terms: Vec<String>,
    #[serde(default = "default_weekend_days")]
    pub weekend_days: Vec<String>,
    #[serde(default = "default_day_parts")]
    pub allowed_weekday_day_parts: Vec<String>,
    #[serde(default = "bool_true")]
    pub exclude_paid: bool,
    #[serde(default = "default_days_from_now")]
    pub days_from_now: i64,
    #[serde(default = "default_fetch_days")]
    pub fetch_days: i64,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn bool_true() -> bool { true }
fn default_include_terms() -> Vec<String> { vec!["intermediate".into()] }
fn default_exclude_terms() -> Vec<String> { vec!["advanced".into(), "singles".into()] }
fn default_weekend_days() -> Vec<String> { vec!["saturday".into(), "sunday".into()] }
fn default_day_parts() -> Vec<String> { vec!["Evening".into()] }
fn default_days_from_now() -> i64 { 7 }
fn default_fetch_days() -> i64 { 10 }
fn default_location() -> String { "Denver West".into() }
fn default_tags() -> Vec<String> {
    vec!["interest:Pickleball Open Play".into(), "format:Class".into()]
}
fn default_page_size() -> u32 { 750 }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            include_terms: default_include_terms(),
            exclude_terms: default_exclude_terms(),
            weekend_days: default_weekend_days(),
            allowed_weekday_day_parts: default_day_parts(),
            exclude_paid: true,
            days_from_now: default_days_from_now(),
            fetch_days: default_fetch_days(),
            location: default_location(),
            tags: default_tags(),
            page_size: default_page_size(),
        }
    }
}

/// Vendor API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_subscription_key")]
    pub subscription_key: String,
    #[serde(default = "default_origin")]
    pub origin: String,
}

fn default_base_url() -> String { "https://api.lifetimefitness.com".into() }
fn default_subscription_key() -> String { "924c03ce573d473793e184219a6a19bd".into() }
fn default_origin() -> String { "https://my.lifetime.life".into() }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            subscription_key: default_subscription_key(),
            origin: default_origin(),
        }
    }
}

/// Notification channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub sms: SmsGatewayConfig,
    #[serde(default)]
    pub discord: DiscordWebhookConfig,
}

/// Email-to-SMS gateway (e.g. `5551234567@vtext.com`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsGatewayConfig {
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
}

fn default_smtp_host() -> String { "smtp.gmail.com".into() }
fn default_smtp_port() -> u16 { 587 }

impl Default for SmsGatewayConfig {
    fn default() -> Self {
        Self {
            recipient: String::new(),
            sender: String::new(),
            password: String::new(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
        }
    }
}

impl SmsGatewayConfig {
    pub fn is_enabled(&self) -> bool {
        !self.recipient.is_empty() && !self.sender.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordWebhookConfig {
    #[serde(default)]
    pub webhook_url: String,
}

impl DiscordWebhookConfig {
    pub fn is_enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }
}

/// Durable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
}

fn default_ledger_path() -> String { "~/.autoreg/processed_events.json".into() }

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
        }
    }
}
