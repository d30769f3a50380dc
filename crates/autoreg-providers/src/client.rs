//! Shared HTTP client and the browser-like header profile the vendor expects.

use std::time::Duration;

use autoreg_core::config::ApiConfig;
use autoreg_core::error::{AutoRegError, Result};
use autoreg_core::types::SessionTokens;
use chrono::{DateTime, Utc};
use serde_json::Value;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

/// One reqwest client per process, cloned cheaply into each collaborator.
#[derive(Clone)]
pub struct LifetimeClient {
    http: reqwest::Client,
    api: ApiConfig,
}

impl LifetimeClient {
    pub fn new(api: &ApiConfig, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AutoRegError::Http(format!("Client build failed: {e}")))?;
        Ok(Self {
            http,
            api: api.clone(),
        })
    }

    /// Absolute URL for an API path (`path` starts with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api.base_url.trim_end_matches('/'), path)
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.profile(self.http.post(self.url(path)))
    }

    pub fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.profile(self.http.put(self.url(path)))
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.profile(self.http.get(self.url(path)))
    }

    /// Attach the session tokens and a fresh request timestamp.
    pub fn authed(&self, req: reqwest::RequestBuilder, tokens: &SessionTokens) -> reqwest::RequestBuilder {
        req.header("x-ltf-jwe", &tokens.jwe)
            .header("x-ltf-ssoid", &tokens.ssoid)
            .header("x-timestamp", vendor_timestamp(Utc::now()))
    }

    fn profile(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("accept", "application/json, text/plain, */*")
            .header("accept-language", "en-US,en;q=0.9")
            .header("cache-control", "no-cache")
            .header("pragma", "no-cache")
            .header("ocp-apim-subscription-key", &self.api.subscription_key)
            .header("origin", &self.api.origin)
            .header("referer", format!("{}/", self.api.origin.trim_end_matches('/')))
    }
}

/// `x-timestamp` value: UTC with millisecond precision and a `Z` suffix.
pub fn vendor_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Read a response body as JSON, falling back to the raw text as a JSON
/// string. An empty body yields `None`.
pub async fn body_value(resp: reqwest::Response) -> Option<Value> {
    let text = resp.text().await.unwrap_or_default();
    parse_body(&text)
}

pub(crate) fn parse_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

/// Vendor ids arrive as numbers or strings; normalize to a string.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
