//! Vendor login: exchanges credentials for the JWE/SSO token pair.

use async_trait::async_trait;
use autoreg_core::error::{AutoRegError, Result};
use autoreg_core::traits::Authenticator;
use autoreg_core::types::{Credentials, SessionTokens};
use serde_json::{Value, json};

use crate::client::{LifetimeClient, body_value};

const LOGIN_PATH: &str = "/auth/v2/login";

pub struct LifetimeAuth {
    client: LifetimeClient,
}

impl LifetimeAuth {
    pub fn new(client: LifetimeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Authenticator for LifetimeAuth {
    async fn login(&self, credentials: &Credentials) -> Result<SessionTokens> {
        if credentials.username.is_empty() || credentials.password.is_empty() {
            return Err(AutoRegError::Auth("username or password not configured".into()));
        }

        let resp = self
            .client
            .post(LOGIN_PATH)
            .header("content-type", "application/json; charset=UTF-8")
            .json(&json!({
                "username": credentials.username,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(|e| AutoRegError::Auth(format!("login request failed: {e}")))?;

        let status = resp.status();
        tracing::debug!("Login response status: {status}");
        let body = body_value(resp).await;
        if !status.is_success() {
            return Err(AutoRegError::Auth(format!(
                "HTTP {status}: {}",
                body.map(|b| b.to_string()).unwrap_or_default()
            )));
        }

        let tokens = parse_login(body.as_ref().unwrap_or(&Value::Null))?;
        tracing::info!("✅ Logged in as {}", credentials.username);
        Ok(tokens)
    }
}

/// Pull `token` and `ssoId` out of a login response body.
pub fn parse_login(body: &Value) -> Result<SessionTokens> {
    let field = |name: &str| {
        body.get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    match (field("token"), field("ssoId")) {
        (Some(jwe), Some(ssoid)) => Ok(SessionTokens { jwe, ssoid }),
        _ => Err(AutoRegError::Auth("login response missing token or ssoId".into())),
    }
}
