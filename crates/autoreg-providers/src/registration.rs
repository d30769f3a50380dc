//! Two-step registration transport.
//!
//! Step 1 (`POST .../event`) reserves a registration and returns the id of
//! the waiver the member must accept. Step 2 (`PUT .../event/{regId}/complete`)
//! accepts it. Vendor rejections are returned as data; only transport
//! failures become errors.

use async_trait::async_trait;
use autoreg_core::error::{AutoRegError, Result};
use autoreg_core::traits::RegistrationTransport;
use autoreg_core::types::{CompleteResponse, InitiateResponse, SessionTokens};
use serde_json::{Value, json};

use crate::client::{LifetimeClient, body_value, id_string};

const REGISTRATION_PATH: &str = "/sys/registrations/V3/ux/event";

pub struct LifetimeRegistration {
    client: LifetimeClient,
}

impl LifetimeRegistration {
    pub fn new(client: LifetimeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RegistrationTransport for LifetimeRegistration {
    async fn initiate(
        &self,
        event_id: &str,
        member_ids: &[u64],
        tokens: &SessionTokens,
    ) -> Result<InitiateResponse> {
        tracing::debug!("Step 1: POST {REGISTRATION_PATH} event={event_id} members={member_ids:?}");
        let req = self
            .client
            .post(REGISTRATION_PATH)
            .json(&json!({ "eventId": event_id, "memberId": member_ids }));
        let resp = self
            .client
            .authed(req, tokens)
            .send()
            .await
            .map_err(|e| AutoRegError::Registration(format!("initiate request failed: {e}")))?;

        let status = resp.status().as_u16();
        let body = body_value(resp).await;
        tracing::debug!("Step 1 HTTP {status}: {body:?}");
        Ok(parse_initiate(status, body))
    }

    async fn complete(
        &self,
        registration_id: &str,
        member_ids: &[u64],
        agreement_id: &str,
        tokens: &SessionTokens,
    ) -> Result<CompleteResponse> {
        let agreement: i64 = agreement_id.parse().map_err(|_| {
            AutoRegError::Registration(format!("agreement id '{agreement_id}' is not numeric"))
        })?;

        let path = format!("{REGISTRATION_PATH}/{registration_id}/complete");
        tracing::debug!("Step 2: PUT {path} members={member_ids:?}");
        let req = self
            .client
            .put(&path)
            .json(&json!({ "memberId": member_ids, "acceptedDocuments": [agreement] }));
        let resp = self
            .client
            .authed(req, tokens)
            .send()
            .await
            .map_err(|e| AutoRegError::Registration(format!("complete request failed: {e}")))?;

        let status = resp.status();
        let diagnostic = body_value(resp).await;
        tracing::debug!("Step 2 HTTP {status}: {diagnostic:?}");
        Ok(CompleteResponse {
            success: status.is_success(),
            status: Some(status.as_u16()),
            diagnostic,
        })
    }
}

/// Interpret a step-1 answer. Ids are only read from 2xx bodies.
pub fn parse_initiate(status: u16, body: Option<Value>) -> InitiateResponse {
    let ok = (200..300).contains(&status);
    let (registration_id, agreement_id) = match (&body, ok) {
        (Some(b), true) => (
            b.get("regId").and_then(id_string),
            b.pointer("/agreement/agreementId").and_then(id_string),
        ),
        _ => (None, None),
    };
    InitiateResponse {
        registration_id,
        agreement_id,
        diagnostic: body,
        status: Some(status),
    }
}
