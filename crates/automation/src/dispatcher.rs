//! Automation Dispatcher — the single entry point for change-event
//! callbacks, authenticated external webhooks, and scan/sync triggers.
//! Verifies auth, drops duplicate events, normalizes the payload, and
//! hands it to the Processor.

use cw_domain::event::{EventEnvelope, EventType};

use crate::store::idempotency::IdempotencyStore;
use crate::webhook_auth::{check_static_token, verify_hmac, AuthFailure};

pub struct DispatcherConfig {
    pub api_key: Option<String>,
    pub signature_secret: Option<String>,
    pub timestamp_tolerance_seconds: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Accepted and handed off to the Processor.
    Accepted,
    /// Authentication failed — logged, not replied to.
    AuthFailed,
    /// Duplicate event id — 200 with no-op log.
    Duplicate,
}

pub struct Dispatcher<'a> {
    pub config: &'a DispatcherConfig,
    pub idempotency: &'a IdempotencyStore,
}

impl<'a> Dispatcher<'a> {
    /// Verify the static API key / verification token for this request.
    pub fn authenticate_static(&self, provided_key: Option<&str>) -> Result<(), AuthFailure> {
        match &self.config.api_key {
            Some(expected) => check_static_token(provided_key, expected),
            None => Ok(()),
        }
    }

    /// Verify an optional HMAC signature over `timestamp + "." + body`.
    pub fn authenticate_hmac(
        &self,
        timestamp: i64,
        now: i64,
        body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<(), AuthFailure> {
        match &self.config.signature_secret {
            Some(secret) => {
                let header = signature_header.ok_or(AuthFailure::MissingCredential)?;
                verify_hmac(secret, timestamp, now, self.config.timestamp_tolerance_seconds, body, header)
            }
            None => Ok(()),
        }
    }

    /// Accepts a normalized event envelope: authenticates, deduplicates,
    /// and reports what happened to it. The caller (HTTP handler) is
    /// responsible for actually invoking the Processor on `Accepted`.
    pub async fn accept(
        &self,
        envelope: &EventEnvelope,
        provided_key: Option<&str>,
        hmac_timestamp: Option<i64>,
        now: i64,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> DispatchOutcome {
        if self.authenticate_static(provided_key).is_err() {
            return DispatchOutcome::AuthFailed;
        }
        if let Some(ts) = hmac_timestamp {
            if self.authenticate_hmac(ts, now, raw_body, signature_header).is_err() {
                return DispatchOutcome::AuthFailed;
            }
        }
        if !self.idempotency.claim_event(&envelope.event_id).await {
            return DispatchOutcome::Duplicate;
        }
        DispatchOutcome::Accepted
    }
}

/// Normalizes a raw webhook payload into `(table_id, record_id, event_type)`.
/// Returns `None` when required fields are missing — a classified,
/// non-retried normalization failure.
pub fn normalize_payload(payload: &serde_json::Value) -> Option<(String, String, EventType)> {
    let table_id = payload.get("table_id")?.as_str()?.to_string();
    let record_id = payload.get("record_id")?.as_str()?.to_string();
    let event_type = match payload.get("event_type")?.as_str()? {
        "created" => EventType::Created,
        "updated" => EventType::Updated,
        "field_changed" => EventType::FieldChanged,
        "schema_changed" => EventType::SchemaChanged,
        _ => return None,
    };
    Some((table_id, record_id, event_type))
}
