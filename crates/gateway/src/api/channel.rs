//! Conversation platform callbacks: `POST /feishu/webhook` feeds the
//! orchestrator, `POST /feishu/events` feeds the automation engine. Both
//! answer the platform's URL-verification handshake before anything else.

use aes::cipher::{BlockDecryptMut, KeyIvInit};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use cw_automation::dispatcher::normalize_payload;
use cw_domain::event::EventEnvelope;
use cw_domain::record::Fields;
use cw_orchestrator::SkillContext;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::api::error::api_error;
use crate::state::AppState;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

#[derive(Debug, Deserialize)]
pub struct ChannelEnvelope {
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub encrypt: Option<String>,
    #[serde(default)]
    pub event: Option<Value>,
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
}

fn decrypt_payload(encrypt_key: &str, encrypted_b64: &str) -> Option<Value> {
    use base64::Engine;
    let raw = base64::engine::general_purpose::STANDARD.decode(encrypted_b64).ok()?;
    if raw.len() < 16 {
        return None;
    }
    let (iv, ciphertext) = raw.split_at(16);
    let key = Sha256::digest(encrypt_key.as_bytes());
    let mut buf = ciphertext.to_vec();
    let decryptor = Aes256CbcDec::new_from_slices(&key, iv).ok()?;
    let plain = decryptor.decrypt_padded_mut::<aes::cipher::block_padding::Pkcs7>(&mut buf).ok()?;
    serde_json::from_slice(plain).ok()
}

/// `POST /feishu/webhook` — the Conversation Channel callback.
pub async fn webhook(State(state): State<AppState>, Json(body): Json<ChannelEnvelope>) -> Response {
    if let Some(challenge) = &body.challenge {
        return Json(json!({ "challenge": challenge })).into_response();
    }

    let Some(expected_token) = &state.config.channel.verification_token else {
        return api_error(StatusCode::FORBIDDEN, "channel is not configured");
    };
    if body.token.as_deref() != Some(expected_token.as_str()) {
        return api_error(StatusCode::UNAUTHORIZED, "token mismatch");
    }

    let event = match (&body.encrypt, &state.config.channel.encrypt_key) {
        (Some(encrypted), Some(key)) => match decrypt_payload(key, encrypted) {
            Some(v) => v,
            None => return api_error(StatusCode::BAD_REQUEST, "failed to decrypt payload"),
        },
        _ => body.event.clone().unwrap_or(Value::Null),
    };

    let message_id = event.pointer("/message/message_id").and_then(|v| v.as_str());
    let event_id = event.get("event_id").and_then(|v| v.as_str());
    if state.channel_dedupe.check_envelope(message_id, event_id) {
        return Json(json!({"status": "duplicate"})).into_response();
    }

    let sender_is_self = event.pointer("/sender/sender_type").and_then(|v| v.as_str()) == Some("bot");
    if sender_is_self {
        return Json(json!({"status": "ignored", "reason": "self message"})).into_response();
    }

    let chat_type = event.pointer("/message/chat_type").and_then(|v| v.as_str());
    let msg_type = event.pointer("/message/message_type").and_then(|v| v.as_str());
    if chat_type != Some("p2p") || msg_type != Some("text") {
        return Json(json!({"status": "ignored", "reason": "not a private text message"})).into_response();
    }

    let open_id = event.pointer("/sender/sender_id/open_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let text = event
        .pointer("/message/content")
        .and_then(|v| v.as_str())
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|content| content.get("text").and_then(|t| t.as_str()).map(str::to_string))
        .unwrap_or_default();

    let (conversation, _is_new) = state.sessions.resolve_or_create(&open_id);
    let now = Utc::now();
    state.sessions.touch(&open_id);

    let default_app_token = state.config.bitable.default_app_token.clone().unwrap_or_default();
    let ctx = SkillContext {
        open_id: open_id.clone(),
        text,
        now,
        bitable: &state.bitable,
        sessions: &state.sessions,
        llm: &state.llm,
        reminders: &state.reminders,
        tables: &state.tables,
        config: &state.config.orchestrator,
        default_app_token,
        state: conversation,
        carry: None,
    };

    let response = state.orchestrator.handle_message(ctx).await;
    Json(json!({"status": "ok", "reply": response})).into_response()
}

/// `POST /feishu/events` — the Automation callback.
pub async fn events(State(state): State<AppState>, Json(body): Json<ChannelEnvelope>) -> Response {
    if let Some(challenge) = &body.challenge {
        return Json(json!({ "challenge": challenge })).into_response();
    }

    let Some(expected_token) = &state.config.channel.verification_token else {
        return api_error(StatusCode::FORBIDDEN, "channel is not configured");
    };
    if body.token.as_deref() != Some(expected_token.as_str()) {
        return api_error(StatusCode::UNAUTHORIZED, "token mismatch");
    }

    let event = body.event.clone().unwrap_or(Value::Null);
    let event_id = event.get("event_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    if !state.idempotency.claim_event(&event_id).await {
        return Json(json!({"status": "duplicate"})).into_response();
    }

    let Some((table_id, record_id, event_type)) = normalize_payload(&event) else {
        return Json(json!({"status": "ignored", "reason": "unrecognized event payload"})).into_response();
    };
    let app_token = event.get("app_token").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let current_fields: Fields = event.get("fields").cloned().and_then(|f| serde_json::from_value(f).ok()).unwrap_or_default();

    let envelope = EventEnvelope { event_id: event_id.clone(), event_type, table_id: table_id.clone(), record_id: record_id.clone(), payload: event.clone(), received_at: Utc::now() };
    tracing::debug!(event_id = %envelope.event_id, "automation callback accepted");

    let cfg = crate::api::automation::executor_config(&state);
    let processor = cw_automation::Processor {
        rules: &state.rules,
        snapshots: &state.snapshots,
        idempotency: &state.idempotency,
        schema_cache: &state.schema_cache,
        bitable: &state.bitable,
        http: &state.http,
        delay_store: &state.delay_store,
        executor_config: &cfg,
        run_log: &state.run_log,
    };
    let mode = cw_automation::ProcessMode::Event { trigger_on_new_record: state.config.automation.trigger_on_new_record_event };
    let row = processor.process(&event_id, &app_token, &table_id, &record_id, event_type, current_fields, mode).await;
    Json(json!({"status": "processed", "result": row.result})).into_response()
}
