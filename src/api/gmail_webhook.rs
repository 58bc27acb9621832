use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::gmail::notifications::NotificationOutcome;

// Pub/Sub push envelope wrapping a base64 JSON payload
#[derive(Debug, Deserialize)]
pub struct PubSubEnvelope {
    pub message: PubSubMessage,
    pub subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PubSubMessage {
    pub data: Option<String>,
    #[serde(rename = "messageId")]
    pub message_id: Option<String>,
    #[serde(rename = "publishTime")]
    pub publish_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookParams {
    pub token: Option<String>,
}

#[derive(Debug, PartialEq)]
pub struct PushNotification {
    pub email_address: String,
    pub history_id: String,
}

/// Decodes the base64 `{emailAddress, historyId}` payload. Gmail sends the
/// history id as a JSON number; older payloads carry it as a string.
pub fn decode_push_data(data: &str) -> Result<PushNotification, String> {
    let bytes = BASE64
        .decode(data)
        .map_err(|e| format!("invalid base64 payload: {}", e))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| format!("invalid JSON payload: {}", e))?;

    let email_address = value
        .get("emailAddress")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "payload missing emailAddress".to_string())?
        .to_string();

    let history_id = match value.get("historyId") {
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        _ => return Err("payload missing historyId".to_string()),
    };

    Ok(PushNotification { email_address, history_id })
}

/// Shared-token check on the push URL. Permissive in development and when no
/// token is configured; real deployments must set
/// GMAIL_PUBSUB_VERIFICATION_TOKEN before going to production.
pub fn verify_push_token(query_token: Option<&str>) -> bool {
    if std::env::var("ENVIRONMENT").unwrap_or_default() == "development" {
        return true;
    }
    match std::env::var("GMAIL_PUBSUB_VERIFICATION_TOKEN") {
        Ok(expected) if !expected.is_empty() => query_token == Some(expected.as_str()),
        _ => {
            tracing::warn!("GMAIL_PUBSUB_VERIFICATION_TOKEN not set; accepting push without verification");
            true
        }
    }
}

pub async fn gmail_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WebhookParams>,
    payload: Result<Json<PubSubEnvelope>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if !verify_push_token(params.token.as_deref()) {
        tracing::error!("Gmail webhook push token verification failed");
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid push token"})),
        ));
    }

    let envelope = match payload {
        Ok(Json(envelope)) => envelope,
        Err(e) => {
            tracing::error!("Malformed Gmail push envelope: {}", e);
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Malformed push envelope"})),
            ));
        }
    };

    let data = match envelope.message.data.as_deref() {
        Some(data) => data,
        None => {
            tracing::error!("Gmail push envelope missing message data");
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Push envelope missing data"})),
            ));
        }
    };

    let notification = match decode_push_data(data) {
        Ok(notification) => notification,
        Err(e) => {
            tracing::error!("Failed to decode Gmail push payload: {}", e);
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Invalid push payload", "details": e})),
            ));
        }
    };

    tracing::info!(
        "Gmail push for {} at history {} (pubsub message {:?})",
        notification.email_address,
        notification.history_id,
        envelope.message.message_id
    );

    // Recognized envelopes always get a 200-class response; a 5xx here would
    // trigger a redelivery storm from the push service
    match state
        .notification_tracker
        .handle_notification(&notification.email_address, &notification.history_id)
        .await
    {
        Ok(NotificationOutcome::Processed { messages_seen, replies_recorded }) => Ok(Json(json!({
            "status": "processed",
            "messages_seen": messages_seen,
            "replies_recorded": replies_recorded,
        }))),
        Ok(NotificationOutcome::AlreadyProcessed) => Ok(Json(json!({ "status": "duplicate" }))),
        Ok(NotificationOutcome::UntrackedMailbox) => Ok(Json(json!({ "status": "ignored" }))),
        Err(e) => {
            tracing::error!(
                "Failed to process Gmail notification for {}: {}",
                notification.email_address,
                e
            );
            Ok(Json(json!({ "status": "error", "details": e.to_string() })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_numeric_history_id() {
        let data = BASE64.encode(r#"{"emailAddress":"me@example.com","historyId":42917}"#);
        let notification = decode_push_data(&data).expect("decode");
        assert_eq!(notification.email_address, "me@example.com");
        assert_eq!(notification.history_id, "42917");
    }

    #[test]
    fn decodes_string_history_id() {
        let data = BASE64.encode(r#"{"emailAddress":"me@example.com","historyId":"42917"}"#);
        let notification = decode_push_data(&data).expect("decode");
        assert_eq!(notification.history_id, "42917");
    }

    #[test]
    fn rejects_payload_without_email() {
        let data = BASE64.encode(r#"{"historyId":42917}"#);
        assert!(decode_push_data(&data).is_err());
    }

    #[test]
    fn rejects_garbage_base64() {
        assert!(decode_push_data("%%%not-base64%%%").is_err());
    }
}
