use std::sync::Arc;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    AppState,
    handlers::auth_middleware::AuthUser,
};

/// Lists the user's integrations with their push-subscription state.
pub async fn list_watches(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let integrations = state
        .integration_repository
        .gmail_integrations_for_user(auth_user.user_id)
        .map_err(|e| {
            tracing::error!("Failed to list integrations: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to list integrations", "details": e.to_string()})),
            )
        })?;

    let mut rows = Vec::new();
    for integration in integrations {
        let watch = state
            .integration_repository
            .find_watch(integration.id)
            .unwrap_or_else(|e| {
                tracing::error!("Failed to load watch for integration {}: {}", integration.id, e);
                None
            });
        rows.push(json!({
            "integration_id": integration.id,
            "email_address": integration.email_address,
            "active": integration.active,
            "watch": watch.map(|w| json!({
                "history_id": w.history_id,
                "expiration": w.expiration,
                "topic_name": w.topic_name,
                "active": w.active,
                "last_synced_at": w.last_synced_at,
            })),
        }));
    }

    Ok(Json(json!({ "integrations": rows })))
}

#[derive(Deserialize)]
pub struct RegisterWatchRequest {
    #[serde(rename = "integrationId")]
    pub integration_id: i32,
}

pub async fn register_watch(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<RegisterWatchRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let integration = state
        .integration_repository
        .find_gmail_by_id(request.integration_id)
        .map_err(|e| {
            tracing::error!("Failed to load integration: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to load integration", "details": e.to_string()})),
            )
        })?
        .filter(|integration| integration.user_id == auth_user.user_id)
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Gmail integration not found"})),
        ))?;

    let registered = state.watch_manager.register_watch(integration.id).await;
    Ok(Json(json!({
        "success": registered,
        "integration_id": integration.id,
    })))
}

/// Re-registers every watch expiring within the renewal window.
pub async fn renew_watches(
    State(state): State<Arc<AppState>>,
    _auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let renewed = state.watch_manager.renew_expiring_watches().await;
    Ok(Json(json!({ "renewed": renewed })))
}
