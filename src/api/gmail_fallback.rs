use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::handlers::auth_middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct FallbackScanRequest {
    #[serde(rename = "gmailIntegrationId")]
    pub gmail_integration_id: i32,
    #[serde(rename = "campaignId")]
    pub campaign_id: Option<i32>,
}

/// Manual trigger for the three-strategy fallback reply scan.
pub async fn check_replies_fallback(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<FallbackScanRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    tracing::info!(
        "Manual fallback reply scan requested by user {} for integration {}",
        auth_user.user_id,
        request.gmail_integration_id
    );

    let integration = state
        .integration_repository
        .find_gmail_by_id(request.gmail_integration_id)
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

    let outcomes = state
        .fallback_scanner
        .scan(&integration, request.campaign_id)
        .await
        .map_err(|e| {
            tracing::error!("Fallback scan failed: {}", e);
            (
                e.status_code(),
                Json(json!({"error": "Fallback scan failed", "details": e.to_string()})),
            )
        })?;

    let replies_found = outcomes.iter().filter(|o| o.reply_found).count();
    Ok(Json(json!({
        "success": true,
        "results": outcomes,
        "summary": {
            "checks_run": outcomes.len(),
            "replies_found": replies_found,
        },
    })))
}
