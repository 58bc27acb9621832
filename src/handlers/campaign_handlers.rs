use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde_json::json;

use crate::{
    AppState,
    gmail::client::GmailError,
    handlers::auth_middleware::AuthUser,
    models::campaign_models::NewCampaign,
};

#[derive(Deserialize)]
pub struct SendCampaignRequest {
    #[serde(rename = "jobListingId")]
    pub job_listing_id: i32,
    #[serde(rename = "recipientEmail")]
    pub recipient_email: String,
    #[serde(rename = "templateId")]
    pub template_id: Option<i32>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

/// Sends one outbound recruiting email and records the campaign with the
/// provider's message and thread ids.
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<SendCampaignRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let listing = state
        .client_repository
        .find_job_listing(request.job_listing_id)
        .map_err(|e| {
            tracing::error!("Failed to load job listing: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to load job listing", "details": e.to_string()})),
            )
        })?
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Job listing not found"})),
        ))?;

    // Subject and body come from a template or are given inline
    let (subject, body) = match request.template_id {
        Some(template_id) => {
            let template = state
                .template_repository
                .find_template(template_id)
                .map_err(|e| {
                    tracing::error!("Failed to load template: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"error": "Failed to load template", "details": e.to_string()})),
                    )
                })?
                .filter(|t| t.user_id == auth_user.user_id)
                .ok_or((
                    StatusCode::NOT_FOUND,
                    Json(json!({"error": "Template not found"})),
                ))?;
            (template.subject, template.body)
        }
        None => {
            let subject = request.subject.clone().unwrap_or_default();
            let body = request.body.clone().unwrap_or_default();
            if subject.trim().is_empty() || body.trim().is_empty() {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "Subject and body are required without a template"})),
                ));
            }
            (subject, body)
        }
    };

    let integration = state
        .integration_repository
        .active_gmail_for_user(auth_user.user_id)
        .map_err(|e| {
            tracing::error!("Failed to load integration: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to load integration", "details": e.to_string()})),
            )
        })?
        .ok_or((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "No active Gmail connection"})),
        ))?;

    let access_token = match state.token_refresher.ensure_fresh(&integration, 0).await {
        Ok(token) => token,
        Err(GmailError::TokenRefreshFailed(e)) => {
            // An unusable refresh token means the user must reconnect
            tracing::error!(
                "Token refresh failed sending campaign for integration {}: {}; deactivating",
                integration.id,
                e
            );
            if let Err(e) = state.integration_repository.deactivate_gmail_integration(integration.id) {
                tracing::error!("Failed to deactivate integration {}: {}", integration.id, e);
            }
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Gmail connection expired, please reconnect"})),
            ));
        }
        Err(e) => {
            tracing::error!("Failed to obtain token: {}", e);
            return Err((
                e.status_code(),
                Json(json!({"error": "Failed to obtain access token", "details": e.to_string()})),
            ));
        }
    };

    let raw_message = format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
        integration.email_address,
        request.recipient_email.trim(),
        subject,
        body
    );
    let raw_encoded = URL_SAFE_NO_PAD.encode(raw_message.as_bytes());

    let sent = state
        .gmail_api
        .send_message(&access_token, &raw_encoded)
        .await
        .map_err(|e| {
            tracing::error!("Failed to send campaign email: {}", e);
            (
                e.status_code(),
                Json(json!({"error": "Failed to send email", "details": e.to_string()})),
            )
        })?;

    let now = chrono::Utc::now().timestamp() as i32;
    let campaign = state
        .campaign_repository
        .create_campaign(NewCampaign {
            job_listing_id: listing.id,
            gmail_integration_id: integration.id,
            recipient_email: request.recipient_email.trim().to_lowercase(),
            subject,
            body,
            thread_id: Some(sent.thread_id.clone()),
            message_id: Some(sent.id.clone()),
            status: "sent".to_string(),
            reply_status: "pending".to_string(),
            sent_at: Some(now),
            created_at: now,
        })
        .map_err(|e| {
            tracing::error!("Campaign email sent but row creation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to record campaign", "details": e.to_string()})),
            )
        })?;

    tracing::info!(
        "Sent campaign {} for listing {} (message {}, thread {})",
        campaign.id,
        listing.id,
        sent.id,
        sent.thread_id
    );
    Ok(Json(json!({
        "success": true,
        "campaign_id": campaign.id,
        "message_id": sent.id,
        "thread_id": sent.thread_id,
    })))
}

pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let campaigns = state
        .campaign_repository
        .campaigns_for_user(auth_user.user_id)
        .map_err(|e| {
            tracing::error!("Failed to list campaigns: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to list campaigns", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({ "campaigns": campaigns })))
}

#[derive(Deserialize)]
pub struct SimulateReplyRequest {
    pub sender: String,
    pub content: String,
}

/// Manual reply simulation for demos and debugging; writes the same fields
/// the matcher would.
pub async fn simulate_reply(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(campaign_id): Path<i32>,
    Json(request): Json<SimulateReplyRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let campaign = state
        .campaign_repository
        .find_by_id(campaign_id)
        .map_err(|e| {
            tracing::error!("Failed to load campaign: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to load campaign", "details": e.to_string()})),
            )
        })?
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Campaign not found"})),
        ))?;

    let integration = state
        .integration_repository
        .find_gmail_by_id(campaign.gmail_integration_id)
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
            Json(json!({"error": "Campaign not found"})),
        ))?;

    let now = chrono::Utc::now().timestamp() as i32;
    let simulated_id = format!("simulated-{}", uuid::Uuid::new_v4());
    state
        .campaign_repository
        .mark_replied(campaign.id, now, &request.sender, &request.content, &simulated_id)
        .map_err(|e| {
            tracing::error!("Failed to record simulated reply: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to record reply", "details": e.to_string()})),
            )
        })?;

    tracing::info!(
        "Simulated reply recorded on campaign {} (integration {})",
        campaign.id,
        integration.id
    );
    Ok(Json(json!({
        "success": true,
        "campaign_id": campaign.id,
        "reply_message_id": simulated_id,
    })))
}
