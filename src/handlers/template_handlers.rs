use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    AppState,
    handlers::auth_middleware::AuthUser,
    models::campaign_models::NewEmailTemplate,
};

#[derive(Deserialize)]
pub struct TemplateRequest {
    pub name: String,
    pub subject: String,
    pub body: String,
}

pub async fn create_template(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<TemplateRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if request.name.trim().is_empty() || request.subject.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Template name and subject are required"})),
        ));
    }

    let now = chrono::Utc::now().timestamp() as i32;
    let template = state
        .template_repository
        .create_template(NewEmailTemplate {
            user_id: auth_user.user_id,
            name: request.name.trim().to_string(),
            subject: request.subject,
            body: request.body,
            created_at: now,
            updated_at: now,
        })
        .map_err(|e| {
            tracing::error!("Failed to create template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to create template", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"template": template})))
}

pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let templates = state
        .template_repository
        .templates_for_user(auth_user.user_id)
        .map_err(|e| {
            tracing::error!("Failed to list templates: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to list templates", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"templates": templates})))
}

pub async fn update_template(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(template_id): Path<i32>,
    Json(request): Json<TemplateRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
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
        .filter(|template| template.user_id == auth_user.user_id)
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Template not found"})),
        ))?;

    state
        .template_repository
        .update_template(
            template.id,
            request.name.trim(),
            &request.subject,
            &request.body,
            chrono::Utc::now().timestamp() as i32,
        )
        .map_err(|e| {
            tracing::error!("Failed to update template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to update template", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"message": "Template updated"})))
}

pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(template_id): Path<i32>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
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
        .filter(|template| template.user_id == auth_user.user_id)
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Template not found"})),
        ))?;

    state
        .template_repository
        .delete_template(template.id)
        .map_err(|e| {
            tracing::error!("Failed to delete template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to delete template", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"message": "Template deleted"})))
}
