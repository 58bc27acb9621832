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
    models::campaign_models::NewClient,
};

#[derive(Deserialize)]
pub struct ClientRequest {
    pub name: String,
    #[serde(rename = "contactEmail")]
    pub contact_email: String,
    #[serde(rename = "contactName")]
    pub contact_name: Option<String>,
    pub notes: Option<String>,
}

pub async fn create_client(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<ClientRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if request.name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Client name is required"})),
        ));
    }

    let client = state
        .client_repository
        .create_client(NewClient {
            user_id: auth_user.user_id,
            name: request.name.trim().to_string(),
            contact_email: request.contact_email.trim().to_lowercase(),
            contact_name: request.contact_name,
            notes: request.notes,
            created_at: chrono::Utc::now().timestamp() as i32,
        })
        .map_err(|e| {
            tracing::error!("Failed to create client: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to create client", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"client": client})))
}

pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let clients = state
        .client_repository
        .clients_for_user(auth_user.user_id)
        .map_err(|e| {
            tracing::error!("Failed to list clients: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to list clients", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"clients": clients})))
}

pub async fn get_client(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(client_id): Path<i32>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let client = load_owned_client(&state, auth_user.user_id, client_id)?;
    let listings = state
        .client_repository
        .job_listings_for_client(client.id)
        .map_err(|e| {
            tracing::error!("Failed to list job listings: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to list job listings", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"client": client, "job_listings": listings})))
}

pub async fn update_client(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(client_id): Path<i32>,
    Json(request): Json<ClientRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let client = load_owned_client(&state, auth_user.user_id, client_id)?;
    state
        .client_repository
        .update_client(
            client.id,
            request.name.trim(),
            request.contact_email.trim(),
            request.contact_name.as_deref(),
            request.notes.as_deref(),
        )
        .map_err(|e| {
            tracing::error!("Failed to update client: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to update client", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"message": "Client updated"})))
}

pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(client_id): Path<i32>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let client = load_owned_client(&state, auth_user.user_id, client_id)?;
    state
        .client_repository
        .delete_client(client.id)
        .map_err(|e| {
            tracing::error!("Failed to delete client: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to delete client", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"message": "Client deleted"})))
}

fn load_owned_client(
    state: &AppState,
    user_id: i32,
    client_id: i32,
) -> Result<crate::models::campaign_models::Client, (StatusCode, Json<serde_json::Value>)> {
    state
        .client_repository
        .find_client(client_id)
        .map_err(|e| {
            tracing::error!("Failed to load client: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to load client", "details": e.to_string()})),
            )
        })?
        .filter(|client| client.user_id == user_id)
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Client not found"})),
        ))
}
