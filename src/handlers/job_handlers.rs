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
    models::campaign_models::NewJobListing,
};

#[derive(Deserialize)]
pub struct JobListingRequest {
    #[serde(rename = "clientId")]
    pub client_id: i32,
    pub title: String,
    #[serde(rename = "companyName")]
    pub company_name: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

pub async fn create_job_listing(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<JobListingRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if request.title.trim().is_empty() || request.company_name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Title and company name are required"})),
        ));
    }

    // The listing must hang off one of the caller's clients
    let client = state
        .client_repository
        .find_client(request.client_id)
        .map_err(|e| {
            tracing::error!("Failed to load client: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to load client", "details": e.to_string()})),
            )
        })?
        .filter(|client| client.user_id == auth_user.user_id)
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Client not found"})),
        ))?;

    let listing = state
        .client_repository
        .create_job_listing(NewJobListing {
            client_id: client.id,
            title: request.title.trim().to_string(),
            company_name: request.company_name.trim().to_string(),
            location: request.location,
            description: request.description,
            status: request.status.unwrap_or_else(|| "open".to_string()),
            created_at: chrono::Utc::now().timestamp() as i32,
        })
        .map_err(|e| {
            tracing::error!("Failed to create job listing: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to create job listing", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"job_listing": listing})))
}

pub async fn list_job_listings(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let listings = state
        .client_repository
        .job_listings_for_user(auth_user.user_id)
        .map_err(|e| {
            tracing::error!("Failed to list job listings: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to list job listings", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"job_listings": listings})))
}

#[derive(Deserialize)]
pub struct JobListingUpdateRequest {
    pub title: String,
    #[serde(rename = "companyName")]
    pub company_name: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

pub async fn update_job_listing(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(listing_id): Path<i32>,
    Json(request): Json<JobListingUpdateRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let listing = load_owned_listing(&state, auth_user.user_id, listing_id)?;
    state
        .client_repository
        .update_job_listing(
            listing.id,
            request.title.trim(),
            request.company_name.trim(),
            request.location.as_deref(),
            request.description.as_deref(),
            request.status.as_deref().unwrap_or("open"),
        )
        .map_err(|e| {
            tracing::error!("Failed to update job listing: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to update job listing", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"message": "Job listing updated"})))
}

pub async fn delete_job_listing(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(listing_id): Path<i32>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let listing = load_owned_listing(&state, auth_user.user_id, listing_id)?;
    state
        .client_repository
        .delete_job_listing(listing.id)
        .map_err(|e| {
            tracing::error!("Failed to delete job listing: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to delete job listing", "details": e.to_string()})),
            )
        })?;

    Ok(Json(json!({"message": "Job listing deleted"})))
}

fn load_owned_listing(
    state: &AppState,
    user_id: i32,
    listing_id: i32,
) -> Result<crate::models::campaign_models::JobListing, (StatusCode, Json<serde_json::Value>)> {
    let listing = state
        .client_repository
        .find_job_listing(listing_id)
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

    let owned = state
        .client_repository
        .find_client(listing.client_id)
        .map_err(|e| {
            tracing::error!("Failed to load client: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to load client", "details": e.to_string()})),
            )
        })?
        .map(|client| client.user_id == user_id)
        .unwrap_or(false);
    if !owned {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Job listing not found"})),
        ));
    }

    Ok(listing)
}
