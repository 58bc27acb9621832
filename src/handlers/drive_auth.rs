use std::sync::Arc;
use axum::{
    extract::{Query, State},
    response::{Json, Redirect},
    http::StatusCode,
};
use tower_sessions::{session_store::SessionStore, session::{Id, Record}};
use oauth2::{
    AuthorizationCode,
    CsrfToken,
    PkceCodeChallenge,
    PkceCodeVerifier,
    Scope,
    TokenResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use time::OffsetDateTime;

use crate::{
    AppState,
    handlers::auth_middleware::AuthUser,
    handlers::gmail_auth::load_oauth_session,
    models::integration_models::NewDriveIntegration,
    utils::encryption::encrypt_token,
};

#[derive(Deserialize)]
pub struct AuthRequest {
    code: String,
    state: String,
}

const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

pub async fn drive_login(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    tracing::info!("Starting Drive OAuth flow for user {}", auth_user.user_id);

    let csrf_token = CsrfToken::new_random();
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let mut record = Record {
        id: Id(Uuid::new_v4().as_u128() as i128),
        data: Default::default(),
        expiry_date: OffsetDateTime::now_utc() + time::Duration::hours(1),
    };
    record.data.insert("user_id".to_string(), json!(auth_user.user_id));
    record.data.insert("pkce_verifier".to_string(), json!(pkce_verifier.secret().to_string()));
    record.data.insert("csrf_token".to_string(), json!(csrf_token.secret().to_string()));

    if let Err(e) = state.session_store.create(&mut record).await {
        tracing::error!("Failed to store OAuth session record: {}", e);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("Failed to store session record: {}", e)}))
        ));
    }

    let state_token = format!("{}:{}", record.id.0, csrf_token.secret());
    let (auth_url, _) = state
        .drive_oauth_client
        .authorize_url(|| CsrfToken::new(state_token.clone()))
        .add_scope(Scope::new(DRIVE_SCOPE.to_string()))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(pkce_challenge)
        .url();

    Ok(Json(json!({
        "auth_url": auth_url.to_string(),
        "message": "OAuth flow initiated successfully"
    })))
}

pub async fn drive_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthRequest>,
) -> Result<Redirect, (StatusCode, Json<serde_json::Value>)> {
    tracing::info!("Drive OAuth callback received with state: {}", query.state);

    let frontend_url = std::env::var("FRONTEND_URL").expect("FRONTEND_URL must be set");

    let (record, session_id) = load_oauth_session(&state, &query.state).await?;

    let user_id = record.data.get("user_id")
        .and_then(|v| v.as_i64())
        .map(|v| v as i32)
        .ok_or_else(|| {
            tracing::error!("User id missing from OAuth session record");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "User id missing from session"}))
            )
        })?;

    let pkce_verifier = record.data.get("pkce_verifier")
        .and_then(|v| v.as_str().map(|s| PkceCodeVerifier::new(s.to_string())))
        .ok_or_else(|| {
            tracing::error!("PKCE verifier missing from OAuth session record");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "PKCE verifier missing from session"}))
            )
        })?;

    let http_client = reqwest::ClientBuilder::new()
        // Following redirects opens the client up to SSRF vulnerabilities.
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Client should build");

    let token_result = state
        .drive_oauth_client
        .exchange_code(AuthorizationCode::new(query.code))
        .set_pkce_verifier(pkce_verifier)
        .request_async(&http_client)
        .await
        .map_err(|e| {
            tracing::error!("Drive token exchange failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Token exchange failed: {}", e)}))
            )
        })?;

    if let Err(e) = state.session_store.delete(&session_id).await {
        tracing::error!("Failed to delete OAuth session record: {}", e);
    }

    let access_token = token_result.access_token().secret().to_string();
    let refresh_token = match token_result.refresh_token() {
        Some(rt) => rt.secret().to_string(),
        None => {
            tracing::error!("Drive token response carried no refresh token");
            let redirect = format!(
                "{}/settings?drive_error={}",
                frontend_url,
                urlencoding::encode("No refresh token granted, please reconnect")
            );
            return Ok(Redirect::to(&redirect));
        }
    };
    let expires_in = token_result.expires_in().unwrap_or_default().as_secs() as i64;

    let now = chrono::Utc::now().timestamp();
    let encrypted_access = encrypt_token(&access_token).map_err(|e| {
        tracing::error!("Failed to encrypt access token: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to store credentials"}))
        )
    })?;
    let encrypted_refresh = encrypt_token(&refresh_token).map_err(|e| {
        tracing::error!("Failed to encrypt refresh token: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to store credentials"}))
        )
    })?;

    let integration = state
        .integration_repository
        .create_drive_integration(NewDriveIntegration {
            user_id,
            access_token: encrypted_access,
            refresh_token: encrypted_refresh,
            token_expires_at: (now + expires_in) as i32,
            active: true,
            created_at: now as i32,
        })
        .map_err(|e| {
            tracing::error!("Failed to store Drive integration: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to store integration"}))
            )
        })?;

    tracing::info!("Connected Drive for user {} (integration {})", user_id, integration.id);
    Ok(Redirect::to(&format!("{}/settings?drive=connected", frontend_url)))
}

pub async fn drive_status(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.integration_repository.active_drive_for_user(auth_user.user_id) {
        Ok(Some(integration)) => Ok(Json(json!({
            "connected": true,
            "integration_id": integration.id,
        }))),
        Ok(None) => Ok(Json(json!({ "connected": false }))),
        Err(e) => {
            tracing::error!("Failed to check Drive status: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to check Drive status", "details": e.to_string() })),
            ))
        }
    }
}

pub async fn drive_disconnect(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let integration = state
        .integration_repository
        .active_drive_for_user(auth_user.user_id)
        .map_err(|e| {
            tracing::error!("Failed to load Drive integration: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to load integration", "details": e.to_string()})),
            )
        })?
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Drive integration not found"})),
        ))?;

    if let Err(e) = state.integration_repository.deactivate_drive_integration(integration.id) {
        tracing::error!("Failed to deactivate Drive integration {}: {}", integration.id, e);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to disconnect", "details": e.to_string()})),
        ));
    }

    tracing::info!("Disconnected Drive integration {} for user {}", integration.id, auth_user.user_id);
    Ok(Json(json!({"message": "Drive disconnected successfully"})))
}
