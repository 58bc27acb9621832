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
    models::integration_models::NewGmailIntegration,
    utils::encryption::encrypt_token,
};

#[derive(Deserialize)]
pub struct AuthRequest {
    code: String,
    state: String,
}

const GMAIL_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.send",
];

pub async fn gmail_login(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    tracing::info!("Starting Gmail OAuth flow for user {}", auth_user.user_id);

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
        .gmail_oauth_client
        .authorize_url(|| CsrfToken::new(state_token.clone()))
        .add_scopes(GMAIL_SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(pkce_challenge)
        .url();

    Ok(Json(json!({
        "auth_url": auth_url.to_string(),
        "message": "OAuth flow initiated successfully"
    })))
}

pub async fn gmail_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthRequest>,
) -> Result<Redirect, (StatusCode, Json<serde_json::Value>)> {
    tracing::info!("Gmail OAuth callback received with state: {}", query.state);

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
        .gmail_oauth_client
        .exchange_code(AuthorizationCode::new(query.code))
        .set_pkce_verifier(pkce_verifier)
        .request_async(&http_client)
        .await
        .map_err(|e| {
            tracing::error!("Gmail token exchange failed: {}", e);
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
            tracing::error!("Gmail token response carried no refresh token");
            let redirect = format!(
                "{}/settings?gmail_error={}",
                frontend_url,
                urlencoding::encode("No refresh token granted, please reconnect")
            );
            return Ok(Redirect::to(&redirect));
        }
    };
    let expires_in = token_result.expires_in().unwrap_or_default().as_secs() as i64;

    // The notification webhook identifies integrations by mailbox address
    let profile = state
        .gmail_api
        .profile(&access_token)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch Gmail profile: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to resolve mailbox address"}))
            )
        })?;

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
        .create_gmail_integration(NewGmailIntegration {
            user_id,
            email_address: profile.email_address.to_lowercase(),
            access_token: encrypted_access,
            refresh_token: encrypted_refresh,
            token_expires_at: (now + expires_in) as i32,
            active: true,
            created_at: now as i32,
        })
        .map_err(|e| {
            tracing::error!("Failed to store Gmail integration: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to store integration"}))
            )
        })?;

    tracing::info!(
        "Connected Gmail mailbox {} for user {} (integration {})",
        integration.email_address,
        user_id,
        integration.id
    );

    // Best effort: a missed watch registration is retried by the renewal job
    if !state.watch_manager.register_watch(integration.id).await {
        tracing::warn!("Watch registration deferred for integration {}", integration.id);
    }

    Ok(Redirect::to(&format!("{}/settings?gmail=connected", frontend_url)))
}

pub async fn gmail_status(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.integration_repository.active_gmail_for_user(auth_user.user_id) {
        Ok(Some(integration)) => Ok(Json(json!({
            "connected": true,
            "integration_id": integration.id,
            "email_address": integration.email_address,
        }))),
        Ok(None) => Ok(Json(json!({ "connected": false }))),
        Err(e) => {
            tracing::error!("Failed to check Gmail status: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to check Gmail status", "details": e.to_string() })),
            ))
        }
    }
}

#[derive(Deserialize)]
pub struct DisconnectRequest {
    #[serde(rename = "gmailIntegrationId")]
    pub gmail_integration_id: i32,
}

/// Disconnect stops the provider watch before deactivating local rows so no
/// orphaned subscription keeps pushing at the webhook.
pub async fn gmail_disconnect(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<DisconnectRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
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

    let watch_stopped = state.watch_manager.cancel_watch(integration.id).await;
    if !watch_stopped {
        tracing::warn!(
            "Remote watch stop unconfirmed for integration {}; local state deactivated anyway",
            integration.id
        );
    }

    if let Err(e) = state.integration_repository.deactivate_gmail_integration(integration.id) {
        tracing::error!("Failed to deactivate integration {}: {}", integration.id, e);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Failed to disconnect", "details": e.to_string()})),
        ));
    }

    tracing::info!("Disconnected Gmail integration {} for user {}", integration.id, auth_user.user_id);
    Ok(Json(json!({
        "message": "Gmail disconnected successfully",
        "watch_stopped": watch_stopped,
    })))
}

/// Parses the `"<record-id>:<csrf>"` state token, loads the session record
/// and checks the CSRF half against it.
pub(crate) async fn load_oauth_session(
    state: &AppState,
    state_token: &str,
) -> Result<(Record, Id), (StatusCode, Json<serde_json::Value>)> {
    let state_parts: Vec<&str> = state_token.split(':').collect();
    if state_parts.len() != 2 {
        tracing::error!("Invalid OAuth state format: {}", state_token);
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid state format"}))
        ));
    }
    let session_id_str = state_parts[0];
    let state_csrf = state_parts[1];

    let session_id = session_id_str.parse::<i128>()
        .map_err(|e| {
            tracing::error!("Invalid session ID format: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Invalid session ID format"}))
            )
        })?;
    let session_id = Id(session_id);

    let record = state.session_store.load(&session_id).await
        .map_err(|e| {
            tracing::error!("Session store error loading record: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Session store error: {}", e)}))
            )
        })?;

    let record = match record {
        Some(r) => r,
        None => {
            tracing::error!("Session record missing for session_id: {}", session_id_str);
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Session record not found"}))
            ));
        },
    };

    let stored_csrf_token = record.data.get("csrf_token")
        .and_then(|v| v.as_str().map(String::from))
        .ok_or_else(|| {
            tracing::error!("CSRF token missing from session record");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "CSRF token missing from session"}))
            )
        })?;

    if stored_csrf_token != state_csrf {
        tracing::error!(
            "CSRF token mismatch: stored={}, received={}",
            stored_csrf_token,
            state_csrf
        );
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "CSRF token mismatch"}))
        ));
    }

    Ok((record, session_id))
}
