use std::sync::Arc;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde_json::json;
use jsonwebtoken::{encode, Header, EncodingKey};
use chrono::{Duration, Utc};

use crate::{
    AppState,
    handlers::auth_dtos::{Claims, LoginRequest, RegisterRequest},
    models::user_models::NewUser,
};

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    if request.email.trim().is_empty() || !request.email.contains('@') {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "A valid email is required"})),
        ));
    }
    if request.password.len() < 8 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Password must be at least 8 characters"})),
        ));
    }

    match state.user_repository.email_exists(request.email.trim()) {
        Ok(true) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Email is already registered"})),
            ));
        }
        Ok(false) => {}
        Err(e) => {
            tracing::error!("Failed to check email: {}", e);
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Registration failed"})),
            ));
        }
    }

    let password_hash = bcrypt::hash(&request.password, bcrypt::DEFAULT_COST).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Registration failed"})),
        )
    })?;

    let new_user = NewUser {
        email: request.email.trim().to_lowercase(),
        password_hash,
        verified: false,
        created_at: Utc::now().timestamp() as i32,
    };
    if let Err(e) = state.user_repository.create_user(new_user) {
        tracing::error!("Failed to create user: {}", e);
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Registration failed"})),
        ));
    }

    tracing::info!("Registered new user {}", request.email.trim());
    Ok(Json(json!({"message": "Registration successful"})))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let user = state
        .user_repository
        .find_by_email(&request.email.trim().to_lowercase())
        .map_err(|e| {
            tracing::error!("Failed to look up user: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Login failed"})),
            )
        })?
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid email or password"})),
        ))?;

    let valid = bcrypt::verify(&request.password, &user.password_hash).unwrap_or(false);
    if !valid {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid email or password"})),
        ));
    }

    let claims = Claims {
        sub: user.id,
        exp: (Utc::now() + Duration::hours(24)).timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(
            std::env::var("JWT_SECRET_KEY")
                .expect("JWT_SECRET_KEY must be set in environment")
                .as_bytes(),
        ),
    )
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Token generation failed"})),
        )
    })?;

    Ok(Json(json!({"token": token, "user_id": user.id})))
}
