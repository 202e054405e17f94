//! Authentication routes
//!
//! These routes proxy authentication requests to Supabase Auth and keep the
//! local profile row in step with the identity provider.

use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::accounts::validate_username;
use crate::domain::auth::{
    AuthResponse, LoginRequest, RefreshTokenRequest, RegisterRequest, SessionResponse,
    SignupPendingResponse, SupabaseAuthResponse, SupabaseErrorResponse, SupabaseSignupResponse,
    SupabaseUser, User,
};
use crate::error::ApiError;
use crate::services::profiles;

fn auth_url(state: &AppState, path: &str) -> String {
    format!("{}/auth/v1/{}", state.settings.supabase_url, path)
}

fn parse_user_id(id: &str) -> Result<Uuid, ApiError> {
    id.parse()
        .map_err(|_| ApiError::internal("Invalid user ID from auth service"))
}

async fn provider_error(response: reqwest::Response, fallback: &str) -> String {
    response
        .json::<SupabaseErrorResponse>()
        .await
        .unwrap_or_else(|_| SupabaseErrorResponse::with_fallback(fallback))
        .get_message()
}

/// Create the local profile for a registration and fill in the optional
/// details the request carried.
async fn store_registered_profile(
    state: &AppState,
    user_id: Uuid,
    req: &RegisterRequest,
) -> Result<(), ApiError> {
    profiles::ensure_profile(
        &state.db,
        user_id,
        &req.email,
        Some(req.username.as_str()),
        req.user_type,
    )
    .await?;

    sqlx::query(
        r#"
        UPDATE profiles SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            company_name = COALESCE($4, company_name),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.company_name)
    .execute(&state.db)
    .await
    .map_err(ApiError::database)?;

    profiles::invalidate(&state.cache, user_id).await;
    Ok(())
}

/// POST /api/v1/auth/register
///
/// Register a new user with Supabase and create their profile.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_username(&req.username).map_err(ApiError::bad_request)?;

    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM profiles WHERE username = $1)")
        .bind(&req.username)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::database)?;
    if taken {
        return Err(ApiError::conflict("Username already taken"));
    }

    let response = state
        .http_client
        .post(auth_url(&state, "signup"))
        .header("apikey", &state.settings.supabase_anon_key)
        .json(&serde_json::json!({
            "email": req.email,
            "password": req.password,
            "data": {
                "user_type": req.user_type,
                "username": req.username,
            }
        }))
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to connect to auth service: {}", e)))?;

    if !response.status().is_success() {
        return Err(ApiError::bad_request(
            provider_error(response, "Registration failed").await,
        ));
    }

    // The body is a full session when email confirmation is disabled and a
    // bare user object otherwise.
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read auth response: {}", e)))?;

    if let Ok(session) = serde_json::from_str::<SupabaseAuthResponse>(&body) {
        let user_id = parse_user_id(&session.user.id)?;
        store_registered_profile(&state, user_id, &req).await?;

        tracing::info!(user_id = %user_id, user_type = %req.user_type, "User registered");

        let user: User = session.user.into();
        return Ok(Created(serde_json::json!(AuthResponse {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            expires_in: session.expires_in,
            user,
        })));
    }

    if let Ok(pending) = serde_json::from_str::<SupabaseSignupResponse>(&body) {
        let user_id = parse_user_id(&pending.id)?;
        store_registered_profile(&state, user_id, &req).await?;

        tracing::info!(user_id = %user_id, "User registered, confirmation pending");

        let pending: SignupPendingResponse = pending.into();
        return Ok(Created(serde_json::json!(pending)));
    }

    Err(ApiError::internal(
        "Failed to parse auth response: unexpected format",
    ))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .http_client
        .post(auth_url(&state, "token?grant_type=password"))
        .header("apikey", &state.settings.supabase_anon_key)
        .json(&serde_json::json!({
            "email": req.email,
            "password": req.password
        }))
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to connect to auth service: {}", e)))?;

    if !response.status().is_success() {
        return Err(ApiError::unauthorized(
            provider_error(response, "Invalid credentials").await,
        ));
    }

    let session: SupabaseAuthResponse = response
        .json()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to parse auth response: {}", e)))?;

    // Users created directly in Supabase get their profile here
    let user_id = parse_user_id(&session.user.id)?;
    let email = session.user.email.clone().unwrap_or(req.email);
    profiles::ensure_profile(
        &state.db,
        user_id,
        &email,
        session.user.username().as_deref(),
        session.user.user_type(),
    )
    .await?;

    tracing::info!(user_id = %user_id, "User logged in");

    let user: User = session.user.into();
    Ok(DataResponse::new(AuthResponse {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        expires_in: session.expires_in,
        user,
    }))
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .http_client
        .post(auth_url(&state, "logout"))
        .header("apikey", &state.settings.supabase_anon_key)
        .bearer_auth(auth.token())
        .send()
        .await;

    // The local session ends either way
    if let Err(e) = result {
        tracing::warn!(user_id = %auth.user_id, error = %e, "Auth service logout failed");
    }

    profiles::invalidate(&state.cache, auth.user_id).await;

    Ok(NoContent)
}

/// GET /api/v1/auth/session
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .http_client
        .get(auth_url(&state, "user"))
        .header("apikey", &state.settings.supabase_anon_key)
        .bearer_auth(auth.token())
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to fetch user: {}", e)))?;

    if !response.status().is_success() {
        return Err(ApiError::unauthorized("Invalid session"));
    }

    let supabase_user: SupabaseUser = response
        .json()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to parse user response: {}", e)))?;

    Ok(DataResponse::new(SessionResponse {
        user: supabase_user.into(),
        access_token: auth.token().to_string(),
        expires_at: auth.expires_at(),
    }))
}

/// POST /api/v1/auth/refresh
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .http_client
        .post(auth_url(&state, "token?grant_type=refresh_token"))
        .header("apikey", &state.settings.supabase_anon_key)
        .json(&serde_json::json!({ "refresh_token": req.refresh_token }))
        .send()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to connect to auth service: {}", e)))?;

    if !response.status().is_success() {
        return Err(ApiError::unauthorized(
            provider_error(response, "Invalid refresh token").await,
        ));
    }

    let session: SupabaseAuthResponse = response
        .json()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to parse auth response: {}", e)))?;

    let user: User = session.user.into();
    Ok(DataResponse::new(AuthResponse {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        expires_in: session.expires_in,
        user,
    }))
}
