//! Account routes: the caller's user record, profiles and the staff listing

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{CurrentUser, RequireStaff};
use crate::domain::accounts::{
    validate_username, Profile, ProfileFilter, ProfileResponse, UpdateProfileRequest,
    UpdateUserRequest,
};
use crate::error::ApiError;
use crate::services::profiles::{self, PROFILE_COLUMNS};

async fn load_profile(state: &AppState, user_id: Uuid) -> Result<ProfileResponse, ApiError> {
    profiles::get_profile(&state.db, &state.cache, user_id)
        .await?
        .map(ProfileResponse::from)
        .ok_or_else(|| ApiError::not_found("Profile not found"))
}

// ============================================================================
// users/me
// ============================================================================

/// GET /api/v1/users/me
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(DataResponse::new(load_profile(&state, user.user_id).await?))
}

/// PATCH /api/v1/users/me
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(ref username) = input.username {
        validate_username(username).map_err(ApiError::bad_request)?;
    }

    let result = sqlx::query_as::<_, Profile>(&format!(
        r#"
        UPDATE profiles SET
            username = COALESCE($2, username),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    ))
    .bind(user.user_id)
    .bind(&input.username)
    .bind(&input.first_name)
    .bind(&input.last_name)
    .fetch_one(&state.db)
    .await;

    let profile = match result {
        Ok(profile) => profile,
        Err(sqlx::Error::Database(e)) if e.constraint() == Some("profiles_username_key") => {
            return Err(ApiError::conflict("Username already taken"));
        }
        Err(e) => return Err(ApiError::database(e)),
    };

    profiles::invalidate(&state.cache, user.user_id).await;
    tracing::info!(user_id = %user.user_id, "User updated");

    Ok(DataResponse::new(ProfileResponse::from(profile)))
}

// ============================================================================
// Profiles
// ============================================================================

/// GET /api/v1/profiles/me
pub async fn get_my_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(DataResponse::new(load_profile(&state, user.user_id).await?))
}

/// PATCH /api/v1/profiles/me
///
/// `is_staff` is not part of the request and cannot be changed here.
pub async fn update_my_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = sqlx::query_as::<_, Profile>(&format!(
        r#"
        UPDATE profiles SET
            user_type = COALESCE($2, user_type),
            company_name = COALESCE($3, company_name),
            contact_number = COALESCE($4, contact_number),
            address = COALESCE($5, address),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        PROFILE_COLUMNS
    ))
    .bind(user.user_id)
    .bind(input.user_type)
    .bind(&input.company_name)
    .bind(&input.contact_number)
    .bind(&input.address)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    profiles::invalidate(&state.cache, user.user_id).await;
    tracing::info!(user_id = %user.user_id, user_type = %profile.user_type, "Profile updated");

    Ok(DataResponse::new(ProfileResponse::from(profile)))
}

/// GET /api/v1/profiles/:id
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    if !user.owns_or_staff(profile_id) {
        return Err(ApiError::forbidden("You can only view your own profile"));
    }
    Ok(DataResponse::new(load_profile(&state, profile_id).await?))
}

/// GET /api/v1/profiles
pub async fn list_profiles(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ProfileFilter>,
    _staff: RequireStaff,
) -> Result<impl IntoResponse, ApiError> {
    let search = filter.search.as_deref().map(|s| format!("%{}%", s.trim()));

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM profiles
        WHERE ($1::text IS NULL OR user_type = $1)
          AND ($2::text IS NULL OR username ILIKE $2 OR email ILIKE $2 OR company_name ILIKE $2)
        "#,
    )
    .bind(filter.user_type)
    .bind(&search)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let rows = sqlx::query_as::<_, Profile>(&format!(
        r#"
        SELECT {}
        FROM profiles
        WHERE ($1::text IS NULL OR user_type = $1)
          AND ($2::text IS NULL OR username ILIKE $2 OR email ILIKE $2 OR company_name ILIKE $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
        PROFILE_COLUMNS
    ))
    .bind(filter.user_type)
    .bind(&search)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    let data: Vec<ProfileResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Paginated::new(data, &pagination, total))
}
