//! Notification routes
//!
//! In-app notifications for the current user: list, count, mark read, delete.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::notifications::{
    MarkReadRequest, Notification, NotificationQuery, UnreadCountResponse,
};
use crate::error::ApiError;

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, type, title, message, data, is_read, read_at, created_at";

/// GET /api/v1/notifications
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<NotificationQuery>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let unread_only = filter.unread_only.unwrap_or(false);

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM notifications
        WHERE user_id = $1
          AND ($2::bool = false OR is_read = false)
          AND ($3::text IS NULL OR type = $3)
        "#,
    )
    .bind(auth.user_id)
    .bind(unread_only)
    .bind(filter.notification_type)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let rows = sqlx::query_as::<_, Notification>(&format!(
        r#"
        SELECT {}
        FROM notifications
        WHERE user_id = $1
          AND ($2::bool = false OR is_read = false)
          AND ($3::text IS NULL OR type = $3)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#,
        NOTIFICATION_COLUMNS
    ))
    .bind(auth.user_id)
    .bind(unread_only)
    .bind(filter.notification_type)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(rows, &pagination, total))
}

/// GET /api/v1/notifications/unread-count
pub async fn get_unread_count(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = false",
    )
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(UnreadCountResponse { count }))
}

/// GET /api/v1/notifications/:id
pub async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let notification = sqlx::query_as::<_, Notification>(&format!(
        "SELECT {} FROM notifications WHERE id = $1 AND user_id = $2",
        NOTIFICATION_COLUMNS
    ))
    .bind(notification_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Notification not found"))?;

    Ok(DataResponse::new(notification))
}

/// POST /api/v1/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    // Already-read rows keep their original read_at
    let notification = sqlx::query_as::<_, Notification>(&format!(
        r#"
        UPDATE notifications
        SET is_read = true, read_at = COALESCE(read_at, NOW())
        WHERE id = $1 AND user_id = $2
        RETURNING {}
        "#,
        NOTIFICATION_COLUMNS
    ))
    .bind(notification_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Notification not found"))?;

    Ok(DataResponse::new(notification))
}

/// POST /api/v1/notifications/mark-read
///
/// Mark the given notifications read, or all of them when no ids are sent.
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(input): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ids = input.notification_ids.filter(|ids| !ids.is_empty());

    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET is_read = true, read_at = NOW()
        WHERE user_id = $1 AND is_read = false
          AND ($2::uuid[] IS NULL OR id = ANY($2))
        "#,
    )
    .bind(auth.user_id)
    .bind(ids)
    .execute(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Json(serde_json::json!({ "marked_count": result.rows_affected() })))
}

/// POST /api/v1/notifications/read-all
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET is_read = true, read_at = NOW()
        WHERE user_id = $1 AND is_read = false
        "#,
    )
    .bind(auth.user_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::database)?;

    tracing::debug!(user_id = %auth.user_id, marked = result.rows_affected(), "Marked all read");

    Ok(Json(serde_json::json!({ "marked_count": result.rows_affected() })))
}

/// DELETE /api/v1/notifications/:id
pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
    auth: RequireAuth,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(notification_id)
        .bind(auth.user_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Notification not found"));
    }

    Ok(NoContent)
}
