//! Review routes
//!
//! Every change that can move a target's approved rating set locks the
//! target row and runs `ratings::refresh` in the same transaction.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{CurrentUser, MaybeUser, RequireStaff};
use crate::domain::accounts::Actor;
use crate::domain::reviews::{
    check_reviewer, CreateReviewRequest, ReplyRequest, Review, ReviewFilter, ReviewReply,
    ReviewResponse, ReviewTarget, ReviewsForItemQuery, UpdateReviewRequest,
};
use crate::error::ApiError;
use crate::services::{notifications, ratings};

const REVIEW_SOURCE: &str = r#"
    (SELECT r.id, r.author_id, p.username AS author_username, r.target_type, r.target_id,
            r.rating, r.title, r.comment, r.is_approved, r.is_edited, r.created_at, r.updated_at
     FROM reviews r
     JOIN profiles p ON p.id = r.author_id) AS review
"#;

const REPLY_SOURCE: &str = r#"
    (SELECT rr.id, rr.review_id, rr.author_id, p.username AS author_username, rr.comment,
            rr.is_edited, rr.created_at, rr.updated_at
     FROM review_replies rr
     JOIN profiles p ON p.id = rr.author_id) AS reply
"#;

async fn fetch_review(db: &PgPool, review_id: Uuid) -> Result<Option<Review>, ApiError> {
    sqlx::query_as::<_, Review>(&format!("SELECT * FROM {} WHERE id = $1", REVIEW_SOURCE))
        .bind(review_id)
        .fetch_optional(db)
        .await
        .map_err(ApiError::database)
}

/// Unapproved reviews stay visible to their author and staff.
async fn visible_review(
    db: &PgPool,
    review_id: Uuid,
    viewer: Option<&Actor>,
) -> Result<Review, ApiError> {
    fetch_review(db, review_id)
        .await?
        .filter(|r| r.is_approved || viewer.is_some_and(|a| a.owns_or_staff(r.author_id)))
        .ok_or_else(|| ApiError::not_found("Review not found"))
}

async fn replies_for(db: &PgPool, review_ids: &[Uuid]) -> Result<Vec<ReviewReply>, ApiError> {
    sqlx::query_as::<_, ReviewReply>(&format!(
        "SELECT * FROM {} WHERE review_id = ANY($1) ORDER BY created_at, id",
        REPLY_SOURCE
    ))
    .bind(review_ids)
    .fetch_all(db)
    .await
    .map_err(ApiError::database)
}

/// Attach replies to each review, keeping the review order.
async fn with_replies(db: &PgPool, reviews: Vec<Review>) -> Result<Vec<ReviewResponse>, ApiError> {
    let ids: Vec<Uuid> = reviews.iter().map(|r| r.id).collect();
    let mut by_review: HashMap<Uuid, Vec<ReviewReply>> = HashMap::new();
    for reply in replies_for(db, &ids).await? {
        by_review.entry(reply.review_id).or_default().push(reply);
    }

    Ok(reviews
        .into_iter()
        .map(|review| {
            let replies = by_review.remove(&review.id).unwrap_or_default();
            ReviewResponse { review, replies }
        })
        .collect())
}

async fn review_response(db: &PgPool, review: Review) -> Result<ReviewResponse, ApiError> {
    let replies = replies_for(db, &[review.id]).await?;
    Ok(ReviewResponse { review, replies })
}

/// Lock the reviewed row so the write and the aggregate refresh that
/// follow it serialize with other reviews of the same target.
async fn lock_target(
    tx: &mut Transaction<'_, Postgres>,
    target: ReviewTarget,
    target_id: Uuid,
) -> Result<Option<Uuid>, ApiError> {
    ratings::lock_target(tx, target, target_id)
        .await
        .map_err(ApiError::database)
}

async fn refresh_and_commit(
    mut tx: Transaction<'_, Postgres>,
    target: ReviewTarget,
    target_id: Uuid,
) -> Result<(), ApiError> {
    ratings::refresh(&mut tx, target, target_id)
        .await
        .map_err(ApiError::database)?;
    tx.commit().await.map_err(ApiError::database)
}

// ============================================================================
// Reviews
// ============================================================================

/// GET /api/v1/reviews
pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ReviewFilter>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = user.actor();
    let viewer_id = viewer.map(|a| a.user_id);
    let is_staff = viewer.is_some_and(|a| a.is_staff);
    let where_clause = r#"
        WHERE (is_approved OR $1 OR author_id = $2)
          AND ($3::text IS NULL OR target_type = $3)
          AND ($4::uuid IS NULL OR target_id = $4)
          AND ($5::uuid IS NULL OR author_id = $5)
          AND ($6::smallint IS NULL OR rating = $6)
    "#;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} {}",
        REVIEW_SOURCE, where_clause
    ))
    .bind(is_staff)
    .bind(viewer_id)
    .bind(filter.target_type)
    .bind(filter.target_id)
    .bind(filter.author_id)
    .bind(filter.rating)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let reviews = sqlx::query_as::<_, Review>(&format!(
        "SELECT * FROM {} {} ORDER BY created_at DESC LIMIT $7 OFFSET $8",
        REVIEW_SOURCE, where_clause
    ))
    .bind(is_staff)
    .bind(viewer_id)
    .bind(filter.target_type)
    .bind(filter.target_id)
    .bind(filter.author_id)
    .bind(filter.rating)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    let responses = with_replies(&state.db, reviews).await?;
    Ok(Paginated::new(responses, &pagination, total))
}

/// GET /api/v1/reviews/for-item?target_type=&target_id=
pub async fn reviews_for_item(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(item): Query<ReviewsForItemQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let where_clause = "WHERE is_approved AND target_type = $1 AND target_id = $2";

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} {}",
        REVIEW_SOURCE, where_clause
    ))
    .bind(item.target_type)
    .bind(item.target_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let reviews = sqlx::query_as::<_, Review>(&format!(
        "SELECT * FROM {} {} ORDER BY created_at DESC LIMIT $3 OFFSET $4",
        REVIEW_SOURCE, where_clause
    ))
    .bind(item.target_type)
    .bind(item.target_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    let responses = with_replies(&state.db, reviews).await?;
    Ok(Paginated::new(responses, &pagination, total))
}

/// GET /api/v1/reviews/:id
pub async fn get_review(
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<Uuid>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    let review = visible_review(&state.db, review_id, user.actor()).await?;
    Ok(DataResponse::new(review_response(&state.db, review).await?))
}

/// POST /api/v1/reviews
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    input.validate().map_err(ApiError::bad_request)?;

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;
    let owner_id = lock_target(&mut tx, input.target_type, input.target_id)
        .await?
        .ok_or_else(|| {
            ApiError::bad_request(format!("The reviewed {} does not exist.", input.target_type))
        })?;
    check_reviewer(user.user_id, owner_id).map_err(ApiError::bad_request)?;

    // one review per author and target is enforced by reviews_one_per_author (409)
    let review_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO reviews (author_id, target_type, target_id, rating, title, comment)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(user.user_id)
    .bind(input.target_type)
    .bind(input.target_id)
    .bind(input.rating)
    .bind(&input.title)
    .bind(input.comment.trim())
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    refresh_and_commit(tx, input.target_type, input.target_id).await?;

    tracing::info!(
        review_id = %review_id,
        author_id = %user.user_id,
        target_type = %input.target_type,
        target_id = %input.target_id,
        rating = input.rating,
        "Review created"
    );

    notifications::notify_review_received(
        &state.db,
        owner_id,
        review_id,
        &user.username,
        input.rating,
    )
    .await;

    let review = fetch_review(&state.db, review_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    Ok(Created(review_response(&state.db, review).await?))
}

/// PATCH /api/v1/reviews/:id
pub async fn update_review(
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<UpdateReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    input.validate().map_err(ApiError::bad_request)?;
    let review = visible_review(&state.db, review_id, Some(&user.actor)).await?;
    if review.author_id != user.user_id {
        return Err(ApiError::forbidden("You can only edit your own reviews"));
    }

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;
    lock_target(&mut tx, review.target_type, review.target_id).await?;
    sqlx::query(
        r#"
        UPDATE reviews SET
            rating = COALESCE($2, rating),
            title = COALESCE($3, title),
            comment = COALESCE($4, comment),
            is_edited = TRUE,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(review.id)
    .bind(input.rating)
    .bind(&input.title)
    .bind(input.comment.as_deref().map(str::trim))
    .execute(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    refresh_and_commit(tx, review.target_type, review.target_id).await?;

    let review = fetch_review(&state.db, review.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    Ok(DataResponse::new(review_response(&state.db, review).await?))
}

/// DELETE /api/v1/reviews/:id
pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let review = visible_review(&state.db, review_id, Some(&user.actor)).await?;
    if !user.owns_or_staff(review.author_id) {
        return Err(ApiError::forbidden("You can only delete your own reviews"));
    }

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;
    lock_target(&mut tx, review.target_type, review.target_id).await?;
    sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(review.id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::database)?;

    refresh_and_commit(tx, review.target_type, review.target_id).await?;

    tracing::info!(review_id = %review.id, user_id = %user.user_id, "Review deleted");
    Ok(NoContent)
}

/// POST /api/v1/reviews/:id/toggle-approval
pub async fn toggle_approval(
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<Uuid>,
    staff: RequireStaff,
) -> Result<impl IntoResponse, ApiError> {
    let review = fetch_review(&state.db, review_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;
    lock_target(&mut tx, review.target_type, review.target_id).await?;
    let is_approved: bool = sqlx::query_scalar(
        r#"
        UPDATE reviews SET is_approved = NOT is_approved, updated_at = NOW()
        WHERE id = $1
        RETURNING is_approved
        "#,
    )
    .bind(review.id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Review not found"))?;

    refresh_and_commit(tx, review.target_type, review.target_id).await?;

    tracing::info!(
        review_id = %review_id,
        staff_id = %staff.user_id,
        is_approved = is_approved,
        "Review approval toggled"
    );

    let review = fetch_review(&state.db, review_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    Ok(DataResponse::new(review_response(&state.db, review).await?))
}

// ============================================================================
// Replies
// ============================================================================

async fn fetch_reply(db: &PgPool, review_id: Uuid, reply_id: Uuid) -> Result<ReviewReply, ApiError> {
    sqlx::query_as::<_, ReviewReply>(&format!(
        "SELECT * FROM {} WHERE id = $1 AND review_id = $2",
        REPLY_SOURCE
    ))
    .bind(reply_id)
    .bind(review_id)
    .fetch_optional(db)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Reply not found"))
}

/// GET /api/v1/reviews/:id/replies
pub async fn list_replies(
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<Uuid>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    let review = visible_review(&state.db, review_id, user.actor()).await?;
    Ok(DataResponse::new(replies_for(&state.db, &[review.id]).await?))
}

/// POST /api/v1/reviews/:id/replies
///
/// Only the owner of the reviewed item (or staff) may answer.
pub async fn create_reply(
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<ReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = input.comment.trim();
    if comment.is_empty() {
        return Err(ApiError::bad_request("comment is required"));
    }
    let review = visible_review(&state.db, review_id, Some(&user.actor)).await?;

    let owner_id = ratings::target_owner(&state.db, review.target_type, review.target_id)
        .await
        .map_err(ApiError::database)?;
    if !user.is_staff && owner_id != Some(user.user_id) {
        return Err(ApiError::forbidden(
            "Only the owner of the reviewed item can reply",
        ));
    }

    let reply_id: Uuid = sqlx::query_scalar(
        "INSERT INTO review_replies (review_id, author_id, comment) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(review.id)
    .bind(user.user_id)
    .bind(comment)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Created(fetch_reply(&state.db, review.id, reply_id).await?))
}

/// PATCH /api/v1/reviews/:id/replies/:reply_id
pub async fn update_reply(
    State(state): State<Arc<AppState>>,
    Path((review_id, reply_id)): Path<(Uuid, Uuid)>,
    user: CurrentUser,
    Json(input): Json<ReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reply = fetch_reply(&state.db, review_id, reply_id).await?;
    if reply.author_id != user.user_id {
        return Err(ApiError::forbidden("You can only edit your own replies"));
    }
    let comment = input.comment.trim();
    if comment.is_empty() {
        return Err(ApiError::bad_request("comment is required"));
    }

    sqlx::query(
        "UPDATE review_replies SET comment = $2, is_edited = TRUE, updated_at = NOW() WHERE id = $1",
    )
    .bind(reply.id)
    .bind(comment)
    .execute(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(fetch_reply(&state.db, review_id, reply.id).await?))
}

/// DELETE /api/v1/reviews/:id/replies/:reply_id
pub async fn delete_reply(
    State(state): State<Arc<AppState>>,
    Path((review_id, reply_id)): Path<(Uuid, Uuid)>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let reply = fetch_reply(&state.db, review_id, reply_id).await?;
    if !user.owns_or_staff(reply.author_id) {
        return Err(ApiError::forbidden("You can only delete your own replies"));
    }

    sqlx::query("DELETE FROM review_replies WHERE id = $1")
        .bind(reply.id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    Ok(NoContent)
}
