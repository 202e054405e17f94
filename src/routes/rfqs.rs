//! RFQ routes
//!
//! Buyers publish requests for quotation; who can see one depends on the
//! viewer's role (see `rfq_visible_to`).

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::domain::accounts::Actor;
use crate::domain::orders::{
    rfq_visible_to, AwardQuoteRequest, ChangeStatusRequest, CreateRfqRequest, Quote, QuoteStatus,
    Rfq, RfqFilter, RfqResponse, RfqStatus, UpdateRfqRequest,
};
use crate::error::ApiError;
use crate::services::notifications;
use crate::services::orders::QUOTE_COLUMNS;

const RFQ_COLUMNS: &str = r#"
    id, buyer_id, title, description, category_id, quantity_required, unit_of_measurement,
    deadline_for_quotes, status, created_at, updated_at
"#;

const RFQ_SOURCE: &str = r#"
    (SELECT r.id, r.buyer_id, r.title, r.description, r.category_id, r.quantity_required,
            r.unit_of_measurement, r.deadline_for_quotes, r.status, r.created_at, r.updated_at,
            p.username AS buyer_username,
            (SELECT COUNT(*) FROM quotes q WHERE q.rfq_id = r.id) AS quote_count
     FROM rfqs r
     JOIN profiles p ON p.id = r.buyer_id) AS rfq
"#;

const PUBLICLY_OPEN: &str =
    "(status = 'open' AND (deadline_for_quotes IS NULL OR deadline_for_quotes >= NOW()))";

/// SQL form of `rfq_visible_to`; `$1` binds the viewer id.
fn visibility_clause(viewer: Option<&Actor>) -> String {
    match viewer {
        None => PUBLICLY_OPEN.to_string(),
        Some(a) if a.is_staff => "TRUE".to_string(),
        Some(a) if a.is_buyer() => format!("(buyer_id = $1 OR {})", PUBLICLY_OPEN),
        Some(a) if a.is_supplier() => format!(
            "({} OR EXISTS (SELECT 1 FROM quotes q WHERE q.rfq_id = rfq.id AND q.supplier_id = $1))",
            PUBLICLY_OPEN
        ),
        Some(_) => "FALSE".to_string(),
    }
}

pub(crate) async fn fetch_rfq(state: &AppState, rfq_id: Uuid) -> Result<Rfq, ApiError> {
    sqlx::query_as::<_, Rfq>(&format!("SELECT {} FROM rfqs WHERE id = $1", RFQ_COLUMNS))
        .bind(rfq_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("RFQ not found"))
}

async fn has_quoted(state: &AppState, rfq_id: Uuid, supplier_id: Uuid) -> Result<bool, ApiError> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM quotes WHERE rfq_id = $1 AND supplier_id = $2)",
    )
    .bind(rfq_id)
    .bind(supplier_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)
}

async fn rfq_response(state: &AppState, rfq_id: Uuid) -> Result<RfqResponse, ApiError> {
    sqlx::query_as::<_, RfqResponse>(&format!("SELECT * FROM {} WHERE id = $1", RFQ_SOURCE))
        .bind(rfq_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("RFQ not found"))
}

/// Load an RFQ the caller owns (or any, for staff).
async fn owned_rfq(state: &AppState, rfq_id: Uuid, user: &CurrentUser) -> Result<Rfq, ApiError> {
    let rfq = fetch_rfq(state, rfq_id).await?;
    if !user.owns_or_staff(rfq.buyer_id) {
        return Err(ApiError::forbidden("Only the RFQ owner can do this"));
    }
    Ok(rfq)
}

/// GET /api/v1/rfqs
pub async fn list_rfqs(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<RfqFilter>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = user.actor();
    let viewer_id = viewer.map(|a| a.user_id);
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s));

    let where_clause = format!(
        r#"
        -- $1 stays typed even when the role clause ignores it
        WHERE ($1::uuid IS NULL OR TRUE) AND {}
          AND ($2::text IS NULL OR status = $2)
          AND ($3::uuid IS NULL OR category_id = $3)
          AND ($4::text IS NULL OR title ILIKE $4 OR description ILIKE $4)
        "#,
        visibility_clause(viewer)
    );

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} {}",
        RFQ_SOURCE, where_clause
    ))
    .bind(viewer_id)
    .bind(filter.status)
    .bind(filter.category_id)
    .bind(&search)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let rows = sqlx::query_as::<_, RfqResponse>(&format!(
        "SELECT * FROM {} {} ORDER BY created_at DESC LIMIT $5 OFFSET $6",
        RFQ_SOURCE, where_clause
    ))
    .bind(viewer_id)
    .bind(filter.status)
    .bind(filter.category_id)
    .bind(&search)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(rows, &pagination, total))
}

/// GET /api/v1/rfqs/:id
pub async fn get_rfq(
    State(state): State<Arc<AppState>>,
    Path(rfq_id): Path<Uuid>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    let response = rfq_response(&state, rfq_id).await?;

    let quoted = match user.actor() {
        Some(actor) if actor.is_supplier() => has_quoted(&state, rfq_id, actor.user_id).await?,
        _ => false,
    };

    if !rfq_visible_to(&response.rfq, user.actor(), quoted, Utc::now()) {
        return Err(ApiError::not_found("RFQ not found"));
    }

    Ok(DataResponse::new(response))
}

/// POST /api/v1/rfqs
pub async fn create_rfq(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateRfqRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.can_create_rfq() {
        return Err(ApiError::forbidden("Only buyers can create RFQs"));
    }
    input.validate().map_err(ApiError::bad_request)?;

    let rfq_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO rfqs (buyer_id, title, description, category_id, quantity_required,
                          unit_of_measurement, deadline_for_quotes, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(user.user_id)
    .bind(input.title.trim())
    .bind(&input.description)
    .bind(input.category_id)
    .bind(input.quantity_required)
    .bind(&input.unit_of_measurement)
    .bind(input.deadline_for_quotes)
    .bind(RfqStatus::Pending)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    tracing::info!(rfq_id = %rfq_id, buyer_id = %user.user_id, "RFQ created");

    Ok(Created(rfq_response(&state, rfq_id).await?))
}

/// PATCH /api/v1/rfqs/:id
pub async fn update_rfq(
    State(state): State<Arc<AppState>>,
    Path(rfq_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<UpdateRfqRequest>,
) -> Result<impl IntoResponse, ApiError> {
    owned_rfq(&state, rfq_id, &user).await?;

    if input.quantity_required.is_some_and(|q| q < 1) {
        return Err(ApiError::bad_request("quantity_required must be at least 1"));
    }
    if input.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("title cannot be empty"));
    }

    sqlx::query(
        r#"
        UPDATE rfqs SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            category_id = COALESCE($4, category_id),
            quantity_required = COALESCE($5, quantity_required),
            unit_of_measurement = COALESCE($6, unit_of_measurement),
            deadline_for_quotes = COALESCE($7, deadline_for_quotes),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(rfq_id)
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.category_id)
    .bind(input.quantity_required)
    .bind(&input.unit_of_measurement)
    .bind(input.deadline_for_quotes)
    .execute(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(rfq_response(&state, rfq_id).await?))
}

/// DELETE /api/v1/rfqs/:id
pub async fn delete_rfq(
    State(state): State<Arc<AppState>>,
    Path(rfq_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    owned_rfq(&state, rfq_id, &user).await?;

    sqlx::query("DELETE FROM rfqs WHERE id = $1")
        .bind(rfq_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    tracing::info!(rfq_id = %rfq_id, user_id = %user.user_id, "RFQ deleted");
    Ok(NoContent)
}

/// GET /api/v1/rfqs/:id/quotes
///
/// The RFQ owner and staff see every quote; a supplier sees only their own.
pub async fn list_rfq_quotes(
    State(state): State<Arc<AppState>>,
    Path(rfq_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let rfq = fetch_rfq(&state, rfq_id).await?;

    let supplier_filter = if user.owns_or_staff(rfq.buyer_id) {
        None
    } else if user.is_supplier() {
        Some(user.user_id)
    } else {
        return Err(ApiError::forbidden(
            "You do not have permission to view quotes for this RFQ",
        ));
    };

    let quotes = sqlx::query_as::<_, Quote>(&format!(
        r#"
        SELECT {} FROM quotes
        WHERE rfq_id = $1 AND ($2::uuid IS NULL OR supplier_id = $2)
        ORDER BY created_at DESC
        "#,
        QUOTE_COLUMNS
    ))
    .bind(rfq_id)
    .bind(supplier_filter)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(quotes))
}

/// POST /api/v1/rfqs/:id/award
pub async fn award_quote(
    State(state): State<Arc<AppState>>,
    Path(rfq_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<AwardQuoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let rfq = owned_rfq(&state, rfq_id, &user).await?;
    let quote_id = input
        .quote_id
        .ok_or_else(|| ApiError::bad_request("quote_id is required."))?;

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;

    let status: RfqStatus = sqlx::query_scalar("SELECT status FROM rfqs WHERE id = $1 FOR UPDATE")
        .bind(rfq_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(ApiError::database)?;
    if status == RfqStatus::Awarded {
        return Err(ApiError::bad_request("This RFQ has already been awarded."));
    }

    let supplier_id: Uuid = sqlx::query_scalar(
        "SELECT supplier_id FROM quotes WHERE id = $1 AND rfq_id = $2 FOR UPDATE",
    )
    .bind(quote_id)
    .bind(rfq_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Quote not found for this RFQ."))?;

    sqlx::query("UPDATE rfqs SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(rfq_id)
        .bind(RfqStatus::Awarded)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::database)?;

    sqlx::query("UPDATE quotes SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(quote_id)
        .bind(QuoteStatus::Accepted)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::database)?;

    tx.commit().await.map_err(ApiError::database)?;

    tracing::info!(rfq_id = %rfq_id, quote_id = %quote_id, "RFQ awarded");
    notifications::notify_rfq_awarded(&state.db, supplier_id, rfq_id, &rfq.title, quote_id).await;

    Ok(DataResponse::new(rfq_response(&state, rfq_id).await?))
}

/// POST /api/v1/rfqs/:id/change-status
pub async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(rfq_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<ChangeStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status: RfqStatus = input.status.parse().map_err(|_| {
        ApiError::bad_request(format!("'{}' is not a valid RFQ status", input.status))
    })?;
    let rfq = owned_rfq(&state, rfq_id, &user).await?;

    sqlx::query("UPDATE rfqs SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(rfq_id)
        .bind(status)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    tracing::info!(rfq_id = %rfq_id, from = %rfq.status, to = %status, "RFQ status changed");

    Ok(DataResponse::new(rfq_response(&state, rfq_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::accounts::UserType;

    fn actor(user_type: UserType, is_staff: bool) -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            username: "viewer".to_string(),
            email: "viewer@example.com".to_string(),
            user_type,
            is_staff,
        }
    }

    #[test]
    fn visibility_by_role() {
        assert_eq!(visibility_clause(None), PUBLICLY_OPEN);
        assert_eq!(visibility_clause(Some(&actor(UserType::Designer, true))), "TRUE");
        assert_eq!(visibility_clause(Some(&actor(UserType::Designer, false))), "FALSE");
        assert!(visibility_clause(Some(&actor(UserType::Buyer, false))).starts_with("(buyer_id = $1"));
        assert!(visibility_clause(Some(&actor(UserType::Manufacturer, false)))
            .contains("q.supplier_id = $1"));
    }
}
