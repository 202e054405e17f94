//! Quote routes
//!
//! Suppliers answer RFQs (or address a buyer directly); the buyer accepts
//! one, which converts it into an order.

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
use crate::auth::CurrentUser;
use crate::domain::orders::{
    check_quoted_total, round_money, CreateQuoteRequest, Quote, QuoteAcceptError, QuoteFilter,
    QuoteStatus, UpdateQuoteRequest,
};
use crate::error::ApiError;
use crate::services::notifications;
use crate::services::orders::{self as order_store, QUOTE_COLUMNS};

use super::rfqs;

/// Load a quote the caller takes part in (or any, for staff).
async fn participant_quote(
    state: &AppState,
    quote_id: Uuid,
    user: &CurrentUser,
) -> Result<Quote, ApiError> {
    let quote = order_store::fetch_quote(&state.db, quote_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Quote not found"))?;

    if !user.is_staff && !quote.is_participant(user.user_id) {
        return Err(ApiError::not_found("Quote not found"));
    }
    Ok(quote)
}

/// GET /api/v1/quotes
pub async fn list_quotes(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<QuoteFilter>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let where_clause = r#"
        WHERE ($1 OR supplier_id = $2 OR buyer_id = $2)
          AND ($3::text IS NULL OR status = $3)
          AND ($4::uuid IS NULL OR rfq_id = $4)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM quotes {}", where_clause))
        .bind(user.is_staff)
        .bind(user.user_id)
        .bind(filter.status)
        .bind(filter.rfq_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::database)?;

    let quotes = sqlx::query_as::<_, Quote>(&format!(
        "SELECT {} FROM quotes {} ORDER BY created_at DESC LIMIT $5 OFFSET $6",
        QUOTE_COLUMNS, where_clause
    ))
    .bind(user.is_staff)
    .bind(user.user_id)
    .bind(filter.status)
    .bind(filter.rfq_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(quotes, &pagination, total))
}

/// GET /api/v1/quotes/:id
///
/// The buyer's first look moves a submitted quote to `viewed`.
pub async fn get_quote(
    State(state): State<Arc<AppState>>,
    Path(quote_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let mut quote = participant_quote(&state, quote_id, &user).await?;

    if quote.status == QuoteStatus::Submitted && quote.is_addressed_to(user.user_id) {
        sqlx::query(
            "UPDATE quotes SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3",
        )
        .bind(quote.id)
        .bind(QuoteStatus::Viewed)
        .bind(QuoteStatus::Submitted)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;
        quote.status = QuoteStatus::Viewed;
    }

    Ok(DataResponse::new(quote))
}

/// POST /api/v1/quotes
pub async fn create_quote(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateQuoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.can_quote() {
        return Err(ApiError::forbidden(
            "Only sellers, manufacturers and staff can submit quotes",
        ));
    }
    let total_price = input.resolved_total().map_err(ApiError::bad_request)?;

    let (buyer_id, rfq_title) = match input.rfq_id {
        Some(rfq_id) => {
            let rfq = rfqs::fetch_rfq(&state, rfq_id).await?;
            if !rfq.accepts_quotes(Utc::now()) {
                return Err(ApiError::bad_request(
                    "This RFQ is not accepting quotes.",
                ));
            }
            if rfq.buyer_id == user.user_id {
                return Err(ApiError::bad_request("You cannot quote on your own RFQ."));
            }
            (rfq.buyer_id, Some(rfq.title))
        }
        None => {
            let buyer_id = input
                .buyer_id
                .ok_or_else(|| ApiError::bad_request("buyer_id is required without an RFQ."))?;
            if buyer_id == user.user_id {
                return Err(ApiError::bad_request("You cannot quote yourself."));
            }
            (buyer_id, None)
        }
    };

    let quote = sqlx::query_as::<_, Quote>(&format!(
        r#"
        INSERT INTO quotes (rfq_id, supplier_id, buyer_id, price_per_unit, total_price,
                            quantity_offered, lead_time_days, valid_until, notes, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        QUOTE_COLUMNS
    ))
    .bind(input.rfq_id)
    .bind(user.user_id)
    .bind(buyer_id)
    .bind(input.price_per_unit)
    .bind(total_price)
    .bind(input.quantity())
    .bind(input.lead_time_days)
    .bind(input.valid_until)
    .bind(&input.notes)
    .bind(QuoteStatus::Submitted)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    tracing::info!(
        quote_id = %quote.id,
        supplier_id = %user.user_id,
        buyer_id = %buyer_id,
        total = %total_price,
        "Quote submitted"
    );

    notifications::notify_quote_received(
        &state.db,
        buyer_id,
        quote.id,
        rfq_title.as_deref(),
        &user.username,
        total_price,
    )
    .await;

    Ok(Created(quote))
}

/// PATCH /api/v1/quotes/:id
pub async fn update_quote(
    State(state): State<Arc<AppState>>,
    Path(quote_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<UpdateQuoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let quote = participant_quote(&state, quote_id, &user).await?;
    if quote.supplier_id != user.user_id && !user.is_staff {
        return Err(ApiError::forbidden("Only the supplier can edit this quote"));
    }
    if !quote.is_undecided() {
        return Err(ApiError::bad_request(format!(
            "Quote status is '{}' and can no longer be edited.",
            quote.status
        )));
    }
    check_quoted_total(
        input.total_price.map(round_money).unwrap_or(quote.total_price),
        input.quantity_offered.unwrap_or(quote.quantity_offered),
    )
    .map_err(ApiError::bad_request)?;

    let updated = sqlx::query_as::<_, Quote>(&format!(
        r#"
        UPDATE quotes SET
            price_per_unit = COALESCE($2, price_per_unit),
            total_price = COALESCE($3, total_price),
            quantity_offered = COALESCE($4, quantity_offered),
            lead_time_days = COALESCE($5, lead_time_days),
            valid_until = COALESCE($6, valid_until),
            notes = COALESCE($7, notes),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        QUOTE_COLUMNS
    ))
    .bind(quote.id)
    .bind(input.price_per_unit)
    .bind(input.total_price.map(round_money))
    .bind(input.quantity_offered)
    .bind(input.lead_time_days)
    .bind(input.valid_until)
    .bind(&input.notes)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(updated))
}

/// DELETE /api/v1/quotes/:id
pub async fn delete_quote(
    State(state): State<Arc<AppState>>,
    Path(quote_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let quote = participant_quote(&state, quote_id, &user).await?;
    if quote.supplier_id != user.user_id && !user.is_staff {
        return Err(ApiError::forbidden("Only the supplier can withdraw this quote"));
    }
    if !quote.is_undecided() {
        return Err(ApiError::bad_request(format!(
            "Quote status is '{}' and can no longer be withdrawn.",
            quote.status
        )));
    }

    sqlx::query("DELETE FROM quotes WHERE id = $1")
        .bind(quote.id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    tracing::info!(quote_id = %quote.id, "Quote withdrawn");
    Ok(NoContent)
}

/// POST /api/v1/quotes/:id/accept
///
/// Converts the quote into a pending-payment order for the buyer.
pub async fn accept_quote(
    State(state): State<Arc<AppState>>,
    Path(quote_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let quote = participant_quote(&state, quote_id, &user).await?;
    if !quote.is_addressed_to(user.user_id) {
        return Err(ApiError::forbidden("Only the buyer can accept this quote"));
    }

    match quote.check_acceptable(Utc::now().date_naive()) {
        Ok(()) => {}
        Err(QuoteAcceptError::Expired) => {
            order_store::mark_quote_expired(&state.db, quote.id).await?;
            return Err(ApiError::bad_request(QuoteAcceptError::Expired.to_string()));
        }
        Err(e) => return Err(ApiError::bad_request(e.to_string())),
    }

    let order = order_store::convert_quote(&state.db, quote.id, None, None).await?;
    notifications::notify_quote_accepted(&state.db, quote.supplier_id, quote.id, order.id).await;

    Ok(Created(order_store::order_response(&state.db, order).await?))
}

/// POST /api/v1/quotes/:id/reject
pub async fn reject_quote(
    State(state): State<Arc<AppState>>,
    Path(quote_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let quote = participant_quote(&state, quote_id, &user).await?;
    if !quote.is_addressed_to(user.user_id) {
        return Err(ApiError::forbidden("Only the buyer can reject this quote"));
    }
    if !quote.is_undecided() {
        return Err(ApiError::bad_request(format!(
            "Quote status is '{}' and cannot be rejected.",
            quote.status
        )));
    }

    let updated = sqlx::query_as::<_, Quote>(&format!(
        "UPDATE quotes SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        QUOTE_COLUMNS
    ))
    .bind(quote.id)
    .bind(QuoteStatus::Rejected)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    tracing::info!(quote_id = %quote.id, buyer_id = %user.user_id, "Quote rejected");
    notifications::notify_quote_rejected(&state.db, quote.supplier_id, quote.id).await;

    Ok(DataResponse::new(updated))
}
