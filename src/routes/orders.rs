//! Order routes
//!
//! Orders come from a cart of listing/custom lines or from an accepted
//! quote. Status moves are gated by `can_transition` for the caller's party.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{CurrentUser, RequireStaff};
use crate::domain::orders::{
    CreateOrderRequest, InitiatePaymentRequest, Order, OrderFilter, OrderParty, OrderStatus,
    PaymentInitiation, UpdateOrderRequest, UpdateOrderStatusRequest,
};
use crate::domain::payments::decimal_to_cents;
use crate::error::ApiError;
use crate::services::orders::{self as order_store, ORDER_COLUMNS};
use crate::services::{billing, notifications};

/// Load an order the caller is party to, with the distinct sellers on it.
async fn party_order(
    state: &AppState,
    order_id: Uuid,
    user: &CurrentUser,
) -> Result<(Order, Vec<Uuid>, OrderParty), ApiError> {
    let order = order_store::fetch_order(&state.db, order_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;
    let sellers = order_store::seller_ids(&state.db, order_id).await?;

    let party = OrderParty::resolve(&user.actor, order.buyer_id, sellers.contains(&user.user_id));
    if party == OrderParty::Outsider {
        return Err(ApiError::not_found("Order not found"));
    }
    Ok((order, sellers, party))
}

/// GET /api/v1/orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<OrderFilter>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let where_clause = r#"
        WHERE ($1 OR buyer_id = $2
               OR EXISTS (SELECT 1 FROM order_items oi WHERE oi.order_id = orders.id AND oi.seller_id = $2))
          AND ($3::text IS NULL OR status = $3)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders {}", where_clause))
        .bind(user.is_staff)
        .bind(user.user_id)
        .bind(filter.status)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::database)?;

    let orders = sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders {} ORDER BY created_at DESC LIMIT $4 OFFSET $5",
        ORDER_COLUMNS, where_clause
    ))
    .bind(user.is_staff)
    .bind(user.user_id)
    .bind(filter.status)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    let responses = try_join_all(
        orders
            .into_iter()
            .map(|order| order_store::order_response(&state.db, order)),
    )
    .await?;

    Ok(Paginated::new(responses, &pagination, total))
}

/// GET /api/v1/orders/:id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let (order, _, _) = party_order(&state, order_id, &user).await?;
    Ok(DataResponse::new(
        order_store::order_response(&state.db, order).await?,
    ))
}

/// POST /api/v1/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.can_place_orders() {
        return Err(ApiError::forbidden("Only buyers can place orders"));
    }

    let order = match input.related_quote_id {
        Some(quote_id) => {
            if !input.items.is_empty() {
                return Err(ApiError::bad_request(
                    "An order created from a quote cannot also list items.",
                ));
            }
            let quote = order_store::fetch_quote(&state.db, quote_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Quote not found"))?;
            if !quote.is_addressed_to(user.user_id) && !user.is_staff {
                return Err(ApiError::forbidden(
                    "Only the buyer of the quote can order it",
                ));
            }
            let order = order_store::convert_quote(
                &state.db,
                quote_id,
                input.shipping_address.as_deref(),
                input.billing_address.as_deref(),
            )
            .await?;
            notifications::notify_quote_accepted(&state.db, quote.supplier_id, quote.id, order.id)
                .await;
            order
        }
        None => order_store::create_order(&state.db, user.user_id, &input).await?,
    };

    Ok(Created(order_store::order_response(&state.db, order).await?))
}

/// PATCH /api/v1/orders/:id
///
/// Buyers may change addresses only.
pub async fn update_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<UpdateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (order, _, party) = party_order(&state, order_id, &user).await?;
    if party != OrderParty::Buyer {
        return Err(ApiError::forbidden("Only the buyer can update order addresses"));
    }

    let updated = sqlx::query_as::<_, Order>(&format!(
        r#"
        UPDATE orders SET
            shipping_address = COALESCE($2, shipping_address),
            billing_address = COALESCE($3, billing_address),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        ORDER_COLUMNS
    ))
    .bind(order.id)
    .bind(&input.shipping_address)
    .bind(&input.billing_address)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(
        order_store::order_response(&state.db, updated).await?,
    ))
}

/// DELETE /api/v1/orders/:id
pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    staff: RequireStaff,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(order_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Order not found"));
    }

    tracing::info!(order_id = %order_id, staff_id = %staff.user_id, "Order deleted");
    Ok(NoContent)
}

/// GET /api/v1/orders/:id/items
pub async fn list_order_items(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let (order, _, _) = party_order(&state, order_id, &user).await?;
    let response = order_store::order_response(&state.db, order).await?;
    Ok(DataResponse::new(response.items))
}

/// POST /api/v1/orders/:id/update-status
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let to: OrderStatus = input.status.parse().map_err(|_| {
        ApiError::bad_request(format!("'{}' is not a valid order status", input.status))
    })?;
    let (order, sellers, party) = party_order(&state, order_id, &user).await?;
    let from = order.status;

    let updated = order_store::change_status(&state.db, order.id, party, from, to).await?;

    tracing::info!(
        order_id = %order.id,
        user_id = %user.user_id,
        from = %from,
        to = %to,
        "Order status changed"
    );

    let mut recipients: Vec<Uuid> = sellers;
    recipients.push(order.buyer_id);
    recipients.sort();
    recipients.dedup();
    recipients.retain(|id| *id != user.user_id);
    notifications::notify_order_status_changed(&state.db, &recipients, order.id, from, to).await;

    Ok(DataResponse::new(
        order_store::order_response(&state.db, updated).await?,
    ))
}

/// POST /api/v1/orders/:id/initiate-payment
///
/// Creates a Stripe payment intent for the order total and hands the client
/// secret back to the buyer's browser.
pub async fn initiate_payment(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    user: CurrentUser,
    input: Option<Json<InitiatePaymentRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let input = input.map(|Json(body)| body).unwrap_or_default();
    let (order, _, party) = party_order(&state, order_id, &user).await?;
    if !matches!(party, OrderParty::Buyer | OrderParty::Staff) {
        return Err(ApiError::forbidden("Only the buyer can pay for this order"));
    }
    if order.status != OrderStatus::PendingPayment {
        return Err(ApiError::bad_request(format!(
            "Order status is '{}'; payment can only be initiated while pending payment.",
            order.status
        )));
    }
    if order.order_total <= Decimal::ZERO {
        return Err(ApiError::bad_request("Order total must be greater than zero."));
    }
    let amount_cents = decimal_to_cents(order.order_total)
        .ok_or_else(|| ApiError::bad_request("Order total is out of range."))?;

    let customer_id = billing::ensure_customer(&state.db, &state.stripe, order.buyer_id).await?;

    let intent = state
        .stripe
        .create_payment_intent(
            amount_cents,
            &state.settings.default_currency,
            &customer_id,
            order.id,
            order.buyer_id,
            input.payment_method_id.as_deref(),
        )
        .await?;

    sqlx::query("UPDATE orders SET payment_intent_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(order.id)
        .bind(&intent.id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    tracing::info!(
        order_id = %order.id,
        payment_intent_id = %intent.id,
        amount_cents = amount_cents,
        "Payment intent created"
    );

    Ok(DataResponse::new(PaymentInitiation {
        order_id: order.id,
        payment_intent_id: intent.id,
        client_secret: intent.client_secret,
        status: intent.status,
    }))
}
