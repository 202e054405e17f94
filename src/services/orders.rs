//! Order persistence
//!
//! Order creation and quote conversion write several rows; each runs in a
//! single transaction and recomputes `order_total` from the stored lines
//! before committing.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::accounts::UserType;
use crate::domain::orders::{
    check_status_move, order_total, quote_line, CreateOrderRequest, ItemSource, Order, OrderItem,
    OrderItemInput, OrderParty, OrderResponse, OrderStatus, Quote, QuoteAcceptError, QuoteStatus,
    StatusMoveError,
};
use crate::error::ApiError;

pub const ORDER_COLUMNS: &str = r#"
    id, buyer_id, status, order_total, shipping_address, billing_address,
    payment_intent_id, related_quote_id, created_at, updated_at
"#;

pub const QUOTE_COLUMNS: &str = r#"
    id, rfq_id, supplier_id, buyer_id, price_per_unit, total_price, quantity_offered,
    lead_time_days, valid_until, notes, status, created_at, updated_at
"#;

/// A validated line ready to insert
#[derive(Debug, Clone)]
struct NewLine {
    material_id: Option<Uuid>,
    design_id: Option<Uuid>,
    custom_item_description: Option<String>,
    quantity: i32,
    unit_price: Decimal,
    seller_id: Uuid,
}

pub async fn fetch_order(db: &PgPool, order_id: Uuid) -> Result<Option<Order>, ApiError> {
    sqlx::query_as::<_, Order>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
        .bind(order_id)
        .fetch_optional(db)
        .await
        .map_err(ApiError::database)
}

pub async fn fetch_quote(db: &PgPool, quote_id: Uuid) -> Result<Option<Quote>, ApiError> {
    sqlx::query_as::<_, Quote>(&format!("SELECT {} FROM quotes WHERE id = $1", QUOTE_COLUMNS))
        .bind(quote_id)
        .fetch_optional(db)
        .await
        .map_err(ApiError::database)
}

pub async fn fetch_items<'e, E>(executor: E, order_id: Uuid) -> Result<Vec<OrderItem>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT oi.id, oi.order_id, oi.material_id, oi.design_id, oi.custom_item_description,
               COALESCE(m.name, d.title, oi.custom_item_description) AS item_name,
               oi.quantity, oi.unit_price, oi.seller_id, oi.created_at
        FROM order_items oi
        LEFT JOIN materials m ON m.id = oi.material_id
        LEFT JOIN designs d ON d.id = oi.design_id
        WHERE oi.order_id = $1
        ORDER BY oi.created_at, oi.id
        "#,
    )
    .bind(order_id)
    .fetch_all(executor)
    .await
}

pub async fn order_response(db: &PgPool, order: Order) -> Result<OrderResponse, ApiError> {
    let items = fetch_items(db, order.id)
        .await
        .map_err(ApiError::database)?;
    Ok(OrderResponse {
        order,
        items: items.into_iter().map(Into::into).collect(),
    })
}

/// Distinct sellers across an order's lines
pub async fn seller_ids(db: &PgPool, order_id: Uuid) -> Result<Vec<Uuid>, ApiError> {
    sqlx::query_scalar("SELECT DISTINCT seller_id FROM order_items WHERE order_id = $1")
        .bind(order_id)
        .fetch_all(db)
        .await
        .map_err(ApiError::database)
}

/// Recompute and store the order total from its lines.
async fn recompute_total(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
) -> Result<Decimal, sqlx::Error> {
    let lines: Vec<(i32, Decimal)> =
        sqlx::query_as("SELECT quantity, unit_price FROM order_items WHERE order_id = $1")
            .bind(order_id)
            .fetch_all(&mut **tx)
            .await?;

    let total = order_total(lines);

    sqlx::query("UPDATE orders SET order_total = $2, updated_at = NOW() WHERE id = $1")
        .bind(order_id)
        .bind(total)
        .execute(&mut **tx)
        .await?;

    Ok(total)
}

async fn insert_line(
    tx: &mut Transaction<'_, Postgres>,
    order_id: Uuid,
    line: &NewLine,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO order_items
            (order_id, material_id, design_id, custom_item_description, quantity, unit_price, seller_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(order_id)
    .bind(line.material_id)
    .bind(line.design_id)
    .bind(&line.custom_item_description)
    .bind(line.quantity)
    .bind(line.unit_price)
    .bind(line.seller_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn resolve_line(
    tx: &mut Transaction<'_, Postgres>,
    input: &OrderItemInput,
) -> Result<NewLine, ApiError> {
    let min_price = Decimal::new(1, 2);

    let line = match input.source().map_err(ApiError::bad_request)? {
        ItemSource::Material(id) => {
            let (price, seller_id): (Decimal, Uuid) = sqlx::query_as(
                "SELECT price_per_unit, seller_id FROM materials WHERE id = $1 AND is_active",
            )
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(ApiError::database)?
            .ok_or_else(|| ApiError::bad_request(format!("Material {} is not available.", id)))?;

            NewLine {
                material_id: Some(id),
                design_id: None,
                custom_item_description: None,
                quantity: input.quantity,
                unit_price: input.unit_price.unwrap_or(price),
                seller_id,
            }
        }
        ItemSource::Design(id) => {
            let (price, designer_id): (Option<Decimal>, Uuid) = sqlx::query_as(
                "SELECT price, designer_id FROM designs WHERE id = $1 AND is_active",
            )
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(ApiError::database)?
            .ok_or_else(|| ApiError::bad_request(format!("Design {} is not available.", id)))?;

            let unit_price = input.unit_price.or(price).ok_or_else(|| {
                ApiError::bad_request(format!("Design {} has no price; unit_price is required.", id))
            })?;

            NewLine {
                material_id: None,
                design_id: Some(id),
                custom_item_description: None,
                quantity: input.quantity,
                unit_price,
                seller_id: designer_id,
            }
        }
        ItemSource::Custom {
            description,
            unit_price,
            seller_id,
        } => {
            let seller_type: Option<UserType> =
                sqlx::query_scalar("SELECT user_type FROM profiles WHERE id = $1")
                    .bind(seller_id)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(ApiError::database)?;

            if !seller_type.is_some_and(|t| t.can_sell()) {
                return Err(ApiError::bad_request(
                    "The seller of a custom item must be a supplier or designer.",
                ));
            }

            NewLine {
                material_id: None,
                design_id: None,
                custom_item_description: Some(description),
                quantity: input.quantity,
                unit_price,
                seller_id,
            }
        }
    };

    if line.unit_price < min_price {
        return Err(ApiError::bad_request("unit_price must be at least 0.01"));
    }
    Ok(line)
}

/// Create an order from listing and custom lines.
pub async fn create_order(
    db: &PgPool,
    buyer_id: Uuid,
    req: &CreateOrderRequest,
) -> Result<Order, ApiError> {
    if req.items.is_empty() {
        return Err(ApiError::bad_request("Order must contain at least one item."));
    }

    let mut tx = db.begin().await.map_err(ApiError::database)?;

    let mut lines = Vec::with_capacity(req.items.len());
    for input in &req.items {
        lines.push(resolve_line(&mut tx, input).await?);
    }

    let mut order = sqlx::query_as::<_, Order>(&format!(
        r#"
        INSERT INTO orders (buyer_id, shipping_address, billing_address)
        VALUES ($1, $2, $3)
        RETURNING {}
        "#,
        ORDER_COLUMNS
    ))
    .bind(buyer_id)
    .bind(&req.shipping_address)
    .bind(&req.billing_address)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    for line in &lines {
        insert_line(&mut tx, order.id, line)
            .await
            .map_err(ApiError::database)?;
    }

    order.order_total = recompute_total(&mut tx, order.id)
        .await
        .map_err(ApiError::database)?;

    tx.commit().await.map_err(ApiError::database)?;

    tracing::info!(
        order_id = %order.id,
        buyer_id = %buyer_id,
        items = lines.len(),
        total = %order.order_total,
        "Order created"
    );

    Ok(order)
}

/// Turn an undecided or awarded quote into a single-line order for its buyer. The quote
/// becomes `ordered` and its RFQ, if any, `awarded`.
pub async fn convert_quote(
    db: &PgPool,
    quote_id: Uuid,
    shipping_address: Option<&str>,
    billing_address: Option<&str>,
) -> Result<Order, ApiError> {
    let mut tx = db.begin().await.map_err(ApiError::database)?;

    let quote = sqlx::query_as::<_, Quote>(&format!(
        "SELECT {} FROM quotes WHERE id = $1 FOR UPDATE",
        QUOTE_COLUMNS
    ))
    .bind(quote_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Quote not found"))?;

    // Re-checked under the row lock; a concurrent conversion loses here
    match quote.check_orderable(Utc::now().date_naive()) {
        Ok(()) => {}
        Err(QuoteAcceptError::Expired) => {
            expire_quote(&mut *tx, quote.id)
                .await
                .map_err(ApiError::database)?;
            tx.commit().await.map_err(ApiError::database)?;
            return Err(ApiError::bad_request(QuoteAcceptError::Expired.to_string()));
        }
        Err(e) => return Err(ApiError::bad_request(e.to_string())),
    }

    let rfq_title: Option<String> = match quote.rfq_id {
        Some(rfq_id) => sqlx::query_scalar("SELECT title FROM rfqs WHERE id = $1")
            .bind(rfq_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(ApiError::database)?,
        None => None,
    };

    let quoted = quote_line(&quote, rfq_title.as_deref());

    let mut order = sqlx::query_as::<_, Order>(&format!(
        r#"
        INSERT INTO orders (buyer_id, related_quote_id, shipping_address, billing_address)
        VALUES ($1, $2, $3, $4)
        RETURNING {}
        "#,
        ORDER_COLUMNS
    ))
    .bind(quote.buyer_id)
    .bind(quote.id)
    .bind(shipping_address)
    .bind(billing_address)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    let line = NewLine {
        material_id: None,
        design_id: None,
        custom_item_description: Some(quoted.description),
        quantity: quoted.quantity,
        unit_price: quoted.unit_price,
        seller_id: quoted.seller_id,
    };
    insert_line(&mut tx, order.id, &line)
        .await
        .map_err(ApiError::database)?;

    order.order_total = recompute_total(&mut tx, order.id)
        .await
        .map_err(ApiError::database)?;

    sqlx::query("UPDATE quotes SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(quote.id)
        .bind(QuoteStatus::Ordered)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::database)?;

    if let Some(rfq_id) = quote.rfq_id {
        sqlx::query("UPDATE rfqs SET status = 'awarded', updated_at = NOW() WHERE id = $1")
            .bind(rfq_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::database)?;
    }

    tx.commit().await.map_err(ApiError::database)?;

    tracing::info!(
        order_id = %order.id,
        quote_id = %quote.id,
        total = %order.order_total,
        "Quote converted to order"
    );

    Ok(order)
}

async fn expire_quote<'e, E>(executor: E, quote_id: Uuid) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE quotes SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(quote_id)
        .bind(QuoteStatus::Expired)
        .execute(executor)
        .await?;
    Ok(())
}

/// Move an order to `to`, re-deciding the move against the status locked
/// with `FOR UPDATE` so concurrent moves serialize.
pub async fn change_status(
    db: &PgPool,
    order_id: Uuid,
    party: OrderParty,
    seen: OrderStatus,
    to: OrderStatus,
) -> Result<Order, ApiError> {
    let mut tx = db.begin().await.map_err(ApiError::database)?;

    let current: OrderStatus =
        sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(ApiError::database)?
            .ok_or_else(|| ApiError::not_found("Order not found"))?;

    check_status_move(party, seen, current, to).map_err(|e| match e {
        StatusMoveError::Forbidden { .. } => ApiError::forbidden(e.to_string()),
        StatusMoveError::Stale { .. } => ApiError::conflict(e.to_string()),
    })?;

    let order = sqlx::query_as::<_, Order>(&format!(
        "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        ORDER_COLUMNS
    ))
    .bind(order_id)
    .bind(to)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    tx.commit().await.map_err(ApiError::database)?;
    Ok(order)
}

/// Persist an expired status for a quote whose validity date has passed.
pub async fn mark_quote_expired(db: &PgPool, quote_id: Uuid) -> Result<(), ApiError> {
    expire_quote(db, quote_id).await.map_err(ApiError::database)
}
