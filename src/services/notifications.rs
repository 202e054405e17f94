//! Notification service
//!
//! Routes call the `notify_*` helpers when marketplace events happen. They
//! are fire-and-forget: a failed insert is logged and never fails the request
//! that triggered it.

use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::notifications::NotificationType;
use crate::domain::orders::OrderStatus;

/// Create a notification for a user
pub async fn create_notification(
    db: &PgPool,
    user_id: Uuid,
    notification_type: NotificationType,
    title: &str,
    message: Option<&str>,
    data: serde_json::Value,
) -> Result<Uuid, sqlx::Error> {
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO notifications (user_id, type, title, message, data)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(notification_type)
    .bind(title)
    .bind(message)
    .bind(&data)
    .fetch_one(db)
    .await?;

    tracing::info!(
        user_id = %user_id,
        notification_type = %notification_type,
        notification_id = %id,
        "Notification created"
    );

    Ok(id)
}

async fn send(
    db: &PgPool,
    user_id: Uuid,
    notification_type: NotificationType,
    title: &str,
    message: &str,
    data: serde_json::Value,
) {
    if let Err(e) =
        create_notification(db, user_id, notification_type, title, Some(message), data).await
    {
        tracing::warn!(
            user_id = %user_id,
            notification_type = %notification_type,
            error = %e,
            "Failed to create notification"
        );
    }
}

/// Tell a buyer a supplier has quoted
pub async fn notify_quote_received(
    db: &PgPool,
    buyer_id: Uuid,
    quote_id: Uuid,
    rfq_title: Option<&str>,
    supplier_username: &str,
    total_price: Decimal,
) {
    let subject = rfq_title.unwrap_or("your request");
    send(
        db,
        buyer_id,
        NotificationType::QuoteReceived,
        &format!("New quote for {}", subject),
        &format!("{} quoted {} in total", supplier_username, total_price),
        json!({ "quote_id": quote_id, "total_price": total_price }),
    )
    .await
}

pub async fn notify_quote_accepted(db: &PgPool, supplier_id: Uuid, quote_id: Uuid, order_id: Uuid) {
    send(
        db,
        supplier_id,
        NotificationType::QuoteAccepted,
        "Your quote was accepted",
        "The buyer accepted your quote and an order has been created.",
        json!({ "quote_id": quote_id, "order_id": order_id }),
    )
    .await
}

pub async fn notify_quote_rejected(db: &PgPool, supplier_id: Uuid, quote_id: Uuid) {
    send(
        db,
        supplier_id,
        NotificationType::QuoteRejected,
        "Quote not selected",
        "The buyer declined your quote.",
        json!({ "quote_id": quote_id }),
    )
    .await
}

pub async fn notify_rfq_awarded(
    db: &PgPool,
    supplier_id: Uuid,
    rfq_id: Uuid,
    rfq_title: &str,
    quote_id: Uuid,
) {
    send(
        db,
        supplier_id,
        NotificationType::RfqAwarded,
        "You won an RFQ",
        &format!("Your quote for '{}' was selected.", rfq_title),
        json!({ "rfq_id": rfq_id, "quote_id": quote_id }),
    )
    .await
}

/// Tell each party (other than whoever made the change) about a status move.
pub async fn notify_order_status_changed(
    db: &PgPool,
    recipients: &[Uuid],
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
) {
    for user_id in recipients {
        send(
            db,
            *user_id,
            NotificationType::OrderStatusChanged,
            "Order status updated",
            &format!("Order {} moved from {} to {}.", order_id, from, to),
            json!({ "order_id": order_id, "from": from, "to": to }),
        )
        .await
    }
}

pub async fn notify_payment(db: &PgPool, user_id: Uuid, order_id: Uuid, succeeded: bool) {
    let (kind, title, message) = if succeeded {
        (
            NotificationType::PaymentSucceeded,
            "Payment received",
            "Your payment went through and the order is being processed.",
        )
    } else {
        (
            NotificationType::PaymentFailed,
            "Payment failed",
            "Your payment could not be completed. Please try another payment method.",
        )
    };
    send(db, user_id, kind, title, message, json!({ "order_id": order_id })).await
}

pub async fn notify_new_message(
    db: &PgPool,
    recipients: &[Uuid],
    thread_id: Uuid,
    sender_username: &str,
) {
    for user_id in recipients {
        send(
            db,
            *user_id,
            NotificationType::NewMessage,
            "New message",
            &format!("{} sent you a message.", sender_username),
            json!({ "thread_id": thread_id }),
        )
        .await
    }
}

pub async fn notify_review_received(
    db: &PgPool,
    owner_id: Uuid,
    review_id: Uuid,
    author_username: &str,
    rating: i16,
) {
    send(
        db,
        owner_id,
        NotificationType::ReviewReceived,
        "New review",
        &format!("{} left a {}-star review.", author_username, rating),
        json!({ "review_id": review_id, "rating": rating }),
    )
    .await
}
