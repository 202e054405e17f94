//! Notification domain types
//!
//! In-app notifications raised by marketplace events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

text_enum! {
    pub enum NotificationType {
        QuoteReceived => "quote_received",
        QuoteAccepted => "quote_accepted",
        QuoteRejected => "quote_rejected",
        RfqAwarded => "rfq_awarded",
        OrderStatusChanged => "order_status_changed",
        PaymentSucceeded => "payment_succeeded",
        PaymentFailed => "payment_failed",
        NewMessage => "new_message",
        ReviewReceived => "review_received",
        System => "system",
    }
}

/// Notification entity
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: Option<String>,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Query params for listing notifications
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: Option<bool>,
    #[serde(default, rename = "type")]
    pub notification_type: Option<NotificationType>,
}

/// Unread count response
#[derive(Debug, Clone, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

/// Mark notifications as read request
#[derive(Debug, Clone, Deserialize)]
pub struct MarkReadRequest {
    #[serde(default)]
    pub notification_ids: Option<Vec<Uuid>>,
}
