//! Subscription billing and payment ledger types
//!
//! Local rows mirror what Stripe reports; the Stripe wire shapes used by the
//! client and the webhook receiver are declared at the bottom of the module.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

text_enum! {
    pub enum BillingInterval {
        Day => "day",
        Week => "week",
        Month => "month",
        Year => "year",
    }
}

text_enum! {
    pub enum SubscriptionStatus {
        Active => "active",
        Inactive => "inactive",
        PastDue => "past_due",
        Cancelled => "cancelled",
        Trialing => "trialing",
        Incomplete => "incomplete",
        IncompleteExpired => "incomplete_expired",
        Unpaid => "unpaid",
    }
}

text_enum! {
    pub enum TransactionType {
        SubscriptionPayment => "subscription_payment",
        OrderPayment => "order_payment",
        PlatformFee => "platform_fee",
        Payout => "payout",
        Refund => "refund",
        VasPayment => "vas_payment",
        Other => "other",
    }
}

text_enum! {
    pub enum TransactionStatus {
        Pending => "pending",
        Succeeded => "succeeded",
        Failed => "failed",
        Refunded => "refunded",
        Disputed => "disputed",
    }
}

impl SubscriptionStatus {
    /// Map Stripe's subscription status vocabulary onto ours.
    pub fn from_stripe(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" => Self::PastDue,
            "canceled" | "cancelled" => Self::Cancelled,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "unpaid" => Self::Unpaid,
            _ => Self::Inactive,
        }
    }

    /// A user holding one of these may not start another subscription.
    pub fn blocks_new_subscription(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing | Self::PastDue)
    }
}

/// Stripe amounts are integer minor units.
pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

pub fn decimal_to_cents(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED).round().to_i64()
}

pub fn from_unix(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

// ============================================================================
// Plans
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub billing_interval: BillingInterval,
    pub interval_count: i32,
    pub stripe_price_id: Option<String>,
    pub features: serde_json::Value,
    pub is_active: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionPlan {
    /// Feature flags are stored as a JSON object; a key is enabled when its
    /// value is `true`, a non-zero number or a non-empty string.
    pub fn has_feature(&self, key: &str) -> bool {
        match self.features.get(key) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(serde_json::Value::Array(a)) => !a.is_empty(),
            Some(serde_json::Value::Object(o)) => !o.is_empty(),
            Some(serde_json::Value::Null) | None => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub billing_interval: Option<BillingInterval>,
    #[serde(default)]
    pub interval_count: Option<i32>,
    #[serde(default)]
    pub stripe_price_id: Option<String>,
    #[serde(default)]
    pub features: Option<serde_json::Value>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub billing_interval: Option<BillingInterval>,
    pub interval_count: Option<i32>,
    pub stripe_price_id: Option<String>,
    pub features: Option<serde_json::Value>,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
}

/// Plan features must be a JSON object of flags.
pub fn validate_features(features: &serde_json::Value) -> Result<(), String> {
    if features.is_object() {
        Ok(())
    } else {
        Err("features must be a JSON object".to_string())
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSubscription {
    pub fn is_active_or_trialing(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        ) && self.current_period_end.map_or(true, |end| end >= now)
    }

    /// Feature access requires a live subscription on a plan granting the key.
    pub fn has_feature(
        &self,
        plan: Option<&SubscriptionPlan>,
        key: &str,
        now: DateTime<Utc>,
    ) -> bool {
        self.is_active_or_trialing(now) && plan.is_some_and(|p| p.has_feature(key))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    #[serde(flatten)]
    pub subscription: UserSubscription,
    pub plan: Option<SubscriptionPlan>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub plan_id: Uuid,
    #[serde(default)]
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelSubscriptionRequest {
    #[serde(default)]
    pub at_period_end: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionCreated {
    pub subscription_id: Uuid,
    pub stripe_subscription_id: String,
    pub status: SubscriptionStatus,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureQuery {
    pub feature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureAccess {
    pub feature: String,
    pub has_access: bool,
}

// ============================================================================
// Transaction ledger
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TransactionLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub payment_gateway: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub gateway_charge_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub related_order_id: Option<Uuid>,
    pub related_subscription_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    /// Honoured for staff only
    pub user_id: Option<Uuid>,
    pub transaction_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
}

/// Ledger row to insert
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub gateway_charge_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub related_order_id: Option<Uuid>,
    pub related_subscription_id: Option<Uuid>,
}

// ============================================================================
// Stripe wire types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub amount_received: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<serde_json::Value>,
}

impl StripePaymentIntent {
    pub fn order_id(&self) -> Option<Uuid> {
        self.metadata.get("order_id")?.parse().ok()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.metadata.get("user_id")?.parse().ok()
    }

    pub fn failure_message(&self) -> Option<String> {
        self.last_payment_error
            .as_ref()?
            .get("message")?
            .as_str()
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePeriod {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoiceLine {
    #[serde(default)]
    pub period: Option<StripePeriod>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

/// `latest_invoice` is an id unless expanded.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Object(Box<T>),
    Id(String),
}

impl<T> Expandable<T> {
    pub fn as_object(&self) -> Option<&T> {
        match self {
            Self::Object(obj) => Some(obj),
            Self::Id(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub charge: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<Expandable<StripePaymentIntent>>,
    #[serde(default)]
    pub lines: StripeList<StripeInvoiceLine>,
}

impl StripeInvoice {
    /// Billing period of the first line item
    pub fn period(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let period = self.lines.data.first()?.period.as_ref()?;
        Some((from_unix(period.start)?, from_unix(period.end)?))
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        match self.payment_intent.as_ref()? {
            Expandable::Object(pi) => Some(pi.id.as_str()),
            Expandable::Id(id) => Some(id.as_str()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    pub price: StripePrice,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub canceled_at: Option<i64>,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub trial_start: Option<i64>,
    #[serde(default)]
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub items: StripeList<StripeSubscriptionItem>,
    #[serde(default)]
    pub latest_invoice: Option<Expandable<StripeInvoice>>,
}

impl StripeSubscription {
    pub fn price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }

    /// Client secret of the first invoice's payment intent, when expanded.
    pub fn client_secret(&self) -> Option<String> {
        self.latest_invoice
            .as_ref()?
            .as_object()?
            .payment_intent
            .as_ref()?
            .as_object()?
            .client_secret
            .clone()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Envelope of a webhook delivery
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

/// Webhook events this service reconciles
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    InvoicePaid(StripeInvoice),
    InvoicePaymentFailed(StripeInvoice),
    PaymentIntentSucceeded(StripePaymentIntent),
    PaymentIntentFailed(StripePaymentIntent),
    SubscriptionUpdated(StripeSubscription),
    SubscriptionDeleted(StripeSubscription),
    Unhandled(String),
}

impl StripeEvent {
    pub fn into_webhook_event(self) -> Result<WebhookEvent, serde_json::Error> {
        let object = self.data.object;
        Ok(match self.event_type.as_str() {
            "invoice.paid" => WebhookEvent::InvoicePaid(serde_json::from_value(object)?),
            "invoice.payment_failed" => {
                WebhookEvent::InvoicePaymentFailed(serde_json::from_value(object)?)
            }
            "payment_intent.succeeded" => {
                WebhookEvent::PaymentIntentSucceeded(serde_json::from_value(object)?)
            }
            "payment_intent.payment_failed" => {
                WebhookEvent::PaymentIntentFailed(serde_json::from_value(object)?)
            }
            "customer.subscription.updated" => {
                WebhookEvent::SubscriptionUpdated(serde_json::from_value(object)?)
            }
            "customer.subscription.deleted" => {
                WebhookEvent::SubscriptionDeleted(serde_json::from_value(object)?)
            }
            _ => WebhookEvent::Unhandled(self.event_type),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn subscription(status: SubscriptionStatus, period_end: Option<DateTime<Utc>>) -> UserSubscription {
        let now = Utc::now();
        UserSubscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id: None,
            status,
            start_date: now,
            current_period_start: None,
            current_period_end: period_end,
            cancel_at_period_end: false,
            cancelled_at: None,
            trial_start: None,
            trial_end: None,
            stripe_subscription_id: None,
            stripe_customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn plan(features: serde_json::Value) -> SubscriptionPlan {
        let now = Utc::now();
        SubscriptionPlan {
            id: Uuid::new_v4(),
            name: "Pro".to_string(),
            description: None,
            price: Decimal::new(4900, 2),
            currency: "USD".to_string(),
            billing_interval: BillingInterval::Month,
            interval_count: 1,
            stripe_price_id: Some("price_123".to_string()),
            features,
            is_active: true,
            display_order: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn active_or_trialing_respects_period_end() {
        let now = Utc::now();
        assert!(subscription(SubscriptionStatus::Active, Some(now + Duration::days(5)))
            .is_active_or_trialing(now));
        assert!(subscription(SubscriptionStatus::Trialing, None).is_active_or_trialing(now));
        assert!(!subscription(SubscriptionStatus::Active, Some(now - Duration::days(1)))
            .is_active_or_trialing(now));
        assert!(!subscription(SubscriptionStatus::PastDue, Some(now + Duration::days(5)))
            .is_active_or_trialing(now));
    }

    #[test]
    fn feature_flags() {
        let now = Utc::now();
        let p = plan(serde_json::json!({
            "featured_listings": true,
            "analytics": false,
            "max_rfqs": 50,
            "support": ""
        }));
        assert!(p.has_feature("featured_listings"));
        assert!(!p.has_feature("analytics"));
        assert!(p.has_feature("max_rfqs"));
        assert!(!p.has_feature("support"));
        assert!(!p.has_feature("missing"));

        let live = subscription(SubscriptionStatus::Active, Some(now + Duration::days(1)));
        assert!(live.has_feature(Some(&p), "featured_listings", now));
        assert!(!live.has_feature(None, "featured_listings", now));

        let lapsed = subscription(SubscriptionStatus::Cancelled, None);
        assert!(!lapsed.has_feature(Some(&p), "featured_listings", now));
    }

    #[test]
    fn stripe_status_mapping() {
        assert_eq!(SubscriptionStatus::from_stripe("canceled"), SubscriptionStatus::Cancelled);
        assert_eq!(SubscriptionStatus::from_stripe("past_due"), SubscriptionStatus::PastDue);
        assert_eq!(SubscriptionStatus::from_stripe("paused"), SubscriptionStatus::Inactive);
        assert!(SubscriptionStatus::PastDue.blocks_new_subscription());
        assert!(!SubscriptionStatus::Incomplete.blocks_new_subscription());
    }

    #[test]
    fn money_conversion() {
        assert_eq!(cents_to_decimal(12345), Decimal::new(12345, 2));
        assert_eq!(decimal_to_cents(Decimal::new(1999, 2)), Some(1999));
        assert_eq!(decimal_to_cents(Decimal::new(5, 0)), Some(500));
    }

    #[test]
    fn parses_invoice_paid_event() {
        let event: StripeEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "invoice.paid",
            "data": { "object": {
                "id": "in_1",
                "subscription": "sub_1",
                "customer": "cus_1",
                "amount_paid": 4900,
                "currency": "usd",
                "charge": "ch_1",
                "payment_intent": "pi_1",
                "lines": { "data": [ { "period": { "start": 1735689600, "end": 1738368000 } } ] }
            }}
        }))
        .unwrap();

        let WebhookEvent::InvoicePaid(invoice) = event.into_webhook_event().unwrap() else {
            panic!("expected invoice.paid");
        };
        assert_eq!(invoice.subscription.as_deref(), Some("sub_1"));
        assert_eq!(cents_to_decimal(invoice.amount_paid), Decimal::new(4900, 2));
        assert_eq!(invoice.payment_intent_id(), Some("pi_1"));
        let (start, end) = invoice.period().unwrap();
        assert!(start < end);
    }

    #[test]
    fn parses_payment_intent_metadata() {
        let order_id = Uuid::new_v4();
        let event: StripeEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_2",
            "type": "payment_intent.payment_failed",
            "data": { "object": {
                "id": "pi_9",
                "amount": 2500,
                "currency": "usd",
                "status": "requires_payment_method",
                "metadata": { "order_id": order_id.to_string() },
                "last_payment_error": { "message": "Your card was declined." }
            }}
        }))
        .unwrap();

        let WebhookEvent::PaymentIntentFailed(pi) = event.into_webhook_event().unwrap() else {
            panic!("expected payment_intent.payment_failed");
        };
        assert_eq!(pi.order_id(), Some(order_id));
        assert_eq!(pi.user_id(), None);
        assert_eq!(pi.failure_message().as_deref(), Some("Your card was declined."));
    }

    #[test]
    fn unknown_events_are_unhandled() {
        let event: StripeEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_3",
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1" } }
        }))
        .unwrap();
        assert!(matches!(
            event.into_webhook_event().unwrap(),
            WebhookEvent::Unhandled(t) if t == "charge.refunded"
        ));
    }

    #[test]
    fn subscription_with_expanded_invoice() {
        let sub: StripeSubscription = serde_json::from_value(serde_json::json!({
            "id": "sub_1",
            "status": "incomplete",
            "items": { "data": [ { "price": { "id": "price_123" } } ] },
            "latest_invoice": {
                "id": "in_1",
                "payment_intent": { "id": "pi_1", "client_secret": "pi_1_secret_abc" }
            }
        }))
        .unwrap();
        assert_eq!(sub.price_id(), Some("price_123"));
        assert_eq!(sub.client_secret().as_deref(), Some("pi_1_secret_abc"));

        let sub: StripeSubscription = serde_json::from_value(serde_json::json!({
            "id": "sub_2",
            "status": "active",
            "latest_invoice": "in_2"
        }))
        .unwrap();
        assert_eq!(sub.client_secret(), None);
    }
}
