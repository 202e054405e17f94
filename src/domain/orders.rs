//! RFQ, quote and order domain types
//!
//! Buyers publish RFQs, suppliers answer with quotes, and an accepted quote
//! (or a cart of listings) becomes an order. The rules deciding who may move
//! a quote or an order between states live here so routes stay thin.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::accounts::Actor;

text_enum! {
    pub enum RfqStatus {
        Pending => "pending",
        Open => "open",
        Closed => "closed",
        Awarded => "awarded",
        Cancelled => "cancelled",
    }
}

text_enum! {
    pub enum QuoteStatus {
        Submitted => "submitted",
        Viewed => "viewed",
        Accepted => "accepted",
        Rejected => "rejected",
        Expired => "expired",
        Ordered => "ordered",
    }
}

text_enum! {
    pub enum OrderStatus {
        PendingPayment => "pending_payment",
        PaymentFailed => "payment_failed",
        Processing => "processing",
        Shipped => "shipped",
        Delivered => "delivered",
        Completed => "completed",
        CancelledByBuyer => "cancelled_by_buyer",
        CancelledBySeller => "cancelled_by_seller",
        Refunded => "refunded",
        Disputed => "disputed",
    }
}

/// Round to cents, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// ============================================================================
// RFQs
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Rfq {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub quantity_required: i32,
    pub unit_of_measurement: Option<String>,
    pub deadline_for_quotes: Option<DateTime<Utc>>,
    pub status: RfqStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rfq {
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.deadline_for_quotes.is_some_and(|d| d < now)
    }

    /// Open to anyone browsing: status open and the deadline still ahead.
    pub fn is_publicly_open(&self, now: DateTime<Utc>) -> bool {
        self.status == RfqStatus::Open && !self.deadline_passed(now)
    }

    /// Suppliers may quote while the RFQ is pending or open and before the deadline.
    pub fn accepts_quotes(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, RfqStatus::Pending | RfqStatus::Open) && !self.deadline_passed(now)
    }
}

/// Whether `viewer` may see `rfq`. `has_quoted` is true when the viewer has
/// submitted a quote against it.
pub fn rfq_visible_to(
    rfq: &Rfq,
    viewer: Option<&Actor>,
    has_quoted: bool,
    now: DateTime<Utc>,
) -> bool {
    let Some(actor) = viewer else {
        return rfq.is_publicly_open(now);
    };

    if actor.is_staff {
        return true;
    }
    if actor.is_buyer() {
        return rfq.buyer_id == actor.user_id || rfq.is_publicly_open(now);
    }
    if actor.is_supplier() {
        return rfq.is_publicly_open(now) || has_quoted;
    }
    false
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRfqRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub quantity_required: i32,
    #[serde(default)]
    pub unit_of_measurement: Option<String>,
    #[serde(default)]
    pub deadline_for_quotes: Option<DateTime<Utc>>,
}

impl CreateRfqRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("description is required".to_string());
        }
        if self.quantity_required < 1 {
            return Err("quantity_required must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRfqRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub quantity_required: Option<i32>,
    pub unit_of_measurement: Option<String>,
    pub deadline_for_quotes: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RfqFilter {
    pub status: Option<RfqStatus>,
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwardQuoteRequest {
    #[serde(default)]
    pub quote_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RfqResponse {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub rfq: Rfq,
    pub buyer_username: String,
    pub quote_count: i64,
}

// ============================================================================
// Quotes
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Quote {
    pub id: Uuid,
    pub rfq_id: Option<Uuid>,
    pub supplier_id: Uuid,
    pub buyer_id: Uuid,
    pub price_per_unit: Option<Decimal>,
    pub total_price: Decimal,
    pub quantity_offered: i32,
    pub lead_time_days: Option<i32>,
    pub valid_until: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a quote cannot be accepted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteAcceptError {
    #[error("Quote status is '{0}' and cannot be accepted again.")]
    Finalized(QuoteStatus),

    #[error("Cannot create order from quote with status '{0}'.")]
    NotOrderable(QuoteStatus),

    #[error("This quote has expired.")]
    Expired,
}

impl Quote {
    /// Supplier edits and buyer rejections are limited to undecided quotes.
    pub fn is_undecided(&self) -> bool {
        matches!(self.status, QuoteStatus::Submitted | QuoteStatus::Viewed)
    }

    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.valid_until.is_some_and(|d| d < today)
    }

    /// Check whether the buyer may accept this quote today. `Expired` means
    /// the caller should persist the expired status before rejecting.
    pub fn check_acceptable(&self, today: NaiveDate) -> Result<(), QuoteAcceptError> {
        match self.status {
            QuoteStatus::Accepted
            | QuoteStatus::Ordered
            | QuoteStatus::Rejected
            | QuoteStatus::Expired => Err(QuoteAcceptError::Finalized(self.status)),
            _ if self.is_expired_on(today) => Err(QuoteAcceptError::Expired),
            _ => Ok(()),
        }
    }

    /// Check whether the quote can become an order today. Unlike
    /// [`Quote::check_acceptable`], an awarded (`accepted`) quote passes.
    pub fn check_orderable(&self, today: NaiveDate) -> Result<(), QuoteAcceptError> {
        match self.status {
            QuoteStatus::Ordered | QuoteStatus::Rejected | QuoteStatus::Expired => {
                Err(QuoteAcceptError::NotOrderable(self.status))
            }
            _ if self.is_expired_on(today) => Err(QuoteAcceptError::Expired),
            _ => Ok(()),
        }
    }

    /// Buyer of record: the RFQ owner for RFQ quotes, otherwise the addressed buyer.
    pub fn is_addressed_to(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.supplier_id == user_id
    }
}

/// Total of a quote when the supplier only gave a unit price.
pub fn default_total_price(price_per_unit: Decimal, quantity: i32) -> Decimal {
    round_money(price_per_unit * Decimal::from(quantity))
}

/// Smallest unit price an order line may carry
pub const MIN_UNIT_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// A quote must split into a unit price of at least one cent, or it could
/// never be ordered.
pub fn check_quoted_total(total: Decimal, quantity: i32) -> Result<(), String> {
    if quantity < 1 {
        return Err("quantity_offered must be at least 1".to_string());
    }
    if total.is_sign_negative() {
        return Err("total_price cannot be negative".to_string());
    }
    if round_money(total / Decimal::from(quantity)) < MIN_UNIT_PRICE {
        return Err(format!(
            "total_price must come to at least {} per unit",
            MIN_UNIT_PRICE
        ));
    }
    Ok(())
}

/// The single order line produced when a quote is converted to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteLine {
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub seller_id: Uuid,
}

pub fn quote_line(quote: &Quote, rfq_title: Option<&str>) -> QuoteLine {
    let label = rfq_title
        .or(quote.notes.as_deref().filter(|n| !n.is_empty()))
        .unwrap_or("Quoted Item");
    let quantity = quote.quantity_offered.max(1);

    QuoteLine {
        description: format!("From Quote {}: {}", quote.id, label),
        quantity,
        unit_price: round_money(quote.total_price / Decimal::from(quantity)),
        seller_id: quote.supplier_id,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuoteRequest {
    #[serde(default)]
    pub rfq_id: Option<Uuid>,
    /// Required for direct quotes without an RFQ
    #[serde(default)]
    pub buyer_id: Option<Uuid>,
    #[serde(default)]
    pub price_per_unit: Option<Decimal>,
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub quantity_offered: Option<i32>,
    #[serde(default)]
    pub lead_time_days: Option<i32>,
    pub valid_until: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateQuoteRequest {
    pub fn quantity(&self) -> i32 {
        self.quantity_offered.unwrap_or(1)
    }

    /// Resolve the quoted total, deriving it from the unit price when absent.
    pub fn resolved_total(&self) -> Result<Decimal, String> {
        if self.quantity() < 1 {
            return Err("quantity_offered must be at least 1".to_string());
        }
        let total = match (self.total_price, self.price_per_unit) {
            (Some(total), _) => round_money(total),
            (None, Some(unit)) => default_total_price(unit, self.quantity()),
            (None, None) => return Err("price_per_unit or total_price is required".to_string()),
        };
        check_quoted_total(total, self.quantity())?;
        Ok(total)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateQuoteRequest {
    pub price_per_unit: Option<Decimal>,
    pub total_price: Option<Decimal>,
    pub quantity_offered: Option<i32>,
    pub lead_time_days: Option<i32>,
    pub valid_until: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteFilter {
    pub status: Option<QuoteStatus>,
    pub rfq_id: Option<Uuid>,
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub status: OrderStatus,
    pub order_total: Decimal,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub payment_intent_id: Option<String>,
    pub related_quote_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub material_id: Option<Uuid>,
    pub design_id: Option<Uuid>,
    pub custom_item_description: Option<String>,
    pub item_name: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub seller_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn subtotal(&self) -> Decimal {
        line_subtotal(self.quantity, self.unit_price)
    }
}

pub fn line_subtotal(quantity: i32, unit_price: Decimal) -> Decimal {
    Decimal::from(quantity) * unit_price
}

/// Sum of line subtotals, rounded to cents.
pub fn order_total<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (i32, Decimal)>,
{
    round_money(
        lines
            .into_iter()
            .map(|(qty, price)| line_subtotal(qty, price))
            .sum(),
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemResponse {
    #[serde(flatten)]
    pub item: OrderItem,
    pub subtotal: Decimal,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        let subtotal = item.subtotal();
        Self { item, subtotal }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItemResponse>,
}

/// How the caller relates to an order, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderParty {
    Staff,
    Buyer,
    Seller,
    Outsider,
}

impl OrderParty {
    pub fn resolve(actor: &Actor, buyer_id: Uuid, is_item_seller: bool) -> Self {
        if actor.is_staff {
            Self::Staff
        } else if actor.user_id == buyer_id {
            Self::Buyer
        } else if is_item_seller && actor.user_type.can_sell() {
            Self::Seller
        } else {
            Self::Outsider
        }
    }
}

/// Whether `party` may move an order from `from` to `to`.
pub fn can_transition(party: OrderParty, from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    match party {
        OrderParty::Staff => true,
        OrderParty::Buyer => {
            to == CancelledByBuyer && matches!(from, PendingPayment | Processing)
        }
        OrderParty::Seller => match to {
            Processing => from == PendingPayment,
            Shipped => from == Processing,
            Delivered => from == Shipped,
            Completed => matches!(from, Shipped | Delivered | Processing),
            CancelledBySeller => matches!(from, PendingPayment | Processing),
            _ => false,
        },
        OrderParty::Outsider => false,
    }
}

/// Why a status move was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StatusMoveError {
    #[error("You cannot move this order from '{from}' to '{to}'")]
    Forbidden { from: OrderStatus, to: OrderStatus },

    #[error("Order status changed to '{current}' in the meantime; reload and retry")]
    Stale { current: OrderStatus },
}

/// Decide a status move against `current`, the status read under the row
/// lock. `seen` is the status the caller resolved its party against.
pub fn check_status_move(
    party: OrderParty,
    seen: OrderStatus,
    current: OrderStatus,
    to: OrderStatus,
) -> Result<(), StatusMoveError> {
    if current != seen {
        return Err(StatusMoveError::Stale { current });
    }
    if !can_transition(party, current, to) {
        return Err(StatusMoveError::Forbidden { from: current, to });
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemInput {
    #[serde(default)]
    pub material_id: Option<Uuid>,
    #[serde(default)]
    pub design_id: Option<Uuid>,
    #[serde(default)]
    pub custom_item_description: Option<String>,
    pub quantity: i32,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub seller_id: Option<Uuid>,
}

/// What an order line points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSource {
    Material(Uuid),
    Design(Uuid),
    Custom {
        description: String,
        unit_price: Decimal,
        seller_id: Uuid,
    },
}

impl OrderItemInput {
    pub fn source(&self) -> Result<ItemSource, String> {
        if self.quantity < 1 {
            return Err("Item quantity must be positive.".to_string());
        }
        if let Some(price) = self.unit_price {
            if price < Decimal::new(1, 2) {
                return Err("unit_price must be at least 0.01".to_string());
            }
        }

        let custom = self
            .custom_item_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());

        match (self.material_id, self.design_id, custom) {
            (Some(id), None, None) => Ok(ItemSource::Material(id)),
            (None, Some(id), None) => Ok(ItemSource::Design(id)),
            (None, None, Some(description)) => {
                let unit_price = self.unit_price.ok_or_else(|| {
                    format!("Unit price must be provided for custom item: {}", description)
                })?;
                let seller_id = self.seller_id.ok_or_else(|| {
                    format!("Seller must be specified for custom item: {}", description)
                })?;
                Ok(ItemSource::Custom {
                    description: description.to_string(),
                    unit_price,
                    seller_id,
                })
            }
            (None, None, None) => {
                Err("Each order item must specify a product or custom description.".to_string())
            }
            _ => Err(
                "An order item must reference exactly one of material, design or custom description."
                    .to_string(),
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub related_quote_id: Option<Uuid>,
    #[serde(default)]
    pub items: Vec<OrderItemInput>,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub billing_address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrderRequest {
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitiatePaymentRequest {
    #[serde(default)]
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiation {
    pub order_id: Uuid,
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::accounts::UserType;
    use chrono::Duration;

    fn actor(user_type: UserType) -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            username: "tester".to_string(),
            email: "tester@example.com".to_string(),
            user_type,
            is_staff: false,
        }
    }

    fn rfq(buyer_id: Uuid, status: RfqStatus, deadline: Option<DateTime<Utc>>) -> Rfq {
        let now = Utc::now();
        Rfq {
            id: Uuid::new_v4(),
            buyer_id,
            title: "Organic cotton twill".to_string(),
            description: "3000m, natural".to_string(),
            category_id: None,
            quantity_required: 3000,
            unit_of_measurement: Some("meter".to_string()),
            deadline_for_quotes: deadline,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn quote(status: QuoteStatus, total: Decimal, qty: i32) -> Quote {
        let now = Utc::now();
        Quote {
            id: Uuid::new_v4(),
            rfq_id: None,
            supplier_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            price_per_unit: None,
            total_price: total,
            quantity_offered: qty,
            lead_time_days: Some(14),
            valid_until: Some(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()),
            notes: None,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rfq_visibility() {
        let now = Utc::now();
        let buyer = actor(UserType::Buyer);
        let other_buyer = actor(UserType::Buyer);
        let supplier = actor(UserType::Seller);
        let designer = actor(UserType::Designer);
        let mut staff = actor(UserType::Designer);
        staff.is_staff = true;

        let open = rfq(buyer.user_id, RfqStatus::Open, Some(now + Duration::days(3)));
        let lapsed = rfq(buyer.user_id, RfqStatus::Open, Some(now - Duration::days(1)));
        let pending = rfq(buyer.user_id, RfqStatus::Pending, None);

        assert!(rfq_visible_to(&open, None, false, now));
        assert!(!rfq_visible_to(&lapsed, None, false, now));
        assert!(!rfq_visible_to(&pending, None, false, now));

        assert!(rfq_visible_to(&pending, Some(&buyer), false, now));
        assert!(!rfq_visible_to(&pending, Some(&other_buyer), false, now));
        assert!(rfq_visible_to(&open, Some(&other_buyer), false, now));

        assert!(rfq_visible_to(&open, Some(&supplier), false, now));
        assert!(!rfq_visible_to(&lapsed, Some(&supplier), false, now));
        assert!(rfq_visible_to(&lapsed, Some(&supplier), true, now));

        assert!(!rfq_visible_to(&open, Some(&designer), false, now));
        assert!(rfq_visible_to(&lapsed, Some(&staff), false, now));
    }

    #[test]
    fn rfq_accepts_quotes_while_pending_or_open() {
        let now = Utc::now();
        let buyer = Uuid::new_v4();
        assert!(rfq(buyer, RfqStatus::Pending, None).accepts_quotes(now));
        assert!(rfq(buyer, RfqStatus::Open, Some(now + Duration::hours(1))).accepts_quotes(now));
        assert!(!rfq(buyer, RfqStatus::Open, Some(now - Duration::hours(1))).accepts_quotes(now));
        assert!(!rfq(buyer, RfqStatus::Awarded, None).accepts_quotes(now));
    }

    #[test]
    fn quote_cannot_be_accepted_twice() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        for status in [
            QuoteStatus::Accepted,
            QuoteStatus::Ordered,
            QuoteStatus::Rejected,
            QuoteStatus::Expired,
        ] {
            let q = quote(status, Decimal::new(10000, 2), 10);
            assert_eq!(q.check_acceptable(today), Err(QuoteAcceptError::Finalized(status)));
        }

        let q = quote(QuoteStatus::Viewed, Decimal::new(10000, 2), 10);
        assert_eq!(q.check_acceptable(today), Ok(()));
    }

    #[test]
    fn awarded_quote_can_be_ordered() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        for status in [QuoteStatus::Accepted, QuoteStatus::Submitted, QuoteStatus::Viewed] {
            let q = quote(status, Decimal::new(10000, 2), 10);
            assert_eq!(q.check_orderable(today), Ok(()));
        }
        for status in [QuoteStatus::Ordered, QuoteStatus::Rejected, QuoteStatus::Expired] {
            let q = quote(status, Decimal::new(10000, 2), 10);
            assert_eq!(q.check_orderable(today), Err(QuoteAcceptError::NotOrderable(status)));
        }

        let mut awarded = quote(QuoteStatus::Accepted, Decimal::new(10000, 2), 10);
        awarded.valid_until = NaiveDate::from_ymd_opt(2025, 5, 1);
        assert_eq!(awarded.check_orderable(today), Err(QuoteAcceptError::Expired));
    }

    #[test]
    fn stale_quote_is_expired() {
        let mut q = quote(QuoteStatus::Submitted, Decimal::new(10000, 2), 10);
        q.valid_until = NaiveDate::from_ymd_opt(2025, 5, 31);
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(q.check_acceptable(today), Err(QuoteAcceptError::Expired));

        // valid through the last day
        let last_day = NaiveDate::from_ymd_opt(2025, 5, 31).unwrap();
        assert_eq!(q.check_acceptable(last_day), Ok(()));
    }

    #[test]
    fn quote_line_derivation() {
        let mut q = quote(QuoteStatus::Submitted, Decimal::new(100000, 2), 3);
        let line = quote_line(&q, Some("Organic cotton twill"));
        assert_eq!(
            line.description,
            format!("From Quote {}: Organic cotton twill", q.id)
        );
        assert_eq!(line.quantity, 3);
        // 1000.00 / 3 rounded to cents
        assert_eq!(line.unit_price, Decimal::new(33333, 2));
        assert_eq!(line.seller_id, q.supplier_id);

        q.notes = Some("Dyed to pantone 19-4052".to_string());
        assert!(quote_line(&q, None).description.ends_with(": Dyed to pantone 19-4052"));

        q.notes = None;
        assert!(quote_line(&q, None).description.ends_with(": Quoted Item"));
    }

    #[test]
    fn unit_price_rounds_half_away_from_zero() {
        // 0.05 / 2 = 0.025
        let q = quote(QuoteStatus::Submitted, Decimal::new(5, 2), 2);
        assert_eq!(quote_line(&q, None).unit_price, Decimal::new(3, 2));
    }

    #[test]
    fn order_total_is_sum_of_subtotals() {
        let total = order_total([
            (3, Decimal::new(1250, 2)),
            (1, Decimal::new(999, 2)),
            (10, Decimal::new(1, 2)),
        ]);
        assert_eq!(total, Decimal::new(4839, 2));
        assert_eq!(order_total(Vec::new()), Decimal::ZERO);
    }

    #[test]
    fn quote_request_total() {
        let req = CreateQuoteRequest {
            rfq_id: None,
            buyer_id: None,
            price_per_unit: Some(Decimal::new(450, 2)),
            total_price: None,
            quantity_offered: Some(200),
            lead_time_days: None,
            valid_until: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            notes: None,
        };
        assert_eq!(req.resolved_total(), Ok(Decimal::new(90000, 2)));

        let req = CreateQuoteRequest {
            price_per_unit: None,
            ..req
        };
        assert!(req.resolved_total().is_err());
    }

    #[test]
    fn quoted_total_must_cover_a_cent_per_unit() {
        assert!(check_quoted_total(Decimal::ZERO, 1).is_err());
        assert!(check_quoted_total(Decimal::new(2, 2), 5).is_err());
        assert!(check_quoted_total(Decimal::new(-100, 2), 1).is_err());
        assert!(check_quoted_total(Decimal::new(100, 2), 0).is_err());
        assert_eq!(check_quoted_total(Decimal::new(5, 2), 5), Ok(()));
        // 0.03 / 5 rounds up to 0.01
        assert_eq!(check_quoted_total(Decimal::new(3, 2), 5), Ok(()));

        let req = CreateQuoteRequest {
            rfq_id: None,
            buyer_id: Some(Uuid::new_v4()),
            price_per_unit: None,
            total_price: Some(Decimal::new(2, 2)),
            quantity_offered: Some(5),
            lead_time_days: None,
            valid_until: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            notes: None,
        };
        assert!(req.resolved_total().is_err());
    }

    #[test]
    fn buyer_transitions() {
        use OrderStatus::*;
        let p = OrderParty::Buyer;
        assert!(can_transition(p, PendingPayment, CancelledByBuyer));
        assert!(can_transition(p, Processing, CancelledByBuyer));
        assert!(!can_transition(p, Shipped, CancelledByBuyer));
        assert!(!can_transition(p, PendingPayment, Processing));
        assert!(!can_transition(p, Delivered, Completed));
    }

    #[test]
    fn status_move_rechecked_under_lock() {
        use OrderStatus::*;
        let seller = OrderParty::Seller;
        assert_eq!(check_status_move(seller, Processing, Processing, Shipped), Ok(()));

        // the buyer cancelled between the seller's read and write
        assert_eq!(
            check_status_move(seller, Processing, CancelledByBuyer, Shipped),
            Err(StatusMoveError::Stale { current: CancelledByBuyer })
        );
        assert_eq!(
            check_status_move(seller, Shipped, Shipped, CancelledBySeller),
            Err(StatusMoveError::Forbidden { from: Shipped, to: CancelledBySeller })
        );
    }

    #[test]
    fn seller_transitions() {
        use OrderStatus::*;
        let p = OrderParty::Seller;
        assert!(can_transition(p, PendingPayment, Processing));
        assert!(can_transition(p, Processing, Shipped));
        assert!(can_transition(p, Shipped, Delivered));
        assert!(can_transition(p, Shipped, Completed));
        assert!(can_transition(p, Delivered, Completed));
        assert!(can_transition(p, Processing, Completed));
        assert!(can_transition(p, PendingPayment, CancelledBySeller));

        assert!(!can_transition(p, PendingPayment, Shipped));
        assert!(!can_transition(p, Shipped, CancelledBySeller));
        assert!(!can_transition(p, Processing, CancelledByBuyer));
        assert!(!can_transition(p, Delivered, Refunded));
    }

    #[test]
    fn staff_and_outsiders() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert!(can_transition(OrderParty::Staff, *from, *to));
                assert!(!can_transition(OrderParty::Outsider, *from, *to));
            }
        }
    }

    #[test]
    fn party_precedence() {
        let seller = actor(UserType::Seller);
        assert_eq!(OrderParty::resolve(&seller, seller.user_id, true), OrderParty::Buyer);
        assert_eq!(OrderParty::resolve(&seller, Uuid::new_v4(), true), OrderParty::Seller);
        assert_eq!(OrderParty::resolve(&seller, Uuid::new_v4(), false), OrderParty::Outsider);

        let buyer = actor(UserType::Buyer);
        assert_eq!(OrderParty::resolve(&buyer, Uuid::new_v4(), true), OrderParty::Outsider);
    }

    #[test]
    fn order_item_sources() {
        let base = OrderItemInput {
            material_id: None,
            design_id: None,
            custom_item_description: None,
            quantity: 2,
            unit_price: None,
            seller_id: None,
        };

        let material = Uuid::new_v4();
        let item = OrderItemInput {
            material_id: Some(material),
            ..base.clone()
        };
        assert_eq!(item.source(), Ok(ItemSource::Material(material)));

        assert!(base.source().is_err());

        let both = OrderItemInput {
            material_id: Some(material),
            design_id: Some(Uuid::new_v4()),
            ..base.clone()
        };
        assert!(both.source().is_err());

        let custom = OrderItemInput {
            custom_item_description: Some("Sample yardage".to_string()),
            unit_price: Some(Decimal::new(500, 2)),
            ..base.clone()
        };
        assert!(custom.source().unwrap_err().contains("Seller must be specified"));

        let seller = Uuid::new_v4();
        let custom = OrderItemInput {
            seller_id: Some(seller),
            ..custom
        };
        assert_eq!(
            custom.source(),
            Ok(ItemSource::Custom {
                description: "Sample yardage".to_string(),
                unit_price: Decimal::new(500, 2),
                seller_id: seller,
            })
        );

        let zero_qty = OrderItemInput {
            quantity: 0,
            material_id: Some(material),
            ..base
        };
        assert!(zero_qty.source().is_err());
    }
}
