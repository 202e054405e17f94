//! Stripe customers, the payment ledger and webhook reconciliation

use chrono::Utc;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::notifications;
use super::profiles;
use super::stripe::StripeClient;
use crate::domain::orders::OrderStatus;
use crate::domain::payments::{
    cents_to_decimal, from_unix, NewTransaction, StripeEvent, StripeInvoice, StripePaymentIntent,
    StripeSubscription, SubscriptionStatus, TransactionStatus, TransactionType, WebhookEvent,
};
use crate::error::ApiError;

const GATEWAY: &str = "stripe";

/// Stripe customer of a user, created and stored on first use.
pub async fn ensure_customer(
    db: &PgPool,
    stripe: &StripeClient,
    user_id: Uuid,
) -> Result<String, ApiError> {
    if let Some(customer_id) = profiles::stripe_customer_id(db, user_id).await? {
        return Ok(customer_id);
    }

    let profile = profiles::fetch_profile(db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;

    let customer = stripe
        .create_customer(user_id, &profile.email, profile.full_name().as_deref())
        .await?;

    profiles::set_stripe_customer_id(db, user_id, &customer.id).await?;
    tracing::info!(user_id = %user_id, customer_id = %customer.id, "Stripe customer created");

    Ok(customer.id)
}

/// Insert a ledger row, or update the row already keyed by the same gateway id.
pub async fn record_transaction<'e, E>(executor: E, tx: &NewTransaction) -> Result<Uuid, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar(
        r#"
        INSERT INTO transaction_logs
            (user_id, transaction_type, status, amount, currency, description, payment_gateway,
             gateway_transaction_id, gateway_charge_id, gateway_response,
             related_order_id, related_subscription_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (gateway_transaction_id) DO UPDATE SET
            status = EXCLUDED.status,
            amount = EXCLUDED.amount,
            gateway_charge_id = COALESCE(EXCLUDED.gateway_charge_id, transaction_logs.gateway_charge_id),
            gateway_response = EXCLUDED.gateway_response,
            description = COALESCE(EXCLUDED.description, transaction_logs.description),
            updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(tx.user_id)
    .bind(tx.transaction_type)
    .bind(tx.status)
    .bind(tx.amount)
    .bind(&tx.currency)
    .bind(&tx.description)
    .bind(GATEWAY)
    .bind(&tx.gateway_transaction_id)
    .bind(&tx.gateway_charge_id)
    .bind(&tx.gateway_response)
    .bind(tx.related_order_id)
    .bind(tx.related_subscription_id)
    .fetch_one(executor)
    .await
}

// ============================================================================
// Webhook reconciliation
// ============================================================================

/// Apply a verified webhook event to local state.
///
/// Events naming rows this service does not know are logged and ignored.
/// Database errors propagate so the delivery is retried.
pub async fn reconcile(db: &PgPool, event: StripeEvent) -> Result<(), ReconcileError> {
    let event_id = event.id.clone();
    let raw = event.data.object.clone();
    let parsed = event.into_webhook_event().map_err(ReconcileError::Payload)?;

    tracing::info!(event_id = %event_id, "Processing Stripe webhook");

    match parsed {
        WebhookEvent::InvoicePaid(invoice) => invoice_settled(db, &invoice, raw, true).await?,
        WebhookEvent::InvoicePaymentFailed(invoice) => {
            invoice_settled(db, &invoice, raw, false).await?
        }
        WebhookEvent::PaymentIntentSucceeded(intent) => {
            payment_intent_settled(db, &intent, raw, true).await?
        }
        WebhookEvent::PaymentIntentFailed(intent) => {
            payment_intent_settled(db, &intent, raw, false).await?
        }
        WebhookEvent::SubscriptionUpdated(sub) => subscription_changed(db, &sub, false).await?,
        WebhookEvent::SubscriptionDeleted(sub) => subscription_changed(db, &sub, true).await?,
        WebhookEvent::Unhandled(event_type) => {
            tracing::info!(event_id = %event_id, event_type = %event_type, "Unhandled Stripe event");
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Event payload does not match its type: {0}")]
    Payload(serde_json::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

async fn invoice_settled(
    db: &PgPool,
    invoice: &StripeInvoice,
    raw: serde_json::Value,
    paid: bool,
) -> Result<(), sqlx::Error> {
    let Some(subscription_id) = invoice.subscription.as_deref() else {
        tracing::info!(invoice_id = %invoice.id, "Invoice without subscription ignored");
        return Ok(());
    };

    let mut tx = db.begin().await?;

    let row: Option<(Uuid, Uuid)> = if paid {
        let (period_start, period_end) = invoice.period().unzip();
        sqlx::query_as(
            r#"
            UPDATE user_subscriptions SET
                status = $2,
                current_period_start = COALESCE($3, current_period_start),
                current_period_end = COALESCE($4, current_period_end),
                cancel_at_period_end = FALSE,
                updated_at = NOW()
            WHERE stripe_subscription_id = $1
            RETURNING id, user_id
            "#,
        )
        .bind(subscription_id)
        .bind(SubscriptionStatus::Active)
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(&mut *tx)
        .await?
    } else {
        sqlx::query_as(
            r#"
            UPDATE user_subscriptions SET status = $2, updated_at = NOW()
            WHERE stripe_subscription_id = $1
            RETURNING id, user_id
            "#,
        )
        .bind(subscription_id)
        .bind(SubscriptionStatus::PastDue)
        .fetch_optional(&mut *tx)
        .await?
    };

    let Some((local_id, user_id)) = row else {
        tracing::warn!(subscription_id = %subscription_id, "Invoice for unknown subscription");
        return Ok(());
    };

    let (status, cents, description) = if paid {
        (TransactionStatus::Succeeded, invoice.amount_paid, "Subscription payment")
    } else {
        (TransactionStatus::Failed, invoice.amount_due, "Failed subscription payment")
    };

    let entry = NewTransaction {
        user_id: Some(user_id),
        transaction_type: TransactionType::SubscriptionPayment,
        status,
        amount: cents_to_decimal(cents),
        currency: invoice.currency.to_uppercase(),
        description: Some(description.to_string()),
        gateway_transaction_id: Some(
            invoice
                .payment_intent_id()
                .unwrap_or(invoice.id.as_str())
                .to_string(),
        ),
        gateway_charge_id: invoice.charge.clone(),
        gateway_response: Some(raw),
        related_order_id: None,
        related_subscription_id: Some(local_id),
    };
    record_transaction(&mut *tx, &entry).await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %user_id,
        subscription_id = %subscription_id,
        paid = paid,
        "Subscription invoice reconciled"
    );
    Ok(())
}

async fn payment_intent_settled(
    db: &PgPool,
    intent: &StripePaymentIntent,
    raw: serde_json::Value,
    succeeded: bool,
) -> Result<(), sqlx::Error> {
    let Some(order_id) = intent.order_id() else {
        tracing::info!(payment_intent_id = %intent.id, "Payment intent without order ignored");
        return Ok(());
    };

    let mut tx = db.begin().await?;

    let current: Option<(Uuid, OrderStatus)> = sqlx::query_as(
        "SELECT buyer_id, status FROM orders WHERE id = $1 AND payment_intent_id = $2 FOR UPDATE",
    )
    .bind(order_id)
    .bind(&intent.id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((buyer_id, status)) = current else {
        tracing::warn!(
            order_id = %order_id,
            payment_intent_id = %intent.id,
            "Payment intent for unknown order"
        );
        return Ok(());
    };

    let moved = status == OrderStatus::PendingPayment;
    if moved {
        let next = if succeeded {
            OrderStatus::Processing
        } else {
            OrderStatus::PaymentFailed
        };
        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(next)
            .execute(&mut *tx)
            .await?;
    }

    let (status, cents, description) = if succeeded {
        (TransactionStatus::Succeeded, intent.amount_received, None)
    } else {
        (TransactionStatus::Failed, intent.amount, intent.failure_message())
    };

    let entry = NewTransaction {
        user_id: intent.user_id().or(Some(buyer_id)),
        transaction_type: TransactionType::OrderPayment,
        status,
        amount: cents_to_decimal(cents),
        currency: intent.currency.to_uppercase(),
        description: description.or_else(|| Some(format!("Payment for order {}", order_id))),
        gateway_transaction_id: Some(intent.id.clone()),
        gateway_charge_id: intent.latest_charge.clone(),
        gateway_response: Some(raw),
        related_order_id: Some(order_id),
        related_subscription_id: None,
    };
    record_transaction(&mut *tx, &entry).await?;

    tx.commit().await?;

    tracing::info!(
        order_id = %order_id,
        payment_intent_id = %intent.id,
        succeeded = succeeded,
        "Order payment reconciled"
    );

    if moved {
        notifications::notify_payment(db, buyer_id, order_id, succeeded).await;
    }
    Ok(())
}

async fn subscription_changed(
    db: &PgPool,
    sub: &StripeSubscription,
    deleted: bool,
) -> Result<(), sqlx::Error> {
    let status = if deleted {
        SubscriptionStatus::Cancelled
    } else {
        SubscriptionStatus::from_stripe(&sub.status)
    };

    let plan_id: Option<Uuid> = match sub.price_id() {
        Some(price_id) => {
            sqlx::query_scalar("SELECT id FROM subscription_plans WHERE stripe_price_id = $1")
                .bind(price_id)
                .fetch_optional(db)
                .await?
        }
        None => None,
    };

    let cancelled_at = sub
        .canceled_at
        .and_then(from_unix)
        .or_else(|| deleted.then(Utc::now));

    let updated = sqlx::query(
        r#"
        UPDATE user_subscriptions SET
            status = $2,
            cancel_at_period_end = $3,
            cancelled_at = COALESCE($4, cancelled_at),
            current_period_start = COALESCE($5, current_period_start),
            current_period_end = COALESCE($6, current_period_end),
            trial_start = COALESCE($7, trial_start),
            trial_end = COALESCE($8, trial_end),
            plan_id = COALESCE($9, plan_id),
            updated_at = NOW()
        WHERE stripe_subscription_id = $1
        "#,
    )
    .bind(&sub.id)
    .bind(status)
    .bind(sub.cancel_at_period_end)
    .bind(cancelled_at)
    .bind(sub.current_period_start.and_then(from_unix))
    .bind(sub.current_period_end.and_then(from_unix))
    .bind(sub.trial_start.and_then(from_unix))
    .bind(sub.trial_end.and_then(from_unix))
    .bind(plan_id)
    .execute(db)
    .await?;

    if updated.rows_affected() == 0 {
        tracing::warn!(subscription_id = %sub.id, "Update for unknown subscription");
    } else {
        tracing::info!(subscription_id = %sub.id, status = %status, "Subscription synced");
    }
    Ok(())
}
