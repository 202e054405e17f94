//! Subscription, ledger and Stripe webhook routes

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, MessageResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{CurrentUser, RequireStaff};
use crate::domain::payments::{
    validate_features, CancelSubscriptionRequest, CreatePlanRequest, CreateSubscriptionRequest,
    from_unix, FeatureAccess, FeatureQuery, StripeEvent, SubscriptionCreated, SubscriptionPlan,
    SubscriptionResponse, SubscriptionStatus, TransactionFilter, TransactionLog,
    UpdatePlanRequest, UserSubscription,
};
use crate::error::ApiError;
use crate::middleware::RequestIdExt;
use crate::services::billing::{self, ReconcileError};
use crate::services::cache::keys;
use crate::services::webhooks;

const PLAN_COLUMNS: &str = r#"
    id, name, description, price, currency, billing_interval, interval_count,
    stripe_price_id, features, is_active, display_order, created_at, updated_at
"#;

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, user_id, plan_id, status, start_date, current_period_start, current_period_end,
    cancel_at_period_end, cancelled_at, trial_start, trial_end, stripe_subscription_id,
    stripe_customer_id, created_at, updated_at
"#;

const TRANSACTION_COLUMNS: &str = r#"
    id, user_id, transaction_type, status, amount, currency, description, payment_gateway,
    gateway_transaction_id, gateway_charge_id, gateway_response, related_order_id,
    related_subscription_id, created_at, updated_at
"#;

const STRIPE_SIGNATURE: &str = "stripe-signature";

async fn fetch_plan(state: &AppState, plan_id: Uuid) -> Result<Option<SubscriptionPlan>, ApiError> {
    sqlx::query_as::<_, SubscriptionPlan>(&format!(
        "SELECT {} FROM subscription_plans WHERE id = $1",
        PLAN_COLUMNS
    ))
    .bind(plan_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::database)
}

async fn fetch_subscription(
    state: &AppState,
    user_id: Uuid,
) -> Result<Option<UserSubscription>, ApiError> {
    sqlx::query_as::<_, UserSubscription>(&format!(
        "SELECT {} FROM user_subscriptions WHERE user_id = $1",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::database)
}

async fn subscription_response(
    state: &AppState,
    subscription: UserSubscription,
) -> Result<SubscriptionResponse, ApiError> {
    let plan = match subscription.plan_id {
        Some(plan_id) => fetch_plan(state, plan_id).await?,
        None => None,
    };
    let is_active = subscription.is_active_or_trialing(Utc::now());
    Ok(SubscriptionResponse {
        subscription,
        plan,
        is_active,
    })
}

// ============================================================================
// Plans
// ============================================================================

/// GET /api/v1/payments/plans
pub async fn list_plans(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let cache_key = keys::active_plans();
    if let Some(plans) = state.cache.get::<Vec<SubscriptionPlan>>(&cache_key).await {
        return Ok(DataResponse::new(plans));
    }

    let plans = sqlx::query_as::<_, SubscriptionPlan>(&format!(
        r#"
        SELECT {} FROM subscription_plans
        WHERE is_active = TRUE
        ORDER BY display_order, price
        "#,
        PLAN_COLUMNS
    ))
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    state.cache.put(&cache_key, &plans).await;
    Ok(DataResponse::new(plans))
}

/// GET /api/v1/payments/plans/:id
pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let plan = fetch_plan(&state, plan_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| ApiError::not_found("Plan not found"))?;
    Ok(DataResponse::new(plan))
}

/// POST /api/v1/payments/plans
pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    staff: RequireStaff,
    Json(input): Json<CreatePlanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    if input.price.is_sign_negative() {
        return Err(ApiError::bad_request("price cannot be negative"));
    }
    if input.interval_count.is_some_and(|c| c < 1) {
        return Err(ApiError::bad_request("interval_count must be at least 1"));
    }
    if let Some(ref features) = input.features {
        validate_features(features).map_err(ApiError::bad_request)?;
    }

    let plan = sqlx::query_as::<_, SubscriptionPlan>(&format!(
        r#"
        INSERT INTO subscription_plans
            (name, description, price, currency, billing_interval, interval_count,
             stripe_price_id, features, is_active, display_order)
        VALUES ($1, $2, $3, COALESCE($4, 'USD'), COALESCE($5, 'month'), COALESCE($6, 1),
                $7, COALESCE($8, '{{}}'::jsonb), COALESCE($9, TRUE), COALESCE($10, 0))
        RETURNING {}
        "#,
        PLAN_COLUMNS
    ))
    .bind(input.name.trim())
    .bind(&input.description)
    .bind(input.price)
    .bind(&input.currency)
    .bind(input.billing_interval)
    .bind(input.interval_count)
    .bind(&input.stripe_price_id)
    .bind(&input.features)
    .bind(input.is_active)
    .bind(input.display_order)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    state.cache.invalidate(&keys::active_plans()).await;
    tracing::info!(plan_id = %plan.id, staff_id = %staff.user_id, "Subscription plan created");

    Ok(Created(plan))
}

/// PATCH /api/v1/payments/plans/:id
pub async fn update_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<Uuid>,
    staff: RequireStaff,
    Json(input): Json<UpdatePlanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if input.price.is_some_and(|p| p.is_sign_negative()) {
        return Err(ApiError::bad_request("price cannot be negative"));
    }
    if input.interval_count.is_some_and(|c| c < 1) {
        return Err(ApiError::bad_request("interval_count must be at least 1"));
    }
    if let Some(ref features) = input.features {
        validate_features(features).map_err(ApiError::bad_request)?;
    }

    let plan = sqlx::query_as::<_, SubscriptionPlan>(&format!(
        r#"
        UPDATE subscription_plans SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            price = COALESCE($4, price),
            currency = COALESCE($5, currency),
            billing_interval = COALESCE($6, billing_interval),
            interval_count = COALESCE($7, interval_count),
            stripe_price_id = COALESCE($8, stripe_price_id),
            features = COALESCE($9, features),
            is_active = COALESCE($10, is_active),
            display_order = COALESCE($11, display_order),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        PLAN_COLUMNS
    ))
    .bind(plan_id)
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.price)
    .bind(&input.currency)
    .bind(input.billing_interval)
    .bind(input.interval_count)
    .bind(&input.stripe_price_id)
    .bind(&input.features)
    .bind(input.is_active)
    .bind(input.display_order)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Plan not found"))?;

    state.cache.invalidate(&keys::active_plans()).await;
    tracing::info!(plan_id = %plan.id, staff_id = %staff.user_id, "Subscription plan updated");

    Ok(DataResponse::new(plan))
}

// ============================================================================
// Subscriptions
// ============================================================================

/// GET /api/v1/payments/subscriptions/me
pub async fn get_my_subscription(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = fetch_subscription(&state, user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("You do not have a subscription"))?;
    Ok(DataResponse::new(
        subscription_response(&state, subscription).await?,
    ))
}

/// POST /api/v1/payments/subscriptions
///
/// Starts a Stripe subscription left incomplete until the first invoice is
/// paid; the returned client secret confirms that payment in the browser.
pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let plan = fetch_plan(&state, input.plan_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| ApiError::not_found("Plan not found or inactive"))?;

    if let Some(existing) = fetch_subscription(&state, user.user_id).await? {
        if existing.status.blocks_new_subscription() {
            return Err(ApiError::bad_request(format!(
                "You already have a subscription with status '{}'.",
                existing.status
            )));
        }
    }

    let price_id = plan
        .stripe_price_id
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("This plan cannot be purchased online."))?;

    let customer_id = billing::ensure_customer(&state.db, &state.stripe, user.user_id).await?;

    if let Some(ref payment_method_id) = input.payment_method_id {
        state
            .stripe
            .attach_default_payment_method(&customer_id, payment_method_id)
            .await?;
    }

    let stripe_sub = state
        .stripe
        .create_subscription(&customer_id, price_id, user.user_id, plan.id)
        .await?;

    let status = SubscriptionStatus::from_stripe(&stripe_sub.status);
    let period_start = stripe_sub.current_period_start.and_then(from_unix);
    let period_end = stripe_sub.current_period_end.and_then(from_unix);

    let subscription_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO user_subscriptions
            (user_id, plan_id, status, start_date, current_period_start, current_period_end,
             cancel_at_period_end, cancelled_at, stripe_subscription_id, stripe_customer_id)
        VALUES ($1, $2, $3, NOW(), $4, $5, FALSE, NULL, $6, $7)
        ON CONFLICT (user_id) DO UPDATE SET
            plan_id = EXCLUDED.plan_id,
            status = EXCLUDED.status,
            start_date = EXCLUDED.start_date,
            current_period_start = EXCLUDED.current_period_start,
            current_period_end = EXCLUDED.current_period_end,
            cancel_at_period_end = FALSE,
            cancelled_at = NULL,
            stripe_subscription_id = EXCLUDED.stripe_subscription_id,
            stripe_customer_id = EXCLUDED.stripe_customer_id,
            updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(user.user_id)
    .bind(plan.id)
    .bind(status)
    .bind(period_start)
    .bind(period_end)
    .bind(&stripe_sub.id)
    .bind(&customer_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    tracing::info!(
        user_id = %user.user_id,
        plan_id = %plan.id,
        stripe_subscription_id = %stripe_sub.id,
        status = %status,
        "Subscription created"
    );

    Ok(Created(SubscriptionCreated {
        subscription_id,
        client_secret: stripe_sub.client_secret(),
        stripe_subscription_id: stripe_sub.id,
        status,
    }))
}

/// POST /api/v1/payments/subscriptions/cancel
pub async fn cancel_subscription(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    input: Option<Json<CancelSubscriptionRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let input = input.map(|Json(body)| body).unwrap_or_default();
    let at_period_end = input.at_period_end.unwrap_or(true);

    let subscription = fetch_subscription(&state, user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("You do not have a subscription"))?;

    if subscription.status == SubscriptionStatus::Cancelled {
        return Err(ApiError::bad_request("Subscription is already cancelled."));
    }

    if let Some(ref stripe_id) = subscription.stripe_subscription_id {
        if at_period_end {
            state.stripe.cancel_at_period_end(stripe_id).await?;
        } else {
            state.stripe.delete_subscription(stripe_id).await?;
        }
    }

    let updated = if at_period_end {
        sqlx::query_as::<_, UserSubscription>(&format!(
            r#"
            UPDATE user_subscriptions SET cancel_at_period_end = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription.id)
        .fetch_one(&state.db)
        .await
    } else {
        sqlx::query_as::<_, UserSubscription>(&format!(
            r#"
            UPDATE user_subscriptions SET
                status = $2,
                cancel_at_period_end = FALSE,
                cancelled_at = NOW(),
                current_period_end = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription.id)
        .bind(SubscriptionStatus::Cancelled)
        .fetch_one(&state.db)
        .await
    }
    .map_err(ApiError::database)?;

    tracing::info!(
        user_id = %user.user_id,
        subscription_id = %subscription.id,
        at_period_end = at_period_end,
        "Subscription cancelled"
    );

    Ok(DataResponse::new(
        subscription_response(&state, updated).await?,
    ))
}

/// GET /api/v1/payments/subscriptions/feature?feature=
pub async fn check_feature(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeatureQuery>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let has_access = match fetch_subscription(&state, user.user_id).await? {
        Some(subscription) => {
            let plan = match subscription.plan_id {
                Some(plan_id) => fetch_plan(&state, plan_id).await?,
                None => None,
            };
            subscription.has_feature(plan.as_ref(), &query.feature, Utc::now())
        }
        None => false,
    };

    Ok(DataResponse::new(FeatureAccess {
        feature: query.feature,
        has_access,
    }))
}

// ============================================================================
// Transaction ledger
// ============================================================================

/// GET /api/v1/payments/transactions
///
/// Users see their own entries; staff may look at anyone's.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<TransactionFilter>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let user_filter = if user.is_staff {
        filter.user_id
    } else {
        Some(user.user_id)
    };

    let where_clause = r#"
        WHERE ($1::uuid IS NULL OR user_id = $1)
          AND ($2::text IS NULL OR transaction_type = $2)
          AND ($3::text IS NULL OR status = $3)
    "#;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM transaction_logs {}",
        where_clause
    ))
    .bind(user_filter)
    .bind(filter.transaction_type)
    .bind(filter.status)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let rows = sqlx::query_as::<_, TransactionLog>(&format!(
        "SELECT {} FROM transaction_logs {} ORDER BY created_at DESC LIMIT $4 OFFSET $5",
        TRANSACTION_COLUMNS, where_clause
    ))
    .bind(user_filter)
    .bind(filter.transaction_type)
    .bind(filter.status)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(rows, &pagination, total))
}

/// GET /api/v1/payments/transactions/:id
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let row = sqlx::query_as::<_, TransactionLog>(&format!(
        "SELECT {} FROM transaction_logs WHERE id = $1",
        TRANSACTION_COLUMNS
    ))
    .bind(transaction_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::database)?
    .filter(|t| user.is_staff || t.user_id == Some(user.user_id))
    .ok_or_else(|| ApiError::not_found("Transaction not found"))?;

    Ok(DataResponse::new(row))
}

// ============================================================================
// Stripe webhook
// ============================================================================

/// POST /api/v1/payments/webhooks/stripe
///
/// The raw body is needed for signature verification, so this handler takes
/// `Bytes` rather than `Json`.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = headers.request_id().unwrap_or("-").to_string();

    let signature = headers
        .get(STRIPE_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!(request_id = %request_id, "Stripe webhook without signature");
            ApiError::bad_request("Missing Stripe-Signature header")
        })?;

    webhooks::verify_signature(
        &body,
        signature,
        &state.settings.stripe_webhook_secret,
        state.settings.stripe_webhook_tolerance_seconds,
        Utc::now().timestamp(),
    )
    .map_err(|e| {
        tracing::warn!(request_id = %request_id, error = %e, "Stripe webhook signature rejected");
        ApiError::bad_request(e.to_string())
    })?;

    let event: StripeEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(request_id = %request_id, error = %e, "Stripe webhook payload is not valid JSON");
        ApiError::bad_request("Invalid webhook payload")
    })?;

    let event_id = event.id.clone();
    let event_type = event.event_type.clone();

    billing::reconcile(&state.db, event).await.map_err(|e| match e {
        ReconcileError::Payload(err) => {
            tracing::warn!(event_id = %event_id, event_type = %event_type, error = %err, "Malformed Stripe event");
            ApiError::bad_request("Invalid webhook payload")
        }
        ReconcileError::Database(err) => {
            tracing::error!(event_id = %event_id, event_type = %event_type, error = %err, "Stripe webhook reconciliation failed");
            ApiError::internal("Webhook processing failed")
        }
    })?;

    tracing::info!(request_id = %request_id, event_id = %event_id, event_type = %event_type, "Stripe webhook handled");
    Ok(MessageResponse::new("Webhook received"))
}
