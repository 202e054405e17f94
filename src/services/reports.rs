//! Analytics queries and background report jobs

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::analytics::{
    RecommendationQuery, RecommendedMaterial, ReportStatus, ReportType, SalesSummary,
    SalesSummaryParams, UserActivity, REPORT_VERSION,
};

/// Orders in these states count as sales
const SOLD_STATUSES: &[&str] = &["completed", "shipped", "delivered"];

pub async fn sales_summary(
    db: &PgPool,
    params: &SalesSummaryParams,
) -> Result<SalesSummary, sqlx::Error> {
    let (total, count): (Decimal, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(o.order_total), 0), COUNT(*)
        FROM orders o
        WHERE o.status = ANY($1)
          AND ($2::date IS NULL OR o.created_at::date >= $2)
          AND ($3::date IS NULL OR o.created_at::date <= $3)
          AND ($4::uuid IS NULL OR EXISTS (
                SELECT 1 FROM order_items oi WHERE oi.order_id = o.id AND oi.seller_id = $4))
        "#,
    )
    .bind(SOLD_STATUSES)
    .bind(params.start_date)
    .bind(params.end_date)
    .bind(params.seller_id)
    .fetch_one(db)
    .await?;

    Ok(SalesSummary::new(params, total, count))
}

/// Store a pending report row and compute it on a background task.
pub async fn queue_sales_summary(
    db: &PgPool,
    requested_by: Uuid,
    params: SalesSummaryParams,
) -> Result<Uuid, sqlx::Error> {
    let parameters = serde_json::to_value(&params).unwrap_or_default();

    let report_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO report_data (report_type, generated_for_user_id, parameters, status, version)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(ReportType::SalesSummary)
    .bind(requested_by)
    .bind(&parameters)
    .bind(ReportStatus::Pending)
    .bind(REPORT_VERSION)
    .fetch_one(db)
    .await?;

    let db = db.clone();
    tokio::spawn(async move {
        if let Err(e) = run_sales_summary(&db, report_id, &params).await {
            tracing::error!(report_id = %report_id, error = %e, "Report job failed to record result");
        }
    });

    tracing::info!(report_id = %report_id, "Sales summary queued");
    Ok(report_id)
}

async fn run_sales_summary(
    db: &PgPool,
    report_id: Uuid,
    params: &SalesSummaryParams,
) -> Result<(), sqlx::Error> {
    let outcome = sales_summary(db, params).await;

    match outcome {
        Ok(summary) => {
            let data = serde_json::to_value(&summary).unwrap_or_default();
            sqlx::query(
                "UPDATE report_data SET status = $2, data = $3, updated_at = NOW() WHERE id = $1",
            )
            .bind(report_id)
            .bind(ReportStatus::Completed)
            .bind(&data)
            .execute(db)
            .await?;
            tracing::info!(report_id = %report_id, "Sales summary completed");
        }
        Err(e) => {
            tracing::warn!(report_id = %report_id, error = %e, "Sales summary failed");
            sqlx::query(
                "UPDATE report_data SET status = $2, error = $3, updated_at = NOW() WHERE id = $1",
            )
            .bind(report_id)
            .bind(ReportStatus::Failed)
            .bind(e.to_string())
            .execute(db)
            .await?;
        }
    }
    Ok(())
}

pub async fn user_activity(
    db: &PgPool,
    user_id: Uuid,
    days: i64,
) -> Result<UserActivity, sqlx::Error> {
    let since = Utc::now() - Duration::days(days);

    let (orders_placed, rfqs_created, quotes_submitted, reviews_written, forum_posts): (
        i64,
        i64,
        i64,
        i64,
        i64,
    ) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM orders WHERE buyer_id = $1 AND created_at >= $2),
            (SELECT COUNT(*) FROM rfqs WHERE buyer_id = $1 AND created_at >= $2),
            (SELECT COUNT(*) FROM quotes WHERE supplier_id = $1 AND created_at >= $2),
            (SELECT COUNT(*) FROM reviews WHERE author_id = $1 AND created_at >= $2),
            (SELECT COUNT(*) FROM forum_posts WHERE author_id = $1 AND created_at >= $2)
        "#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(db)
    .await?;

    Ok(UserActivity {
        user_id,
        days,
        orders_placed,
        rfqs_created,
        quotes_submitted,
        reviews_written,
        forum_posts,
    })
}

const RECOMMENDATION_COLUMNS: &str = r#"
    m.id, m.name, m.slug, m.price_per_unit, m.unit, m.image_url, m.category_id,
    m.average_rating, m.review_count
"#;

/// Materials from categories the user buys from (or the category of a given
/// material), excluding ones already ordered. Falls back to the best-rated
/// active materials when nothing matches.
pub async fn recommendations(
    db: &PgPool,
    user_id: Uuid,
    query: &RecommendationQuery,
) -> Result<Vec<RecommendedMaterial>, sqlx::Error> {
    let count = query.count();

    let related = sqlx::query_as::<_, RecommendedMaterial>(&format!(
        r#"
        WITH ordered AS (
            SELECT DISTINCT oi.material_id
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.buyer_id = $1 AND oi.material_id IS NOT NULL
        ),
        wanted AS (
            SELECT m.category_id FROM materials m
            WHERE $2::uuid IS NULL AND m.id IN (SELECT material_id FROM ordered)
            UNION
            SELECT m.category_id FROM materials m WHERE m.id = $2
        )
        SELECT {}
        FROM materials m
        WHERE m.is_active
          AND m.category_id IN (SELECT category_id FROM wanted)
          AND m.id NOT IN (SELECT material_id FROM ordered)
          AND ($2::uuid IS NULL OR m.id <> $2)
        ORDER BY m.average_rating DESC, m.review_count DESC, m.created_at DESC
        LIMIT $3
        "#,
        RECOMMENDATION_COLUMNS
    ))
    .bind(user_id)
    .bind(query.material_id)
    .bind(count)
    .fetch_all(db)
    .await?;

    if !related.is_empty() {
        return Ok(related);
    }

    sqlx::query_as::<_, RecommendedMaterial>(&format!(
        r#"
        SELECT {}
        FROM materials m
        WHERE m.is_active AND ($1::uuid IS NULL OR m.id <> $1)
        ORDER BY m.average_rating DESC, m.review_count DESC, m.created_at DESC
        LIMIT $2
        "#,
        RECOMMENDATION_COLUMNS
    ))
    .bind(query.material_id)
    .bind(count)
    .fetch_all(db)
    .await
}
