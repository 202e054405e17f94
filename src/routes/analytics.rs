//! Analytics routes: sales summaries, user activity, recommendations and
//! stored reports

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Accepted, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{CurrentUser, RequireStaff};
use crate::domain::analytics::{
    RecommendationQuery, ReportData, ReportFilter, ReportQueued, ReportStatus, SalesSummaryQuery,
    UserActivityQuery,
};
use crate::error::ApiError;
use crate::services::reports;

const REPORT_COLUMNS: &str = r#"
    id, report_type, generated_for_user_id, parameters, data, status, error, version,
    created_at, updated_at
"#;

/// GET /api/v1/analytics/sales-summary
///
/// With `?async=true` the summary is computed in the background and the
/// stored report id is returned with 202.
pub async fn sales_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SalesSummaryQuery>,
    staff: RequireStaff,
) -> Result<Response, ApiError> {
    query.params.validate().map_err(ApiError::bad_request)?;

    if query.run_async {
        let report_id = reports::queue_sales_summary(&state.db, staff.user_id, query.params)
            .await
            .map_err(ApiError::database)?;
        return Ok(Accepted(ReportQueued {
            report_id,
            status: ReportStatus::Pending,
        })
        .into_response());
    }

    let summary = reports::sales_summary(&state.db, &query.params)
        .await
        .map_err(ApiError::database)?;
    Ok(DataResponse::new(summary).into_response())
}

/// GET /api/v1/analytics/user-activity?user_id=&days=
pub async fn user_activity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserActivityQuery>,
    _staff: RequireStaff,
) -> Result<impl IntoResponse, ApiError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM profiles WHERE id = $1)")
        .bind(query.user_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::database)?;
    if !exists {
        return Err(ApiError::not_found("User not found"));
    }

    let activity = reports::user_activity(&state.db, query.user_id, query.days())
        .await
        .map_err(ApiError::database)?;
    Ok(DataResponse::new(activity))
}

/// GET /api/v1/analytics/recommendations
pub async fn recommendations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecommendationQuery>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let materials = reports::recommendations(&state.db, user.user_id, &query)
        .await
        .map_err(ApiError::database)?;
    Ok(DataResponse::new(materials))
}

// ============================================================================
// Stored reports
// ============================================================================

/// GET /api/v1/analytics/reports
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ReportFilter>,
    _staff: RequireStaff,
) -> Result<impl IntoResponse, ApiError> {
    let where_clause = r#"
        WHERE ($1::text IS NULL OR report_type = $1)
          AND ($2::uuid IS NULL OR generated_for_user_id = $2)
    "#;

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM report_data {}", where_clause))
            .bind(filter.report_type)
            .bind(filter.generated_for_user)
            .fetch_one(&state.db)
            .await
            .map_err(ApiError::database)?;

    let reports = sqlx::query_as::<_, ReportData>(&format!(
        "SELECT {} FROM report_data {} ORDER BY created_at DESC LIMIT $3 OFFSET $4",
        REPORT_COLUMNS, where_clause
    ))
    .bind(filter.report_type)
    .bind(filter.generated_for_user)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(reports, &pagination, total))
}

/// GET /api/v1/analytics/reports/:id
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<Uuid>,
    _staff: RequireStaff,
) -> Result<impl IntoResponse, ApiError> {
    let report = sqlx::query_as::<_, ReportData>(&format!(
        "SELECT {} FROM report_data WHERE id = $1",
        REPORT_COLUMNS
    ))
    .bind(report_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Report not found"))?;

    Ok(DataResponse::new(report))
}
