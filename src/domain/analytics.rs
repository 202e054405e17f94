//! Reporting types: sales summaries, user activity, recommendations and
//! stored report rows.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orders::round_money;

text_enum! {
    pub enum ReportType {
        SalesSummary => "sales_summary",
        UserActivity => "user_activity",
        TrendAnalysis => "trend_analysis",
    }
}

text_enum! {
    pub enum ReportStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
    }
}

pub const REPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReportData {
    pub id: Uuid,
    pub report_type: ReportType,
    pub generated_for_user_id: Option<Uuid>,
    pub parameters: serde_json::Value,
    pub data: serde_json::Value,
    pub status: ReportStatus,
    pub error: Option<String>,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportFilter {
    pub report_type: Option<ReportType>,
    pub generated_for_user: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SalesSummaryParams {
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub seller_id: Option<Uuid>,
}

impl SalesSummaryParams {
    pub fn validate(&self) -> Result<(), String> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if end < start => {
                Err("end_date cannot be before start_date".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SalesSummaryQuery {
    #[serde(flatten)]
    pub params: SalesSummaryParams,
    #[serde(default, rename = "async")]
    pub run_async: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub total_sales: Decimal,
    pub number_of_orders: i64,
    pub average_order_value: Decimal,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub seller_id: Option<Uuid>,
}

impl SalesSummary {
    pub fn new(params: &SalesSummaryParams, total_sales: Decimal, number_of_orders: i64) -> Self {
        let average_order_value = if number_of_orders > 0 {
            round_money(total_sales / Decimal::from(number_of_orders))
        } else {
            Decimal::ZERO
        };

        Self {
            total_sales: round_money(total_sales),
            number_of_orders,
            average_order_value,
            start_date: params.start_date,
            end_date: params.end_date,
            seller_id: params.seller_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserActivityQuery {
    pub user_id: Uuid,
    #[serde(default)]
    pub days: Option<i64>,
}

impl UserActivityQuery {
    pub const DEFAULT_DAYS: i64 = 30;

    pub fn days(&self) -> i64 {
        self.days.unwrap_or(Self::DEFAULT_DAYS).clamp(1, 365)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserActivity {
    pub user_id: Uuid,
    pub days: i64,
    pub orders_placed: i64,
    pub rfqs_created: i64,
    pub quotes_submitted: i64,
    pub reviews_written: i64,
    pub forum_posts: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationQuery {
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub material_id: Option<Uuid>,
}

impl RecommendationQuery {
    pub fn count(&self) -> i64 {
        self.count.unwrap_or(5).clamp(1, 50)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RecommendedMaterial {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub price_per_unit: Decimal,
    pub unit: String,
    pub image_url: Option<String>,
    pub category_id: Option<Uuid>,
    pub average_rating: Decimal,
    pub review_count: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportQueued {
    pub report_id: Uuid,
    pub status: ReportStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_has_zero_average() {
        let summary = SalesSummary::new(&SalesSummaryParams::default(), Decimal::ZERO, 0);
        assert_eq!(summary.average_order_value, Decimal::ZERO);
        assert_eq!(summary.number_of_orders, 0);
    }

    #[test]
    fn summary_average() {
        let summary =
            SalesSummary::new(&SalesSummaryParams::default(), Decimal::new(100000, 2), 3);
        assert_eq!(summary.average_order_value, Decimal::new(33333, 2));
        assert_eq!(summary.total_sales, Decimal::new(100000, 2));
    }

    #[test]
    fn query_bounds() {
        let q = RecommendationQuery { count: Some(500), material_id: None };
        assert_eq!(q.count(), 50);
        let q = RecommendationQuery { count: None, material_id: None };
        assert_eq!(q.count(), 5);

        let q = UserActivityQuery { user_id: Uuid::new_v4(), days: Some(0) };
        assert_eq!(q.days(), 1);
    }

    #[test]
    fn date_range_validation() {
        let params = SalesSummaryParams {
            start_date: NaiveDate::from_ymd_opt(2025, 2, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            seller_id: None,
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn async_flag_parses_from_query() {
        let q: SalesSummaryQuery =
            serde_json::from_value(serde_json::json!({ "async": true, "start_date": "2025-01-01" }))
                .unwrap();
        assert!(q.run_async);
        assert_eq!(q.params.start_date, NaiveDate::from_ymd_opt(2025, 1, 1));
    }
}
