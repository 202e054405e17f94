//! Catalog domain types: categories, tags, certifications, materials,
//! designs and tech packs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Taxonomy
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryResponse {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub category: Category,
    pub subcategory_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Certification {
    pub id: Uuid,
    pub name: String,
    pub issuing_body: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CertificationRequest {
    pub name: String,
    #[serde(default)]
    pub issuing_body: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

// ============================================================================
// Materials
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Material {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub seller_username: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub category_slug: Option<String>,
    pub image_url: Option<String>,
    pub price_per_unit: Decimal,
    pub unit: String,
    pub minimum_order_quantity: i32,
    pub stock_quantity: i32,
    pub sku: Option<String>,
    pub composition: Option<String>,
    pub weight_gsm: Option<Decimal>,
    pub width_cm: Option<Decimal>,
    pub country_of_origin: Option<String>,
    pub lead_time_days: Option<i32>,
    pub is_active: bool,
    pub is_verified: bool,
    pub average_rating: Decimal,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterialResponse {
    #[serde(flatten)]
    pub material: Material,
    pub tags: Vec<Tag>,
    pub certifications: Vec<Certification>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMaterialRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub price_per_unit: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub minimum_order_quantity: Option<i32>,
    #[serde(default)]
    pub stock_quantity: Option<i32>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub composition: Option<String>,
    #[serde(default)]
    pub weight_gsm: Option<Decimal>,
    #[serde(default)]
    pub width_cm: Option<Decimal>,
    #[serde(default)]
    pub country_of_origin: Option<String>,
    #[serde(default)]
    pub lead_time_days: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_verified: Option<bool>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    #[serde(default)]
    pub certification_ids: Vec<Uuid>,
}

impl CreateMaterialRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        validate_material_numbers(
            Some(self.price_per_unit),
            self.minimum_order_quantity,
            self.stock_quantity,
        )?;
        validate_optional_url("image_url", self.image_url.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMaterialRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub price_per_unit: Option<Decimal>,
    pub unit: Option<String>,
    pub minimum_order_quantity: Option<i32>,
    pub stock_quantity: Option<i32>,
    pub sku: Option<String>,
    pub composition: Option<String>,
    pub weight_gsm: Option<Decimal>,
    pub width_cm: Option<Decimal>,
    pub country_of_origin: Option<String>,
    pub lead_time_days: Option<i32>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub tag_ids: Option<Vec<Uuid>>,
    pub certification_ids: Option<Vec<Uuid>>,
}

impl UpdateMaterialRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_material_numbers(
            self.price_per_unit,
            self.minimum_order_quantity,
            self.stock_quantity,
        )?;
        validate_optional_url("image_url", self.image_url.as_deref())
    }
}

fn validate_material_numbers(
    price_per_unit: Option<Decimal>,
    minimum_order_quantity: Option<i32>,
    stock_quantity: Option<i32>,
) -> Result<(), String> {
    if price_per_unit.is_some_and(|p| p <= Decimal::ZERO) {
        return Err("price_per_unit must be greater than 0".to_string());
    }
    if minimum_order_quantity.is_some_and(|q| q < 1) {
        return Err("minimum_order_quantity must be at least 1".to_string());
    }
    if stock_quantity.is_some_and(|q| q < 0) {
        return Err("stock_quantity cannot be negative".to_string());
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingFilter {
    /// Category slug
    pub category: Option<String>,
    /// Seller (materials) or designer (designs) username
    pub seller: Option<String>,
    pub designer: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub search: Option<String>,
    pub is_verified: Option<bool>,
    pub ordering: Option<String>,
}

/// Translate a public `ordering` value (`field` or `-field`) into an
/// ORDER BY clause. Only whitelisted columns are accepted.
pub fn order_clause(ordering: Option<&str>, allowed: &[&str], default: &str) -> String {
    let Some(raw) = ordering.map(str::trim).filter(|o| !o.is_empty()) else {
        return default.to_string();
    };
    let (column, direction) = match raw.strip_prefix('-') {
        Some(col) => (col, "DESC"),
        None => (raw, "ASC"),
    };

    if allowed.contains(&column) {
        format!("{} {}, id ASC", column, direction)
    } else {
        default.to_string()
    }
}

pub const MATERIAL_ORDERING: &[&str] = &[
    "name",
    "price_per_unit",
    "created_at",
    "updated_at",
    "stock_quantity",
    "average_rating",
];

pub const DESIGN_ORDERING: &[&str] = &["title", "price", "created_at", "updated_at", "average_rating"];

// ============================================================================
// Designs
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Design {
    pub id: Uuid,
    pub designer_id: Uuid,
    pub designer_username: String,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub category_slug: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<Decimal>,
    pub licensing_terms: Option<String>,
    pub design_files_link: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub average_rating: Decimal,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DesignResponse {
    #[serde(flatten)]
    pub design: Design,
    pub tags: Vec<Tag>,
    pub certifications: Vec<Certification>,
    pub tech_packs: Vec<TechPack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDesignRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub licensing_terms: Option<String>,
    #[serde(default)]
    pub design_files_link: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_verified: Option<bool>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    #[serde(default)]
    pub certification_ids: Vec<Uuid>,
}

impl CreateDesignRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        validate_design_fields(
            self.price,
            self.image_url.as_deref(),
            self.design_files_link.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDesignRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub price: Option<Decimal>,
    pub licensing_terms: Option<String>,
    pub design_files_link: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub tag_ids: Option<Vec<Uuid>>,
    pub certification_ids: Option<Vec<Uuid>>,
}

impl UpdateDesignRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_design_fields(
            self.price,
            self.image_url.as_deref(),
            self.design_files_link.as_deref(),
        )
    }
}

fn validate_design_fields(
    price: Option<Decimal>,
    image_url: Option<&str>,
    design_files_link: Option<&str>,
) -> Result<(), String> {
    if price.is_some_and(|p| p < Decimal::ZERO) {
        return Err("price cannot be negative".to_string());
    }
    validate_optional_url("image_url", image_url)?;
    validate_optional_url("design_files_link", design_files_link)
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TechPack {
    pub id: Uuid,
    pub design_id: Uuid,
    pub file_url: String,
    pub version: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTechPackRequest {
    pub file_url: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Accept absolute http(s) URLs only.
pub fn validate_url(field: &str, value: &str) -> Result<(), String> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(format!("{} must be a valid URL", field)),
    }
}

fn validate_optional_url(field: &str, value: Option<&str>) -> Result<(), String> {
    match value.filter(|v| !v.is_empty()) {
        Some(v) => validate_url(field, v),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_whitelisted() {
        let default = "created_at DESC, id ASC";
        assert_eq!(
            order_clause(Some("-price_per_unit"), MATERIAL_ORDERING, default),
            "price_per_unit DESC, id ASC"
        );
        assert_eq!(
            order_clause(Some("name"), MATERIAL_ORDERING, default),
            "name ASC, id ASC"
        );
        assert_eq!(
            order_clause(Some("name; DROP TABLE materials"), MATERIAL_ORDERING, default),
            default
        );
        assert_eq!(order_clause(None, MATERIAL_ORDERING, default), default);
        assert_eq!(order_clause(Some("price"), MATERIAL_ORDERING, default), default);
        assert_eq!(
            order_clause(Some("price"), DESIGN_ORDERING, default),
            "price ASC, id ASC"
        );
    }

    #[test]
    fn design_links_must_be_urls() {
        assert!(validate_url("design_files_link", "https://files.example.com/pack.zip").is_ok());
        assert!(validate_url("design_files_link", "ftp://files.example.com/pack.zip").is_err());
        assert!(validate_url("design_files_link", "not a url").is_err());
        assert!(validate_optional_url("image_url", Some("")).is_ok());
        assert!(validate_optional_url("image_url", None).is_ok());
    }

    #[test]
    fn material_numbers() {
        assert!(validate_material_numbers(Some(Decimal::ZERO), None, None).is_err());
        assert!(validate_material_numbers(Some(Decimal::new(1, 2)), Some(1), Some(0)).is_ok());
        assert!(validate_material_numbers(None, Some(0), None).is_err());
        assert!(validate_material_numbers(None, None, Some(-1)).is_err());
    }
}
