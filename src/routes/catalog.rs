//! Taxonomy routes: categories, tags and certifications
//!
//! Reads are public; writes are staff only.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireStaff;
use crate::domain::listings::{
    Category, CategoryResponse, Certification, CertificationRequest, CreateCategoryRequest,
    ListingFilter, SearchQuery, Tag, TagRequest, UpdateCategoryRequest,
};
use crate::error::ApiError;
use crate::services::slugs::{self, SlugTable};

use super::{designs, materials};

const CATEGORY_COLUMNS: &str = "id, name, slug, description, parent_id, created_at, updated_at";

const CATEGORY_WITH_CHILDREN: &str = r#"
    SELECT c.id, c.name, c.slug, c.description, c.parent_id, c.created_at, c.updated_at,
           ARRAY(SELECT s.id FROM categories s WHERE s.parent_id = c.id ORDER BY s.name)
               AS subcategory_ids
    FROM categories c
"#;

fn search_pattern(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s))
}

async fn category_by_slug(state: &AppState, slug: &str) -> Result<CategoryResponse, ApiError> {
    sqlx::query_as::<_, CategoryResponse>(&format!("{} WHERE c.slug = $1", CATEGORY_WITH_CHILDREN))
        .bind(slug)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Category not found"))
}

// ============================================================================
// Categories
// ============================================================================

/// GET /api/v1/categories
///
/// Top-level categories with the ids of their direct children.
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = sqlx::query_as::<_, CategoryResponse>(&format!(
        "{} WHERE c.parent_id IS NULL ORDER BY c.name",
        CATEGORY_WITH_CHILDREN
    ))
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(rows))
}

/// GET /api/v1/categories/:slug
pub async fn get_category(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(DataResponse::new(category_by_slug(&state, &slug).await?))
}

/// GET /api/v1/categories/:slug/subcategories
pub async fn list_subcategories(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let parent = category_by_slug(&state, &slug).await?;

    let rows = sqlx::query_as::<_, CategoryResponse>(&format!(
        "{} WHERE c.parent_id = $1 ORDER BY c.name",
        CATEGORY_WITH_CHILDREN
    ))
    .bind(parent.category.id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(rows))
}

/// GET /api/v1/categories/:slug/materials
///
/// Active materials in the category.
pub async fn list_category_materials(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let category = category_by_slug(&state, &slug).await?;
    let filter = ListingFilter {
        category: Some(category.category.slug),
        ..Default::default()
    };
    materials::query_materials(&state, None, &filter, &pagination).await
}

/// GET /api/v1/categories/:slug/designs
pub async fn list_category_designs(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let category = category_by_slug(&state, &slug).await?;
    let filter = ListingFilter {
        category: Some(category.category.slug),
        ..Default::default()
    };
    designs::query_designs(&state, None, &filter, &pagination).await
}

/// POST /api/v1/categories
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    staff: RequireStaff,
    Json(input): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let source = input.slug.as_deref().unwrap_or(&input.name);
    let slug = slugs::unique_slug(&state.db, SlugTable::Categories, source)
        .await
        .map_err(ApiError::database)?;

    let category = sqlx::query_as::<_, Category>(&format!(
        r#"
        INSERT INTO categories (name, slug, description, parent_id)
        VALUES ($1, $2, $3, $4)
        RETURNING {}
        "#,
        CATEGORY_COLUMNS
    ))
    .bind(input.name.trim())
    .bind(&slug)
    .bind(&input.description)
    .bind(input.parent_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    tracing::info!(category_id = %category.id, slug = %category.slug, staff_id = %staff.user_id, "Category created");

    Ok(Created(category))
}

/// PATCH /api/v1/categories/:slug
pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    _staff: RequireStaff,
    Json(input): Json<UpdateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let current = category_by_slug(&state, &slug).await?;

    if input.parent_id == Some(current.category.id) {
        return Err(ApiError::bad_request("A category cannot be its own parent"));
    }

    let category = sqlx::query_as::<_, Category>(&format!(
        r#"
        UPDATE categories SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            parent_id = COALESCE($4, parent_id),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        CATEGORY_COLUMNS
    ))
    .bind(current.category.id)
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.parent_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(category))
}

/// DELETE /api/v1/categories/:slug
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    staff: RequireStaff,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM categories WHERE slug = $1")
        .bind(&slug)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Category not found"));
    }

    tracing::info!(slug = %slug, staff_id = %staff.user_id, "Category deleted");
    Ok(NoContent)
}

// ============================================================================
// Tags
// ============================================================================

/// GET /api/v1/tags
pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tags = sqlx::query_as::<_, Tag>(
        r#"
        SELECT id, name, slug FROM tags
        WHERE ($1::text IS NULL OR name ILIKE $1)
        ORDER BY name
        "#,
    )
    .bind(search_pattern(&query.search))
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(tags))
}

/// POST /api/v1/tags
pub async fn create_tag(
    State(state): State<Arc<AppState>>,
    _staff: RequireStaff,
    Json(input): Json<TagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let slug = slugs::unique_slug(&state.db, SlugTable::Tags, name)
        .await
        .map_err(ApiError::database)?;

    let tag = sqlx::query_as::<_, Tag>(
        "INSERT INTO tags (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
    )
    .bind(name)
    .bind(&slug)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Created(tag))
}

/// PATCH /api/v1/tags/:id
pub async fn update_tag(
    State(state): State<Arc<AppState>>,
    Path(tag_id): Path<Uuid>,
    _staff: RequireStaff,
    Json(input): Json<TagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let tag = sqlx::query_as::<_, Tag>(
        "UPDATE tags SET name = $2 WHERE id = $1 RETURNING id, name, slug",
    )
    .bind(tag_id)
    .bind(name)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Tag not found"))?;

    Ok(DataResponse::new(tag))
}

/// DELETE /api/v1/tags/:id
pub async fn delete_tag(
    State(state): State<Arc<AppState>>,
    Path(tag_id): Path<Uuid>,
    _staff: RequireStaff,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM tags WHERE id = $1")
        .bind(tag_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Tag not found"));
    }
    Ok(NoContent)
}

// ============================================================================
// Certifications
// ============================================================================

/// GET /api/v1/certifications
pub async fn list_certifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = sqlx::query_as::<_, Certification>(
        r#"
        SELECT id, name, issuing_body, description FROM certifications
        WHERE ($1::text IS NULL OR name ILIKE $1 OR issuing_body ILIKE $1)
        ORDER BY name
        "#,
    )
    .bind(search_pattern(&query.search))
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(rows))
}

/// POST /api/v1/certifications
pub async fn create_certification(
    State(state): State<Arc<AppState>>,
    _staff: RequireStaff,
    Json(input): Json<CertificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let certification = sqlx::query_as::<_, Certification>(
        r#"
        INSERT INTO certifications (name, issuing_body, description)
        VALUES ($1, $2, $3)
        RETURNING id, name, issuing_body, description
        "#,
    )
    .bind(input.name.trim())
    .bind(&input.issuing_body)
    .bind(&input.description)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Created(certification))
}

/// PATCH /api/v1/certifications/:id
pub async fn update_certification(
    State(state): State<Arc<AppState>>,
    Path(certification_id): Path<Uuid>,
    _staff: RequireStaff,
    Json(input): Json<CertificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    let certification = sqlx::query_as::<_, Certification>(
        r#"
        UPDATE certifications SET
            name = $2,
            issuing_body = COALESCE($3, issuing_body),
            description = COALESCE($4, description),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, issuing_body, description
        "#,
    )
    .bind(certification_id)
    .bind(input.name.trim())
    .bind(&input.issuing_body)
    .bind(&input.description)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Certification not found"))?;

    Ok(DataResponse::new(certification))
}

/// DELETE /api/v1/certifications/:id
pub async fn delete_certification(
    State(state): State<Arc<AppState>>,
    Path(certification_id): Path<Uuid>,
    _staff: RequireStaff,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM certifications WHERE id = $1")
        .bind(certification_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Certification not found"));
    }
    Ok(NoContent)
}
