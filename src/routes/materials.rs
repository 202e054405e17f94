//! Material listing routes
//!
//! Anyone may browse active materials; owners and staff also see inactive
//! ones. Suppliers and staff create listings, and only staff may mark a
//! listing verified.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::api::{Created, DataResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::domain::accounts::Actor;
use crate::domain::listings::{
    order_clause, CreateMaterialRequest, ListingFilter, Material, UpdateMaterialRequest,
    MATERIAL_ORDERING,
};
use crate::error::ApiError;
use crate::services::listings::{self, LinkTable, MATERIAL_SOURCE};
use crate::services::slugs::{self, SlugTable};

const DEFAULT_ORDER: &str = "created_at DESC, id ASC";

const MATERIAL_FILTERS: &str = r#"
      AND ($3::text IS NULL OR category_slug = $3)
      AND ($4::text IS NULL OR seller_username = $4)
      AND ($5::numeric IS NULL OR price_per_unit >= $5)
      AND ($6::numeric IS NULL OR price_per_unit <= $6)
      AND ($7::text IS NULL OR name ILIKE $7 OR description ILIKE $7 OR composition ILIKE $7)
      AND ($8::bool IS NULL OR is_verified = $8)
"#;

/// Filtered, paginated material listing as seen by `viewer`.
pub async fn query_materials(
    state: &AppState,
    viewer: Option<&Actor>,
    filter: &ListingFilter,
    pagination: &PaginationParams,
) -> Result<Paginated<Material>, ApiError> {
    let (viewer_id, is_staff) = listings::viewer(viewer);
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s));
    let where_clause = format!("WHERE {} {}", listings::visibility("seller_id"), MATERIAL_FILTERS);

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} {}",
        MATERIAL_SOURCE, where_clause
    ))
    .bind(viewer_id)
    .bind(is_staff)
    .bind(&filter.category)
    .bind(&filter.seller)
    .bind(filter.min_price)
    .bind(filter.max_price)
    .bind(&search)
    .bind(filter.is_verified)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let rows = sqlx::query_as::<_, Material>(&format!(
        "SELECT * FROM {} {} ORDER BY {} LIMIT $9 OFFSET $10",
        MATERIAL_SOURCE,
        where_clause,
        order_clause(filter.ordering.as_deref(), MATERIAL_ORDERING, DEFAULT_ORDER)
    ))
    .bind(viewer_id)
    .bind(is_staff)
    .bind(&filter.category)
    .bind(&filter.seller)
    .bind(filter.min_price)
    .bind(filter.max_price)
    .bind(&search)
    .bind(filter.is_verified)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(rows, pagination, total))
}

async fn visible_material(
    state: &AppState,
    slug: &str,
    viewer: Option<&Actor>,
) -> Result<Material, ApiError> {
    listings::fetch_material(&state.db, slug)
        .await
        .map_err(ApiError::database)?
        .filter(|m| m.is_active || viewer.is_some_and(|a| a.owns_or_staff(m.seller_id)))
        .ok_or_else(|| ApiError::not_found("Material not found"))
}

/// GET /api/v1/materials
pub async fn list_materials(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ListingFilter>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    query_materials(&state, user.actor(), &filter, &pagination).await
}

/// GET /api/v1/materials/:slug
pub async fn get_material(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    let material = visible_material(&state, &slug, user.actor()).await?;
    let response = listings::material_response(&state.db, material)
        .await
        .map_err(ApiError::database)?;
    Ok(DataResponse::new(response))
}

/// POST /api/v1/materials
pub async fn create_material(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateMaterialRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.can_list_materials() {
        return Err(ApiError::forbidden(
            "Only sellers, manufacturers and staff can list materials",
        ));
    }
    if input.is_verified.is_some() && !user.is_staff {
        return Err(ApiError::forbidden("Only staff can verify listings"));
    }
    input.validate().map_err(ApiError::bad_request)?;

    let slug = slugs::unique_slug(&state.db, SlugTable::Materials, &input.name)
        .await
        .map_err(ApiError::database)?;

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;

    let material_id: uuid::Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO materials (
            seller_id, name, slug, description, category_id, image_url, price_per_unit, unit,
            minimum_order_quantity, stock_quantity, sku, composition, weight_gsm, width_cm,
            country_of_origin, lead_time_days, is_active, is_verified
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, 'meter'), COALESCE($9, 1),
                COALESCE($10, 0), $11, $12, $13, $14, $15, $16, COALESCE($17, TRUE),
                COALESCE($18, FALSE))
        RETURNING id
        "#,
    )
    .bind(user.user_id)
    .bind(input.name.trim())
    .bind(&slug)
    .bind(&input.description)
    .bind(input.category_id)
    .bind(&input.image_url)
    .bind(input.price_per_unit)
    .bind(&input.unit)
    .bind(input.minimum_order_quantity)
    .bind(input.stock_quantity)
    .bind(&input.sku)
    .bind(&input.composition)
    .bind(input.weight_gsm)
    .bind(input.width_cm)
    .bind(&input.country_of_origin)
    .bind(input.lead_time_days)
    .bind(input.is_active)
    .bind(input.is_verified)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    listings::set_links(&mut tx, LinkTable::MaterialTags, material_id, &input.tag_ids)
        .await
        .map_err(ApiError::database)?;
    listings::set_links(
        &mut tx,
        LinkTable::MaterialCertifications,
        material_id,
        &input.certification_ids,
    )
    .await
    .map_err(ApiError::database)?;

    tx.commit().await.map_err(ApiError::database)?;

    tracing::info!(material_id = %material_id, seller_id = %user.user_id, slug = %slug, "Material listed");

    let material = visible_material(&state, &slug, Some(&user.actor)).await?;
    let response = listings::material_response(&state.db, material)
        .await
        .map_err(ApiError::database)?;
    Ok(Created(response))
}

/// PATCH /api/v1/materials/:slug
pub async fn update_material(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    user: CurrentUser,
    Json(input): Json<UpdateMaterialRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let current = visible_material(&state, &slug, Some(&user.actor)).await?;
    if !user.owns_or_staff(current.seller_id) {
        return Err(ApiError::forbidden("You can only edit your own listings"));
    }
    if input.is_verified.is_some() && !user.is_staff {
        return Err(ApiError::forbidden("Only staff can verify listings"));
    }
    input.validate().map_err(ApiError::bad_request)?;

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;

    sqlx::query(
        r#"
        UPDATE materials SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            category_id = COALESCE($4, category_id),
            image_url = COALESCE($5, image_url),
            price_per_unit = COALESCE($6, price_per_unit),
            unit = COALESCE($7, unit),
            minimum_order_quantity = COALESCE($8, minimum_order_quantity),
            stock_quantity = COALESCE($9, stock_quantity),
            sku = COALESCE($10, sku),
            composition = COALESCE($11, composition),
            weight_gsm = COALESCE($12, weight_gsm),
            width_cm = COALESCE($13, width_cm),
            country_of_origin = COALESCE($14, country_of_origin),
            lead_time_days = COALESCE($15, lead_time_days),
            is_active = COALESCE($16, is_active),
            is_verified = COALESCE($17, is_verified),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(current.id)
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.category_id)
    .bind(&input.image_url)
    .bind(input.price_per_unit)
    .bind(&input.unit)
    .bind(input.minimum_order_quantity)
    .bind(input.stock_quantity)
    .bind(&input.sku)
    .bind(&input.composition)
    .bind(input.weight_gsm)
    .bind(input.width_cm)
    .bind(&input.country_of_origin)
    .bind(input.lead_time_days)
    .bind(input.is_active)
    .bind(input.is_verified)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    if let Some(ref tag_ids) = input.tag_ids {
        listings::set_links(&mut tx, LinkTable::MaterialTags, current.id, tag_ids)
            .await
            .map_err(ApiError::database)?;
    }
    if let Some(ref certification_ids) = input.certification_ids {
        listings::set_links(
            &mut tx,
            LinkTable::MaterialCertifications,
            current.id,
            certification_ids,
        )
        .await
        .map_err(ApiError::database)?;
    }

    tx.commit().await.map_err(ApiError::database)?;

    let material = visible_material(&state, &slug, Some(&user.actor)).await?;
    let response = listings::material_response(&state.db, material)
        .await
        .map_err(ApiError::database)?;
    Ok(DataResponse::new(response))
}

/// DELETE /api/v1/materials/:slug
pub async fn delete_material(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let current = visible_material(&state, &slug, Some(&user.actor)).await?;
    if !user.owns_or_staff(current.seller_id) {
        return Err(ApiError::forbidden("You can only delete your own listings"));
    }

    sqlx::query("DELETE FROM materials WHERE id = $1")
        .bind(current.id)
        .execute(&state.db)
        .await
        .map_err(|e| match ApiError::database(e) {
            // order lines keep a RESTRICT reference
            ApiError::BadRequest(_) => {
                ApiError::conflict("Material has orders; deactivate it instead")
            }
            other => other,
        })?;

    tracing::info!(material_id = %current.id, user_id = %user.user_id, "Material deleted");
    Ok(NoContent)
}
