//! Design listing and tech pack routes

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::domain::accounts::Actor;
use crate::domain::listings::{
    order_clause, validate_url, CreateDesignRequest, CreateTechPackRequest, Design,
    ListingFilter, TechPack, UpdateDesignRequest, DESIGN_ORDERING,
};
use crate::error::ApiError;
use crate::services::listings::{self, LinkTable, DESIGN_SOURCE};
use crate::services::slugs::{self, SlugTable};

const DEFAULT_ORDER: &str = "created_at DESC, id ASC";

const DESIGN_FILTERS: &str = r#"
      AND ($3::text IS NULL OR category_slug = $3)
      AND ($4::text IS NULL OR designer_username = $4)
      AND ($5::numeric IS NULL OR price >= $5)
      AND ($6::numeric IS NULL OR price <= $6)
      AND ($7::text IS NULL OR title ILIKE $7 OR description ILIKE $7)
      AND ($8::bool IS NULL OR is_verified = $8)
"#;

/// Filtered, paginated design listing as seen by `viewer`.
pub async fn query_designs(
    state: &AppState,
    viewer: Option<&Actor>,
    filter: &ListingFilter,
    pagination: &PaginationParams,
) -> Result<Paginated<Design>, ApiError> {
    let (viewer_id, is_staff) = listings::viewer(viewer);
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s));
    // `designer` is the natural filter name here; `seller` is accepted too
    let designer = filter.designer.as_ref().or(filter.seller.as_ref());
    let where_clause = format!("WHERE {} {}", listings::visibility("designer_id"), DESIGN_FILTERS);

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} {}",
        DESIGN_SOURCE, where_clause
    ))
    .bind(viewer_id)
    .bind(is_staff)
    .bind(&filter.category)
    .bind(designer)
    .bind(filter.min_price)
    .bind(filter.max_price)
    .bind(&search)
    .bind(filter.is_verified)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let rows = sqlx::query_as::<_, Design>(&format!(
        "SELECT * FROM {} {} ORDER BY {} LIMIT $9 OFFSET $10",
        DESIGN_SOURCE,
        where_clause,
        order_clause(filter.ordering.as_deref(), DESIGN_ORDERING, DEFAULT_ORDER)
    ))
    .bind(viewer_id)
    .bind(is_staff)
    .bind(&filter.category)
    .bind(designer)
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

async fn visible_design(
    state: &AppState,
    slug: &str,
    viewer: Option<&Actor>,
) -> Result<Design, ApiError> {
    listings::fetch_design(&state.db, slug)
        .await
        .map_err(ApiError::database)?
        .filter(|d| d.is_active || viewer.is_some_and(|a| a.owns_or_staff(d.designer_id)))
        .ok_or_else(|| ApiError::not_found("Design not found"))
}

/// GET /api/v1/designs
pub async fn list_designs(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ListingFilter>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    query_designs(&state, user.actor(), &filter, &pagination).await
}

/// GET /api/v1/designs/:slug
pub async fn get_design(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    let design = visible_design(&state, &slug, user.actor()).await?;
    let response = listings::design_response(&state.db, design)
        .await
        .map_err(ApiError::database)?;
    Ok(DataResponse::new(response))
}

/// POST /api/v1/designs
pub async fn create_design(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateDesignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.can_list_designs() {
        return Err(ApiError::forbidden("Only designers and staff can list designs"));
    }
    if input.is_verified.is_some() && !user.is_staff {
        return Err(ApiError::forbidden("Only staff can verify listings"));
    }
    input.validate().map_err(ApiError::bad_request)?;

    let slug = slugs::unique_slug(&state.db, SlugTable::Designs, &input.title)
        .await
        .map_err(ApiError::database)?;

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;

    let design_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO designs (
            designer_id, title, slug, description, category_id, image_url, price,
            licensing_terms, design_files_link, is_active, is_verified
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, COALESCE($10, TRUE), COALESCE($11, FALSE))
        RETURNING id
        "#,
    )
    .bind(user.user_id)
    .bind(input.title.trim())
    .bind(&slug)
    .bind(&input.description)
    .bind(input.category_id)
    .bind(&input.image_url)
    .bind(input.price)
    .bind(&input.licensing_terms)
    .bind(&input.design_files_link)
    .bind(input.is_active)
    .bind(input.is_verified)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    listings::set_links(&mut tx, LinkTable::DesignTags, design_id, &input.tag_ids)
        .await
        .map_err(ApiError::database)?;
    listings::set_links(
        &mut tx,
        LinkTable::DesignCertifications,
        design_id,
        &input.certification_ids,
    )
    .await
    .map_err(ApiError::database)?;

    tx.commit().await.map_err(ApiError::database)?;

    tracing::info!(design_id = %design_id, designer_id = %user.user_id, slug = %slug, "Design listed");

    let design = visible_design(&state, &slug, Some(&user.actor)).await?;
    let response = listings::design_response(&state.db, design)
        .await
        .map_err(ApiError::database)?;
    Ok(Created(response))
}

/// PATCH /api/v1/designs/:slug
pub async fn update_design(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    user: CurrentUser,
    Json(input): Json<UpdateDesignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let current = visible_design(&state, &slug, Some(&user.actor)).await?;
    if !user.owns_or_staff(current.designer_id) {
        return Err(ApiError::forbidden("You can only edit your own designs"));
    }
    if input.is_verified.is_some() && !user.is_staff {
        return Err(ApiError::forbidden("Only staff can verify listings"));
    }
    input.validate().map_err(ApiError::bad_request)?;

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;

    sqlx::query(
        r#"
        UPDATE designs SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            category_id = COALESCE($4, category_id),
            image_url = COALESCE($5, image_url),
            price = COALESCE($6, price),
            licensing_terms = COALESCE($7, licensing_terms),
            design_files_link = COALESCE($8, design_files_link),
            is_active = COALESCE($9, is_active),
            is_verified = COALESCE($10, is_verified),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(current.id)
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.category_id)
    .bind(&input.image_url)
    .bind(input.price)
    .bind(&input.licensing_terms)
    .bind(&input.design_files_link)
    .bind(input.is_active)
    .bind(input.is_verified)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    if let Some(ref tag_ids) = input.tag_ids {
        listings::set_links(&mut tx, LinkTable::DesignTags, current.id, tag_ids)
            .await
            .map_err(ApiError::database)?;
    }
    if let Some(ref certification_ids) = input.certification_ids {
        listings::set_links(
            &mut tx,
            LinkTable::DesignCertifications,
            current.id,
            certification_ids,
        )
        .await
        .map_err(ApiError::database)?;
    }

    tx.commit().await.map_err(ApiError::database)?;

    let design = visible_design(&state, &slug, Some(&user.actor)).await?;
    let response = listings::design_response(&state.db, design)
        .await
        .map_err(ApiError::database)?;
    Ok(DataResponse::new(response))
}

/// DELETE /api/v1/designs/:slug
pub async fn delete_design(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let current = visible_design(&state, &slug, Some(&user.actor)).await?;
    if !user.owns_or_staff(current.designer_id) {
        return Err(ApiError::forbidden("You can only delete your own designs"));
    }

    sqlx::query("DELETE FROM designs WHERE id = $1")
        .bind(current.id)
        .execute(&state.db)
        .await
        .map_err(|e| match ApiError::database(e) {
            ApiError::BadRequest(_) => ApiError::conflict("Design has orders; deactivate it instead"),
            other => other,
        })?;

    tracing::info!(design_id = %current.id, user_id = %user.user_id, "Design deleted");
    Ok(NoContent)
}

// ============================================================================
// Tech packs
// ============================================================================

/// GET /api/v1/designs/:slug/tech-packs
pub async fn list_tech_packs(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    let design = visible_design(&state, &slug, user.actor()).await?;
    let packs = listings::tech_packs(&state.db, design.id)
        .await
        .map_err(ApiError::database)?;
    Ok(DataResponse::new(packs))
}

/// POST /api/v1/designs/:slug/tech-packs
pub async fn add_tech_pack(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    user: CurrentUser,
    Json(input): Json<CreateTechPackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let design = visible_design(&state, &slug, Some(&user.actor)).await?;
    if !user.owns_or_staff(design.designer_id) {
        return Err(ApiError::forbidden(
            "Only the designer can add tech packs to this design",
        ));
    }
    validate_url("file_url", &input.file_url).map_err(ApiError::bad_request)?;

    let pack = sqlx::query_as::<_, TechPack>(
        r#"
        INSERT INTO tech_packs (design_id, file_url, version, notes)
        VALUES ($1, $2, COALESCE($3, '1.0'), $4)
        RETURNING id, design_id, file_url, version, notes, created_at
        "#,
    )
    .bind(design.id)
    .bind(&input.file_url)
    .bind(&input.version)
    .bind(&input.notes)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    tracing::info!(design_id = %design.id, tech_pack_id = %pack.id, "Tech pack added");
    Ok(Created(pack))
}
