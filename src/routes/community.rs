//! Forum and showcase routes

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{CurrentUser, MaybeUser, RequireStaff};
use crate::domain::community::{
    can_post_in, CreateForumPostRequest, CreateForumThreadRequest, CreateShowcaseItemRequest,
    CreateShowcaseRequest, ForumCategory, ForumCategoryRequest, ForumPost, ForumPostFilter,
    ForumThread, ForumThreadFilter, Showcase, ShowcaseItem, ShowcaseItemType, ShowcaseResponse,
    UpdateForumPostRequest, UpdateForumThreadRequest, UpdateShowcaseItemRequest,
    UpdateShowcaseRequest,
};
use crate::domain::listings::validate_url;
use crate::error::ApiError;
use crate::services::slugs::{self, SlugTable};

const CATEGORY_SOURCE: &str = r#"
    (SELECT fc.id, fc.name, fc.slug, fc.description,
            (SELECT COUNT(*) FROM forum_threads ft WHERE ft.category_id = fc.id) AS thread_count,
            fc.created_at
     FROM forum_categories fc) AS category
"#;

const THREAD_SOURCE: &str = r#"
    (SELECT t.id, t.category_id, c.slug AS category_slug, t.author_id,
            p.username AS author_username, t.title, t.slug, t.is_pinned, t.is_locked,
            t.views_count,
            (SELECT COUNT(*) FROM forum_posts fp WHERE fp.thread_id = t.id) AS post_count,
            t.created_at, t.updated_at
     FROM forum_threads t
     JOIN forum_categories c ON c.id = t.category_id
     JOIN profiles p ON p.id = t.author_id) AS thread
"#;

const POST_SOURCE: &str = r#"
    (SELECT fp.id, fp.thread_id, fp.author_id, p.username AS author_username, fp.content,
            fp.is_edited, fp.created_at, fp.updated_at
     FROM forum_posts fp
     JOIN profiles p ON p.id = fp.author_id) AS post
"#;

const SHOWCASE_SOURCE: &str = r#"
    (SELECT s.id, s.user_id, p.username, s.title, s.slug, s.description, s.is_public,
            s.created_at, s.updated_at
     FROM showcases s
     JOIN profiles p ON p.id = s.user_id) AS showcase
"#;

const ITEM_COLUMNS: &str =
    "id, showcase_id, item_type, title, url, description, display_order, created_at";

// ============================================================================
// Forum categories
// ============================================================================

async fn category_by_slug(db: &PgPool, slug: &str) -> Result<ForumCategory, ApiError> {
    sqlx::query_as::<_, ForumCategory>(&format!("SELECT * FROM {} WHERE slug = $1", CATEGORY_SOURCE))
        .bind(slug)
        .fetch_optional(db)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Forum category not found"))
}

/// GET /api/v1/forum/categories
pub async fn list_forum_categories(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let categories =
        sqlx::query_as::<_, ForumCategory>(&format!("SELECT * FROM {} ORDER BY name", CATEGORY_SOURCE))
            .fetch_all(&state.db)
            .await
            .map_err(ApiError::database)?;
    Ok(DataResponse::new(categories))
}

/// GET /api/v1/forum/categories/:slug
pub async fn get_forum_category(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(DataResponse::new(category_by_slug(&state.db, &slug).await?))
}

/// POST /api/v1/forum/categories
pub async fn create_forum_category(
    State(state): State<Arc<AppState>>,
    _staff: RequireStaff,
    Json(input): Json<ForumCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    let slug = slugs::unique_slug(&state.db, SlugTable::ForumCategories, name)
        .await
        .map_err(ApiError::database)?;

    sqlx::query("INSERT INTO forum_categories (name, slug, description) VALUES ($1, $2, $3)")
        .bind(name)
        .bind(&slug)
        .bind(&input.description)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    Ok(Created(category_by_slug(&state.db, &slug).await?))
}

/// PATCH /api/v1/forum/categories/:slug
pub async fn update_forum_category(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    _staff: RequireStaff,
    Json(input): Json<ForumCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let current = category_by_slug(&state.db, &slug).await?;
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }

    sqlx::query(
        r#"
        UPDATE forum_categories SET
            name = $2,
            description = COALESCE($3, description),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(current.id)
    .bind(name)
    .bind(&input.description)
    .execute(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(category_by_slug(&state.db, &slug).await?))
}

/// DELETE /api/v1/forum/categories/:slug
pub async fn delete_forum_category(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    staff: RequireStaff,
) -> Result<impl IntoResponse, ApiError> {
    let current = category_by_slug(&state.db, &slug).await?;

    sqlx::query("DELETE FROM forum_categories WHERE id = $1")
        .bind(current.id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    tracing::info!(category_id = %current.id, staff_id = %staff.user_id, "Forum category deleted");
    Ok(NoContent)
}

// ============================================================================
// Forum threads
// ============================================================================

async fn thread_by_slug(db: &PgPool, slug: &str) -> Result<ForumThread, ApiError> {
    sqlx::query_as::<_, ForumThread>(&format!("SELECT * FROM {} WHERE slug = $1", THREAD_SOURCE))
        .bind(slug)
        .fetch_optional(db)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Thread not found"))
}

async fn thread_by_id(db: &PgPool, thread_id: Uuid) -> Result<ForumThread, ApiError> {
    sqlx::query_as::<_, ForumThread>(&format!("SELECT * FROM {} WHERE id = $1", THREAD_SOURCE))
        .bind(thread_id)
        .fetch_optional(db)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Thread not found"))
}

/// GET /api/v1/forum/threads
///
/// Pinned threads first, then by latest activity.
pub async fn list_forum_threads(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ForumThreadFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s));
    let where_clause = r#"
        WHERE ($1::text IS NULL OR category_slug = $1)
          AND ($2::text IS NULL OR author_username = $2)
          AND ($3::text IS NULL OR title ILIKE $3)
    "#;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} {}",
        THREAD_SOURCE, where_clause
    ))
    .bind(&filter.category)
    .bind(&filter.author)
    .bind(&search)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let threads = sqlx::query_as::<_, ForumThread>(&format!(
        "SELECT * FROM {} {} ORDER BY is_pinned DESC, updated_at DESC LIMIT $4 OFFSET $5",
        THREAD_SOURCE, where_clause
    ))
    .bind(&filter.category)
    .bind(&filter.author)
    .bind(&search)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(threads, &pagination, total))
}

/// GET /api/v1/forum/threads/:slug
///
/// Each retrieval counts as a view.
pub async fn get_forum_thread(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = sqlx::query("UPDATE forum_threads SET views_count = views_count + 1 WHERE slug = $1")
        .bind(&slug)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("Thread not found"));
    }

    Ok(DataResponse::new(thread_by_slug(&state.db, &slug).await?))
}

/// POST /api/v1/forum/threads
///
/// Creates the thread together with its opening post.
pub async fn create_forum_thread(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateForumThreadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    input.validate().map_err(ApiError::bad_request)?;

    let slug = slugs::unique_slug(&state.db, SlugTable::ForumThreads, &input.title)
        .await
        .map_err(ApiError::database)?;

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;

    let thread_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO forum_threads (category_id, author_id, title, slug)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(input.category_id)
    .bind(user.user_id)
    .bind(input.title.trim())
    .bind(&slug)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    sqlx::query("INSERT INTO forum_posts (thread_id, author_id, content) VALUES ($1, $2, $3)")
        .bind(thread_id)
        .bind(user.user_id)
        .bind(input.content.trim())
        .execute(&mut *tx)
        .await
        .map_err(ApiError::database)?;

    tx.commit().await.map_err(ApiError::database)?;

    tracing::info!(thread_id = %thread_id, author_id = %user.user_id, slug = %slug, "Forum thread created");

    Ok(Created(thread_by_id(&state.db, thread_id).await?))
}

/// PATCH /api/v1/forum/threads/:slug
pub async fn update_forum_thread(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    user: CurrentUser,
    Json(input): Json<UpdateForumThreadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let thread = thread_by_slug(&state.db, &slug).await?;
    if !user.owns_or_staff(thread.author_id) {
        return Err(ApiError::forbidden("You can only edit your own threads"));
    }
    if input.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("title cannot be empty"));
    }

    sqlx::query(
        r#"
        UPDATE forum_threads SET
            title = COALESCE($2, title),
            category_id = COALESCE($3, category_id),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(thread.id)
    .bind(input.title.as_deref().map(str::trim))
    .bind(input.category_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(thread_by_id(&state.db, thread.id).await?))
}

/// DELETE /api/v1/forum/threads/:slug
pub async fn delete_forum_thread(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let thread = thread_by_slug(&state.db, &slug).await?;
    if !user.owns_or_staff(thread.author_id) {
        return Err(ApiError::forbidden("You can only delete your own threads"));
    }

    sqlx::query("DELETE FROM forum_threads WHERE id = $1")
        .bind(thread.id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    tracing::info!(thread_id = %thread.id, user_id = %user.user_id, "Forum thread deleted");
    Ok(NoContent)
}

/// Column that a staff toggle flips
#[derive(Debug, Clone, Copy)]
enum ThreadFlag {
    Pinned,
    Locked,
}

impl ThreadFlag {
    fn column(self) -> &'static str {
        match self {
            Self::Pinned => "is_pinned",
            Self::Locked => "is_locked",
        }
    }
}

async fn toggle_thread_flag(
    state: &AppState,
    slug: &str,
    flag: ThreadFlag,
    staff: &RequireStaff,
) -> Result<ForumThread, ApiError> {
    let column = flag.column();
    let thread_id: Uuid = sqlx::query_scalar(&format!(
        "UPDATE forum_threads SET {col} = NOT {col} WHERE slug = $1 RETURNING id",
        col = column
    ))
    .bind(slug)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Thread not found"))?;

    tracing::info!(thread_id = %thread_id, flag = column, staff_id = %staff.user_id, "Forum thread flag toggled");
    thread_by_id(&state.db, thread_id).await
}

/// POST /api/v1/forum/threads/:slug/toggle-pin
pub async fn toggle_pin(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    staff: RequireStaff,
) -> Result<impl IntoResponse, ApiError> {
    Ok(DataResponse::new(
        toggle_thread_flag(&state, &slug, ThreadFlag::Pinned, &staff).await?,
    ))
}

/// POST /api/v1/forum/threads/:slug/toggle-lock
pub async fn toggle_lock(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    staff: RequireStaff,
) -> Result<impl IntoResponse, ApiError> {
    Ok(DataResponse::new(
        toggle_thread_flag(&state, &slug, ThreadFlag::Locked, &staff).await?,
    ))
}

// ============================================================================
// Forum posts
// ============================================================================

async fn fetch_post(db: &PgPool, post_id: Uuid) -> Result<ForumPost, ApiError> {
    sqlx::query_as::<_, ForumPost>(&format!("SELECT * FROM {} WHERE id = $1", POST_SOURCE))
        .bind(post_id)
        .fetch_optional(db)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Post not found"))
}

/// GET /api/v1/forum/posts
pub async fn list_forum_posts(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ForumPostFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE ($1::uuid IS NULL OR thread_id = $1)",
        POST_SOURCE
    ))
    .bind(filter.thread_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let posts = sqlx::query_as::<_, ForumPost>(&format!(
        r#"
        SELECT * FROM {} WHERE ($1::uuid IS NULL OR thread_id = $1)
        ORDER BY created_at, id
        LIMIT $2 OFFSET $3
        "#,
        POST_SOURCE
    ))
    .bind(filter.thread_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(posts, &pagination, total))
}

/// GET /api/v1/forum/posts/:id
pub async fn get_forum_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(DataResponse::new(fetch_post(&state.db, post_id).await?))
}

/// POST /api/v1/forum/posts
pub async fn create_forum_post(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateForumPostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = input.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }

    let thread = thread_by_id(&state.db, input.thread_id).await?;
    if !can_post_in(thread.is_locked, &user.actor) {
        return Err(ApiError::forbidden("This thread is locked"));
    }

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;

    let post_id: Uuid = sqlx::query_scalar(
        "INSERT INTO forum_posts (thread_id, author_id, content) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(thread.id)
    .bind(user.user_id)
    .bind(content)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    sqlx::query("UPDATE forum_threads SET updated_at = NOW() WHERE id = $1")
        .bind(thread.id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::database)?;

    tx.commit().await.map_err(ApiError::database)?;

    Ok(Created(fetch_post(&state.db, post_id).await?))
}

/// PATCH /api/v1/forum/posts/:id
pub async fn update_forum_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<UpdateForumPostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post = fetch_post(&state.db, post_id).await?;
    if !user.owns_or_staff(post.author_id) {
        return Err(ApiError::forbidden("You can only edit your own posts"));
    }
    let content = input.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }

    sqlx::query(
        "UPDATE forum_posts SET content = $2, is_edited = TRUE, updated_at = NOW() WHERE id = $1",
    )
    .bind(post.id)
    .bind(content)
    .execute(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(fetch_post(&state.db, post.id).await?))
}

/// DELETE /api/v1/forum/posts/:id
pub async fn delete_forum_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let post = fetch_post(&state.db, post_id).await?;
    if !user.owns_or_staff(post.author_id) {
        return Err(ApiError::forbidden("You can only delete your own posts"));
    }

    sqlx::query("DELETE FROM forum_posts WHERE id = $1")
        .bind(post.id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    Ok(NoContent)
}

// ============================================================================
// Showcases
// ============================================================================

async fn fetch_showcase(db: &PgPool, showcase_id: Uuid) -> Result<Option<Showcase>, ApiError> {
    sqlx::query_as::<_, Showcase>(&format!("SELECT * FROM {} WHERE id = $1", SHOWCASE_SOURCE))
        .bind(showcase_id)
        .fetch_optional(db)
        .await
        .map_err(ApiError::database)
}

async fn showcase_response(db: &PgPool, showcase: Showcase) -> Result<ShowcaseResponse, ApiError> {
    let items = sqlx::query_as::<_, ShowcaseItem>(&format!(
        "SELECT {} FROM showcase_items WHERE showcase_id = $1 ORDER BY display_order, created_at",
        ITEM_COLUMNS
    ))
    .bind(showcase.id)
    .fetch_all(db)
    .await
    .map_err(ApiError::database)?;

    Ok(ShowcaseResponse { showcase, items })
}

/// Load a showcase the caller owns (or any, for staff).
async fn owned_showcase(
    state: &AppState,
    showcase_id: Uuid,
    user: &CurrentUser,
) -> Result<Showcase, ApiError> {
    let showcase = fetch_showcase(&state.db, showcase_id)
        .await?
        .filter(|s| s.visible_to(Some(&user.actor)))
        .ok_or_else(|| ApiError::not_found("Showcase not found"))?;
    if !user.owns_or_staff(showcase.user_id) {
        return Err(ApiError::forbidden("You can only change your own showcases"));
    }
    Ok(showcase)
}

/// GET /api/v1/showcases
///
/// Public showcases plus the caller's own; staff see everything.
pub async fn list_showcases(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = user.actor();
    let viewer_id = viewer.map(|a| a.user_id);
    let is_staff = viewer.is_some_and(|a| a.is_staff);
    let where_clause = "WHERE (is_public OR user_id = $1 OR $2)";

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} {}",
        SHOWCASE_SOURCE, where_clause
    ))
    .bind(viewer_id)
    .bind(is_staff)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let showcases = sqlx::query_as::<_, Showcase>(&format!(
        "SELECT * FROM {} {} ORDER BY updated_at DESC LIMIT $3 OFFSET $4",
        SHOWCASE_SOURCE, where_clause
    ))
    .bind(viewer_id)
    .bind(is_staff)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(showcases, &pagination, total))
}

/// GET /api/v1/showcases/:id
pub async fn get_showcase(
    State(state): State<Arc<AppState>>,
    Path(showcase_id): Path<Uuid>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    let showcase = fetch_showcase(&state.db, showcase_id)
        .await?
        .filter(|s| s.visible_to(user.actor()))
        .ok_or_else(|| ApiError::not_found("Showcase not found"))?;
    Ok(DataResponse::new(showcase_response(&state.db, showcase).await?))
}

/// POST /api/v1/showcases
pub async fn create_showcase(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateShowcaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }
    let slug = slugs::unique_slug(&state.db, SlugTable::Showcases(user.user_id), title)
        .await
        .map_err(ApiError::database)?;

    let showcase_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO showcases (user_id, title, slug, description, is_public)
        VALUES ($1, $2, $3, $4, COALESCE($5, TRUE))
        RETURNING id
        "#,
    )
    .bind(user.user_id)
    .bind(title)
    .bind(&slug)
    .bind(&input.description)
    .bind(input.is_public)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let showcase = fetch_showcase(&state.db, showcase_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Showcase not found"))?;
    Ok(Created(showcase_response(&state.db, showcase).await?))
}

/// PATCH /api/v1/showcases/:id
pub async fn update_showcase(
    State(state): State<Arc<AppState>>,
    Path(showcase_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<UpdateShowcaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let showcase = owned_showcase(&state, showcase_id, &user).await?;
    if input.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("title cannot be empty"));
    }

    sqlx::query(
        r#"
        UPDATE showcases SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            is_public = COALESCE($4, is_public),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(showcase.id)
    .bind(input.title.as_deref().map(str::trim))
    .bind(&input.description)
    .bind(input.is_public)
    .execute(&state.db)
    .await
    .map_err(ApiError::database)?;

    let showcase = fetch_showcase(&state.db, showcase.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Showcase not found"))?;
    Ok(DataResponse::new(showcase_response(&state.db, showcase).await?))
}

/// DELETE /api/v1/showcases/:id
pub async fn delete_showcase(
    State(state): State<Arc<AppState>>,
    Path(showcase_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let showcase = owned_showcase(&state, showcase_id, &user).await?;

    sqlx::query("DELETE FROM showcases WHERE id = $1")
        .bind(showcase.id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    Ok(NoContent)
}

/// POST /api/v1/showcases/:id/items
pub async fn add_showcase_item(
    State(state): State<Arc<AppState>>,
    Path(showcase_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<CreateShowcaseItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let showcase = owned_showcase(&state, showcase_id, &user).await?;
    validate_url("url", &input.url).map_err(ApiError::bad_request)?;

    let item = sqlx::query_as::<_, ShowcaseItem>(&format!(
        r#"
        INSERT INTO showcase_items (showcase_id, item_type, title, url, description, display_order)
        VALUES ($1, $2, $3, $4, $5, COALESCE($6, 0))
        RETURNING {}
        "#,
        ITEM_COLUMNS
    ))
    .bind(showcase.id)
    .bind(input.item_type.unwrap_or(ShowcaseItemType::Image))
    .bind(&input.title)
    .bind(&input.url)
    .bind(&input.description)
    .bind(input.display_order)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Created(item))
}

/// PATCH /api/v1/showcases/:id/items/:item_id
pub async fn update_showcase_item(
    State(state): State<Arc<AppState>>,
    Path((showcase_id, item_id)): Path<(Uuid, Uuid)>,
    user: CurrentUser,
    Json(input): Json<UpdateShowcaseItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let showcase = owned_showcase(&state, showcase_id, &user).await?;
    if let Some(ref url) = input.url {
        validate_url("url", url).map_err(ApiError::bad_request)?;
    }

    let item = sqlx::query_as::<_, ShowcaseItem>(&format!(
        r#"
        UPDATE showcase_items SET
            item_type = COALESCE($3, item_type),
            title = COALESCE($4, title),
            url = COALESCE($5, url),
            description = COALESCE($6, description),
            display_order = COALESCE($7, display_order),
            updated_at = NOW()
        WHERE id = $1 AND showcase_id = $2
        RETURNING {}
        "#,
        ITEM_COLUMNS
    ))
    .bind(item_id)
    .bind(showcase.id)
    .bind(input.item_type)
    .bind(&input.title)
    .bind(&input.url)
    .bind(&input.description)
    .bind(input.display_order)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Showcase item not found"))?;

    Ok(DataResponse::new(item))
}

/// DELETE /api/v1/showcases/:id/items/:item_id
pub async fn delete_showcase_item(
    State(state): State<Arc<AppState>>,
    Path((showcase_id, item_id)): Path<(Uuid, Uuid)>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let showcase = owned_showcase(&state, showcase_id, &user).await?;

    let deleted = sqlx::query("DELETE FROM showcase_items WHERE id = $1 AND showcase_id = $2")
        .bind(item_id)
        .bind(showcase.id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::not_found("Showcase item not found"));
    }
    Ok(NoContent)
}
