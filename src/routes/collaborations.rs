//! Project collaboration routes: projects, members, tasks, files, comments
//! and message threads.
//!
//! Everything inside a project is visible to its members; the owner (or
//! staff) manages the project itself and its membership.

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
use crate::auth::CurrentUser;
use crate::domain::collaborations::{
    thread_participants, Comment, CommentFilter, CommentParent, CreateCommentRequest,
    CreateProjectFileRequest, CreateProjectRequest, CreateTaskRequest, CreateThreadRequest,
    MemberRequest, Message, Project, ProjectFile, ProjectFilter, ProjectMember, ProjectResponse,
    ProjectStatus, SendMessageRequest, Task, TaskFilter, TaskStatus, ThreadResponse,
    UpdateCommentRequest, UpdateProjectRequest, UpdateTaskRequest, DEFAULT_TASK_PRIORITY,
};
use crate::domain::listings::validate_url;
use crate::error::ApiError;
use crate::services::notifications;

const PROJECT_COLUMNS: &str = r#"
    id, name, description, owner_id, status, start_date, due_date, related_order_id,
    created_at, updated_at
"#;

const TASK_COLUMNS: &str = r#"
    id, project_id, title, description, assigned_to_id, reporter_id, status, priority,
    due_date, estimated_hours, actual_hours, created_at, updated_at
"#;

const FILE_COLUMNS: &str = "id, project_id, uploader_id, file_url, description, created_at";

/// Comments with the author's username and the project they belong to,
/// directly or through their task.
const COMMENT_SOURCE: &str = r#"
    (SELECT c.id, c.author_id, p.username AS author_username, c.task_id, c.project_id,
            c.content, c.created_at, c.updated_at,
            COALESCE(c.project_id, t.project_id) AS scope_project_id
     FROM comments c
     JOIN profiles p ON p.id = c.author_id
     LEFT JOIN tasks t ON t.id = c.task_id) AS comment
"#;

const THREAD_SOURCE: &str = r#"
    (SELECT t.id, t.subject, t.project_id,
            (SELECT MAX(m.created_at) FROM messages m WHERE m.thread_id = t.id) AS last_message_at,
            t.created_at, t.updated_at,
            ARRAY(SELECT tp.user_id FROM thread_participants tp WHERE tp.thread_id = t.id) AS participant_ids
     FROM message_threads t) AS thread
"#;

const MESSAGE_SOURCE: &str = r#"
    (SELECT m.id, m.thread_id, m.sender_id, p.username AS sender_username, m.content,
            m.created_at,
            (m.sender_id = $2 OR EXISTS (
                SELECT 1 FROM message_reads r WHERE r.message_id = m.id AND r.user_id = $2
            )) AS is_read
     FROM messages m
     JOIN profiles p ON p.id = m.sender_id) AS message
"#;

// ============================================================================
// Membership helpers
// ============================================================================

async fn is_member(db: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<bool, ApiError> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM project_members WHERE project_id = $1 AND user_id = $2)",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_one(db)
    .await
    .map_err(ApiError::database)
}

async fn fetch_project(db: &PgPool, project_id: Uuid) -> Result<Project, ApiError> {
    sqlx::query_as::<_, Project>(&format!(
        "SELECT {} FROM projects WHERE id = $1",
        PROJECT_COLUMNS
    ))
    .bind(project_id)
    .fetch_optional(db)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("Project not found"))
}

/// Load a project the caller belongs to. Non-members get a 404.
async fn member_project(
    state: &AppState,
    project_id: Uuid,
    user: &CurrentUser,
) -> Result<Project, ApiError> {
    let project = fetch_project(&state.db, project_id).await?;
    if !user.is_staff && !is_member(&state.db, project_id, user.user_id).await? {
        return Err(ApiError::not_found("Project not found"));
    }
    Ok(project)
}

/// Load a project the caller owns (or any, for staff).
async fn owned_project(
    state: &AppState,
    project_id: Uuid,
    user: &CurrentUser,
) -> Result<Project, ApiError> {
    let project = member_project(state, project_id, user).await?;
    if !user.owns_or_staff(project.owner_id) {
        return Err(ApiError::forbidden("Only the project owner can do this"));
    }
    Ok(project)
}

async fn project_response(db: &PgPool, project: Project) -> Result<ProjectResponse, ApiError> {
    let members = sqlx::query_as::<_, ProjectMember>(
        r#"
        SELECT pm.user_id, p.username, pm.added_at
        FROM project_members pm
        JOIN profiles p ON p.id = pm.user_id
        WHERE pm.project_id = $1
        ORDER BY pm.added_at
        "#,
    )
    .bind(project.id)
    .fetch_all(db)
    .await
    .map_err(ApiError::database)?;

    Ok(ProjectResponse { project, members })
}

async fn ensure_assignee_is_member(
    db: &PgPool,
    project_id: Uuid,
    assignee: Option<Uuid>,
) -> Result<(), ApiError> {
    if let Some(assignee) = assignee {
        if !is_member(db, project_id, assignee).await? {
            return Err(ApiError::bad_request(
                "Tasks can only be assigned to project members.",
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Projects
// ============================================================================

/// GET /api/v1/projects
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ProjectFilter>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let where_clause = r#"
        WHERE ($1 OR EXISTS (
                SELECT 1 FROM project_members pm WHERE pm.project_id = projects.id AND pm.user_id = $2))
          AND ($3::text IS NULL OR status = $3)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM projects {}", where_clause))
        .bind(user.is_staff)
        .bind(user.user_id)
        .bind(filter.status)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::database)?;

    let projects = sqlx::query_as::<_, Project>(&format!(
        "SELECT {} FROM projects {} ORDER BY updated_at DESC LIMIT $4 OFFSET $5",
        PROJECT_COLUMNS, where_clause
    ))
    .bind(user.is_staff)
    .bind(user.user_id)
    .bind(filter.status)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(projects, &pagination, total))
}

/// GET /api/v1/projects/:id
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let project = member_project(&state, project_id, &user).await?;
    Ok(DataResponse::new(project_response(&state.db, project).await?))
}

/// POST /api/v1/projects
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    input.validate().map_err(ApiError::bad_request)?;

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;

    let project = sqlx::query_as::<_, Project>(&format!(
        r#"
        INSERT INTO projects (name, description, owner_id, status, start_date, due_date, related_order_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        PROJECT_COLUMNS
    ))
    .bind(input.name.trim())
    .bind(&input.description)
    .bind(user.user_id)
    .bind(input.status.unwrap_or(ProjectStatus::Pending))
    .bind(input.start_date)
    .bind(input.due_date)
    .bind(input.related_order_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    // The owner is always a member
    let members = thread_participants(user.user_id, &input.member_ids);
    sqlx::query(
        r#"
        INSERT INTO project_members (project_id, user_id)
        SELECT $1, UNNEST($2::uuid[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(project.id)
    .bind(&members)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    tx.commit().await.map_err(ApiError::database)?;

    tracing::info!(project_id = %project.id, owner_id = %user.user_id, members = members.len(), "Project created");

    Ok(Created(project_response(&state.db, project).await?))
}

/// PATCH /api/v1/projects/:id
pub async fn update_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<UpdateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let current = owned_project(&state, project_id, &user).await?;
    input.validate(&current).map_err(ApiError::bad_request)?;
    if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("name cannot be empty"));
    }

    let project = sqlx::query_as::<_, Project>(&format!(
        r#"
        UPDATE projects SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            status = COALESCE($4, status),
            start_date = COALESCE($5, start_date),
            due_date = COALESCE($6, due_date),
            related_order_id = COALESCE($7, related_order_id),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        PROJECT_COLUMNS
    ))
    .bind(project_id)
    .bind(&input.name)
    .bind(&input.description)
    .bind(input.status)
    .bind(input.start_date)
    .bind(input.due_date)
    .bind(input.related_order_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(project_response(&state.db, project).await?))
}

/// DELETE /api/v1/projects/:id
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    owned_project(&state, project_id, &user).await?;

    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    tracing::info!(project_id = %project_id, user_id = %user.user_id, "Project deleted");
    Ok(NoContent)
}

/// POST /api/v1/projects/:id/members
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<MemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project = owned_project(&state, project_id, &user).await?;

    sqlx::query(
        "INSERT INTO project_members (project_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(project_id)
    .bind(input.user_id)
    .execute(&state.db)
    .await
    .map_err(ApiError::database)?;

    tracing::info!(project_id = %project_id, member_id = %input.user_id, "Project member added");

    Ok(DataResponse::new(project_response(&state.db, project).await?))
}

/// DELETE /api/v1/projects/:id/members/:user_id
///
/// Tasks in the project assigned to the removed member become unassigned.
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Path((project_id, member_id)): Path<(Uuid, Uuid)>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let project = owned_project(&state, project_id, &user).await?;
    if member_id == project.owner_id {
        return Err(ApiError::bad_request("The project owner cannot be removed."));
    }

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;

    let removed = sqlx::query("DELETE FROM project_members WHERE project_id = $1 AND user_id = $2")
        .bind(project_id)
        .bind(member_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::database)?;

    if removed.rows_affected() == 0 {
        return Err(ApiError::not_found("User is not a member of this project"));
    }

    let unassigned = sqlx::query(
        r#"
        UPDATE tasks SET assigned_to_id = NULL, updated_at = NOW()
        WHERE project_id = $1 AND assigned_to_id = $2
        "#,
    )
    .bind(project_id)
    .bind(member_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    tx.commit().await.map_err(ApiError::database)?;

    tracing::info!(
        project_id = %project_id,
        member_id = %member_id,
        unassigned_tasks = unassigned.rows_affected(),
        "Project member removed"
    );

    Ok(DataResponse::new(project_response(&state.db, project).await?))
}

/// GET /api/v1/projects/:id/tasks
pub async fn list_project_tasks(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    member_project(&state, project_id, &user).await?;

    let tasks = sqlx::query_as::<_, Task>(&format!(
        "SELECT {} FROM tasks WHERE project_id = $1 ORDER BY priority DESC, due_date NULLS LAST, created_at",
        TASK_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(tasks))
}

/// GET /api/v1/projects/:id/files
pub async fn list_project_files(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    member_project(&state, project_id, &user).await?;

    let files = sqlx::query_as::<_, ProjectFile>(&format!(
        "SELECT {} FROM project_files WHERE project_id = $1 ORDER BY created_at DESC",
        FILE_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(files))
}

/// GET /api/v1/projects/:id/comments
pub async fn list_project_comments(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    member_project(&state, project_id, &user).await?;

    let comments = sqlx::query_as::<_, Comment>(&format!(
        "SELECT * FROM {} WHERE project_id = $1 ORDER BY created_at",
        COMMENT_SOURCE
    ))
    .bind(project_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(comments))
}

// ============================================================================
// Tasks
// ============================================================================

async fn member_task(state: &AppState, task_id: Uuid, user: &CurrentUser) -> Result<Task, ApiError> {
    let task = sqlx::query_as::<_, Task>(&format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS))
        .bind(task_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    if !user.is_staff && !is_member(&state.db, task.project_id, user.user_id).await? {
        return Err(ApiError::not_found("Task not found"));
    }
    Ok(task)
}

/// GET /api/v1/tasks
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<TaskFilter>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let assignee = filter.assigned_to_me.then_some(user.user_id);
    let where_clause = r#"
        WHERE ($1 OR EXISTS (
                SELECT 1 FROM project_members pm WHERE pm.project_id = tasks.project_id AND pm.user_id = $2))
          AND ($3::uuid IS NULL OR project_id = $3)
          AND ($4::text IS NULL OR status = $4)
          AND ($5::uuid IS NULL OR assigned_to_id = $5)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM tasks {}", where_clause))
        .bind(user.is_staff)
        .bind(user.user_id)
        .bind(filter.project_id)
        .bind(filter.status)
        .bind(assignee)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::database)?;

    let tasks = sqlx::query_as::<_, Task>(&format!(
        r#"
        SELECT {} FROM tasks {}
        ORDER BY priority DESC, due_date NULLS LAST, created_at
        LIMIT $6 OFFSET $7
        "#,
        TASK_COLUMNS, where_clause
    ))
    .bind(user.is_staff)
    .bind(user.user_id)
    .bind(filter.project_id)
    .bind(filter.status)
    .bind(assignee)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(tasks, &pagination, total))
}

/// GET /api/v1/tasks/:id
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(DataResponse::new(member_task(&state, task_id, &user).await?))
}

/// POST /api/v1/tasks
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    input.validate().map_err(ApiError::bad_request)?;
    member_project(&state, input.project_id, &user).await?;
    ensure_assignee_is_member(&state.db, input.project_id, input.assigned_to_id).await?;

    let task = sqlx::query_as::<_, Task>(&format!(
        r#"
        INSERT INTO tasks (project_id, title, description, assigned_to_id, reporter_id, status,
                           priority, due_date, estimated_hours)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        TASK_COLUMNS
    ))
    .bind(input.project_id)
    .bind(input.title.trim())
    .bind(&input.description)
    .bind(input.assigned_to_id)
    .bind(user.user_id)
    .bind(input.status.unwrap_or(TaskStatus::Todo))
    .bind(input.priority.unwrap_or(DEFAULT_TASK_PRIORITY))
    .bind(input.due_date)
    .bind(input.estimated_hours)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    tracing::info!(task_id = %task.id, project_id = %task.project_id, "Task created");
    Ok(Created(task))
}

/// PATCH /api/v1/tasks/:id
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<UpdateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let current = member_task(&state, task_id, &user).await?;
    input.validate().map_err(ApiError::bad_request)?;
    if input.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("title cannot be empty"));
    }
    let assignee = input.assigned_to_id.flatten();
    ensure_assignee_is_member(&state.db, current.project_id, assignee).await?;

    let task = sqlx::query_as::<_, Task>(&format!(
        r#"
        UPDATE tasks SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            assigned_to_id = CASE WHEN $10 THEN $4 ELSE assigned_to_id END,
            status = COALESCE($5, status),
            priority = COALESCE($6, priority),
            due_date = COALESCE($7, due_date),
            estimated_hours = COALESCE($8, estimated_hours),
            actual_hours = COALESCE($9, actual_hours),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        TASK_COLUMNS
    ))
    .bind(task_id)
    .bind(&input.title)
    .bind(&input.description)
    .bind(assignee)
    .bind(input.status)
    .bind(input.priority)
    .bind(input.due_date)
    .bind(input.estimated_hours)
    .bind(input.actual_hours)
    .bind(input.assigned_to_id.is_some())
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(DataResponse::new(task))
}

/// DELETE /api/v1/tasks/:id
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let task = member_task(&state, task_id, &user).await?;

    sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(task.id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    tracing::info!(task_id = %task.id, user_id = %user.user_id, "Task deleted");
    Ok(NoContent)
}

// ============================================================================
// Files
// ============================================================================

/// POST /api/v1/files
pub async fn add_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateProjectFileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_url("file_url", &input.file_url).map_err(ApiError::bad_request)?;
    member_project(&state, input.project_id, &user).await?;

    let file = sqlx::query_as::<_, ProjectFile>(&format!(
        r#"
        INSERT INTO project_files (project_id, uploader_id, file_url, description)
        VALUES ($1, $2, $3, $4)
        RETURNING {}
        "#,
        FILE_COLUMNS
    ))
    .bind(input.project_id)
    .bind(user.user_id)
    .bind(&input.file_url)
    .bind(&input.description)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Created(file))
}

/// DELETE /api/v1/files/:id
///
/// The uploader or the project owner may delete a file.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let file = sqlx::query_as::<_, ProjectFile>(&format!(
        "SELECT {} FROM project_files WHERE id = $1",
        FILE_COLUMNS
    ))
    .bind(file_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::database)?
    .ok_or_else(|| ApiError::not_found("File not found"))?;

    let project = member_project(&state, file.project_id, &user).await?;
    if file.uploader_id != Some(user.user_id) && !user.owns_or_staff(project.owner_id) {
        return Err(ApiError::forbidden(
            "Only the uploader or the project owner can delete this file",
        ));
    }

    sqlx::query("DELETE FROM project_files WHERE id = $1")
        .bind(file.id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    Ok(NoContent)
}

// ============================================================================
// Comments
// ============================================================================

async fn fetch_comment(db: &PgPool, comment_id: Uuid) -> Result<(Comment, Uuid), ApiError> {
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        comment: Comment,
        scope_project_id: Uuid,
    }

    let row = sqlx::query_as::<_, Row>(&format!("SELECT * FROM {} WHERE id = $1", COMMENT_SOURCE))
        .bind(comment_id)
        .fetch_optional(db)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Comment not found"))?;

    Ok((row.comment, row.scope_project_id))
}

/// GET /api/v1/comments
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<CommentFilter>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let where_clause = r#"
        WHERE ($1 OR EXISTS (
                SELECT 1 FROM project_members pm
                WHERE pm.project_id = comment.scope_project_id AND pm.user_id = $2))
          AND ($3::uuid IS NULL OR task_id = $3)
          AND ($4::uuid IS NULL OR project_id = $4)
    "#;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} {}",
        COMMENT_SOURCE, where_clause
    ))
    .bind(user.is_staff)
    .bind(user.user_id)
    .bind(filter.task_id)
    .bind(filter.project_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let comments = sqlx::query_as::<_, Comment>(&format!(
        "SELECT * FROM {} {} ORDER BY created_at LIMIT $5 OFFSET $6",
        COMMENT_SOURCE, where_clause
    ))
    .bind(user.is_staff)
    .bind(user.user_id)
    .bind(filter.task_id)
    .bind(filter.project_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(comments, &pagination, total))
}

/// POST /api/v1/comments
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let parent = input.parent().map_err(ApiError::bad_request)?;
    match parent {
        CommentParent::Task(task_id) => {
            member_task(&state, task_id, &user).await?;
        }
        CommentParent::Project(project_id) => {
            member_project(&state, project_id, &user).await?;
        }
    }

    let comment_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO comments (author_id, task_id, project_id, content)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user.user_id)
    .bind(input.task_id)
    .bind(input.project_id)
    .bind(input.content.trim())
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let (comment, _) = fetch_comment(&state.db, comment_id).await?;
    Ok(Created(comment))
}

/// PATCH /api/v1/comments/:id
pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (comment, _) = fetch_comment(&state.db, comment_id).await?;
    if comment.author_id != user.user_id {
        return Err(ApiError::forbidden("You can only edit your own comments"));
    }
    if input.content.trim().is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }

    sqlx::query("UPDATE comments SET content = $2, updated_at = NOW() WHERE id = $1")
        .bind(comment_id)
        .bind(input.content.trim())
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    let (comment, _) = fetch_comment(&state.db, comment_id).await?;
    Ok(DataResponse::new(comment))
}

/// DELETE /api/v1/comments/:id
///
/// The author or the owner of the comment's project may delete it.
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let (comment, project_id) = fetch_comment(&state.db, comment_id).await?;
    if comment.author_id != user.user_id {
        let project = fetch_project(&state.db, project_id).await?;
        if !user.owns_or_staff(project.owner_id) {
            return Err(ApiError::forbidden(
                "Only the author or the project owner can delete this comment",
            ));
        }
    }

    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;

    Ok(NoContent)
}

// ============================================================================
// Message threads
// ============================================================================

async fn participant_thread(
    state: &AppState,
    thread_id: Uuid,
    user: &CurrentUser,
) -> Result<ThreadResponse, ApiError> {
    sqlx::query_as::<_, ThreadResponse>(&format!("SELECT * FROM {} WHERE id = $1", THREAD_SOURCE))
        .bind(thread_id)
        .fetch_optional(&state.db)
        .await
        .map_err(ApiError::database)?
        .filter(|t| user.is_staff || t.participant_ids.contains(&user.user_id))
        .ok_or_else(|| ApiError::not_found("Thread not found"))
}

/// GET /api/v1/threads
///
/// Threads the caller takes part in, most recent activity first.
pub async fn list_threads(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {} WHERE $1 = ANY(participant_ids)",
        THREAD_SOURCE
    ))
    .bind(user.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    let threads = sqlx::query_as::<_, ThreadResponse>(&format!(
        r#"
        SELECT * FROM {} WHERE $1 = ANY(participant_ids)
        ORDER BY COALESCE(last_message_at, updated_at) DESC
        LIMIT $2 OFFSET $3
        "#,
        THREAD_SOURCE
    ))
    .bind(user.user_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Paginated::new(threads, &pagination, total))
}

/// POST /api/v1/threads
pub async fn create_thread(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(input): Json<CreateThreadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(project_id) = input.project_id {
        fetch_project(&state.db, project_id).await?;
        if !user.is_staff && !is_member(&state.db, project_id, user.user_id).await? {
            return Err(ApiError::forbidden(
                "You must be a project member to start a thread in it",
            ));
        }
    }

    let participants = thread_participants(user.user_id, &input.participant_ids);
    let first_message = input
        .content
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;

    let thread_id: Uuid = sqlx::query_scalar(
        "INSERT INTO message_threads (subject, project_id) VALUES ($1, $2) RETURNING id",
    )
    .bind(&input.subject)
    .bind(input.project_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    sqlx::query(
        r#"
        INSERT INTO thread_participants (thread_id, user_id)
        SELECT $1, UNNEST($2::uuid[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(thread_id)
    .bind(&participants)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    if let Some(content) = first_message {
        sqlx::query("INSERT INTO messages (thread_id, sender_id, content) VALUES ($1, $2, $3)")
            .bind(thread_id)
            .bind(user.user_id)
            .bind(content)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::database)?;
    }

    tx.commit().await.map_err(ApiError::database)?;

    tracing::info!(thread_id = %thread_id, participants = participants.len(), "Message thread created");

    if first_message.is_some() {
        let others: Vec<Uuid> = participants
            .iter()
            .copied()
            .filter(|id| *id != user.user_id)
            .collect();
        notifications::notify_new_message(&state.db, &others, thread_id, &user.username).await;
    }

    Ok(Created(participant_thread(&state, thread_id, &user).await?))
}

/// GET /api/v1/threads/:id
pub async fn get_thread(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<Uuid>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(DataResponse::new(
        participant_thread(&state, thread_id, &user).await?,
    ))
}

/// GET /api/v1/threads/:id/messages
///
/// Oldest first. Reading a page marks its messages read for the caller.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    participant_thread(&state, thread_id, &user).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE thread_id = $1")
        .bind(thread_id)
        .fetch_one(&state.db)
        .await
        .map_err(ApiError::database)?;

    let messages = sqlx::query_as::<_, Message>(&format!(
        "SELECT * FROM {} WHERE thread_id = $1 ORDER BY created_at, id LIMIT $3 OFFSET $4",
        MESSAGE_SOURCE
    ))
    .bind(thread_id)
    .bind(user.user_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::database)?;

    let unread: Vec<Uuid> = messages.iter().filter(|m| !m.is_read).map(|m| m.id).collect();
    if !unread.is_empty() {
        sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id)
            SELECT UNNEST($1::uuid[]), $2
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&unread)
        .bind(user.user_id)
        .execute(&state.db)
        .await
        .map_err(ApiError::database)?;
    }

    Ok(Paginated::new(messages, &pagination, total))
}

/// POST /api/v1/threads/:id/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<Uuid>,
    user: CurrentUser,
    Json(input): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let thread = participant_thread(&state, thread_id, &user).await?;
    if !thread.participant_ids.contains(&user.user_id) {
        return Err(ApiError::forbidden("Only participants can post in this thread"));
    }
    let content = input.content.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("content is required"));
    }

    let mut tx = state.db.begin().await.map_err(ApiError::database)?;

    let message_id: Uuid = sqlx::query_scalar(
        "INSERT INTO messages (thread_id, sender_id, content) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(thread_id)
    .bind(user.user_id)
    .bind(content)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::database)?;

    sqlx::query("UPDATE message_threads SET updated_at = NOW() WHERE id = $1")
        .bind(thread_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::database)?;

    tx.commit().await.map_err(ApiError::database)?;

    let others: Vec<Uuid> = thread
        .participant_ids
        .iter()
        .copied()
        .filter(|id| *id != user.user_id)
        .collect();
    notifications::notify_new_message(&state.db, &others, thread_id, &user.username).await;

    let message = sqlx::query_as::<_, Message>(&format!(
        "SELECT * FROM {} WHERE id = $1",
        MESSAGE_SOURCE
    ))
    .bind(message_id)
    .bind(user.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::database)?;

    Ok(Created(message))
}

