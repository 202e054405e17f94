//! Project collaboration types: projects, members, tasks, files, comments
//! and message threads.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

text_enum! {
    pub enum ProjectStatus {
        Pending => "pending",
        Active => "active",
        OnHold => "on_hold",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    pub enum TaskStatus {
        Todo => "todo",
        InProgress => "in_progress",
        Review => "review",
        Done => "done",
        Blocked => "blocked",
    }
}

/// Task priority: 1 low, 2 medium, 3 high, 4 urgent
pub const DEFAULT_TASK_PRIORITY: i16 = 2;

pub fn validate_priority(priority: i16) -> Result<(), String> {
    if (1..=4).contains(&priority) {
        Ok(())
    } else {
        Err("priority must be between 1 (low) and 4 (urgent)".to_string())
    }
}

fn validate_dates(start: Option<NaiveDate>, due: Option<NaiveDate>) -> Result<(), String> {
    match (start, due) {
        (Some(s), Some(d)) if d < s => Err("due_date cannot be before start_date".to_string()),
        _ => Ok(()),
    }
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub related_order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectMember {
    pub user_id: Uuid,
    pub username: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectResponse {
    #[serde(flatten)]
    pub project: Project,
    pub members: Vec<ProjectMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub related_order_id: Option<Uuid>,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

impl CreateProjectRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        validate_dates(self.start_date, self.due_date)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub related_order_id: Option<Uuid>,
}

impl UpdateProjectRequest {
    pub fn validate(&self, current: &Project) -> Result<(), String> {
        validate_dates(
            self.start_date.or(current.start_date),
            self.due_date.or(current.due_date),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
}

// ============================================================================
// Tasks
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to_id: Option<Uuid>,
    pub reporter_id: Option<Uuid>,
    pub status: TaskStatus,
    pub priority: i16,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<Decimal>,
    pub actual_hours: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub project_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assigned_to_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<i16>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub estimated_hours: Option<Decimal>,
}

impl CreateTaskRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        validate_priority(self.priority.unwrap_or(DEFAULT_TASK_PRIORITY))?;
        validate_hours(self.estimated_hours)
    }
}

/// Tells an absent field (`None`) apart from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    /// `null` unassigns the task
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_to_id: Option<Option<Uuid>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<i16>,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<Decimal>,
    pub actual_hours: Option<Decimal>,
}

impl UpdateTaskRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(p) = self.priority {
            validate_priority(p)?;
        }
        validate_hours(self.estimated_hours)?;
        validate_hours(self.actual_hours)
    }
}

fn validate_hours(hours: Option<Decimal>) -> Result<(), String> {
    if hours.is_some_and(|h| h < Decimal::ZERO) {
        Err("hours cannot be negative".to_string())
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assigned_to_me: bool,
}

// ============================================================================
// Files and comments
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectFile {
    pub id: Uuid,
    pub project_id: Uuid,
    pub uploader_id: Option<Uuid>,
    pub file_url: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectFileRequest {
    pub project_id: Uuid,
    pub file_url: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub task_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a comment is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentParent {
    Task(Uuid),
    Project(Uuid),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub task_id: Option<Uuid>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    pub content: String,
}

impl CreateCommentRequest {
    pub fn parent(&self) -> Result<CommentParent, String> {
        if self.content.trim().is_empty() {
            return Err("content is required".to_string());
        }
        match (self.task_id, self.project_id) {
            (Some(task), None) => Ok(CommentParent::Task(task)),
            (None, Some(project)) => Ok(CommentParent::Project(project)),
            _ => Err("A comment must be linked to exactly one task or project.".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentFilter {
    pub task_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

// ============================================================================
// Messaging
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageThread {
    pub id: Uuid,
    pub subject: Option<String>,
    pub project_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ThreadResponse {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub thread: MessageThread,
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub participant_ids: Vec<Uuid>,
    /// Optional first message
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Participants of a new thread: the requested ids plus the creator, deduplicated.
pub fn thread_participants(creator: Uuid, requested: &[Uuid]) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(requested.len() + 1);
    ids.push(creator);
    for id in requested {
        if !ids.contains(id) {
            ids.push(*id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_update_can_clear_assignee() {
        let req: UpdateTaskRequest = serde_json::from_str(r#"{"title": "Cut samples"}"#).unwrap();
        assert_eq!(req.assigned_to_id, None);

        let req: UpdateTaskRequest = serde_json::from_str(r#"{"assigned_to_id": null}"#).unwrap();
        assert_eq!(req.assigned_to_id, Some(None));

        let id = Uuid::new_v4();
        let req: UpdateTaskRequest =
            serde_json::from_value(serde_json::json!({ "assigned_to_id": id })).unwrap();
        assert_eq!(req.assigned_to_id, Some(Some(id)));
    }

    #[test]
    fn comment_needs_exactly_one_parent() {
        let task = Uuid::new_v4();
        let req = CreateCommentRequest {
            task_id: Some(task),
            project_id: None,
            content: "Swatch approved".to_string(),
        };
        assert_eq!(req.parent(), Ok(CommentParent::Task(task)));

        let req = CreateCommentRequest {
            project_id: Some(Uuid::new_v4()),
            ..req
        };
        assert!(req.parent().is_err());

        let req = CreateCommentRequest {
            task_id: None,
            project_id: None,
            content: "orphan".to_string(),
        };
        assert!(req.parent().is_err());
    }

    #[test]
    fn priority_range() {
        assert!(validate_priority(1).is_ok());
        assert!(validate_priority(4).is_ok());
        assert!(validate_priority(0).is_err());
        assert!(validate_priority(5).is_err());
    }

    #[test]
    fn project_dates() {
        let req = CreateProjectRequest {
            name: "Spring line".to_string(),
            description: None,
            status: None,
            start_date: NaiveDate::from_ymd_opt(2025, 3, 10),
            due_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            related_order_id: None,
            member_ids: vec![],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn creator_joins_thread_once() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert_eq!(thread_participants(me, &[other, me, other]), vec![me, other]);
        assert_eq!(thread_participants(me, &[]), vec![me]);
    }
}
