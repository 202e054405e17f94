//! Forum and showcase types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::accounts::Actor;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ForumCategory {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub thread_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForumCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ForumThread {
    pub id: Uuid,
    pub category_id: Uuid,
    pub category_slug: String,
    pub author_id: Uuid,
    pub author_username: String,
    pub title: String,
    pub slug: String,
    pub is_pinned: bool,
    pub is_locked: bool,
    pub views_count: i32,
    pub post_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateForumThreadRequest {
    pub category_id: Uuid,
    pub title: String,
    /// Body of the opening post
    pub content: String,
}

impl CreateForumThreadRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".to_string());
        }
        if self.content.trim().is_empty() {
            return Err("content is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateForumThreadRequest {
    pub title: Option<String>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForumThreadFilter {
    /// Category slug
    pub category: Option<String>,
    /// Author username
    pub author: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ForumPost {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub content: String,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateForumPostRequest {
    pub thread_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateForumPostRequest {
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForumPostFilter {
    pub thread_id: Option<Uuid>,
}

/// Locked threads accept posts from staff only.
pub fn can_post_in(thread_locked: bool, actor: &Actor) -> bool {
    !thread_locked || actor.is_staff
}

// ============================================================================
// Showcases
// ============================================================================

text_enum! {
    pub enum ShowcaseItemType {
        Image => "image",
        File => "file",
        Link => "link",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Showcase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Showcase {
    pub fn visible_to(&self, viewer: Option<&Actor>) -> bool {
        self.is_public || viewer.is_some_and(|a| a.owns_or_staff(self.user_id))
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ShowcaseItem {
    pub id: Uuid,
    pub showcase_id: Uuid,
    pub item_type: ShowcaseItemType,
    pub title: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowcaseResponse {
    #[serde(flatten)]
    pub showcase: Showcase,
    pub items: Vec<ShowcaseItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateShowcaseRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateShowcaseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateShowcaseItemRequest {
    #[serde(default)]
    pub item_type: Option<ShowcaseItemType>,
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateShowcaseItemRequest {
    pub item_type: Option<ShowcaseItemType>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub display_order: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::accounts::UserType;

    fn actor(is_staff: bool) -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            username: "weaver".to_string(),
            email: "weaver@example.com".to_string(),
            user_type: UserType::Designer,
            is_staff,
        }
    }

    #[test]
    fn locked_threads_admit_staff_only() {
        assert!(can_post_in(false, &actor(false)));
        assert!(!can_post_in(true, &actor(false)));
        assert!(can_post_in(true, &actor(true)));
    }

    #[test]
    fn private_showcases() {
        let owner = actor(false);
        let now = Utc::now();
        let showcase = Showcase {
            id: Uuid::new_v4(),
            user_id: owner.user_id,
            username: owner.username.clone(),
            title: "Autumn prints".to_string(),
            slug: "autumn-prints".to_string(),
            description: None,
            is_public: false,
            created_at: now,
            updated_at: now,
        };

        assert!(showcase.visible_to(Some(&owner)));
        assert!(showcase.visible_to(Some(&actor(true))));
        assert!(!showcase.visible_to(Some(&actor(false))));
        assert!(!showcase.visible_to(None));
    }
}
