//! Review and rating types
//!
//! A review targets a material, a design or a user profile. Aggregates on
//! the target (average rating, review count) count approved reviews only.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orders::round_money;

text_enum! {
    pub enum ReviewTarget {
        Material => "material",
        Design => "design",
        User => "user",
    }
}

impl ReviewTarget {
    /// Table holding the target and its aggregate columns
    pub fn table(&self) -> &'static str {
        match self {
            Self::Material => "materials",
            Self::Design => "designs",
            Self::User => "profiles",
        }
    }

    /// Column naming the owner of the target row
    pub fn owner_column(&self) -> &'static str {
        match self {
            Self::Material => "seller_id",
            Self::Design => "designer_id",
            Self::User => "id",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub target_type: ReviewTarget,
    pub target_id: Uuid,
    pub rating: i16,
    pub title: Option<String>,
    pub comment: String,
    pub is_approved: bool,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReviewReply {
    pub id: Uuid,
    pub review_id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub comment: String,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewResponse {
    #[serde(flatten)]
    pub review: Review,
    pub replies: Vec<ReviewReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReviewRequest {
    pub target_type: ReviewTarget,
    pub target_id: Uuid,
    pub rating: i16,
    #[serde(default)]
    pub title: Option<String>,
    pub comment: String,
}

impl CreateReviewRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_rating(self.rating)?;
        if self.comment.trim().is_empty() {
            return Err("comment is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: Option<i16>,
    pub title: Option<String>,
    pub comment: Option<String>,
}

impl UpdateReviewRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(rating) = self.rating {
            validate_rating(rating)?;
        }
        if self.comment.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err("comment cannot be empty".to_string());
        }
        Ok(())
    }
}

pub fn validate_rating(rating: i16) -> Result<(), String> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err("rating must be between 1 and 5".to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewFilter {
    pub target_type: Option<ReviewTarget>,
    pub target_id: Option<Uuid>,
    pub author_id: Option<Uuid>,
    pub rating: Option<i16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewsForItemQuery {
    pub target_type: ReviewTarget,
    pub target_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyRequest {
    pub comment: String,
}

/// Mean of approved ratings rounded to two places; zero without reviews.
pub fn average_rating(ratings: &[i16]) -> Decimal {
    if ratings.is_empty() {
        return Decimal::ZERO;
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    round_money(Decimal::from(sum) / Decimal::from(ratings.len() as i64))
}

/// Refusal reasons for a new review, checked before insert.
pub fn check_reviewer(author_id: Uuid, target_owner_id: Uuid) -> Result<(), String> {
    if author_id == target_owner_id {
        Err("You cannot review yourself or your own listing.".to_string())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages() {
        assert_eq!(average_rating(&[]), Decimal::ZERO);
        assert_eq!(average_rating(&[5]), Decimal::new(500, 2));
        assert_eq!(average_rating(&[5, 4, 4]), Decimal::new(433, 2));
        assert_eq!(average_rating(&[1, 2]), Decimal::new(150, 2));
        // 2/3 = 0.666.. rounds up
        assert_eq!(average_rating(&[1, 1, 5]), Decimal::new(233, 2));
    }

    #[test]
    fn rating_bounds() {
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn no_self_reviews() {
        let me = Uuid::new_v4();
        assert!(check_reviewer(me, me).is_err());
        assert!(check_reviewer(me, Uuid::new_v4()).is_ok());
    }

    #[test]
    fn target_tables() {
        assert_eq!(ReviewTarget::Material.table(), "materials");
        assert_eq!(ReviewTarget::Design.owner_column(), "designer_id");
        assert_eq!(ReviewTarget::User.owner_column(), "id");
    }
}
