//! Account domain types
//!
//! Profiles carry the marketplace role of a user (buyer, seller, designer,
//! manufacturer) and the staff flag that unlocks administrative actions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    /// Marketplace role of a user
    pub enum UserType {
        Buyer => "buyer",
        Seller => "seller",
        Designer => "designer",
        Manufacturer => "manufacturer",
    }
}

impl Default for UserType {
    fn default() -> Self {
        Self::Buyer
    }
}

impl UserType {
    /// Sellers and manufacturers supply goods and answer RFQs.
    pub fn is_supplier(&self) -> bool {
        matches!(self, Self::Seller | Self::Manufacturer)
    }

    /// Roles that may appear as the seller of an order line.
    pub fn can_sell(&self) -> bool {
        matches!(self, Self::Seller | Self::Manufacturer | Self::Designer)
    }
}

/// The authenticated caller as seen by business rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub user_type: UserType,
    pub is_staff: bool,
}

impl Actor {
    pub fn is_supplier(&self) -> bool {
        self.user_type.is_supplier()
    }

    pub fn is_buyer(&self) -> bool {
        self.user_type == UserType::Buyer
    }

    pub fn can_create_rfq(&self) -> bool {
        self.is_buyer() || self.is_staff
    }

    pub fn can_quote(&self) -> bool {
        self.is_supplier() || self.is_staff
    }

    pub fn can_list_materials(&self) -> bool {
        self.is_supplier() || self.is_staff
    }

    pub fn can_list_designs(&self) -> bool {
        self.user_type == UserType::Designer || self.is_staff
    }

    pub fn can_place_orders(&self) -> bool {
        self.is_buyer() || self.is_staff
    }

    /// Owner of a resource, or staff.
    pub fn owns_or_staff(&self, owner_id: Uuid) -> bool {
        self.is_staff || self.user_id == owner_id
    }
}

/// Profile entity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_type: UserType,
    pub company_name: Option<String>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub is_staff: bool,
    pub average_rating: Decimal,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Name shown to other users
    pub fn display_name(&self) -> String {
        self.full_name().unwrap_or_else(|| self.username.clone())
    }
}

/// Update request for the user portion (`users/me`)
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Update request for profile details
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub user_type: Option<UserType>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileFilter {
    pub user_type: Option<UserType>,
    /// Matches username, email or company name
    pub search: Option<String>,
}

/// Public view of a profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: String,
    pub user_type: UserType,
    pub company_name: Option<String>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub is_staff: bool,
    pub average_rating: Decimal,
    pub review_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Profile> for ProfileResponse {
    fn from(p: Profile) -> Self {
        let display_name = p.display_name();
        Self {
            id: p.id,
            email: p.email,
            username: p.username,
            first_name: p.first_name,
            last_name: p.last_name,
            display_name,
            user_type: p.user_type,
            company_name: p.company_name,
            contact_number: p.contact_number,
            address: p.address,
            is_staff: p.is_staff,
            average_rating: p.average_rating,
            review_count: p.review_count,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl From<Profile> for Actor {
    fn from(p: Profile) -> Self {
        Self {
            user_id: p.id,
            username: p.username,
            email: p.email,
            user_type: p.user_type,
            is_staff: p.is_staff,
        }
    }
}

/// Usernames: 3-150 chars of letters, digits and `@.+-_`.
pub fn validate_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if !(3..=150).contains(&len) {
        return Err("Username must be between 3 and 150 characters".to_string());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@.+-_".contains(c))
    {
        return Err("Username may contain only letters, digits and @/./+/-/_".to_string());
    }
    Ok(())
}

/// Username derived from an email address for profiles created on first login.
pub fn username_from_email(email: &str, user_id: Uuid) -> String {
    let local: String = email
        .split('@')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || "._-".contains(*c))
        .take(40)
        .collect();
    let suffix = &user_id.simple().to_string()[..6];

    if local.is_empty() {
        format!("user-{}", suffix)
    } else {
        format!("{}-{}", local, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(user_type: UserType, is_staff: bool) -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            username: "someone".to_string(),
            email: "someone@example.com".to_string(),
            user_type,
            is_staff,
        }
    }

    #[test]
    fn role_capabilities() {
        assert!(actor(UserType::Buyer, false).can_create_rfq());
        assert!(!actor(UserType::Seller, false).can_create_rfq());
        assert!(actor(UserType::Seller, true).can_create_rfq());

        assert!(actor(UserType::Manufacturer, false).can_quote());
        assert!(!actor(UserType::Designer, false).can_quote());

        assert!(actor(UserType::Designer, false).can_list_designs());
        assert!(!actor(UserType::Designer, false).can_list_materials());
        assert!(actor(UserType::Seller, false).can_list_materials());

        assert!(UserType::Designer.can_sell());
        assert!(!UserType::Buyer.can_sell());
    }

    #[test]
    fn ownership_check() {
        let a = actor(UserType::Buyer, false);
        assert!(a.owns_or_staff(a.user_id));
        assert!(!a.owns_or_staff(Uuid::new_v4()));
        assert!(actor(UserType::Buyer, true).owns_or_staff(Uuid::new_v4()));
    }

    #[test]
    fn usernames() {
        assert!(validate_username("mill_co.2024").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());

        let id = Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
        assert_eq!(username_from_email("jane.doe+x@mill.test", id), "jane.doex-0f8fad");
        assert_eq!(username_from_email("@nothing", id), "user-0f8fad");
    }
}
