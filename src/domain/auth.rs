//! Authentication domain types
//!
//! Request and response shapes for the auth proxy in front of Supabase Auth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::accounts::UserType;

/// Registration request
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
    #[serde(default)]
    pub user_type: UserType,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// User info from the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub user_type: UserType,
    pub created_at: Option<DateTime<Utc>>,
}

/// Tokens plus user (login, refresh, auto-confirmed registration)
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: User,
}

/// Registration accepted but email confirmation pending
#[derive(Debug, Clone, Serialize)]
pub struct SignupPendingResponse {
    pub user_id: String,
    pub email: String,
    pub confirmation_required: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub access_token: String,
    pub expires_at: i64,
}

// Supabase Auth API shapes

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseAuthResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: String,
    pub user: SupabaseUser,
}

/// Signup response when email confirmation is required (user object only)
#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseSignupResponse {
    pub id: String,
    pub email: Option<String>,
    pub confirmation_sent_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseUser {
    pub id: String,
    pub email: Option<String>,
    pub created_at: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
}

impl SupabaseUser {
    /// Role recorded in user metadata at registration
    pub fn user_type(&self) -> UserType {
        self.user_metadata
            .as_ref()
            .and_then(|m| m.get("user_type"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn username(&self) -> Option<String> {
        self.user_metadata
            .as_ref()
            .and_then(|m| m.get("username"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

/// Supabase error body; the field carrying the message varies by version.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupabaseErrorResponse {
    pub msg: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub message: Option<String>,
}

impl SupabaseErrorResponse {
    pub fn with_fallback(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn get_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "Unknown authentication error".to_string())
    }
}

impl From<SupabaseUser> for User {
    fn from(su: SupabaseUser) -> Self {
        let user_type = su.user_type();
        Self {
            id: su.id,
            email: su.email,
            user_type,
            created_at: su.created_at.and_then(|s| s.parse().ok()),
        }
    }
}

impl From<SupabaseSignupResponse> for SignupPendingResponse {
    fn from(sr: SupabaseSignupResponse) -> Self {
        Self {
            user_id: sr.id,
            email: sr.email.unwrap_or_default(),
            confirmation_required: sr.confirmation_sent_at.is_some(),
            message: "Please check your email to confirm your account.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_precedence() {
        let err: SupabaseErrorResponse = serde_json::from_value(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        }))
        .unwrap();
        assert_eq!(err.get_message(), "Invalid login credentials");

        assert_eq!(
            SupabaseErrorResponse::with_fallback("Invalid credentials").get_message(),
            "Invalid credentials"
        );
        assert_eq!(
            SupabaseErrorResponse::default().get_message(),
            "Unknown authentication error"
        );
    }

    #[test]
    fn user_metadata_drives_role() {
        let su: SupabaseUser = serde_json::from_value(serde_json::json!({
            "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
            "email": "mill@example.com",
            "created_at": "2025-03-01T10:00:00Z",
            "user_metadata": { "user_type": "manufacturer", "username": "mill" }
        }))
        .unwrap();

        assert_eq!(su.user_type(), UserType::Manufacturer);
        assert_eq!(su.username().as_deref(), Some("mill"));

        let user: User = su.into();
        assert_eq!(user.user_type, UserType::Manufacturer);
        assert!(user.created_at.is_some());
    }
}
