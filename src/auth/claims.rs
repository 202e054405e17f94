use serde::{Deserialize, Serialize};

/// Claims carried by Supabase-issued access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    pub aud: String,

    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    #[serde(default)]
    pub nbf: Option<i64>,

    #[serde(default)]
    pub email: Option<String>,

    /// Supabase role (`authenticated`, `service_role`)
    #[serde(default)]
    pub role: Option<String>,

    /// Metadata written at signup (`username`, `user_type`)
    #[serde(default)]
    pub user_metadata: Option<serde_json::Value>,
}

impl Claims {
    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata.as_ref()?.get(key)?.as_str()
    }

    /// Role requested at registration, used when the local profile is created lazily.
    pub fn signup_user_type(&self) -> Option<&str> {
        self.metadata_str("user_type")
    }

    pub fn signup_username(&self) -> Option<&str> {
        self.metadata_str("username")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_signup_metadata() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "sub": "0f8fad5b-d9cb-469f-a165-70867728950e",
            "aud": "authenticated",
            "iss": "https://project.supabase.co/auth/v1",
            "iat": 1700000000,
            "exp": 1700003600,
            "email": "mill@example.com",
            "user_metadata": { "user_type": "seller", "username": "mill" }
        }))
        .unwrap();

        assert_eq!(claims.signup_user_type(), Some("seller"));
        assert_eq!(claims.signup_username(), Some("mill"));
        assert_eq!(claims.nbf, None);
    }
}
