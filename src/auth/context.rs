//! Identity of a caller whose bearer token passed JWKS verification

use uuid::Uuid;

use super::Claims;

#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Supabase user id, which is also the local profile id
    pub user_id: Uuid,
    pub email: Option<String>,
    token: String,
    claims: Claims,
}

impl AuthContext {
    /// Fails when `sub` is not a UUID.
    pub fn new(claims: Claims, token: &str) -> Result<Self, uuid::Error> {
        Ok(Self {
            user_id: claims.sub.parse()?,
            email: claims.email.clone(),
            token: token.to_owned(),
            claims,
        })
    }

    /// Raw bearer token, forwarded as-is by the auth proxy
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Token expiry as a Unix timestamp
    pub fn expires_at(&self) -> i64 {
        self.claims.exp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str) -> Claims {
        serde_json::from_value(serde_json::json!({
            "sub": sub,
            "aud": "authenticated",
            "iss": "https://project.supabase.co/auth/v1",
            "iat": 1700000000,
            "exp": 1700003600,
            "email": "buyer@example.com"
        }))
        .unwrap()
    }

    #[test]
    fn subject_becomes_user_id() {
        let ctx = AuthContext::new(claims("0f8fad5b-d9cb-469f-a165-70867728950e"), "tok").unwrap();
        assert_eq!(ctx.user_id.to_string(), "0f8fad5b-d9cb-469f-a165-70867728950e");
        assert_eq!(ctx.email.as_deref(), Some("buyer@example.com"));
        assert_eq!(ctx.token(), "tok");
        assert_eq!(ctx.expires_at(), 1700003600);
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        assert!(AuthContext::new(claims("service-account"), "tok").is_err());
    }
}
