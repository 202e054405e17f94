use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::sync::Arc;

use super::AuthContext;
use crate::app::AppState;
use crate::error::{ApiError, ErrorResponse};

/// Extractor that requires a valid bearer token.
///
/// ```ignore
/// async fn protected_route(auth: RequireAuth) -> impl IntoResponse {
///     format!("Hello, user {}", auth.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

impl std::ops::Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl AuthError {
    fn message(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "Missing authorization token",
            AuthError::InvalidFormat => "Invalid authorization format",
            AuthError::InvalidToken => "Invalid or expired token",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            code: "UNAUTHORIZED".to_string(),
            message: self.message().to_string(),
            request_id: None,
        };

        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::unauthorized(err.message())
    }
}

/// Read the bearer token, if any. A present but malformed header is an error.
pub(crate) async fn bearer_token(parts: &mut Parts) -> Result<Option<String>, AuthError> {
    match TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, &()).await {
        Ok(TypedHeader(Authorization(bearer))) => {
            let token = bearer.token().trim();
            if token.is_empty() {
                Err(AuthError::MissingToken)
            } else {
                Ok(Some(token.to_string()))
            }
        }
        Err(rejection) if rejection.is_missing() => Ok(None),
        Err(_) => Err(AuthError::InvalidFormat),
    }
}

/// Verify a bearer token and build the caller's auth context.
pub(crate) async fn verify(state: &AppState, token: &str) -> Result<AuthContext, AuthError> {
    let claims = state.jwks_cache.verify_token(token).await.map_err(|e| {
        tracing::warn!(error = %e, "JWT verification failed");
        AuthError::InvalidToken
    })?;

    AuthContext::new(claims, token).map_err(|e| {
        tracing::warn!(error = %e, "Token subject is not a user id");
        AuthError::InvalidToken
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).await?.ok_or(AuthError::MissingToken)?;
        let context = verify(state, &token).await?;
        Ok(RequireAuth(context))
    }
}
