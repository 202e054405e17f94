//! Extractors that resolve the caller's marketplace profile

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

use super::middleware::{bearer_token, verify};
use crate::app::AppState;
use crate::domain::accounts::Actor;
use crate::error::ApiError;
use crate::services::profiles;

/// Authenticated caller with role and staff flag loaded from their profile.
/// A profile is created on first sight for users registered outside the proxy.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub actor: Actor,
}

impl std::ops::Deref for CurrentUser {
    type Target = Actor;

    fn deref(&self) -> &Self::Target {
        &self.actor
    }
}

async fn current_user(state: &AppState, token: &str) -> Result<CurrentUser, ApiError> {
    let auth = verify(state, token).await?;
    let actor = profiles::load_actor(&state.db, &state.cache, &auth).await?;
    Ok(CurrentUser { actor })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Missing authorization token"))?;
        current_user(state, &token).await
    }
}

/// Optional authentication: anonymous callers get `None`, but a token that
/// is present and invalid is still rejected.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

impl MaybeUser {
    pub fn actor(&self) -> Option<&Actor> {
        self.0.as_ref().map(|u| &u.actor)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts).await? {
            Some(token) => Ok(MaybeUser(Some(current_user(state, &token).await?))),
            None => Ok(MaybeUser(None)),
        }
    }
}

/// Staff-only extractor
#[derive(Debug, Clone)]
pub struct RequireStaff(pub CurrentUser);

impl std::ops::Deref for RequireStaff {
    type Target = CurrentUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireStaff {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            tracing::warn!(user_id = %user.user_id, "Non-staff user attempted staff action");
            return Err(ApiError::forbidden("Staff access required"));
        }
        Ok(RequireStaff(user))
    }
}
