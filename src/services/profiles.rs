//! Local profile lookups
//!
//! Supabase owns credentials; every authenticated user also has a row in
//! `profiles` holding their marketplace role. Rows are created by the auth
//! proxy at registration, or lazily the first time a token is seen.

use sqlx::PgPool;
use uuid::Uuid;

use super::cache::{keys, RedisCache};
use crate::auth::AuthContext;
use crate::domain::accounts::{username_from_email, validate_username, Actor, Profile, UserType};
use crate::error::ApiError;

pub const PROFILE_COLUMNS: &str = r#"
    id, email, username, first_name, last_name, user_type, company_name,
    contact_number, address, is_staff, average_rating, review_count,
    created_at, updated_at
"#;

const USERNAME_CONSTRAINT: &str = "profiles_username_key";

pub async fn fetch_profile(db: &PgPool, user_id: Uuid) -> Result<Option<Profile>, ApiError> {
    sqlx::query_as::<_, Profile>(&format!(
        "SELECT {} FROM profiles WHERE id = $1",
        PROFILE_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(db)
    .await
    .map_err(ApiError::database)
}

/// Profile read through the cache.
pub async fn get_profile(
    db: &PgPool,
    cache: &RedisCache,
    user_id: Uuid,
) -> Result<Option<Profile>, ApiError> {
    let key = keys::profile(user_id);
    if let Some(profile) = cache.get::<Profile>(&key).await {
        return Ok(Some(profile));
    }

    let profile = fetch_profile(db, user_id).await?;
    if let Some(ref p) = profile {
        cache.put(&key, p).await;
    }
    Ok(profile)
}

/// Role and staff flag of the caller, creating the profile on first sight.
pub async fn load_actor(
    db: &PgPool,
    cache: &RedisCache,
    auth: &AuthContext,
) -> Result<Actor, ApiError> {
    let key = keys::actor(auth.user_id);
    if let Some(actor) = cache.get::<Actor>(&key).await {
        return Ok(actor);
    }

    let profile = match fetch_profile(db, auth.user_id).await? {
        Some(profile) => profile,
        None => {
            let email = auth
                .email
                .as_deref()
                .ok_or_else(|| ApiError::unauthorized("Token carries no email address"))?;
            let claims = auth.claims();
            let user_type = claims
                .signup_user_type()
                .and_then(|t| t.parse().ok())
                .unwrap_or_default();

            tracing::info!(user_id = %auth.user_id, "Creating profile on first login");
            ensure_profile(db, auth.user_id, email, claims.signup_username(), user_type).await?
        }
    };

    let actor = Actor::from(profile);
    cache.put(&key, &actor).await;
    Ok(actor)
}

/// Insert the profile if it does not exist yet and return it.
///
/// The requested username is tried first; on a username clash a name derived
/// from the email is used instead.
pub async fn ensure_profile(
    db: &PgPool,
    user_id: Uuid,
    email: &str,
    username: Option<&str>,
    user_type: UserType,
) -> Result<Profile, ApiError> {
    if let Some(profile) = fetch_profile(db, user_id).await? {
        return Ok(profile);
    }

    let mut candidates = Vec::with_capacity(2);
    if let Some(requested) = username.filter(|u| validate_username(u).is_ok()) {
        candidates.push(requested.to_string());
    }
    candidates.push(username_from_email(email, user_id));

    for candidate in &candidates {
        let inserted = sqlx::query(
            r#"
            INSERT INTO profiles (id, email, username, user_type)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(candidate)
        .bind(user_type)
        .execute(db)
        .await;

        match inserted {
            Ok(_) => break,
            Err(sqlx::Error::Database(e)) if e.constraint() == Some(USERNAME_CONSTRAINT) => {
                tracing::debug!(user_id = %user_id, username = %candidate, "Username taken");
                continue;
            }
            Err(e) => return Err(ApiError::database(e)),
        }
    }

    fetch_profile(db, user_id)
        .await?
        .ok_or_else(|| ApiError::conflict("Username already taken"))
}

/// Drop every cached view of a user after their profile changed.
pub async fn invalidate(cache: &RedisCache, user_id: Uuid) {
    cache.invalidate(&keys::actor(user_id)).await;
    cache.invalidate(&keys::profile(user_id)).await;
}

/// Stripe customer id stored on the profile, if any.
pub async fn stripe_customer_id(db: &PgPool, user_id: Uuid) -> Result<Option<String>, ApiError> {
    sqlx::query_scalar::<_, Option<String>>(
        "SELECT stripe_customer_id FROM profiles WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .map(Option::flatten)
    .map_err(ApiError::database)
}

pub async fn set_stripe_customer_id(
    db: &PgPool,
    user_id: Uuid,
    customer_id: &str,
) -> Result<(), ApiError> {
    sqlx::query("UPDATE profiles SET stripe_customer_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .bind(customer_id)
        .execute(db)
        .await
        .map_err(ApiError::database)?;
    Ok(())
}
