//! Rating aggregates stored on reviewed materials, designs and profiles
//!
//! Review writes lock the target row with [`lock_target`] and call
//! [`refresh`] in the same transaction, so concurrent reviews of one target
//! recompute its aggregate one after another.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::reviews::{average_rating, ReviewTarget};

fn owner_query(target: ReviewTarget, lock: bool) -> String {
    format!(
        "SELECT {} FROM {} WHERE id = $1{}",
        target.owner_column(),
        target.table(),
        if lock { " FOR UPDATE" } else { "" }
    )
}

/// Owner of a review target, or `None` when the target does not exist.
pub async fn target_owner(
    db: &PgPool,
    target: ReviewTarget,
    target_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar(&owner_query(target, false))
        .bind(target_id)
        .fetch_optional(db)
        .await
}

/// Lock the target row for the rest of `tx` and return its owner.
pub async fn lock_target(
    tx: &mut Transaction<'_, Postgres>,
    target: ReviewTarget,
    target_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar(&owner_query(target, true))
        .bind(target_id)
        .fetch_optional(&mut **tx)
        .await
}

/// Recompute `average_rating` and `review_count` from approved reviews.
pub async fn refresh(
    tx: &mut Transaction<'_, Postgres>,
    target: ReviewTarget,
    target_id: Uuid,
) -> Result<(), sqlx::Error> {
    let ratings: Vec<i16> = sqlx::query_scalar(
        r#"
        SELECT rating FROM reviews
        WHERE target_type = $1 AND target_id = $2 AND is_approved
        "#,
    )
    .bind(target)
    .bind(target_id)
    .fetch_all(&mut **tx)
    .await?;

    let average = average_rating(&ratings);
    let count = ratings.len() as i32;

    sqlx::query(&format!(
        "UPDATE {} SET average_rating = $2, review_count = $3 WHERE id = $1",
        target.table()
    ))
    .bind(target_id)
    .bind(average)
    .bind(count)
    .execute(&mut **tx)
    .await?;

    tracing::debug!(
        target_type = %target,
        target_id = %target_id,
        average = %average,
        count = count,
        "Rating aggregate refreshed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_query_locks_the_target_row() {
        assert_eq!(
            owner_query(ReviewTarget::Material, true),
            "SELECT seller_id FROM materials WHERE id = $1 FOR UPDATE"
        );
        assert_eq!(
            owner_query(ReviewTarget::User, false),
            "SELECT id FROM profiles WHERE id = $1"
        );
    }
}
