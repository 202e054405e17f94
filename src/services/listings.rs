//! Listing queries shared by the material, design and category routes
//!
//! Listings are read through a derived table that joins in the owner's
//! username and the category slug, so filters and `ORDER BY` can name those
//! columns without qualification.

use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::accounts::Actor;
use crate::domain::listings::{
    Certification, Design, DesignResponse, Material, MaterialResponse, Tag, TechPack,
};

pub const MATERIAL_SOURCE: &str = r#"
    (SELECT m.id, m.seller_id, p.username AS seller_username, m.name, m.slug, m.description,
            m.category_id, c.slug AS category_slug, m.image_url, m.price_per_unit, m.unit,
            m.minimum_order_quantity, m.stock_quantity, m.sku, m.composition, m.weight_gsm,
            m.width_cm, m.country_of_origin, m.lead_time_days, m.is_active, m.is_verified,
            m.average_rating, m.review_count, m.created_at, m.updated_at
     FROM materials m
     JOIN profiles p ON p.id = m.seller_id
     LEFT JOIN categories c ON c.id = m.category_id) AS material
"#;

pub const DESIGN_SOURCE: &str = r#"
    (SELECT d.id, d.designer_id, p.username AS designer_username, d.title, d.slug,
            d.description, d.category_id, c.slug AS category_slug, d.image_url, d.price,
            d.licensing_terms, d.design_files_link, d.is_active, d.is_verified,
            d.average_rating, d.review_count, d.created_at, d.updated_at
     FROM designs d
     JOIN profiles p ON p.id = d.designer_id
     LEFT JOIN categories c ON c.id = d.category_id) AS design
"#;

/// Visibility predicate over `$1` (viewer id, nullable) and `$2` (staff flag)
/// for a listing whose owner column is `owner`.
pub fn visibility(owner: &str) -> String {
    format!("(is_active OR {} = $1 OR $2)", owner)
}

/// Bind values for [`visibility`]
pub fn viewer(actor: Option<&Actor>) -> (Option<Uuid>, bool) {
    (actor.map(|a| a.user_id), actor.is_some_and(|a| a.is_staff))
}

/// Join tables linking listings to tags and certifications
#[derive(Debug, Clone, Copy)]
pub enum LinkTable {
    MaterialTags,
    MaterialCertifications,
    DesignTags,
    DesignCertifications,
}

impl LinkTable {
    fn columns(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::MaterialTags => ("material_tags", "material_id", "tag_id"),
            Self::MaterialCertifications => {
                ("material_certifications", "material_id", "certification_id")
            }
            Self::DesignTags => ("design_tags", "design_id", "tag_id"),
            Self::DesignCertifications => {
                ("design_certifications", "design_id", "certification_id")
            }
        }
    }
}

/// Replace the links of `owner_id` with `ids`.
pub async fn set_links(
    tx: &mut Transaction<'_, Postgres>,
    link: LinkTable,
    owner_id: Uuid,
    ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    let (table, owner_col, target_col) = link.columns();

    sqlx::query(&format!("DELETE FROM {} WHERE {} = $1", table, owner_col))
        .bind(owner_id)
        .execute(&mut **tx)
        .await?;

    if !ids.is_empty() {
        sqlx::query(&format!(
            "INSERT INTO {} ({}, {}) SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
            table, owner_col, target_col
        ))
        .bind(owner_id)
        .bind(ids)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn tags_for<'e, E>(executor: E, link: LinkTable, owner_id: Uuid) -> Result<Vec<Tag>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let (table, owner_col, _) = link.columns();
    sqlx::query_as::<_, Tag>(&format!(
        r#"
        SELECT t.id, t.name, t.slug
        FROM tags t JOIN {} l ON l.tag_id = t.id
        WHERE l.{} = $1
        ORDER BY t.name
        "#,
        table, owner_col
    ))
    .bind(owner_id)
    .fetch_all(executor)
    .await
}

async fn certifications_for<'e, E>(
    executor: E,
    link: LinkTable,
    owner_id: Uuid,
) -> Result<Vec<Certification>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let (table, owner_col, _) = link.columns();
    sqlx::query_as::<_, Certification>(&format!(
        r#"
        SELECT ce.id, ce.name, ce.issuing_body, ce.description
        FROM certifications ce JOIN {} l ON l.certification_id = ce.id
        WHERE l.{} = $1
        ORDER BY ce.name
        "#,
        table, owner_col
    ))
    .bind(owner_id)
    .fetch_all(executor)
    .await
}

pub async fn fetch_material(db: &PgPool, slug: &str) -> Result<Option<Material>, sqlx::Error> {
    sqlx::query_as::<_, Material>(&format!("SELECT * FROM {} WHERE slug = $1", MATERIAL_SOURCE))
        .bind(slug)
        .fetch_optional(db)
        .await
}

pub async fn fetch_design(db: &PgPool, slug: &str) -> Result<Option<Design>, sqlx::Error> {
    sqlx::query_as::<_, Design>(&format!("SELECT * FROM {} WHERE slug = $1", DESIGN_SOURCE))
        .bind(slug)
        .fetch_optional(db)
        .await
}

pub async fn material_response(
    db: &PgPool,
    material: Material,
) -> Result<MaterialResponse, sqlx::Error> {
    let tags = tags_for(db, LinkTable::MaterialTags, material.id).await?;
    let certifications =
        certifications_for(db, LinkTable::MaterialCertifications, material.id).await?;
    Ok(MaterialResponse {
        material,
        tags,
        certifications,
    })
}

pub async fn design_response(db: &PgPool, design: Design) -> Result<DesignResponse, sqlx::Error> {
    let tags = tags_for(db, LinkTable::DesignTags, design.id).await?;
    let certifications = certifications_for(db, LinkTable::DesignCertifications, design.id).await?;
    let tech_packs = tech_packs(db, design.id).await?;
    Ok(DesignResponse {
        design,
        tags,
        certifications,
        tech_packs,
    })
}

pub async fn tech_packs(db: &PgPool, design_id: Uuid) -> Result<Vec<TechPack>, sqlx::Error> {
    sqlx::query_as::<_, TechPack>(
        r#"
        SELECT id, design_id, file_url, version, notes, created_at
        FROM tech_packs
        WHERE design_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(design_id)
    .fetch_all(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::accounts::UserType;

    #[test]
    fn viewer_binds() {
        assert_eq!(viewer(None), (None, false));

        let actor = Actor {
            user_id: Uuid::new_v4(),
            username: "loom".to_string(),
            email: "loom@example.com".to_string(),
            user_type: UserType::Seller,
            is_staff: true,
        };
        assert_eq!(viewer(Some(&actor)), (Some(actor.user_id), true));
        assert_eq!(visibility("seller_id"), "(is_active OR seller_id = $1 OR $2)");
    }
}
