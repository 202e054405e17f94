//! URL slugs for listings, categories and community content

use sqlx::PgPool;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Characters kept free at the end of a base slug for a `-N` suffix
const SUFFIX_SPACE: usize = 10;

const SLUG_EDGES: [char; 2] = ['-', '_'];

/// Tables whose rows are addressed by slug
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugTable {
    Categories,
    Tags,
    Materials,
    Designs,
    ForumCategories,
    ForumThreads,
    /// Unique per owning user
    Showcases(Uuid),
}

impl SlugTable {
    fn table(&self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Tags => "tags",
            Self::Materials => "materials",
            Self::Designs => "designs",
            Self::ForumCategories => "forum_categories",
            Self::ForumThreads => "forum_threads",
            Self::Showcases(_) => "showcases",
        }
    }

    fn max_len(&self) -> usize {
        match self {
            Self::ForumCategories => 120,
            Self::Showcases(_) => 220,
            Self::ForumThreads => 270,
            _ => 255,
        }
    }
}

/// Lowercase ASCII slug. Accented letters lose their accents (NFKD) and
/// other non-ASCII characters are dropped. Punctuation is removed without
/// splitting words, while runs of whitespace and dashes become a single `-`.
pub fn slugify(source: &str) -> String {
    let mut slug = String::with_capacity(source.len());
    let mut pending_dash = false;

    for c in source.nfkd().filter(char::is_ascii) {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_ascii_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    slug.trim_matches(SLUG_EDGES).to_string()
}

/// Slug before collision handling, truncated to leave room for a suffix.
/// An empty result falls back to a random token.
pub fn base_slug(source: &str, max_len: usize) -> String {
    let mut base = slugify(source);
    if base.is_empty() {
        base = Uuid::new_v4().simple().to_string()[..12].to_string();
    }

    let limit = max_len.saturating_sub(SUFFIX_SPACE).max(1);
    if base.len() > limit {
        base.truncate(limit);
        base.truncate(base.trim_end_matches(SLUG_EDGES).len());
    }
    base
}

/// First of `base`, `base-1`, `base-2`, ... not already taken.
pub fn first_free(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|s| s == base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Generate a slug for `source` that is unused in `table`.
pub async fn unique_slug(db: &PgPool, table: SlugTable, source: &str) -> Result<String, sqlx::Error> {
    let base = base_slug(source, table.max_len());
    // `_` is a LIKE wildcard; it only widens the match, first_free compares exactly
    let pattern = format!("{}-%", base);

    let taken: Vec<String> = match table {
        SlugTable::Showcases(user_id) => {
            sqlx::query_scalar(
                "SELECT slug FROM showcases WHERE user_id = $1 AND (slug = $2 OR slug LIKE $3)",
            )
            .bind(user_id)
            .bind(&base)
            .bind(&pattern)
            .fetch_all(db)
            .await?
        }
        _ => {
            sqlx::query_scalar(&format!(
                "SELECT slug FROM {} WHERE slug = $1 OR slug LIKE $2",
                table.table()
            ))
            .bind(&base)
            .bind(&pattern)
            .fetch_all(db)
            .await?
        }
    };

    Ok(first_free(&base, &taken))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Organic Cotton Twill"), "organic-cotton-twill");
        assert_eq!(slugify("  100% Linen -- Natural!  "), "100-linen-natural");
        assert_eq!(slugify("___"), "");
        assert_eq!(slugify("snake_case name"), "snake_case-name");
    }

    #[test]
    fn slugify_strips_accents_and_punctuation() {
        assert_eq!(slugify("Crêpe de Chine"), "crepe-de-chine");
        assert_eq!(slugify("Déjà vu"), "deja-vu");
        assert_eq!(slugify("O'Brien's Twill"), "obriens-twill");
        assert_eq!(slugify("Jacquard (Wool/Silk)"), "jacquard-woolsilk");
        // no ASCII decomposition, so the character is dropped
        assert_eq!(slugify("Tweed 北京"), "tweed");
    }

    #[test]
    fn base_slug_leaves_room_for_suffix() {
        let long = "a".repeat(300);
        assert_eq!(base_slug(&long, 255).len(), 245);
        assert_eq!(base_slug(&long, 120).len(), 110);

        let trailing = format!("{}-b", "a".repeat(109));
        assert_eq!(base_slug(&trailing, 120), "a".repeat(109));
    }

    #[test]
    fn empty_source_gets_random_base() {
        let slug = base_slug("!!!", 255);
        assert_eq!(slug.len(), 12);
        assert!(slug.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn collisions_get_numeric_suffix() {
        assert_eq!(first_free("twill", &[]), "twill");

        let taken = vec!["twill".to_string(), "twill-1".to_string()];
        assert_eq!(first_free("twill", &taken), "twill-2");

        let taken = vec!["twill".to_string(), "twill-2".to_string()];
        assert_eq!(first_free("twill", &taken), "twill-1");
    }
}
