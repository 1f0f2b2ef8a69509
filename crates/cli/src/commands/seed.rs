//! Seed reference data.

use super::{CommandError, connect};

/// A collection inserted by `seed collections`.
struct DefaultCollection {
    name: &'static str,
    slug: &'static str,
    description: &'static str,
    image_url: &'static str,
}

const DEFAULT_COLLECTIONS: &[DefaultCollection] = &[
    DefaultCollection {
        name: "Summer Essentials",
        slug: "summer-essentials",
        description: "Curated pieces for the warmer days ahead.",
        image_url: "https://images.unsplash.com/photo-1523381210434-271e8be1f52b?q=80&w=1000&auto=format&fit=crop",
    },
    DefaultCollection {
        name: "Modern Tailoring",
        slug: "modern-tailoring",
        description: "Sharp silhouettes for the contemporary professional.",
        image_url: "https://images.unsplash.com/photo-1507679799987-c73779587ccf?q=80&w=1000&auto=format&fit=crop",
    },
    DefaultCollection {
        name: "Evening Wear",
        slug: "evening-wear",
        description: "Elegant attire for your most memorable nights.",
        image_url: "https://images.unsplash.com/photo-1566174053879-31528523f8ae?q=80&w=1000&auto=format&fit=crop",
    },
    DefaultCollection {
        name: "Accessories",
        slug: "accessories",
        description: "The finishing touches that make the outfit.",
        image_url: "https://images.unsplash.com/photo-1576053139778-7e32f2ae3cfd?q=80&w=1000&auto=format&fit=crop",
    },
];

/// Insert the default collections. Existing slugs are left untouched.
///
/// # Errors
///
/// Returns an error if the database is unreachable or an insert fails.
pub async fn collections() -> Result<u64, CommandError> {
    let pool = connect().await?;

    let mut inserted = 0;
    for collection in DEFAULT_COLLECTIONS {
        let result = sqlx::query(
            r"
            INSERT INTO collection (name, slug, description, image_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (slug) DO NOTHING
            ",
        )
        .bind(collection.name)
        .bind(collection.slug)
        .bind(collection.description)
        .bind(collection.image_url)
        .execute(&pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::info!(slug = collection.slug, "Collection exists, skipped");
        } else {
            tracing::info!(slug = collection.slug, "Collection seeded");
            inserted += 1;
        }
    }

    tracing::info!(inserted, "Collection seeding complete");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::DEFAULT_COLLECTIONS;

    #[test]
    fn test_default_slugs_are_unique_and_well_formed() {
        let slugs: HashSet<_> = DEFAULT_COLLECTIONS.iter().map(|c| c.slug).collect();
        assert_eq!(slugs.len(), DEFAULT_COLLECTIONS.len());
        assert!(slugs.iter().all(|s| {
            s.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        }));
    }
}
