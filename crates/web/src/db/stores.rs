//! Store repository for database operations.
//!
//! Full-text search relies on the generated `search` column; nearby lookups
//! compute haversine distance in SQL so ranking and the radius cut-off happen
//! in one query.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use storedir_core::{EARTH_RADIUS_METERS, GeoPoint, Slug, StoreId, UserId};

use super::{RepositoryError, StoreRepository, conflict_on_unique};
use crate::models::{
    NearbyStore, SearchHit, Store, StoreDraft, StoreLocation, TagCount, TopStore,
};

const STORE_COLUMNS: &str =
    "id, name, slug, description, tags, lng, lat, address, photos, author_id, created_at";

#[derive(sqlx::FromRow)]
struct StoreRow {
    id: i32,
    name: String,
    slug: String,
    description: String,
    tags: Vec<String>,
    lng: f64,
    lat: f64,
    address: String,
    photos: Vec<String>,
    author_id: i32,
    created_at: DateTime<Utc>,
}

fn location(lng: f64, lat: f64, address: String) -> Result<StoreLocation, RepositoryError> {
    let point = GeoPoint::new(lng, lat).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid coordinates in database: {e}"))
    })?;
    Ok(StoreLocation { point, address })
}

impl TryFrom<StoreRow> for Store {
    type Error = RepositoryError;

    fn try_from(row: StoreRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: StoreId::new(row.id),
            name: row.name,
            slug: Slug::from_stored(row.slug),
            description: row.description,
            location: location(row.lng, row.lat, row.address)?,
            photos: row.photos,
            tags: row.tags,
            created_at: row.created_at,
            author: UserId::new(row.author_id),
        })
    }
}

#[derive(sqlx::FromRow)]
struct NearbyRow {
    #[sqlx(flatten)]
    store: StoreRow,
    distance: f64,
}

#[derive(sqlx::FromRow)]
struct SearchRow {
    id: i32,
    name: String,
    slug: String,
    description: String,
    score: f32,
}

#[derive(sqlx::FromRow)]
struct TopRow {
    id: i32,
    name: String,
    slug: String,
    photos: Vec<String>,
    review_count: i64,
    average_rating: f64,
}

#[derive(sqlx::FromRow)]
struct TagCountRow {
    tag: String,
    count: i64,
}

fn into_stores(rows: Vec<StoreRow>) -> Result<Vec<Store>, RepositoryError> {
    rows.into_iter().map(Store::try_from).collect()
}

/// `PostgreSQL` implementation of [`StoreRepository`].
pub struct PgStoreRepository {
    pool: PgPool,
}

impl PgStoreRepository {
    /// Create a new store repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreRepository for PgStoreRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Store>, RepositoryError> {
        let rows: Vec<StoreRow> = sqlx::query_as(&format!(
            "SELECT {STORE_COLUMNS} FROM store \
             ORDER BY created_at DESC, id DESC \
             OFFSET $1 LIMIT $2"
        ))
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        into_stores(rows)
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM store")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn get_by_id(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let row: Option<StoreRow> =
            sqlx::query_as(&format!("SELECT {STORE_COLUMNS} FROM store WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Store::try_from).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError> {
        let row: Option<StoreRow> =
            sqlx::query_as(&format!("SELECT {STORE_COLUMNS} FROM store WHERE slug = $1"))
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Store::try_from).transpose()
    }

    async fn count_slug_variants(
        &self,
        base: &Slug,
        excluding: Option<StoreId>,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM store \
             WHERE slug ~ $1 AND ($2::INTEGER IS NULL OR id <> $2)",
        )
        .bind(base.variant_pattern())
        .bind(excluding)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert(
        &self,
        author: UserId,
        slug: &Slug,
        draft: &StoreDraft,
    ) -> Result<Store, RepositoryError> {
        let photos: Vec<String> = draft.photo.iter().cloned().collect();

        let row: StoreRow = sqlx::query_as(&format!(
            "INSERT INTO store (name, slug, description, tags, lng, lat, address, photos, author_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {STORE_COLUMNS}"
        ))
        .bind(&draft.name)
        .bind(slug.as_str())
        .bind(&draft.description)
        .bind(&draft.tags)
        .bind(draft.location.point.lng())
        .bind(draft.location.point.lat())
        .bind(&draft.location.address)
        .bind(photos)
        .bind(author)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "slug"))?;

        row.try_into()
    }

    async fn update(
        &self,
        id: StoreId,
        slug: &Slug,
        draft: &StoreDraft,
    ) -> Result<Store, RepositoryError> {
        let row: Option<StoreRow> = sqlx::query_as(&format!(
            "UPDATE store SET \
                 name = $2, slug = $3, description = $4, tags = $5, \
                 lng = $6, lat = $7, address = $8, \
                 photos = CASE WHEN $9::TEXT IS NULL THEN photos ELSE array_append(photos, $9) END \
             WHERE id = $1 \
             RETURNING {STORE_COLUMNS}"
        ))
        .bind(id)
        .bind(&draft.name)
        .bind(slug.as_str())
        .bind(&draft.description)
        .bind(&draft.tags)
        .bind(draft.location.point.lng())
        .bind(draft.location.point.lat())
        .bind(&draft.location.address)
        .bind(draft.photo.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "slug"))?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Store>, RepositoryError> {
        let rows: Vec<StoreRow> = match tag {
            Some(tag) => {
                sqlx::query_as(&format!(
                    "SELECT {STORE_COLUMNS} FROM store \
                     WHERE $1 = ANY(tags) \
                     ORDER BY created_at DESC, id DESC"
                ))
                .bind(tag)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {STORE_COLUMNS} FROM store \
                     WHERE cardinality(tags) > 0 \
                     ORDER BY created_at DESC, id DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        into_stores(rows)
    }

    async fn tag_counts(&self) -> Result<Vec<TagCount>, RepositoryError> {
        let rows: Vec<TagCountRow> = sqlx::query_as(
            "SELECT tag, COUNT(*) AS count \
             FROM store, unnest(tags) AS tag \
             GROUP BY tag \
             ORDER BY count DESC, tag ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TagCount {
                tag: r.tag,
                count: r.count,
            })
            .collect())
    }

    async fn search(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, RepositoryError> {
        let rows: Vec<SearchRow> = sqlx::query_as(
            "SELECT id, name, slug, description, ts_rank(search, q) AS score \
             FROM store, websearch_to_tsquery('english', $1) AS q \
             WHERE search @@ q \
             ORDER BY score DESC, id DESC \
             LIMIT $2",
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| SearchHit {
                id: StoreId::new(r.id),
                name: r.name,
                slug: Slug::from_stored(r.slug),
                description: r.description,
                score: r.score,
            })
            .collect())
    }

    async fn near(
        &self,
        point: GeoPoint,
        max_distance: f64,
        limit: i64,
    ) -> Result<Vec<NearbyStore>, RepositoryError> {
        let rows: Vec<NearbyRow> = sqlx::query_as(&format!(
            "SELECT * FROM ( \
                 SELECT {STORE_COLUMNS}, \
                     2 * $3 * asin(least(1, sqrt( \
                         power(sin(radians(lat - $2) / 2), 2) + \
                         cos(radians($2)) * cos(radians(lat)) * \
                         power(sin(radians(lng - $1) / 2), 2) \
                     ))) AS distance \
                 FROM store \
             ) AS nearby \
             WHERE distance <= $4 \
             ORDER BY distance ASC, id ASC \
             LIMIT $5"
        ))
        .bind(point.lng())
        .bind(point.lat())
        .bind(EARTH_RADIUS_METERS)
        .bind(max_distance)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let store = Store::try_from(r.store)?;
                Ok(NearbyStore {
                    photo: store.cover_photo().map(str::to_owned),
                    id: store.id,
                    slug: store.slug,
                    name: store.name,
                    description: store.description,
                    location: store.location,
                    distance: r.distance,
                })
            })
            .collect()
    }

    async fn list_by_ids(&self, ids: &[StoreId]) -> Result<Vec<Store>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<i32> = ids.iter().map(StoreId::as_i32).collect();
        let rows: Vec<StoreRow> =
            sqlx::query_as(&format!("SELECT {STORE_COLUMNS} FROM store WHERE id = ANY($1)"))
                .bind(raw)
                .fetch_all(&self.pool)
                .await?;

        let mut by_id: HashMap<StoreId, Store> = into_stores(rows)?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn top(&self, min_reviews: i64, limit: i64) -> Result<Vec<TopStore>, RepositoryError> {
        let rows: Vec<TopRow> = sqlx::query_as(
            "SELECT s.id, s.name, s.slug, s.photos, \
                    COUNT(r.id) AS review_count, \
                    AVG(r.rating)::DOUBLE PRECISION AS average_rating \
             FROM store s \
             JOIN review r ON r.store_id = s.id \
             GROUP BY s.id \
             HAVING COUNT(r.id) >= $1 \
             ORDER BY average_rating DESC, review_count DESC, s.id ASC \
             LIMIT $2",
        )
        .bind(min_reviews)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TopStore {
                id: StoreId::new(r.id),
                name: r.name,
                slug: Slug::from_stored(r.slug),
                photo: r.photos.last().cloned(),
                review_count: r.review_count,
                average_rating: r.average_rating,
            })
            .collect())
    }
}
