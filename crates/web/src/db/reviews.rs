//! Review repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use storedir_core::{Rating, ReviewId, StoreId, UserId};

use super::{RepositoryError, ReviewRepository};
use crate::models::{NewReview, Review, ReviewView};

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: i32,
    author_id: i32,
    store_id: i32,
    text: String,
    rating: i16,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = Rating::new(i64::from(row.rating)).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid rating in database: {e}"))
        })?;

        Ok(Self {
            id: ReviewId::new(row.id),
            author: UserId::new(row.author_id),
            store: StoreId::new(row.store_id),
            text: row.text,
            rating,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReviewViewRow {
    #[sqlx(flatten)]
    review: ReviewRow,
    author_name: String,
}

/// `PostgreSQL` implementation of [`ReviewRepository`].
pub struct PgReviewRepository {
    pool: PgPool,
}

impl PgReviewRepository {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewRepository for PgReviewRepository {
    async fn insert(
        &self,
        author: UserId,
        store: StoreId,
        review: &NewReview,
    ) -> Result<Review, RepositoryError> {
        let row: ReviewRow = sqlx::query_as(
            "INSERT INTO review (author_id, store_id, text, rating) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, author_id, store_id, text, rating, created_at",
        )
        .bind(author)
        .bind(store)
        .bind(&review.text)
        .bind(i16::from(review.rating))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::NotFound;
            }
            RepositoryError::Database(e)
        })?;

        row.try_into()
    }

    async fn list_for_store(&self, store: StoreId) -> Result<Vec<ReviewView>, RepositoryError> {
        let rows: Vec<ReviewViewRow> = sqlx::query_as(
            "SELECT r.id, r.author_id, r.store_id, r.text, r.rating, r.created_at, \
                    u.name AS author_name \
             FROM review r \
             JOIN app_user u ON u.id = r.author_id \
             WHERE r.store_id = $1 \
             ORDER BY r.created_at DESC, r.id DESC",
        )
        .bind(store)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(ReviewView {
                    review: r.review.try_into()?,
                    author_name: r.author_name,
                })
            })
            .collect()
    }
}
