//! Repository interfaces and their `PostgreSQL` and in-process implementations.
//!
//! # Database: `storedir`
//!
//! ## Tables
//!
//! - `app_user` - Accounts, password hashes, reset tokens and hearted store ids
//! - `store` - Listings with location, photos, tags and a generated search vector
//! - `review` - Star ratings left on stores
//! - `tower_sessions.session` - Session storage (created by `storedir-cli migrate`)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/web/migrations/` and run via:
//! ```bash
//! cargo run -p storedir-cli -- migrate
//! ```
//!
//! Handlers never talk to a pool directly. They go through the
//! [`UserStore`], [`StoreRepository`] and [`ReviewRepository`] traits held by
//! [`Repositories`], so tests can swap in [`memory::MemoryBackend`].

pub mod memory;
pub mod reviews;
pub mod stores;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use storedir_core::{Email, GeoPoint, Slug, StoreId, UserId};

use crate::models::{
    NearbyStore, NewReview, PasswordReset, Review, ReviewView, SearchHit, Store, StoreDraft,
    TagCount, TopStore, User,
};

pub use memory::MemoryBackend;
pub use reviews::PgReviewRepository;
pub use stores::PgStoreRepository;
pub use users::PgUserStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Account persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new account.
    ///
    /// Returns `RepositoryError::Conflict` if the email is taken.
    async fn create(
        &self,
        name: &str,
        email: &Email,
        password_hash: &str,
    ) -> Result<User, RepositoryError>;

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// The user and their argon2 PHC hash.
    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;

    /// Change name and email only.
    ///
    /// Returns `RepositoryError::Conflict` if the email belongs to someone else.
    async fn update_profile(
        &self,
        id: UserId,
        name: &str,
        email: &Email,
    ) -> Result<User, RepositoryError>;

    async fn set_reset_token(
        &self,
        id: UserId,
        reset: &PasswordReset,
    ) -> Result<(), RepositoryError>;

    /// The user holding `token`, if it expires strictly after `now`.
    async fn get_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError>;

    /// Replace the password hash and clear any reset token.
    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<(), RepositoryError>;

    /// Add `store` to the user's hearts, or remove it if already present, in
    /// one atomic step.
    async fn toggle_heart(&self, id: UserId, store: StoreId) -> Result<User, RepositoryError>;
}

/// Store listing persistence and queries.
#[async_trait]
pub trait StoreRepository: Send + Sync {
    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Newest first.
    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Store>, RepositoryError>;

    async fn count(&self) -> Result<i64, RepositoryError>;

    async fn get_by_id(&self, id: StoreId) -> Result<Option<Store>, RepositoryError>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError>;

    /// Number of stores, other than `excluding`, whose slug is `base` or `base-N`.
    async fn count_slug_variants(
        &self,
        base: &Slug,
        excluding: Option<StoreId>,
    ) -> Result<i64, RepositoryError>;

    async fn insert(
        &self,
        author: UserId,
        slug: &Slug,
        draft: &StoreDraft,
    ) -> Result<Store, RepositoryError>;

    /// Overwrite the editable fields, appending `draft.photo` if present.
    async fn update(
        &self,
        id: StoreId,
        slug: &Slug,
        draft: &StoreDraft,
    ) -> Result<Store, RepositoryError>;

    /// Stores carrying `tag`, or every store with at least one tag.
    async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Store>, RepositoryError>;

    /// Distinct tags, most used first.
    async fn tag_counts(&self) -> Result<Vec<TagCount>, RepositoryError>;

    /// Full-text matches, most relevant first.
    async fn search(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, RepositoryError>;

    /// Stores within `max_distance` metres of `point`, nearest first.
    async fn near(
        &self,
        point: GeoPoint,
        max_distance: f64,
        limit: i64,
    ) -> Result<Vec<NearbyStore>, RepositoryError>;

    /// Stores with the given ids, in the order of `ids`.
    async fn list_by_ids(&self, ids: &[StoreId]) -> Result<Vec<Store>, RepositoryError>;

    /// Stores with at least `min_reviews` reviews, best average rating first.
    async fn top(&self, min_reviews: i64, limit: i64) -> Result<Vec<TopStore>, RepositoryError>;
}

/// Review persistence.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn insert(
        &self,
        author: UserId,
        store: StoreId,
        review: &NewReview,
    ) -> Result<Review, RepositoryError>;

    /// Newest first, with author names.
    async fn list_for_store(&self, store: StoreId) -> Result<Vec<ReviewView>, RepositoryError>;
}

/// The repositories handed to services.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserStore>,
    pub stores: Arc<dyn StoreRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
}

impl Repositories {
    /// `PostgreSQL`-backed repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            stores: Arc::new(PgStoreRepository::new(pool.clone())),
            reviews: Arc::new(PgReviewRepository::new(pool)),
        }
    }

    /// In-process repositories sharing one [`MemoryBackend`].
    #[must_use]
    pub fn in_memory(backend: MemoryBackend) -> Self {
        let backend = Arc::new(backend);
        Self {
            users: backend.clone(),
            stores: backend.clone(),
            reviews: backend,
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique violation to `Conflict`, anything else to `Database`.
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}
