//! Store listing service.
//!
//! Pagination, slug allocation, ownership checks, tag browsing, search,
//! nearby lookups, hearts, top-rated ranking and reviews.

use thiserror::Error;
use tracing::instrument;

use storedir_core::{GeoPoint, Slug, StoreId, UserId};

use crate::db::{RepositoryError, ReviewRepository, StoreRepository, UserStore};
use crate::models::{
    NearbyStore, NewReview, Review, SearchHit, Store, StoreDetail, StoreDraft, TagCount, TopStore,
    User,
};

/// Stores per listing page.
pub const PAGE_SIZE: i64 = 6;
/// Maximum search results.
pub const SEARCH_LIMIT: i64 = 5;
/// Radius of the nearby lookup in metres.
pub const NEAR_MAX_DISTANCE_METERS: f64 = 10_000.0;
/// Maximum nearby results.
pub const NEAR_LIMIT: i64 = 10;
/// Reviews a store needs before it can be ranked.
pub const TOP_MIN_REVIEWS: i64 = 2;
/// Maximum top-rated results.
pub const TOP_LIMIT: i64 = 10;
/// Slug allocations tried before a concurrent-write conflict is returned.
const SLUG_ATTEMPTS: u32 = 3;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No store with that id or slug.
    #[error("store not found")]
    NotFound,

    /// The acting user did not author the store.
    #[error("store belongs to another user")]
    NotOwner,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Outcome of a listing page request.
#[derive(Debug)]
pub enum StorePage {
    /// The requested page exists (or is the empty first page).
    Page {
        stores: Vec<Store>,
        page: i64,
        pages: i64,
        count: i64,
    },
    /// The requested page is past the end; `last` is the last valid page.
    Overflow { requested: i64, last: i64 },
}

/// Number of pages needed for `count` stores, at least one.
#[must_use]
pub fn page_count(count: i64) -> i64 {
    ((count + PAGE_SIZE - 1) / PAGE_SIZE).max(1)
}

/// Store service over the repository traits.
pub struct StoreService<'a> {
    stores: &'a dyn StoreRepository,
    reviews: &'a dyn ReviewRepository,
    users: &'a dyn UserStore,
}

impl<'a> StoreService<'a> {
    /// Create a new store service.
    #[must_use]
    pub const fn new(
        stores: &'a dyn StoreRepository,
        reviews: &'a dyn ReviewRepository,
        users: &'a dyn UserStore,
    ) -> Self {
        Self {
            stores,
            reviews,
            users,
        }
    }

    /// One page of the listing, newest first.
    ///
    /// Pages below 1 are treated as page 1.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if a query fails.
    pub async fn page(&self, page: i64) -> Result<StorePage, StoreError> {
        let page = page.max(1);
        let skip = (page - 1).saturating_mul(PAGE_SIZE);

        let (stores, count) =
            tokio::try_join!(self.stores.list(skip, PAGE_SIZE), self.stores.count())?;
        let pages = page_count(count);

        if stores.is_empty() && skip > 0 {
            return Ok(StorePage::Overflow {
                requested: page,
                last: pages,
            });
        }

        Ok(StorePage::Page {
            stores,
            page,
            pages,
            count,
        })
    }

    /// A store by slug with its author name and reviews.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no store has this slug.
    pub async fn detail(&self, slug: &str) -> Result<StoreDetail, StoreError> {
        let store = self
            .stores
            .get_by_slug(slug)
            .await?
            .ok_or(StoreError::NotFound)?;

        let (author, reviews) = tokio::try_join!(
            self.users.get_by_id(store.author),
            self.reviews.list_for_store(store.id)
        )?;

        Ok(StoreDetail {
            store,
            author_name: author.map(|u| u.name).unwrap_or_default(),
            reviews,
        })
    }

    /// Create a store authored by `author`.
    ///
    /// If another store claims the allocated slug between allocation and
    /// insert, a fresh slug is allocated and the insert retried.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if the insert fails.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create(&self, author: UserId, draft: &StoreDraft) -> Result<Store, StoreError> {
        let mut attempt = 1;
        let store = loop {
            let slug = self.unique_slug(&draft.name, None).await?;
            match self.stores.insert(author, &slug, draft).await {
                Err(RepositoryError::Conflict(reason)) if attempt < SLUG_ATTEMPTS => {
                    tracing::warn!(slug = %slug, reason = %reason, "slug claimed concurrently");
                    attempt += 1;
                }
                result => break result?,
            }
        };

        tracing::info!(store_id = %store.id, slug = %store.slug, "store created");
        Ok(store)
    }

    /// A store the acting user may edit.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the store doesn't exist.
    /// Returns `StoreError::NotOwner` if `user` did not author it.
    pub async fn editable(&self, id: StoreId, user: UserId) -> Result<Store, StoreError> {
        let store = self
            .stores
            .get_by_id(id)
            .await?
            .ok_or(StoreError::NotFound)?;

        if !store.is_authored_by(user) {
            tracing::warn!(store_id = %id, user_id = %user, "edit attempt by non-owner");
            return Err(StoreError::NotOwner);
        }
        Ok(store)
    }

    /// Update a store owned by `user`.
    ///
    /// The slug is regenerated only when the name changes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the store doesn't exist.
    /// Returns `StoreError::NotOwner` if `user` did not author it.
    #[instrument(skip(self, draft))]
    pub async fn update(
        &self,
        id: StoreId,
        user: UserId,
        draft: &StoreDraft,
    ) -> Result<Store, StoreError> {
        let existing = self.editable(id, user).await?;
        let renamed = existing.name != draft.name;

        let mut slug = existing.slug;
        let mut attempt = 1;
        let store = loop {
            if renamed {
                slug = self.unique_slug(&draft.name, Some(id)).await?;
            }
            match self.stores.update(id, &slug, draft).await {
                Ok(store) => break store,
                Err(RepositoryError::Conflict(reason)) if renamed && attempt < SLUG_ATTEMPTS => {
                    tracing::warn!(slug = %slug, reason = %reason, "slug claimed concurrently");
                    attempt += 1;
                }
                Err(RepositoryError::NotFound) => return Err(StoreError::NotFound),
                Err(other) => return Err(StoreError::Repository(other)),
            }
        };

        tracing::info!(store_id = %store.id, slug = %store.slug, "store updated");
        Ok(store)
    }

    /// Allocate a slug for `name` that no other store uses.
    async fn unique_slug(
        &self,
        name: &str,
        excluding: Option<StoreId>,
    ) -> Result<Slug, StoreError> {
        let base = Slug::from_name(name);
        let taken = self.stores.count_slug_variants(&base, excluding).await?;
        if taken == 0 {
            return Ok(base);
        }

        // A store literally named "Cafe 2" can already hold the computed
        // suffix, so keep counting until the candidate is free.
        let mut n = usize::try_from(taken).unwrap_or(usize::MAX).saturating_add(1);
        loop {
            let candidate = base.with_suffix(n);
            match self.stores.get_by_slug(candidate.as_str()).await? {
                Some(other) if Some(other.id) != excluding => n = n.saturating_add(1),
                _ => return Ok(candidate),
            }
        }
    }

    /// Stores carrying `tag` (or any tag) together with every tag's count.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if a query fails.
    pub async fn by_tag(
        &self,
        tag: Option<&str>,
    ) -> Result<(Vec<Store>, Vec<TagCount>), StoreError> {
        let (stores, tags) =
            tokio::try_join!(self.stores.list_by_tag(tag), self.stores.tag_counts())?;
        Ok((stores, tags))
    }

    /// Full-text search, at most [`SEARCH_LIMIT`] hits.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if the query fails.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.stores.search(query, SEARCH_LIMIT).await?)
    }

    /// Stores within [`NEAR_MAX_DISTANCE_METERS`] of `point`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if the query fails.
    pub async fn near(&self, point: GeoPoint) -> Result<Vec<NearbyStore>, StoreError> {
        Ok(self
            .stores
            .near(point, NEAR_MAX_DISTANCE_METERS, NEAR_LIMIT)
            .await?)
    }

    /// Heart or un-heart `store` for `user`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the store doesn't exist.
    #[instrument(skip(self))]
    pub async fn toggle_heart(&self, user: UserId, store: StoreId) -> Result<User, StoreError> {
        if self.stores.get_by_id(store).await?.is_none() {
            return Err(StoreError::NotFound);
        }

        Ok(self.users.toggle_heart(user, store).await?)
    }

    /// The stores `user` has hearted, in the order they were hearted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if a query fails.
    pub async fn hearts(&self, user: UserId) -> Result<Vec<Store>, StoreError> {
        let Some(user) = self.users.get_by_id(user).await? else {
            return Ok(Vec::new());
        };
        Ok(self.stores.list_by_ids(&user.hearts).await?)
    }

    /// Best-rated stores with at least [`TOP_MIN_REVIEWS`] reviews.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if the query fails.
    pub async fn top(&self) -> Result<Vec<TopStore>, StoreError> {
        Ok(self.stores.top(TOP_MIN_REVIEWS, TOP_LIMIT).await?)
    }

    /// Leave a review on `store`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the store doesn't exist.
    #[instrument(skip(self, review))]
    pub async fn add_review(
        &self,
        author: UserId,
        store: StoreId,
        review: &NewReview,
    ) -> Result<Review, StoreError> {
        if self.stores.get_by_id(store).await?.is_none() {
            return Err(StoreError::NotFound);
        }

        let review = self
            .reviews
            .insert(author, store, review)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => StoreError::NotFound,
                other => StoreError::Repository(other),
            })?;

        tracing::info!(review_id = %review.id, store_id = %store, "review saved");
        Ok(review)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::db::MemoryBackend;
    use crate::models::StoreLocation;
    use storedir_core::{Email, Rating};

    fn draft(name: &str) -> StoreDraft {
        StoreDraft {
            name: name.to_owned(),
            description: "Fresh bread".to_owned(),
            location: StoreLocation {
                point: GeoPoint::new(-79.38, 43.65).unwrap(),
                address: "1 Queen St W".to_owned(),
            },
            tags: vec!["Wifi".to_owned()],
            photo: None,
        }
    }

    async fn user(backend: &MemoryBackend, email: &str) -> User {
        UserStore::create(backend, "Wes", &Email::parse(email).unwrap(), "hash")
            .await
            .unwrap()
    }

    fn service(backend: &MemoryBackend) -> StoreService<'_> {
        StoreService::new(backend, backend, backend)
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0), 1);
        assert_eq!(page_count(6), 1);
        assert_eq!(page_count(7), 2);
        assert_eq!(page_count(13), 3);
    }

    #[tokio::test]
    async fn test_page_overflow_points_to_last_page() {
        let backend = MemoryBackend::new();
        let wes = user(&backend, "wes@example.com").await;
        let svc = service(&backend);
        for i in 0..7 {
            svc.create(wes.id, &draft(&format!("Store {i}"))).await.unwrap();
        }

        match svc.page(2).await.unwrap() {
            StorePage::Page { stores, pages, .. } => {
                assert_eq!(stores.len(), 1);
                assert_eq!(pages, 2);
            }
            StorePage::Overflow { .. } => panic!("page 2 exists"),
        }

        match svc.page(9).await.unwrap() {
            StorePage::Overflow { requested, last } => {
                assert_eq!(requested, 9);
                assert_eq!(last, 2);
            }
            StorePage::Page { .. } => panic!("page 9 does not exist"),
        }
    }

    #[tokio::test]
    async fn test_page_zero_is_first_page() {
        let backend = MemoryBackend::new();
        let svc = service(&backend);

        match svc.page(0).await.unwrap() {
            StorePage::Page { page, stores, .. } => {
                assert_eq!(page, 1);
                assert!(stores.is_empty());
            }
            StorePage::Overflow { .. } => panic!("empty first page is not an overflow"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_names_get_numbered_slugs() {
        let backend = MemoryBackend::new();
        let wes = user(&backend, "wes@example.com").await;
        let svc = service(&backend);

        let a = svc.create(wes.id, &draft("Bakery")).await.unwrap();
        let b = svc.create(wes.id, &draft("Bakery")).await.unwrap();
        let c = svc.create(wes.id, &draft("Bakery")).await.unwrap();

        assert_eq!(a.slug.as_str(), "bakery");
        assert_eq!(b.slug.as_str(), "bakery-2");
        assert_eq!(c.slug.as_str(), "bakery-3");
    }

    /// Stores where a rival claims the slug right before the first insert.
    struct RivalClaimsSlug<'a> {
        inner: &'a MemoryBackend,
        rival: UserId,
        raced: AtomicBool,
    }

    #[async_trait]
    impl StoreRepository for RivalClaimsSlug<'_> {
        async fn ping(&self) -> Result<(), RepositoryError> {
            StoreRepository::ping(self.inner).await
        }

        async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Store>, RepositoryError> {
            self.inner.list(skip, limit).await
        }

        async fn count(&self) -> Result<i64, RepositoryError> {
            self.inner.count().await
        }

        async fn get_by_id(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
            StoreRepository::get_by_id(self.inner, id).await
        }

        async fn get_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError> {
            self.inner.get_by_slug(slug).await
        }

        async fn count_slug_variants(
            &self,
            base: &Slug,
            excluding: Option<StoreId>,
        ) -> Result<i64, RepositoryError> {
            self.inner.count_slug_variants(base, excluding).await
        }

        async fn insert(
            &self,
            author: UserId,
            slug: &Slug,
            draft: &StoreDraft,
        ) -> Result<Store, RepositoryError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                StoreRepository::insert(self.inner, self.rival, slug, draft).await?;
            }
            StoreRepository::insert(self.inner, author, slug, draft).await
        }

        async fn update(
            &self,
            id: StoreId,
            slug: &Slug,
            draft: &StoreDraft,
        ) -> Result<Store, RepositoryError> {
            StoreRepository::update(self.inner, id, slug, draft).await
        }

        async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Store>, RepositoryError> {
            self.inner.list_by_tag(tag).await
        }

        async fn tag_counts(&self) -> Result<Vec<TagCount>, RepositoryError> {
            self.inner.tag_counts().await
        }

        async fn search(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, RepositoryError> {
            self.inner.search(query, limit).await
        }

        async fn near(
            &self,
            point: GeoPoint,
            max_distance: f64,
            limit: i64,
        ) -> Result<Vec<NearbyStore>, RepositoryError> {
            self.inner.near(point, max_distance, limit).await
        }

        async fn list_by_ids(&self, ids: &[StoreId]) -> Result<Vec<Store>, RepositoryError> {
            self.inner.list_by_ids(ids).await
        }

        async fn top(&self, min_reviews: i64, limit: i64) -> Result<Vec<TopStore>, RepositoryError> {
            self.inner.top(min_reviews, limit).await
        }
    }

    #[tokio::test]
    async fn test_create_retries_when_slug_is_claimed_concurrently() {
        let backend = MemoryBackend::new();
        let wes = user(&backend, "wes@example.com").await;
        let kait = user(&backend, "kait@example.com").await;
        let stores = RivalClaimsSlug {
            inner: &backend,
            rival: kait.id,
            raced: AtomicBool::new(false),
        };
        let svc = StoreService::new(&stores, &backend, &backend);

        let store = svc.create(wes.id, &draft("Bakery")).await.unwrap();

        assert_eq!(store.slug.as_str(), "bakery-2");
        assert_eq!(store.author, wes.id);
        let rival = backend.get_by_slug("bakery").await.unwrap().unwrap();
        assert_eq!(rival.author, kait.id);
    }

    #[tokio::test]
    async fn test_update_requires_owner_and_reslugs_on_rename() {
        let backend = MemoryBackend::new();
        let wes = user(&backend, "wes@example.com").await;
        let kait = user(&backend, "kait@example.com").await;
        let svc = service(&backend);
        let store = svc.create(wes.id, &draft("Bakery")).await.unwrap();

        assert!(matches!(
            svc.update(store.id, kait.id, &draft("Stolen")).await,
            Err(StoreError::NotOwner)
        ));
        assert!(matches!(
            svc.editable(StoreId::new(999), wes.id).await,
            Err(StoreError::NotFound)
        ));

        let same = svc.update(store.id, wes.id, &draft("Bakery")).await.unwrap();
        assert_eq!(same.slug.as_str(), "bakery");

        let mut renamed = draft("Bread House");
        renamed.photo = Some("a.jpeg".to_owned());
        let updated = svc.update(store.id, wes.id, &renamed).await.unwrap();
        assert_eq!(updated.slug.as_str(), "bread-house");
        assert_eq!(updated.cover_photo(), Some("a.jpeg"));
    }

    #[tokio::test]
    async fn test_toggle_heart_twice_unhearts() {
        let backend = MemoryBackend::new();
        let wes = user(&backend, "wes@example.com").await;
        let svc = service(&backend);
        let store = svc.create(wes.id, &draft("Bakery")).await.unwrap();

        let user = svc.toggle_heart(wes.id, store.id).await.unwrap();
        assert_eq!(user.hearts, vec![store.id]);
        assert_eq!(svc.hearts(wes.id).await.unwrap().len(), 1);

        let user = svc.toggle_heart(wes.id, store.id).await.unwrap();
        assert!(user.hearts.is_empty());

        assert!(matches!(
            svc.toggle_heart(wes.id, StoreId::new(999)).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_search_blank_query_is_empty() {
        let backend = MemoryBackend::new();
        let wes = user(&backend, "wes@example.com").await;
        let svc = service(&backend);
        svc.create(wes.id, &draft("Bakery")).await.unwrap();

        assert!(svc.search("   ").await.unwrap().is_empty());
        let hits = svc.search("bakery").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug.as_str(), "bakery");
    }

    #[tokio::test]
    async fn test_reviews_feed_detail_and_top() {
        let backend = MemoryBackend::new();
        let wes = user(&backend, "wes@example.com").await;
        let svc = service(&backend);
        let store = svc.create(wes.id, &draft("Bakery")).await.unwrap();

        for stars in [3, 5] {
            svc.add_review(
                wes.id,
                store.id,
                &NewReview {
                    text: "Good".to_owned(),
                    rating: Rating::new(stars).unwrap(),
                },
            )
            .await
            .unwrap();
        }

        let detail = svc.detail("bakery").await.unwrap();
        assert_eq!(detail.author_name, "Wes");
        assert_eq!(detail.reviews.len(), 2);
        assert_eq!(detail.average_rating(), Some(4.0));

        let top = svc.top().await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].review_count, 2);

        assert!(matches!(
            svc.add_review(
                wes.id,
                StoreId::new(999),
                &NewReview {
                    text: "Ghost".to_owned(),
                    rating: Rating::new(1).unwrap(),
                },
            )
            .await,
            Err(StoreError::NotFound)
        ));
    }
}
