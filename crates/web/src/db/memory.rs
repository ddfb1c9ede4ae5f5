//! In-process repository backend.
//!
//! Implements every repository trait over plain collections behind a
//! `tokio::sync::RwLock`. Used by the router tests and handy for local
//! experiments without a database. Query semantics follow the `PostgreSQL`
//! implementations closely: same ordering, same limits, same slug variant
//! rule. Full-text ranking is approximated by counting term occurrences,
//! with name hits weighted above description hits.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use storedir_core::{Email, GeoPoint, ReviewId, Slug, StoreId, UserId};

use super::{RepositoryError, ReviewRepository, StoreRepository, UserStore};
use crate::models::{
    NearbyStore, NewReview, PasswordReset, Review, ReviewView, SearchHit, Store, StoreDraft,
    TagCount, TopStore, User,
};

struct UserRecord {
    user: User,
    password_hash: String,
    reset: Option<PasswordReset>,
}

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    stores: Vec<Store>,
    reviews: Vec<Review>,
    next_id: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: UserId) -> Option<&UserRecord> {
        self.users.iter().find(|r| r.user.id == id)
    }

    fn user_mut(&mut self, id: UserId) -> Option<&mut UserRecord> {
        self.users.iter_mut().find(|r| r.user.id == id)
    }

    fn email_taken(&self, email: &Email, except: Option<UserId>) -> bool {
        self.users
            .iter()
            .any(|r| &r.user.email == email && Some(r.user.id) != except)
    }

    fn slug_taken(&self, slug: &Slug, except: Option<StoreId>) -> bool {
        self.stores
            .iter()
            .any(|s| s.slug == *slug && Some(s.id) != except)
    }

    /// Newest first, ties broken by id.
    fn stores_newest_first(&self) -> Vec<Store> {
        let mut stores = self.stores.clone();
        stores.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        stores
    }
}

/// Repository backend holding everything in memory.
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    /// An empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_usize(n: i64) -> usize {
    usize::try_from(n.max(0)).unwrap_or(usize::MAX)
}

#[async_trait]
impl UserStore for MemoryBackend {
    async fn create(
        &self,
        name: &str,
        email: &Email,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(email, None) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let user = User {
            id: UserId::new(tables.next_id()),
            name: name.to_owned(),
            email: email.clone(),
            hearts: Vec::new(),
            created_at: Utc::now(),
        };
        tables.users.push(UserRecord {
            user: user.clone(),
            password_hash: password_hash.to_owned(),
            reset: None,
        });
        Ok(user)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.user(id).map(|r| r.user.clone()))
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|r| &r.user.email == email)
            .map(|r| r.user.clone()))
    }

    async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|r| &r.user.email == email)
            .map(|r| (r.user.clone(), r.password_hash.clone())))
    }

    async fn update_profile(
        &self,
        id: UserId,
        name: &str,
        email: &Email,
    ) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(email, Some(id)) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let record = tables.user_mut(id).ok_or(RepositoryError::NotFound)?;
        record.user.name = name.to_owned();
        record.user.email = email.clone();
        Ok(record.user.clone())
    }

    async fn set_reset_token(
        &self,
        id: UserId,
        reset: &PasswordReset,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let record = tables.user_mut(id).ok_or(RepositoryError::NotFound)?;
        record.reset = Some(reset.clone());
        Ok(())
    }

    async fn get_by_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|r| {
                r.reset
                    .as_ref()
                    .is_some_and(|reset| reset.token == token && reset.is_valid_at(now))
            })
            .map(|r| r.user.clone()))
    }

    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let record = tables.user_mut(id).ok_or(RepositoryError::NotFound)?;
        password_hash.clone_into(&mut record.password_hash);
        record.reset = None;
        Ok(())
    }

    async fn toggle_heart(&self, id: UserId, store: StoreId) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        let record = tables.user_mut(id).ok_or(RepositoryError::NotFound)?;
        if record.user.has_hearted(store) {
            record.user.hearts.retain(|s| *s != store);
        } else {
            record.user.hearts.push(store);
        }
        Ok(record.user.clone())
    }
}

#[async_trait]
impl StoreRepository for MemoryBackend {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Store>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .stores_newest_first()
            .into_iter()
            .skip(to_usize(skip))
            .take(to_usize(limit))
            .collect())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(to_i64(self.tables.read().await.stores.len()))
    }

    async fn get_by_id(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.stores.iter().find(|s| s.id == id).cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .stores
            .iter()
            .find(|s| s.slug.as_str() == slug)
            .cloned())
    }

    async fn count_slug_variants(
        &self,
        base: &Slug,
        excluding: Option<StoreId>,
    ) -> Result<i64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(to_i64(
            tables
                .stores
                .iter()
                .filter(|s| Some(s.id) != excluding && base.is_variant(s.slug.as_str()))
                .count(),
        ))
    }

    async fn insert(
        &self,
        author: UserId,
        slug: &Slug,
        draft: &StoreDraft,
    ) -> Result<Store, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.slug_taken(slug, None) {
            return Err(RepositoryError::Conflict("slug already exists".to_owned()));
        }

        let store = Store {
            id: StoreId::new(tables.next_id()),
            name: draft.name.clone(),
            slug: slug.clone(),
            description: draft.description.clone(),
            location: draft.location.clone(),
            photos: draft.photo.iter().cloned().collect(),
            tags: draft.tags.clone(),
            created_at: Utc::now(),
            author,
        };
        tables.stores.push(store.clone());
        Ok(store)
    }

    async fn update(
        &self,
        id: StoreId,
        slug: &Slug,
        draft: &StoreDraft,
    ) -> Result<Store, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.slug_taken(slug, Some(id)) {
            return Err(RepositoryError::Conflict("slug already exists".to_owned()));
        }

        let store = tables
            .stores
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(RepositoryError::NotFound)?;
        store.name.clone_from(&draft.name);
        store.slug = slug.clone();
        store.description.clone_from(&draft.description);
        store.location = draft.location.clone();
        store.tags.clone_from(&draft.tags);
        if let Some(photo) = &draft.photo {
            store.photos.push(photo.clone());
        }
        Ok(store.clone())
    }

    async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Store>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .stores_newest_first()
            .into_iter()
            .filter(|s| tag.map_or(!s.tags.is_empty(), |t| s.has_tag(t)))
            .collect())
    }

    async fn tag_counts(&self) -> Result<Vec<TagCount>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for tag in tables.stores.iter().flat_map(|s| &s.tags) {
            *counts.entry(tag.as_str()).or_default() += 1;
        }

        let mut tags: Vec<TagCount> = counts
            .into_iter()
            .map(|(tag, count)| TagCount {
                tag: tag.to_owned(),
                count,
            })
            .collect();
        tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        Ok(tags)
    }

    async fn search(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, RepositoryError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let tables = self.tables.read().await;
        let mut hits: Vec<SearchHit> = tables
            .stores
            .iter()
            .filter_map(|s| {
                let name = s.name.to_lowercase();
                let description = s.description.to_lowercase();
                let hits: usize = terms
                    .iter()
                    .map(|t| {
                        2 * name.matches(t.as_str()).count()
                            + description.matches(t.as_str()).count()
                    })
                    .sum();
                #[allow(clippy::cast_precision_loss)] // term counts are tiny
                let score = hits as f32;
                (hits > 0).then(|| SearchHit {
                    id: s.id,
                    name: s.name.clone(),
                    slug: s.slug.clone(),
                    description: s.description.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(b.id.cmp(&a.id)));
        hits.truncate(to_usize(limit));
        Ok(hits)
    }

    async fn near(
        &self,
        point: GeoPoint,
        max_distance: f64,
        limit: i64,
    ) -> Result<Vec<NearbyStore>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut nearby: Vec<NearbyStore> = tables
            .stores
            .iter()
            .filter_map(|s| {
                let distance = point.distance_meters(&s.location.point);
                (distance <= max_distance).then(|| NearbyStore {
                    id: s.id,
                    slug: s.slug.clone(),
                    name: s.name.clone(),
                    description: s.description.clone(),
                    location: s.location.clone(),
                    photo: s.cover_photo().map(str::to_owned),
                    distance,
                })
            })
            .collect();

        nearby.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        nearby.truncate(to_usize(limit));
        Ok(nearby)
    }

    async fn list_by_ids(&self, ids: &[StoreId]) -> Result<Vec<Store>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.stores.iter().find(|s| s.id == *id).cloned())
            .collect())
    }

    async fn top(&self, min_reviews: i64, limit: i64) -> Result<Vec<TopStore>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut top: Vec<TopStore> = tables
            .stores
            .iter()
            .filter_map(|s| {
                let ratings: Vec<u32> = tables
                    .reviews
                    .iter()
                    .filter(|r| r.store == s.id)
                    .map(|r| u32::from(r.rating.stars()))
                    .collect();
                let review_count = to_i64(ratings.len());
                if ratings.is_empty() || review_count < min_reviews {
                    return None;
                }
                #[allow(clippy::cast_precision_loss)] // review counts are tiny
                let average_rating = f64::from(ratings.iter().sum::<u32>()) / ratings.len() as f64;
                Some(TopStore {
                    id: s.id,
                    name: s.name.clone(),
                    slug: s.slug.clone(),
                    photo: s.cover_photo().map(str::to_owned),
                    review_count,
                    average_rating,
                })
            })
            .collect();

        top.sort_by(|a, b| {
            b.average_rating
                .total_cmp(&a.average_rating)
                .then(b.review_count.cmp(&a.review_count))
                .then(a.id.cmp(&b.id))
        });
        top.truncate(to_usize(limit));
        Ok(top)
    }
}

#[async_trait]
impl ReviewRepository for MemoryBackend {
    async fn insert(
        &self,
        author: UserId,
        store: StoreId,
        review: &NewReview,
    ) -> Result<Review, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.stores.iter().any(|s| s.id == store) || tables.user(author).is_none() {
            return Err(RepositoryError::NotFound);
        }

        let review = Review {
            id: ReviewId::new(tables.next_id()),
            author,
            store,
            text: review.text.clone(),
            rating: review.rating,
            created_at: Utc::now(),
        };
        tables.reviews.push(review.clone());
        Ok(review)
    }

    async fn list_for_store(&self, store: StoreId) -> Result<Vec<ReviewView>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut reviews: Vec<ReviewView> = tables
            .reviews
            .iter()
            .filter(|r| r.store == store)
            .map(|r| ReviewView {
                review: r.clone(),
                author_name: tables
                    .user(r.author)
                    .map(|u| u.user.name.clone())
                    .unwrap_or_default(),
            })
            .collect();

        reviews.sort_by(|a, b| {
            b.review
                .created_at
                .cmp(&a.review.created_at)
                .then(b.review.id.cmp(&a.review.id))
        });
        Ok(reviews)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::StoreLocation;
    use storedir_core::Rating;

    fn draft(name: &str, lng: f64, lat: f64, tags: &[&str]) -> StoreDraft {
        StoreDraft {
            name: name.to_owned(),
            description: format!("{name} serves coffee"),
            location: StoreLocation {
                point: GeoPoint::new(lng, lat).unwrap(),
                address: "1 Main St".to_owned(),
            },
            tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            photo: None,
        }
    }

    async fn author(backend: &MemoryBackend) -> User {
        UserStore::create(
            backend,
            "Wes",
            &Email::parse("wes@example.com").unwrap(),
            "hash",
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let backend = MemoryBackend::new();
        author(&backend).await;

        let result = UserStore::create(
            &backend,
            "Other",
            &Email::parse("wes@example.com").unwrap(),
            "hash",
        )
        .await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_toggle_heart_adds_then_removes() {
        let backend = MemoryBackend::new();
        let user = author(&backend).await;
        let store = StoreId::new(42);

        let hearted = backend.toggle_heart(user.id, store).await.unwrap();
        assert_eq!(hearted.hearts, vec![store]);

        let unhearted = backend.toggle_heart(user.id, store).await.unwrap();
        assert!(unhearted.hearts.is_empty());
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paginates() {
        let backend = MemoryBackend::new();
        let user = author(&backend).await;
        for name in ["One", "Two", "Three"] {
            StoreRepository::insert(&backend, user.id, &Slug::from_name(name), &draft(name, 0.0, 0.0, &[]))
                .await
                .unwrap();
        }

        let page: Vec<String> = backend
            .list(1, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(page, vec!["Two", "One"]);
        assert_eq!(backend.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_slug_variants_exclude_self() {
        let backend = MemoryBackend::new();
        let user = author(&backend).await;
        let base = Slug::from_name("Cafe");
        let first = StoreRepository::insert(&backend, user.id, &base, &draft("Cafe", 0.0, 0.0, &[]))
            .await
            .unwrap();
        StoreRepository::insert(&backend, user.id, &base.with_suffix(2), &draft("Cafe", 0.0, 0.0, &[]))
            .await
            .unwrap();
        StoreRepository::insert(&backend, user.id, &Slug::from_name("Cafeteria"), &draft("Cafeteria", 0.0, 0.0, &[]))
            .await
            .unwrap();

        assert_eq!(backend.count_slug_variants(&base, None).await.unwrap(), 2);
        assert_eq!(
            backend
                .count_slug_variants(&base, Some(first.id))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_near_filters_by_radius_and_sorts() {
        let backend = MemoryBackend::new();
        let user = author(&backend).await;
        // Roughly 1.1 km and 5.5 km north of the origin, then one far away.
        for (name, lat) in [("Far", 0.05), ("Close", 0.01), ("Away", 1.0)] {
            StoreRepository::insert(&backend, user.id, &Slug::from_name(name), &draft(name, 0.0, lat, &[]))
                .await
                .unwrap();
        }

        let nearby = backend
            .near(GeoPoint::new(0.0, 0.0).unwrap(), 10_000.0, 10)
            .await
            .unwrap();
        let names: Vec<&str> = nearby.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Close", "Far"]);
        assert!(nearby.iter().all(|s| s.distance <= 10_000.0));
    }

    #[tokio::test]
    async fn test_tag_counts_sorted_by_count() {
        let backend = MemoryBackend::new();
        let user = author(&backend).await;
        StoreRepository::insert(&backend, user.id, &Slug::from_name("A"), &draft("A", 0.0, 0.0, &["Wifi", "Licensed"]))
            .await
            .unwrap();
        StoreRepository::insert(&backend, user.id, &Slug::from_name("B"), &draft("B", 0.0, 0.0, &["Wifi"]))
            .await
            .unwrap();
        StoreRepository::insert(&backend, user.id, &Slug::from_name("C"), &draft("C", 0.0, 0.0, &[]))
            .await
            .unwrap();

        let counts = backend.tag_counts().await.unwrap();
        assert_eq!(
            counts,
            vec![
                TagCount { tag: "Wifi".to_owned(), count: 2 },
                TagCount { tag: "Licensed".to_owned(), count: 1 },
            ]
        );
        assert_eq!(backend.list_by_tag(None).await.unwrap().len(), 2);
        assert_eq!(backend.list_by_tag(Some("Licensed")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_top_requires_two_reviews() {
        let backend = MemoryBackend::new();
        let user = author(&backend).await;
        let popular = StoreRepository::insert(&backend, user.id, &Slug::from_name("Popular"), &draft("Popular", 0.0, 0.0, &[]))
            .await
            .unwrap();
        let lonely = StoreRepository::insert(&backend, user.id, &Slug::from_name("Lonely"), &draft("Lonely", 0.0, 0.0, &[]))
            .await
            .unwrap();

        for (store, stars) in [(popular.id, 4), (popular.id, 5), (lonely.id, 5)] {
            ReviewRepository::insert(
                &backend,
                user.id,
                store,
                &NewReview {
                    text: "Nice".to_owned(),
                    rating: Rating::new(stars).unwrap(),
                },
            )
            .await
            .unwrap();
        }

        let top = backend.top(2, 10).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top.first().unwrap().id, popular.id);
        assert!((top.first().unwrap().average_rating - 4.5).abs() < f64::EPSILON);
    }
}
