//! Seed the database with sample users, stores and reviews.
//!
//! The seed file is JSON; stores and reviews refer to users by email and
//! reviews refer to stores by name:
//!
//! ```json
//! {
//!   "users": [{ "name": "Wes", "email": "wes@example.com", "password": "wes" }],
//!   "stores": [{
//!     "name": "Corner Bakery", "description": "Fresh bread",
//!     "tags": ["Wifi"], "address": "1 Main St",
//!     "lng": -79.38, "lat": 43.65, "author": "wes@example.com"
//!   }],
//!   "reviews": [{
//!     "store": "Corner Bakery", "author": "wes@example.com",
//!     "text": "Great loaf", "rating": 5
//!   }]
//! }
//! ```
//!
//! Records go through the same services the web app uses, so passwords are
//! hashed and slugs are allocated exactly as for form submissions.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use storedir_core::{Email, EmailError, GeoError, GeoPoint, Rating, RatingError, StoreId, UserId};
use storedir_web::db::{self, Repositories};
use storedir_web::models::{NewReview, StoreDraft, StoreLocation};
use storedir_web::services::{AuthError, AuthService, StoreError, StoreService};

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// The seed file could not be read.
    #[error("Could not read seed file: {0}")]
    Io(#[from] std::io::Error),

    /// The seed file is not valid JSON of the expected shape.
    #[error("Invalid seed file: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Creating a user failed.
    #[error("User error: {0}")]
    Auth(#[from] AuthError),

    /// Creating a store or review failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A user email is malformed.
    #[error("Invalid email: {0}")]
    Email(#[from] EmailError),

    /// Store coordinates are out of range.
    #[error("Invalid coordinates: {0}")]
    Geo(#[from] GeoError),

    /// A review rating is out of range.
    #[error("Invalid rating: {0}")]
    Rating(#[from] RatingError),

    /// A record refers to a user or store the file does not define.
    #[error("Unknown {0}: {1}")]
    UnknownReference(&'static str, String),
}

/// Contents of a seed file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub users: Vec<SeedUser>,
    pub stores: Vec<SeedStore>,
    pub reviews: Vec<SeedReview>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedStore {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub address: String,
    pub lng: f64,
    pub lat: f64,
    /// Email of the author.
    pub author: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedReview {
    /// Name of the reviewed store.
    pub store: String,
    /// Email of the reviewer.
    pub author: String,
    pub text: String,
    pub rating: i64,
}

impl SeedStore {
    fn draft(&self) -> Result<StoreDraft, SeedError> {
        Ok(StoreDraft {
            name: self.name.trim().to_owned(),
            description: self.description.trim().to_owned(),
            location: StoreLocation {
                point: GeoPoint::new(self.lng, self.lat)?,
                address: self.address.trim().to_owned(),
            },
            tags: self.tags.clone(),
            photo: None,
        })
    }
}

impl SeedReview {
    fn review(&self) -> Result<NewReview, SeedError> {
        Ok(NewReview {
            text: self.text.trim().to_owned(),
            rating: Rating::new(self.rating)?,
        })
    }
}

/// Parse a seed file's contents.
///
/// # Errors
///
/// Returns `SeedError::Json` if the text is not a valid seed file.
pub fn parse(text: &str) -> Result<SeedFile, SeedError> {
    Ok(serde_json::from_str(text)?)
}

/// Load `file_path` into the database.
///
/// # Errors
///
/// Returns `SeedError` if the file is invalid, references an unknown user or
/// store, or a database operation fails.
pub async fn run(file_path: &str, clear: bool) -> Result<(), SeedError> {
    let database_url = super::database_url().map_err(SeedError::MissingEnvVar)?;

    info!(path = %file_path, "Loading seed file");
    let seed = parse(&tokio::fs::read_to_string(Path::new(file_path)).await?)?;

    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    if clear {
        info!("Clearing existing data");
        sqlx::query("DELETE FROM review").execute(&pool).await?;
        sqlx::query("DELETE FROM store").execute(&pool).await?;
        sqlx::query("DELETE FROM app_user").execute(&pool).await?;
    }

    let repos = Repositories::postgres(pool);
    let auth = AuthService::new(repos.users.as_ref());
    let stores = StoreService::new(
        repos.stores.as_ref(),
        repos.reviews.as_ref(),
        repos.users.as_ref(),
    );

    let mut users: HashMap<String, UserId> = HashMap::new();
    for user in &seed.users {
        let email = Email::normalize(&user.email)?;
        let created = auth.register(&user.name, &email, &user.password).await?;
        users.insert(user.email.clone(), created.id);
    }
    info!(count = users.len(), "Users created");

    let author_of = |email: &str| {
        users
            .get(email)
            .copied()
            .ok_or_else(|| SeedError::UnknownReference("user", email.to_owned()))
    };

    let mut created_stores: HashMap<String, StoreId> = HashMap::new();
    for store in &seed.stores {
        let created = stores.create(author_of(&store.author)?, &store.draft()?).await?;
        created_stores.insert(store.name.clone(), created.id);
    }
    info!(count = created_stores.len(), "Stores created");

    for review in &seed.reviews {
        let store = created_stores
            .get(&review.store)
            .copied()
            .ok_or_else(|| SeedError::UnknownReference("store", review.store.clone()))?;
        stores
            .add_review(author_of(&review.author)?, store, &review.review()?)
            .await?;
    }
    info!(count = seed.reviews.len(), "Reviews created");

    info!("Seeding complete!");
    Ok(())
}
