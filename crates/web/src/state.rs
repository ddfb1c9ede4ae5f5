//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StoreDirConfig;
use crate::db::Repositories;
use crate::services::{AuthService, Mailer, PhotoUploader, StoreService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and hands out services built
/// over the injected repositories.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StoreDirConfig,
    repos: Repositories,
    mailer: Arc<dyn Mailer>,
    photos: PhotoUploader,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Web configuration
    /// * `repos` - Repository implementations (`PostgreSQL` or in-process)
    /// * `mailer` - Outgoing mail delivery
    #[must_use]
    pub fn new(config: StoreDirConfig, repos: Repositories, mailer: Arc<dyn Mailer>) -> Self {
        let photos = PhotoUploader::new(config.uploads_dir.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                repos,
                mailer,
                photos,
            }),
        }
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreDirConfig {
        &self.inner.config
    }

    /// Get a reference to the repositories.
    #[must_use]
    pub fn repos(&self) -> &Repositories {
        &self.inner.repos
    }

    /// Authentication service over the user repository.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(self.inner.repos.users.as_ref())
    }

    /// Store service over the store, review and user repositories.
    #[must_use]
    pub fn stores(&self) -> StoreService<'_> {
        let repos = &self.inner.repos;
        StoreService::new(
            repos.stores.as_ref(),
            repos.reviews.as_ref(),
            repos.users.as_ref(),
        )
    }

    /// Outgoing mail delivery.
    #[must_use]
    pub fn mailer(&self) -> &dyn Mailer {
        self.inner.mailer.as_ref()
    }

    /// Photo upload handling.
    #[must_use]
    pub fn photos(&self) -> &PhotoUploader {
        &self.inner.photos
    }
}
