//! Session middleware configuration.
//!
//! Sessions live in `PostgreSQL` via tower-sessions; cookies are signed with
//! the configured session secret.

use secrecy::ExposeSecret;
use sqlx::PgPool;
use tower_sessions::{
    Expiry, SessionManagerLayer, SessionStore, cookie::Key, service::SignedCookie,
};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::{ConfigError, StoreDirConfig};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "storedir_session";

/// Session expiry time in seconds (14 days).
const SESSION_EXPIRY_SECONDS: i64 = 14 * 24 * 60 * 60;

/// How often expired session rows are purged.
pub const EXPIRED_SESSION_SWEEP: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// The `PostgreSQL` session store.
#[must_use]
pub fn postgres_store(pool: &PgPool) -> PostgresStore {
    PostgresStore::new(pool.clone())
}

/// Create the session table if it does not exist.
///
/// # Errors
///
/// Returns `sqlx::Error` if the schema cannot be created.
pub async fn migrate_session_store(pool: &PgPool) -> Result<(), sqlx::Error> {
    postgres_store(pool).migrate().await
}

/// Create the session layer over `store` with signed cookies.
///
/// # Arguments
///
/// * `store` - Session store (`PostgresStore` in production)
/// * `config` - Web configuration (for session secret and cookie security)
///
/// # Errors
///
/// Returns `ConfigError::InsecureSecret` if the secret cannot be used as a
/// signing key.
pub fn create_session_layer<S: SessionStore + Clone>(
    store: S,
    config: &StoreDirConfig,
) -> Result<SessionManagerLayer<S, SignedCookie>, ConfigError> {
    let key = Key::try_from(config.session_secret.expose_secret().as_bytes()).map_err(|e| {
        ConfigError::InsecureSecret("STOREDIR_SESSION_SECRET".to_string(), e.to_string())
    })?;

    Ok(SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_https())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
        .with_signed(key))
}
