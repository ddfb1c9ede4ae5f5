//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! storedir-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `STOREDIR_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//!
//! # Migration Files
//!
//! Table migrations live in `crates/web/migrations/`. The session table is
//! owned by the session store and created through it.

use thiserror::Error;

use storedir_web::db;
use storedir_web::middleware::migrate_session_store;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Apply pending table migrations, then create the session table.
///
/// # Errors
///
/// Returns `MigrationError` if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    let database_url = super::database_url().map_err(MigrationError::MissingEnvVar)?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../web/migrations").run(&pool).await?;

    tracing::info!("Creating session store table...");
    migrate_session_store(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
