//! CLI command implementations.

pub mod migrate;
pub mod seed;

use secrecy::SecretString;

/// Database URL from `STOREDIR_DATABASE_URL`, falling back to `DATABASE_URL`.
///
/// # Errors
///
/// Returns the name of the missing variable.
pub fn database_url() -> Result<SecretString, &'static str> {
    dotenvy::dotenv().ok();

    std::env::var("STOREDIR_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| "STOREDIR_DATABASE_URL not set")
}
