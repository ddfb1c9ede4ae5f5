//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// Another account already uses this email.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password blank or otherwise unusable.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Reset token unknown or past its expiry.
    #[error("password reset token is invalid or has expired")]
    InvalidResetToken,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
