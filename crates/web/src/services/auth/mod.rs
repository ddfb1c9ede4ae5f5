//! Authentication service.
//!
//! Provides password registration and login, profile updates and the
//! forgot/reset password token flow.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use tracing::instrument;

use storedir_core::{Email, UserId};

use crate::db::{RepositoryError, UserStore};
use crate::models::{PasswordReset, User};

/// Authentication service.
///
/// Handles registration, login, profile changes and password resets.
pub struct AuthService<'a> {
    users: &'a dyn UserStore,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(users: &'a dyn UserStore) -> Self {
        Self { users }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new user with a normalized email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` if the password is blank.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn register(
        &self,
        name: &str,
        email: &Email,
        password: &str,
    ) -> Result<User, AuthError> {
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create(name.trim(), email, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// The email is normalized first, so `Wes@GoogleMail.com` finds the
    /// account registered as `wes@gmail.com`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::normalize(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        Ok(user)
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Change a user's display name and email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserAlreadyExists` if the email belongs to another account.
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        name: &str,
        email: &Email,
    ) -> Result<User, AuthError> {
        self.users
            .update_profile(user_id, name.trim(), email)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                RepositoryError::NotFound => AuthError::UserNotFound,
                other => AuthError::Repository(other),
            })
    }

    // =========================================================================
    // Password Reset
    // =========================================================================

    /// Issue and persist a reset token for the account registered under `email`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if no account uses this email.
    #[instrument(skip(self))]
    pub async fn start_password_reset(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<(User, PasswordReset), AuthError> {
        let email = Email::normalize(email).map_err(|_| AuthError::UserNotFound)?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let reset = PasswordReset::issue(now);
        self.users.set_reset_token(user.id, &reset).await?;

        tracing::info!(user_id = %user.id, "password reset token issued");
        Ok((user, reset))
    }

    /// The account a still-valid reset token belongs to.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidResetToken` if the token is unknown or expired.
    pub async fn user_for_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        self.users
            .get_by_reset_token(token, now)
            .await?
            .ok_or(AuthError::InvalidResetToken)
    }

    /// Redeem a reset token, replacing the password and clearing the token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidResetToken` if the token is unknown or expired.
    /// Returns `AuthError::WeakPassword` if the new password is blank.
    #[instrument(skip(self, token, password))]
    pub async fn reset_password(
        &self,
        token: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        let user = self.user_for_reset_token(token, now).await?;

        validate_password(password)?;
        let password_hash = hash_password(password)?;
        self.users.set_password(user.id, &password_hash).await?;

        tracing::info!(user_id = %user.id, "password reset");
        Ok(user)
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::WeakPassword(
            "password cannot be blank".to_owned(),
        ));
    }

    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::MemoryBackend;

    fn email(s: &str) -> Email {
        Email::normalize(s).unwrap()
    }

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash).is_ok());
        assert!(matches!(
            verify_password("hunter3", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_blank_password_rejected() {
        assert!(matches!(
            validate_password(""),
            Err(AuthError::WeakPassword(_))
        ));
        assert!(validate_password(" ").is_ok());
    }

    #[tokio::test]
    async fn test_register_then_login_with_variant_email() {
        let backend = MemoryBackend::new();
        let auth = AuthService::new(&backend);

        let user = auth
            .register("Wes", &email("wes@googlemail.com"), "pizza")
            .await
            .unwrap();
        assert_eq!(user.email.as_str(), "wes@gmail.com");

        let logged_in = auth.login("  WES@googlemail.com ", "pizza").await.unwrap();
        assert_eq!(logged_in.id, user.id);

        assert!(matches!(
            auth.login("wes@gmail.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody@gmail.com", "pizza").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let backend = MemoryBackend::new();
        let auth = AuthService::new(&backend);

        auth.register("Wes", &email("wes@example.com"), "a")
            .await
            .unwrap();
        let again = auth.register("Wes", &email("WES@example.com"), "b").await;
        assert!(matches!(again, Err(AuthError::UserAlreadyExists)));
    }

    #[tokio::test]
    async fn test_reset_token_flow() {
        let backend = MemoryBackend::new();
        let auth = AuthService::new(&backend);
        auth.register("Wes", &email("wes@example.com"), "old")
            .await
            .unwrap();

        let now = Utc::now();
        let (_, reset) = auth
            .start_password_reset("wes@example.com", now)
            .await
            .unwrap();

        // Expired exactly at the expiry instant.
        assert!(matches!(
            auth.user_for_reset_token(&reset.token, reset.expires_at).await,
            Err(AuthError::InvalidResetToken)
        ));
        assert!(
            auth.user_for_reset_token(&reset.token, now + Duration::minutes(59))
                .await
                .is_ok()
        );

        auth.reset_password(&reset.token, "new", now).await.unwrap();
        assert!(auth.login("wes@example.com", "new").await.is_ok());
        assert!(auth.login("wes@example.com", "old").await.is_err());

        // Tokens are single-use.
        assert!(matches!(
            auth.reset_password(&reset.token, "again", now).await,
            Err(AuthError::InvalidResetToken)
        ));
    }

    #[tokio::test]
    async fn test_forgot_unknown_email() {
        let backend = MemoryBackend::new();
        let auth = AuthService::new(&backend);

        assert!(matches!(
            auth.start_password_reset("ghost@example.com", Utc::now()).await,
            Err(AuthError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_update_profile_conflict() {
        let backend = MemoryBackend::new();
        let auth = AuthService::new(&backend);
        let wes = auth
            .register("Wes", &email("wes@example.com"), "a")
            .await
            .unwrap();
        auth.register("Kait", &email("kait@example.com"), "b")
            .await
            .unwrap();

        let updated = auth
            .update_profile(wes.id, "  Wesley ", &email("wesley@example.com"))
            .await
            .unwrap();
        assert_eq!(updated.name, "Wesley");

        assert!(matches!(
            auth.update_profile(wes.id, "Wes", &email("kait@example.com"))
                .await,
            Err(AuthError::UserAlreadyExists)
        ));
    }
}
