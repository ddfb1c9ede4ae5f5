//! User domain types.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;

use storedir_core::{Email, StoreId, UserId};

/// A registered user (domain type).
///
/// The password hash and reset token never leave the repository layer except
/// through dedicated methods, so this type is safe to serialize as the JSON
/// answer of the heart endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Normalized, unique email address.
    pub email: Email,
    /// Hearted stores, oldest first, without duplicates.
    pub hearts: Vec<StoreId>,
    /// When the user registered.
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether `store` is in this user's hearts.
    #[must_use]
    pub fn has_hearted(&self, store: StoreId) -> bool {
        self.hearts.contains(&store)
    }
}

/// A password reset token together with its expiry instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordReset {
    /// 40 hex characters (20 random bytes).
    pub token: String,
    /// The token is rejected at or after this instant.
    pub expires_at: DateTime<Utc>,
}

impl PasswordReset {
    /// Random bytes per token.
    pub const TOKEN_BYTES: usize = 20;

    /// How long a token stays valid after issuance.
    #[must_use]
    pub fn validity() -> Duration {
        Duration::hours(1)
    }

    /// Issue a fresh token valid for one hour from `now`.
    #[must_use]
    pub fn issue(now: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; Self::TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);

        Self {
            token: hex::encode(bytes),
            expires_at: now + Self::validity(),
        }
    }

    /// Whether the token may still be redeemed at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_token_shape() {
        let reset = PasswordReset::issue(Utc::now());
        assert_eq!(reset.token.len(), 40);
        assert!(reset.token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_issue_tokens_differ() {
        let now = Utc::now();
        assert_ne!(PasswordReset::issue(now).token, PasswordReset::issue(now).token);
    }

    #[test]
    fn test_token_valid_strictly_before_expiry() {
        let issued = Utc::now();
        let reset = PasswordReset::issue(issued);

        assert_eq!(reset.expires_at, issued + Duration::hours(1));
        assert!(reset.is_valid_at(issued));
        assert!(reset.is_valid_at(reset.expires_at - Duration::milliseconds(1)));
        assert!(!reset.is_valid_at(reset.expires_at));
        assert!(!reset.is_valid_at(reset.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_user_json_omits_private_fields() {
        let user = User {
            id: UserId::new(3),
            name: "Wes".to_string(),
            email: Email::parse("wes@example.com").unwrap(),
            hearts: vec![StoreId::new(9), StoreId::new(4)],
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 3,
                "name": "Wes",
                "email": "wes@example.com",
                "hearts": [9, 4]
            })
        );
        assert!(user.has_hearted(StoreId::new(4)));
        assert!(!user.has_hearted(StoreId::new(5)));
    }
}
