//! One-shot notifications carried across a redirect.
//!
//! Handlers push a [`Flash`] onto the session before redirecting; the next
//! rendered page drains them through [`PageContext`](super::PageContext).

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::models::session_keys;

/// How a flash is styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
    Info,
}

impl FlashKind {
    /// CSS modifier used by the layout template.
    #[must_use]
    pub const fn css_class(self) -> &'static str {
        match self {
            Self::Success => "flash--success",
            Self::Error => "flash--error",
            Self::Info => "flash--info",
        }
    }
}

/// A notification shown once on the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Info,
            message: message.into(),
        }
    }
}

/// Queue a flash for the next rendered page.
///
/// # Errors
///
/// Returns an error if the session cannot be read or modified.
pub async fn push_flash(
    session: &Session,
    flash: Flash,
) -> Result<(), tower_sessions::session::Error> {
    let mut flashes: Vec<Flash> = session
        .get(session_keys::FLASHES)
        .await?
        .unwrap_or_default();
    flashes.push(flash);
    session.insert(session_keys::FLASHES, flashes).await
}

/// Queue several flashes of the same kind, in order.
///
/// # Errors
///
/// Returns an error if the session cannot be read or modified.
pub async fn push_flashes<I>(
    session: &Session,
    kind: FlashKind,
    messages: I,
) -> Result<(), tower_sessions::session::Error>
where
    I: IntoIterator<Item = String>,
{
    let mut flashes: Vec<Flash> = session
        .get(session_keys::FLASHES)
        .await?
        .unwrap_or_default();
    flashes.extend(messages.into_iter().map(|message| Flash { kind, message }));
    session.insert(session_keys::FLASHES, flashes).await
}

/// Remove and return every queued flash.
///
/// # Errors
///
/// Returns an error if the session cannot be read or modified.
pub async fn take_flashes(session: &Session) -> Result<Vec<Flash>, tower_sessions::session::Error> {
    Ok(session
        .remove::<Vec<Flash>>(session_keys::FLASHES)
        .await?
        .unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_flashes_drain_once_in_order() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        push_flash(&session, Flash::success("Saved")).await.unwrap();
        push_flashes(
            &session,
            FlashKind::Error,
            ["One".to_owned(), "Two".to_owned()],
        )
        .await
        .unwrap();

        let flashes = take_flashes(&session).await.unwrap();
        assert_eq!(
            flashes,
            vec![Flash::success("Saved"), Flash::error("One"), Flash::error("Two")]
        );
        assert!(take_flashes(&session).await.unwrap().is_empty());
    }

    #[test]
    fn test_flash_json_shape() {
        let json = serde_json::to_value(Flash::info("Hi")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "info", "message": "Hi"}));
        assert_eq!(FlashKind::Error.css_class(), "flash--error");
    }
}
