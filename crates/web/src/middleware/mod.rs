//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP context on events)
//! 2. Request ID (reuse or generate `x-request-id`)
//! 3. `TraceLayer` (request span including the request id)
//! 4. Session layer (tower-sessions, signed cookie)
//!
//! Authentication is not a layer: handlers opt in with the [`RequireAuth`]
//! extractor, and pages pick up the user and flashes through [`PageContext`].

pub mod auth;
pub mod flash;
pub mod request_id;
pub mod session;

pub use auth::{
    LOGIN_REQUIRED_MESSAGE, PageContext, RequireAuth, clear_current_user, set_current_user,
};
pub use flash::{Flash, FlashKind, push_flash, push_flashes, take_flashes};
pub use request_id::{RequestId, make_request_span, request_id_middleware};
pub use session::{create_session_layer, migrate_session_store, postgres_store};
