//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Registration, login, profile updates and password resets
//! - `stores` - Listing, slugs, ownership, tags, search, geo, hearts, reviews
//! - `mail` - Password reset email delivery (SMTP or log)
//! - `uploads` - Photo validation, resizing and storage

pub mod auth;
pub mod mail;
pub mod stores;
pub mod uploads;

pub use auth::{AuthError, AuthService};
pub use mail::{LogMailer, MailError, Mailer, OutgoingMail, SmtpMailer};
pub use stores::{StoreError, StorePage, StoreService};
pub use uploads::{PhotoUploader, UploadError};
