//! End-to-end tests for the store directory.
//!
//! These drive a running server over HTTP, the way a browser would.
//!
//! # Running Tests
//!
//! ```bash
//! # Migrate a fresh database and start the server
//! cargo run -p storedir-cli -- migrate
//! cargo run -p storedir-web
//!
//! # Run the ignored tests against it
//! STOREDIR_BASE_URL=http://localhost:7777 \
//!     cargo test -p storedir-integration-tests -- --ignored
//! ```
//!
//! Each test registers its own user with a random email, so runs don't
//! collide with each other or with seed data.
