//! Store directory web application library.
//!
//! This crate provides the web application as a library, allowing the
//! router to be tested against in-process repositories and reused by the
//! CLI for migrations.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod validation;

pub use routes::app;
