//! # parley-store
//!
//! SQLite persistence for the Parley chat backend.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model, plus the durable ingestion queue the message relay drains.

pub mod conversations;
pub mod database;
pub mod friend_requests;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod queue;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
