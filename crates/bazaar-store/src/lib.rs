//! # bazaar-store
//!
//! Relational catalog storage for Bazaar, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection`, a small [`DbPool`] that hands out one handle per
//! request, and typed operations for every domain model. The review/rating
//! consistency engine lives in [`reviews`]; the category-tree read path in
//! [`categories`] and [`products`].

pub mod categories;
pub mod database;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod products;
pub mod reviews;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
pub use pool::{DbPool, PooledDatabase};
