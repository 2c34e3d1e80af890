//! SQLite backend for the Gumbo access-control store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every tenant-scoped table carries a
//! `tenant` column and every catalog query filters on it.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
