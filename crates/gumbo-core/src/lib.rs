//! Core types and policy for the Gumbo learning backend.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! holds the tenant allow-list, the principal and subscription records, the
//! content catalog types, and the pure entitlement policy that gates premium
//! content. All other crates depend on it.

pub mod content;
pub mod entitlement;
pub mod error;
pub mod module;
pub mod principal;
pub mod store;
pub mod subscription;
pub mod tenant;
pub mod webhook;

pub use error::{Error, Result};
