//! Error type for `gumbo-store-sqlite`.

use gumbo_core::{
  store::{StoreError, StoreFailure},
  tenant::TenantError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] gumbo_core::Error),

  #[error("stored tenant is invalid: {0}")]
  Tenant(#[from] TenantError),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("decode error: {0}")]
  Decode(String),

  #[error("email {0:?} is already registered")]
  DuplicateEmail(String),

  #[error("category not found: {0}")]
  CategoryNotFound(uuid::Uuid),

  #[error("topic not found: {0}")]
  TopicNotFound(uuid::Uuid),

  #[error("subscription not found: {0}")]
  SubscriptionNotFound(uuid::Uuid),

  #[error("subscription {0} was modified by another writer")]
  StaleSubscription(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl StoreError for Error {
  fn failure(&self) -> StoreFailure {
    match self {
      Self::DuplicateEmail(_) | Self::StaleSubscription(_) => StoreFailure::Conflict,
      Self::CategoryNotFound(_) | Self::TopicNotFound(_) | Self::SubscriptionNotFound(_) => {
        StoreFailure::NotFound
      }
      _ => StoreFailure::Internal,
    }
  }
}
