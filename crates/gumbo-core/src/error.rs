//! Error types for `gumbo-core`.

use thiserror::Error;

use crate::{subscription::SubscriptionStatus, tenant::TenantError};

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Tenant(#[from] TenantError),

  #[error("cannot apply {event} to a {from} subscription")]
  InvalidTransition {
    from:  SubscriptionStatus,
    event: &'static str,
  },

  #[error("unknown content kind: {0:?}")]
  UnknownContentKind(String),

  #[error("malformed webhook payload: {0}")]
  MalformedWebhook(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
