//! HTTP handlers, grouped by route prefix.

pub mod accounts;
pub mod admin;
pub mod catalog;
pub mod subscriptions;
pub mod webhooks;

use axum::extract::FromRequest;
use gumbo_core::{
  store::{Repository, StoreError as _, StoreFailure},
  subscription::{Subscription, Transition},
};
use serde::Serialize;

use crate::{envelope::Data, error::ApiError};

/// Attempts [`save_transition`] makes before reporting a conflict.
const SAVE_ATTEMPTS: usize = 3;

/// [`axum::Json`] with rejections reported through [`ApiError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

#[derive(Debug, Serialize)]
pub struct Health {
  pub status: &'static str,
}

/// `GET /health`
pub async fn health() -> Data<Health> { Data(Health { status: "ok" }) }

/// JSON 404 for unmatched routes.
pub async fn fallback() -> ApiError { ApiError::NotFound("route not found".to_owned()) }

/// Apply `change` to `subscription` and persist the result.
///
/// When another writer saved the record since it was read, the fresh copy is
/// reloaded and `change` runs again against it. The closure's own verdict is
/// returned alongside the final record; only store failures surface as the
/// outer error.
pub async fn save_transition<S, F>(
  repo: &S,
  mut subscription: Subscription,
  mut change: F,
) -> Result<(Subscription, gumbo_core::Result<Transition>), ApiError>
where
  S: Repository,
  F: FnMut(&mut Subscription) -> gumbo_core::Result<Transition>,
{
  for _ in 0..SAVE_ATTEMPTS {
    let verdict = change(&mut subscription);
    if !matches!(verdict, Ok(Transition::Applied)) {
      return Ok((subscription, verdict));
    }
    match repo.save_subscription(&subscription).await {
      Ok(()) => {
        subscription.revision += 1;
        return Ok((subscription, verdict));
      }
      Err(e) if e.failure() == StoreFailure::Conflict => {
        tracing::debug!(
          subscription_id = %subscription.subscription_id,
          "subscription changed underneath; reloading"
        );
        let id = subscription.subscription_id;
        subscription = repo
          .get_subscription(id)
          .await
          .map_err(ApiError::store)?
          .ok_or_else(|| ApiError::NotFound(format!("subscription {id} not found")))?;
      }
      Err(e) => return Err(ApiError::store(e)),
    }
  }
  Err(ApiError::Conflict(format!(
    "subscription {} is being modified concurrently",
    subscription.subscription_id
  )))
}
