//! `POST /api/webhooks/payments`: payment-provider event ingestion.
//!
//! Body: `{"event": "subscription.charged", "payload": {...}}`.
//!
//! Anything the provider should not retry is acknowledged with 200: applied
//! events, replays, untracked event names, and events that cannot be applied
//! locally. The last group is logged and recorded in the webhook-failure log
//! for reconciliation. Only a malformed payload is answered with 400.

use axum::extract::State;
use chrono::{DateTime, Utc};
use gumbo_core::{
  store::Repository,
  subscription::{PricingConfig, SubscriptionStatus, Transition},
  webhook::{NewWebhookFailure, PaymentEvent},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{
  AppState,
  envelope::Data,
  error::ApiError,
  handlers::{JsonBody, save_transition},
};

#[derive(Debug, Deserialize)]
pub struct WebhookBody {
  pub event:   String,
  #[serde(default)]
  pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
  Applied,
  /// Already reflected locally (provider retry).
  Duplicate,
  /// An event name this service does not track.
  Ignored,
  /// No local subscription carries the referenced provider id.
  Unmatched,
  /// The event conflicts with the local subscription state.
  Rejected,
}

#[derive(Debug, Serialize)]
pub struct Ack {
  pub event:   String,
  pub outcome: WebhookOutcome,
}

/// Hex SHA-256 of the payload's canonical JSON text.
pub fn payload_digest(payload: &Value) -> String {
  hex::encode(Sha256::digest(payload.to_string().as_bytes()))
}

/// Apply one webhook to the store.
pub async fn handle<S: Repository>(
  repo: &S,
  pricing: &PricingConfig,
  event: &str,
  payload: &Value,
  now: DateTime<Utc>,
) -> Result<WebhookOutcome, ApiError> {
  let parsed = match PaymentEvent::parse(event, payload) {
    Ok(Some(parsed)) => parsed,
    Ok(None) => return Ok(WebhookOutcome::Ignored),
    Err(e) => {
      tracing::warn!(event, error = %e, "malformed webhook");
      return Err(ApiError::Validation(e.to_string()));
    }
  };

  let provider_id = parsed.provider_subscription_id();
  let Some(subscription) = repo
    .find_subscription_by_provider_id(provider_id)
    .await
    .map_err(ApiError::store)?
  else {
    tracing::warn!(event, provider_subscription_id = provider_id, "webhook for unknown subscription");
    record_failure(repo, &parsed, "no matching subscription".to_owned(), payload).await?;
    return Ok(WebhookOutcome::Unmatched);
  };

  let (subscription, verdict) =
    save_transition(repo, subscription, |s| parsed.apply(s, now, pricing)).await?;
  match verdict {
    Ok(Transition::Unchanged) => Ok(WebhookOutcome::Duplicate),
    Ok(Transition::Applied) => {
      if subscription.status == SubscriptionStatus::Active {
        repo
          .link_subscription(subscription.principal_id, Some(subscription.subscription_id))
          .await
          .map_err(ApiError::store)?;
      }
      tracing::info!(
        event,
        subscription_id = %subscription.subscription_id,
        status = %subscription.status,
        "webhook applied"
      );
      Ok(WebhookOutcome::Applied)
    }
    Err(e) => {
      tracing::warn!(
        event,
        subscription_id = %subscription.subscription_id,
        error = %e,
        "webhook rejected by subscription state"
      );
      record_failure(repo, &parsed, e.to_string(), payload).await?;
      Ok(WebhookOutcome::Rejected)
    }
  }
}

async fn record_failure<S: Repository>(
  repo: &S,
  event: &PaymentEvent,
  reason: String,
  payload: &Value,
) -> Result<(), ApiError> {
  repo
    .record_webhook_failure(NewWebhookFailure {
      event: event.name().to_owned(),
      provider_subscription_id: Some(event.provider_subscription_id().to_owned()),
      payment_id: event.payment_id().map(str::to_owned),
      reason,
      payload_digest: payload_digest(payload),
    })
    .await
    .map_err(ApiError::store)?;
  Ok(())
}

/// `POST /api/webhooks/payments`
pub async fn receive<S>(
  State(state): State<AppState<S>>,
  JsonBody(body): JsonBody<WebhookBody>,
) -> Result<Data<Ack>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let outcome = handle(
    state.store.as_ref(),
    &state.pricing,
    &body.event,
    &body.payload,
    Utc::now(),
  )
  .await?;
  Ok(Data(Ack { event: body.event, outcome }))
}
