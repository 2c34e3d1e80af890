//! Handlers for `/api/subscriptions`.

use axum::{body::Bytes, extract::State};
use chrono::Utc;
use gumbo_core::{
  store::Repository,
  subscription::{NewSubscription, Plan, Subscription, SubscriptionStatus, pending_ttl},
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  auth::RequireAuth,
  envelope::{Created, Data},
  error::ApiError,
  handlers::{JsonBody, save_transition},
  payments::CheckoutSession,
};

#[derive(Debug, Serialize)]
pub struct Current {
  pub subscription:  Option<Subscription>,
  pub is_subscribed: bool,
}

/// `GET /api/subscriptions/current`
pub async fn current(RequireAuth(ctx): RequireAuth) -> Data<Current> {
  let is_subscribed = ctx.viewer().is_subscribed(Utc::now());
  Data(Current { subscription: ctx.subscription, is_subscribed })
}

// ─── Checkout ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
  pub plan: Plan,
}

#[derive(Debug, Serialize)]
pub struct Checkout {
  pub subscription: Subscription,
  pub checkout:     CheckoutSession,
}

/// `POST /api/subscriptions/checkout`
///
/// Creates a `pending` subscription that a payment webhook later activates.
/// A fresh pending checkout for the same plan is returned as-is; one for a
/// different plan is cancelled first.
pub async fn checkout<S>(
  State(state): State<AppState<S>>,
  RequireAuth(ctx): RequireAuth,
  JsonBody(body): JsonBody<CheckoutBody>,
) -> Result<Created<Checkout>, ApiError>
where
  S: Repository + Clone + 'static,
{
  if ctx.subscription.is_some() {
    return Err(ApiError::Conflict("an active subscription already exists".to_owned()));
  }

  let now = Utc::now();
  let principal = &ctx.principal;
  let history = state
    .store
    .list_subscriptions(principal.principal_id)
    .await
    .map_err(ApiError::store)?;

  if body.plan == Plan::Trial
    && history
      .iter()
      .any(|s| s.status != SubscriptionStatus::Pending && (s.is_trial_subscription || s.trial_converted))
  {
    return Err(ApiError::Conflict("the trial is only available once".to_owned()));
  }

  for pending in history
    .into_iter()
    .filter(|s| s.status == SubscriptionStatus::Pending && s.created_at > now - pending_ttl())
  {
    if pending.plan == body.plan
      && let Some(provider_subscription_id) = pending.provider_subscription_id.clone()
    {
      let session = CheckoutSession {
        provider_subscription_id,
        amount: pending.amount,
        currency: pending.currency.clone(),
      };
      return Ok(Created(Checkout { subscription: pending, checkout: session }));
    }
    let (_, verdict) = save_transition(state.store.as_ref(), pending, |s| {
      s.cancel("superseded by a new checkout", now)
    })
    .await?;
    verdict?;
  }

  let mut input = NewSubscription::checkout(
    principal.principal_id,
    principal.tenant.clone(),
    body.plan,
    &state.pricing,
    now,
  );
  let session = state.payments.open_checkout(body.plan, input.amount, &input.currency);
  input.provider_subscription_id = Some(session.provider_subscription_id.clone());

  let subscription = state.store.create_subscription(input).await.map_err(ApiError::store)?;
  state
    .store
    .link_subscription(principal.principal_id, Some(subscription.subscription_id))
    .await
    .map_err(ApiError::store)?;
  tracing::info!(
    principal_id = %principal.principal_id,
    subscription_id = %subscription.subscription_id,
    plan = %body.plan,
    "checkout opened"
  );

  Ok(Created(Checkout { subscription, checkout: session }))
}

// ─── Cancel ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
  pub reason: Option<String>,
}

/// `POST /api/subscriptions/cancel`
pub async fn cancel<S>(
  State(state): State<AppState<S>>,
  RequireAuth(ctx): RequireAuth,
  body: Bytes,
) -> Result<Data<Subscription>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let Some(subscription) = ctx.subscription else {
    return Err(ApiError::NotFound("no active subscription".to_owned()));
  };

  // The body is optional.
  let parsed: CancelBody = if body.iter().all(u8::is_ascii_whitespace) {
    CancelBody::default()
  } else {
    serde_json::from_slice(&body).map_err(|e| ApiError::Validation(e.to_string()))?
  };
  let reason = parsed.reason.unwrap_or_else(|| "cancelled by user".to_owned());
  let now = Utc::now();
  let (subscription, verdict) =
    save_transition(state.store.as_ref(), subscription, |s| s.cancel(&reason, now)).await?;
  verdict?;
  tracing::info!(subscription_id = %subscription.subscription_id, "subscription cancelled");

  Ok(Data(subscription))
}
