//! Payment-provider webhook events and the subscription transitions they
//! drive.
//!
//! Payloads follow the provider's envelope:
//!
//! ```json
//! { "subscription": { "entity": { "id": "sub_…" } },
//!   "payment":      { "entity": { "id": "pay_…", "subscription_id": "sub_…" } } }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  subscription::{PricingConfig, Subscription, Transition},
};

// ─── Wire payload ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct Envelope {
  subscription: Option<Wrapped<SubscriptionEntity>>,
  payment:      Option<Wrapped<PaymentEntity>>,
}

#[derive(Debug, Deserialize)]
struct Wrapped<T> {
  entity: T,
}

#[derive(Debug, Deserialize)]
struct SubscriptionEntity {
  id: String,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
  id:              String,
  subscription_id: Option<String>,
  /// One-off (yearly) checkouts are linked through the order.
  order_id:        Option<String>,
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// A webhook the subscription lifecycle reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
  PaymentCaptured {
    subscription_id: String,
    payment_id:      String,
  },
  SubscriptionActivated {
    subscription_id: String,
    payment_id:      Option<String>,
  },
  SubscriptionCharged {
    subscription_id: String,
    payment_id:      String,
  },
  SubscriptionCancelled {
    subscription_id: String,
  },
  /// `subscription.halted` or `subscription.completed`.
  SubscriptionEnded {
    subscription_id: String,
    event:           &'static str,
  },
  PaymentFailed {
    subscription_id: String,
    payment_id:      Option<String>,
  },
}

impl PaymentEvent {
  /// Parse a named event. Event names this service does not track yield
  /// `Ok(None)` and should be acknowledged without action.
  pub fn parse(event: &str, payload: &serde_json::Value) -> Result<Option<Self>> {
    let tracked = matches!(
      event,
      "payment.captured"
        | "payment.failed"
        | "subscription.activated"
        | "subscription.charged"
        | "subscription.cancelled"
        | "subscription.halted"
        | "subscription.completed"
    );
    if !tracked {
      return Ok(None);
    }

    let envelope: Envelope = serde_json::from_value(payload.clone())
      .map_err(|e| Error::MalformedWebhook(format!("{event}: {e}")))?;

    let payment_id = envelope.payment.as_ref().map(|p| p.entity.id.clone());
    let subscription_id = envelope
      .subscription
      .as_ref()
      .map(|s| s.entity.id.clone())
      .or_else(|| {
        envelope
          .payment
          .as_ref()
          .and_then(|p| p.entity.subscription_id.clone().or_else(|| p.entity.order_id.clone()))
      })
      .ok_or_else(|| Error::MalformedWebhook(format!("{event}: no subscription reference")))?;

    let require_payment = |id: Option<String>| {
      id.ok_or_else(|| Error::MalformedWebhook(format!("{event}: no payment entity")))
    };

    let parsed = match event {
      "payment.captured" => Self::PaymentCaptured {
        subscription_id,
        payment_id: require_payment(payment_id)?,
      },
      "payment.failed" => Self::PaymentFailed { subscription_id, payment_id },
      "subscription.activated" => Self::SubscriptionActivated { subscription_id, payment_id },
      "subscription.charged" => Self::SubscriptionCharged {
        subscription_id,
        payment_id: require_payment(payment_id)?,
      },
      "subscription.cancelled" => Self::SubscriptionCancelled { subscription_id },
      "subscription.halted" => Self::SubscriptionEnded { subscription_id, event: "subscription.halted" },
      _ => Self::SubscriptionEnded { subscription_id, event: "subscription.completed" },
    };
    Ok(Some(parsed))
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::PaymentCaptured { .. } => "payment.captured",
      Self::SubscriptionActivated { .. } => "subscription.activated",
      Self::SubscriptionCharged { .. } => "subscription.charged",
      Self::SubscriptionCancelled { .. } => "subscription.cancelled",
      Self::SubscriptionEnded { event, .. } => *event,
      Self::PaymentFailed { .. } => "payment.failed",
    }
  }

  /// The provider's subscription (or order) identifier this event targets.
  pub fn provider_subscription_id(&self) -> &str {
    match self {
      Self::PaymentCaptured { subscription_id, .. }
      | Self::SubscriptionActivated { subscription_id, .. }
      | Self::SubscriptionCharged { subscription_id, .. }
      | Self::SubscriptionCancelled { subscription_id }
      | Self::SubscriptionEnded { subscription_id, .. }
      | Self::PaymentFailed { subscription_id, .. } => subscription_id,
    }
  }

  pub fn payment_id(&self) -> Option<&str> {
    match self {
      Self::PaymentCaptured { payment_id, .. } | Self::SubscriptionCharged { payment_id, .. } => {
        Some(payment_id.as_str())
      }
      Self::SubscriptionActivated { payment_id, .. } | Self::PaymentFailed { payment_id, .. } => {
        payment_id.as_deref()
      }
      Self::SubscriptionCancelled { .. } | Self::SubscriptionEnded { .. } => None,
    }
  }

  /// Apply this event to the matched subscription.
  pub fn apply(
    &self,
    subscription: &mut Subscription,
    at:           DateTime<Utc>,
    pricing:      &PricingConfig,
  ) -> Result<Transition> {
    match self {
      Self::PaymentCaptured { payment_id, .. } => {
        subscription.activate(Some(payment_id.as_str()), at, pricing)
      }
      Self::SubscriptionActivated { payment_id, .. } => {
        subscription.activate(payment_id.as_deref(), at, pricing)
      }
      Self::SubscriptionCharged { payment_id, .. } => subscription.charge(payment_id, at, pricing),
      Self::SubscriptionCancelled { .. } => subscription.cancel("cancelled by payment provider", at),
      Self::SubscriptionEnded { .. } => Ok(subscription.expire(at)),
      Self::PaymentFailed { payment_id, .. } => {
        Ok(subscription.record_failed_payment(payment_id.as_deref(), at))
      }
    }
  }
}

// ─── Failure log ─────────────────────────────────────────────────────────────

/// A webhook that could not be applied. These signal drift between the
/// provider and local state and are surfaced to admins for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookFailure {
  pub failure_id:               Uuid,
  pub event:                    String,
  pub provider_subscription_id: Option<String>,
  pub payment_id:               Option<String>,
  pub reason:                   String,
  /// SHA-256 of the raw payload, hex-encoded.
  pub payload_digest:           String,
  pub recorded_at:              DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWebhookFailure {
  pub event:                    String,
  pub provider_subscription_id: Option<String>,
  pub payment_id:               Option<String>,
  pub reason:                   String,
  pub payload_digest:           String,
}
