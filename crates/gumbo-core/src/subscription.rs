//! Subscription records and their lifecycle.
//!
//! ```text
//! pending ──activate──▶ active ──expire / 3 failed payments──▶ expired
//!    │                    │ ▲
//!    │                    │ └── charge (renewal, trial conversion)
//!    └──────cancel────────┴──────────────▶ cancelled
//! ```
//!
//! Every transition is a method on [`Subscription`] that mutates the record in
//! place and reports whether anything changed. Callers persist the record
//! with a single-row write. Transitions are driven by payment-provider
//! webhooks and by background maintenance, never by the entitlement check.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, tenant::TenantId};

/// Consecutive failed charges after which an active subscription expires.
pub const MAX_FAILED_PAYMENTS: u32 = 3;

/// How long a `pending` checkout may linger before maintenance reaps it.
pub fn pending_ttl() -> Duration { Duration::hours(1) }

// ─── Plan / status ───────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Plan {
  Trial,
  Monthly,
  Yearly,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionStatus {
  Pending,
  Active,
  Cancelled,
  Expired,
}

// ─── Pricing ─────────────────────────────────────────────────────────────────

/// Plan prices in minor currency units and billing periods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
  pub trial_amount:   i64,
  pub monthly_amount: i64,
  pub yearly_amount:  i64,
  pub trial_days:     i64,
  pub currency:       String,
}

impl Default for PricingConfig {
  fn default() -> Self {
    Self {
      trial_amount:   100,
      monthly_amount: 9_900,
      yearly_amount:  99_900,
      trial_days:     7,
      currency:       "INR".to_owned(),
    }
  }
}

impl PricingConfig {
  pub fn amount(&self, plan: Plan) -> i64 {
    match plan {
      Plan::Trial => self.trial_amount,
      Plan::Monthly => self.monthly_amount,
      Plan::Yearly => self.yearly_amount,
    }
  }

  /// Length of one billing window for `plan`.
  pub fn period(&self, plan: Plan) -> Duration {
    match plan {
      Plan::Trial => Duration::days(self.trial_days),
      Plan::Monthly => Duration::days(30),
      Plan::Yearly => Duration::days(365),
    }
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A principal's paid (or trial) access window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
  pub subscription_id:          Uuid,
  pub principal_id:             Uuid,
  pub tenant:                   TenantId,
  pub plan:                     Plan,
  pub status:                   SubscriptionStatus,
  /// Price of the current window in minor units.
  pub amount:                   i64,
  pub currency:                 String,
  pub start_date:               DateTime<Utc>,
  pub end_date:                 DateTime<Utc>,
  pub next_billing_date:        Option<DateTime<Utc>>,
  /// The payment provider's identifier for this subscription.
  pub provider_subscription_id: Option<String>,
  /// Last successful payment; doubles as the webhook replay marker.
  pub last_payment_id:          Option<String>,
  pub last_payment_at:          Option<DateTime<Utc>>,
  pub last_failed_payment_id:   Option<String>,
  pub auto_renew:               bool,
  pub is_recurring:             bool,
  pub is_trial_subscription:    bool,
  /// Set once a trial has been converted to a paid plan.
  pub trial_converted:          bool,
  pub failed_payment_count:     u32,
  pub cancellation_reason:      Option<String>,
  pub created_at:               DateTime<Utc>,
  pub updated_at:               DateTime<Utc>,
  /// Write counter for optimistic concurrency; bumped by every save.
  #[serde(skip)]
  pub revision:                 u32,
}

/// Input to [`crate::store::Repository::create_subscription`]. The store
/// assigns the id and timestamps; the record always starts `pending`.
#[derive(Debug, Clone)]
pub struct NewSubscription {
  pub principal_id:             Uuid,
  pub tenant:                   TenantId,
  pub plan:                     Plan,
  pub amount:                   i64,
  pub currency:                 String,
  pub start_date:               DateTime<Utc>,
  pub end_date:                 DateTime<Utc>,
  pub provider_subscription_id: Option<String>,
  pub is_recurring:             bool,
}

impl NewSubscription {
  /// A checkout for `plan` priced from `pricing`, tentatively covering one
  /// period from `now`. Activation re-anchors the window.
  pub fn checkout(
    principal_id: Uuid,
    tenant:       TenantId,
    plan:         Plan,
    pricing:      &PricingConfig,
    now:          DateTime<Utc>,
  ) -> Self {
    Self {
      principal_id,
      tenant,
      plan,
      amount: pricing.amount(plan),
      currency: pricing.currency.clone(),
      start_date: now,
      end_date: now + pricing.period(plan),
      provider_subscription_id: None,
      is_recurring: plan != Plan::Yearly,
    }
  }
}

/// Outcome of applying a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  /// The record changed and must be persisted.
  Applied,
  /// The event was already reflected (replay) or does not apply.
  Unchanged,
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

impl Subscription {
  /// The only definition of "active": the status flag alone is not enough.
  pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
    self.status == SubscriptionStatus::Active && self.end_date > now
  }

  /// `pending → active` on payment capture or provider activation.
  ///
  /// An already-active subscription is left untouched so a replayed
  /// capture never extends the window twice.
  pub fn activate(
    &mut self,
    payment_id: Option<&str>,
    at:         DateTime<Utc>,
    pricing:    &PricingConfig,
  ) -> Result<Transition> {
    match self.status {
      SubscriptionStatus::Active => Ok(Transition::Unchanged),
      SubscriptionStatus::Pending => {
        self.status = SubscriptionStatus::Active;
        self.start_date = at;
        self.end_date = at + pricing.period(self.plan);
        self.next_billing_date = self.is_recurring.then_some(self.end_date);
        self.failed_payment_count = 0;
        self.record_payment(payment_id, at);
        Ok(Transition::Applied)
      }
      from => Err(Error::InvalidTransition { from, event: "activation" }),
    }
  }

  /// A recurring charge succeeded.
  ///
  /// - On a `pending` record this is the first charge and activates it.
  /// - On an unconverted trial it converts to the monthly plan, once.
  /// - Otherwise it renews by one billing period.
  ///
  /// A charge whose `payment_id` was already recorded is a replay.
  pub fn charge(
    &mut self,
    payment_id: &str,
    at:         DateTime<Utc>,
    pricing:    &PricingConfig,
  ) -> Result<Transition> {
    if self.last_payment_id.as_deref() == Some(payment_id) {
      return Ok(Transition::Unchanged);
    }

    match self.status {
      SubscriptionStatus::Pending => self.activate(Some(payment_id), at, pricing),
      SubscriptionStatus::Active if self.is_trial_subscription && !self.trial_converted => {
        self.plan = Plan::Monthly;
        self.amount = pricing.monthly_amount;
        self.is_trial_subscription = false;
        self.trial_converted = true;
        self.start_date = at;
        self.end_date = at + pricing.period(Plan::Monthly);
        self.next_billing_date = Some(self.end_date);
        self.failed_payment_count = 0;
        self.record_payment(Some(payment_id), at);
        Ok(Transition::Applied)
      }
      SubscriptionStatus::Active => {
        // A late charge must not leave the window already lapsed.
        self.end_date = self.end_date.max(at) + pricing.period(self.plan);
        self.next_billing_date = self.is_recurring.then_some(self.end_date);
        self.failed_payment_count = 0;
        self.record_payment(Some(payment_id), at);
        Ok(Transition::Applied)
      }
      from => Err(Error::InvalidTransition { from, event: "charge" }),
    }
  }

  /// `pending/active → cancelled`, by the user or the provider.
  pub fn cancel(&mut self, reason: &str, at: DateTime<Utc>) -> Result<Transition> {
    match self.status {
      SubscriptionStatus::Cancelled => Ok(Transition::Unchanged),
      SubscriptionStatus::Pending | SubscriptionStatus::Active => {
        self.status = SubscriptionStatus::Cancelled;
        self.auto_renew = false;
        self.next_billing_date = None;
        self.cancellation_reason = Some(reason.to_owned());
        self.updated_at = at;
        Ok(Transition::Applied)
      }
      from => Err(Error::InvalidTransition { from, event: "cancellation" }),
    }
  }

  /// Count a failed charge; the third consecutive one expires an active
  /// subscription.
  pub fn record_failed_payment(
    &mut self,
    payment_id: Option<&str>,
    at:         DateTime<Utc>,
  ) -> Transition {
    if payment_id.is_some() && self.last_failed_payment_id.as_deref() == payment_id {
      return Transition::Unchanged;
    }
    match self.status {
      SubscriptionStatus::Pending | SubscriptionStatus::Active => {
        self.failed_payment_count += 1;
        self.last_failed_payment_id = payment_id.map(str::to_owned);
        if self.status == SubscriptionStatus::Active
          && self.failed_payment_count >= MAX_FAILED_PAYMENTS
        {
          self.status = SubscriptionStatus::Expired;
          self.auto_renew = false;
          self.next_billing_date = None;
        }
        self.updated_at = at;
        Transition::Applied
      }
      SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => Transition::Unchanged,
    }
  }

  /// The provider ended the subscription (halted or completed).
  pub fn expire(&mut self, at: DateTime<Utc>) -> Transition {
    match self.status {
      SubscriptionStatus::Pending | SubscriptionStatus::Active => {
        self.status = SubscriptionStatus::Expired;
        self.auto_renew = false;
        self.next_billing_date = None;
        self.updated_at = at;
        Transition::Applied
      }
      SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => Transition::Unchanged,
    }
  }

  /// Background sweep: an active record whose window has closed.
  pub fn expire_if_lapsed(&mut self, now: DateTime<Utc>) -> Transition {
    if self.status == SubscriptionStatus::Active && self.end_date <= now {
      self.expire(now)
    } else {
      Transition::Unchanged
    }
  }

  fn record_payment(&mut self, payment_id: Option<&str>, at: DateTime<Utc>) {
    if let Some(id) = payment_id {
      self.last_payment_id = Some(id.to_owned());
    }
    self.last_payment_at = Some(at);
    self.updated_at = at;
  }
}
