//! Premium-content entitlement policy.
//!
//! The policy is a pure function of a content item's [`Gate`], the caller
//! (if any) and the caller's *live* subscription record. It never consults
//! the `subscription_id` cached on a principal.

use chrono::{DateTime, Utc};

use crate::{
  content::{ContentBody, ContentItem, Topic},
  module::LearningModule,
  principal::Principal,
  store::Repository,
  subscription::Subscription,
};

// ─── Gate ────────────────────────────────────────────────────────────────────

/// A content item's visibility, reduced to what the policy needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
  /// Anyone, including anonymous callers.
  Open,
  /// Requires a principal with an active subscription.
  Premium,
}

impl Gate {
  pub fn premium(is_premium: bool) -> Self {
    if is_premium { Self::Premium } else { Self::Open }
  }

  /// Videos carry two flags; `is_free` wins over `is_locked`.
  pub fn video(is_locked: bool, is_free: bool) -> Self {
    Self::premium(is_locked && !is_free)
  }
}

/// Anything whose visibility the policy can evaluate.
pub trait Gated {
  fn gate(&self) -> Gate;
}

impl Gated for Topic {
  fn gate(&self) -> Gate { Gate::premium(self.is_premium) }
}

impl Gated for LearningModule {
  fn gate(&self) -> Gate { Gate::premium(self.is_premium) }
}

impl Gated for ContentItem {
  fn gate(&self) -> Gate {
    match &self.body {
      ContentBody::Video(video) => Gate::video(self.is_locked, video.is_free),
      ContentBody::Questionnaire(_) | ContentBody::Mcq(_) | ContentBody::Text(_) => {
        Gate::premium(self.is_locked)
      }
    }
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Decide access for `gate`.
///
/// `subscription` must be the caller's freshly fetched subscription; a record
/// belonging to someone else never grants access.
pub fn has_access(
  gate:         Gate,
  principal:    Option<&Principal>,
  subscription: Option<&Subscription>,
  now:          DateTime<Utc>,
) -> bool {
  match (gate, principal) {
    (Gate::Open, _) => true,
    (Gate::Premium, None) => false,
    (Gate::Premium, Some(p)) => subscription
      .is_some_and(|s| s.principal_id == p.principal_id && s.is_active_at(now)),
  }
}

/// As [`has_access`], fetching the live subscription from `repo` only when
/// the gate actually requires one.
pub async fn check_access<R: Repository>(
  repo:      &R,
  gate:      Gate,
  principal: Option<&Principal>,
  now:       DateTime<Utc>,
) -> Result<bool, R::Error> {
  let principal = match (gate, principal) {
    (Gate::Open, _) => return Ok(true),
    (Gate::Premium, None) => return Ok(false),
    (Gate::Premium, Some(p)) => p,
  };
  let subscription = repo.active_subscription(principal.principal_id, now).await?;
  Ok(has_access(gate, Some(principal), subscription.as_ref(), now))
}

// ─── Viewer ──────────────────────────────────────────────────────────────────

/// The caller of one request, with its subscription fetched once at
/// authentication time. Handlers evaluate every item in a response against
/// the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
  pub principal:    Option<Principal>,
  pub subscription: Option<Subscription>,
}

impl Viewer {
  pub fn anonymous() -> Self { Self::default() }

  pub fn can_access(&self, item: &impl Gated, now: DateTime<Utc>) -> bool {
    has_access(item.gate(), self.principal.as_ref(), self.subscription.as_ref(), now)
  }

  pub fn is_subscribed(&self, now: DateTime<Utc>) -> bool {
    self.subscription.as_ref().is_some_and(|s| s.is_active_at(now))
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use uuid::Uuid;

  use super::*;
  use crate::{
    principal::Role,
    subscription::{Plan, SubscriptionStatus},
    tenant::TenantId,
  };

  fn principal() -> Principal {
    Principal {
      principal_id:    Uuid::new_v4(),
      tenant:          TenantId::parse("com.gumbo.learning").unwrap(),
      email:           "p@example.com".into(),
      username:        None,
      password_hash:   None,
      external_id:     None,
      display_name:    None,
      role:            Role::User,
      is_active:       true,
      subscription_id: None,
      created_at:      Utc::now(),
      last_login_at:   None,
    }
  }

  fn subscription(owner: &Principal, status: SubscriptionStatus, end: DateTime<Utc>) -> Subscription {
    Subscription {
      subscription_id:          Uuid::new_v4(),
      principal_id:             owner.principal_id,
      tenant:                   owner.tenant.clone(),
      plan:                     Plan::Monthly,
      status,
      amount:                   9_900,
      currency:                 "INR".into(),
      start_date:               end - Duration::days(30),
      end_date:                 end,
      next_billing_date:        None,
      provider_subscription_id: None,
      last_payment_id:          None,
      last_payment_at:          None,
      last_failed_payment_id:   None,
      auto_renew:               true,
      is_recurring:             true,
      is_trial_subscription:    false,
      trial_converted:          false,
      failed_payment_count:     0,
      cancellation_reason:      None,
      created_at:               end - Duration::days(30),
      updated_at:               end - Duration::days(30),
      revision:                 0,
    }
  }

  #[test]
  fn open_content_is_visible_to_everyone() {
    let now = Utc::now();
    let p   = principal();
    let old = subscription(&p, SubscriptionStatus::Expired, now - Duration::days(1));
    assert!(has_access(Gate::Open, None, None, now));
    assert!(has_access(Gate::Open, Some(&p), None, now));
    assert!(has_access(Gate::Open, Some(&p), Some(&old), now));
  }

  #[test]
  fn premium_content_is_hidden_from_anonymous_callers() {
    let now = Utc::now();
    let p   = principal();
    let sub = subscription(&p, SubscriptionStatus::Active, now + Duration::days(5));
    assert!(!has_access(Gate::Premium, None, None, now));
    assert!(!has_access(Gate::Premium, None, Some(&sub), now));
  }

  #[test]
  fn premium_requires_a_live_subscription() {
    let now = Utc::now();
    let p   = principal();
    assert!(!has_access(Gate::Premium, Some(&p), None, now));

    let live = subscription(&p, SubscriptionStatus::Active, now + Duration::days(5));
    assert!(has_access(Gate::Premium, Some(&p), Some(&live), now));

    let lapsed = subscription(&p, SubscriptionStatus::Active, now - Duration::seconds(1));
    assert!(!has_access(Gate::Premium, Some(&p), Some(&lapsed), now));

    let cancelled = subscription(&p, SubscriptionStatus::Cancelled, now + Duration::days(5));
    assert!(!has_access(Gate::Premium, Some(&p), Some(&cancelled), now));
  }

  #[test]
  fn cached_subscription_link_is_not_trusted() {
    let now   = Utc::now();
    let mut p = principal();
    p.subscription_id = Some(Uuid::new_v4());
    assert!(!has_access(Gate::Premium, Some(&p), None, now));
  }

  #[test]
  fn another_principals_subscription_does_not_grant() {
    let now   = Utc::now();
    let p     = principal();
    let other = principal();
    let sub   = subscription(&other, SubscriptionStatus::Active, now + Duration::days(5));
    assert!(!has_access(Gate::Premium, Some(&p), Some(&sub), now));
  }

  #[test]
  fn free_video_dominates_lock() {
    assert_eq!(Gate::video(true, true), Gate::Open);
    assert_eq!(Gate::video(false, true), Gate::Open);
    assert_eq!(Gate::video(false, false), Gate::Open);
    assert_eq!(Gate::video(true, false), Gate::Premium);
  }

  #[test]
  fn viewer_reports_subscription_state() {
    let now = Utc::now();
    let p   = principal();
    let sub = subscription(&p, SubscriptionStatus::Active, now + Duration::days(1));
    let viewer = Viewer { principal: Some(p), subscription: Some(sub) };
    assert!(viewer.is_subscribed(now));
    assert!(!Viewer::anonymous().is_subscribed(now));
  }
}
