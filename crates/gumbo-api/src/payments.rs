//! The payment-provider seam used at checkout.
//!
//! Provider internals live outside this service. Checkout only needs an
//! identifier under which the provider will later report webhooks.

use gumbo_core::subscription::Plan;
use serde::Serialize;
use uuid::Uuid;

/// What the client needs to complete payment with the provider.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
  /// Subscription id for recurring plans, order id for one-off plans.
  pub provider_subscription_id: String,
  pub amount:                   i64,
  pub currency:                 String,
}

pub trait PaymentProvider: Send + Sync {
  fn open_checkout(&self, plan: Plan, amount: i64, currency: &str) -> CheckoutSession;
}

/// Mints provider-style identifiers locally. Used when no gateway client is
/// configured and in tests, where webhooks are posted by hand.
#[derive(Debug, Default)]
pub struct LocalProvider;

impl PaymentProvider for LocalProvider {
  fn open_checkout(&self, plan: Plan, amount: i64, currency: &str) -> CheckoutSession {
    let prefix = match plan {
      Plan::Trial | Plan::Monthly => "sub",
      Plan::Yearly => "order",
    };
    CheckoutSession {
      provider_subscription_id: format!("{prefix}_{}", Uuid::new_v4().simple()),
      amount,
      currency: currency.to_owned(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn one_off_plans_get_order_ids() {
    let yearly  = LocalProvider.open_checkout(Plan::Yearly, 99_900, "INR");
    let monthly = LocalProvider.open_checkout(Plan::Monthly, 9_900, "INR");
    assert!(yearly.provider_subscription_id.starts_with("order_"));
    assert!(monthly.provider_subscription_id.starts_with("sub_"));
    assert_ne!(
      monthly.provider_subscription_id,
      LocalProvider.open_checkout(Plan::Monthly, 9_900, "INR").provider_subscription_id
    );
  }
}
