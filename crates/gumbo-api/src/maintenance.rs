//! Background subscription maintenance: expire lapsed windows and reap
//! abandoned checkouts.

use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Utc};
use gumbo_core::{store::Repository, subscription::pending_ttl};
use serde::Serialize;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
  pub expired: u64,
  pub reaped:  u64,
}

/// One maintenance pass as of `now`.
pub async fn sweep<S: Repository>(repo: &S, now: DateTime<Utc>) -> Result<SweepReport, S::Error> {
  let expired = repo.expire_lapsed(now).await?;
  let reaped  = repo.reap_pending(now - pending_ttl()).await?;
  Ok(SweepReport { expired, reaped })
}

/// Run [`sweep`] every `every` until the runtime shuts down.
pub fn spawn<S>(repo: Arc<S>, every: StdDuration) -> JoinHandle<()>
where
  S: Repository + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      match sweep(repo.as_ref(), Utc::now()).await {
        Ok(report) if report == SweepReport::default() => {}
        Ok(report) => {
          tracing::info!(expired = report.expired, reaped = report.reaped, "maintenance sweep")
        }
        Err(e) => tracing::error!(error = %e, "maintenance sweep failed"),
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use gumbo_core::{
    principal::NewPrincipal,
    subscription::{NewSubscription, Plan, PricingConfig, SubscriptionStatus},
    tenant::TenantId,
  };
  use gumbo_store_sqlite::SqliteStore;

  use super::*;

  #[tokio::test]
  async fn sweep_expires_and_reaps() {
    let store   = SqliteStore::open_in_memory().await.unwrap();
    let tenant  = TenantId::parse("com.gumbo.learning").unwrap();
    let pricing = PricingConfig::default();
    let p       = store.create_principal(NewPrincipal::new(tenant.clone(), "m@example.com")).await.unwrap();

    let then    = Utc::now() - Duration::days(40);
    let mut old = store
      .create_subscription(NewSubscription::checkout(p.principal_id, tenant.clone(), Plan::Monthly, &pricing, then))
      .await
      .unwrap();
    old.activate(Some("pay_1"), then, &pricing).unwrap();
    store.save_subscription(&old).await.unwrap();

    let pending = store
      .create_subscription(NewSubscription::checkout(p.principal_id, tenant, Plan::Monthly, &pricing, Utc::now()))
      .await
      .unwrap();

    let report = sweep(&store, Utc::now() + Duration::hours(2)).await.unwrap();
    assert_eq!(report, SweepReport { expired: 1, reaped: 1 });

    let old = store.get_subscription(old.subscription_id).await.unwrap().unwrap();
    assert_eq!(old.status, SubscriptionStatus::Expired);
    assert!(store.get_subscription(pending.subscription_id).await.unwrap().is_none());
  }
}
