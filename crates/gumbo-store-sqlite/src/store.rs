//! [`SqliteStore`], the SQLite implementation of [`Repository`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use gumbo_core::{
  content::{Category, ContentItem, ContentKind, NewCategory, NewContent, NewTopic, Topic},
  module::{LearningModule, NewModule},
  principal::{scrambled_email, ExternalProfile, NewPrincipal, Principal},
  store::Repository,
  subscription::{NewSubscription, Plan, Subscription, SubscriptionStatus},
  tenant::TenantId,
  webhook::{NewWebhookFailure, WebhookFailure},
};

use crate::{
  encode::{
    encode_dt, encode_uuid, RawCategory, RawContent, RawModule, RawPrincipal, RawSubscription,
    RawTopic, RawWebhookFailure, CATEGORY_COLUMNS, CONTENT_COLUMNS, MODULE_COLUMNS,
    PRINCIPAL_COLUMNS, SUBSCRIPTION_COLUMNS, TOPIC_COLUMNS,
  },
  schema::SCHEMA,
  Error, Result,
};

fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Gumbo store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_principal(&self, sql: String, params: Vec<String>) -> Result<Option<Principal>> {
    let raw: Option<RawPrincipal> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(&sql, rusqlite::params_from_iter(params), RawPrincipal::from_row)
          .optional()?)
      })
      .await?;

    raw.map(RawPrincipal::into_principal).transpose()
  }

  async fn fetch_subscriptions(
    &self,
    sql: String,
    params: Vec<String>,
  ) -> Result<Vec<Subscription>> {
    let raws: Vec<RawSubscription> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawSubscription::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubscription::into_subscription).collect()
  }

  /// Whether `table` holds an active row `id_column = id` in `tenant`.
  async fn parent_exists(
    &self,
    table: &'static str,
    id_column: &'static str,
    tenant: &TenantId,
    id: Uuid,
  ) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {table} WHERE {id_column} = ?1 AND tenant = ?2 AND is_active = 1");
    let id_str     = encode_uuid(id);
    let tenant_str = tenant.as_str().to_owned();

    let found = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(&sql, rusqlite::params![id_str, tenant_str], |_| Ok(()))
          .optional()?
          .is_some())
      })
      .await?;
    Ok(found)
  }
}

// ─── Repository impl ─────────────────────────────────────────────────────────

impl Repository for SqliteStore {
  type Error = Error;

  // ── Principals ────────────────────────────────────────────────────────────

  async fn create_principal(&self, input: NewPrincipal) -> Result<Principal> {
    let principal = Principal {
      principal_id:    Uuid::new_v4(),
      tenant:          input.tenant,
      email:           input.email,
      username:        input.username,
      password_hash:   input.password_hash,
      external_id:     input.external_id,
      display_name:    input.display_name,
      role:            input.role,
      is_active:       true,
      subscription_id: None,
      created_at:      Utc::now(),
      last_login_at:   None,
    };

    let id_str       = encode_uuid(principal.principal_id);
    let tenant_str   = principal.tenant.as_str().to_owned();
    let email        = principal.email.clone();
    let username     = principal.username.clone();
    let hash         = principal.password_hash.clone();
    let external_id  = principal.external_id.clone();
    let display_name = principal.display_name.clone();
    let role_str     = principal.role.as_ref().to_owned();
    let at_str       = encode_dt(principal.created_at);

    let inserted = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO principals (
             principal_id, tenant, email, username, password_hash,
             external_id, display_name, role, is_active, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9)",
          rusqlite::params![
            id_str,
            tenant_str,
            email,
            username,
            hash,
            external_id,
            display_name,
            role_str,
            at_str,
          ],
        );
        match result {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if !inserted {
      return Err(Error::DuplicateEmail(principal.email));
    }
    Ok(principal)
  }

  async fn get_principal(&self, id: Uuid) -> Result<Option<Principal>> {
    self
      .fetch_principal(
        format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE principal_id = ?1"),
        vec![encode_uuid(id)],
      )
      .await
  }

  async fn get_principal_in_tenant(
    &self,
    id: Uuid,
    tenant: &TenantId,
  ) -> Result<Option<Principal>> {
    self
      .fetch_principal(
        format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE principal_id = ?1 AND tenant = ?2"),
        vec![encode_uuid(id), tenant.as_str().to_owned()],
      )
      .await
  }

  async fn find_principal_by_email(
    &self,
    tenant: &TenantId,
    email: &str,
  ) -> Result<Option<Principal>> {
    self
      .fetch_principal(
        format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE tenant = ?1 AND email = ?2"),
        vec![tenant.as_str().to_owned(), email.to_owned()],
      )
      .await
  }

  async fn find_principal_by_external_id(
    &self,
    tenant: &TenantId,
    subject: &str,
  ) -> Result<Option<Principal>> {
    self
      .fetch_principal(
        format!(
          "SELECT {PRINCIPAL_COLUMNS} FROM principals
            WHERE tenant = ?1 AND external_id = ?2
            ORDER BY created_at LIMIT 1"
        ),
        vec![tenant.as_str().to_owned(), subject.to_owned()],
      )
      .await
  }

  async fn record_external_login(
    &self,
    id: Uuid,
    profile: &ExternalProfile,
    at: DateTime<Utc>,
  ) -> Result<()> {
    let id_str       = encode_uuid(id);
    let subject      = profile.subject.clone();
    let display_name = profile.display_name.clone();
    let at_str       = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE principals
              SET external_id = ?2,
                  display_name = COALESCE(?3, display_name),
                  last_login_at = ?4
            WHERE principal_id = ?1",
          rusqlite::params![id_str, subject, display_name, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE principals SET last_login_at = ?2 WHERE principal_id = ?1",
          rusqlite::params![id_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn link_subscription(
    &self,
    principal_id: Uuid,
    subscription_id: Option<Uuid>,
  ) -> Result<()> {
    let id_str  = encode_uuid(principal_id);
    let sub_str = subscription_id.map(encode_uuid);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE principals SET subscription_id = ?2 WHERE principal_id = ?1",
          rusqlite::params![id_str, sub_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn deactivate_principal(&self, id: Uuid) -> Result<Option<Principal>> {
    let Some(mut principal) = self.get_principal(id).await? else {
      return Ok(None);
    };
    if !principal.is_active {
      return Ok(Some(principal));
    }

    principal.is_active = false;
    principal.email = scrambled_email(id, &principal.email);
    principal.external_id = None;

    let id_str = encode_uuid(id);
    let email  = principal.email.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE principals SET is_active = 0, email = ?2, external_id = NULL WHERE principal_id = ?1",
          rusqlite::params![id_str, email],
        )?;
        Ok(())
      })
      .await?;

    Ok(Some(principal))
  }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  async fn create_subscription(&self, input: NewSubscription) -> Result<Subscription> {
    let now = Utc::now();
    let subscription = Subscription {
      subscription_id:          Uuid::new_v4(),
      principal_id:             input.principal_id,
      tenant:                   input.tenant,
      plan:                     input.plan,
      status:                   SubscriptionStatus::Pending,
      amount:                   input.amount,
      currency:                 input.currency,
      start_date:               input.start_date,
      end_date:                 input.end_date,
      next_billing_date:        None,
      provider_subscription_id: input.provider_subscription_id,
      last_payment_id:          None,
      last_payment_at:          None,
      last_failed_payment_id:   None,
      auto_renew:               input.is_recurring,
      is_recurring:             input.is_recurring,
      is_trial_subscription:    input.plan == Plan::Trial,
      trial_converted:          false,
      failed_payment_count:     0,
      cancellation_reason:      None,
      created_at:               now,
      updated_at:               now,
      revision:                 0,
    };

    let id_str        = encode_uuid(subscription.subscription_id);
    let principal_str = encode_uuid(subscription.principal_id);
    let tenant_str    = subscription.tenant.as_str().to_owned();
    let plan_str      = subscription.plan.as_ref().to_owned();
    let status_str    = subscription.status.as_ref().to_owned();
    let amount        = subscription.amount;
    let currency      = subscription.currency.clone();
    let start_str     = encode_dt(subscription.start_date);
    let end_str       = encode_dt(subscription.end_date);
    let provider_id   = subscription.provider_subscription_id.clone();
    let recurring     = subscription.is_recurring;
    let trial         = subscription.is_trial_subscription;
    let at_str        = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subscriptions (
             subscription_id, principal_id, tenant, plan, status, amount, currency,
             start_date, end_date, provider_subscription_id, auto_renew, is_recurring,
             is_trial_subscription, trial_converted, failed_payment_count,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?12, 0, 0, ?13, ?13)",
          rusqlite::params![
            id_str,
            principal_str,
            tenant_str,
            plan_str,
            status_str,
            amount,
            currency,
            start_str,
            end_str,
            provider_id,
            recurring,
            trial,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(subscription)
  }

  async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>> {
    let mut rows = self
      .fetch_subscriptions(
        format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE subscription_id = ?1"),
        vec![encode_uuid(id)],
      )
      .await?;
    Ok(rows.pop())
  }

  async fn find_subscription_by_provider_id(
    &self,
    provider_subscription_id: &str,
  ) -> Result<Option<Subscription>> {
    let mut rows = self
      .fetch_subscriptions(
        format!(
          "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
            WHERE provider_subscription_id = ?1
            ORDER BY created_at DESC LIMIT 1"
        ),
        vec![provider_subscription_id.to_owned()],
      )
      .await?;
    Ok(rows.pop())
  }

  async fn list_subscriptions(&self, principal_id: Uuid) -> Result<Vec<Subscription>> {
    self
      .fetch_subscriptions(
        format!(
          "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
            WHERE principal_id = ?1
            ORDER BY created_at DESC"
        ),
        vec![encode_uuid(principal_id)],
      )
      .await
  }

  async fn active_subscription(
    &self,
    principal_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Option<Subscription>> {
    let mut rows = self
      .fetch_subscriptions(
        format!(
          "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
            WHERE principal_id = ?1 AND status = 'active' AND end_date > ?2
            ORDER BY created_at DESC LIMIT 1"
        ),
        vec![encode_uuid(principal_id), encode_dt(now)],
      )
      .await?;
    Ok(rows.pop())
  }

  async fn save_subscription(&self, subscription: &Subscription) -> Result<()> {
    let id            = subscription.subscription_id;
    let id_str        = encode_uuid(id);
    let plan_str      = subscription.plan.as_ref().to_owned();
    let status_str    = subscription.status.as_ref().to_owned();
    let amount        = subscription.amount;
    let start_str     = encode_dt(subscription.start_date);
    let end_str       = encode_dt(subscription.end_date);
    let next_str      = subscription.next_billing_date.map(encode_dt);
    let provider_id   = subscription.provider_subscription_id.clone();
    let last_pay      = subscription.last_payment_id.clone();
    let last_pay_at   = subscription.last_payment_at.map(encode_dt);
    let last_failed   = subscription.last_failed_payment_id.clone();
    let auto_renew    = subscription.auto_renew;
    let is_trial      = subscription.is_trial_subscription;
    let converted     = subscription.trial_converted;
    let failures      = subscription.failed_payment_count;
    let reason        = subscription.cancellation_reason.clone();
    let updated_str   = encode_dt(subscription.updated_at);
    let revision      = subscription.revision;

    // (rows changed, whether the row exists at all)
    let (changed, exists) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE subscriptions SET
             plan = ?2, status = ?3, amount = ?4, start_date = ?5, end_date = ?6,
             next_billing_date = ?7, provider_subscription_id = ?8,
             last_payment_id = ?9, last_payment_at = ?10, last_failed_payment_id = ?11,
             auto_renew = ?12, is_trial_subscription = ?13, trial_converted = ?14,
             failed_payment_count = ?15, cancellation_reason = ?16, updated_at = ?17,
             revision = revision + 1
           WHERE subscription_id = ?1 AND revision = ?18",
          rusqlite::params![
            id_str,
            plan_str,
            status_str,
            amount,
            start_str,
            end_str,
            next_str,
            provider_id,
            last_pay,
            last_pay_at,
            last_failed,
            auto_renew,
            is_trial,
            converted,
            failures,
            reason,
            updated_str,
            revision,
          ],
        )?;
        if changed > 0 {
          return Ok((changed, true));
        }
        let exists = conn
          .query_row(
            "SELECT 1 FROM subscriptions WHERE subscription_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        Ok((changed, exists))
      })
      .await?;

    match (changed, exists) {
      (0, true) => Err(Error::StaleSubscription(id)),
      (0, false) => Err(Error::SubscriptionNotFound(id)),
      _ => Ok(()),
    }
  }

  async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<u64> {
    let now_str = encode_dt(now);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE subscriptions
              SET status = 'expired', auto_renew = 0, next_billing_date = NULL, updated_at = ?1,
                  revision = revision + 1
            WHERE status = 'active' AND end_date <= ?1",
          rusqlite::params![now_str],
        )?)
      })
      .await?;
    Ok(changed as u64)
  }

  async fn reap_pending(&self, cutoff: DateTime<Utc>) -> Result<u64> {
    let cutoff_str = encode_dt(cutoff);

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "UPDATE principals SET subscription_id = NULL
            WHERE subscription_id IN (
              SELECT subscription_id FROM subscriptions
               WHERE status = 'pending' AND created_at < ?1
            )",
          rusqlite::params![cutoff_str],
        )?;
        let removed = tx.execute(
          "DELETE FROM subscriptions WHERE status = 'pending' AND created_at < ?1",
          rusqlite::params![cutoff_str],
        )?;
        tx.commit()?;
        Ok(removed)
      })
      .await?;
    Ok(removed as u64)
  }

  // ── Webhook failures ──────────────────────────────────────────────────────

  async fn record_webhook_failure(&self, input: NewWebhookFailure) -> Result<WebhookFailure> {
    let failure = WebhookFailure {
      failure_id:               Uuid::new_v4(),
      event:                    input.event,
      provider_subscription_id: input.provider_subscription_id,
      payment_id:               input.payment_id,
      reason:                   input.reason,
      payload_digest:           input.payload_digest,
      recorded_at:              Utc::now(),
    };

    let id_str      = encode_uuid(failure.failure_id);
    let event       = failure.event.clone();
    let provider_id = failure.provider_subscription_id.clone();
    let payment_id  = failure.payment_id.clone();
    let reason      = failure.reason.clone();
    let digest      = failure.payload_digest.clone();
    let at_str      = encode_dt(failure.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO webhook_failures (
             failure_id, event, provider_subscription_id, payment_id,
             reason, payload_digest, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![id_str, event, provider_id, payment_id, reason, digest, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(failure)
  }

  async fn list_webhook_failures(&self, limit: usize) -> Result<Vec<WebhookFailure>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawWebhookFailure> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT failure_id, event, provider_subscription_id, payment_id,
                  reason, payload_digest, recorded_at
             FROM webhook_failures
            ORDER BY recorded_at DESC
            LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit], |row| {
            Ok(RawWebhookFailure {
              failure_id:               row.get(0)?,
              event:                    row.get(1)?,
              provider_subscription_id: row.get(2)?,
              payment_id:               row.get(3)?,
              reason:                   row.get(4)?,
              payload_digest:           row.get(5)?,
              recorded_at:              row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawWebhookFailure::into_failure).collect()
  }

  // ── Catalog: categories ───────────────────────────────────────────────────

  async fn create_category(&self, tenant: &TenantId, input: NewCategory) -> Result<Category> {
    let category = Category {
      category_id:   Uuid::new_v4(),
      tenant:        tenant.clone(),
      name:          input.name,
      description:   input.description,
      display_order: input.display_order,
      is_active:     true,
      created_at:    Utc::now(),
    };

    let id_str      = encode_uuid(category.category_id);
    let tenant_str  = tenant.as_str().to_owned();
    let name        = category.name.clone();
    let description = category.description.clone();
    let order       = category.display_order;
    let at_str      = encode_dt(category.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO categories (category_id, tenant, name, description, display_order, is_active, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
          rusqlite::params![id_str, tenant_str, name, description, order, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(category)
  }

  async fn list_categories(&self, tenant: &TenantId) -> Result<Vec<Category>> {
    let tenant_str = tenant.as_str().to_owned();

    let raws: Vec<RawCategory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CATEGORY_COLUMNS} FROM categories
            WHERE tenant = ?1 AND is_active = 1
            ORDER BY display_order, created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str], RawCategory::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCategory::into_category).collect()
  }

  async fn get_category(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Category>> {
    let id_str     = encode_uuid(id);
    let tenant_str = tenant.as_str().to_owned();

    let raw: Option<RawCategory> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE category_id = ?1 AND tenant = ?2"),
            rusqlite::params![id_str, tenant_str],
            RawCategory::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCategory::into_category).transpose()
  }

  // ── Catalog: topics ───────────────────────────────────────────────────────

  async fn create_topic(&self, tenant: &TenantId, input: NewTopic) -> Result<Topic> {
    if !self.parent_exists("categories", "category_id", tenant, input.category_id).await? {
      return Err(Error::CategoryNotFound(input.category_id));
    }

    let topic = Topic {
      topic_id:      Uuid::new_v4(),
      tenant:        tenant.clone(),
      category_id:   input.category_id,
      title:         input.title,
      description:   input.description,
      is_premium:    input.is_premium,
      is_active:     true,
      display_order: input.display_order,
      created_at:    Utc::now(),
    };

    let id_str       = encode_uuid(topic.topic_id);
    let tenant_str   = tenant.as_str().to_owned();
    let category_str = encode_uuid(topic.category_id);
    let title        = topic.title.clone();
    let description  = topic.description.clone();
    let premium      = topic.is_premium;
    let order        = topic.display_order;
    let at_str       = encode_dt(topic.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO topics (
             topic_id, tenant, category_id, title, description,
             is_premium, is_active, display_order, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)",
          rusqlite::params![
            id_str,
            tenant_str,
            category_str,
            title,
            description,
            premium,
            order,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(topic)
  }

  async fn list_topics(&self, tenant: &TenantId, category_id: Uuid) -> Result<Vec<Topic>> {
    let tenant_str   = tenant.as_str().to_owned();
    let category_str = encode_uuid(category_id);

    let raws: Vec<RawTopic> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TOPIC_COLUMNS} FROM topics
            WHERE tenant = ?1 AND category_id = ?2 AND is_active = 1
            ORDER BY display_order, created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str, category_str], RawTopic::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTopic::into_topic).collect()
  }

  async fn get_topic(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Topic>> {
    let id_str     = encode_uuid(id);
    let tenant_str = tenant.as_str().to_owned();

    let raw: Option<RawTopic> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE topic_id = ?1 AND tenant = ?2"),
            rusqlite::params![id_str, tenant_str],
            RawTopic::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawTopic::into_topic).transpose()
  }

  // ── Catalog: content ──────────────────────────────────────────────────────

  async fn create_content(&self, tenant: &TenantId, input: NewContent) -> Result<ContentItem> {
    if !self.parent_exists("topics", "topic_id", tenant, input.topic_id).await? {
      return Err(Error::TopicNotFound(input.topic_id));
    }

    let item = ContentItem {
      content_id:  Uuid::new_v4(),
      tenant:      tenant.clone(),
      topic_id:    input.topic_id,
      title:       input.title,
      description: input.description,
      body:        input.body,
      is_locked:   input.is_locked,
      is_active:   true,
      position:    input.position,
      created_at:  Utc::now(),
    };

    let id_str      = encode_uuid(item.content_id);
    let tenant_str  = tenant.as_str().to_owned();
    let topic_str   = encode_uuid(item.topic_id);
    let kind_str    = item.kind().as_ref().to_owned();
    let title       = item.title.clone();
    let description = item.description.clone();
    let body_json   = item.body.to_json()?.to_string();
    let locked      = item.is_locked;
    let position    = item.position;
    let at_str      = encode_dt(item.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO content_items (
             content_id, tenant, topic_id, kind, title, description,
             body_json, is_locked, is_active, position, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10)",
          rusqlite::params![
            id_str,
            tenant_str,
            topic_str,
            kind_str,
            title,
            description,
            body_json,
            locked,
            position,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(item)
  }

  async fn get_content(&self, tenant: &TenantId, id: Uuid) -> Result<Option<ContentItem>> {
    let id_str     = encode_uuid(id);
    let tenant_str = tenant.as_str().to_owned();

    let raw: Option<RawContent> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {CONTENT_COLUMNS} FROM content_items WHERE content_id = ?1 AND tenant = ?2"
            ),
            rusqlite::params![id_str, tenant_str],
            RawContent::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawContent::into_content).transpose()
  }

  async fn list_content(
    &self,
    tenant: &TenantId,
    topic_id: Uuid,
    kind: Option<ContentKind>,
  ) -> Result<Vec<ContentItem>> {
    let tenant_str = tenant.as_str().to_owned();
    let topic_str  = encode_uuid(topic_id);
    let kind_str   = kind.map(|k| k.as_ref().to_owned());

    let raws: Vec<RawContent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CONTENT_COLUMNS} FROM content_items
            WHERE tenant = ?1 AND topic_id = ?2 AND is_active = 1
              AND (?3 IS NULL OR kind = ?3)
            ORDER BY position, created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str, topic_str, kind_str], RawContent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawContent::into_content).collect()
  }

  async fn deactivate_content(&self, tenant: &TenantId, id: Uuid) -> Result<bool> {
    let id_str     = encode_uuid(id);
    let tenant_str = tenant.as_str().to_owned();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE content_items SET is_active = 0 WHERE content_id = ?1 AND tenant = ?2",
          rusqlite::params![id_str, tenant_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  // ── Catalog: modules ──────────────────────────────────────────────────────

  async fn create_module(&self, tenant: &TenantId, input: NewModule) -> Result<LearningModule> {
    if !self.parent_exists("topics", "topic_id", tenant, input.topic_id).await? {
      return Err(Error::TopicNotFound(input.topic_id));
    }

    let module = LearningModule {
      module_id:   Uuid::new_v4(),
      tenant:      tenant.clone(),
      topic_id:    input.topic_id,
      title:       input.title,
      description: input.description,
      items:       input.items,
      is_premium:  input.is_premium,
      is_active:   true,
      created_at:  Utc::now(),
    };

    let id_str      = encode_uuid(module.module_id);
    let tenant_str  = tenant.as_str().to_owned();
    let topic_str   = encode_uuid(module.topic_id);
    let title       = module.title.clone();
    let description = module.description.clone();
    let items_json  = serde_json::to_string(&module.items)?;
    let premium     = module.is_premium;
    let at_str      = encode_dt(module.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO learning_modules (
             module_id, tenant, topic_id, title, description,
             items_json, is_premium, is_active, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
          rusqlite::params![
            id_str,
            tenant_str,
            topic_str,
            title,
            description,
            items_json,
            premium,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(module)
  }

  async fn get_module(&self, tenant: &TenantId, id: Uuid) -> Result<Option<LearningModule>> {
    let id_str     = encode_uuid(id);
    let tenant_str = tenant.as_str().to_owned();

    let raw: Option<RawModule> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {MODULE_COLUMNS} FROM learning_modules WHERE module_id = ?1 AND tenant = ?2"
            ),
            rusqlite::params![id_str, tenant_str],
            RawModule::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawModule::into_module).transpose()
  }

  async fn list_modules(&self, tenant: &TenantId, topic_id: Uuid) -> Result<Vec<LearningModule>> {
    let tenant_str = tenant.as_str().to_owned();
    let topic_str  = encode_uuid(topic_id);

    let raws: Vec<RawModule> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MODULE_COLUMNS} FROM learning_modules
            WHERE tenant = ?1 AND topic_id = ?2 AND is_active = 1
            ORDER BY created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![tenant_str, topic_str], RawModule::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawModule::into_module).collect()
  }
}
