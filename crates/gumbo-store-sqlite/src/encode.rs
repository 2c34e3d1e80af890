//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as fixed-width RFC 3339 strings (nanosecond
//! precision, `Z` suffix) so that string comparison in SQL orders them
//! correctly. Kind-specific payloads are stored as compact JSON. UUIDs are
//! stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use gumbo_core::{
  content::{Category, ContentBody, ContentItem, Topic},
  module::{LearningModule, ModuleItemRef},
  principal::{Principal, Role},
  subscription::{Plan, Subscription, SubscriptionStatus},
  tenant::TenantId,
  webhook::WebhookFailure,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ──────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

fn decode_tenant(s: &str) -> Result<TenantId> { Ok(TenantId::parse(s)?) }

fn decode_enum<T: std::str::FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown {column}: {s:?}")))
}

// ─── Principal ────────────────────────────────────────────────────────────────

pub const PRINCIPAL_COLUMNS: &str = "principal_id, tenant, email, username, password_hash, \
   external_id, display_name, role, is_active, subscription_id, created_at, last_login_at";

pub struct RawPrincipal {
  pub principal_id:    String,
  pub tenant:          String,
  pub email:           String,
  pub username:        Option<String>,
  pub password_hash:   Option<String>,
  pub external_id:     Option<String>,
  pub display_name:    Option<String>,
  pub role:            String,
  pub is_active:       bool,
  pub subscription_id: Option<String>,
  pub created_at:      String,
  pub last_login_at:   Option<String>,
}

impl RawPrincipal {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      principal_id:    row.get(0)?,
      tenant:          row.get(1)?,
      email:           row.get(2)?,
      username:        row.get(3)?,
      password_hash:   row.get(4)?,
      external_id:     row.get(5)?,
      display_name:    row.get(6)?,
      role:            row.get(7)?,
      is_active:       row.get(8)?,
      subscription_id: row.get(9)?,
      created_at:      row.get(10)?,
      last_login_at:   row.get(11)?,
    })
  }

  pub fn into_principal(self) -> Result<Principal> {
    Ok(Principal {
      principal_id:    decode_uuid(&self.principal_id)?,
      tenant:          decode_tenant(&self.tenant)?,
      email:           self.email,
      username:        self.username,
      password_hash:   self.password_hash,
      external_id:     self.external_id,
      display_name:    self.display_name,
      role:            decode_enum::<Role>("role", &self.role)?,
      is_active:       self.is_active,
      subscription_id: decode_opt_uuid(self.subscription_id)?,
      created_at:      decode_dt(&self.created_at)?,
      last_login_at:   decode_opt_dt(self.last_login_at)?,
    })
  }
}

// ─── Subscription ─────────────────────────────────────────────────────────────

pub const SUBSCRIPTION_COLUMNS: &str = "subscription_id, principal_id, tenant, plan, status, \
   amount, currency, start_date, end_date, next_billing_date, provider_subscription_id, \
   last_payment_id, last_payment_at, last_failed_payment_id, auto_renew, is_recurring, \
   is_trial_subscription, trial_converted, failed_payment_count, cancellation_reason, \
   created_at, updated_at, revision";

pub struct RawSubscription {
  pub subscription_id:          String,
  pub principal_id:             String,
  pub tenant:                   String,
  pub plan:                     String,
  pub status:                   String,
  pub amount:                   i64,
  pub currency:                 String,
  pub start_date:               String,
  pub end_date:                 String,
  pub next_billing_date:        Option<String>,
  pub provider_subscription_id: Option<String>,
  pub last_payment_id:          Option<String>,
  pub last_payment_at:          Option<String>,
  pub last_failed_payment_id:   Option<String>,
  pub auto_renew:               bool,
  pub is_recurring:             bool,
  pub is_trial_subscription:    bool,
  pub trial_converted:          bool,
  pub failed_payment_count:     u32,
  pub cancellation_reason:      Option<String>,
  pub created_at:               String,
  pub updated_at:               String,
  pub revision:                 u32,
}

impl RawSubscription {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subscription_id:          row.get(0)?,
      principal_id:             row.get(1)?,
      tenant:                   row.get(2)?,
      plan:                     row.get(3)?,
      status:                   row.get(4)?,
      amount:                   row.get(5)?,
      currency:                 row.get(6)?,
      start_date:               row.get(7)?,
      end_date:                 row.get(8)?,
      next_billing_date:        row.get(9)?,
      provider_subscription_id: row.get(10)?,
      last_payment_id:          row.get(11)?,
      last_payment_at:          row.get(12)?,
      last_failed_payment_id:   row.get(13)?,
      auto_renew:               row.get(14)?,
      is_recurring:             row.get(15)?,
      is_trial_subscription:    row.get(16)?,
      trial_converted:          row.get(17)?,
      failed_payment_count:     row.get(18)?,
      cancellation_reason:      row.get(19)?,
      created_at:               row.get(20)?,
      updated_at:               row.get(21)?,
      revision:                 row.get(22)?,
    })
  }

  pub fn into_subscription(self) -> Result<Subscription> {
    Ok(Subscription {
      subscription_id:          decode_uuid(&self.subscription_id)?,
      principal_id:             decode_uuid(&self.principal_id)?,
      tenant:                   decode_tenant(&self.tenant)?,
      plan:                     decode_enum::<Plan>("plan", &self.plan)?,
      status:                   decode_enum::<SubscriptionStatus>("status", &self.status)?,
      amount:                   self.amount,
      currency:                 self.currency,
      start_date:               decode_dt(&self.start_date)?,
      end_date:                 decode_dt(&self.end_date)?,
      next_billing_date:        decode_opt_dt(self.next_billing_date)?,
      provider_subscription_id: self.provider_subscription_id,
      last_payment_id:          self.last_payment_id,
      last_payment_at:          decode_opt_dt(self.last_payment_at)?,
      last_failed_payment_id:   self.last_failed_payment_id,
      auto_renew:               self.auto_renew,
      is_recurring:             self.is_recurring,
      is_trial_subscription:    self.is_trial_subscription,
      trial_converted:          self.trial_converted,
      failed_payment_count:     self.failed_payment_count,
      cancellation_reason:      self.cancellation_reason,
      created_at:               decode_dt(&self.created_at)?,
      updated_at:               decode_dt(&self.updated_at)?,
      revision:                 self.revision,
    })
  }
}

// ─── Webhook failure ──────────────────────────────────────────────────────────

pub struct RawWebhookFailure {
  pub failure_id:               String,
  pub event:                    String,
  pub provider_subscription_id: Option<String>,
  pub payment_id:               Option<String>,
  pub reason:                   String,
  pub payload_digest:           String,
  pub recorded_at:              String,
}

impl RawWebhookFailure {
  pub fn into_failure(self) -> Result<WebhookFailure> {
    Ok(WebhookFailure {
      failure_id:               decode_uuid(&self.failure_id)?,
      event:                    self.event,
      provider_subscription_id: self.provider_subscription_id,
      payment_id:               self.payment_id,
      reason:                   self.reason,
      payload_digest:           self.payload_digest,
      recorded_at:              decode_dt(&self.recorded_at)?,
    })
  }
}

// ─── Catalog ──────────────────────────────────────────────────────────────────

pub const CATEGORY_COLUMNS: &str =
  "category_id, tenant, name, description, display_order, is_active, created_at";

pub struct RawCategory {
  pub category_id:   String,
  pub tenant:        String,
  pub name:          String,
  pub description:   Option<String>,
  pub display_order: i64,
  pub is_active:     bool,
  pub created_at:    String,
}

impl RawCategory {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      category_id:   row.get(0)?,
      tenant:        row.get(1)?,
      name:          row.get(2)?,
      description:   row.get(3)?,
      display_order: row.get(4)?,
      is_active:     row.get(5)?,
      created_at:    row.get(6)?,
    })
  }

  pub fn into_category(self) -> Result<Category> {
    Ok(Category {
      category_id:   decode_uuid(&self.category_id)?,
      tenant:        decode_tenant(&self.tenant)?,
      name:          self.name,
      description:   self.description,
      display_order: self.display_order,
      is_active:     self.is_active,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

pub const TOPIC_COLUMNS: &str = "topic_id, tenant, category_id, title, description, is_premium, \
   is_active, display_order, created_at";

pub struct RawTopic {
  pub topic_id:      String,
  pub tenant:        String,
  pub category_id:   String,
  pub title:         String,
  pub description:   Option<String>,
  pub is_premium:    bool,
  pub is_active:     bool,
  pub display_order: i64,
  pub created_at:    String,
}

impl RawTopic {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      topic_id:      row.get(0)?,
      tenant:        row.get(1)?,
      category_id:   row.get(2)?,
      title:         row.get(3)?,
      description:   row.get(4)?,
      is_premium:    row.get(5)?,
      is_active:     row.get(6)?,
      display_order: row.get(7)?,
      created_at:    row.get(8)?,
    })
  }

  pub fn into_topic(self) -> Result<Topic> {
    Ok(Topic {
      topic_id:      decode_uuid(&self.topic_id)?,
      tenant:        decode_tenant(&self.tenant)?,
      category_id:   decode_uuid(&self.category_id)?,
      title:         self.title,
      description:   self.description,
      is_premium:    self.is_premium,
      is_active:     self.is_active,
      display_order: self.display_order,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

pub const CONTENT_COLUMNS: &str = "content_id, tenant, topic_id, kind, title, description, \
   body_json, is_locked, is_active, position, created_at";

pub struct RawContent {
  pub content_id:  String,
  pub tenant:      String,
  pub topic_id:    String,
  pub kind:        String,
  pub title:       String,
  pub description: Option<String>,
  pub body_json:   String,
  pub is_locked:   bool,
  pub is_active:   bool,
  pub position:    i64,
  pub created_at:  String,
}

impl RawContent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      content_id:  row.get(0)?,
      tenant:      row.get(1)?,
      topic_id:    row.get(2)?,
      kind:        row.get(3)?,
      title:       row.get(4)?,
      description: row.get(5)?,
      body_json:   row.get(6)?,
      is_locked:   row.get(7)?,
      is_active:   row.get(8)?,
      position:    row.get(9)?,
      created_at:  row.get(10)?,
    })
  }

  pub fn into_content(self) -> Result<ContentItem> {
    let data = serde_json::from_str(&self.body_json)?;
    Ok(ContentItem {
      content_id:  decode_uuid(&self.content_id)?,
      tenant:      decode_tenant(&self.tenant)?,
      topic_id:    decode_uuid(&self.topic_id)?,
      title:       self.title,
      description: self.description,
      body:        ContentBody::from_parts(&self.kind, data)?,
      is_locked:   self.is_locked,
      is_active:   self.is_active,
      position:    self.position,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const MODULE_COLUMNS: &str = "module_id, tenant, topic_id, title, description, items_json, \
   is_premium, is_active, created_at";

pub struct RawModule {
  pub module_id:   String,
  pub tenant:      String,
  pub topic_id:    String,
  pub title:       String,
  pub description: Option<String>,
  pub items_json:  String,
  pub is_premium:  bool,
  pub is_active:   bool,
  pub created_at:  String,
}

impl RawModule {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      module_id:   row.get(0)?,
      tenant:      row.get(1)?,
      topic_id:    row.get(2)?,
      title:       row.get(3)?,
      description: row.get(4)?,
      items_json:  row.get(5)?,
      is_premium:  row.get(6)?,
      is_active:   row.get(7)?,
      created_at:  row.get(8)?,
    })
  }

  pub fn into_module(self) -> Result<LearningModule> {
    let items: Vec<ModuleItemRef> = serde_json::from_str(&self.items_json)?;
    Ok(LearningModule {
      module_id: decode_uuid(&self.module_id)?,
      tenant: decode_tenant(&self.tenant)?,
      topic_id: decode_uuid(&self.topic_id)?,
      title: self.title,
      description: self.description,
      items,
      is_premium: self.is_premium,
      is_active: self.is_active,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
