//! Principals: the user accounts that authenticate against a tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tenant::TenantId;

/// What a principal is allowed to do beyond reading its own data.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  #[default]
  User,
  /// Cross-tenant superuser; exempt from tenant matching.
  Admin,
}

/// A user account. Never hard-deleted: deactivation clears `is_active`,
/// scrambles `email` and drops `external_id`, so the address and the external
/// identity can sign up again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
  pub principal_id:    Uuid,
  /// Set at creation, never changed.
  pub tenant:          TenantId,
  pub email:           String,
  pub username:        Option<String>,
  /// argon2 PHC string; absent for external-identity-only accounts.
  #[serde(skip_serializing, default)]
  pub password_hash:   Option<String>,
  /// Subject from an external identity provider (e.g. Google).
  pub external_id:     Option<String>,
  pub display_name:    Option<String>,
  pub role:            Role,
  pub is_active:       bool,
  /// Most recently linked subscription. Informational only; entitlement
  /// always re-reads the live subscription record.
  pub subscription_id: Option<Uuid>,
  pub created_at:      DateTime<Utc>,
  pub last_login_at:   Option<DateTime<Utc>>,
}

impl Principal {
  pub fn is_admin(&self) -> bool { self.role == Role::Admin }

  /// Whether this principal may authenticate against `tenant`.
  pub fn may_act_in(&self, tenant: &TenantId) -> bool {
    self.is_admin() || self.tenant == *tenant
  }
}

/// Input to [`crate::store::Repository::create_principal`].
#[derive(Debug, Clone)]
pub struct NewPrincipal {
  pub tenant:        TenantId,
  pub email:         String,
  pub username:      Option<String>,
  pub password_hash: Option<String>,
  pub external_id:   Option<String>,
  pub display_name:  Option<String>,
  pub role:          Role,
}

impl NewPrincipal {
  /// A plain `user` account with every optional field empty.
  pub fn new(tenant: TenantId, email: &str) -> Self {
    Self {
      tenant,
      email: normalize_email(email),
      username: None,
      password_hash: None,
      external_id: None,
      display_name: None,
      role: Role::User,
    }
  }
}

/// An identity asserted by an external provider and already verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
  /// The provider's stable subject identifier.
  pub subject:      String,
  pub email:        String,
  pub display_name: Option<String>,
}

impl ExternalProfile {
  /// Input for the account created on this identity's first login.
  pub fn new_principal(&self, tenant: TenantId) -> NewPrincipal {
    let mut input = NewPrincipal::new(tenant, &self.email);
    input.external_id = Some(self.subject.clone());
    input.display_name = self.display_name.clone();
    input
  }
}

/// Emails are compared case-insensitively and without surrounding space.
pub fn normalize_email(raw: &str) -> String { raw.trim().to_lowercase() }

/// The email written over a deactivated account.
pub fn scrambled_email(principal_id: Uuid, email: &str) -> String {
  format!("deleted-{principal_id}-{email}")
}
