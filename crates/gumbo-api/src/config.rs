//! Runtime server configuration, deserialised from `config.toml` layered
//! with `GUMBO_*` environment variables.

use std::{path::PathBuf, sync::Arc};

use chrono::Duration;
use gumbo_core::{
  subscription::PricingConfig,
  tenant::{DEFAULT_PACKAGE_ID, TenantEntry, TenantError, TenantRegistry},
};
use serde::Deserialize;

use crate::identity::{BrokerVerifier, Disabled, IdentityVerifier};

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                      String,
  #[serde(default = "default_port")]
  pub port:                      u16,
  pub store_path:                PathBuf,

  /// HS256 secret for access tokens.
  pub jwt_secret:                String,
  #[serde(default = "default_jwt_expiry")]
  pub jwt_expiry_secs:           i64,

  #[serde(default = "default_tenant")]
  pub default_tenant:            String,
  #[serde(default = "default_tenants")]
  pub tenants:                   Vec<TenantEntry>,

  pub cdn_base_url:              String,
  pub url_signing_secret:        String,
  #[serde(default = "default_signed_url_ttl")]
  pub signed_url_ttl_secs:       i64,

  /// Prices in minor currency units (paise).
  #[serde(default = "default_monthly_price")]
  pub monthly_price:             i64,
  #[serde(default = "default_yearly_price")]
  pub yearly_price:              i64,
  #[serde(default = "default_trial_price")]
  pub trial_price:               i64,
  #[serde(default = "default_trial_days")]
  pub trial_days:                i64,
  #[serde(default = "default_currency")]
  pub currency:                  String,

  /// Shared secret of the identity broker; external login is disabled
  /// when unset.
  #[serde(default)]
  pub identity_secret:           Option<String>,
  #[serde(default = "default_identity_issuer")]
  pub identity_issuer:           String,
  #[serde(default = "default_identity_audience")]
  pub identity_audience:         String,

  /// Seconds between background expiry sweeps; `0` disables the task.
  #[serde(default = "default_maintenance_interval")]
  pub maintenance_interval_secs: u64,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 5000 }
fn default_jwt_expiry() -> i64 { 7 * 24 * 60 * 60 }
fn default_tenant() -> String { DEFAULT_PACKAGE_ID.to_owned() }
fn default_signed_url_ttl() -> i64 { 60 * 60 }
fn default_monthly_price() -> i64 { PricingConfig::default().monthly_amount }
fn default_yearly_price() -> i64 { PricingConfig::default().yearly_amount }
fn default_trial_price() -> i64 { PricingConfig::default().trial_amount }
fn default_trial_days() -> i64 { PricingConfig::default().trial_days }
fn default_currency() -> String { PricingConfig::default().currency }
fn default_identity_issuer() -> String { "gumbo-identity".to_owned() }
fn default_identity_audience() -> String { "gumbo-api".to_owned() }
fn default_maintenance_interval() -> u64 { 15 * 60 }

fn default_tenants() -> Vec<TenantEntry> {
  vec![
    TenantEntry { id: "com.gumbo.learning".to_owned(), name: "Seekho".to_owned() },
    TenantEntry { id: "com.gumbo.english".to_owned(), name: "Bolo".to_owned() },
  ]
}

impl ServerConfig {
  pub fn tenant_registry(&self) -> Result<TenantRegistry, TenantError> {
    TenantRegistry::new(&self.default_tenant, self.tenants.iter().cloned())
  }

  pub fn pricing(&self) -> PricingConfig {
    PricingConfig {
      trial_amount:   self.trial_price,
      monthly_amount: self.monthly_price,
      yearly_amount:  self.yearly_price,
      trial_days:     self.trial_days,
      currency:       self.currency.clone(),
    }
  }

  pub fn identity_verifier(&self) -> Arc<dyn IdentityVerifier> {
    match &self.identity_secret {
      Some(secret) => Arc::new(BrokerVerifier::new(secret, &self.identity_issuer, &self.identity_audience)),
      None => Arc::new(Disabled),
    }
  }

  pub fn jwt_expiry(&self) -> Duration { Duration::seconds(self.jwt_expiry_secs) }

  pub fn signed_url_ttl(&self) -> Duration { Duration::seconds(self.signed_url_ttl_secs) }
}
