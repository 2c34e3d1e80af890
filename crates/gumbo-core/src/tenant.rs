//! Tenant identifiers and the static allow-list they are resolved against.
//!
//! A tenant is the Android package ID of the app that issued a request
//! (`com.gumbo.learning`, `com.gumbo.english`, ...). It is never stored as an
//! entity of its own; it is a partition key copied onto every tenant-scoped
//! record.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Package ID used when a request carries no `X-Package-ID` header.
pub const DEFAULT_PACKAGE_ID: &str = "com.gumbo.learning";

// ─── TenantId ────────────────────────────────────────────────────────────────

/// A validated, reverse-DNS tenant identifier.
///
/// Construction goes through [`TenantRegistry`] (allow-list membership) or
/// [`TenantId::parse`] (format only, used when loading stored rows).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
  /// Check the reverse-DNS format without consulting any allow-list.
  pub fn parse(raw: &str) -> Result<Self, TenantError> {
    if is_package_id(raw) {
      Ok(Self(raw.to_owned()))
    } else {
      Err(TenantError::InvalidFormat(raw.to_owned()))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for TenantId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for TenantId {
  type Error = TenantError;

  fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<TenantId> for String {
  fn from(value: TenantId) -> Self { value.0 }
}

/// Lowercase dot-separated segments, at least two; each segment starts with
/// a letter and continues with letters, digits or underscores.
fn is_package_id(raw: &str) -> bool {
  let mut segments = 0;
  for segment in raw.split('.') {
    let mut chars = segment.chars();
    match chars.next() {
      Some(c) if c.is_ascii_lowercase() => {}
      _ => return false,
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
      return false;
    }
    segments += 1;
  }
  segments >= 2
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenantError {
  #[error("X-Package-ID header is required")]
  Required,

  #[error("invalid package ID format: {0:?}")]
  InvalidFormat(String),

  #[error("unsupported package ID: {value}")]
  Unsupported {
    value:     String,
    supported: Vec<TenantId>,
  },
}

impl TenantError {
  /// Stable machine-readable code returned to API callers.
  pub fn code(&self) -> &'static str {
    match self {
      Self::Required => "TENANT_REQUIRED",
      Self::InvalidFormat(_) => "INVALID_PACKAGE_ID_FORMAT",
      Self::Unsupported { .. } => "UNSUPPORTED_PACKAGE_ID",
    }
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// One allow-list entry as it appears in configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TenantEntry {
  pub id:   String,
  /// Human label echoed in the `X-App-Name` response header.
  pub name: String,
}

/// The immutable allow-list of tenants this deployment serves.
///
/// Built once at startup and shared; resolution is a pure function of the
/// header value and this list.
#[derive(Debug, Clone)]
pub struct TenantRegistry {
  default: TenantId,
  tenants: Vec<(TenantId, String)>,
}

impl TenantRegistry {
  /// Build a registry from configuration entries.
  ///
  /// Every entry must be well-formed and `default` must be one of them.
  pub fn new(
    default: &str,
    entries: impl IntoIterator<Item = TenantEntry>,
  ) -> Result<Self, TenantError> {
    let tenants = entries
      .into_iter()
      .map(|e| TenantId::parse(&e.id).map(|id| (id, e.name)))
      .collect::<Result<Vec<_>, _>>()?;

    let default = TenantId::parse(default)?;
    if !tenants.iter().any(|(id, _)| *id == default) {
      return Err(TenantError::Unsupported {
        value:     default.0,
        supported: tenants.into_iter().map(|(id, _)| id).collect(),
      });
    }

    Ok(Self { default, tenants })
  }

  /// The built-in allow-list: Seekho and Bolo.
  pub fn gumbo() -> Self {
    Self {
      default: TenantId(DEFAULT_PACKAGE_ID.to_owned()),
      tenants: vec![
        (TenantId("com.gumbo.learning".to_owned()), "Seekho".to_owned()),
        (TenantId("com.gumbo.english".to_owned()), "Bolo".to_owned()),
      ],
    }
  }

  pub fn default_tenant(&self) -> &TenantId { &self.default }

  pub fn supported(&self) -> impl Iterator<Item = &TenantId> {
    self.tenants.iter().map(|(id, _)| id)
  }

  /// Human label for a tenant, e.g. `"Seekho"`.
  pub fn label(&self, tenant: &TenantId) -> Option<&str> {
    self
      .tenants
      .iter()
      .find(|(id, _)| id == tenant)
      .map(|(_, name)| name.as_str())
  }

  /// Resolve an optional header value. Absent (or blank) falls back to the
  /// default tenant for older app builds that never sent the header.
  pub fn resolve(&self, header: Option<&str>) -> Result<TenantId, TenantError> {
    match header.map(str::trim).filter(|h| !h.is_empty()) {
      None => Ok(self.default.clone()),
      Some(raw) => self.lookup(raw),
    }
  }

  /// Like [`resolve`](Self::resolve) but an absent header is an error.
  pub fn resolve_required(&self, header: Option<&str>) -> Result<TenantId, TenantError> {
    match header.map(str::trim).filter(|h| !h.is_empty()) {
      None => Err(TenantError::Required),
      Some(raw) => self.lookup(raw),
    }
  }

  /// Validate format, then allow-list membership.
  pub fn lookup(&self, raw: &str) -> Result<TenantId, TenantError> {
    let candidate = TenantId::parse(raw)?;
    if self.tenants.iter().any(|(id, _)| *id == candidate) {
      Ok(candidate)
    } else {
      Err(TenantError::Unsupported {
        value:     candidate.0,
        supported: self.supported().cloned().collect(),
      })
    }
  }
}
