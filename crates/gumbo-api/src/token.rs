//! HS256 access tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
  /// Principal id.
  sub: Uuid,
  iat: i64,
  exp: i64,
}

/// Signing keys and lifetime, built once from configuration.
#[derive(Clone)]
pub struct TokenConfig {
  encoding:   EncodingKey,
  decoding:   DecodingKey,
  validation: Validation,
  ttl:        Duration,
}

impl TokenConfig {
  pub fn new(secret: &str, ttl: Duration) -> Self {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    Self {
      encoding: EncodingKey::from_secret(secret.as_bytes()),
      decoding: DecodingKey::from_secret(secret.as_bytes()),
      validation,
      ttl,
    }
  }

  pub fn issue(&self, principal_id: Uuid, now: DateTime<Utc>) -> Result<String, ApiError> {
    let claims = Claims {
      sub: principal_id,
      iat: now.timestamp(),
      exp: (now + self.ttl).timestamp(),
    };
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
      .map_err(|e| ApiError::Internal(format!("token encoding failed: {e}")))
  }

  /// The principal id of a well-signed, unexpired token.
  pub fn verify(&self, token: &str) -> Option<Uuid> {
    jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
      .ok()
      .map(|data| data.claims.sub)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn issued_token_verifies() {
    let tokens = TokenConfig::new("secret", Duration::hours(1));
    let id     = Uuid::new_v4();
    let token  = tokens.issue(id, Utc::now()).unwrap();
    assert_eq!(tokens.verify(&token), Some(id));
  }

  #[test]
  fn expired_token_is_rejected() {
    let tokens = TokenConfig::new("secret", Duration::hours(1));
    let token  = tokens.issue(Uuid::new_v4(), Utc::now() - Duration::hours(2)).unwrap();
    assert_eq!(tokens.verify(&token), None);
  }

  #[test]
  fn foreign_signature_is_rejected() {
    let ours   = TokenConfig::new("secret", Duration::hours(1));
    let theirs = TokenConfig::new("other", Duration::hours(1));
    let token  = theirs.issue(Uuid::new_v4(), Utc::now()).unwrap();
    assert_eq!(ours.verify(&token), None);
    assert_eq!(ours.verify("not-a-jwt"), None);
  }
}
