//! The external identity-provider seam used by `POST /api/auth/external`.
//!
//! A verifier turns the identity token a client obtained from its sign-in
//! provider into an [`ExternalProfile`]. Provider key rotation and token
//! exchange happen outside this service, in the broker that mints the tokens.

use gumbo_core::principal::{ExternalProfile, normalize_email};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

pub trait IdentityVerifier: Send + Sync {
  /// The verified profile behind `id_token`, or `None` if the token is not
  /// acceptable for any reason.
  fn verify(&self, id_token: &str) -> Option<ExternalProfile>;
}

/// Rejects every token. Used when no identity broker is configured.
#[derive(Debug, Default)]
pub struct Disabled;

impl IdentityVerifier for Disabled {
  fn verify(&self, _id_token: &str) -> Option<ExternalProfile> { None }
}

#[derive(Debug, Deserialize)]
struct IdentityClaims {
  sub:            String,
  email:          String,
  #[serde(default)]
  name:           Option<String>,
  #[serde(default = "verified_by_default")]
  email_verified: bool,
}

fn verified_by_default() -> bool { true }

/// HS256 identity tokens from a broker that shares `secret` with this
/// service. Issuer and audience are pinned.
#[derive(Clone)]
pub struct BrokerVerifier {
  decoding:   DecodingKey,
  validation: Validation,
}

impl BrokerVerifier {
  pub fn new(secret: &str, issuer: &str, audience: &str) -> Self {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
    Self { decoding: DecodingKey::from_secret(secret.as_bytes()), validation }
  }
}

impl IdentityVerifier for BrokerVerifier {
  fn verify(&self, id_token: &str) -> Option<ExternalProfile> {
    let claims = match jsonwebtoken::decode::<IdentityClaims>(id_token, &self.decoding, &self.validation) {
      Ok(data) => data.claims,
      Err(e) => {
        tracing::debug!(error = %e, "identity token rejected");
        return None;
      }
    };
    let email = normalize_email(&claims.email);
    if !claims.email_verified || claims.sub.is_empty() || !email.contains('@') {
      return None;
    }
    Some(ExternalProfile {
      subject: claims.sub,
      email,
      display_name: claims.name.filter(|n| !n.trim().is_empty()),
    })
  }
}
