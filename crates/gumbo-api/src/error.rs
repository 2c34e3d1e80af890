//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure leaves the server as
//! `{"success": false, "message": "...", "code": "..."}`.

use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use gumbo_core::{
  store::{StoreError, StoreFailure},
  tenant::TenantError,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Shared by every token rejection so callers cannot tell which check failed.
const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";

/// An error returned by an API handler, extractor or middleware.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Tenant(#[from] TenantError),

  #[error("no token provided")]
  NoToken,

  #[error("invalid token")]
  InvalidToken,

  /// The token is valid but belongs to a principal of another tenant.
  #[error("token tenant mismatch")]
  TenantMismatch,

  #[error("account deactivated")]
  AccountDeactivated,

  #[error("insufficient role")]
  InsufficientRole,

  #[error("invalid email or password")]
  InvalidCredentials,

  /// Entitlement denial. `preview` is the redacted view of the item.
  #[error("subscription required")]
  SubscriptionRequired { preview: Value },

  #[error("not found: {0}")]
  NotFound(String),

  #[error("validation error: {0}")]
  Validation(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("internal error: {0}")]
  Internal(String),
}

impl ApiError {
  /// Map a store error by its [`StoreFailure`] class.
  pub fn store<E: StoreError>(err: E) -> Self {
    match err.failure() {
      StoreFailure::Conflict => Self::Conflict(err.to_string()),
      StoreFailure::NotFound => Self::NotFound(err.to_string()),
      StoreFailure::Internal => Self::Store(Box::new(err)),
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::Tenant(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
      Self::NoToken | Self::InvalidToken | Self::TenantMismatch | Self::InvalidCredentials => {
        StatusCode::UNAUTHORIZED
      }
      Self::AccountDeactivated | Self::InsufficientRole | Self::SubscriptionRequired { .. } => {
        StatusCode::FORBIDDEN
      }
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::Conflict(_) => StatusCode::CONFLICT,
      Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Stable machine-readable code.
  pub fn code(&self) -> &'static str {
    match self {
      Self::Tenant(e) => e.code(),
      Self::NoToken => "NO_TOKEN",
      Self::InvalidToken => "INVALID_TOKEN",
      Self::TenantMismatch => "TENANT_MISMATCH",
      Self::AccountDeactivated => "ACCOUNT_DEACTIVATED",
      Self::InsufficientRole => "INSUFFICIENT_ROLE",
      Self::InvalidCredentials => "INVALID_CREDENTIALS",
      Self::SubscriptionRequired { .. } => "SUBSCRIPTION_REQUIRED",
      Self::NotFound(_) => "NOT_FOUND",
      Self::Validation(_) => "VALIDATION_ERROR",
      Self::Conflict(_) => "CONFLICT",
      Self::Store(_) | Self::Internal(_) => "INTERNAL_ERROR",
    }
  }

  fn message(&self) -> String {
    match self {
      Self::Tenant(e) => e.to_string(),
      Self::NoToken => "Access denied. No token provided.".to_owned(),
      Self::InvalidToken | Self::TenantMismatch => INVALID_TOKEN_MESSAGE.to_owned(),
      Self::AccountDeactivated => "Account has been deactivated".to_owned(),
      Self::InsufficientRole => "You do not have permission to perform this action".to_owned(),
      Self::InvalidCredentials => "Invalid email or password".to_owned(),
      Self::SubscriptionRequired { .. } => "An active subscription is required".to_owned(),
      Self::NotFound(m) | Self::Validation(m) | Self::Conflict(m) => m.clone(),
      Self::Store(_) | Self::Internal(_) => "Internal server error".to_owned(),
    }
  }
}

impl From<gumbo_core::Error> for ApiError {
  fn from(err: gumbo_core::Error) -> Self {
    match err {
      gumbo_core::Error::Tenant(e) => Self::Tenant(e),
      e @ gumbo_core::Error::InvalidTransition { .. } => Self::Conflict(e.to_string()),
      e @ (gumbo_core::Error::MalformedWebhook(_) | gumbo_core::Error::UnknownContentKind(_)) => {
        Self::Validation(e.to_string())
      }
      e @ gumbo_core::Error::Serialization(_) => Self::Internal(e.to_string()),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::Validation(rejection.body_text()) }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
  success:            bool,
  message:            String,
  code:               &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  supported_packages: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  data:               Option<Value>,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
      tracing::error!(error = %self, "request failed");
    }

    let body = ErrorBody {
      success: false,
      message: self.message(),
      code: self.code(),
      supported_packages: match &self {
        Self::Tenant(TenantError::Unsupported { supported, .. }) => {
          Some(supported.iter().map(ToString::to_string).collect())
        }
        _ => None,
      },
      data: match self {
        Self::SubscriptionRequired { preview } => Some(preview),
        _ => None,
      },
    };
    (status, Json(body)).into_response()
  }
}
