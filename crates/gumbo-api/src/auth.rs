//! Bearer-token authentication and role authorization.
//!
//! [`authenticate`] turns an `Authorization` header into an [`AuthContext`].
//! Three extractors wrap it:
//!
//! | Extractor      | On failure              |
//! |----------------|-------------------------|
//! | [`RequireAuth`]  | rejects with the error  |
//! | [`MaybeAuth`]    | continues anonymously   |
//! | [`RequireAdmin`] | rejects; also checks role |

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use chrono::{DateTime, Utc};
use gumbo_core::{
  entitlement::Viewer,
  principal::{Principal, Role},
  store::Repository,
  subscription::Subscription,
  tenant::TenantId,
};

use crate::{AppState, error::ApiError, tenant::ResolvedTenant, token::TokenConfig};

/// The authenticated caller of one request, with its live subscription read
/// at authentication time.
#[derive(Debug, Clone)]
pub struct AuthContext {
  pub principal:    Principal,
  pub subscription: Option<Subscription>,
}

impl AuthContext {
  pub fn viewer(&self) -> Viewer {
    Viewer {
      principal:    Some(self.principal.clone()),
      subscription: self.subscription.clone(),
    }
  }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

/// Resolve the caller of a request in `tenant`.
///
/// Every failure is terminal; the first failing check decides the error.
pub async fn authenticate<S: Repository>(
  repo: &S,
  tokens: &TokenConfig,
  headers: &HeaderMap,
  tenant: &TenantId,
  now: DateTime<Utc>,
) -> Result<AuthContext, ApiError> {
  let token = bearer(headers).ok_or(ApiError::NoToken)?;
  let principal_id = tokens.verify(token).ok_or(ApiError::InvalidToken)?;

  // Two-phase lookup: global first, then within the request tenant. Older
  // principal rows were written before tenant tagging; collapse this to the
  // tenant-scoped query once every stored principal carries a tenant.
  let principal = match repo.get_principal(principal_id).await.map_err(ApiError::store)? {
    Some(p) => Some(p),
    None => repo
      .get_principal_in_tenant(principal_id, tenant)
      .await
      .map_err(ApiError::store)?,
  };
  let principal = principal.ok_or(ApiError::InvalidToken)?;

  if !principal.may_act_in(tenant) {
    return Err(ApiError::TenantMismatch);
  }
  if !principal.is_active {
    return Err(ApiError::AccountDeactivated);
  }

  let subscription = repo
    .active_subscription(principal.principal_id, now)
    .await
    .map_err(ApiError::store)?;

  Ok(AuthContext { principal, subscription })
}

/// Reject callers whose role is not listed.
pub fn authorize(ctx: &AuthContext, allowed: &[Role]) -> Result<(), ApiError> {
  if allowed.contains(&ctx.principal.role) {
    Ok(())
  } else {
    Err(ApiError::InsufficientRole)
  }
}

async fn authenticate_parts<S>(parts: &Parts, state: &AppState<S>) -> Result<AuthContext, ApiError>
where
  S: Repository + Clone + 'static,
{
  let tenant = parts
    .extensions
    .get::<ResolvedTenant>()
    .map(|t| t.id.clone())
    .unwrap_or_else(|| state.tenants.default_tenant().clone());
  authenticate(state.store.as_ref(), &state.tokens, &parts.headers, &tenant, Utc::now()).await
}

// ─── Extractors ──────────────────────────────────────────────────────────────

/// An authenticated caller, or a 401/403 rejection.
pub struct RequireAuth(pub AuthContext);

/// The caller if authentication succeeds, otherwise anonymous.
pub struct MaybeAuth(pub Option<AuthContext>);

impl MaybeAuth {
  pub fn viewer(&self) -> Viewer {
    self.0.as_ref().map(AuthContext::viewer).unwrap_or_default()
  }
}

/// An authenticated caller with the `admin` role.
pub struct RequireAdmin(pub AuthContext);

impl<S> FromRequestParts<AppState<S>> for RequireAuth
where
  S: Repository + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    match authenticate_parts(parts, state).await {
      Ok(ctx) => Ok(Self(ctx)),
      Err(e) => {
        tracing::warn!(code = e.code(), "authentication rejected");
        Err(e)
      }
    }
  }
}

impl<S> FromRequestParts<AppState<S>> for MaybeAuth
where
  S: Repository + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    match authenticate_parts(parts, state).await {
      Ok(ctx) => Ok(Self(Some(ctx))),
      // Store failures still surface; only credential problems degrade.
      Err(e @ (ApiError::Store(_) | ApiError::Internal(_))) => Err(e),
      Err(e) => {
        tracing::debug!(code = e.code(), "continuing anonymously");
        Ok(Self(None))
      }
    }
  }
}

impl<S> FromRequestParts<AppState<S>> for RequireAdmin
where
  S: Repository + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let RequireAuth(ctx) = RequireAuth::from_request_parts(parts, state).await?;
    authorize(&ctx, &[Role::Admin])?;
    Ok(Self(ctx))
  }
}
