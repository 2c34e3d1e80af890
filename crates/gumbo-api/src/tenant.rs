//! Tenant-resolution middleware and the [`ResolvedTenant`] extractor.
//!
//! The middleware runs ahead of every `/api` handler. A rejected
//! `X-Package-ID` header short-circuits the request before any extractor or
//! store call runs.

use axum::{
  extract::{FromRequestParts, Request, State},
  http::{HeaderMap, HeaderName, HeaderValue, request::Parts},
  middleware::Next,
  response::{IntoResponse, Response},
};
use gumbo_core::{
  store::Repository,
  tenant::{TenantError, TenantId},
};

use crate::{AppState, error::ApiError};

pub const PACKAGE_ID_HEADER: HeaderName = HeaderName::from_static("x-package-id");
pub const RESPONSE_PACKAGE_ID_HEADER: HeaderName =
  HeaderName::from_static("x-response-package-id");
pub const APP_NAME_HEADER: HeaderName = HeaderName::from_static("x-app-name");

/// The tenant a request was resolved to, stored in request extensions.
#[derive(Debug, Clone)]
pub struct ResolvedTenant {
  pub id:    TenantId,
  pub label: Option<String>,
}

/// Read the raw header. A value that is not visible ASCII can never be a
/// package ID.
fn package_header(headers: &HeaderMap) -> Result<Option<&str>, TenantError> {
  headers
    .get(PACKAGE_ID_HEADER)
    .map(|v| {
      v.to_str()
        .map_err(|_| TenantError::InvalidFormat(String::from_utf8_lossy(v.as_bytes()).into_owned()))
    })
    .transpose()
}

/// Middleware for public routes: an absent header falls back to the default
/// tenant.
pub async fn resolve<S>(State(state): State<AppState<S>>, req: Request, next: Next) -> Response
where
  S: Repository + Clone + 'static,
{
  let resolved = package_header(req.headers()).and_then(|h| state.tenants.resolve(h));
  run(&state, resolved, req, next).await
}

/// Middleware for authoring routes: the header must be present.
pub async fn resolve_required<S>(
  State(state): State<AppState<S>>,
  req: Request,
  next: Next,
) -> Response
where
  S: Repository + Clone + 'static,
{
  let resolved = package_header(req.headers()).and_then(|h| state.tenants.resolve_required(h));
  run(&state, resolved, req, next).await
}

async fn run<S>(
  state: &AppState<S>,
  resolved: Result<TenantId, TenantError>,
  mut req: Request,
  next: Next,
) -> Response
where
  S: Repository + Clone + 'static,
{
  let id = match resolved {
    Ok(id) => id,
    Err(e) => {
      tracing::warn!(code = e.code(), "rejected package id");
      return ApiError::from(e).into_response();
    }
  };

  let tenant = ResolvedTenant {
    label: state.tenants.label(&id).map(str::to_owned),
    id,
  };
  req.extensions_mut().insert(tenant.clone());

  let mut resp = next.run(req).await;
  let headers = resp.headers_mut();
  if let Ok(v) = HeaderValue::from_str(tenant.id.as_str()) {
    headers.insert(RESPONSE_PACKAGE_ID_HEADER, v);
  }
  if let Some(v) = tenant.label.as_deref().and_then(|l| HeaderValue::from_str(l).ok()) {
    headers.insert(APP_NAME_HEADER, v);
  }
  resp
}

impl<St: Send + Sync> FromRequestParts<St> for ResolvedTenant {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _: &St) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<ResolvedTenant>()
      .cloned()
      .ok_or_else(|| ApiError::Internal("tenant middleware not installed".to_owned()))
  }
}
