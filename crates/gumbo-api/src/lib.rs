//! HTTP layer for the Gumbo learning backend.
//!
//! Exposes an axum [`Router`] backed by any [`Repository`]. Every `/api`
//! route runs behind the tenant-resolution middleware, so handlers always see
//! a [`tenant::ResolvedTenant`].
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = gumbo_api::router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod maintenance;
pub mod password;
pub mod payments;
pub mod signer;
pub mod tenant;
pub mod token;
pub mod views;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
  Router,
  middleware,
  routing::{delete, get, post},
};
use gumbo_core::{store::Repository, subscription::PricingConfig, tenant::TenantRegistry};
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::ApiError;

use handlers::{accounts, admin, catalog, subscriptions, webhooks};
use identity::IdentityVerifier;
use payments::PaymentProvider;
use signer::UrlSigner;
use token::TokenConfig;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: Repository> {
  pub store:          Arc<S>,
  pub tenants:        Arc<TenantRegistry>,
  pub tokens:         Arc<TokenConfig>,
  pub pricing:        Arc<PricingConfig>,
  pub signer:         Arc<dyn UrlSigner>,
  pub payments:       Arc<dyn PaymentProvider>,
  pub identity:       Arc<dyn IdentityVerifier>,
  pub signed_url_ttl: chrono::Duration,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the application router.
///
/// Public and account routes default to the configured tenant when
/// `X-Package-ID` is absent. Admin routes require the header.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: Repository + Clone + 'static,
{
  let public = Router::new()
    // Accounts
    .route("/api/auth/register",              post(accounts::register::<S>))
    .route("/api/auth/login",                 post(accounts::login::<S>))
    .route("/api/auth/external",              post(accounts::external_login::<S>))
    .route("/api/auth/logout",                post(accounts::logout))
    .route("/api/auth/me",                    get(accounts::me).delete(accounts::delete_me::<S>))
    .route("/api/profile/{id}",               get(accounts::profile::<S>))
    // Catalog
    .route("/api/categories",                 get(catalog::list_categories::<S>))
    .route("/api/categories/{id}/topics",     get(catalog::list_topics::<S>))
    .route("/api/topics/{id}",                get(catalog::get_topic::<S>))
    .route("/api/content/{id}",               get(catalog::get_content::<S>))
    .route("/api/modules/{id}",               get(catalog::get_module::<S>))
    // Subscriptions
    .route("/api/subscriptions/current",      get(subscriptions::current))
    .route("/api/subscriptions/checkout",     post(subscriptions::checkout::<S>))
    .route("/api/subscriptions/cancel",       post(subscriptions::cancel::<S>))
    .route_layer(middleware::from_fn_with_state(state.clone(), tenant::resolve::<S>));

  let admin = Router::new()
    .route("/api/admin/categories",           post(admin::create_category::<S>))
    .route("/api/admin/topics",               post(admin::create_topic::<S>))
    .route("/api/admin/content",              post(admin::create_content::<S>))
    .route("/api/admin/content/{id}",         delete(admin::deactivate_content::<S>))
    .route("/api/admin/modules",              post(admin::create_module::<S>))
    .route("/api/admin/maintenance",          post(admin::run_maintenance::<S>))
    .route("/api/admin/webhook-failures",     get(admin::webhook_failures::<S>))
    .route_layer(middleware::from_fn_with_state(state.clone(), tenant::resolve_required::<S>));

  // Provider callbacks carry no package header; the subscription record
  // already knows its tenant.
  let callbacks = Router::new()
    .route("/api/webhooks/payments",          post(webhooks::receive::<S>));

  Router::new()
    .route("/health", get(handlers::health))
    .merge(public)
    .merge(admin)
    .merge(callbacks)
    .fallback(handlers::fallback)
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
