//! The `Repository` trait and its error contract.
//!
//! The trait is implemented by storage backends (e.g. `gumbo-store-sqlite`).
//! Higher layers (`gumbo-api`) depend on this abstraction, not on any
//! concrete backend.
//!
//! Every catalog method takes the requester's [`TenantId`]; there is no way to
//! read or write a tenant-scoped catalog row without one.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  content::{Category, ContentItem, ContentKind, NewCategory, NewContent, NewTopic, Topic},
  module::{LearningModule, NewModule},
  principal::{ExternalProfile, NewPrincipal, Principal},
  subscription::{NewSubscription, Subscription},
  tenant::TenantId,
  webhook::{NewWebhookFailure, WebhookFailure},
};

// ─── Error contract ──────────────────────────────────────────────────────────

/// Coarse classification of a store failure, mapped to HTTP status codes by
/// the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFailure {
  /// A uniqueness constraint was violated (e.g. duplicate email), or a
  /// conditional write found the record changed.
  Conflict,
  /// A referenced parent row does not exist in the tenant.
  NotFound,
  Internal,
}

pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn failure(&self) -> StoreFailure;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the Gumbo storage backend.
///
/// Every mutation touches a single row. Writes that span records (linking a
/// subscription to its principal) are issued as separate calls and may be
/// observed half-applied by a concurrent reader.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait Repository: Send + Sync {
  type Error: StoreError;

  // ── Principals ────────────────────────────────────────────────────────

  /// Persist a new principal. Fails with [`StoreFailure::Conflict`] if the
  /// email is already registered in the tenant.
  fn create_principal(
    &self,
    input: NewPrincipal,
  ) -> impl Future<Output = Result<Principal, Self::Error>> + Send + '_;

  /// Look up a principal by id regardless of tenant.
  fn get_principal(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Principal>, Self::Error>> + Send + '_;

  /// Look up a principal by id within one tenant partition.
  fn get_principal_in_tenant<'a>(
    &'a self,
    id: Uuid,
    tenant: &'a TenantId,
  ) -> impl Future<Output = Result<Option<Principal>, Self::Error>> + Send + 'a;

  fn find_principal_by_email<'a>(
    &'a self,
    tenant: &'a TenantId,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Principal>, Self::Error>> + Send + 'a;

  /// Look up the principal linked to an external identity within one tenant.
  fn find_principal_by_external_id<'a>(
    &'a self,
    tenant: &'a TenantId,
    subject: &'a str,
  ) -> impl Future<Output = Result<Option<Principal>, Self::Error>> + Send + 'a;

  /// Link `profile.subject` to the principal, refresh its display name when
  /// the provider supplies one, and stamp `last_login_at`.
  fn record_external_login<'a>(
    &'a self,
    id: Uuid,
    profile: &'a ExternalProfile,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Stamp `last_login_at`.
  fn record_login(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Point the principal at its newest subscription.
  fn link_subscription(
    &self,
    principal_id: Uuid,
    subscription_id: Option<Uuid>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Soft-delete: clear `is_active`, scramble the email and unlink the
  /// external identity. Returns the updated record, or `None` if the
  /// principal does not exist.
  fn deactivate_principal(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Principal>, Self::Error>> + Send + '_;

  // ── Subscriptions ─────────────────────────────────────────────────────

  /// Persist a new `pending` subscription.
  fn create_subscription(
    &self,
    input: NewSubscription,
  ) -> impl Future<Output = Result<Subscription, Self::Error>> + Send + '_;

  fn get_subscription(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + '_;

  fn find_subscription_by_provider_id<'a>(
    &'a self,
    provider_subscription_id: &'a str,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + 'a;

  /// All subscriptions of a principal, newest first.
  fn list_subscriptions(
    &self,
    principal_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Subscription>, Self::Error>> + Send + '_;

  /// The most recently created subscription with status `active` and an
  /// `end_date` after `now`.
  fn active_subscription(
    &self,
    principal_id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + '_;

  /// Overwrite the mutable lifecycle fields of an existing subscription.
  ///
  /// The write only lands if the stored revision still equals
  /// `subscription.revision`, and bumps it by one. A record that another
  /// writer saved in the meantime fails with [`StoreFailure::Conflict`];
  /// reload it and re-apply the change.
  fn save_subscription<'a>(
    &'a self,
    subscription: &'a Subscription,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Mark every active subscription whose window closed before `now` as
  /// expired. Returns the number of rows changed.
  fn expire_lapsed(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Delete `pending` subscriptions created before `cutoff`.
  fn reap_pending(
    &self,
    cutoff: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Webhook failures ──────────────────────────────────────────────────

  fn record_webhook_failure(
    &self,
    input: NewWebhookFailure,
  ) -> impl Future<Output = Result<WebhookFailure, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_webhook_failures(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<WebhookFailure>, Self::Error>> + Send + '_;

  // ── Catalog ───────────────────────────────────────────────────────────

  fn create_category<'a>(
    &'a self,
    tenant: &'a TenantId,
    input: NewCategory,
  ) -> impl Future<Output = Result<Category, Self::Error>> + Send + 'a;

  /// Active categories of the tenant in display order.
  fn list_categories<'a>(
    &'a self,
    tenant: &'a TenantId,
  ) -> impl Future<Output = Result<Vec<Category>, Self::Error>> + Send + 'a;

  fn get_category<'a>(
    &'a self,
    tenant: &'a TenantId,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Category>, Self::Error>> + Send + 'a;

  /// Fails with [`StoreFailure::NotFound`] if the category is not in the
  /// tenant.
  fn create_topic<'a>(
    &'a self,
    tenant: &'a TenantId,
    input: NewTopic,
  ) -> impl Future<Output = Result<Topic, Self::Error>> + Send + 'a;

  /// Active topics of a category in display order.
  fn list_topics<'a>(
    &'a self,
    tenant: &'a TenantId,
    category_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Topic>, Self::Error>> + Send + 'a;

  fn get_topic<'a>(
    &'a self,
    tenant: &'a TenantId,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Topic>, Self::Error>> + Send + 'a;

  /// Fails with [`StoreFailure::NotFound`] if the topic is not in the tenant.
  fn create_content<'a>(
    &'a self,
    tenant: &'a TenantId,
    input: NewContent,
  ) -> impl Future<Output = Result<ContentItem, Self::Error>> + Send + 'a;

  fn get_content<'a>(
    &'a self,
    tenant: &'a TenantId,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ContentItem>, Self::Error>> + Send + 'a;

  /// Active content of a topic by position, optionally of one kind.
  fn list_content<'a>(
    &'a self,
    tenant: &'a TenantId,
    topic_id: Uuid,
    kind: Option<ContentKind>,
  ) -> impl Future<Output = Result<Vec<ContentItem>, Self::Error>> + Send + 'a;

  /// Soft-delete. Returns `false` if no such item exists in the tenant.
  fn deactivate_content<'a>(
    &'a self,
    tenant: &'a TenantId,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Fails with [`StoreFailure::NotFound`] if the topic is not in the tenant.
  fn create_module<'a>(
    &'a self,
    tenant: &'a TenantId,
    input: NewModule,
  ) -> impl Future<Output = Result<LearningModule, Self::Error>> + Send + 'a;

  fn get_module<'a>(
    &'a self,
    tenant: &'a TenantId,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<LearningModule>, Self::Error>> + Send + 'a;

  /// Active modules of a topic.
  fn list_modules<'a>(
    &'a self,
    tenant: &'a TenantId,
    topic_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LearningModule>, Self::Error>> + Send + 'a;
}
