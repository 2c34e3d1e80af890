//! Authoring and operations endpoints under `/api/admin`. Every handler
//! requires the `admin` role, and writes land in the tenant named by the
//! request's `X-Package-ID` header.

use axum::extract::{Path, Query, State};
use chrono::Utc;
use gumbo_core::{
  content::{Category, ContentItem, NewCategory, NewContent, NewTopic, Topic},
  module::{LearningModule, NewModule},
  store::Repository,
  webhook::WebhookFailure,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  auth::RequireAdmin,
  envelope::{Created, Data},
  error::ApiError,
  handlers::JsonBody,
  maintenance::{self, SweepReport},
  tenant::ResolvedTenant,
};

const DEFAULT_FAILURE_LIMIT: usize = 50;
const MAX_FAILURE_LIMIT: usize = 500;

fn require_title(title: &str) -> Result<(), ApiError> {
  if title.trim().is_empty() {
    return Err(ApiError::Validation("title must not be empty".to_owned()));
  }
  Ok(())
}

/// `POST /api/admin/categories`
pub async fn create_category<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  RequireAdmin(_): RequireAdmin,
  JsonBody(body): JsonBody<NewCategory>,
) -> Result<Created<Category>, ApiError>
where
  S: Repository + Clone + 'static,
{
  if body.name.trim().is_empty() {
    return Err(ApiError::Validation("name must not be empty".to_owned()));
  }
  let category = state
    .store
    .create_category(&tenant.id, body)
    .await
    .map_err(ApiError::store)?;
  Ok(Created(category))
}

/// `POST /api/admin/topics`
pub async fn create_topic<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  RequireAdmin(_): RequireAdmin,
  JsonBody(body): JsonBody<NewTopic>,
) -> Result<Created<Topic>, ApiError>
where
  S: Repository + Clone + 'static,
{
  require_title(&body.title)?;
  let topic = state
    .store
    .create_topic(&tenant.id, body)
    .await
    .map_err(ApiError::store)?;
  Ok(Created(topic))
}

/// `POST /api/admin/content`
pub async fn create_content<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  RequireAdmin(_): RequireAdmin,
  JsonBody(body): JsonBody<NewContent>,
) -> Result<Created<ContentItem>, ApiError>
where
  S: Repository + Clone + 'static,
{
  require_title(&body.title)?;
  let item = state
    .store
    .create_content(&tenant.id, body)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(content_id = %item.content_id, kind = %item.kind(), tenant = %item.tenant, "content created");
  Ok(Created(item))
}

/// `DELETE /api/admin/content/{id}`
pub async fn deactivate_content<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  RequireAdmin(_): RequireAdmin,
  Path(content_id): Path<Uuid>,
) -> Result<Data<Uuid>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let found = state
    .store
    .deactivate_content(&tenant.id, content_id)
    .await
    .map_err(ApiError::store)?;
  if !found {
    return Err(ApiError::NotFound(format!("content {content_id} not found")));
  }
  Ok(Data(content_id))
}

/// `POST /api/admin/modules`
///
/// Every item reference must name active content of the declared kind under
/// the module's topic in the same tenant.
pub async fn create_module<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  RequireAdmin(_): RequireAdmin,
  JsonBody(body): JsonBody<NewModule>,
) -> Result<Created<LearningModule>, ApiError>
where
  S: Repository + Clone + 'static,
{
  require_title(&body.title)?;
  for item_ref in &body.items {
    let item = state
      .store
      .get_content(&tenant.id, item_ref.content_id)
      .await
      .map_err(ApiError::store)?
      .filter(|c| c.is_active && c.topic_id == body.topic_id);
    match item {
      Some(item) if item_ref.resolves_to(&item.body) => {}
      Some(item) => {
        return Err(ApiError::Validation(format!(
          "content {} is {}, not {}",
          item_ref.content_id,
          item.kind(),
          item_ref.kind
        )));
      }
      None => {
        return Err(ApiError::Validation(format!(
          "content {} is not part of topic {}",
          item_ref.content_id, body.topic_id
        )));
      }
    }
  }

  let module = state
    .store
    .create_module(&tenant.id, body)
    .await
    .map_err(ApiError::store)?;
  Ok(Created(module))
}

/// `POST /api/admin/maintenance`: run one expiry sweep now.
pub async fn run_maintenance<S>(
  State(state): State<AppState<S>>,
  RequireAdmin(ctx): RequireAdmin,
) -> Result<Data<SweepReport>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let report = maintenance::sweep(state.store.as_ref(), Utc::now())
    .await
    .map_err(ApiError::store)?;
  tracing::info!(
    principal_id = %ctx.principal.principal_id,
    expired = report.expired,
    reaped = report.reaped,
    "manual maintenance sweep"
  );
  Ok(Data(report))
}

#[derive(Debug, Deserialize)]
pub struct FailureParams {
  pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FailureList {
  pub failures: Vec<WebhookFailure>,
}

/// `GET /api/admin/webhook-failures[?limit=N]`
pub async fn webhook_failures<S>(
  State(state): State<AppState<S>>,
  RequireAdmin(_): RequireAdmin,
  Query(params): Query<FailureParams>,
) -> Result<Data<FailureList>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let limit = params.limit.unwrap_or(DEFAULT_FAILURE_LIMIT).min(MAX_FAILURE_LIMIT);
  let failures = state
    .store
    .list_webhook_failures(limit)
    .await
    .map_err(ApiError::store)?;
  Ok(Data(FailureList { failures }))
}
