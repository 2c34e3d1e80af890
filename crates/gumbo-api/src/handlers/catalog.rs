//! Public catalog reads. Authentication is optional; every item is annotated
//! with the caller's access.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/categories` | Active categories in display order |
//! | `GET`  | `/api/categories/{id}/topics` | Topics with `has_access` |
//! | `GET`  | `/api/topics/{id}` | Topic, content listing and module summaries |
//! | `GET`  | `/api/content/{id}` | 403 + preview when denied |
//! | `GET`  | `/api/modules/{id}` | Populated module; 403 + preview when denied |

use axum::extract::{Path, Query, State};
use chrono::Utc;
use gumbo_core::{
  content::{Category, ContentKind},
  entitlement::Viewer,
  store::Repository,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  auth::MaybeAuth,
  envelope::Data,
  error::ApiError,
  tenant::ResolvedTenant,
  views::{ContentView, ModuleView, Projection, TopicView},
};

fn projection<'a, S>(state: &'a AppState<S>, viewer: &'a Viewer) -> Projection<'a>
where
  S: Repository + Clone + 'static,
{
  Projection {
    viewer,
    signer: state.signer.as_ref(),
    url_ttl: state.signed_url_ttl,
    now: Utc::now(),
  }
}

fn denied<T: Serialize>(preview: &T) -> ApiError {
  match serde_json::to_value(preview) {
    Ok(preview) => ApiError::SubscriptionRequired { preview },
    Err(e) => ApiError::Internal(format!("preview serialisation failed: {e}")),
  }
}

/// `GET /api/categories`
pub async fn list_categories<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
) -> Result<Data<Vec<Category>>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let categories = state.store.list_categories(&tenant.id).await.map_err(ApiError::store)?;
  Ok(Data(categories))
}

/// `GET /api/categories/{id}/topics`
pub async fn list_topics<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  auth: MaybeAuth,
  Path(category_id): Path<Uuid>,
) -> Result<Data<Vec<TopicView>>, ApiError>
where
  S: Repository + Clone + 'static,
{
  state
    .store
    .get_category(&tenant.id, category_id)
    .await
    .map_err(ApiError::store)?
    .filter(|c| c.is_active)
    .ok_or_else(|| ApiError::NotFound(format!("category {category_id} not found")))?;

  let topics = state
    .store
    .list_topics(&tenant.id, category_id)
    .await
    .map_err(ApiError::store)?;

  let viewer = auth.viewer();
  let proj   = projection(&state, &viewer);
  Ok(Data(topics.into_iter().map(|t| proj.topic(t)).collect()))
}

// ─── Topic detail ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TopicParams {
  /// Restrict the content listing to one kind, e.g. `?kind=video`.
  pub kind: Option<ContentKind>,
}

#[derive(Debug, Serialize)]
pub struct TopicDetail {
  pub topic:   TopicView,
  pub content: Vec<ContentView>,
  pub modules: Vec<ModuleView>,
}

/// `GET /api/topics/{id}[?kind=...]`
pub async fn get_topic<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  auth: MaybeAuth,
  Path(topic_id): Path<Uuid>,
  Query(params): Query<TopicParams>,
) -> Result<Data<TopicDetail>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let topic = state
    .store
    .get_topic(&tenant.id, topic_id)
    .await
    .map_err(ApiError::store)?
    .filter(|t| t.is_active)
    .ok_or_else(|| ApiError::NotFound(format!("topic {topic_id} not found")))?;

  let content = state
    .store
    .list_content(&tenant.id, topic_id, params.kind)
    .await
    .map_err(ApiError::store)?;
  let modules = state
    .store
    .list_modules(&tenant.id, topic_id)
    .await
    .map_err(ApiError::store)?;

  let viewer = auth.viewer();
  let proj   = projection(&state, &viewer);
  Ok(Data(TopicDetail {
    topic:   proj.topic(topic),
    content: content.into_iter().map(|c| proj.content(c)).collect(),
    modules: modules.iter().map(|m| proj.module_summary(m)).collect(),
  }))
}

/// `GET /api/content/{id}`
pub async fn get_content<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  auth: MaybeAuth,
  Path(content_id): Path<Uuid>,
) -> Result<Data<ContentView>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let item = state
    .store
    .get_content(&tenant.id, content_id)
    .await
    .map_err(ApiError::store)?
    .filter(|c| c.is_active)
    .ok_or_else(|| ApiError::NotFound(format!("content {content_id} not found")))?;

  let viewer = auth.viewer();
  let view   = projection(&state, &viewer).content(item);
  if !view.has_access {
    return Err(denied(&view));
  }
  Ok(Data(view))
}

/// `GET /api/modules/{id}`
pub async fn get_module<S>(
  State(state): State<AppState<S>>,
  tenant: ResolvedTenant,
  auth: MaybeAuth,
  Path(module_id): Path<Uuid>,
) -> Result<Data<ModuleView>, ApiError>
where
  S: Repository + Clone + 'static,
{
  let module = state
    .store
    .get_module(&tenant.id, module_id)
    .await
    .map_err(ApiError::store)?
    .filter(|m| m.is_active)
    .ok_or_else(|| ApiError::NotFound(format!("module {module_id} not found")))?;

  let viewer = auth.viewer();
  let view = projection(&state, &viewer)
    .module(state.store.as_ref(), &tenant.id, &module)
    .await
    .map_err(ApiError::store)?;
  if !view.has_access {
    return Err(denied(&view));
  }
  Ok(Data(view))
}
