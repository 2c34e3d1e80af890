//! Response projections of catalog records.
//!
//! Every gated record is projected through [`Projection`], which decides
//! access once per item against the request's [`Viewer`]. A denied item keeps
//! its metadata but loses its payload, and asset URLs are signed only for
//! granted items.

use chrono::{DateTime, Duration, Utc};
use gumbo_core::{
  content::{ContentBody, ContentItem, ContentKind, McqQuestion, Topic},
  entitlement::{Gate, Gated, Viewer},
  module::LearningModule,
  store::Repository,
  tenant::TenantId,
};
use serde::Serialize;
use uuid::Uuid;

use crate::signer::UrlSigner;

#[derive(Debug, Serialize)]
pub struct TopicView {
  pub topic_id:      Uuid,
  pub category_id:   Uuid,
  pub title:         String,
  pub description:   Option<String>,
  pub is_premium:    bool,
  pub display_order: i64,
  pub has_access:    bool,
}

/// The kind-specific part of a content item; present only when access is
/// granted.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ContentPayload {
  Video { video_url: String },
  Questionnaire { questions: Vec<String> },
  Mcq { questions: Vec<McqQuestion> },
  Text { body: String, reading_minutes: Option<u32> },
}

#[derive(Debug, Serialize)]
pub struct ContentView {
  pub content_id:    Uuid,
  pub topic_id:      Uuid,
  pub kind:          ContentKind,
  pub title:         String,
  pub description:   Option<String>,
  pub position:      i64,
  pub is_premium:    bool,
  pub has_access:    bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub thumbnail_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration_secs: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub payload:       Option<ContentPayload>,
}

#[derive(Debug, Serialize)]
pub struct ModuleView {
  pub module_id:   Uuid,
  pub topic_id:    Uuid,
  pub title:       String,
  pub description: Option<String>,
  pub is_premium:  bool,
  pub has_access:  bool,
  pub item_count:  usize,
  /// Resolved items in module order; empty when access is denied.
  pub items:       Vec<ContentView>,
}

/// Per-request projection context.
pub struct Projection<'a> {
  pub viewer:  &'a Viewer,
  pub signer:  &'a dyn UrlSigner,
  pub url_ttl: Duration,
  pub now:     DateTime<Utc>,
}

impl Projection<'_> {
  pub fn topic(&self, topic: Topic) -> TopicView {
    let has_access = self.viewer.can_access(&topic, self.now);
    TopicView {
      topic_id: topic.topic_id,
      category_id: topic.category_id,
      title: topic.title,
      description: topic.description,
      is_premium: topic.is_premium,
      display_order: topic.display_order,
      has_access,
    }
  }

  pub fn content(&self, item: ContentItem) -> ContentView {
    let gate       = item.gate();
    let has_access = self.viewer.can_access(&item, self.now);
    let kind       = item.kind();

    let (thumbnail_url, duration_secs, payload) = match item.body {
      ContentBody::Video(video) => {
        let payload = has_access.then(|| ContentPayload::Video {
          video_url: self.signer.sign(
            &video.asset_key,
            self.url_ttl,
            gate == Gate::Premium,
            self.now,
          ),
        });
        (video.thumbnail_url, video.duration_secs, payload)
      }
      ContentBody::Questionnaire(q) => {
        (None, None, has_access.then(|| ContentPayload::Questionnaire { questions: q.questions }))
      }
      ContentBody::Mcq(m) => {
        (None, None, has_access.then(|| ContentPayload::Mcq { questions: m.questions }))
      }
      ContentBody::Text(t) => (
        None,
        None,
        has_access.then(|| ContentPayload::Text { body: t.body, reading_minutes: t.reading_minutes }),
      ),
    };

    ContentView {
      content_id: item.content_id,
      topic_id: item.topic_id,
      kind,
      title: item.title,
      description: item.description,
      position: item.position,
      is_premium: gate == Gate::Premium,
      has_access,
      thumbnail_url,
      duration_secs,
      payload,
    }
  }

  /// A module without its items.
  pub fn module_summary(&self, module: &LearningModule) -> ModuleView {
    ModuleView {
      module_id:   module.module_id,
      topic_id:    module.topic_id,
      title:       module.title.clone(),
      description: module.description.clone(),
      is_premium:  module.is_premium,
      has_access:  self.viewer.can_access(module, self.now),
      item_count:  module.items.len(),
      items:       Vec::new(),
    }
  }

  /// Resolve a module's item references within `tenant`. References to
  /// missing, inactive or mis-kinded items are skipped.
  pub async fn module<S: Repository>(
    &self,
    repo: &S,
    tenant: &TenantId,
    module: &LearningModule,
  ) -> Result<ModuleView, S::Error> {
    let mut view = self.module_summary(module);
    if !view.has_access {
      return Ok(view);
    }

    for item_ref in &module.items {
      let Some(item) = repo.get_content(tenant, item_ref.content_id).await? else {
        tracing::debug!(content_id = %item_ref.content_id, "module references a missing item");
        continue;
      };
      if !item.is_active {
        continue;
      }
      if !item_ref.resolves_to(&item.body) {
        tracing::warn!(
          module_id = %module.module_id,
          content_id = %item_ref.content_id,
          expected = %item_ref.kind,
          found = %item.kind(),
          "module reference names the wrong kind"
        );
        continue;
      }
      view.items.push(self.content(item));
    }
    Ok(view)
  }
}
