//! Learning modules: ordered playlists of content items within a topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  content::{ContentBody, ContentKind},
  tenant::TenantId,
};

/// A typed pointer to a content item. [`ModuleItemRef::resolves_to`] matches
/// exhaustively on `kind`, so adding a kind is a compile error until it is
/// handled there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleItemRef {
  pub kind:       ContentKind,
  pub content_id: Uuid,
}

impl ModuleItemRef {
  /// Whether `body` is of the kind this reference names.
  pub fn resolves_to(&self, body: &ContentBody) -> bool {
    match self.kind {
      ContentKind::Video => matches!(body, ContentBody::Video(_)),
      ContentKind::Questionnaire => matches!(body, ContentBody::Questionnaire(_)),
      ContentKind::Mcq => matches!(body, ContentBody::Mcq(_)),
      ContentKind::Text => matches!(body, ContentBody::Text(_)),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningModule {
  pub module_id:   Uuid,
  pub tenant:      TenantId,
  pub topic_id:    Uuid,
  pub title:       String,
  pub description: Option<String>,
  /// In display order.
  pub items:       Vec<ModuleItemRef>,
  pub is_premium:  bool,
  pub is_active:   bool,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewModule {
  pub topic_id:    Uuid,
  pub title:       String,
  pub description: Option<String>,
  #[serde(default)]
  pub items:       Vec<ModuleItemRef>,
  #[serde(default)]
  pub is_premium:  bool,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::content::{TextBody, VideoBody};

  #[test]
  fn reference_resolves_only_to_its_own_kind() {
    let text  = ContentBody::Text(TextBody { body: "hi".into(), reading_minutes: None });
    let video = ContentBody::Video(VideoBody {
      asset_key:     "v.mp4".into(),
      duration_secs: None,
      thumbnail_url: None,
      is_free:       false,
    });
    let as_text = ModuleItemRef { kind: ContentKind::Text, content_id: Uuid::new_v4() };
    let as_video = ModuleItemRef { kind: ContentKind::Video, ..as_text };

    assert!(as_text.resolves_to(&text));
    assert!(!as_text.resolves_to(&video));
    assert!(as_video.resolves_to(&video));
    assert!(!as_video.resolves_to(&text));
  }
}
