//! Content catalog types: categories, topics, and the content items hung off
//! a topic.
//!
//! Every record carries the tenant it was created under and an `is_active`
//! soft-delete flag. Premium gating reads the lock flags through
//! [`crate::entitlement::Gated`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, tenant::TenantId};

// ─── Category ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
  pub category_id:   Uuid,
  pub tenant:        TenantId,
  pub name:          String,
  pub description:   Option<String>,
  pub display_order: i64,
  pub is_active:     bool,
  pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
  pub name:          String,
  pub description:   Option<String>,
  #[serde(default)]
  pub display_order: i64,
}

// ─── Topic ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
  pub topic_id:      Uuid,
  pub tenant:        TenantId,
  pub category_id:   Uuid,
  pub title:         String,
  pub description:   Option<String>,
  pub is_premium:    bool,
  pub is_active:     bool,
  pub display_order: i64,
  pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTopic {
  pub category_id:   Uuid,
  pub title:         String,
  pub description:   Option<String>,
  #[serde(default)]
  pub is_premium:    bool,
  #[serde(default)]
  pub display_order: i64,
}

// ─── Content kinds ───────────────────────────────────────────────────────────

/// The closed set of content kinds a topic (and a learning module) can hold.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentKind {
  Video,
  Questionnaire,
  Mcq,
  Text,
}

/// A video hosted on the CDN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoBody {
  /// CDN object key; turned into a signed URL only after access is granted.
  pub asset_key:     String,
  pub duration_secs: Option<u32>,
  pub thumbnail_url: Option<String>,
  /// Free videos are public even when locked.
  #[serde(default)]
  pub is_free:       bool,
}

/// Open-ended reflection questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionnaireBody {
  pub questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McqQuestion {
  pub prompt:         String,
  pub options:        Vec<String>,
  pub correct_option: usize,
  pub explanation:    Option<String>,
}

/// Multiple-choice quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McqBody {
  pub questions: Vec<McqQuestion>,
}

/// Long-form reading material (markdown).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBody {
  pub body:            String,
  pub reading_minutes: Option<u32>,
}

/// The kind-specific payload of a content item. The variant name is the
/// `kind` discriminant stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ContentBody {
  Video(VideoBody),
  Questionnaire(QuestionnaireBody),
  Mcq(McqBody),
  Text(TextBody),
}

impl ContentBody {
  pub fn kind(&self) -> ContentKind {
    match self {
      Self::Video(_) => ContentKind::Video,
      Self::Questionnaire(_) => ContentKind::Questionnaire,
      Self::Mcq(_) => ContentKind::Mcq,
      Self::Text(_) => ContentKind::Text,
    }
  }

  /// Serialise the inner payload (without the kind tag) for storage.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Rebuild from the stored discriminant and payload.
  pub fn from_parts(kind: &str, data: serde_json::Value) -> Result<Self> {
    kind
      .parse::<ContentKind>()
      .map_err(|_| Error::UnknownContentKind(kind.to_owned()))?;
    let wrapped = serde_json::json!({ "kind": kind, "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }
}

// ─── Content item ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
  pub content_id:  Uuid,
  pub tenant:      TenantId,
  pub topic_id:    Uuid,
  pub title:       String,
  pub description: Option<String>,
  pub body:        ContentBody,
  /// `isPremium` for quizzes and text, `isLocked` for videos.
  pub is_locked:   bool,
  pub is_active:   bool,
  pub position:    i64,
  pub created_at:  DateTime<Utc>,
}

impl ContentItem {
  pub fn kind(&self) -> ContentKind { self.body.kind() }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewContent {
  pub topic_id:    Uuid,
  pub title:       String,
  pub description: Option<String>,
  pub body:        ContentBody,
  #[serde(default)]
  pub is_locked:   bool,
  #[serde(default)]
  pub position:    i64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn body_splits_into_kind_and_payload() {
    let body = ContentBody::Text(TextBody { body: "# Hi".into(), reading_minutes: Some(2) });
    let data = body.to_json().unwrap();
    assert_eq!(data["body"], "# Hi");
    assert!(data.get("kind").is_none());

    let back = ContentBody::from_parts(body.kind().as_ref(), data).unwrap();
    assert_eq!(back.kind(), ContentKind::Text);
  }

  #[test]
  fn unknown_kind_is_rejected() {
    let err = ContentBody::from_parts("podcast", serde_json::json!({})).unwrap_err();
    assert!(matches!(err, Error::UnknownContentKind(k) if k == "podcast"));
  }

  #[test]
  fn video_is_free_defaults_to_false() {
    let body: ContentBody = serde_json::from_value(serde_json::json!({
      "kind": "video",
      "data": { "asset_key": "videos/a.mp4", "duration_secs": 60, "thumbnail_url": null }
    }))
    .unwrap();
    match body {
      ContentBody::Video(v) => assert!(!v.is_free),
      other => panic!("expected video, got {other:?}"),
    }
  }

  #[test]
  fn kind_strings_match_serde_tags() {
    for (kind, tag) in [
      (ContentKind::Video, "video"),
      (ContentKind::Questionnaire, "questionnaire"),
      (ContentKind::Mcq, "mcq"),
      (ContentKind::Text, "text"),
    ] {
      assert_eq!(kind.as_ref(), tag);
      assert_eq!(serde_json::to_value(kind).unwrap(), tag);
    }
  }
}
