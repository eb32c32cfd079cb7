//! Asset domain models.
//!
//! `MediaAsset` is the one durable record per stored binary. Descriptive
//! metadata lives in named fields; anything else a caller writes through a
//! bulk update lands in the flattened `extra` map and round-trips untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use utoipa::ToSchema;

/// Which external store serves an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify by MIME type: `video/*` is video, everything else image.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Durable record for one stored asset.
///
/// `id`, `url`, `kind`, `size`, `content_type`, `backend_ref`, and
/// `created_at` are immutable once assigned; `name` and `extra` are the
/// mutable surface. `updated_at` is bumped on every metadata mutation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MediaAsset {
    pub id: String,
    pub url: String,
    pub kind: MediaKind,
    pub name: String,
    pub size: i64,
    pub content_type: String,
    /// Opaque reference into the external store, needed to delete there.
    pub backend_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Caller-written fields that are not part of the core schema.
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, JsonValue>,
}

/// Field names a bulk update may not touch.
pub const IMMUTABLE_FIELDS: &[&str] = &[
    "id",
    "url",
    "kind",
    "size",
    "content_type",
    "backend_ref",
    "created_at",
];

impl MediaAsset {
    /// Shallow last-write-wins merge of `updates` into this record.
    ///
    /// Known mutable fields are applied in place, unknown fields pass through
    /// into `extra`, and `updated_at` is stamped. Immutable fields must have
    /// been rejected by request validation before this is called; any that
    /// slip through are ignored rather than applied.
    pub fn apply_updates(&mut self, updates: &Map<String, JsonValue>) {
        for (key, value) in updates {
            if IMMUTABLE_FIELDS.contains(&key.as_str()) || key == "updated_at" {
                continue;
            }
            if key == "name" {
                if let Some(name) = value.as_str() {
                    self.name = name.to_string();
                }
                continue;
            }
            self.extra.insert(key.clone(), value.clone());
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn asset() -> MediaAsset {
        let now = Utc::now();
        MediaAsset {
            id: "img_1".into(),
            url: "https://cdn.example/img_1.jpg".into(),
            kind: MediaKind::Image,
            name: "photo.jpg".into(),
            size: 1024,
            content_type: "image/jpeg".into(),
            backend_ref: "provider/img_1".into(),
            created_at: now,
            updated_at: now,
            extra: Map::new(),
        }
    }

    #[test]
    fn kind_from_content_type() {
        assert_eq!(MediaKind::from_content_type("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_content_type("image/png"), MediaKind::Image);
        assert_eq!(
            MediaKind::from_content_type("application/octet-stream"),
            MediaKind::Image
        );
    }

    #[test]
    fn apply_updates_merges_and_stamps() {
        let mut a = asset();
        let before = a.updated_at;
        let mut updates = Map::new();
        updates.insert("name".into(), json!("renamed.jpg"));
        updates.insert("alt_text".into(), json!("a photo"));
        a.apply_updates(&updates);
        assert_eq!(a.name, "renamed.jpg");
        assert_eq!(a.extra["alt_text"], json!("a photo"));
        assert!(a.updated_at >= before);
    }

    #[test]
    fn apply_updates_ignores_immutable_fields() {
        let mut a = asset();
        let mut updates = Map::new();
        updates.insert("id".into(), json!("hijacked"));
        updates.insert("url".into(), json!("https://evil.example"));
        a.apply_updates(&updates);
        assert_eq!(a.id, "img_1");
        assert_eq!(a.url, "https://cdn.example/img_1.jpg");
        assert!(a.extra.is_empty());
    }

    #[test]
    fn extra_fields_round_trip_through_json() {
        let mut a = asset();
        a.extra.insert("caption".into(), json!("hello"));
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["caption"], json!("hello"));
        let back: MediaAsset = serde_json::from_value(v).unwrap();
        assert_eq!(back.extra["caption"], json!("hello"));
    }
}
