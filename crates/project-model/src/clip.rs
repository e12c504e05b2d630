//! Clip identity and metadata.
//!
//! A clip is one unit of stored, encoded video. Its metadata lives next to
//! the payload in the clip store; everything here is payload-free so it can
//! be listed and passed around cheaply.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque unique clip identifier. Never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(String);

impl ClipId {
    /// Generate a fresh identifier (`clip_<uuid>`).
    pub fn generate() -> Self {
        Self(format!("clip_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is safe to use as a single path component.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClipId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ClipId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl FromStr for ClipId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// Stored clip metadata (`meta.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipMetadata {
    /// Assigned by the store at creation.
    pub id: ClipId,

    /// Human-readable label.
    pub name: String,

    /// Authoritative length, from the actual capture or composition.
    pub duration_secs: f64,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Payload size in bytes.
    pub byte_size: u64,

    /// Payload MIME type, derived from the payload container.
    pub mime_type: String,

    /// Preview still as a `data:` URL.
    #[serde(default)]
    pub thumbnail: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub description: String,
}

/// Metadata for a clip that has not been stored yet.
#[derive(Debug, Clone, Default)]
pub struct NewClip {
    pub name: String,
    pub duration_secs: f64,
    /// MIME type reported by the encoder; used when the payload's container
    /// cannot be sniffed.
    pub mime_hint: Option<String>,
    pub thumbnail: Option<String>,
    pub tags: Vec<String>,
    pub description: String,
}

impl NewClip {
    pub fn new(name: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            name: name.into(),
            duration_secs,
            ..Self::default()
        }
    }
}

/// Partial update of the mutable metadata fields.
///
/// Identity, creation time, size, type, duration and payload are not
/// representable here and therefore cannot be changed by an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl ClipPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.tags.is_none()
            && self.description.is_none()
            && self.thumbnail.is_none()
    }

    pub fn apply(&self, meta: &mut ClipMetadata) {
        if let Some(name) = &self.name {
            meta.name = name.clone();
        }
        if let Some(tags) = &self.tags {
            meta.tags = tags.clone();
        }
        if let Some(description) = &self.description {
            meta.description = description.clone();
        }
        if let Some(thumbnail) = &self.thumbnail {
            meta.thumbnail = Some(thumbnail.clone());
        }
    }
}

/// Source of clip durations for timeline offset computation.
pub trait ClipDurations {
    fn clip_duration(&self, id: &ClipId) -> Option<f64>;
}

impl ClipDurations for HashMap<ClipId, f64> {
    fn clip_duration(&self, id: &ClipId) -> Option<f64> {
        self.get(id).copied()
    }
}

impl ClipDurations for Vec<ClipMetadata> {
    fn clip_duration(&self, id: &ClipId) -> Option<f64> {
        self.iter().find(|m| &m.id == id).map(|m| m.duration_secs)
    }
}

/// Format a byte count as `12.3 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        let rounded = (value * 10.0).round() / 10.0;
        format!("{rounded} {}", UNITS[unit])
    }
}

/// Format seconds as `m:ss`.
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
