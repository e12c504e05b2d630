//! The clip store contract.

use chrono::{DateTime, Utc};
use naya_common::error::{NayaError, NayaResult};
use naya_project_model::{ClipDurations, ClipId, ClipMetadata, ClipPatch, ContainerFormat, NewClip};

/// Storage of clip metadata and payloads, keyed by clip id.
///
/// Concurrent `put`s never interfere with each other. Concurrent `get` and
/// `delete` on the same id race; callers keep a single writer per id.
pub trait ClipStore: Send + Sync {
    /// Commit metadata and payload as one unit and return the stored
    /// metadata, including the assigned id.
    fn put(&self, clip: NewClip, payload: Vec<u8>) -> NayaResult<ClipMetadata>;

    /// Metadata and payload of a clip, or `NotFound`.
    fn get(&self, id: &ClipId) -> NayaResult<(ClipMetadata, Vec<u8>)>;

    /// Metadata of a clip without touching its payload.
    fn metadata(&self, id: &ClipId) -> NayaResult<ClipMetadata>;

    /// All clip metadata, newest first. Never loads payloads.
    fn list_metadata(&self) -> NayaResult<Vec<ClipMetadata>>;

    /// Apply `patch` to the mutable metadata fields of a clip.
    fn update_metadata(&self, id: &ClipId, patch: &ClipPatch) -> NayaResult<ClipMetadata>;

    /// Remove metadata and payload together.
    fn delete(&self, id: &ClipId) -> NayaResult<()>;

    fn contains(&self, id: &ClipId) -> bool {
        self.metadata(id).is_ok()
    }

    /// Aggregate statistics over all stored clips.
    fn stats(&self) -> NayaResult<StoreStats> {
        Ok(StoreStats::from_metadata(&self.list_metadata()?))
    }
}

/// Storage usage summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub total_clips: usize,
    pub total_bytes: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

impl StoreStats {
    pub fn from_metadata(clips: &[ClipMetadata]) -> Self {
        Self {
            total_clips: clips.len(),
            total_bytes: clips.iter().map(|c| c.byte_size).sum(),
            oldest: clips.iter().map(|c| c.created_at).min(),
            newest: clips.iter().map(|c| c.created_at).max(),
        }
    }
}

/// Adapter exposing a store as a timeline duration source.
pub struct StoreDurations<'a, S: ?Sized>(pub &'a S);

impl<S: ClipStore + ?Sized> ClipDurations for StoreDurations<'_, S> {
    fn clip_duration(&self, id: &ClipId) -> Option<f64> {
        self.0.metadata(id).ok().map(|m| m.duration_secs)
    }
}

/// Reject clips that could be written but never read back.
pub(crate) fn validate_new_clip(clip: &NewClip, payload: &[u8]) -> NayaResult<()> {
    if payload.is_empty() {
        return Err(NayaError::storage("Refusing to store an empty payload"));
    }
    if !clip.duration_secs.is_finite() || clip.duration_secs < 0.0 {
        return Err(NayaError::storage(format!(
            "Refusing to store clip '{}' with duration {}",
            clip.name, clip.duration_secs
        )));
    }
    Ok(())
}

/// Build the stored metadata for a new clip: fresh id, creation time,
/// and size/type derived from the payload.
pub(crate) fn new_metadata(clip: NewClip, payload: &[u8]) -> ClipMetadata {
    ClipMetadata {
        id: ClipId::generate(),
        name: clip.name,
        duration_secs: clip.duration_secs,
        created_at: Utc::now(),
        byte_size: payload.len() as u64,
        mime_type: derive_mime_type(payload, clip.mime_hint.as_deref()),
        thumbnail: clip.thumbnail,
        tags: clip.tags,
        description: clip.description,
    }
}

/// MIME type of a payload: the sniffed container when recognizable, else
/// the caller's hint, else `application/octet-stream`.
///
/// A hint naming the same container as the payload is kept as-is so the
/// codec parameter survives.
pub fn derive_mime_type(payload: &[u8], hint: Option<&str>) -> String {
    match (ContainerFormat::sniff(payload), hint) {
        (Some(sniffed), Some(hint)) if ContainerFormat::from_mime(hint) == Some(sniffed) => {
            hint.to_string()
        }
        (Some(sniffed), _) => sniffed.mime_type().to_string(),
        (None, Some(hint)) => hint.to_string(),
        (None, None) => "application/octet-stream".to_string(),
    }
}

/// Newest first, id as tiebreak so the order is total.
pub(crate) fn sort_newest_first(clips: &mut [ClipMetadata]) {
    clips.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
