//! In-memory clip store.
//!
//! Same contract as [`FsClipStore`](crate::FsClipStore) minus durability.
//! Used for ephemeral sessions and as a test double.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use naya_common::error::{NayaError, NayaResult};
use naya_project_model::{ClipId, ClipMetadata, ClipPatch, NewClip};

use crate::store::{new_metadata, sort_newest_first, validate_new_clip, ClipStore};

#[derive(Debug, Default)]
pub struct MemoryClipStore {
    clips: Mutex<HashMap<ClipId, (ClipMetadata, Vec<u8>)>>,
}

impl MemoryClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClipId, (ClipMetadata, Vec<u8>)>> {
        // A panic while holding the lock cannot leave a half-written entry:
        // every mutation is a single insert or remove.
        self.clips.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ClipStore for MemoryClipStore {
    fn put(&self, clip: NewClip, payload: Vec<u8>) -> NayaResult<ClipMetadata> {
        validate_new_clip(&clip, &payload)?;
        let meta = new_metadata(clip, &payload);
        self.lock().insert(meta.id.clone(), (meta.clone(), payload));
        Ok(meta)
    }

    fn get(&self, id: &ClipId) -> NayaResult<(ClipMetadata, Vec<u8>)> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| NayaError::not_found(id.as_str()))
    }

    fn metadata(&self, id: &ClipId) -> NayaResult<ClipMetadata> {
        self.lock()
            .get(id)
            .map(|(meta, _)| meta.clone())
            .ok_or_else(|| NayaError::not_found(id.as_str()))
    }

    fn list_metadata(&self) -> NayaResult<Vec<ClipMetadata>> {
        let mut clips: Vec<ClipMetadata> =
            self.lock().values().map(|(meta, _)| meta.clone()).collect();
        sort_newest_first(&mut clips);
        Ok(clips)
    }

    fn update_metadata(&self, id: &ClipId, patch: &ClipPatch) -> NayaResult<ClipMetadata> {
        let mut clips = self.lock();
        let (meta, _) = clips
            .get_mut(id)
            .ok_or_else(|| NayaError::not_found(id.as_str()))?;
        patch.apply(meta);
        Ok(meta.clone())
    }

    fn delete(&self, id: &ClipId) -> NayaResult<()> {
        self.lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| NayaError::not_found(id.as_str()))
    }
}
