//! Filesystem-backed clip store.
//!
//! Every write is staged in its own directory and published with a single
//! directory rename, which is atomic within one filesystem. Deletes move
//! the clip directory out of `clips/` first, so readers either see the
//! whole clip or nothing.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use naya_common::error::{NayaError, NayaResult};
use naya_project_model::{ClipId, ClipMetadata, ClipPatch, NewClip};

use crate::store::{new_metadata, sort_newest_first, validate_new_clip, ClipStore};

const CLIPS_DIR: &str = "clips";
const STAGING_DIR: &str = "staging";
const TRASH_DIR: &str = "trash";
const META_FILE: &str = "meta.json";
const PAYLOAD_FILE: &str = "payload.bin";

/// Durable clip store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsClipStore {
    root: PathBuf,
}

impl FsClipStore {
    /// Open (creating if needed) a store at `root`.
    ///
    /// Leftovers from interrupted writes and deletes are swept here; none of
    /// them were ever visible as clips.
    pub fn open(root: impl AsRef<Path>) -> NayaResult<Self> {
        let root = root.as_ref().to_path_buf();
        for subdir in [CLIPS_DIR, STAGING_DIR, TRASH_DIR] {
            let dir = root.join(subdir);
            fs::create_dir_all(&dir).map_err(|e| storage_error(&dir, e))?;
        }

        let store = Self { root };
        let swept = store.sweep(STAGING_DIR) + store.sweep(TRASH_DIR);
        if swept > 0 {
            tracing::warn!(swept, root = %store.root.display(), "Removed incomplete clip writes");
        }
        tracing::debug!(root = %store.root.display(), "Clip store opened");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn clip_dir(&self, id: &ClipId) -> NayaResult<PathBuf> {
        if !id.is_path_safe() {
            return Err(NayaError::not_found(id.as_str()));
        }
        Ok(self.root.join(CLIPS_DIR).join(id.as_str()))
    }

    fn read_metadata(&self, id: &ClipId) -> NayaResult<ClipMetadata> {
        let path = self.clip_dir(id)?.join(META_FILE);
        let json = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => NayaError::not_found(id.as_str()),
            _ => storage_error(&path, e),
        })?;
        serde_json::from_str(&json)
            .map_err(|e| NayaError::storage(format!("Corrupt metadata {}: {e}", path.display())))
    }

    fn sweep(&self, subdir: &str) -> usize {
        let dir = self.root.join(subdir);
        let Ok(entries) = fs::read_dir(&dir) else {
            return 0;
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Failed to sweep entry")
                }
            }
        }
        removed
    }

    fn stage(&self, staging: &Path, meta: &ClipMetadata, payload: &[u8]) -> NayaResult<()> {
        fs::create_dir_all(staging).map_err(|e| storage_error(staging, e))?;
        write_synced(&staging.join(PAYLOAD_FILE), payload)?;
        let json = serde_json::to_vec_pretty(meta)?;
        write_synced(&staging.join(META_FILE), &json)?;
        Ok(())
    }
}

impl ClipStore for FsClipStore {
    fn put(&self, clip: NewClip, payload: Vec<u8>) -> NayaResult<ClipMetadata> {
        validate_new_clip(&clip, &payload)?;

        let meta = new_metadata(clip, &payload);
        let staging = self.root.join(STAGING_DIR).join(meta.id.as_str());
        let published = self.clip_dir(&meta.id)?;

        let result = self.stage(&staging, &meta, &payload).and_then(|()| {
            fs::rename(&staging, &published).map_err(|e| storage_error(&published, e))
        });
        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                if cleanup.kind() != ErrorKind::NotFound {
                    tracing::warn!(path = %staging.display(), error = %cleanup, "Failed to clean staged clip");
                }
            }
            return Err(e);
        }

        tracing::info!(
            clip_id = %meta.id,
            bytes = meta.byte_size,
            mime = %meta.mime_type,
            "Clip stored"
        );
        Ok(meta)
    }

    fn get(&self, id: &ClipId) -> NayaResult<(ClipMetadata, Vec<u8>)> {
        let meta = self.read_metadata(id)?;
        let path = self.clip_dir(id)?.join(PAYLOAD_FILE);
        let payload = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => NayaError::not_found(id.as_str()),
            _ => storage_error(&path, e),
        })?;
        Ok((meta, payload))
    }

    fn metadata(&self, id: &ClipId) -> NayaResult<ClipMetadata> {
        self.read_metadata(id)
    }

    fn list_metadata(&self) -> NayaResult<Vec<ClipMetadata>> {
        let dir = self.root.join(CLIPS_DIR);
        let entries = fs::read_dir(&dir).map_err(|e| storage_error(&dir, e))?;

        let mut clips = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| storage_error(&dir, e))?;
            let id = ClipId::from(entry.file_name().to_string_lossy().into_owned());
            match self.read_metadata(&id) {
                Ok(meta) => clips.push(meta),
                // Deleted between read_dir and read.
                Err(NayaError::NotFound { .. }) => {}
                Err(e) => tracing::warn!(clip_id = %id, error = %e, "Skipping unreadable clip"),
            }
        }
        sort_newest_first(&mut clips);
        Ok(clips)
    }

    fn update_metadata(&self, id: &ClipId, patch: &ClipPatch) -> NayaResult<ClipMetadata> {
        let mut meta = self.read_metadata(id)?;
        patch.apply(&mut meta);

        let dir = self.clip_dir(id)?;
        let tmp = dir.join(format!("{META_FILE}.tmp"));
        let json = serde_json::to_vec_pretty(&meta)?;
        write_synced(&tmp, &json)?;
        let target = dir.join(META_FILE);
        fs::rename(&tmp, &target).map_err(|e| storage_error(&target, e))?;

        tracing::info!(clip_id = %id, "Clip metadata updated");
        Ok(meta)
    }

    fn delete(&self, id: &ClipId) -> NayaResult<()> {
        let dir = self.clip_dir(id)?;
        let doomed = self
            .root
            .join(TRASH_DIR)
            .join(format!("{}-{}", id, uuid::Uuid::new_v4().simple()));
        fs::rename(&dir, &doomed).map_err(|e| match e.kind() {
            ErrorKind::NotFound => NayaError::not_found(id.as_str()),
            _ => storage_error(&dir, e),
        })?;
        if let Err(e) = fs::remove_dir_all(&doomed) {
            // Already invisible; swept on next open.
            tracing::warn!(path = %doomed.display(), error = %e, "Failed to remove deleted clip");
        }
        tracing::info!(clip_id = %id, "Clip deleted");
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> NayaResult<()> {
    let mut file = File::create(path).map_err(|e| storage_error(path, e))?;
    file.write_all(bytes).map_err(|e| storage_error(path, e))?;
    file.sync_all().map_err(|e| storage_error(path, e))?;
    Ok(())
}

fn storage_error(path: &Path, e: std::io::Error) -> NayaError {
    NayaError::storage(format!("{}: {e}", path.display()))
}
