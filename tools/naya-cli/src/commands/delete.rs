//! Delete a clip.

use naya_clip_store::ClipStore;
use naya_common::error::ErrorKind;
use naya_project_model::ClipId;

pub fn run(store: &dyn ClipStore, id: &ClipId) -> anyhow::Result<()> {
    match store.delete(id) {
        Ok(()) => println!("Deleted {id}"),
        // Already gone is not a failure.
        Err(e) if e.kind() == ErrorKind::NotFound => println!("Clip {id} does not exist"),
        Err(e) => return Err(anyhow::anyhow!("Failed to delete clip: {e}")),
    }
    Ok(())
}
