//! Update the mutable metadata of a clip.

use naya_clip_store::ClipStore;
use naya_project_model::{ClipId, ClipPatch};

pub fn run(
    store: &dyn ClipStore,
    id: &ClipId,
    name: Option<String>,
    tags: Option<Vec<String>>,
    description: Option<String>,
) -> anyhow::Result<()> {
    let patch = ClipPatch {
        name,
        tags,
        description,
        thumbnail: None,
    };
    if patch.is_empty() {
        return Err(anyhow::anyhow!(
            "Nothing to update. Use --name, --tag or --description"
        ));
    }

    let clip = store
        .update_metadata(id, &patch)
        .map_err(|e| anyhow::anyhow!("Failed to update clip: {e}"))?;
    println!("Updated {}: {}", clip.id, clip.name);

    Ok(())
}
