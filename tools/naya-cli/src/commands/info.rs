//! Show clip metadata.

use naya_clip_store::ClipStore;
use naya_project_model::{format_duration, format_file_size, ClipId};

pub fn run(store: &dyn ClipStore, id: &ClipId) -> anyhow::Result<()> {
    let clip = store
        .metadata(id)
        .map_err(|e| anyhow::anyhow!("Failed to load clip: {e}"))?;

    println!("Clip: {}", clip.name);
    println!("  ID: {}", clip.id);
    println!("  Created: {}", clip.created_at);
    println!(
        "  Duration: {} ({:.3}s)",
        format_duration(clip.duration_secs),
        clip.duration_secs
    );
    println!("  Size: {}", format_file_size(clip.byte_size));
    println!("  Type: {}", clip.mime_type);
    if !clip.tags.is_empty() {
        println!("  Tags: {}", clip.tags.join(", "));
    }
    if !clip.description.is_empty() {
        println!("  Description: {}", clip.description);
    }
    println!(
        "  Thumbnail: {}",
        if clip.thumbnail.is_some() { "yes" } else { "no" }
    );

    Ok(())
}
