//! List stored clips.

use naya_clip_store::ClipStore;
use naya_project_model::{format_duration, format_file_size};

pub fn run(store: &dyn ClipStore, json: bool) -> anyhow::Result<()> {
    let clips = store.list_metadata()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&clips)?);
        return Ok(());
    }

    if clips.is_empty() {
        println!("No clips stored.");
        return Ok(());
    }

    for clip in &clips {
        println!(
            "{}  {:<24}  {:>6}  {:>9}  {}",
            clip.id,
            clip.name,
            format_duration(clip.duration_secs),
            format_file_size(clip.byte_size),
            clip.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    println!();
    println!("{} clip(s)", clips.len());

    Ok(())
}
