//! Show storage statistics.

use naya_clip_store::ClipStore;
use naya_common::config::AppConfig;
use naya_project_model::format_file_size;

pub fn run(store: &dyn ClipStore, config: &AppConfig) -> anyhow::Result<()> {
    let stats = store.stats()?;

    println!("Clip store: {}", config.store_dir.display());
    println!("  Clips: {}", stats.total_clips);
    println!("  Total size: {}", format_file_size(stats.total_bytes));
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!("  Oldest: {oldest}");
        println!("  Newest: {newest}");
    }

    Ok(())
}
