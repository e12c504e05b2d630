//! Compose clips into one new clip.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use naya_clip_store::{ClipStore, StoreDurations};
use naya_common::config::AppConfig;
use naya_media::Rgba;
use naya_project_model::{format_duration, format_file_size, ClipId, Timeline};
use naya_render_engine::{ExportProgress, ExportSettings, Exporter, ProgressCallback};

pub struct ExportArgs {
    pub ids: Vec<ClipId>,
    pub output: Option<PathBuf>,
    pub name: String,
    pub fps: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub background: Option<String>,
}

pub async fn run(
    config: &AppConfig,
    store: Arc<dyn ClipStore>,
    args: ExportArgs,
) -> anyhow::Result<()> {
    let mut timeline = Timeline::new();
    for id in &args.ids {
        let added = timeline
            .append(id.clone(), &StoreDurations(store.as_ref()))
            .map_err(|e| anyhow::anyhow!("Cannot add {id} to the timeline: {e}"))?;
        if !added {
            tracing::warn!(clip_id = %id, "Duplicate clip skipped");
            println!("  Skipping duplicate clip {id}");
        }
    }

    let mut settings = ExportSettings::from_defaults(&config.export)?
        .with_name(args.name)
        .with_persist(args.output.is_none());
    if let Some(fps) = args.fps {
        settings.fps = fps;
    }
    if let Some(width) = args.width {
        settings.width = width;
    }
    if let Some(height) = args.height {
        settings.height = height;
    }
    if let Some(background) = args.background {
        settings.background = Rgba::parse_hex(&background)?;
    }

    println!("Exporting {} clip(s)", timeline.len());
    println!("  Duration: {}", format_duration(timeline.total_duration()));
    println!(
        "  Output: {}x{} @ {}fps",
        settings.width, settings.height, settings.fps
    );

    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| {
        print!(
            "\r  Progress: {:>5.1}% ({}/{} frames, {:?})  ",
            p.percent, p.frames_rendered, p.total_frames, p.stage,
        );
        let _ = std::io::stdout().flush();
    });

    let exporter = Exporter::new(store, naya_media::default_backend());
    let output = exporter
        .export(timeline.snapshot(), settings, Some(progress_cb))
        .await;
    println!();
    let output = output.map_err(|e| anyhow::anyhow!("Export failed: {e}"))?;

    match (output.clip, output.payload, args.output) {
        (_, Some(payload), Some(path)) => {
            let path = if path.is_dir() {
                path.join(&output.suggested_filename)
            } else {
                path
            };
            std::fs::write(&path, &payload)?;
            tracing::info!(path = %path.display(), bytes = payload.len(), "Export written to file");
            println!(
                "Export written: {} ({}, {})",
                path.display(),
                format_file_size(payload.len() as u64),
                output.mime_type
            );
        }
        (Some(clip), _, _) => {
            println!("Export stored: {}", clip.id);
            println!("  Size: {}", format_file_size(clip.byte_size));
            println!("  Type: {}", clip.mime_type);
        }
        _ => return Err(anyhow::anyhow!("Export produced no output")),
    }
    println!(
        "  Frames: {} ({} seeks)",
        output.stats.frames_rendered, output.stats.seeks
    );

    Ok(())
}
