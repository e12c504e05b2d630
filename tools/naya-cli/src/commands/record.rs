//! Record a synthetic animation into a new clip.

use std::sync::Arc;

use naya_capture_engine::{Pattern, RecordOptions, Recorder, SyntheticSurface};
use naya_clip_store::ClipStore;
use naya_common::config::AppConfig;
use naya_project_model::{format_duration, format_file_size};

pub struct RecordArgs {
    pub name: String,
    pub duration: Option<f64>,
    pub fps: Option<u32>,
    pub width: u32,
    pub height: u32,
    pub pattern: String,
    pub tags: Vec<String>,
    pub description: String,
}

pub async fn run(
    config: &AppConfig,
    store: Arc<dyn ClipStore>,
    args: RecordArgs,
) -> anyhow::Result<()> {
    let pattern = match args.pattern.as_str() {
        "plasma" => Pattern::Plasma,
        "bars" => Pattern::Bars,
        "rings" => Pattern::Rings,
        other => {
            return Err(anyhow::anyhow!(
                "Unknown pattern: {other}. Use: plasma, bars, rings"
            ));
        }
    };

    let mut options = RecordOptions::from_defaults(args.name, &config.recording);
    if let Some(duration) = args.duration {
        options = options.with_duration(duration);
    }
    if let Some(fps) = args.fps {
        options = options.with_fps(fps);
    }
    options.tags = args.tags;
    options.description = args.description;

    println!("Starting recording session: {}", options.name);
    println!("  Surface: {}x{} ({:?})", args.width, args.height, pattern);
    println!("  Duration: {:.1}s", options.duration_secs);
    println!("  FPS: {}", options.fps);
    println!();
    println!("Press Ctrl+C to stop early...");

    let recorder = Recorder::new(store, naya_media::default_backend());
    let mut surface = SyntheticSurface::new(args.width, args.height, pattern);
    let mut session = recorder.session(options);

    let handle = session.handle();
    let stopper = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping recording");
            handle.stop();
        }
    });

    let result = session.run(&mut surface).await;
    stopper.abort();
    let meta = result.map_err(|e| anyhow::anyhow!("Recording failed: {e}"))?;

    let stats = session.stats();
    println!();
    println!("Clip saved: {}", meta.id);
    println!("  Duration: {}", format_duration(meta.duration_secs));
    println!("  Size: {}", format_file_size(meta.byte_size));
    println!("  Type: {}", meta.mime_type);
    println!(
        "  Frames: {} ({:.0}% idle ticks)",
        stats.frames_captured,
        stats.idle_rate()
    );

    Ok(())
}
