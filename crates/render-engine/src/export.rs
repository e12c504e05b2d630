//! Export jobs: render a timeline snapshot into one new clip.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use naya_clip_store::ClipStore;
use naya_common::config::ExportDefaults;
use naya_common::error::{ErrorKind, NayaError, NayaResult};
use naya_media::{
    generate_thumbnail, negotiate_encoder, ClipDecoder, EncoderSettings, MediaBackend, Rgba,
};
use naya_project_model::{ClipId, ClipMetadata, CodecVariant, NewClip, TimelineSnapshot};

use crate::compositor::{compute_compositions, FrameComposition, OutputCanvas};

/// Progress reserved for fetching clips and opening decoders.
const LOADING_END: f64 = 10.0;

/// Progress at which rendering hands over to finalization.
const RENDERING_END: f64 = 90.0;

/// Export configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    /// Output frame rate, fixed for the whole export.
    pub fps: u32,

    /// Output resolution.
    pub width: u32,
    pub height: u32,

    /// Canvas color behind every frame.
    pub background: Rgba,

    /// Largest decoder position error accepted without seeking.
    pub seek_tolerance_secs: f64,

    /// Name of the resulting clip, and stem of the suggested filename.
    pub name: String,

    /// Store the result as a new clip instead of handing back the payload.
    pub persist: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            width: 1280,
            height: 720,
            background: Rgba::BLACK,
            seek_tolerance_secs: 0.1,
            name: "export".to_string(),
            persist: true,
        }
    }
}

impl ExportSettings {
    /// Settings from the configured export defaults.
    pub fn from_defaults(defaults: &ExportDefaults) -> NayaResult<Self> {
        Ok(Self {
            fps: defaults.fps,
            width: defaults.width,
            height: defaults.height,
            background: Rgba::parse_hex(&defaults.background)?,
            seek_tolerance_secs: defaults.seek_tolerance_secs,
            ..Self::default()
        })
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn validate(&self) -> NayaResult<()> {
        if self.fps == 0 {
            return Err(NayaError::config("Export frame rate must be positive"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(NayaError::config(format!(
                "Export resolution {}x{} has no area",
                self.width, self.height
            )));
        }
        if !self.seek_tolerance_secs.is_finite() || self.seek_tolerance_secs < 0.0 {
            return Err(NayaError::config(format!(
                "Invalid seek tolerance {}",
                self.seek_tolerance_secs
            )));
        }
        Ok(())
    }
}

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportProgress {
    /// Overall progress in `[0, 100]`. Never decreases within a job.
    pub percent: f64,

    /// Current stage.
    pub stage: ExportStage,

    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,
}

impl ExportProgress {
    fn initial() -> Self {
        Self {
            percent: 0.0,
            stage: ExportStage::Loading,
            frames_rendered: 0,
            total_frames: 0,
        }
    }
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStage {
    Loading,
    Rendering,
    Finalizing,
    Completed,
    Failed,
}

/// Requests that a running export stop at the next frame tick.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read-only view of a job's latest progress, usable while the job runs.
#[derive(Debug, Clone)]
pub struct ProgressProbe(Arc<Mutex<ExportProgress>>);

impl ProgressProbe {
    pub fn latest(&self) -> ExportProgress {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn publish(&self, progress: &ExportProgress) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = progress.clone();
    }
}

/// One export run over an immutable timeline snapshot.
///
/// Later edits to the live timeline never reach a job: it owns its snapshot.
#[derive(Debug)]
pub struct CompositionJob {
    snapshot: TimelineSnapshot,
    settings: ExportSettings,
    probe: ProgressProbe,
    abort: AbortHandle,
    started: bool,
}

impl CompositionJob {
    pub fn new(snapshot: TimelineSnapshot, settings: ExportSettings) -> Self {
        Self {
            snapshot,
            settings,
            probe: ProgressProbe(Arc::new(Mutex::new(ExportProgress::initial()))),
            abort: AbortHandle::default(),
            started: false,
        }
    }

    pub fn snapshot(&self) -> &TimelineSnapshot {
        &self.snapshot
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn state(&self) -> ExportStage {
        self.probe.latest().stage
    }

    pub fn progress_percent(&self) -> f64 {
        self.probe.latest().percent
    }

    pub fn progress_probe(&self) -> ProgressProbe {
        self.probe.clone()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

/// Counters collected while rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    pub frames_rendered: u64,
    /// Random-access seeks issued to source decoders.
    pub seeks: u64,
    /// Sequential forward reads.
    pub advances: u64,
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// The stored clip, when the export was persisted.
    pub clip: Option<ClipMetadata>,

    /// The encoded payload, when the export was not persisted.
    pub payload: Option<Vec<u8>>,

    /// Filename with the extension of the negotiated container.
    pub suggested_filename: String,

    pub mime_type: String,
    pub duration_secs: f64,
    pub codec: CodecVariant,
    pub stats: RenderStats,
}

/// Forwards monotonic progress to the probe and the caller's callback.
struct ProgressReporter {
    probe: ProgressProbe,
    callback: Option<ProgressCallback>,
    last_percent: f64,
    completed: bool,
}

impl ProgressReporter {
    fn new(probe: ProgressProbe, callback: Option<ProgressCallback>) -> Self {
        Self {
            probe,
            callback,
            last_percent: 0.0,
            completed: false,
        }
    }

    fn report(&mut self, stage: ExportStage, percent: f64, frames_rendered: u64, total_frames: u64) {
        if self.completed {
            return;
        }
        let mut percent = percent.clamp(0.0, 100.0).max(self.last_percent);
        if stage == ExportStage::Completed {
            self.completed = true;
            percent = 100.0;
        } else {
            // Only completion may report 100.
            percent = percent.min(99.9).max(self.last_percent);
        }
        self.last_percent = percent;

        let progress = ExportProgress {
            percent,
            stage,
            frames_rendered,
            total_frames,
        };
        self.probe.publish(&progress);
        if let Some(cb) = &self.callback {
            cb(progress);
        }
    }
}

/// Renders timeline snapshots through a media backend.
#[derive(Clone)]
pub struct Exporter {
    store: Arc<dyn ClipStore>,
    backend: Arc<dyn MediaBackend>,
}

impl Exporter {
    pub fn new(store: Arc<dyn ClipStore>, backend: Arc<dyn MediaBackend>) -> Self {
        Self { store, backend }
    }

    /// Create a job for `snapshot` and run it to completion.
    pub async fn export(
        &self,
        snapshot: TimelineSnapshot,
        settings: ExportSettings,
        progress: Option<ProgressCallback>,
    ) -> NayaResult<ExportOutput> {
        let mut job = CompositionJob::new(snapshot, settings);
        self.run(&mut job, progress).await
    }

    /// Drive `job` through `Loading → Rendering → Finalizing → Completed`.
    ///
    /// Any failure, including an abort, leaves the job `Failed` with every
    /// decoder and the output encoder released and nothing written to the
    /// store. A job runs at most once.
    pub async fn run(
        &self,
        job: &mut CompositionJob,
        progress: Option<ProgressCallback>,
    ) -> NayaResult<ExportOutput> {
        if job.started {
            return Err(NayaError::config("Composition job has already run"));
        }
        job.started = true;
        let mut reporter = ProgressReporter::new(job.probe.clone(), progress);

        if job.snapshot.is_empty() {
            tracing::info!("Timeline is empty; nothing to export");
            reporter.report(ExportStage::Completed, 100.0, 0, 0);
            return Err(NayaError::EmptyExport);
        }

        match self.run_stages(job, &mut reporter).await {
            Ok(output) => {
                reporter.report(
                    ExportStage::Completed,
                    100.0,
                    output.stats.frames_rendered,
                    output.stats.frames_rendered,
                );
                Ok(output)
            }
            Err(e) => {
                let last = job.probe.latest();
                reporter.report(
                    ExportStage::Failed,
                    last.percent,
                    last.frames_rendered,
                    last.total_frames,
                );
                tracing::warn!(error = %e, "Export failed");
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        job: &CompositionJob,
        reporter: &mut ProgressReporter,
    ) -> NayaResult<ExportOutput> {
        let settings = &job.settings;
        settings.validate()?;

        tracing::info!(
            entries = job.snapshot.len(),
            duration_secs = job.snapshot.total_duration(),
            fps = settings.fps,
            width = settings.width,
            height = settings.height,
            "Starting export"
        );

        let mut decoders = self.load_clips(job, reporter).await?;
        let (payload, variant, stats) = self.render_frames(job, &mut decoders, reporter).await?;
        drop(decoders);
        tracing::debug!("Released source decoders");

        self.finalize(settings, payload, variant, stats, reporter).await
    }

    /// Fetch every referenced clip and open a decoder over it.
    async fn load_clips(
        &self,
        job: &CompositionJob,
        reporter: &mut ProgressReporter,
    ) -> NayaResult<HashMap<ClipId, Box<dyn ClipDecoder>>> {
        reporter.report(ExportStage::Loading, 0.0, 0, 0);

        let ids = job.snapshot.distinct_clip_ids();
        let mut decoders: HashMap<ClipId, Box<dyn ClipDecoder>> = HashMap::with_capacity(ids.len());

        for (i, id) in ids.iter().enumerate() {
            if job.abort.is_aborted() {
                return Err(NayaError::Cancelled);
            }

            let store = Arc::clone(&self.store);
            let backend = Arc::clone(&self.backend);
            let clip_id = id.clone();
            let decoder = tokio::task::spawn_blocking(move || {
                let (meta, payload) = store.get(&clip_id).map_err(|e| match e.kind() {
                    ErrorKind::NotFound => NayaError::missing_clip(clip_id.as_str()),
                    _ => e,
                })?;
                tracing::debug!(
                    clip_id = %meta.id,
                    bytes = meta.byte_size,
                    mime_type = %meta.mime_type,
                    "Loaded source clip"
                );
                backend.open_decoder(payload, &meta.mime_type)
            })
            .await
            .map_err(|e| NayaError::render(format!("Loader task failed: {e}")))??;

            decoders.insert(id.clone(), decoder);
            let percent = LOADING_END * (i + 1) as f64 / ids.len() as f64;
            reporter.report(ExportStage::Loading, percent, 0, 0);
        }

        Ok(decoders)
    }

    /// Compose and encode every output frame in order.
    async fn render_frames(
        &self,
        job: &CompositionJob,
        decoders: &mut HashMap<ClipId, Box<dyn ClipDecoder>>,
        reporter: &mut ProgressReporter,
    ) -> NayaResult<(Vec<u8>, CodecVariant, RenderStats)> {
        let settings = &job.settings;
        let plan = compute_compositions(&job.snapshot, settings.fps);
        let total_frames = plan.len() as u64;

        let mut encoder = negotiate_encoder(
            self.backend.as_ref(),
            &EncoderSettings::new(settings.width, settings.height, settings.fps),
        )?;
        let variant = encoder.variant();
        let mut canvas = OutputCanvas::new(settings.width, settings.height, settings.background);
        let mut payload = Vec::new();
        let mut stats = RenderStats::default();

        reporter.report(ExportStage::Rendering, LOADING_END, 0, total_frames);

        for comp in &plan {
            if job.abort.is_aborted() {
                tracing::info!(frame = comp.frame_index, "Export aborted");
                return Err(NayaError::Cancelled);
            }
            tokio::task::yield_now().await;

            let decoder = decoders
                .get_mut(&comp.clip_id)
                .ok_or_else(|| NayaError::missing_clip(comp.clip_id.as_str()))?;
            position_decoder(decoder.as_mut(), comp, settings.seek_tolerance_secs, &mut stats)?;

            let frame = canvas.compose(decoder.current_frame());
            let chunk = encoder.encode(frame, comp.time_secs).map_err(|e| {
                NayaError::render(format!("Encoding frame {}: {e}", comp.frame_index))
            })?;
            if let Some(chunk) = chunk {
                payload.extend_from_slice(&chunk);
            }

            stats.frames_rendered += 1;
            let percent = LOADING_END
                + (RENDERING_END - LOADING_END) * stats.frames_rendered as f64
                    / total_frames as f64;
            reporter.report(
                ExportStage::Rendering,
                percent,
                stats.frames_rendered,
                total_frames,
            );
        }

        reporter.report(
            ExportStage::Finalizing,
            RENDERING_END,
            stats.frames_rendered,
            total_frames,
        );
        let tail = encoder
            .finish()
            .map_err(|e| NayaError::render(format!("Flushing encoder: {e}")))?;
        payload.extend_from_slice(&tail);

        tracing::debug!(
            frames = stats.frames_rendered,
            seeks = stats.seeks,
            advances = stats.advances,
            bytes = payload.len(),
            "Rendering finished"
        );
        Ok((payload, variant, stats))
    }

    async fn finalize(
        &self,
        settings: &ExportSettings,
        payload: Vec<u8>,
        variant: CodecVariant,
        stats: RenderStats,
        reporter: &mut ProgressReporter,
    ) -> NayaResult<ExportOutput> {
        if payload.is_empty() {
            return Err(NayaError::EmptyExport);
        }

        let duration_secs = stats.frames_rendered as f64 / settings.fps as f64;
        let mut output = ExportOutput {
            clip: None,
            payload: None,
            suggested_filename: variant.suggested_filename(&settings.name),
            mime_type: variant.mime_type().to_string(),
            duration_secs,
            codec: variant,
            stats,
        };

        if !settings.persist {
            tracing::info!(
                bytes = payload.len(),
                duration_secs,
                filename = %output.suggested_filename,
                "Export ready for download"
            );
            output.payload = Some(payload);
            return Ok(output);
        }

        reporter.report(
            ExportStage::Finalizing,
            95.0,
            stats.frames_rendered,
            stats.frames_rendered,
        );

        let store = Arc::clone(&self.store);
        let backend = Arc::clone(&self.backend);
        let mut clip = NewClip::new(settings.name.clone(), duration_secs);
        clip.mime_hint = Some(variant.mime_type().to_string());

        let meta = tokio::task::spawn_blocking(move || {
            clip.thumbnail =
                match generate_thumbnail(backend.as_ref(), payload.clone(), variant.mime_type()) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::warn!(error = %e, "Thumbnail generation failed; storing export without one");
                        None
                    }
                };
            store.put(clip, payload)
        })
        .await
        .map_err(|e| NayaError::storage(format!("Store task failed: {e}")))??;

        tracing::info!(
            id = %meta.id,
            bytes = meta.byte_size,
            duration_secs,
            "Export stored"
        );
        output.mime_type = meta.mime_type.clone();
        output.clip = Some(meta);
        Ok(output)
    }
}

/// Bring `decoder` to the frame for `comp`, seeking only when it is further
/// than `tolerance` from where it should be.
fn position_decoder(
    decoder: &mut dyn ClipDecoder,
    comp: &FrameComposition,
    tolerance: f64,
    stats: &mut RenderStats,
) -> NayaResult<()> {
    let offset = comp.clip_offset_secs;
    let needs_seek = match decoder.position_secs() {
        None => true,
        Some(position) => (position - offset).abs() > tolerance,
    };

    let result = if needs_seek {
        stats.seeks += 1;
        tracing::trace!(clip_id = %comp.clip_id, offset, "Seeking source");
        decoder.seek(offset)
    } else {
        stats.advances += 1;
        decoder.advance_to(offset)
    };

    result.map_err(|e| {
        NayaError::render(format!(
            "Decoding clip {} at {offset:.3}s: {e}",
            comp.clip_id
        ))
    })
}
