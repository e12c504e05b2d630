//! Recording session management.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Notify};

use naya_clip_store::ClipStore;
use naya_common::clock::{DriftMeasurement, FrameScheduler, RecordingClock};
use naya_common::config::RecordingDefaults;
use naya_common::error::{NayaError, NayaResult};
use naya_media::{
    generate_thumbnail, negotiate_encoder, EncoderSettings, Frame, MediaBackend, VideoEncoder,
};
use naya_project_model::{ClipMetadata, CodecVariant, NewClip};

use crate::surface::RenderSurface;

/// Frames buffered between the capture loop and the encoder.
const ENCODER_QUEUE_DEPTH: usize = 8;

/// Scheduling drift above this is logged as a warning.
const DRIFT_WARN_MS: f64 = 100.0;

/// What to record.
#[derive(Debug, Clone)]
pub struct RecordOptions {
    /// Clip name.
    pub name: String,

    /// Capture stops automatically after this many seconds.
    pub duration_secs: f64,

    /// Target capture rate.
    pub fps: u32,

    /// How often the encoder hands back buffered output.
    pub chunk_interval: Duration,

    pub tags: Vec<String>,

    pub description: String,
}

impl RecordOptions {
    pub fn new(name: impl Into<String>, duration_secs: f64) -> Self {
        Self::from_defaults(name, &RecordingDefaults::default()).with_duration(duration_secs)
    }

    /// Options seeded from the `recording` section of the app config.
    pub fn from_defaults(name: impl Into<String>, defaults: &RecordingDefaults) -> Self {
        Self {
            name: name.into(),
            duration_secs: defaults.duration_secs,
            fps: defaults.fps,
            chunk_interval: Duration::from_millis(defaults.chunk_interval_ms),
            tags: Vec::new(),
            description: String::new(),
        }
    }

    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    fn validate(&self) -> NayaResult<()> {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(NayaError::config(format!(
                "Recording duration must be positive, got {}",
                self.duration_secs
            )));
        }
        if self.fps == 0 {
            return Err(NayaError::config("Recording fps must be at least 1"));
        }
        Ok(())
    }
}

/// State of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session created but not started.
    Idle,
    /// Sampling frames from the surface.
    Capturing,
    /// Capture ended; flushing the encoder and storing the clip.
    Finalizing,
    /// Clip stored.
    Completed,
    /// An error occurred. Nothing was stored.
    Failed,
}

/// Why the capture loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured duration elapsed.
    DurationReached,
    /// [`RecordingHandle::stop`] was called.
    Requested,
    /// The surface's render loop stopped.
    SurfaceStopped,
}

/// Runtime statistics from a recording session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptureStats {
    /// Ticks that yielded a freshly painted frame.
    pub frames_captured: u64,

    /// Ticks where the surface had nothing new.
    pub idle_ticks: u64,

    /// Output chunks received from the encoder.
    pub chunks: u64,

    /// Encoded bytes.
    pub bytes_encoded: u64,
}

impl CaptureStats {
    /// Share of ticks without a new frame, as a percentage.
    pub fn idle_rate(&self) -> f64 {
        let total = self.frames_captured + self.idle_ticks;
        if total == 0 {
            return 0.0;
        }
        self.idle_ticks as f64 / total as f64 * 100.0
    }
}

/// Cloneable handle for stopping a session from another task.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandle {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl RecordingHandle {
    /// Ask the session to stop early. The clip keeps everything captured
    /// up to this point.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Records render surfaces into a clip store.
#[derive(Clone)]
pub struct Recorder {
    store: Arc<dyn ClipStore>,
    backend: Arc<dyn MediaBackend>,
}

impl Recorder {
    pub fn new(store: Arc<dyn ClipStore>, backend: Arc<dyn MediaBackend>) -> Self {
        Self { store, backend }
    }

    /// A new idle session. Use it when the caller needs a stop handle or
    /// statistics; otherwise [`record`](Self::record) is shorter.
    pub fn session(&self, options: RecordOptions) -> RecordingSession {
        RecordingSession {
            store: Arc::clone(&self.store),
            backend: Arc::clone(&self.backend),
            options,
            state: SessionState::Idle,
            handle: RecordingHandle::default(),
            stats: CaptureStats::default(),
            stop_reason: None,
        }
    }

    /// Record `surface` for up to `options.duration_secs` and store the
    /// result as a new clip.
    pub async fn record(
        &self,
        surface: &mut dyn RenderSurface,
        options: RecordOptions,
    ) -> NayaResult<ClipMetadata> {
        self.session(options).run(surface).await
    }
}

/// A single recording from start to stored clip.
pub struct RecordingSession {
    store: Arc<dyn ClipStore>,
    backend: Arc<dyn MediaBackend>,
    options: RecordOptions,
    state: SessionState,
    handle: RecordingHandle,
    stats: CaptureStats,
    stop_reason: Option<StopReason>,
}

impl RecordingSession {
    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get a handle for stopping the session from another task.
    pub fn handle(&self) -> RecordingHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Capture, encode and store. A session runs once.
    pub async fn run(&mut self, surface: &mut dyn RenderSurface) -> NayaResult<ClipMetadata> {
        if self.state != SessionState::Idle {
            return Err(NayaError::capture("Session already started"));
        }
        let result = self.run_inner(surface).await;
        self.state = match &result {
            Ok(_) => SessionState::Completed,
            Err(e) => {
                tracing::warn!(name = %self.options.name, error = %e, "Recording failed");
                SessionState::Failed
            }
        };
        result
    }

    async fn run_inner(&mut self, surface: &mut dyn RenderSurface) -> NayaResult<ClipMetadata> {
        self.options.validate()?;

        let (width, height) = surface.dimensions();
        if width == 0 || height == 0 {
            return Err(NayaError::invalid_surface(format!(
                "Surface has no drawable area ({width}x{height})"
            )));
        }
        if !surface.is_rendering() {
            return Err(NayaError::invalid_surface("Surface is not rendering"));
        }

        let settings = EncoderSettings::new(width, height, self.options.fps)
            .with_chunk_interval(self.options.chunk_interval);
        let encoder = negotiate_encoder(self.backend.as_ref(), &settings)?;
        let variant = encoder.variant();

        tracing::info!(
            name = %self.options.name,
            width,
            height,
            fps = self.options.fps,
            duration_secs = self.options.duration_secs,
            codec = variant.label(),
            backend = self.backend.name(),
            "Starting recording"
        );

        let (frame_tx, frame_rx) = mpsc::channel::<(Frame, f64)>(ENCODER_QUEUE_DEPTH);
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let encode_task = tokio::spawn(run_encoder(encoder, frame_rx, chunk_tx));

        self.state = SessionState::Capturing;
        let clock = RecordingClock::start();
        tracing::debug!(epoch_wall = %clock.epoch_wall(), "Recording clock started");

        let mut payload = Vec::new();
        let capture = self
            .capture_loop(
                surface,
                &clock,
                (width, height),
                frame_tx,
                &mut chunk_rx,
                &mut payload,
            )
            .await;
        let duration_secs = clock.elapsed_secs();

        self.state = SessionState::Finalizing;
        // The frame sender is gone by now, so the encoder sees end-of-stream
        // even when capture failed.
        let encoded = encode_task
            .await
            .map_err(|e| NayaError::capture(format!("Encoder task failed: {e}")))?;
        capture?;
        encoded.map_err(|e| NayaError::capture(format!("Encoding failed: {e}")))?;
        while let Some(chunk) = chunk_rx.recv().await {
            self.accept_chunk(&mut payload, chunk);
        }

        tracing::info!(
            duration_secs,
            frames = self.stats.frames_captured,
            idle_ticks = self.stats.idle_ticks,
            chunks = self.stats.chunks,
            bytes = payload.len(),
            reason = ?self.stop_reason,
            "Recording stopped"
        );

        if payload.is_empty() {
            return Err(NayaError::EmptyRecording);
        }

        self.finalize(payload, variant, duration_secs).await
    }

    fn accept_chunk(&mut self, payload: &mut Vec<u8>, chunk: Vec<u8>) {
        self.stats.chunks += 1;
        self.stats.bytes_encoded += chunk.len() as u64;
        payload.extend_from_slice(&chunk);
    }

    async fn capture_loop(
        &mut self,
        surface: &mut dyn RenderSurface,
        clock: &RecordingClock,
        dimensions: (u32, u32),
        frame_tx: mpsc::Sender<(Frame, f64)>,
        chunk_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
        payload: &mut Vec<u8>,
    ) -> NayaResult<()> {
        let mut scheduler = FrameScheduler::new(self.options.fps);
        let deadline = tokio::time::sleep_until(clock.deadline_after(self.options.duration_secs));
        tokio::pin!(deadline);
        let mut last_pts: Option<f64> = None;

        let reason = loop {
            if self.handle.is_stopped() {
                break StopReason::Requested;
            }
            tokio::select! {
                biased;
                _ = self.handle.notify.notified() => continue,
                _ = &mut deadline => break StopReason::DurationReached,
                Some(chunk) = chunk_rx.recv() => {
                    self.accept_chunk(payload, chunk);
                    continue;
                }
                _ = scheduler.tick() => {}
            }

            if surface.dimensions() != dimensions {
                let (w, h) = surface.dimensions();
                return Err(NayaError::invalid_surface(format!(
                    "Surface resized from {}x{} to {w}x{h} during capture",
                    dimensions.0, dimensions.1
                )));
            }
            if !surface.is_rendering() {
                break StopReason::SurfaceStopped;
            }

            let frame = surface
                .capture_frame()
                .map_err(|e| NayaError::capture(format!("Failed to read surface: {e}")))?;
            let Some(frame) = frame else {
                self.stats.idle_ticks += 1;
                continue;
            };
            if frame.dimensions() != dimensions {
                return Err(NayaError::invalid_surface(format!(
                    "Surface painted a {}x{} frame into a {}x{} recording",
                    frame.width(),
                    frame.height(),
                    dimensions.0,
                    dimensions.1
                )));
            }

            let pts = clock.elapsed_secs();
            if last_pts.is_some_and(|last| pts <= last) {
                self.stats.idle_ticks += 1;
                continue;
            }
            if frame_tx.send((frame, pts)).await.is_err() {
                // The encoder hung up; its error surfaces when it is joined.
                tracing::debug!("Encoder stopped accepting frames");
                break StopReason::Requested;
            }
            last_pts = Some(pts);
            self.stats.frames_captured += 1;
        };

        self.stop_reason = Some(reason);
        log_scheduling_drift(&scheduler, clock);
        Ok(())
    }

    async fn finalize(
        &self,
        payload: Vec<u8>,
        variant: CodecVariant,
        duration_secs: f64,
    ) -> NayaResult<ClipMetadata> {
        let store = Arc::clone(&self.store);
        let backend = Arc::clone(&self.backend);
        let mut clip = NewClip::new(self.options.name.clone(), duration_secs);
        clip.mime_hint = Some(variant.mime_type().to_string());
        clip.tags = self.options.tags.clone();
        clip.description = self.options.description.clone();

        tokio::task::spawn_blocking(move || {
            clip.thumbnail =
                match generate_thumbnail(backend.as_ref(), payload.clone(), variant.mime_type()) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::warn!(error = %e, "Thumbnail generation failed; storing clip without one");
                        None
                    }
                };
            store.put(clip, payload)
        })
        .await
        .map_err(|e| NayaError::storage(format!("Store task failed: {e}")))?
        .map(|meta| {
            tracing::info!(
                id = %meta.id,
                name = %meta.name,
                bytes = meta.byte_size,
                mime_type = %meta.mime_type,
                "Clip stored"
            );
            meta
        })
    }
}

/// Feed queued frames to `encoder` until the capture side hangs up, then
/// flush it. Each encode is its own short blocking call, so nothing holds
/// a blocking thread while waiting for the next frame.
async fn run_encoder(
    mut encoder: Box<dyn VideoEncoder>,
    mut frames: mpsc::Receiver<(Frame, f64)>,
    chunks: mpsc::UnboundedSender<Vec<u8>>,
) -> NayaResult<()> {
    while let Some((frame, pts)) = frames.recv().await {
        let (returned, encoded) = tokio::task::spawn_blocking(move || {
            let encoded = encoder.encode(&frame, pts);
            (encoder, encoded)
        })
        .await
        .map_err(|e| NayaError::capture(format!("Encoder task failed: {e}")))?;
        encoder = returned;
        // The session only hangs up after joining this task.
        if let Some(chunk) = encoded? {
            let _ = chunks.send(chunk);
        }
    }
    let tail = tokio::task::spawn_blocking(move || encoder.finish())
        .await
        .map_err(|e| NayaError::capture(format!("Encoder task failed: {e}")))??;
    if !tail.is_empty() {
        let _ = chunks.send(tail);
    }
    Ok(())
}

/// Compare where the scheduler should be after its fired ticks with the
/// clock. Large gaps mean ticks were skipped under load.
fn log_scheduling_drift(scheduler: &FrameScheduler, clock: &RecordingClock) {
    let ticks = scheduler.ticks();
    if ticks == 0 {
        return;
    }
    let measurement = DriftMeasurement {
        reference_ns: (ticks - 1) * scheduler.period().as_nanos() as u64,
        measured_ns: clock.elapsed_ns(),
    };
    let drift_ms = measurement.drift_ms();
    if measurement.exceeds_threshold_ms(DRIFT_WARN_MS) {
        tracing::warn!(drift_ms, ticks, "Capture fell behind its frame schedule");
    } else {
        tracing::debug!(drift_ms, ticks, "Capture drift within threshold");
    }
}
