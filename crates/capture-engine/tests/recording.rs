//! End-to-end recording against real stores, on virtual time.

use std::sync::Arc;
use std::time::Duration;

use naya_capture_engine::{
    Pattern, RecordOptions, Recorder, RenderSurface, SessionState, StopReason, SyntheticSurface,
};
use naya_clip_store::{ClipStore, FsClipStore, MemoryClipStore};
use naya_common::error::{NayaError, NayaResult};
use naya_media::{
    BuiltinBackend, ClipDecoder, EncoderSettings, Frame, MediaBackend, VideoEncoder,
};
use naya_project_model::CodecVariant;

fn recorder_with(store: Arc<dyn ClipStore>) -> Recorder {
    Recorder::new(store, Arc::new(BuiltinBackend))
}

#[tokio::test(start_paused = true)]
async fn five_second_recording_is_stored() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsClipStore::open(dir.path()).unwrap());
    let recorder = recorder_with(store.clone());
    let mut surface = SyntheticSurface::new(64, 48, Pattern::Plasma);

    let meta = recorder
        .record(&mut surface, RecordOptions::new("plasma", 5.0).with_fps(30))
        .await
        .unwrap();

    assert!(
        (meta.duration_secs - 5.0).abs() <= 0.2,
        "duration = {}",
        meta.duration_secs
    );
    assert!(meta.byte_size > 0);
    assert_eq!(meta.mime_type, "video/x-naya-rle");
    assert!(meta
        .thumbnail
        .as_deref()
        .is_some_and(|t| t.starts_with("data:image/png;base64,")));

    let (stored, payload) = store.get(&meta.id).unwrap();
    assert_eq!(stored, meta);
    assert_eq!(payload.len() as u64, meta.byte_size);
    assert!(surface.steps() > 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_surface_yields_empty_recording() {
    let store = Arc::new(MemoryClipStore::new());
    let recorder = recorder_with(store.clone());
    let mut surface = SyntheticSurface::stalled(32, 32);
    let mut session = recorder.session(RecordOptions::new("stalled", 1.0));

    let err = session.run(&mut surface).await.unwrap_err();

    assert!(matches!(err, NayaError::EmptyRecording));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(store.is_empty());
    assert!(session.stats().idle_ticks > 0);
}

#[tokio::test(start_paused = true)]
async fn surfaces_without_area_or_render_loop_are_rejected() {
    let store = Arc::new(MemoryClipStore::new());
    let recorder = recorder_with(store.clone());

    let mut empty = SyntheticSurface::new(0, 48, Pattern::Bars);
    let err = recorder
        .record(&mut empty, RecordOptions::new("empty", 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, NayaError::InvalidSurface { .. }));

    let mut idle = SyntheticSurface::new(32, 32, Pattern::Bars);
    idle.set_rendering(false);
    let err = recorder
        .record(&mut idle, RecordOptions::new("idle", 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, NayaError::InvalidSurface { .. }));
    assert!(err.kind().is_retryable());

    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn early_stop_truncates_clip() {
    let store = Arc::new(MemoryClipStore::new());
    let recorder = recorder_with(store.clone());
    let mut surface = SyntheticSurface::new(32, 24, Pattern::Rings);
    let mut session = recorder.session(RecordOptions::new("short", 10.0));
    let handle = session.handle();

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop();
    });
    let meta = session.run(&mut surface).await.unwrap();
    stopper.await.unwrap();

    assert!(
        (meta.duration_secs - 1.0).abs() <= 0.2,
        "duration = {}",
        meta.duration_secs
    );
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(session.stop_reason(), Some(StopReason::Requested));
    assert_eq!(store.len(), 1);
}

/// Changes size after a few painted frames.
struct ShrinkingSurface {
    inner: SyntheticSurface,
    frames_before_resize: u32,
}

impl RenderSurface for ShrinkingSurface {
    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    fn is_rendering(&self) -> bool {
        self.inner.is_rendering()
    }

    fn capture_frame(&mut self) -> NayaResult<Option<Frame>> {
        if self.frames_before_resize == 0 {
            self.inner.resize(16, 16);
        } else {
            self.frames_before_resize -= 1;
        }
        self.inner.capture_frame()
    }
}

#[tokio::test(start_paused = true)]
async fn resize_mid_capture_fails_without_storing() {
    let store = Arc::new(MemoryClipStore::new());
    let recorder = recorder_with(store.clone());
    let mut surface = ShrinkingSurface {
        inner: SyntheticSurface::new(32, 32, Pattern::Plasma),
        frames_before_resize: 3,
    };

    let err = recorder
        .record(&mut surface, RecordOptions::new("resized", 2.0))
        .await
        .unwrap_err();

    assert!(matches!(err, NayaError::InvalidSurface { .. }));
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn surface_stopping_mid_capture_keeps_what_was_recorded() {
    struct StopsAfter {
        inner: SyntheticSurface,
        remaining: u32,
    }

    impl RenderSurface for StopsAfter {
        fn dimensions(&self) -> (u32, u32) {
            self.inner.dimensions()
        }

        fn is_rendering(&self) -> bool {
            self.remaining > 0
        }

        fn capture_frame(&mut self) -> NayaResult<Option<Frame>> {
            self.remaining = self.remaining.saturating_sub(1);
            self.inner.capture_frame()
        }
    }

    let store = Arc::new(MemoryClipStore::new());
    let recorder = recorder_with(store.clone());
    let mut surface = StopsAfter {
        inner: SyntheticSurface::new(16, 16, Pattern::Bars),
        remaining: 10,
    };
    let mut session = recorder.session(RecordOptions::new("cut", 5.0).with_fps(10));

    let meta = session.run(&mut surface).await.unwrap();

    assert_eq!(session.stop_reason(), Some(StopReason::SurfaceStopped));
    assert!(meta.duration_secs < 1.5, "duration = {}", meta.duration_secs);
    assert_eq!(session.stats().frames_captured, 10);
}

/// Encoder whose output device fills up after a few frames.
struct DiskFullEncoder {
    inner: Box<dyn VideoEncoder>,
    frames_left: u32,
}

impl VideoEncoder for DiskFullEncoder {
    fn variant(&self) -> CodecVariant {
        self.inner.variant()
    }

    fn encode(&mut self, frame: &Frame, pts_secs: f64) -> NayaResult<Option<Vec<u8>>> {
        if self.frames_left == 0 {
            return Err(NayaError::codec("No space left on device"));
        }
        self.frames_left -= 1;
        self.inner.encode(frame, pts_secs)
    }

    fn finish(self: Box<Self>) -> NayaResult<Vec<u8>> {
        self.inner.finish()
    }
}

struct DiskFullBackend {
    frames_before_failure: u32,
}

impl MediaBackend for DiskFullBackend {
    fn name(&self) -> &str {
        "disk-full"
    }

    fn supports(&self, variant: CodecVariant) -> bool {
        BuiltinBackend.supports(variant)
    }

    fn open_encoder(
        &self,
        variant: CodecVariant,
        settings: &EncoderSettings,
    ) -> NayaResult<Box<dyn VideoEncoder>> {
        Ok(Box::new(DiskFullEncoder {
            inner: BuiltinBackend.open_encoder(variant, settings)?,
            frames_left: self.frames_before_failure,
        }))
    }

    fn open_decoder(&self, payload: Vec<u8>, mime_type: &str) -> NayaResult<Box<dyn ClipDecoder>> {
        BuiltinBackend.open_decoder(payload, mime_type)
    }
}

#[tokio::test(start_paused = true)]
async fn encoder_failure_aborts_without_storing() {
    let store = Arc::new(MemoryClipStore::new());
    let recorder = Recorder::new(
        store.clone(),
        Arc::new(DiskFullBackend {
            frames_before_failure: 5,
        }),
    );
    let mut surface = SyntheticSurface::new(32, 32, Pattern::Plasma);
    let mut session = recorder.session(RecordOptions::new("doomed", 3.0).with_fps(30));

    let err = session.run(&mut surface).await.unwrap_err();

    assert!(matches!(err, NayaError::Capture { .. }), "got {err:?}");
    assert_eq!(session.state(), SessionState::Failed);
    assert!(store.is_empty());
    assert!(session.stats().frames_captured < 90);
}
