//! Exports over real stores, with decoder handles counted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use naya_clip_store::{ClipStore, MemoryClipStore, StoreDurations};
use naya_common::error::{NayaError, NayaResult};
use naya_media::{
    BuiltinBackend, ClipDecoder, EncoderSettings, Frame, MediaBackend, RleDecoder, RleEncoder,
    Rgba, VideoEncoder,
};
use naya_project_model::{ClipId, CodecVariant, NewClip, Timeline};
use naya_render_engine::{
    CompositionJob, ExportProgress, ExportSettings, ExportStage, Exporter, ProgressCallback,
};

const RED: Rgba = Rgba([255, 0, 0, 255]);
const BLUE: Rgba = Rgba([0, 0, 255, 255]);

/// Decoder that keeps a live-handle count.
struct CountedDecoder {
    inner: Box<dyn ClipDecoder>,
    live: Arc<AtomicUsize>,
}

impl Drop for CountedDecoder {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ClipDecoder for CountedDecoder {
    fn duration_secs(&self) -> f64 {
        self.inner.duration_secs()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    fn position_secs(&self) -> Option<f64> {
        self.inner.position_secs()
    }

    fn seek(&mut self, secs: f64) -> NayaResult<()> {
        self.inner.seek(secs)
    }

    fn advance_to(&mut self, secs: f64) -> NayaResult<()> {
        self.inner.advance_to(secs)
    }

    fn current_frame(&self) -> Option<&Frame> {
        self.inner.current_frame()
    }
}

#[derive(Default)]
struct CountingBackend {
    inner: BuiltinBackend,
    live: Arc<AtomicUsize>,
    opened: AtomicUsize,
}

impl CountingBackend {
    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl MediaBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn supports(&self, variant: CodecVariant) -> bool {
        self.inner.supports(variant)
    }

    fn open_encoder(
        &self,
        variant: CodecVariant,
        settings: &EncoderSettings,
    ) -> NayaResult<Box<dyn VideoEncoder>> {
        self.inner.open_encoder(variant, settings)
    }

    fn open_decoder(&self, payload: Vec<u8>, mime_type: &str) -> NayaResult<Box<dyn ClipDecoder>> {
        let inner = self.inner.open_decoder(payload, mime_type)?;
        self.live.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedDecoder {
            inner,
            live: Arc::clone(&self.live),
        }))
    }
}

struct Fixture {
    store: Arc<MemoryClipStore>,
    backend: Arc<CountingBackend>,
    exporter: Exporter,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryClipStore::new());
    let backend = Arc::new(CountingBackend::default());
    let exporter = Exporter::new(store.clone(), backend.clone());
    Fixture {
        store,
        backend,
        exporter,
    }
}

/// Store a solid-color 16x16 clip of `duration_secs` recorded at 30 fps.
fn put_solid_clip(store: &dyn ClipStore, name: &str, duration_secs: f64, color: Rgba) -> ClipId {
    let fps = 30;
    let mut encoder = RleEncoder::new(EncoderSettings::new(16, 16, fps)).unwrap();
    let frame = Frame::filled(16, 16, color);
    let mut payload = Vec::new();
    let frames = (duration_secs * fps as f64).ceil() as u64;
    for i in 0..frames {
        if let Some(chunk) = encoder.encode(&frame, i as f64 / fps as f64).unwrap() {
            payload.extend(chunk);
        }
    }
    payload.extend(Box::new(encoder).finish().unwrap());

    let mut clip = NewClip::new(name, duration_secs);
    clip.mime_hint = Some(CodecVariant::NayaRle.mime_type().to_string());
    store.put(clip, payload).unwrap().id
}

fn timeline_of(store: &MemoryClipStore, ids: &[ClipId]) -> Timeline {
    let mut timeline = Timeline::new();
    for id in ids {
        assert!(timeline.append(id.clone(), &StoreDurations(store)).unwrap());
    }
    timeline
}

fn recording_callback() -> (Arc<Mutex<Vec<ExportProgress>>>, ProgressCallback) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: ProgressCallback = Box::new(move |p| sink.lock().unwrap().push(p));
    (seen, callback)
}

fn settings() -> ExportSettings {
    ExportSettings::default()
        .with_size(32, 18)
        .with_fps(30)
        .with_name("reel")
}

#[tokio::test]
async fn two_clips_export_to_their_combined_length() {
    let fx = fixture();
    let a = put_solid_clip(fx.store.as_ref(), "red", 3.0, RED);
    let b = put_solid_clip(fx.store.as_ref(), "blue", 4.0, BLUE);
    let mut timeline = timeline_of(&fx.store, &[a, b]);

    let mut job = CompositionJob::new(timeline.snapshot(), settings());
    timeline.clear();
    assert_eq!(job.snapshot().len(), 2);

    let (seen, callback) = recording_callback();
    let output = fx.exporter.run(&mut job, Some(callback)).await.unwrap();

    assert!((output.duration_secs - 7.0).abs() <= 1.0 / 30.0);
    assert_eq!(output.stats.frames_rendered, 210);
    assert_eq!(output.stats.seeks, 2, "one seek per clip entry");
    assert_eq!(job.state(), ExportStage::Completed);
    assert_eq!(job.progress_percent(), 100.0);

    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert_eq!(seen.iter().filter(|p| p.percent == 100.0).count(), 1);
    assert_eq!(seen.last().map(|p| p.stage), Some(ExportStage::Completed));

    assert_eq!(fx.backend.live(), 0);
    assert_eq!(fx.store.len(), 3);

    let clip = output.clip.expect("persisted export");
    assert_eq!(clip.mime_type, "video/x-naya-rle");
    assert!(clip.thumbnail.is_some());
    let (_, payload) = fx.store.get(&clip.id).unwrap();
    let mut decoder = RleDecoder::open(payload).unwrap();
    assert_eq!(decoder.frame_count(), 210);

    decoder.seek(1.0).unwrap();
    let frame = decoder.current_frame().unwrap();
    assert_eq!(frame.pixel(16, 9), Some(RED));
    assert_eq!(frame.pixel(0, 0), Some(Rgba::BLACK));

    decoder.seek(5.0).unwrap();
    assert_eq!(decoder.current_frame().unwrap().pixel(16, 9), Some(BLUE));
}

#[tokio::test]
async fn empty_timeline_completes_with_empty_export() {
    let fx = fixture();
    let mut job = CompositionJob::new(Timeline::new().snapshot(), settings());

    let (seen, callback) = recording_callback();
    let err = fx.exporter.run(&mut job, Some(callback)).await.unwrap_err();

    assert!(matches!(err, NayaError::EmptyExport));
    assert_eq!(job.state(), ExportStage::Completed);
    assert_eq!(job.progress_percent(), 100.0);
    assert_eq!(job.snapshot().total_duration(), 0.0);
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(fx.store.is_empty());
}

#[tokio::test]
async fn deleted_clip_fails_with_missing_clip() {
    let fx = fixture();
    let a = put_solid_clip(fx.store.as_ref(), "kept", 1.0, RED);
    let b = put_solid_clip(fx.store.as_ref(), "gone", 1.0, BLUE);
    let timeline = timeline_of(&fx.store, &[a, b.clone()]);
    fx.store.delete(&b).unwrap();

    let mut job = CompositionJob::new(timeline.snapshot(), settings());
    let err = fx.exporter.run(&mut job, None).await.unwrap_err();

    assert!(matches!(err, NayaError::MissingClip { ref id } if id == b.as_str()));
    assert_eq!(job.state(), ExportStage::Failed);
    assert_eq!(fx.store.len(), 1);
    assert_eq!(fx.backend.live(), 0);
}

#[tokio::test]
async fn abort_mid_render_releases_every_decoder() {
    let fx = fixture();
    let a = put_solid_clip(fx.store.as_ref(), "a", 2.0, RED);
    let b = put_solid_clip(fx.store.as_ref(), "b", 2.0, BLUE);
    let timeline = timeline_of(&fx.store, &[a, b]);

    let mut job = CompositionJob::new(timeline.snapshot(), settings());
    let abort = job.abort_handle();
    let (seen, recorder) = recording_callback();
    let callback: ProgressCallback = Box::new(move |p: ExportProgress| {
        if p.frames_rendered >= 30 {
            abort.abort();
        }
        recorder(p);
    });

    let err = fx.exporter.run(&mut job, Some(callback)).await.unwrap_err();

    assert!(matches!(err, NayaError::Cancelled));
    assert_eq!(job.state(), ExportStage::Failed);
    assert_eq!(fx.backend.opened(), 2);
    assert_eq!(fx.backend.live(), 0);
    assert_eq!(fx.store.len(), 2);

    let seen = seen.lock().unwrap();
    assert!(seen.iter().all(|p| p.percent < 100.0));
    assert!(seen.iter().all(|p| p.frames_rendered <= 30));
}

#[tokio::test]
async fn output_duration_matches_sum_within_one_frame() {
    let fx = fixture();
    let durations = [1.0, 2.5, 0.75];
    let ids: Vec<ClipId> = durations
        .iter()
        .enumerate()
        .map(|(i, d)| put_solid_clip(fx.store.as_ref(), &format!("clip {i}"), *d, RED))
        .collect();
    let timeline = timeline_of(&fx.store, &ids);

    let output = fx
        .exporter
        .export(timeline.snapshot(), settings(), None)
        .await
        .unwrap();

    let expected: f64 = durations.iter().sum();
    assert!(
        (output.duration_secs - expected).abs() <= 1.0 / 30.0,
        "duration = {}",
        output.duration_secs
    );
    assert_eq!(output.clip.map(|c| c.duration_secs), Some(output.duration_secs));
}

#[tokio::test]
async fn download_export_returns_payload_without_storing() {
    let fx = fixture();
    let a = put_solid_clip(fx.store.as_ref(), "a", 0.5, BLUE);
    let timeline = timeline_of(&fx.store, &[a]);

    let output = fx
        .exporter
        .export(timeline.snapshot(), settings().with_persist(false), None)
        .await
        .unwrap();

    assert!(output.clip.is_none());
    assert_eq!(output.codec, CodecVariant::NayaRle);
    assert_eq!(output.suggested_filename, "reel.nrv");
    let payload = output.payload.expect("download payload");
    assert_eq!(RleDecoder::open(payload).unwrap().frame_count(), 15);
    assert_eq!(fx.store.len(), 1);
}

#[tokio::test]
async fn job_runs_only_once() {
    let fx = fixture();
    let a = put_solid_clip(fx.store.as_ref(), "a", 0.2, RED);
    let timeline = timeline_of(&fx.store, &[a]);
    let mut job = CompositionJob::new(timeline.snapshot(), settings().with_persist(false));

    fx.exporter.run(&mut job, None).await.unwrap();
    let err = fx.exporter.run(&mut job, None).await.unwrap_err();
    assert!(matches!(err, NayaError::Config { .. }));
    assert_eq!(job.state(), ExportStage::Completed);
}
