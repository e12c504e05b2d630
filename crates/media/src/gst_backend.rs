//! GStreamer-backed encoders and decoders for WebM and MP4.
//!
//! Encoding feeds raw RGBA frames through `appsrc` and collects the muxed
//! stream from `appsink`. Decoding goes through `decodebin` from a temporary
//! file so the pipeline can seek.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use naya_common::error::{NayaError, NayaResult};
use naya_common::{frame_interval_secs, RecordingClock};
use naya_project_model::{CodecVariant, ContainerFormat};

use crate::builtin::BuiltinBackend;
use crate::codec::{ClipDecoder, EncoderSettings, MediaBackend, VideoEncoder};
use crate::frame::Frame;

const STATE_TIMEOUT_SECS: u64 = 10;

/// Backend encoding WebM/MP4 through GStreamer. The built-in codec stays
/// available for its own variant and payloads.
#[derive(Debug, Default)]
pub struct GstBackend {
    builtin: BuiltinBackend,
}

impl GstBackend {
    pub fn new() -> NayaResult<Self> {
        init_gstreamer()?;
        Ok(Self::default())
    }
}

impl MediaBackend for GstBackend {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn supports(&self, variant: CodecVariant) -> bool {
        if variant == CodecVariant::NayaRle {
            return true;
        }
        required_elements(variant)
            .iter()
            .all(|name| gst::ElementFactory::find(name).is_some())
    }

    fn open_encoder(
        &self,
        variant: CodecVariant,
        settings: &EncoderSettings,
    ) -> NayaResult<Box<dyn VideoEncoder>> {
        if variant == CodecVariant::NayaRle {
            return self.builtin.open_encoder(variant, settings);
        }
        Ok(Box::new(GstEncoder::new(variant, *settings)?))
    }

    fn open_decoder(&self, payload: Vec<u8>, mime_type: &str) -> NayaResult<Box<dyn ClipDecoder>> {
        if ContainerFormat::sniff(&payload) == Some(ContainerFormat::NayaRaw) {
            return self.builtin.open_decoder(payload, mime_type);
        }
        Ok(Box::new(GstDecoder::open(payload, mime_type)?))
    }
}

fn required_elements(variant: CodecVariant) -> &'static [&'static str] {
    match variant {
        CodecVariant::WebmVp9 => &["appsrc", "appsink", "videoconvert", "vp9enc", "webmmux"],
        CodecVariant::WebmVp8 => &["appsrc", "appsink", "videoconvert", "vp8enc", "webmmux"],
        CodecVariant::Mp4H264 => &[
            "appsrc",
            "appsink",
            "videoconvert",
            "x264enc",
            "h264parse",
            "mp4mux",
        ],
        CodecVariant::NayaRle => &[],
    }
}

fn encoder_launch(variant: CodecVariant, settings: &EncoderSettings) -> NayaResult<String> {
    // One keyframe per second keeps seeking in exports cheap.
    let keyint = settings.fps.max(1);
    let chain = match variant {
        CodecVariant::WebmVp9 => {
            format!("vp9enc deadline=1 cpu-used=8 keyframe-max-dist={keyint} ! webmmux streamable=true")
        }
        CodecVariant::WebmVp8 => {
            format!("vp8enc deadline=1 keyframe-max-dist={keyint} ! webmmux streamable=true")
        }
        CodecVariant::Mp4H264 => format!(
            "x264enc tune=zerolatency speed-preset=veryfast key-int-max={keyint} ! h264parse ! mp4mux fragment-duration=100 streamable=true"
        ),
        CodecVariant::NayaRle => {
            return Err(NayaError::codec_unsupported(
                "The built-in codec has no GStreamer pipeline",
            ))
        }
    };
    Ok(format!(
        "appsrc name=src format=time caps=\"video/x-raw,format=RGBA,width={},height={},framerate={}/1\" ! videoconvert ! {chain} ! appsink name=sink sync=false",
        settings.width, settings.height, settings.fps
    ))
}

/// Streaming encoder over an `appsrc ! encoder ! muxer ! appsink` pipeline.
pub struct GstEncoder {
    variant: CodecVariant,
    settings: EncoderSettings,
    pipeline: gst::Pipeline,
    src: gst_app::AppSrc,
    sink: gst_app::AppSink,
    frames: u64,
    last_flush: Option<f64>,
}

impl GstEncoder {
    pub fn new(variant: CodecVariant, settings: EncoderSettings) -> NayaResult<Self> {
        let launch = encoder_launch(variant, &settings)?;
        let pipeline = launch_pipeline(variant.label(), &launch)?;
        let src = app_element::<gst_app::AppSrc>(&pipeline, "src")?;
        let sink = app_element::<gst_app::AppSink>(&pipeline, "sink")?;

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            NayaError::codec(format!(
                "Failed to start {} encoder: {e:?}",
                variant.label()
            ))
        })?;

        Ok(Self {
            variant,
            settings,
            pipeline,
            src,
            sink,
            frames: 0,
            last_flush: None,
        })
    }

    /// Collect every muxed buffer that is ready without blocking.
    fn drain_ready(&self) -> NayaResult<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(sample) = self.sink.try_pull_sample(gst::ClockTime::ZERO) {
            append_sample(&mut out, &sample)?;
        }
        Ok(out)
    }

    fn check_bus(&self) -> NayaResult<()> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        if let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(e) = msg.view() {
                return Err(NayaError::codec(format!(
                    "{} encoder failed: {}",
                    self.variant.label(),
                    e.error()
                )));
            }
        }
        Ok(())
    }
}

impl VideoEncoder for GstEncoder {
    fn variant(&self) -> CodecVariant {
        self.variant
    }

    fn encode(&mut self, frame: &Frame, pts_secs: f64) -> NayaResult<Option<Vec<u8>>> {
        if frame.dimensions() != (self.settings.width, self.settings.height) {
            return Err(NayaError::codec(format!(
                "Frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.settings.width,
                self.settings.height
            )));
        }
        let mut buffer = gst::Buffer::from_mut_slice(frame.data().to_vec());
        if let Some(buf) = buffer.get_mut() {
            buf.set_pts(clock_time(pts_secs));
            buf.set_duration(clock_time(frame_interval_secs(self.settings.fps)));
        }
        self.src.push_buffer(buffer).map_err(|e| {
            NayaError::codec(format!(
                "{} encoder rejected frame: {e:?}",
                self.variant.label()
            ))
        })?;
        self.frames += 1;
        self.check_bus()?;

        let started = *self.last_flush.get_or_insert(pts_secs);
        if pts_secs - started < self.settings.chunk_interval.as_secs_f64() {
            return Ok(None);
        }
        self.last_flush = Some(pts_secs);
        let chunk = self.drain_ready()?;
        Ok((!chunk.is_empty()).then_some(chunk))
    }

    fn finish(self: Box<Self>) -> NayaResult<Vec<u8>> {
        if self.frames == 0 {
            return Ok(Vec::new());
        }
        self.src.end_of_stream().map_err(|e| {
            NayaError::codec(format!(
                "Failed to end {} stream: {e:?}",
                self.variant.label()
            ))
        })?;

        let mut out = Vec::new();
        let timeout = gst::ClockTime::from_seconds(STATE_TIMEOUT_SECS);
        while let Some(sample) = self.sink.try_pull_sample(timeout) {
            append_sample(&mut out, &sample)?;
        }
        if !self.sink.is_eos() {
            tracing::warn!(
                codec = self.variant.label(),
                "Encoder drain timed out; output may be truncated"
            );
        }
        self.check_bus()?;
        Ok(out)
    }
}

impl Drop for GstEncoder {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Removes the wrapped file when dropped.
struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            tracing::debug!(path = %self.0.display(), error = %e, "Failed to remove temp file");
        }
    }
}

/// Seekable decoder over a `decodebin` pipeline.
pub struct GstDecoder {
    pipeline: gst::Pipeline,
    sink: gst_app::AppSink,
    duration: f64,
    dimensions: (u32, u32),
    frame_interval: f64,
    position: Option<f64>,
    frame: Option<Frame>,
    playing: bool,
    _source: TempFile,
}

impl GstDecoder {
    pub fn open(payload: Vec<u8>, mime_type: &str) -> NayaResult<Self> {
        init_gstreamer()?;
        let ext = ContainerFormat::sniff(&payload)
            .or_else(|| ContainerFormat::from_mime(mime_type))
            .map(|c| c.extension())
            .unwrap_or("bin");
        let path = std::env::temp_dir().join(format!(
            "naya-decode-{}.{ext}",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::write(&path, &payload)?;
        drop(payload);
        let source = TempFile(path);

        let launch = format!(
            "filesrc location=\"{}\" ! decodebin ! videoconvert ! video/x-raw,format=RGBA ! appsink name=sink sync=false max-buffers=4",
            escape_path(&source.0)
        );
        let pipeline = launch_pipeline("decode", &launch)?;
        let sink = app_element::<gst_app::AppSink>(&pipeline, "sink")?;

        pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| NayaError::codec(format!("Failed to open '{mime_type}' clip: {e:?}")))?;
        wait_for_state(&pipeline, gst::State::Paused)?;

        let sample = sink
            .try_pull_preroll(gst::ClockTime::from_seconds(STATE_TIMEOUT_SECS))
            .ok_or_else(|| NayaError::codec("Clip has no decodable video frames"))?;
        let decoded = decode_sample(&sample)?;

        let duration = pipeline
            .query_duration::<gst::ClockTime>()
            .map(|t| RecordingClock::ns_to_secs(t.nseconds()))
            .unwrap_or(0.0);

        let mut decoder = Self {
            pipeline,
            sink,
            duration,
            dimensions: decoded.frame.dimensions(),
            frame_interval: decoded.frame_interval,
            position: decoded.pts,
            frame: Some(decoded.frame),
            playing: false,
            _source: source,
        };
        if decoder.duration <= 0.0 {
            decoder.duration = decoder.position.unwrap_or(0.0) + decoder.frame_interval;
        }
        Ok(decoder)
    }

    fn store(&mut self, sample: &gst::Sample) -> NayaResult<()> {
        let decoded = decode_sample(sample)?;
        self.position = decoded.pts.or(self.position);
        self.frame = Some(decoded.frame);
        Ok(())
    }
}

impl ClipDecoder for GstDecoder {
    fn duration_secs(&self) -> f64 {
        self.duration
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn position_secs(&self) -> Option<f64> {
        self.position
    }

    fn seek(&mut self, secs: f64) -> NayaResult<()> {
        if self.playing {
            self.pipeline
                .set_state(gst::State::Paused)
                .map_err(|e| NayaError::codec(format!("Failed to pause decoder: {e:?}")))?;
            self.playing = false;
        }
        let target = secs.clamp(0.0, (self.duration - self.frame_interval).max(0.0));
        self.pipeline
            .seek_simple(
                gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
                clock_time(target),
            )
            .map_err(|e| NayaError::codec(format!("Seek to {target:.3}s failed: {e}")))?;
        wait_for_state(&self.pipeline, gst::State::Paused)?;

        let sample = self
            .sink
            .try_pull_preroll(gst::ClockTime::from_seconds(STATE_TIMEOUT_SECS))
            .ok_or_else(|| NayaError::codec(format!("No frame after seek to {target:.3}s")))?;
        self.store(&sample)
    }

    fn advance_to(&mut self, secs: f64) -> NayaResult<()> {
        let half = self.frame_interval / 2.0;
        if self.position.is_some_and(|p| p + half >= secs) {
            return Ok(());
        }
        if !self.playing {
            self.pipeline
                .set_state(gst::State::Playing)
                .map_err(|e| NayaError::codec(format!("Failed to resume decoder: {e:?}")))?;
            self.playing = true;
        }
        let timeout = gst::ClockTime::from_seconds(STATE_TIMEOUT_SECS);
        while let Some(sample) = self.sink.try_pull_sample(timeout) {
            self.store(&sample)?;
            if self.position.is_some_and(|p| p + half >= secs) {
                break;
            }
        }
        Ok(())
    }

    fn current_frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }
}

impl Drop for GstDecoder {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

struct DecodedSample {
    frame: Frame,
    pts: Option<f64>,
    frame_interval: f64,
}

fn decode_sample(sample: &gst::Sample) -> NayaResult<DecodedSample> {
    let caps = sample
        .caps()
        .ok_or_else(|| NayaError::codec("Decoded sample has no caps"))?;
    let info = gst_video::VideoInfo::from_caps(caps)
        .map_err(|e| NayaError::codec(format!("Unexpected decoder caps: {e}")))?;
    let buffer = sample
        .buffer()
        .ok_or_else(|| NayaError::codec("Decoded sample has no buffer"))?;
    let map = buffer
        .map_readable()
        .map_err(|e| NayaError::codec(format!("Failed to map decoded buffer: {e}")))?;

    let (width, height) = (info.width(), info.height());
    let stride = info.stride()[0] as usize;
    let row = width as usize * 4;
    let mut data = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let line = map
            .as_slice()
            .get(start..start + row)
            .ok_or_else(|| NayaError::codec("Decoded buffer shorter than its caps"))?;
        data.extend_from_slice(line);
    }

    let fps = info.fps();
    let frame_interval = if fps.numer() > 0 && fps.denom() > 0 {
        fps.denom() as f64 / fps.numer() as f64
    } else {
        frame_interval_secs(30)
    };

    Ok(DecodedSample {
        frame: Frame::new(width, height, data)?,
        pts: buffer.pts().map(|t| RecordingClock::ns_to_secs(t.nseconds())),
        frame_interval,
    })
}

fn append_sample(out: &mut Vec<u8>, sample: &gst::Sample) -> NayaResult<()> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| NayaError::codec("Encoded sample has no buffer"))?;
    let map = buffer
        .map_readable()
        .map_err(|e| NayaError::codec(format!("Failed to map encoded buffer: {e}")))?;
    out.extend_from_slice(map.as_slice());
    Ok(())
}

fn clock_time(secs: f64) -> gst::ClockTime {
    gst::ClockTime::from_nseconds(RecordingClock::secs_to_ns(secs.max(0.0)))
}

fn wait_for_state(pipeline: &gst::Pipeline, target: gst::State) -> NayaResult<()> {
    match pipeline.state(gst::ClockTime::from_seconds(STATE_TIMEOUT_SECS)) {
        (Ok(_), state, _) if state == target => Ok(()),
        (Ok(_), state, _) => {
            tracing::warn!(
                ?state,
                ?target,
                timeout = ?Duration::from_secs(STATE_TIMEOUT_SECS),
                "Pipeline did not reach target state within timeout"
            );
            Ok(())
        }
        (Err(e), _, _) => Err(NayaError::codec(format!(
            "Pipeline failed to reach {target:?}: {e:?}"
        ))),
    }
}

fn launch_pipeline(name: &str, launch: &str) -> NayaResult<gst::Pipeline> {
    init_gstreamer()?;
    let element = gst::parse::launch(launch)
        .map_err(|e| NayaError::codec(format!("Failed to build {name} pipeline: {e}")))?;
    element
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| NayaError::codec("Launch string did not produce a pipeline"))
}

fn app_element<T: IsA<gst::Element>>(pipeline: &gst::Pipeline, name: &str) -> NayaResult<T> {
    pipeline
        .by_name(name)
        .ok_or_else(|| NayaError::codec(format!("Pipeline has no element named '{name}'")))?
        .dynamic_cast::<T>()
        .map_err(|_| NayaError::codec(format!("Element '{name}' has an unexpected type")))
}

fn init_gstreamer() -> NayaResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(NayaError::codec_unsupported(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}
