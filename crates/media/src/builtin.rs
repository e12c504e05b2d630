//! Built-in run-length video codec.
//!
//! Always available, needs no system libraries. Every frame is intra-coded,
//! so any frame can be decoded without its predecessors.
//!
//! Stream layout (integers little-endian):
//!
//! ```text
//! header   "NAYV" | version u8 | width u32 | height u32 | fps u32
//! frame    'F' | pts_us u64 | len u32 | runs[len]
//! run      count u8 (1..=255) | r g b a
//! trailer  'E' | frame_count u32 | duration_us u64
//! ```
//!
//! The header is written together with the first frame, so an encoder that
//! never sees a frame emits nothing at all. A stream cut short before the
//! trailer still decodes; its duration is then inferred from the last frame.

use naya_common::error::{NayaError, NayaResult};
use naya_common::{frame_interval_secs, RecordingClock};
use naya_project_model::{CodecVariant, ContainerFormat, NAYA_STREAM_MAGIC};

use crate::codec::{ClipDecoder, EncoderSettings, MediaBackend, VideoEncoder};
use crate::frame::Frame;

const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4 + 4 + 4;
const FRAME_TAG: u8 = b'F';
const END_TAG: u8 = b'E';
const RUN_LEN: usize = 5;
const CHUNK_EPSILON_SECS: f64 = 1e-9;

/// Backend offering only the built-in codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinBackend;

impl MediaBackend for BuiltinBackend {
    fn name(&self) -> &str {
        "builtin"
    }

    fn supports(&self, variant: CodecVariant) -> bool {
        variant == CodecVariant::NayaRle
    }

    fn open_encoder(
        &self,
        variant: CodecVariant,
        settings: &EncoderSettings,
    ) -> NayaResult<Box<dyn VideoEncoder>> {
        if variant != CodecVariant::NayaRle {
            return Err(NayaError::codec_unsupported(format!(
                "{} requires the gstreamer feature",
                variant.mime_type()
            )));
        }
        Ok(Box::new(RleEncoder::new(*settings)?))
    }

    fn open_decoder(&self, payload: Vec<u8>, mime_type: &str) -> NayaResult<Box<dyn ClipDecoder>> {
        match ContainerFormat::sniff(&payload) {
            Some(ContainerFormat::NayaRaw) => Ok(Box::new(RleDecoder::open(payload)?)),
            _ => Err(NayaError::codec_unsupported(format!(
                "Cannot decode '{mime_type}' without the gstreamer feature"
            ))),
        }
    }
}

/// Streaming encoder for the built-in format.
#[derive(Debug)]
pub struct RleEncoder {
    settings: EncoderSettings,
    pending: Vec<u8>,
    chunk_started_at: Option<f64>,
    frames: u32,
    last_pts: Option<f64>,
}

impl RleEncoder {
    pub fn new(settings: EncoderSettings) -> NayaResult<Self> {
        if settings.width == 0 || settings.height == 0 {
            return Err(NayaError::codec(format!(
                "Cannot encode {}x{} frames",
                settings.width, settings.height
            )));
        }
        Ok(Self {
            settings,
            pending: Vec::new(),
            chunk_started_at: None,
            frames: 0,
            last_pts: None,
        })
    }

    fn write_header(&mut self) {
        self.pending.extend_from_slice(&NAYA_STREAM_MAGIC);
        self.pending.push(VERSION);
        self.pending
            .extend_from_slice(&self.settings.width.to_le_bytes());
        self.pending
            .extend_from_slice(&self.settings.height.to_le_bytes());
        self.pending.extend_from_slice(&self.settings.fps.to_le_bytes());
    }
}

impl VideoEncoder for RleEncoder {
    fn variant(&self) -> CodecVariant {
        CodecVariant::NayaRle
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
        if !pts_secs.is_finite() || pts_secs < 0.0 {
            return Err(NayaError::codec(format!("Invalid timestamp {pts_secs}")));
        }
        if let Some(last) = self.last_pts {
            if pts_secs <= last {
                return Err(NayaError::codec(format!(
                    "Timestamp {pts_secs} does not follow {last}"
                )));
            }
        }

        if self.frames == 0 {
            self.write_header();
        }
        let runs = encode_runs(frame.data());
        let pts_us = RecordingClock::secs_to_ns(pts_secs) / 1_000;
        self.pending.push(FRAME_TAG);
        self.pending.extend_from_slice(&pts_us.to_le_bytes());
        self.pending
            .extend_from_slice(&((runs.len() / RUN_LEN) as u32).to_le_bytes());
        self.pending.extend_from_slice(&runs);
        self.frames += 1;
        self.last_pts = Some(pts_secs);

        let started = *self.chunk_started_at.get_or_insert(pts_secs);
        if pts_secs - started + CHUNK_EPSILON_SECS >= self.settings.chunk_interval.as_secs_f64() {
            self.chunk_started_at = Some(pts_secs);
            return Ok(Some(std::mem::take(&mut self.pending)));
        }
        Ok(None)
    }

    fn finish(mut self: Box<Self>) -> NayaResult<Vec<u8>> {
        let Some(last) = self.last_pts else {
            return Ok(Vec::new());
        };
        let duration = last + frame_interval_secs(self.settings.fps);
        let duration_us = RecordingClock::secs_to_ns(duration) / 1_000;
        self.pending.push(END_TAG);
        self.pending.extend_from_slice(&self.frames.to_le_bytes());
        self.pending.extend_from_slice(&duration_us.to_le_bytes());
        Ok(std::mem::take(&mut self.pending))
    }
}

fn encode_runs(pixels: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunks = pixels.chunks_exact(4);
    let Some(first) = chunks.next() else {
        return out;
    };
    let mut current: [u8; 4] = [first[0], first[1], first[2], first[3]];
    let mut count: u8 = 1;
    for px in chunks {
        if px == current && count < u8::MAX {
            count += 1;
            continue;
        }
        out.push(count);
        out.extend_from_slice(&current);
        current = [px[0], px[1], px[2], px[3]];
        count = 1;
    }
    out.push(count);
    out.extend_from_slice(&current);
    out
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    pts_secs: f64,
    /// Offset of the first run.
    offset: usize,
    runs: usize,
}

/// Random-access decoder for the built-in format.
#[derive(Debug)]
pub struct RleDecoder {
    payload: Vec<u8>,
    width: u32,
    height: u32,
    index: Vec<IndexEntry>,
    duration: f64,
    cursor: Option<usize>,
    frame: Option<Frame>,
}

impl RleDecoder {
    pub fn open(payload: Vec<u8>) -> NayaResult<Self> {
        if payload.len() < HEADER_LEN || !payload.starts_with(&NAYA_STREAM_MAGIC) {
            return Err(NayaError::codec("Not a Naya stream"));
        }
        let mut r = Reader::new(&payload, NAYA_STREAM_MAGIC.len());
        let version = r.u8()?;
        if version != VERSION {
            return Err(NayaError::codec(format!(
                "Unsupported stream version {version}"
            )));
        }
        let width = r.u32()?;
        let height = r.u32()?;
        let fps = r.u32()?;
        if width == 0 || height == 0 {
            return Err(NayaError::codec("Stream declares an empty frame size"));
        }

        let mut index = Vec::new();
        let mut duration = None;
        while !r.is_empty() {
            match r.u8()? {
                FRAME_TAG => {
                    let pts_us = r.u64()?;
                    let runs = r.u32()? as usize;
                    let offset = r.pos;
                    r.skip(runs * RUN_LEN)?;
                    index.push(IndexEntry {
                        pts_secs: pts_us as f64 / 1_000_000.0,
                        offset,
                        runs,
                    });
                }
                END_TAG => {
                    let _frames = r.u32()?;
                    duration = Some(r.u64()? as f64 / 1_000_000.0);
                    break;
                }
                tag => {
                    return Err(NayaError::codec(format!(
                        "Unexpected record tag 0x{tag:02x} at byte {}",
                        r.pos - 1
                    )))
                }
            }
        }

        let Some(last) = index.last() else {
            return Err(NayaError::codec("Stream contains no frames"));
        };
        let duration = duration.unwrap_or(last.pts_secs + frame_interval_secs(fps));

        Ok(Self {
            payload,
            width,
            height,
            index,
            duration,
            cursor: None,
            frame: None,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    /// Index of the frame whose timestamp is nearest `secs`.
    fn nearest(&self, secs: f64) -> usize {
        let after = self.index.partition_point(|e| e.pts_secs <= secs);
        if after == 0 {
            return 0;
        }
        if after == self.index.len() {
            return after - 1;
        }
        let before = after - 1;
        if secs - self.index[before].pts_secs <= self.index[after].pts_secs - secs {
            before
        } else {
            after
        }
    }

    fn load(&mut self, idx: usize) -> NayaResult<()> {
        let entry = self.index[idx];
        let expected = self.width as usize * self.height as usize * 4;
        let runs = &self.payload[entry.offset..entry.offset + entry.runs * RUN_LEN];
        let mut data = match self.frame.take() {
            Some(frame) => {
                let mut buf = frame.into_data();
                buf.clear();
                buf
            }
            None => Vec::with_capacity(expected),
        };
        for run in runs.chunks_exact(RUN_LEN) {
            for _ in 0..run[0] {
                data.extend_from_slice(&run[1..RUN_LEN]);
            }
        }
        if data.len() != expected {
            return Err(NayaError::codec(format!(
                "Frame at {:.3}s decodes to {} bytes, expected {expected}",
                entry.pts_secs,
                data.len()
            )));
        }
        self.frame = Some(Frame::new(self.width, self.height, data)?);
        self.cursor = Some(idx);
        Ok(())
    }
}

impl ClipDecoder for RleDecoder {
    fn duration_secs(&self) -> f64 {
        self.duration
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn position_secs(&self) -> Option<f64> {
        self.cursor.map(|i| self.index[i].pts_secs)
    }

    fn seek(&mut self, secs: f64) -> NayaResult<()> {
        let idx = self.nearest(secs);
        self.load(idx)
    }

    fn advance_to(&mut self, secs: f64) -> NayaResult<()> {
        let idx = self.nearest(secs);
        match self.cursor {
            Some(current) if idx <= current => Ok(()),
            _ => self.load(idx),
        }
    }

    fn current_frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> NayaResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| NayaError::codec(format!("Stream truncated at byte {}", self.pos)))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn skip(&mut self, n: usize) -> NayaResult<()> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> NayaResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> NayaResult<u32> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn u64(&mut self) -> NayaResult<u64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }
}
