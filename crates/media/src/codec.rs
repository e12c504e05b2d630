//! Encoder, decoder and backend traits.
//!
//! A [`MediaBackend`] is the factory for both directions. The recorder and
//! the exporter only ever see the trait objects, so the built-in codec and
//! the GStreamer codecs are interchangeable.

use std::time::Duration;

use naya_common::error::{NayaError, NayaResult};
use naya_project_model::CodecVariant;

use crate::frame::Frame;

/// Parameters fixed for the lifetime of one encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// How often buffered output is flushed as a chunk.
    pub chunk_interval: Duration,
}

impl EncoderSettings {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps: fps.max(1),
            chunk_interval: Duration::from_millis(100),
        }
    }

    pub fn with_chunk_interval(mut self, interval: Duration) -> Self {
        self.chunk_interval = interval;
        self
    }
}

/// Streaming video encoder.
///
/// Frames must be submitted with strictly increasing presentation times.
/// Concatenating every chunk returned by [`encode`](Self::encode) followed
/// by the bytes returned from [`finish`](Self::finish) yields the complete
/// payload.
pub trait VideoEncoder: Send {
    fn variant(&self) -> CodecVariant;

    /// Encode one frame. Returns a chunk when enough output has buffered.
    fn encode(&mut self, frame: &Frame, pts_secs: f64) -> NayaResult<Option<Vec<u8>>>;

    /// Flush and close the stream, returning the remaining bytes. An encoder
    /// that never received a frame returns an empty buffer.
    fn finish(self: Box<Self>) -> NayaResult<Vec<u8>>;
}

/// Random-access decoder over one encoded payload.
///
/// Seeking is the expensive operation; [`advance_to`](Self::advance_to)
/// only moves forward and is meant for sequential reads.
pub trait ClipDecoder: Send {
    fn duration_secs(&self) -> f64;

    fn dimensions(&self) -> (u32, u32);

    /// Presentation time of the current frame, `None` before the first
    /// decode.
    fn position_secs(&self) -> Option<f64>;

    /// Jump to the frame nearest `secs`.
    fn seek(&mut self, secs: f64) -> NayaResult<()>;

    /// Move forward to the frame nearest `secs`. Never moves backwards.
    fn advance_to(&mut self, secs: f64) -> NayaResult<()>;

    fn current_frame(&self) -> Option<&Frame>;
}

/// Factory for encoders and decoders.
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, variant: CodecVariant) -> bool;

    fn open_encoder(
        &self,
        variant: CodecVariant,
        settings: &EncoderSettings,
    ) -> NayaResult<Box<dyn VideoEncoder>>;

    /// Open a decoder over a stored payload. `mime_type` is the stored
    /// MIME type; backends may also sniff the payload.
    fn open_decoder(&self, payload: Vec<u8>, mime_type: &str) -> NayaResult<Box<dyn ClipDecoder>>;
}

/// Open an encoder for the first variant in preference order that the
/// backend supports. Fails with `CodecUnsupported` only when none is.
pub fn negotiate_encoder(
    backend: &dyn MediaBackend,
    settings: &EncoderSettings,
) -> NayaResult<Box<dyn VideoEncoder>> {
    let mut failed: Vec<CodecVariant> = Vec::new();
    while let Some(variant) =
        CodecVariant::negotiate(|v| backend.supports(v) && !failed.contains(&v))
    {
        match backend.open_encoder(variant, settings) {
            Ok(encoder) => {
                tracing::debug!(
                    backend = backend.name(),
                    codec = variant.label(),
                    "Negotiated encoder"
                );
                return Ok(encoder);
            }
            Err(e) => {
                tracing::warn!(
                    backend = backend.name(),
                    codec = variant.label(),
                    error = %e,
                    "Encoder reported as supported failed to open; trying next"
                );
                failed.push(variant);
            }
        }
    }
    Err(NayaError::codec_unsupported(format!(
        "Backend '{}' supports none of: {}",
        backend.name(),
        CodecVariant::PREFERENCE
            .iter()
            .map(|v| v.mime_type())
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::BuiltinBackend;

    struct NothingBackend;

    impl MediaBackend for NothingBackend {
        fn name(&self) -> &str {
            "nothing"
        }

        fn supports(&self, _variant: CodecVariant) -> bool {
            false
        }

        fn open_encoder(
            &self,
            variant: CodecVariant,
            _settings: &EncoderSettings,
        ) -> NayaResult<Box<dyn VideoEncoder>> {
            Err(NayaError::codec_unsupported(variant.label()))
        }

        fn open_decoder(
            &self,
            _payload: Vec<u8>,
            mime_type: &str,
        ) -> NayaResult<Box<dyn ClipDecoder>> {
            Err(NayaError::codec_unsupported(mime_type))
        }
    }

    #[test]
    fn test_negotiation_falls_back_to_builtin() {
        let encoder = negotiate_encoder(&BuiltinBackend, &EncoderSettings::new(4, 4, 30)).unwrap();
        assert_eq!(encoder.variant(), CodecVariant::NayaRle);
    }

    #[test]
    fn test_negotiation_fails_when_nothing_supported() {
        let err = negotiate_encoder(&NothingBackend, &EncoderSettings::new(4, 4, 30))
            .err()
            .unwrap();
        assert!(matches!(err, NayaError::CodecUnsupported { .. }));
    }

    /// Claims every variant but can only open the built-in one.
    struct OverclaimingBackend;

    impl MediaBackend for OverclaimingBackend {
        fn name(&self) -> &str {
            "overclaiming"
        }

        fn supports(&self, _variant: CodecVariant) -> bool {
            true
        }

        fn open_encoder(
            &self,
            variant: CodecVariant,
            settings: &EncoderSettings,
        ) -> NayaResult<Box<dyn VideoEncoder>> {
            match variant {
                CodecVariant::NayaRle => BuiltinBackend.open_encoder(variant, settings),
                other => Err(NayaError::codec(format!("{} plugin missing", other.label()))),
            }
        }

        fn open_decoder(
            &self,
            payload: Vec<u8>,
            mime_type: &str,
        ) -> NayaResult<Box<dyn ClipDecoder>> {
            BuiltinBackend.open_decoder(payload, mime_type)
        }
    }

    #[test]
    fn test_negotiation_skips_encoders_that_fail_to_open() {
        let encoder =
            negotiate_encoder(&OverclaimingBackend, &EncoderSettings::new(4, 4, 30)).unwrap();
        assert_eq!(encoder.variant(), CodecVariant::NayaRle);
    }
}
