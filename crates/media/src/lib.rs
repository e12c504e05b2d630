//! Naya Media
//!
//! Everything that touches pixels or encoded bytes:
//! - **Frame:** RGBA buffers and aspect-preserving scaling
//! - **Codec:** encoder/decoder/backend traits and codec negotiation
//! - **Builtin:** the run-length codec that is always available
//! - **GstBackend:** WebM/MP4 through GStreamer (`gstreamer` feature)
//! - **Thumbnail:** PNG data-URL thumbnails for clip metadata

pub mod builtin;
pub mod codec;
pub mod frame;
#[cfg(feature = "gstreamer")]
pub mod gst_backend;
pub mod thumbnail;

use std::sync::Arc;

pub use builtin::{BuiltinBackend, RleDecoder, RleEncoder};
pub use codec::{negotiate_encoder, ClipDecoder, EncoderSettings, MediaBackend, VideoEncoder};
pub use frame::{fit_rect, FitRect, Frame, Rgba};
pub use thumbnail::{generate_thumbnail, THUMBNAIL_HEIGHT, THUMBNAIL_WIDTH};

/// The most capable backend compiled into this build.
///
/// With the `gstreamer` feature this is the GStreamer backend, falling back
/// to the built-in codec when GStreamer fails to initialize.
pub fn default_backend() -> Arc<dyn MediaBackend> {
    #[cfg(feature = "gstreamer")]
    {
        match gst_backend::GstBackend::new() {
            Ok(backend) => return Arc::new(backend),
            Err(e) => {
                tracing::warn!(error = %e, "GStreamer unavailable; using built-in codec");
            }
        }
    }
    Arc::new(BuiltinBackend)
}
