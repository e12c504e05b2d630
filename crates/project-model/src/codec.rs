//! Codec and container variants.
//!
//! Encoder negotiation walks [`CodecVariant::PREFERENCE`] and stops at the
//! first variant the active media backend supports. The outcome is always
//! one of these tagged variants, never a free-form MIME string.

use serde::{Deserialize, Serialize};

/// Container format of an encoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    Webm,
    Mp4,
    /// Built-in run-length container, always decodable.
    NayaRaw,
}

/// A codec inside its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecVariant {
    WebmVp9,
    WebmVp8,
    Mp4H264,
    NayaRle,
}

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Magic bytes opening every built-in stream.
pub const NAYA_STREAM_MAGIC: [u8; 4] = *b"NAYV";

impl ContainerFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Webm => "video/webm",
            Self::Mp4 => "video/mp4",
            Self::NayaRaw => "video/x-naya-rle",
        }
    }

    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Webm => "webm",
            Self::Mp4 => "mp4",
            Self::NayaRaw => "nrv",
        }
    }

    /// Detect the container from the leading bytes of a payload.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&NAYA_STREAM_MAGIC) {
            Some(Self::NayaRaw)
        } else if bytes.starts_with(&EBML_MAGIC) {
            Some(Self::Webm)
        } else if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
            Some(Self::Mp4)
        } else {
            None
        }
    }

    /// Container named by a MIME type, ignoring any `codecs=` parameter.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        [Self::Webm, Self::Mp4, Self::NayaRaw]
            .into_iter()
            .find(|c| c.mime_type().eq_ignore_ascii_case(essence))
    }
}

impl CodecVariant {
    /// Best compression first, universally-supported baseline last.
    pub const PREFERENCE: [CodecVariant; 4] = [
        CodecVariant::WebmVp9,
        CodecVariant::WebmVp8,
        CodecVariant::Mp4H264,
        CodecVariant::NayaRle,
    ];

    pub fn container(self) -> ContainerFormat {
        match self {
            Self::WebmVp9 | Self::WebmVp8 => ContainerFormat::Webm,
            Self::Mp4H264 => ContainerFormat::Mp4,
            Self::NayaRle => ContainerFormat::NayaRaw,
        }
    }

    /// Full MIME type including the codec parameter.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::WebmVp9 => "video/webm;codecs=vp9",
            Self::WebmVp8 => "video/webm;codecs=vp8",
            Self::Mp4H264 => "video/mp4;codecs=avc1",
            Self::NayaRle => "video/x-naya-rle",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::WebmVp9 => "vp9",
            Self::WebmVp8 => "vp8",
            Self::Mp4H264 => "h264",
            Self::NayaRle => "naya-rle",
        }
    }

    /// Suggested download filename for a payload encoded with this variant.
    pub fn suggested_filename(self, stem: &str) -> String {
        let stem = sanitize_stem(stem);
        format!("{stem}.{}", self.container().extension())
    }

    /// First variant in preference order accepted by `supported`.
    pub fn negotiate(supported: impl Fn(CodecVariant) -> bool) -> Option<CodecVariant> {
        Self::PREFERENCE.into_iter().find(|v| supported(*v))
    }
}

fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "export".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_prefers_best_supported() {
        assert_eq!(
            CodecVariant::negotiate(|_| true),
            Some(CodecVariant::WebmVp9)
        );
        assert_eq!(
            CodecVariant::negotiate(|v| v != CodecVariant::WebmVp9),
            Some(CodecVariant::WebmVp8)
        );
        assert_eq!(
            CodecVariant::negotiate(|v| v == CodecVariant::NayaRle),
            Some(CodecVariant::NayaRle)
        );
        assert_eq!(CodecVariant::negotiate(|_| false), None);
    }

    #[test]
    fn test_sniff_containers() {
        assert_eq!(
            ContainerFormat::sniff(b"NAYV\x01rest"),
            Some(ContainerFormat::NayaRaw)
        );
        assert_eq!(
            ContainerFormat::sniff(&[0x1A, 0x45, 0xDF, 0xA3, 0x01]),
            Some(ContainerFormat::Webm)
        );
        assert_eq!(
            ContainerFormat::sniff(b"\x00\x00\x00\x18ftypmp42"),
            Some(ContainerFormat::Mp4)
        );
        assert_eq!(ContainerFormat::sniff(b"xx"), None);
    }

    #[test]
    fn test_from_mime_ignores_codec_parameter() {
        assert_eq!(
            ContainerFormat::from_mime("video/webm;codecs=vp9"),
            Some(ContainerFormat::Webm)
        );
        assert_eq!(
            ContainerFormat::from_mime(CodecVariant::NayaRle.mime_type()),
            Some(ContainerFormat::NayaRaw)
        );
        assert_eq!(ContainerFormat::from_mime("image/png"), None);
    }

    #[test]
    fn test_suggested_filename_uses_container_extension() {
        assert_eq!(
            CodecVariant::WebmVp8.suggested_filename("My Export"),
            "My_Export.webm"
        );
        assert_eq!(CodecVariant::NayaRle.suggested_filename(""), "export.nrv");
    }
}
