//! RGBA frame buffers.

use std::fmt;
use std::str::FromStr;

use naya_common::error::{NayaError, NayaResult};

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);
    pub const TRANSPARENT: Rgba = Rgba([0, 0, 0, 0]);

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn parse_hex(value: &str) -> NayaResult<Self> {
        let hex = value.trim().trim_start_matches('#');
        let invalid = || NayaError::config(format!("Invalid color '{value}'"));
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Self([channel(0)?, channel(2)?, channel(4)?, alpha]))
    }
}

impl FromStr for Rgba {
    type Err = NayaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

/// A tightly packed RGBA8 image, row-major, no padding.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Frame {
    /// Wrap raw RGBA bytes. `data` must hold exactly `width * height * 4` bytes.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> NayaResult<Self> {
        let expected = byte_len(width, height);
        if data.len() != expected {
            return Err(NayaError::codec(format!(
                "Frame {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with one color.
    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        let data = color.0.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[i..i + 4]);
        Some(Rgba(px))
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgba) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&color.0);
    }

    pub fn fill(&mut self, color: Rgba) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&color.0);
        }
    }

    /// Draw `src` scaled to fit inside this frame, aspect ratio preserved
    /// and centered. Pixels outside the fitted rectangle are untouched.
    /// Nearest-neighbour sampling.
    pub fn draw_fit(&mut self, src: &Frame) {
        let Some(rect) = fit_rect(src.dimensions(), self.dimensions()) else {
            return;
        };
        let dst_stride = self.width as usize * 4;
        let src_stride = src.width as usize * 4;
        for dy in 0..rect.height {
            let sy = ((dy as u64 * src.height as u64) / rect.height as u64) as usize;
            let row = (rect.y + dy) as usize * dst_stride;
            for dx in 0..rect.width {
                let sx = ((dx as u64 * src.width as u64) / rect.width as u64) as usize;
                let s = sy * src_stride + sx * 4;
                let d = row + (rect.x + dx) as usize * 4;
                self.data[d..d + 4].copy_from_slice(&src.data[s..s + 4]);
            }
        }
    }
}

/// Placement of a scaled source inside a destination frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Largest aspect-preserving rectangle of `src` that fits in `dst`,
/// centered. `None` when either side is degenerate.
pub fn fit_rect(src: (u32, u32), dst: (u32, u32)) -> Option<FitRect> {
    let (sw, sh) = src;
    let (dw, dh) = dst;
    if sw == 0 || sh == 0 || dw == 0 || dh == 0 {
        return None;
    }
    // Compare dw/sw against dh/sh without floating point.
    let (width, height) = if dw as u64 * sh as u64 <= dh as u64 * sw as u64 {
        let h = ((sh as u64 * dw as u64) / sw as u64).max(1) as u32;
        (dw, h.min(dh))
    } else {
        let w = ((sw as u64 * dh as u64) / sh as u64).max(1) as u32;
        (w.min(dw), dh)
    };
    Some(FitRect {
        x: (dw - width) / 2,
        y: (dh - height) / 2,
        width,
        height,
    })
}

fn byte_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}
