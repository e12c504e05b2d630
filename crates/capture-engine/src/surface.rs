//! Render surfaces: the drawing targets a recorder samples frames from.

use serde::{Deserialize, Serialize};

use naya_common::error::NayaResult;
use naya_media::{Frame, Rgba};

/// A continuously redrawn drawing target.
pub trait RenderSurface: Send {
    /// Current size in pixels. Zero in either direction means the surface
    /// is not attached to anything drawable.
    fn dimensions(&self) -> (u32, u32);

    /// Whether a render loop is currently painting this surface.
    fn is_rendering(&self) -> bool;

    /// The most recently painted frame, or `None` when nothing new has been
    /// painted since the previous call.
    fn capture_frame(&mut self) -> NayaResult<Option<Frame>>;
}

/// Built-in generative patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    /// Interfering sine fields drifting over time.
    #[default]
    Plasma,
    /// Vertical color bars scrolling sideways.
    Bars,
    /// Concentric rings pulsing outwards.
    Rings,
}

/// A procedurally animated surface.
///
/// Each call to [`capture_frame`](RenderSurface::capture_frame) paints the
/// next animation step, unless the surface has been stalled.
#[derive(Debug, Clone)]
pub struct SyntheticSurface {
    width: u32,
    height: u32,
    pattern: Pattern,
    step: u64,
    rendering: bool,
    stalled: bool,
}

impl SyntheticSurface {
    pub fn new(width: u32, height: u32, pattern: Pattern) -> Self {
        Self {
            width,
            height,
            pattern,
            step: 0,
            rendering: true,
            stalled: false,
        }
    }

    /// A surface whose render loop is running but never paints a frame.
    pub fn stalled(width: u32, height: u32) -> Self {
        Self {
            stalled: true,
            ..Self::new(width, height, Pattern::default())
        }
    }

    pub fn set_rendering(&mut self, rendering: bool) {
        self.rendering = rendering;
    }

    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Frames painted so far.
    pub fn steps(&self) -> u64 {
        self.step
    }

    fn paint(&self) -> Frame {
        let mut frame = Frame::filled(self.width, self.height, Rgba::BLACK);
        let t = self.step as f64 / 30.0;
        let (w, h) = (self.width.max(1) as f64, self.height.max(1) as f64);
        for y in 0..self.height {
            for x in 0..self.width {
                let u = x as f64 / w;
                let v = y as f64 / h;
                let color = match self.pattern {
                    Pattern::Plasma => plasma(u, v, t),
                    Pattern::Bars => bars(u, t),
                    Pattern::Rings => rings(u, v, t),
                };
                frame.set_pixel(x, y, color);
            }
        }
        frame
    }
}

impl RenderSurface for SyntheticSurface {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_rendering(&self) -> bool {
        self.rendering
    }

    fn capture_frame(&mut self) -> NayaResult<Option<Frame>> {
        if self.stalled || !self.rendering || self.width == 0 || self.height == 0 {
            return Ok(None);
        }
        let frame = self.paint();
        self.step += 1;
        Ok(Some(frame))
    }
}

fn plasma(u: f64, v: f64, t: f64) -> Rgba {
    let a = (u * 10.0 + t).sin();
    let b = ((v * 10.0 + t) * 0.5).sin();
    let c = ((u + v) * 8.0 + t * 1.3).sin();
    let d = (((u - 0.5).powi(2) + (v - 0.5).powi(2)).sqrt() * 12.0 - t).sin();
    let s = (a + b + c + d) / 4.0;
    Rgba::new(
        channel((s * std::f64::consts::PI).sin()),
        channel((s * std::f64::consts::PI + 2.0).sin()),
        channel((s * std::f64::consts::PI + 4.0).sin()),
        255,
    )
}

fn bars(u: f64, t: f64) -> Rgba {
    const PALETTE: [Rgba; 7] = [
        Rgba([192, 192, 192, 255]),
        Rgba([192, 192, 0, 255]),
        Rgba([0, 192, 192, 255]),
        Rgba([0, 192, 0, 255]),
        Rgba([192, 0, 192, 255]),
        Rgba([192, 0, 0, 255]),
        Rgba([0, 0, 192, 255]),
    ];
    let shifted = (u + t * 0.1).rem_euclid(1.0);
    let idx = ((shifted * PALETTE.len() as f64) as usize).min(PALETTE.len() - 1);
    PALETTE[idx]
}

fn rings(u: f64, v: f64, t: f64) -> Rgba {
    let r = ((u - 0.5).powi(2) + (v - 0.5).powi(2)).sqrt();
    let s = (r * 40.0 - t * 4.0).sin();
    let g = channel(s);
    Rgba::new(g / 3, g, 255 - g / 2, 255)
}

/// Map `[-1, 1]` onto a color channel.
fn channel(s: f64) -> u8 {
    ((s.clamp(-1.0, 1.0) + 1.0) * 127.5).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_surface_animates() {
        let mut surface = SyntheticSurface::new(16, 8, Pattern::Plasma);
        let a = surface.capture_frame().unwrap().unwrap();
        let b = surface.capture_frame().unwrap().unwrap();
        assert_eq!(a.dimensions(), (16, 8));
        assert_ne!(a, b);
        assert_eq!(surface.steps(), 2);
    }

    #[test]
    fn test_stalled_surface_paints_nothing() {
        let mut surface = SyntheticSurface::stalled(16, 8);
        assert!(surface.is_rendering());
        assert!(surface.capture_frame().unwrap().is_none());
    }

    #[test]
    fn test_every_pattern_paints_opaque_pixels() {
        for pattern in [Pattern::Plasma, Pattern::Bars, Pattern::Rings] {
            let mut surface = SyntheticSurface::new(8, 8, pattern);
            let frame = surface.capture_frame().unwrap().unwrap();
            assert!(frame.data().chunks_exact(4).all(|px| px[3] == 255));
        }
    }
}
