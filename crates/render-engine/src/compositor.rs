//! Frame compositor: maps output ticks onto timeline clips and paints
//! source frames onto the output canvas.

use naya_common::clock::frame_time_secs;
use naya_media::{Frame, Rgba};
use naya_project_model::{ClipId, TimelineSnapshot};

/// A single frame's composition instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameComposition {
    /// Frame number.
    pub frame_index: u64,

    /// Output time in seconds.
    pub time_secs: f64,

    /// Clip active at `time_secs`.
    pub clip_id: ClipId,

    /// Position inside that clip.
    pub clip_offset_secs: f64,
}

/// Output frames needed to cover `duration_secs` at `fps`.
pub fn frame_count(duration_secs: f64, fps: u32) -> u64 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 || fps == 0 {
        return 0;
    }
    // Tolerate float noise on exact multiples of the frame interval.
    (duration_secs * fps as f64 - 1e-9).ceil().max(0.0) as u64
}

/// Compute the composition for each output frame of the export.
///
/// Tick `i` sits at `i / fps`, derived from the index so long exports do
/// not accumulate rounding error. Planning stops at the first tick past the
/// end of the timeline.
pub fn compute_compositions(snapshot: &TimelineSnapshot, fps: u32) -> Vec<FrameComposition> {
    let total_frames = frame_count(snapshot.total_duration(), fps);
    let mut compositions = Vec::with_capacity(total_frames as usize);

    for frame in 0..total_frames {
        let time_secs = frame_time_secs(frame, fps);
        let Some(entry) = snapshot.entry_at(time_secs) else {
            break;
        };
        compositions.push(FrameComposition {
            frame_index: frame,
            time_secs,
            clip_id: entry.clip_id.clone(),
            clip_offset_secs: entry.clip_offset(time_secs),
        });
    }

    compositions
}

/// The shared output surface every composed frame is drawn on.
#[derive(Debug, Clone)]
pub struct OutputCanvas {
    frame: Frame,
    background: Rgba,
}

impl OutputCanvas {
    pub fn new(width: u32, height: u32, background: Rgba) -> Self {
        Self {
            frame: Frame::filled(width, height, background),
            background,
        }
    }

    /// Clear to the background, then draw `source` scaled to fit.
    ///
    /// Clearing every frame keeps letterbox bars free of pixels left over
    /// from a previous clip with a different aspect ratio.
    pub fn compose(&mut self, source: Option<&Frame>) -> &Frame {
        self.frame.fill(self.background);
        if let Some(source) = source {
            self.frame.draw_fit(source);
        }
        &self.frame
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}
