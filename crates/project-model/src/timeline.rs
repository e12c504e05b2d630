//! Timeline: an ordered arrangement of clip references.
//!
//! Entries are contiguous. Entry `i > 0` starts exactly where entry `i - 1`
//! ends, and the total duration is the end of the last entry (0 when
//! empty). Positions are recomputed from durations after every mutation,
//! so the invariant holds by construction.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clip::{ClipDurations, ClipId};

/// A clip reference with its derived position on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub clip_id: ClipId,
    pub start_secs: f64,
    pub end_secs: f64,
}

impl TimelineEntry {
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Whether `time` falls inside `[start, end)`.
    pub fn contains(&self, time: f64) -> bool {
        self.start_secs <= time && time < self.end_secs
    }

    /// Offset of timeline `time` within this entry's clip.
    pub fn clip_offset(&self, time: f64) -> f64 {
        (time - self.start_secs).clamp(0.0, self.duration_secs())
    }
}

/// Errors from timeline mutations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimelineError {
    #[error("Unknown clip: {0}")]
    UnknownClip(ClipId),

    #[error("Invalid duration {duration} for clip {id}")]
    InvalidDuration { id: ClipId, duration: f64 },

    #[error("Reorder must be a permutation of the current clips")]
    NotAPermutation,
}

/// The live, mutable timeline.
///
/// Single-writer: callers serialize mutations (one UI interaction at a
/// time). Hand a [`TimelineSnapshot`] to anything that runs concurrently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,

    /// Durations already looked up, keyed by clip.
    #[serde(default)]
    durations: HashMap<ClipId, f64>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a clip, looking up its duration unless already cached.
    ///
    /// A clip already on the timeline is not added twice; returns `false`
    /// in that case.
    pub fn append(
        &mut self,
        clip_id: ClipId,
        durations: &dyn ClipDurations,
    ) -> Result<bool, TimelineError> {
        if self.contains(&clip_id) {
            return Ok(false);
        }
        let duration = match self.durations.get(&clip_id) {
            Some(d) => *d,
            None => durations
                .clip_duration(&clip_id)
                .ok_or_else(|| TimelineError::UnknownClip(clip_id.clone()))?,
        };
        self.append_with_duration(clip_id, duration)
    }

    /// Append a clip whose duration the caller already knows.
    pub fn append_with_duration(
        &mut self,
        clip_id: ClipId,
        duration_secs: f64,
    ) -> Result<bool, TimelineError> {
        if !duration_secs.is_finite() || duration_secs < 0.0 {
            return Err(TimelineError::InvalidDuration {
                id: clip_id,
                duration: duration_secs,
            });
        }
        if self.contains(&clip_id) {
            return Ok(false);
        }
        let start = self.total_duration();
        self.durations.insert(clip_id.clone(), duration_secs);
        self.entries.push(TimelineEntry {
            clip_id,
            start_secs: start,
            end_secs: start + duration_secs,
        });
        Ok(true)
    }

    /// Remove a clip. Returns whether it was present.
    pub fn remove(&mut self, clip_id: &ClipId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.clip_id != clip_id);
        let removed = self.entries.len() != before;
        if removed {
            self.retime();
        }
        removed
    }

    /// Permute the entries into `new_order`.
    ///
    /// Rejected unless `new_order` holds exactly the current clips; the
    /// timeline is left untouched on rejection.
    pub fn reorder(&mut self, new_order: &[ClipId]) -> Result<(), TimelineError> {
        let mut current: Vec<&ClipId> = self.entries.iter().map(|e| &e.clip_id).collect();
        let mut proposed: Vec<&ClipId> = new_order.iter().collect();
        current.sort();
        proposed.sort();
        if current != proposed {
            return Err(TimelineError::NotAPermutation);
        }

        let mut by_id: HashMap<ClipId, TimelineEntry> = self
            .entries
            .drain(..)
            .map(|e| (e.clip_id.clone(), e))
            .collect();
        for id in new_order {
            if let Some(entry) = by_id.remove(id) {
                self.entries.push(entry);
            }
        }
        self.retime();
        Ok(())
    }

    /// End of the last entry, or 0 for an empty timeline.
    pub fn total_duration(&self) -> f64 {
        total_duration(&self.entries)
    }

    /// The entry whose `[start, end)` contains `time`.
    pub fn entry_at(&self, time: f64) -> Option<&TimelineEntry> {
        entry_at(&self.entries, time)
    }

    /// Immutable copy of the current entries.
    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            entries: self.entries.clone().into(),
        }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn clip_ids(&self) -> Vec<ClipId> {
        self.entries.iter().map(|e| e.clip_id.clone()).collect()
    }

    pub fn contains(&self, clip_id: &ClipId) -> bool {
        self.entries.iter().any(|e| &e.clip_id == clip_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Lay entries end to end from their cached durations so positions
    /// never accumulate subtraction error.
    fn retime(&mut self) {
        let mut cursor = 0.0;
        for entry in &mut self.entries {
            let duration = match self.durations.get(&entry.clip_id) {
                Some(d) => *d,
                None => entry.duration_secs(),
            };
            entry.start_secs = cursor;
            entry.end_secs = cursor + duration;
            cursor = entry.end_secs;
        }
    }
}

/// Immutable view of a timeline taken at a point in time.
///
/// Later mutations of the live [`Timeline`] are never visible here.
#[derive(Debug, Clone, Default)]
pub struct TimelineSnapshot {
    entries: Arc<[TimelineEntry]>,
}

impl TimelineSnapshot {
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn total_duration(&self) -> f64 {
        total_duration(&self.entries)
    }

    pub fn entry_at(&self, time: f64) -> Option<&TimelineEntry> {
        entry_at(&self.entries, time)
    }

    /// Referenced clips in first-appearance order, without repeats.
    pub fn distinct_clip_ids(&self) -> Vec<ClipId> {
        let mut seen = Vec::<ClipId>::new();
        for entry in self.entries.iter() {
            if !seen.contains(&entry.clip_id) {
                seen.push(entry.clip_id.clone());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn total_duration(entries: &[TimelineEntry]) -> f64 {
    entries.last().map(|e| e.end_secs).unwrap_or(0.0)
}

fn entry_at(entries: &[TimelineEntry], time: f64) -> Option<&TimelineEntry> {
    // Written to also reject NaN.
    if !(time >= 0.0 && time < total_duration(entries)) {
        return None;
    }
    let idx = entries.partition_point(|e| e.end_secs <= time);
    entries.get(idx).filter(|e| e.contains(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> ClipId {
        ClipId::from(s)
    }

    fn timeline_of(durations: &[f64]) -> Timeline {
        let mut timeline = Timeline::new();
        for (i, d) in durations.iter().enumerate() {
            timeline
                .append_with_duration(id(&format!("clip_{i}")), *d)
                .unwrap();
        }
        timeline
    }

    #[test]
    fn test_empty_timeline() {
        let timeline = Timeline::new();
        assert_eq!(timeline.total_duration(), 0.0);
        assert!(timeline.entry_at(0.0).is_none());
        assert!(timeline.snapshot().is_empty());
    }

    #[test]
    fn test_append_computes_contiguous_offsets() {
        let timeline = timeline_of(&[3.0, 4.0]);
        let entries = timeline.entries();
        assert_eq!(entries[0].start_secs, 0.0);
        assert_eq!(entries[0].end_secs, 3.0);
        assert_eq!(entries[1].start_secs, 3.0);
        assert_eq!(entries[1].end_secs, 7.0);
        assert_eq!(timeline.total_duration(), 7.0);
    }

    #[test]
    fn test_append_uses_duration_source_and_cache() {
        let mut source = HashMap::new();
        source.insert(id("a"), 2.5);
        let mut timeline = Timeline::new();
        assert!(timeline.append(id("a"), &source).unwrap());
        assert!(!timeline.append(id("a"), &source).unwrap());
        assert_eq!(timeline.len(), 1);

        assert_eq!(
            timeline.append(id("missing"), &source),
            Err(TimelineError::UnknownClip(id("missing")))
        );

        // Removed clips come back from the cache without a lookup.
        timeline.remove(&id("a"));
        let empty: HashMap<ClipId, f64> = HashMap::new();
        assert!(timeline.append(id("a"), &empty).unwrap());
        assert_eq!(timeline.total_duration(), 2.5);
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let mut timeline = Timeline::new();
        assert!(matches!(
            timeline.append_with_duration(id("a"), f64::NAN),
            Err(TimelineError::InvalidDuration { .. })
        ));
        assert!(matches!(
            timeline.append_with_duration(id("a"), -1.0),
            Err(TimelineError::InvalidDuration { .. })
        ));
        assert!(timeline.is_empty());
    }

    #[test]
    fn test_entry_at_boundaries() {
        let timeline = timeline_of(&[3.0, 4.0]);
        assert_eq!(timeline.entry_at(0.0).unwrap().clip_id, id("clip_0"));
        assert_eq!(timeline.entry_at(2.999).unwrap().clip_id, id("clip_0"));
        assert_eq!(timeline.entry_at(3.0).unwrap().clip_id, id("clip_1"));
        assert_eq!(timeline.entry_at(6.999).unwrap().clip_id, id("clip_1"));
        assert!(timeline.entry_at(7.0).is_none());
        assert!(timeline.entry_at(-0.1).is_none());
        assert!(timeline.entry_at(f64::NAN).is_none());
    }

    #[test]
    fn test_remove_retimes_following_entries() {
        let mut timeline = timeline_of(&[1.0, 2.0, 3.0]);
        assert!(timeline.remove(&id("clip_1")));
        assert!(!timeline.remove(&id("clip_1")));
        let entries = timeline.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].clip_id, id("clip_2"));
        assert_eq!(entries[1].start_secs, 1.0);
        assert_eq!(timeline.total_duration(), 4.0);
    }

    #[test]
    fn test_reorder_permutes() {
        let mut timeline = timeline_of(&[1.0, 2.0, 3.0]);
        timeline
            .reorder(&[id("clip_2"), id("clip_0"), id("clip_1")])
            .unwrap();
        let entries = timeline.entries();
        assert_eq!(entries[0].clip_id, id("clip_2"));
        assert_eq!(entries[0].end_secs, 3.0);
        assert_eq!(entries[1].start_secs, 3.0);
        assert_eq!(entries[2].end_secs, 6.0);
    }

    #[test]
    fn test_repeated_edits_match_a_fresh_layout() {
        let durations = [0.1, 1.0 / 3.0, 2.9, 0.3, 7.77, 1e-3];
        let mut timeline = timeline_of(&durations);
        for _ in 0..200 {
            let mut order = timeline.clip_ids();
            order.rotate_left(1);
            timeline.reorder(&order).unwrap();
        }
        assert!(timeline.remove(&id("clip_3")));
        for _ in 0..77 {
            let mut order = timeline.clip_ids();
            order.reverse();
            timeline.reorder(&order).unwrap();
        }

        let mut fresh = Timeline::new();
        for clip_id in timeline.clip_ids() {
            let index: usize = clip_id.as_str()["clip_".len()..].parse().unwrap();
            fresh.append_with_duration(clip_id, durations[index]).unwrap();
        }
        assert_eq!(timeline.entries(), fresh.entries());
        assert_eq!(timeline.total_duration(), fresh.total_duration());
    }

    #[test]
    fn test_reorder_rejects_membership_changes() {
        let mut timeline = timeline_of(&[1.0, 2.0]);
        let before = timeline.clip_ids();
        assert_eq!(
            timeline.reorder(&[id("clip_0")]),
            Err(TimelineError::NotAPermutation)
        );
        assert_eq!(
            timeline.reorder(&[id("clip_0"), id("other")]),
            Err(TimelineError::NotAPermutation)
        );
        assert_eq!(
            timeline.reorder(&[id("clip_0"), id("clip_0")]),
            Err(TimelineError::NotAPermutation)
        );
        assert_eq!(timeline.clip_ids(), before);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutation() {
        let mut timeline = timeline_of(&[3.0, 4.0]);
        let snapshot = timeline.snapshot();
        timeline.remove(&id("clip_0"));
        timeline.append_with_duration(id("late"), 10.0).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.total_duration(), 7.0);
        assert_eq!(snapshot.entry_at(1.0).unwrap().clip_id, id("clip_0"));
        assert_eq!(
            snapshot.distinct_clip_ids(),
            vec![id("clip_0"), id("clip_1")]
        );
    }

    #[test]
    fn test_timeline_serialization_roundtrip() {
        let timeline = timeline_of(&[1.5, 2.5]);
        let json = serde_json::to_string(&timeline).unwrap();
        let parsed: Timeline = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.entries(), timeline.entries());
    }

    proptest! {
        #[test]
        fn prop_entries_partition_total_duration(
            durations in prop::collection::vec(0.01f64..20.0, 0..12),
            samples in prop::collection::vec(0.0f64..1.0, 1..50),
        ) {
            let timeline = timeline_of(&durations);
            let total = timeline.total_duration();
            let entries = timeline.entries();

            for pair in entries.windows(2) {
                prop_assert_eq!(pair[1].start_secs, pair[0].end_secs);
            }
            if let Some(first) = entries.first() {
                prop_assert_eq!(first.start_secs, 0.0);
            }

            for fraction in samples {
                let t = fraction * total;
                if t >= total {
                    continue;
                }
                let matching = entries.iter().filter(|e| e.contains(t)).count();
                prop_assert_eq!(matching, 1);
                let found = timeline.entry_at(t).expect("time inside the timeline");
                prop_assert!(found.contains(t));
            }
        }

        #[test]
        fn prop_reorder_is_a_permutation(
            durations in prop::collection::vec(0.1f64..10.0, 1..10),
            seed in any::<u64>(),
        ) {
            let mut timeline = timeline_of(&durations);
            let mut order = timeline.clip_ids();
            // Deterministic shuffle from the seed.
            let mut state = seed | 1;
            for i in (1..order.len()).rev() {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                order.swap(i, (state % (i as u64 + 1)) as usize);
            }

            let mut before = timeline.clip_ids();
            let total_before = timeline.total_duration();
            timeline.reorder(&order).unwrap();
            let mut after = timeline.clip_ids();

            prop_assert_eq!(&after, &order);
            before.sort();
            after.sort();
            prop_assert_eq!(before, after);
            prop_assert!((timeline.total_duration() - total_before).abs() < 1e-9);
        }
    }
}
