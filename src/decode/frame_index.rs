//! Frame index table built by the scan.
//!
//! Container slots are in decode order. The first `leading_incomplete`
//! slots belong to packets that decoded before any complete picture
//! existed; logical frame numbers skip them:
//!
//! ```text
//! container_index(n) = (n + leading_incomplete) % total_entries
//! ```

use std::collections::HashMap;

use crate::core::time::{ticks_to_millis, Rational, Timestamp};

/// Duration reported for a video with a single frame
pub const SINGLE_FRAME_DURATION_MS: f64 = 100.0;

/// One container slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Decode-order packet timestamp
    pub timestamp: Timestamp,
    /// Timestamp of the key packet this one depends on
    pub key_timestamp: Timestamp,
    /// Whether decoding reached a complete picture at this packet
    pub complete: bool,
}

/// Accumulates slots during the scan
#[derive(Debug, Default)]
pub struct FrameIndexBuilder {
    entries: Vec<IndexEntry>,
    leading: usize,
    pts: Vec<Timestamp>,
}

impl FrameIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots so far; also the slot the next push lands in
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Complete frames recorded so far
    pub fn frames(&self) -> usize {
        self.pts.len()
    }

    /// Record a packet seen before the first complete picture
    pub fn push_leading(&mut self, timestamp: Timestamp, key_timestamp: Timestamp) -> usize {
        debug_assert!(self.pts.is_empty(), "leading slots precede every complete frame");
        self.leading += 1;
        self.push(IndexEntry { timestamp, key_timestamp, complete: false })
    }

    /// Record a packet that completed a picture presented at `pts`
    pub fn push_complete(&mut self, timestamp: Timestamp, key_timestamp: Timestamp, pts: Timestamp) -> usize {
        self.pts.push(pts);
        self.push(IndexEntry { timestamp, key_timestamp, complete: true })
    }

    fn push(&mut self, entry: IndexEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Start time in milliseconds of the most recent complete frame
    pub fn last_start_ms(&self, time_base: Rational) -> Option<f64> {
        let first = *self.pts.first()?;
        let last = *self.pts.last()?;
        Some(ticks_to_millis(last - first, time_base))
    }

    pub fn build(self, time_base: Rational) -> FrameIndexTable {
        let first = self.pts.first().copied().unwrap_or(0);
        let mut start_times: Vec<f64> = self
            .pts
            .iter()
            .map(|&pts| ticks_to_millis(pts - first, time_base))
            .collect();
        if let Some(start) = start_times.first_mut() {
            *start = 0.0;
        }
        let slots = self
            .entries
            .iter()
            .enumerate()
            .map(|(slot, entry)| (entry.timestamp, slot))
            .collect();

        FrameIndexTable {
            entries: self.entries,
            leading: self.leading,
            start_times,
            time_base,
            slots,
        }
    }
}

/// Immutable frame index of one video stream
#[derive(Debug, Clone)]
pub struct FrameIndexTable {
    entries: Vec<IndexEntry>,
    leading: usize,
    start_times: Vec<f64>,
    time_base: Rational,
    slots: HashMap<Timestamp, usize>,
}

impl FrameIndexTable {
    /// Number of container slots, leading ones included
    pub fn total_entries(&self) -> usize {
        self.entries.len()
    }

    /// Slots recorded before the first complete picture
    pub fn leading_incomplete(&self) -> usize {
        self.leading
    }

    /// Number of logical frames
    pub fn frame_count(&self) -> usize {
        self.entries.len() - self.leading
    }

    /// Time base of the stream timestamps
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// All slots in decode order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Entry of a container slot
    pub fn entry(&self, slot: usize) -> Option<&IndexEntry> {
        self.entries.get(slot)
    }

    /// Container slot of a logical frame
    pub fn container_index(&self, frame: usize) -> Option<usize> {
        if frame >= self.frame_count() {
            return None;
        }
        Some((frame + self.leading) % self.entries.len())
    }

    /// Logical frame of a container slot; leading slots have none
    pub fn logical_frame(&self, slot: usize) -> Option<usize> {
        (slot >= self.leading && slot < self.entries.len()).then(|| slot - self.leading)
    }

    /// Slot whose packet has this timestamp
    pub fn slot_of_timestamp(&self, timestamp: Timestamp) -> Option<usize> {
        self.slots.get(&timestamp).copied()
    }

    /// Timestamp of the first slot
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.entries.first().map(|e| e.timestamp)
    }

    /// Key timestamp governing the first slot
    pub fn first_key_timestamp(&self) -> Option<Timestamp> {
        self.entries.first().map(|e| e.key_timestamp)
    }

    /// Start times of all logical frames in milliseconds; frame 0 starts at 0
    pub fn start_times(&self) -> &[f64] {
        &self.start_times
    }

    pub fn frame_time(&self, frame: usize) -> Option<f64> {
        self.start_times.get(frame).copied()
    }

    /// How long a logical frame is displayed.
    /// The last frame lasts as long as the one before it.
    pub fn frame_duration(&self, frame: usize) -> Option<f64> {
        let count = self.start_times.len();
        if frame >= count {
            return None;
        }
        if frame + 1 < count {
            return Some(self.start_times[frame + 1] - self.start_times[frame]);
        }
        if count >= 2 {
            return Some(self.start_times[count - 1] - self.start_times[count - 2]);
        }
        Some(SINGLE_FRAME_DURATION_MS)
    }

    /// Total duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        let Some(last) = self.start_times.len().checked_sub(1) else {
            return 0.0;
        };
        self.start_times[last] + self.frame_duration(last).unwrap_or(0.0)
    }

    /// Last frame starting at or before `ms`; `None` once `ms` is past the end
    pub fn frame_before(&self, ms: f64) -> Option<usize> {
        let next = self.start_times.partition_point(|&start| start <= ms);
        if next < self.start_times.len() {
            return Some(next.saturating_sub(1));
        }
        (ms < self.duration_ms()).then(|| self.start_times.len() - 1)
    }

    /// Frame showing at `ms`, clamped to the first and last frames
    pub fn frame_at_time(&self, ms: f64) -> usize {
        self.start_times
            .partition_point(|&start| start <= ms)
            .saturating_sub(1)
    }
}
