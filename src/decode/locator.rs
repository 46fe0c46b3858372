//! Random access to frames by decoding.
//!
//! The locator keeps its own decode session positioned wherever the last
//! request left it and picks the cheapest way to the requested slot:
//! use the current picture, step forward from it, or find the governing
//! key packet (reading forward, seeking, or rewinding) and step forward
//! from there.

use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, trace};

use crate::core::time::Timestamp;
use crate::decode::decoder::{DecodeOutcome, DecodeSession, LoadError};
use crate::decode::frame_index::FrameIndexTable;
use crate::media::container::{MediaSource, SeekDirection};
use crate::media::location::MediaLocation;

/// How often each path was taken
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocatorStats {
    pub positioned: usize,
    pub forward_steps: usize,
    pub linear_reads: usize,
    pub key_seeks: usize,
    pub rewinds: usize,
    pub reopens: usize,
    pub misses: usize,
}

pub struct FrameLocator {
    session: DecodeSession,
    forward_window: Timestamp,
    stats: LocatorStats,
}

impl FrameLocator {
    /// `forward_window_secs`: key packets closer than this are reached by reading forward
    pub fn open(source: Arc<dyn MediaSource>, location: &MediaLocation, forward_window_secs: f64) -> Result<Self, LoadError> {
        let session = DecodeSession::open(source, location)?;
        let forward_window = session.stream().time_base().ticks_for(forward_window_secs);
        Ok(Self { session, forward_window, stats: LocatorStats::default() })
    }

    pub fn stats(&self) -> &LocatorStats {
        &self.stats
    }

    /// Decode the picture of a container slot.
    /// `None` when it cannot be reached or does not decode to a complete picture.
    pub fn locate(&mut self, table: &FrameIndexTable, slot: usize) -> Option<RgbImage> {
        let entry = *table.entry(slot)?;
        let (target, key) = (entry.timestamp, entry.key_timestamp);

        let current = self.session.current_timestamp().filter(|_| self.session.is_decoded());
        let loaded = match current {
            Some(c) if c == target => {
                self.stats.positioned += 1;
                true
            }
            Some(c) if c >= key && c < target => {
                self.stats.forward_steps += 1;
                self.advance() && self.step_to(table, slot)
            }
            _ => {
                trace!(slot, target, key, "locating key packet");
                self.find_key_packet(table, key)
                    && self.session.decode_current() != DecodeOutcome::Failed
                    && self.step_to(table, slot)
            }
        };

        if loaded && self.session.picture().is_complete() && self.session.current_timestamp() == Some(target) {
            return self.session.image();
        }
        self.stats.misses += 1;
        debug!(slot, target, at = ?self.session.current_timestamp(), "frame not located");
        None
    }

    /// Read and decode the next video packet
    fn advance(&mut self) -> bool {
        self.session.read_video_packet() && self.session.decode_current() != DecodeOutcome::Failed
    }

    /// Decode forward until the current packet's slot reaches `slot`
    fn step_to(&mut self, table: &FrameIndexTable, slot: usize) -> bool {
        loop {
            let reached = self
                .session
                .current_timestamp()
                .and_then(|ts| table.slot_of_timestamp(ts))
                .is_some_and(|current| current >= slot);
            if reached {
                return true;
            }
            if !self.advance() {
                return false;
            }
        }
    }

    /// Read until the key packet with `key` is current or one past it is.
    /// Returns the timestamp difference `key - current` left over on a miss.
    fn read_to_key(&mut self, key: Timestamp) -> Result<(), Timestamp> {
        while self.session.read_video_packet() {
            let Some(ts) = self.session.current_timestamp() else {
                break;
            };
            if ts == key && self.session.current_is_key() {
                return Ok(());
            }
            if ts > key {
                return Err(key - ts);
            }
        }
        Err(0)
    }

    /// Position the session on the key packet, leaving it undecoded
    fn find_key_packet(&mut self, table: &FrameIndexTable, key: Timestamp) -> bool {
        let current = self.session.current_timestamp();
        if current == Some(key) {
            return true;
        }
        let from = current.or_else(|| table.first_timestamp()).unwrap_or(0);
        let mut delta = key - from;

        if delta > 0 && delta < self.forward_window {
            self.stats.linear_reads += 1;
            match self.read_to_key(key) {
                Ok(()) => return true,
                Err(0) => {}
                Err(left) => delta = left,
            }
        }

        if delta > 0 && self.session.seek_key(key, SeekDirection::Forward) {
            self.stats.key_seeks += 1;
            match self.read_to_key(key) {
                Ok(()) => return true,
                Err(0) => {}
                Err(left) => delta = left,
            }
        }

        if table.first_key_timestamp() == Some(key) {
            if !self.session.is_fresh() {
                self.stats.rewinds += 1;
                self.reset();
            }
            return self.session.read_video_packet();
        }

        if delta < 0 && self.session.seek_key(key, SeekDirection::Backward) {
            self.stats.key_seeks += 1;
            if self.read_to_key(key).is_ok() {
                return true;
            }
        }

        debug!(key, "seeks exhausted, reading from the start");
        self.stats.rewinds += 1;
        self.reset();
        self.read_to_key(key).is_ok()
    }

    fn reset(&mut self) {
        // Only a reopen leaves the session fresh
        if self.session.reset() && self.session.is_fresh() {
            self.stats.reopens += 1;
        }
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::scanner::{ContainerScanner, ScanOptions};
    use crate::media::synthetic::{SyntheticMedia, SyntheticSource};

    fn setup(media: SyntheticMedia) -> (SyntheticSource, FrameIndexTable, FrameLocator) {
        let source = SyntheticSource::new(media);
        let location = MediaLocation::parse("clip.mp4");
        let scan = ContainerScanner::new(Arc::new(source.clone()), &location, ScanOptions::default())
            .unwrap()
            .run_to_end()
            .unwrap();
        let locator = FrameLocator::open(Arc::new(source.clone()), &location, 1.0).unwrap();
        (source, scan.index, locator)
    }

    fn frame(table: &FrameIndexTable, locator: &mut FrameLocator, n: usize) -> Option<RgbImage> {
        let slot = table.container_index(n)?;
        locator.locate(table, slot)
    }

    #[test]
    fn test_fresh_locator_single_key_seek() {
        // Frames 400 ms apart, keys every 4 frames, so frame 5 needs key 1600
        let media = SyntheticMedia::new(10).with_time_base(1, 1000, 400).with_key_interval(4);
        let (source, table, mut locator) = setup(media);
        let seeks_before = source.stats().key_seeks();

        let image = frame(&table, &mut locator, 5).unwrap();
        assert_eq!(image, source.media().expected_image(2000));
        assert_eq!(source.stats().key_seeks() - seeks_before, 1);
        assert_eq!(locator.stats().key_seeks, 1);
        assert_eq!(source.stats().backward_seeks(), 0);
    }

    #[test]
    fn test_forward_walk_never_seeks_backward() {
        let media = SyntheticMedia::new(60).with_key_interval(7).with_audio();
        let (source, table, mut locator) = setup(media);
        for n in 0..table.frame_count() {
            let ts = table.entry(table.container_index(n).unwrap()).unwrap().timestamp;
            assert_eq!(frame(&table, &mut locator, n), Some(source.media().expected_image(ts)), "frame {}", n);
        }
        assert_eq!(source.stats().backward_seeks(), 0);
        assert_eq!(locator.stats().misses, 0);
    }

    #[test]
    fn test_same_frame_twice() {
        let (_, table, mut locator) = setup(SyntheticMedia::new(30));
        let first = frame(&table, &mut locator, 17);
        let second = frame(&table, &mut locator, 17);
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(locator.stats().positioned, 1);
    }

    #[test]
    fn test_out_of_range_then_valid() {
        let (source, table, mut locator) = setup(SyntheticMedia::new(20));
        assert!(frame(&table, &mut locator, 20).is_none());
        assert!(locator.locate(&table, 99).is_none());
        assert_eq!(frame(&table, &mut locator, 19), Some(source.media().expected_image(19)));
    }

    #[test]
    fn test_backward_request_seeks_back() {
        let media = SyntheticMedia::new(100).with_key_interval(10);
        let (source, table, mut locator) = setup(media);
        frame(&table, &mut locator, 90).unwrap();
        assert_eq!(frame(&table, &mut locator, 45), Some(source.media().expected_image(45)));
        assert_eq!(source.stats().backward_seeks(), 1);
    }

    #[test]
    fn test_first_key_rewinds() {
        let (source, table, mut locator) = setup(SyntheticMedia::new(40));
        let rewinds = source.stats().rewinds();
        frame(&table, &mut locator, 35).unwrap();
        assert_eq!(frame(&table, &mut locator, 3), Some(source.media().expected_image(3)));
        assert_eq!(source.stats().rewinds() - rewinds, 1);
        assert_eq!(source.stats().backward_seeks(), 0);
    }

    #[test]
    fn test_leading_packets_decode_through() {
        let (source, table, mut locator) = setup(SyntheticMedia::new(10).with_leading_incomplete(2));
        assert_eq!(frame(&table, &mut locator, 0), Some(source.media().expected_image(2)));
        assert_eq!(frame(&table, &mut locator, 7), Some(source.media().expected_image(9)));
    }

    #[test]
    fn test_unseekable_source_reopens() {
        let media = SyntheticMedia::new(50).with_key_interval(10).non_seekable();
        let (source, table, mut locator) = setup(media);
        frame(&table, &mut locator, 45).unwrap();
        assert_eq!(frame(&table, &mut locator, 25), Some(source.media().expected_image(25)));
        assert!(locator.stats().reopens >= 1);
        assert_eq!(source.stats().open_handles(), 1);
        locator.close();
        assert_eq!(source.stats().open_handles(), 0);
    }

    #[test]
    fn test_split_packets() {
        let (source, table, mut locator) = setup(SyntheticMedia::new(12).with_split_packets().with_key_interval(4));
        assert_eq!(frame(&table, &mut locator, 9), Some(source.media().expected_image(9)));
        assert_eq!(frame(&table, &mut locator, 2), Some(source.media().expected_image(2)));
    }
}
