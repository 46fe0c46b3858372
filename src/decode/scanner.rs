//! One forward pass over a container that builds the frame index table and
//! the image cache.
//!
//! Each video packet is decoded in turn. Packets that decode before the
//! first complete picture get leading slots with cached best-effort images;
//! later incomplete decodes continue a multi-packet frame and get no slot.
//! The scan can be driven in chunks so a caller can interleave progress
//! reporting or stop early.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::core::cancel::CancelToken;
use crate::core::config::EngineConfig;
use crate::core::time::Timestamp;
use crate::decode::decoder::{DecodeOutcome, DecodeSession, LoadError};
use crate::decode::frame_cache::{ImageCache, ImageCacheBuilder};
use crate::decode::frame_index::{FrameIndexBuilder, FrameIndexTable};
use crate::events::{EventSink, VideoEvent};
use crate::media::container::MediaSource;
use crate::media::location::MediaLocation;
use crate::media::stream_info::VideoStreamInfo;

/// Scan parameters
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub cache_capacity: usize,
    pub frame_limit: Option<usize>,
    pub stall_timeout: Duration,
    pub chunk_frames: usize,
    pub cancel: CancelToken,
    pub events: EventSink,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl ScanOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            cache_capacity: config.cache_capacity,
            frame_limit: config.frame_limit,
            stall_timeout: config.stall_timeout(),
            chunk_frames: config.load_chunk_frames.max(1),
            cancel: CancelToken::new(),
            events: EventSink::disabled(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }
}

/// Where a chunked scan stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// More packets remain
    Pending,
    /// End of stream or frame limit reached
    Finished,
}

/// Everything a finished scan hands over
#[derive(Debug)]
pub struct ScanResult {
    pub location: MediaLocation,
    pub stream: VideoStreamInfo,
    pub index: FrameIndexTable,
    pub cache: ImageCache,
}

pub struct ContainerScanner {
    session: DecodeSession,
    options: ScanOptions,
    index: FrameIndexBuilder,
    cache: ImageCacheBuilder,
    key_timestamp: Option<Timestamp>,
    last_progress: Instant,
    stall_check: bool,
    stall_reported: bool,
    finished: bool,
}

impl ContainerScanner {
    pub fn new(source: Arc<dyn MediaSource>, location: &MediaLocation, options: ScanOptions) -> Result<Self, LoadError> {
        let session = DecodeSession::open(source, location)?;
        Ok(Self {
            cache: ImageCacheBuilder::new(options.cache_capacity),
            session,
            options,
            index: FrameIndexBuilder::new(),
            key_timestamp: None,
            last_progress: Instant::now(),
            stall_check: true,
            stall_reported: false,
            finished: false,
        })
    }

    /// Leave stall reporting to an outside watchdog
    pub fn without_stall_check(mut self) -> Self {
        self.stall_check = false;
        self
    }

    /// Location being scanned
    pub fn location(&self) -> &MediaLocation {
        self.session.location()
    }

    /// The video stream being indexed
    pub fn stream(&self) -> &VideoStreamInfo {
        self.session.stream()
    }

    /// Complete frames indexed so far
    pub fn frames(&self) -> usize {
        self.index.frames()
    }

    /// Start time of the newest indexed frame
    pub fn last_start_ms(&self) -> Option<f64> {
        self.index.last_start_ms(self.session.stream().time_base())
    }

    /// Check if the scan has reached its end
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The live picture converted to RGB
    pub fn current_image(&self) -> Option<RgbImage> {
        self.session.image()
    }

    fn limit_reached(&self) -> bool {
        self.options.frame_limit.is_some_and(|limit| self.index.frames() >= limit)
    }

    /// Index up to `max_frames` more complete frames
    pub fn scan_chunk(&mut self, max_frames: usize) -> Result<ScanStatus, LoadError> {
        let target = self.index.frames() + max_frames.max(1);
        loop {
            if self.options.cancel.is_canceled() {
                return Err(self.abort());
            }
            if self.finished || self.limit_reached() {
                self.finished = true;
                return Ok(ScanStatus::Finished);
            }
            if self.index.frames() >= target {
                return Ok(ScanStatus::Pending);
            }
            if !self.session.read_video_packet() {
                self.finished = true;
                return Ok(ScanStatus::Finished);
            }
            self.check_stall();
            self.scan_current();
        }
    }

    fn scan_current(&mut self) {
        let packet = self.session.packet();
        let (timestamp, is_key) = (packet.timestamp(), packet.is_key());
        let key = match self.key_timestamp {
            Some(key) if !is_key => key,
            _ => timestamp,
        };
        self.key_timestamp = Some(key);

        match self.session.decode_current() {
            DecodeOutcome::Complete => {
                let pts = self.session.picture().pts().unwrap_or(timestamp);
                let slot = self.index.push_complete(timestamp, key, pts);
                if self.cache.wants_bonus() {
                    if let Some(image) = self.session.image() {
                        self.cache.offer(slot, image);
                    }
                }
                self.last_progress = Instant::now();
                self.options.events.emit(VideoEvent::Progress {
                    location: self.location().to_string(),
                    frames: self.index.frames(),
                });
            }
            DecodeOutcome::Incomplete if self.index.frames() == 0 => {
                let slot = self.index.push_leading(timestamp, key);
                debug!(slot, timestamp, "leading packet without a complete picture");
                let (width, height) = (self.stream().width, self.stream().height);
                let image = self.session.image().unwrap_or_else(|| RgbImage::new(width, height));
                self.cache.insert_mandatory(slot, image);
            }
            DecodeOutcome::Incomplete => {
                debug!(timestamp, "packet continues an unfinished picture");
            }
            DecodeOutcome::Failed => {
                warn!(location = %self.location(), timestamp, "skipping undecodable packet");
            }
        }
    }

    fn check_stall(&mut self) {
        if !self.stall_check || self.stall_reported {
            return;
        }
        if self.last_progress.elapsed() >= self.options.stall_timeout {
            self.stall_reported = true;
            warn!(location = %self.location(), "no new frame within {:?}", self.options.stall_timeout);
            self.options.events.emit(VideoEvent::Stalled { location: self.location().to_string() });
        }
    }

    fn abort(&mut self) -> LoadError {
        self.session.close();
        self.finished = true;
        let location = self.location().to_string();
        info!(%location, frames = self.index.frames(), "scan canceled");
        self.options.events.emit(VideoEvent::LoadFinished { location: location.clone(), frames: None });
        LoadError::Canceled(location)
    }

    /// Scan everything that remains, chunk by chunk
    pub fn run_to_end(mut self) -> Result<ScanResult, LoadError> {
        let chunk = self.options.chunk_frames;
        while self.scan_chunk(chunk)? == ScanStatus::Pending {}
        self.finish()
    }

    /// Close the container and freeze what has been scanned so far
    pub fn finish(mut self) -> Result<ScanResult, LoadError> {
        self.session.close();
        let location = self.session.location().clone();
        let frames = self.index.frames();
        if frames == 0 {
            warn!(%location, "no complete picture found");
            self.options.events.emit(VideoEvent::LoadFinished { location: location.to_string(), frames: None });
            return Err(LoadError::NoDisplayablePicture(location.to_string()));
        }

        let stream = self.session.stream().clone();
        let index = std::mem::take(&mut self.index).build(stream.time_base());
        let cache = std::mem::take(&mut self.cache).build();
        info!(
            %location,
            frames,
            leading = index.leading_incomplete(),
            cached = cache.len(),
            duration_ms = index.duration_ms(),
            "scan finished"
        );
        self.options.events.emit(VideoEvent::LoadFinished {
            location: location.to_string(),
            frames: Some(frames),
        });
        Ok(ScanResult { location, stream, index, cache })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::synthetic::{SyntheticMedia, SyntheticSource};

    fn scan(source: &SyntheticSource, options: ScanOptions) -> Result<ScanResult, LoadError> {
        let scanner = ContainerScanner::new(Arc::new(source.clone()), &MediaLocation::parse("clip.mp4"), options)?;
        scanner.run_to_end()
    }

    #[test]
    fn test_leading_incomplete_scenario() {
        let source = SyntheticSource::new(SyntheticMedia::new(10).with_leading_incomplete(2));
        let result = scan(&source, ScanOptions::default()).unwrap();
        let index = &result.index;
        assert_eq!(index.total_entries(), 10);
        assert_eq!(index.leading_incomplete(), 2);
        assert_eq!(index.frame_count(), 8);
        assert_eq!(index.container_index(0), Some(2));
        assert!(!index.entry(0).unwrap().complete);
        // Leading slots are cached even with no bonus capacity
        assert!(result.cache.contains(0));
        assert!(result.cache.contains(1));
        assert_eq!(result.cache.len(), 2);
        assert_eq!(source.stats().open_handles(), 0);
    }

    #[test]
    fn test_key_timestamps() {
        let source = SyntheticSource::new(SyntheticMedia::new(12).with_key_interval(5));
        let result = scan(&source, ScanOptions::default()).unwrap();
        let keys: Vec<Timestamp> = result.index.entries().iter().map(|e| e.key_timestamp).collect();
        assert_eq!(keys, vec![0, 0, 0, 0, 0, 5, 5, 5, 5, 5, 10, 10]);
    }

    #[test]
    fn test_start_times_from_pts() {
        let media = SyntheticMedia::new(4).with_time_base(1, 1000, 40);
        let result = scan(&SyntheticSource::new(media), ScanOptions::default()).unwrap();
        assert_eq!(result.index.start_times(), &[0.0, 40.0, 80.0, 120.0]);
        assert!((result.index.duration_ms() - 160.0).abs() < 1e-9);
    }

    #[test]
    fn test_start_times_relative_to_first_pts() {
        let media = SyntheticMedia::new(3)
            .with_time_base(1, 1000, 1)
            .with_timestamps(&[(0, 80), (40, 120), (80, 170)]);
        let result = scan(&SyntheticSource::new(media), ScanOptions::default()).unwrap();
        assert_eq!(result.index.start_times(), &[0.0, 40.0, 90.0]);
        assert_eq!(result.index.entry(2).unwrap().timestamp, 80);
    }

    #[test]
    fn test_split_packets_get_one_slot() {
        let source = SyntheticSource::new(SyntheticMedia::new(5).with_split_packets());
        let result = scan(&source, ScanOptions::default()).unwrap();
        assert_eq!(result.index.total_entries(), 5);
        assert_eq!(result.index.frame_count(), 5);
    }

    #[test]
    fn test_bonus_cache_capacity() {
        let source = SyntheticSource::new(SyntheticMedia::new(10));
        let options = ScanOptions { cache_capacity: 3, ..ScanOptions::default() };
        let result = scan(&source, options).unwrap();
        assert_eq!(result.cache.len(), 3);
        assert_eq!(*result.cache.get(2).unwrap(), source.media().expected_image(2));
        assert!(result.cache.get(3).is_none());
    }

    #[test]
    fn test_frame_limit() {
        let source = SyntheticSource::new(SyntheticMedia::new(10));
        let options = ScanOptions { frame_limit: Some(4), ..ScanOptions::default() };
        let result = scan(&source, options).unwrap();
        assert_eq!(result.index.frame_count(), 4);
    }

    #[test]
    fn test_chunks_report_pending() {
        let source = SyntheticSource::new(SyntheticMedia::new(5));
        let mut scanner =
            ContainerScanner::new(Arc::new(source.clone()), &MediaLocation::parse("clip.mp4"), ScanOptions::default())
                .unwrap();
        assert_eq!(scanner.scan_chunk(2).unwrap(), ScanStatus::Pending);
        assert_eq!(scanner.frames(), 2);
        assert_eq!(scanner.scan_chunk(10).unwrap(), ScanStatus::Finished);
        assert_eq!(scanner.frames(), 5);
        assert!(scanner.finish().is_ok());
    }

    #[test]
    fn test_progress_and_finish_events() {
        let source = SyntheticSource::new(SyntheticMedia::new(3));
        let (events, rx) = EventSink::channel();
        scan(&source, ScanOptions::default().with_events(events)).unwrap();
        let received: Vec<VideoEvent> = rx.try_iter().collect();
        assert_eq!(received.len(), 4);
        assert_eq!(
            received[2],
            VideoEvent::Progress { location: "clip.mp4".to_string(), frames: 3 }
        );
        assert_eq!(
            received[3],
            VideoEvent::LoadFinished { location: "clip.mp4".to_string(), frames: Some(3) }
        );
    }

    #[test]
    fn test_cancel_releases_container() {
        for stop_after in 0..6 {
            let source = SyntheticSource::new(SyntheticMedia::new(6).with_audio());
            let stats = source.stats();
            let cancel = CancelToken::new();
            let (events, rx) = EventSink::channel();
            let options = ScanOptions::default().with_cancel(cancel.clone()).with_events(events);
            let mut scanner =
                ContainerScanner::new(Arc::new(source.clone()), &MediaLocation::parse("clip.mp4"), options).unwrap();
            if stop_after > 0 {
                scanner.scan_chunk(stop_after).unwrap();
            }
            let read_before = stats.packets_read();
            cancel.cancel();
            let err = scanner.scan_chunk(1).err().unwrap();
            assert!(matches!(err, LoadError::Canceled(_)));
            // Canceled before touching another packet
            assert_eq!(stats.packets_read(), read_before);
            assert_eq!(stats.open_handles(), 0);
            assert_eq!(
                rx.try_iter().last(),
                Some(VideoEvent::LoadFinished { location: "clip.mp4".to_string(), frames: None })
            );
        }
    }

    #[test]
    fn test_no_complete_picture() {
        let source = SyntheticSource::new(SyntheticMedia::new(3).with_leading_incomplete(3));
        let (events, rx) = EventSink::channel();
        let err = scan(&source, ScanOptions::default().with_events(events)).err().unwrap();
        assert!(matches!(err, LoadError::NoDisplayablePicture(_)));
        assert_eq!(source.stats().open_handles(), 0);
        let finished: Vec<VideoEvent> = rx
            .try_iter()
            .filter(|e| matches!(e, VideoEvent::LoadFinished { .. }))
            .collect();
        assert_eq!(finished, vec![VideoEvent::LoadFinished { location: "clip.mp4".to_string(), frames: None }]);
    }

    #[test]
    fn test_stall_reported_once() {
        let media = SyntheticMedia::new(4).with_read_delay(2, Duration::from_millis(30));
        let source = SyntheticSource::new(media);
        let (events, rx) = EventSink::channel();
        let options = ScanOptions { stall_timeout: Duration::from_millis(10), ..ScanOptions::default() }.with_events(events);
        let result = scan(&source, options).unwrap();
        assert_eq!(result.index.frame_count(), 4);
        let stalls = rx.try_iter().filter(|e| matches!(e, VideoEvent::Stalled { .. })).count();
        assert_eq!(stalls, 1);
    }
}
