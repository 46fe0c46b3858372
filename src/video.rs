//! An opened, fully indexed video.
//!
//! `Video` joins the scan result (frame index and image cache) with a frame
//! locator for everything the cache does not hold. Frame numbers here are
//! logical: leading incomplete packets are skipped.

use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, info};

use crate::core::cancel::CancelToken;
use crate::core::config::EngineConfig;
use crate::decode::decoder::LoadError;
use crate::decode::frame_cache::ImageCache;
use crate::decode::frame_index::FrameIndexTable;
use crate::decode::locator::{FrameLocator, LocatorStats};
use crate::decode::scanner::{ContainerScanner, ScanOptions, ScanResult};
use crate::events::EventSink;
use crate::media::container::MediaSource;
use crate::media::location::MediaLocation;
use crate::media::stream_info::VideoStreamInfo;

pub struct Video {
    location: MediaLocation,
    stream: VideoStreamInfo,
    index: FrameIndexTable,
    cache: ImageCache,
    locator: Option<FrameLocator>,
    frame_limit: Option<usize>,
    initial_frame: usize,
}

impl Video {
    /// Scan the whole container, then open a session for random access
    pub fn open(
        source: Arc<dyn MediaSource>,
        location: &MediaLocation,
        config: &EngineConfig,
        events: EventSink,
        cancel: CancelToken,
    ) -> Result<Self, LoadError> {
        info!(%location, "opening video");
        let options = ScanOptions::from_config(config).with_events(events).with_cancel(cancel);
        let scan = ContainerScanner::new(Arc::clone(&source), location, options)?.run_to_end()?;
        Self::from_scan(source, scan, config)
    }

    /// Build from a finished scan, for example one run by `scan_in_background`
    pub fn from_scan(source: Arc<dyn MediaSource>, scan: ScanResult, config: &EngineConfig) -> Result<Self, LoadError> {
        let ScanResult { location, stream, index, cache } = scan;
        let locator = FrameLocator::open(source, &location, config.forward_window_secs)?;
        let mut video = Self {
            location,
            stream,
            index,
            cache,
            locator: Some(locator),
            frame_limit: config.frame_limit,
            initial_frame: 0,
        };

        let initial = (0..video.frame_count()).find(|&n| video.image(n).is_some());
        match initial {
            Some(frame) => {
                video.initial_frame = frame;
                info!(
                    location = %video.location,
                    frames = video.frame_count(),
                    initial = frame,
                    "video ready"
                );
                Ok(video)
            }
            None => {
                video.dispose();
                Err(LoadError::NoDisplayablePicture(video.location.to_string()))
            }
        }
    }

    /// Image of a logical frame: from the cache when present, else decoded.
    /// `None` for frames out of range, frames that fail to decode, and after dispose.
    pub fn image(&mut self, frame: usize) -> Option<Arc<RgbImage>> {
        let slot = self.index.container_index(frame)?;
        if let Some(image) = self.cache.get(slot) {
            return Some(image);
        }
        let locator = self.locator.as_mut()?;
        locator.locate(&self.index, slot).map(Arc::new)
    }

    /// Number of logical frames
    pub fn frame_count(&self) -> usize {
        self.index.frame_count()
    }

    /// First frame that produced an image when the video was opened
    pub fn initial_frame(&self) -> usize {
        self.initial_frame
    }

    /// Start time of a logical frame in milliseconds
    pub fn frame_time(&self, frame: usize) -> Option<f64> {
        self.index.frame_time(frame)
    }

    /// Display duration of a logical frame in milliseconds
    pub fn frame_duration(&self, frame: usize) -> Option<f64> {
        self.index.frame_duration(frame)
    }

    /// Total duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.index.duration_ms()
    }

    /// Last frame starting at or before `ms`, or `None` past the end
    pub fn frame_before(&self, ms: f64) -> Option<usize> {
        self.index.frame_before(ms)
    }

    /// Frame showing at `ms`, clamped to the video
    pub fn frame_at_time(&self, ms: f64) -> usize {
        self.index.frame_at_time(ms)
    }

    /// The indexed video stream
    pub fn stream(&self) -> &VideoStreamInfo {
        &self.stream
    }

    /// Frame index table built by the scan
    pub fn index(&self) -> &FrameIndexTable {
        &self.index
    }

    /// Where the video was opened from
    pub fn location(&self) -> &MediaLocation {
        &self.location
    }

    /// Number of logical frames requested when the video was opened
    pub fn frame_limit(&self) -> Option<usize> {
        self.frame_limit
    }

    /// Seek path counters; `None` once disposed
    pub fn locator_stats(&self) -> Option<&LocatorStats> {
        self.locator.as_ref().map(|l| l.stats())
    }

    /// Check if the decode session has been released
    pub fn is_disposed(&self) -> bool {
        self.locator.is_none()
    }

    /// Release the decode session. Cached images stay readable.
    pub fn dispose(&mut self) {
        if let Some(mut locator) = self.locator.take() {
            locator.close();
            debug!(location = %self.location, "video disposed");
        }
    }
}

impl Drop for Video {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VideoEvent;
    use crate::media::pixel::PixelLayout;
    use crate::media::synthetic::{SyntheticMedia, SyntheticSource};

    fn open(source: &SyntheticSource, config: &EngineConfig) -> Result<Video, LoadError> {
        Video::open(
            Arc::new(source.clone()),
            &MediaLocation::parse("clip.mp4"),
            config,
            EventSink::disabled(),
            CancelToken::new(),
        )
    }

    #[test]
    fn test_open_and_query() {
        let source = SyntheticSource::new(SyntheticMedia::new(10).with_leading_incomplete(2).with_time_base(1, 1000, 100));
        let mut video = open(&source, &EngineConfig::default()).unwrap();
        assert_eq!(video.frame_count(), 8);
        assert_eq!(video.initial_frame(), 0);
        assert_eq!(video.frame_time(1), Some(100.0));
        assert!((video.duration_ms() - 800.0).abs() < 1e-9);
        assert_eq!(video.frame_before(250.0), Some(2));
        assert_eq!(*video.image(3).unwrap(), source.media().expected_image(500));
        assert!(video.image(8).is_none());
        assert_eq!(source.stats().open_handles(), 1);
    }

    #[test]
    fn test_cached_frames_skip_decoding() {
        let source = SyntheticSource::new(SyntheticMedia::new(10));
        let config = EngineConfig { cache_capacity: 10, ..EngineConfig::default() };
        let mut video = open(&source, &config).unwrap();
        let read = source.stats().packets_read();
        for n in (0..10).rev() {
            assert!(video.image(n).is_some());
        }
        assert_eq!(source.stats().packets_read(), read);
    }

    #[test]
    fn test_bgr_layout_converted() {
        let source = SyntheticSource::new(SyntheticMedia::new(6).with_layout(PixelLayout::Bgr24));
        let mut video = open(&source, &EngineConfig::default()).unwrap();
        let image = video.image(4).unwrap();
        assert_eq!(*image, source.media().expected_image(4));
        assert_ne!(*image, SyntheticSource::new(SyntheticMedia::new(6)).media().expected_image(4));
    }

    #[test]
    fn test_frame_limit_from_config() {
        let source = SyntheticSource::new(SyntheticMedia::new(30));
        let config = EngineConfig { frame_limit: Some(12), ..EngineConfig::default() };
        let video = open(&source, &config).unwrap();
        assert_eq!(video.frame_count(), 12);
        assert_eq!(video.frame_limit(), Some(12));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let source = SyntheticSource::new(SyntheticMedia::new(5));
        let mut video = open(&source, &EngineConfig::default()).unwrap();
        video.dispose();
        video.dispose();
        assert!(video.is_disposed());
        assert!(video.image(3).is_none());
        drop(video);
        assert_eq!(source.stats().open_handles(), 0);
    }

    #[test]
    fn test_drop_releases_session() {
        let source = SyntheticSource::new(SyntheticMedia::new(5));
        drop(open(&source, &EngineConfig::default()).unwrap());
        assert_eq!(source.stats().open_handles(), 0);
    }

    #[test]
    fn test_events_during_open() {
        let source = SyntheticSource::new(SyntheticMedia::new(2));
        let (events, rx) = EventSink::channel();
        let _video = Video::open(
            Arc::new(source),
            &MediaLocation::parse("clip.mp4"),
            &EngineConfig::default(),
            events,
            CancelToken::new(),
        )
        .unwrap();
        assert!(rx
            .try_iter()
            .any(|e| e == VideoEvent::LoadFinished { location: "clip.mp4".to_string(), frames: Some(2) }));
    }

    #[test]
    fn test_canceled_open() {
        let source = SyntheticSource::new(SyntheticMedia::new(5));
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = Video::open(
            Arc::new(source.clone()),
            &MediaLocation::parse("clip.mp4"),
            &EngineConfig::default(),
            EventSink::disabled(),
            cancel,
        )
        .err()
        .unwrap();
        assert!(matches!(err, LoadError::Canceled(_)));
        assert_eq!(source.stats().open_handles(), 0);
    }
}
