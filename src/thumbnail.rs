//! Thumbnails from a partial scan.
//!
//! Only the packets up to the requested time are decoded, so a thumbnail of
//! an early frame is cheap even for long media.

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use tracing::debug;

use crate::decode::decoder::LoadError;
use crate::decode::scanner::{ContainerScanner, ScanOptions, ScanStatus};
use crate::media::container::MediaSource;
use crate::media::location::MediaLocation;

/// Error type for thumbnail capture
#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("No picture decoded from {0}")]
    NoPicture(String),
    #[error("Failed to write thumbnail: {0}")]
    Image(#[from] image::ImageError),
}

pub struct ThumbnailTool {
    source: Arc<dyn MediaSource>,
    max_width: u32,
    max_height: u32,
}

impl ThumbnailTool {
    pub fn new(source: Arc<dyn MediaSource>, max_width: u32, max_height: u32) -> Self {
        Self { source, max_width: max_width.max(1), max_height: max_height.max(1) }
    }

    /// Image of the frame showing at `at_ms` (or the last frame), scaled to fit
    pub fn capture(&self, location: &MediaLocation, at_ms: f64) -> Result<RgbImage, ThumbnailError> {
        let mut scanner = ContainerScanner::new(Arc::clone(&self.source), location, ScanOptions::default())?;
        let mut best = None;
        while scanner.scan_chunk(1)? == ScanStatus::Pending {
            let start = scanner.last_start_ms().unwrap_or(0.0);
            if start > at_ms && best.is_some() {
                break;
            }
            best = scanner.current_image();
            if start >= at_ms {
                break;
            }
        }
        let image = best.ok_or_else(|| ThumbnailError::NoPicture(location.to_string()))?;
        debug!(%location, at_ms, frames = scanner.frames(), "thumbnail captured");
        Ok(self.fit(image))
    }

    fn fit(&self, image: RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        let scale = (self.max_width as f64 / width as f64).min(self.max_height as f64 / height as f64);
        if scale >= 1.0 {
            return image;
        }
        let w = ((width as f64 * scale).round() as u32).max(1);
        let h = ((height as f64 * scale).round() as u32).max(1);
        image::imageops::thumbnail(&image, w, h)
    }

    /// Capture and save as PNG
    pub fn write_png<P: AsRef<Path>>(&self, location: &MediaLocation, at_ms: f64, out: P) -> Result<(), ThumbnailError> {
        let image = self.capture(location, at_ms)?;
        image.save_with_format(out, image::ImageFormat::Png)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::synthetic::{SyntheticMedia, SyntheticSource};

    fn source() -> SyntheticSource {
        SyntheticSource::new(SyntheticMedia::new(30).with_time_base(1, 1000, 100))
    }

    fn location() -> MediaLocation {
        MediaLocation::parse("clip.mp4")
    }

    #[test]
    fn test_capture_stops_early() {
        let source = source();
        let tool = ThumbnailTool::new(Arc::new(source.clone()), 64, 64);
        let image = tool.capture(&location(), 430.0).unwrap();
        assert_eq!(image, source.media().expected_image(400));
        assert!(source.stats().packets_read() < 10);
        assert_eq!(source.stats().open_handles(), 0);
    }

    #[test]
    fn test_exact_frame_time() {
        let source = source();
        let tool = ThumbnailTool::new(Arc::new(source.clone()), 64, 64);
        assert_eq!(tool.capture(&location(), 500.0).unwrap(), source.media().expected_image(500));
    }

    #[test]
    fn test_past_end_gives_last_frame() {
        let source = source();
        let tool = ThumbnailTool::new(Arc::new(source.clone()), 64, 64);
        assert_eq!(tool.capture(&location(), 1e9).unwrap(), source.media().expected_image(2900));
    }

    #[test]
    fn test_scaled_to_fit() {
        let tool = ThumbnailTool::new(Arc::new(source()), 4, 4);
        let image = tool.capture(&location(), 0.0).unwrap();
        assert_eq!(image.dimensions(), (4, 3));
    }

    #[test]
    fn test_write_png() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("thumb.png");
        let tool = ThumbnailTool::new(Arc::new(source()), 4, 4);
        tool.write_png(&location(), 200.0, &out).unwrap();
        let saved = image::open(&out).unwrap();
        assert_eq!((saved.width(), saved.height()), (4, 3));
    }

    #[test]
    fn test_open_failure() {
        let tool = ThumbnailTool::new(Arc::new(SyntheticSource::unopenable()), 4, 4);
        let err = tool.capture(&location(), 0.0).unwrap_err();
        assert!(matches!(err, ThumbnailError::Load(LoadError::Open { .. })));
    }
}
