//! Stream metadata reported by a container.

use crate::core::time::Rational;
use crate::media::pixel::PixelLayout;

/// Elementary stream kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Other,
}

/// Information about one stream in a container
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: StreamKind,
    pub codec_name: String,
    pub time_base: Rational,
}

/// Video-specific stream information
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub stream_info: StreamInfo,
    pub width: u32,
    pub height: u32,
    pub pixel_layout: PixelLayout,
}

impl VideoStreamInfo {
    pub fn index(&self) -> usize {
        self.stream_info.index
    }

    pub fn time_base(&self) -> Rational {
        self.stream_info.time_base
    }
}
