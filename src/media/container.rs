//! The decoding capability the engine consumes.
//! A `MediaContainer` is one open demuxer plus the decoder of its video
//! stream. Packets and pictures are caller-owned buffers refilled in place.

use crate::core::time::Timestamp;
use crate::media::location::MediaLocation;
use crate::media::pixel::PixelLayout;
use crate::media::stream_info::StreamInfo;

/// Error type for container operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    #[error("Unable to open {0}")]
    Open(String),
    #[error("Read failed: {0}")]
    Read(String),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Seek failed: {0}")]
    Seek(String),
    #[error("Unable to open decoder: {0}")]
    DecoderOpen(String),
}

/// Compressed data read from a container, reused across reads
#[derive(Debug, Clone, Default)]
pub struct Packet {
    stream_index: usize,
    timestamp: Timestamp,
    pts: Option<Timestamp>,
    key: bool,
    data: Vec<u8>,
    filled: bool,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite this packet with freshly read data
    pub fn fill(&mut self, stream_index: usize, timestamp: Timestamp, pts: Option<Timestamp>, key: bool, data: &[u8]) {
        self.stream_index = stream_index;
        self.timestamp = timestamp;
        self.pts = pts;
        self.key = key;
        self.data.clear();
        self.data.extend_from_slice(data);
        self.filled = true;
    }

    /// Forget the current contents (end of stream, seek, reopen)
    pub fn clear(&mut self) {
        self.data.clear();
        self.filled = false;
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Decode-order timestamp in stream ticks
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn pts(&self) -> Option<Timestamp> {
        self.pts
    }

    pub fn is_key(&self) -> bool {
        self.key
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Decode target, complete once a whole visible frame has been reconstructed
#[derive(Debug, Clone)]
pub struct Picture {
    layout: PixelLayout,
    width: u32,
    height: u32,
    data: Vec<u8>,
    pts: Option<Timestamp>,
    complete: bool,
}

impl Picture {
    /// Allocate a zeroed picture
    pub fn new(layout: PixelLayout, width: u32, height: u32) -> Self {
        Self {
            layout,
            width,
            height,
            data: vec![0; layout.buffer_size(width, height)],
            pts: None,
            complete: false,
        }
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel buffer for decoders to write into
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pts(&self) -> Option<Timestamp> {
        self.pts
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Called by decoders when the buffer holds a whole frame
    pub fn set_complete(&mut self, pts: Option<Timestamp>) {
        self.pts = pts;
        self.complete = true;
    }

    /// Called by decoders before feeding data that may not finish a frame
    pub fn set_incomplete(&mut self) {
        self.complete = false;
    }

    /// Reallocate when the decoder switches size or layout mid-stream
    pub fn reshape(&mut self, layout: PixelLayout, width: u32, height: u32) {
        if layout != self.layout || width != self.width || height != self.height {
            *self = Picture::new(layout, width, height);
        }
    }

    /// Convert the current buffer, complete or not
    pub fn to_rgb(&self) -> Result<image::RgbImage, crate::media::pixel::ConvertError> {
        self.layout.to_rgb(&self.data, self.width, self.height)
    }
}

/// Direction of a key-frame seek
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    /// Nearest key frame at or before the target
    Backward,
    /// Nearest key frame at or after the target
    Forward,
}

/// One open container with a decoder for its video stream.
/// Not shareable: a single owner drives reads, decodes and seeks.
pub trait MediaContainer: Send {
    /// Streams in container order
    fn streams(&self) -> &[StreamInfo];

    /// Width, height and layout of decoded pictures for a video stream
    fn picture_format(&self, stream_index: usize) -> Option<(PixelLayout, u32, u32)>;

    /// Initialise the decoder for the chosen stream
    fn open_decoder(&mut self, stream_index: usize) -> Result<(), ContainerError>;

    /// Read the next packet of any stream. Returns false at end of stream.
    fn read_packet(&mut self, packet: &mut Packet) -> Result<bool, ContainerError>;

    /// Feed the packet bytes starting at `offset` into `picture`.
    /// Returns the number of bytes consumed; the picture's completeness flag
    /// tells whether a whole frame is now available.
    fn decode(&mut self, picture: &mut Picture, packet: &Packet, offset: usize) -> Result<usize, ContainerError>;

    /// Seek the video stream to a key frame near `timestamp`; flushes the decoder
    fn seek_key_frame(&mut self, stream_index: usize, timestamp: Timestamp, direction: SeekDirection) -> Result<(), ContainerError>;

    /// Seek back to the first packet; fails on non-seekable sources
    fn rewind(&mut self) -> Result<(), ContainerError>;

    /// Release the native handle. Must be idempotent.
    fn close(&mut self);
}

/// Opens containers for locations; one per decoding back end
pub trait MediaSource: Send + Sync {
    fn open(&self, location: &MediaLocation) -> Result<Box<dyn MediaContainer>, ContainerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_fill_and_clear() {
        let mut packet = Packet::new();
        assert!(!packet.is_filled());
        packet.fill(1, 42, Some(44), true, &[1, 2, 3]);
        assert!(packet.is_filled());
        assert_eq!(packet.timestamp(), 42);
        assert_eq!(packet.pts(), Some(44));
        assert_eq!(packet.len(), 3);
        packet.clear();
        assert!(!packet.is_filled());
        assert!(packet.is_empty());
    }

    #[test]
    fn test_picture_reshape_only_on_change() {
        let mut picture = Picture::new(PixelLayout::Rgb24, 2, 2);
        picture.data_mut()[0] = 9;
        picture.reshape(PixelLayout::Rgb24, 2, 2);
        assert_eq!(picture.data()[0], 9);
        picture.reshape(PixelLayout::Gray8, 4, 4);
        assert_eq!(picture.data().len(), 16);
        assert!(!picture.is_complete());
    }
}
