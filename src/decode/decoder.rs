//! Single-owner decode session: one open container, its video stream, a
//! reusable packet and a reusable picture.
//! The scanner and the locator each drive their own session.

use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, warn};

use crate::core::time::Timestamp;
use crate::media::container::{ContainerError, MediaContainer, MediaSource, Packet, Picture, SeekDirection};
use crate::media::location::MediaLocation;
use crate::media::stream_info::{StreamKind, VideoStreamInfo};

/// Error type for opening and scanning a video
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Unable to open {location}: {source}")]
    Open { location: String, source: ContainerError },
    #[error("No video stream in {0}")]
    NoVideoStream(String),
    #[error("Unable to open video decoder for {location}: {source}")]
    DecoderOpen { location: String, source: ContainerError },
    #[error("No displayable picture in {0}")]
    NoDisplayablePicture(String),
    #[error("Loading {0} was canceled")]
    Canceled(String),
    #[error("Background scan failed: {0}")]
    Worker(String),
}

/// Result of feeding the current packet to the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The picture now holds a whole frame
    Complete,
    /// The packet was consumed without finishing a frame
    Incomplete,
    /// The decoder rejected the packet
    Failed,
}

pub struct DecodeSession {
    source: Arc<dyn MediaSource>,
    location: MediaLocation,
    container: Option<Box<dyn MediaContainer>>,
    stream: VideoStreamInfo,
    packet: Packet,
    picture: Picture,
    decoded: bool,
    fresh: bool,
}

impl DecodeSession {
    /// Open the container, pick its first video stream and open that stream's decoder.
    /// Nothing stays open when this fails.
    pub fn open(source: Arc<dyn MediaSource>, location: &MediaLocation) -> Result<Self, LoadError> {
        let (container, stream) = Self::open_container(source.as_ref(), location)?;
        let picture = Picture::new(stream.pixel_layout, stream.width, stream.height);
        Ok(Self {
            source,
            location: location.clone(),
            container: Some(container),
            stream,
            packet: Packet::new(),
            picture,
            decoded: false,
            fresh: true,
        })
    }

    fn open_container(
        source: &dyn MediaSource,
        location: &MediaLocation,
    ) -> Result<(Box<dyn MediaContainer>, VideoStreamInfo), LoadError> {
        let mut container = source.open(location).map_err(|source| LoadError::Open {
            location: location.to_string(),
            source,
        })?;

        let video = container
            .streams()
            .iter()
            .find(|s| s.kind == StreamKind::Video)
            .cloned();
        let format = video.as_ref().and_then(|s| container.picture_format(s.index));
        let (stream_info, (pixel_layout, width, height)) = match (video, format) {
            (Some(stream_info), Some(format)) => (stream_info, format),
            _ => {
                container.close();
                return Err(LoadError::NoVideoStream(location.to_string()));
            }
        };

        if let Err(source) = container.open_decoder(stream_info.index) {
            container.close();
            return Err(LoadError::DecoderOpen { location: location.to_string(), source });
        }

        debug!(
            %location,
            stream = stream_info.index,
            codec = %stream_info.codec_name,
            time_base = %stream_info.time_base,
            width,
            height,
            "opened video stream"
        );
        Ok((container, VideoStreamInfo { stream_info, width, height, pixel_layout }))
    }

    pub fn stream(&self) -> &VideoStreamInfo {
        &self.stream
    }

    pub fn location(&self) -> &MediaLocation {
        &self.location
    }

    /// Nothing has been read since the container was opened
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Timestamp of the current video packet, if there is one
    pub fn current_timestamp(&self) -> Option<Timestamp> {
        self.packet.is_filled().then(|| self.packet.timestamp())
    }

    pub fn current_is_key(&self) -> bool {
        self.packet.is_filled() && self.packet.is_key()
    }

    /// The current packet has been fed to the decoder
    pub fn is_decoded(&self) -> bool {
        self.packet.is_filled() && self.decoded
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn picture(&self) -> &Picture {
        &self.picture
    }

    /// Convert the picture as it stands, complete or not
    pub fn image(&self) -> Option<RgbImage> {
        match self.picture.to_rgb() {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(location = %self.location, "picture conversion failed: {}", e);
                None
            }
        }
    }

    /// Read packets until one belongs to the video stream.
    /// Returns false at end of stream; read errors end the stream too.
    pub fn read_video_packet(&mut self) -> bool {
        let Some(container) = self.container.as_mut() else {
            return false;
        };
        self.fresh = false;
        self.decoded = false;
        loop {
            match container.read_packet(&mut self.packet) {
                Ok(true) if self.packet.stream_index() == self.stream.index() => return true,
                Ok(true) => continue,
                Ok(false) => return false,
                Err(e) => {
                    warn!(location = %self.location, "read failed, treating as end of stream: {}", e);
                    self.packet.clear();
                    return false;
                }
            }
        }
    }

    /// Feed the current packet to the decoder, stopping at the first complete picture
    pub fn decode_current(&mut self) -> DecodeOutcome {
        let Some(container) = self.container.as_mut() else {
            return DecodeOutcome::Failed;
        };
        if !self.packet.is_filled() {
            return DecodeOutcome::Failed;
        }
        self.decoded = true;
        self.picture.set_incomplete();

        let size = self.packet.len();
        let mut offset = 0;
        while offset < size {
            match container.decode(&mut self.picture, &self.packet, offset) {
                Ok(0) => break,
                Ok(consumed) => offset += consumed,
                Err(e) => {
                    debug!(timestamp = self.packet.timestamp(), "decode failed: {}", e);
                    return DecodeOutcome::Failed;
                }
            }
            if self.picture.is_complete() {
                return DecodeOutcome::Complete;
            }
        }
        DecodeOutcome::Incomplete
    }

    /// Seek to a key frame of the video stream. The current packet is forgotten.
    pub fn seek_key(&mut self, timestamp: Timestamp, direction: SeekDirection) -> bool {
        let Some(container) = self.container.as_mut() else {
            return false;
        };
        self.packet.clear();
        match container.seek_key_frame(self.stream.index(), timestamp, direction) {
            Ok(()) => true,
            Err(e) => {
                debug!(timestamp, ?direction, "key seek failed: {}", e);
                false
            }
        }
    }

    /// Seek back to the first packet. Fails on non-seekable sources.
    pub fn rewind(&mut self) -> bool {
        let Some(container) = self.container.as_mut() else {
            return false;
        };
        self.packet.clear();
        match container.rewind() {
            Ok(()) => true,
            Err(e) => {
                debug!(location = %self.location, "rewind failed: {}", e);
                false
            }
        }
    }

    /// Close the container and open the same location afresh
    pub fn reopen(&mut self) -> Result<(), LoadError> {
        self.close();
        let (container, stream) = Self::open_container(self.source.as_ref(), &self.location)?;
        self.picture.reshape(stream.pixel_layout, stream.width, stream.height);
        self.stream = stream;
        self.container = Some(container);
        self.fresh = true;
        Ok(())
    }

    /// Back to the start: rewind, or reopen when the source cannot seek
    pub fn reset(&mut self) -> bool {
        if self.rewind() {
            return true;
        }
        match self.reopen() {
            Ok(()) => true,
            Err(e) => {
                warn!(location = %self.location, "container could not be reset: {}", e);
                false
            }
        }
    }

    /// Release the container. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(mut container) = self.container.take() {
            container.close();
            self.packet.clear();
            self.decoded = false;
            debug!(location = %self.location, "closed decode session");
        }
    }
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        self.close();
    }
}
