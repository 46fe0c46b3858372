//! Scripted in-memory container.
//!
//! Stands in for a native decoder: every packet's key flag, timestamp and
//! decodability is spelled out up front, decoded pictures carry a pattern
//! derived from the packet timestamp, and the source counts open handles,
//! reads and seeks so callers can check resource release and seek paths.
//!
//! Decoding follows reference rules loosely modeled on real codecs: a
//! non-key packet only completes a picture after a key packet has been
//! decoded since the last open, seek or rewind.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;

use crate::core::time::{Rational, Timestamp};
use crate::media::container::{ContainerError, MediaContainer, MediaSource, Packet, Picture, SeekDirection};
use crate::media::location::MediaLocation;
use crate::media::pixel::PixelLayout;
use crate::media::stream_info::{StreamInfo, StreamKind};

/// One packet of the script
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedPacket {
    pub stream_index: usize,
    pub timestamp: Timestamp,
    pub pts: Option<Timestamp>,
    pub key: bool,
    /// Decoding this packet finishes a picture, given a reference frame
    pub completes: bool,
    pub size: usize,
}

/// Description of a synthetic media file
#[derive(Debug, Clone)]
pub struct SyntheticMedia {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub time_base: Rational,
    pub video_stream: Option<usize>,
    pub audio_stream: Option<usize>,
    pub packets: Vec<ScriptedPacket>,
    pub seekable: bool,
    pub decoder_fails: bool,
    /// Bytes consumed per decode call
    pub chunk: usize,
    /// Sleep once before reading the packet at this position
    pub read_delay: Option<(usize, Duration)>,
}

const DEFAULT_CHUNK: usize = 4;

impl SyntheticMedia {
    /// `frames` video packets at 30 fps, one tick per frame, key every 10
    pub fn new(frames: usize) -> Self {
        let packets = (0..frames)
            .map(|i| ScriptedPacket {
                stream_index: 0,
                timestamp: i as Timestamp,
                pts: Some(i as Timestamp),
                key: i % 10 == 0,
                completes: true,
                size: DEFAULT_CHUNK,
            })
            .collect();
        Self {
            width: 8,
            height: 6,
            layout: PixelLayout::Rgb24,
            time_base: Rational::new(1, 30),
            video_stream: Some(0),
            audio_stream: None,
            packets,
            seekable: true,
            decoder_fails: false,
            chunk: DEFAULT_CHUNK,
            read_delay: None,
        }
    }

    pub fn with_key_interval(mut self, interval: usize) -> Self {
        let interval = interval.max(1);
        for (i, packet) in self.video_packets_mut().enumerate() {
            packet.key = i % interval == 0;
        }
        self
    }

    /// Mark the first `count` video packets as unable to finish a picture
    pub fn with_leading_incomplete(mut self, count: usize) -> Self {
        for (i, packet) in self.video_packets_mut().enumerate() {
            packet.completes = i >= count;
        }
        self
    }

    /// Space video timestamps `ticks_per_frame` apart in the given time base
    pub fn with_time_base(mut self, num: i32, den: i32, ticks_per_frame: Timestamp) -> Self {
        self.time_base = Rational::new(num, den);
        for (i, packet) in self.video_packets_mut().enumerate() {
            packet.timestamp = i as Timestamp * ticks_per_frame;
            packet.pts = Some(packet.timestamp);
        }
        self
    }

    /// Interleave an audio packet before every video packet; video moves to stream 1
    pub fn with_audio(mut self) -> Self {
        let mut packets = Vec::with_capacity(self.packets.len() * 2);
        for packet in self.packets.drain(..) {
            packets.push(ScriptedPacket {
                stream_index: 0,
                timestamp: packet.timestamp,
                pts: packet.pts,
                key: true,
                completes: false,
                size: 2,
            });
            packets.push(ScriptedPacket { stream_index: 1, ..packet });
        }
        self.packets = packets;
        self.audio_stream = Some(0);
        self.video_stream = Some(1);
        self
    }

    /// Only an audio stream
    pub fn without_video(mut self) -> Self {
        for packet in &mut self.packets {
            packet.completes = false;
        }
        self.audio_stream = self.video_stream.take();
        self
    }

    pub fn non_seekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    pub fn failing_decoder(mut self) -> Self {
        self.decoder_fails = true;
        self
    }

    pub fn with_layout(mut self, layout: PixelLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Each video packet needs two decode calls
    pub fn with_split_packets(mut self) -> Self {
        let size = self.chunk * 2;
        for packet in self.video_packets_mut() {
            packet.size = size;
        }
        self
    }

    pub fn with_read_delay(mut self, position: usize, delay: Duration) -> Self {
        self.read_delay = Some((position, delay));
        self
    }

    /// Override decode-order timestamps and presentation timestamps per video packet
    pub fn with_timestamps(mut self, stamps: &[(Timestamp, Timestamp)]) -> Self {
        for (packet, &(dts, pts)) in self.video_packets_mut().zip(stamps) {
            packet.timestamp = dts;
            packet.pts = Some(pts);
        }
        self
    }

    fn video_packets_mut(&mut self) -> impl Iterator<Item = &mut ScriptedPacket> {
        let video = self.video_stream;
        self.packets.iter_mut().filter(move |p| Some(p.stream_index) == video)
    }

    /// Video packets in decode order
    pub fn video_packets(&self) -> impl Iterator<Item = &ScriptedPacket> {
        self.packets.iter().filter(move |p| Some(p.stream_index) == self.video_stream)
    }

    fn streams(&self) -> Vec<StreamInfo> {
        let mut streams = Vec::new();
        if let Some(index) = self.audio_stream {
            streams.push(StreamInfo {
                index,
                kind: StreamKind::Audio,
                codec_name: "pcm_synthetic".to_string(),
                time_base: self.time_base,
            });
        }
        if let Some(index) = self.video_stream {
            streams.push(StreamInfo {
                index,
                kind: StreamKind::Video,
                codec_name: "synthetic".to_string(),
                time_base: self.time_base,
            });
        }
        streams.sort_by_key(|s| s.index);
        streams
    }

    /// The image a complete decode of the packet with this timestamp produces
    pub fn expected_image(&self, timestamp: Timestamp) -> RgbImage {
        let mut picture = Picture::new(self.layout, self.width, self.height);
        paint(&mut picture, timestamp);
        picture.to_rgb().unwrap_or_else(|_| RgbImage::new(self.width, self.height))
    }
}

fn paint(picture: &mut Picture, timestamp: Timestamp) {
    let seed = timestamp.unsigned_abs();
    for (i, byte) in picture.data_mut().iter_mut().enumerate() {
        *byte = ((seed.wrapping_mul(31) + i as u64 * 7) % 251) as u8;
    }
}

/// Counters shared by a source and every container it opened
#[derive(Debug, Default)]
pub struct SyntheticStats {
    open_handles: AtomicUsize,
    opens: AtomicUsize,
    packets_read: AtomicUsize,
    key_seeks: AtomicUsize,
    backward_seeks: AtomicUsize,
    rewinds: AtomicUsize,
}

impl SyntheticStats {
    /// Containers opened and not yet closed
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn packets_read(&self) -> usize {
        self.packets_read.load(Ordering::SeqCst)
    }

    pub fn key_seeks(&self) -> usize {
        self.key_seeks.load(Ordering::SeqCst)
    }

    pub fn backward_seeks(&self) -> usize {
        self.backward_seeks.load(Ordering::SeqCst)
    }

    pub fn rewinds(&self) -> usize {
        self.rewinds.load(Ordering::SeqCst)
    }
}

/// `MediaSource` serving one synthetic media description for any location
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    media: Arc<SyntheticMedia>,
    stats: Arc<SyntheticStats>,
    fail_open: bool,
}

impl SyntheticSource {
    pub fn new(media: SyntheticMedia) -> Self {
        Self {
            media: Arc::new(media),
            stats: Arc::new(SyntheticStats::default()),
            fail_open: false,
        }
    }

    /// A source whose containers never open
    pub fn unopenable() -> Self {
        Self { fail_open: true, ..Self::new(SyntheticMedia::new(0)) }
    }

    pub fn media(&self) -> &SyntheticMedia {
        &self.media
    }

    pub fn stats(&self) -> Arc<SyntheticStats> {
        Arc::clone(&self.stats)
    }
}

impl MediaSource for SyntheticSource {
    fn open(&self, location: &MediaLocation) -> Result<Box<dyn MediaContainer>, ContainerError> {
        if self.fail_open {
            return Err(ContainerError::Open(location.to_string()));
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        self.stats.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticContainer {
            streams: self.media.streams(),
            media: Arc::clone(&self.media),
            stats: Arc::clone(&self.stats),
            position: 0,
            decoder_open: false,
            has_reference: false,
            delay_pending: self.media.read_delay.is_some(),
            scratch: Vec::new(),
            closed: false,
        }))
    }
}

struct SyntheticContainer {
    media: Arc<SyntheticMedia>,
    stats: Arc<SyntheticStats>,
    streams: Vec<StreamInfo>,
    position: usize,
    decoder_open: bool,
    has_reference: bool,
    delay_pending: bool,
    scratch: Vec<u8>,
    closed: bool,
}

impl SyntheticContainer {
    fn find_key(&self, timestamp: Timestamp, direction: SeekDirection) -> Option<usize> {
        let video = self.media.video_stream?;
        let mut keys = self
            .media
            .packets
            .iter()
            .enumerate()
            .filter(|(_, p)| p.stream_index == video && p.key);
        match direction {
            SeekDirection::Backward => keys.filter(|(_, p)| p.timestamp <= timestamp).last().map(|(i, _)| i),
            SeekDirection::Forward => keys.find(|(_, p)| p.timestamp >= timestamp).map(|(i, _)| i),
        }
    }
}

impl MediaContainer for SyntheticContainer {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn picture_format(&self, stream_index: usize) -> Option<(PixelLayout, u32, u32)> {
        (Some(stream_index) == self.media.video_stream).then_some((self.media.layout, self.media.width, self.media.height))
    }

    fn open_decoder(&mut self, stream_index: usize) -> Result<(), ContainerError> {
        if self.media.decoder_fails || Some(stream_index) != self.media.video_stream {
            return Err(ContainerError::DecoderOpen(format!("stream {}", stream_index)));
        }
        self.decoder_open = true;
        Ok(())
    }

    fn read_packet(&mut self, packet: &mut Packet) -> Result<bool, ContainerError> {
        if self.closed {
            return Err(ContainerError::Read("container closed".to_string()));
        }
        if let Some((at, delay)) = self.media.read_delay {
            if self.delay_pending && self.position == at {
                self.delay_pending = false;
                std::thread::sleep(delay);
            }
        }
        let Some(next) = self.media.packets.get(self.position) else {
            packet.clear();
            return Ok(false);
        };
        self.position += 1;
        self.stats.packets_read.fetch_add(1, Ordering::SeqCst);
        self.scratch.clear();
        self.scratch.resize(next.size, next.timestamp as u8);
        packet.fill(next.stream_index, next.timestamp, next.pts, next.key, &self.scratch);
        Ok(true)
    }

    fn decode(&mut self, picture: &mut Picture, packet: &Packet, offset: usize) -> Result<usize, ContainerError> {
        if !self.decoder_open {
            return Err(ContainerError::Decode("decoder not open".to_string()));
        }
        let script = self
            .media
            .video_packets()
            .find(|p| p.timestamp == packet.timestamp() && p.stream_index == packet.stream_index())
            .ok_or_else(|| ContainerError::Decode(format!("unknown packet at {}", packet.timestamp())))?;

        if offset == 0 {
            picture.set_incomplete();
        }
        let remaining = packet.len().saturating_sub(offset);
        let consumed = remaining.min(self.media.chunk.max(1));
        if offset + consumed < packet.len() {
            return Ok(consumed);
        }

        if script.key {
            self.has_reference = true;
        }
        if script.completes && self.has_reference {
            paint(picture, script.timestamp);
            picture.set_complete(script.pts.or(Some(script.timestamp)));
        }
        Ok(consumed)
    }

    fn seek_key_frame(&mut self, _stream_index: usize, timestamp: Timestamp, direction: SeekDirection) -> Result<(), ContainerError> {
        if !self.media.seekable {
            return Err(ContainerError::Seek("source is not seekable".to_string()));
        }
        let index = self
            .find_key(timestamp, direction)
            .ok_or_else(|| ContainerError::Seek(format!("no key frame {:?} of {}", direction, timestamp)))?;
        self.stats.key_seeks.fetch_add(1, Ordering::SeqCst);
        if direction == SeekDirection::Backward {
            self.stats.backward_seeks.fetch_add(1, Ordering::SeqCst);
        }
        self.position = index;
        self.has_reference = false;
        Ok(())
    }

    fn rewind(&mut self) -> Result<(), ContainerError> {
        if !self.media.seekable {
            return Err(ContainerError::Seek("source is not seekable".to_string()));
        }
        self.stats.rewinds.fetch_add(1, Ordering::SeqCst);
        self.position = 0;
        self.has_reference = false;
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticContainer {
    fn drop(&mut self) {
        self.close();
    }
}
