//! FFmpeg back end.
//! Demuxes with libavformat, decodes the video stream with libavcodec and
//! converts every finished picture to packed RGB24 with libswscale.
//! Raw FFI is limited to stream-specific seeking, which the safe wrapper
//! does not expose.

use std::path::PathBuf;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;
use tracing::{debug, warn};

use crate::core::time::{Rational, Timestamp};
use crate::media::container::{ContainerError, MediaContainer, MediaSource, Packet, Picture, SeekDirection};
use crate::media::location::MediaLocation;
use crate::media::pixel::PixelLayout;
use crate::media::stream_info::{StreamInfo, StreamKind};

/// Opens containers through libavformat
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegSource;

impl FfmpegSource {
    pub fn new() -> Result<Self, ContainerError> {
        ffmpeg::init().map_err(|e| ContainerError::Open(format!("FFmpeg init failed: {}", e)))?;
        Ok(Self)
    }
}

impl MediaSource for FfmpegSource {
    fn open(&self, location: &MediaLocation) -> Result<Box<dyn MediaContainer>, ContainerError> {
        let target = match location {
            MediaLocation::File(path) => path.clone(),
            MediaLocation::Url(url) => PathBuf::from(url.as_str()),
        };
        let input = ffmpeg::format::input(&target)
            .map_err(|e| ContainerError::Open(format!("{}: {}", location, e)))?;

        let streams = input
            .streams()
            .map(|stream| {
                let parameters = stream.parameters();
                let kind = match parameters.medium() {
                    ffmpeg::media::Type::Video => StreamKind::Video,
                    ffmpeg::media::Type::Audio => StreamKind::Audio,
                    _ => StreamKind::Other,
                };
                let time_base = stream.time_base();
                StreamInfo {
                    index: stream.index(),
                    kind,
                    codec_name: parameters.id().name().to_string(),
                    time_base: Rational::new(time_base.numerator(), time_base.denominator()),
                }
            })
            .collect();

        debug!(%location, "opened container");
        Ok(Box::new(FfmpegContainer {
            input: Some(input),
            streams,
            decoder: None,
            scaler: None,
            stream_index: None,
            current: ffmpeg::Packet::empty(),
            frame: ffmpeg::frame::Video::empty(),
            rgb: ffmpeg::frame::Video::empty(),
        }))
    }
}

struct FfmpegContainer {
    input: Option<ffmpeg::format::context::Input>,
    streams: Vec<StreamInfo>,
    decoder: Option<ffmpeg::decoder::Video>,
    scaler: Option<scaling::Context>,
    stream_index: Option<usize>,
    current: ffmpeg::Packet,
    frame: ffmpeg::frame::Video,
    rgb: ffmpeg::frame::Video,
}

// The contexts are only ever touched by the single owner of the container
unsafe impl Send for FfmpegContainer {}

impl FfmpegContainer {
    fn input_mut(&mut self) -> Result<&mut ffmpeg::format::context::Input, ContainerError> {
        self.input
            .as_mut()
            .ok_or_else(|| ContainerError::Read("container closed".to_string()))
    }

    fn flush_decoder(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush();
        }
    }

    /// Send the current packet. Returns true when a pending frame had to be
    /// received first; it is left in `self.frame`.
    fn send_current(&mut self) -> Result<bool, ContainerError> {
        let current = &self.current;
        let frame = &mut self.frame;
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| ContainerError::Decode("decoder not open".to_string()))?;
        send_or_drain(decoder, |d| d.send_packet(current), |d| d.receive_frame(&mut *frame))
            .map_err(|e| ContainerError::Decode(e.to_string()))
    }

    fn take_frame(&mut self, picture: &mut Picture) -> Result<(), ContainerError> {
        let pts = self.frame.timestamp().or(self.frame.pts());
        self.convert_into(picture)?;
        picture.set_complete(pts);
        Ok(())
    }

    /// Scale the received frame into `picture` as packed RGB24
    fn convert_into(&mut self, picture: &mut Picture) -> Result<(), ContainerError> {
        let (format, width, height) = (self.frame.format(), self.frame.width(), self.frame.height());
        let stale = self
            .scaler
            .as_ref()
            .map(|s| s.input().format != format || s.input().width != width || s.input().height != height)
            .unwrap_or(true);
        if stale {
            let scaler = scaling::Context::get(format, width, height, Pixel::RGB24, width, height, scaling::Flags::BILINEAR)
                .map_err(|e| ContainerError::Decode(format!("scaler: {}", e)))?;
            self.scaler = Some(scaler);
        }
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| ContainerError::Decode("scaler unavailable".to_string()))?;
        scaler
            .run(&self.frame, &mut self.rgb)
            .map_err(|e| ContainerError::Decode(format!("scale: {}", e)))?;

        picture.reshape(PixelLayout::Rgb24, width, height);
        let row = width as usize * 3;
        let stride = self.rgb.stride(0);
        let src = self.rgb.data(0);
        for (y, dst) in picture.data_mut().chunks_exact_mut(row).enumerate() {
            let start = y * stride;
            dst.copy_from_slice(&src[start..start + row]);
        }
        Ok(())
    }
}

impl MediaContainer for FfmpegContainer {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn picture_format(&self, stream_index: usize) -> Option<(PixelLayout, u32, u32)> {
        let input = self.input.as_ref()?;
        let stream = input.stream(stream_index)?;
        parameter_format(&stream.parameters())
    }

    fn open_decoder(&mut self, stream_index: usize) -> Result<(), ContainerError> {
        let input = self.input_mut()?;
        let stream = input
            .stream(stream_index)
            .ok_or_else(|| ContainerError::DecoderOpen(format!("no stream {}", stream_index)))?;
        let decoder = open_video_decoder(stream.parameters())?;
        self.decoder = Some(decoder);
        self.stream_index = Some(stream_index);
        Ok(())
    }

    fn read_packet(&mut self, packet: &mut Packet) -> Result<bool, ContainerError> {
        let mut next = ffmpeg::Packet::empty();
        match next.read(self.input_mut()?) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                packet.clear();
                return Ok(false);
            }
            Err(e) => return Err(ContainerError::Read(e.to_string())),
        }
        let timestamp = next.dts().or(next.pts()).unwrap_or(0);
        packet.fill(next.stream(), timestamp, next.pts(), next.is_key(), next.data().unwrap_or(&[]));
        self.current = next;
        Ok(true)
    }

    fn decode(&mut self, picture: &mut Picture, packet: &Packet, offset: usize) -> Result<usize, ContainerError> {
        if offset == 0 {
            picture.set_incomplete();
            if self.send_current()? {
                // A frame left over from an earlier packet completes this call
                self.take_frame(picture)?;
                return Ok(packet.len().max(1));
            }
        }
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| ContainerError::Decode("decoder not open".to_string()))?;
        match decoder.receive_frame(&mut self.frame) {
            Ok(()) => self.take_frame(picture)?,
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {}
            Err(ffmpeg::Error::Eof) => {}
            Err(e) => return Err(ContainerError::Decode(e.to_string())),
        }
        // libavcodec takes whole packets
        Ok(packet.len().saturating_sub(offset).max(1))
    }

    fn seek_key_frame(&mut self, stream_index: usize, timestamp: Timestamp, direction: SeekDirection) -> Result<(), ContainerError> {
        let flags = match direction {
            SeekDirection::Backward => ffmpeg::ffi::AVSEEK_FLAG_BACKWARD as i32,
            SeekDirection::Forward => 0,
        };
        let input = self.input_mut()?;
        let ret = unsafe { ffmpeg::ffi::av_seek_frame(input.as_mut_ptr(), stream_index as i32, timestamp, flags) };
        if ret < 0 {
            return Err(ContainerError::Seek(format!("av_seek_frame returned {}", ret)));
        }
        self.flush_decoder();
        Ok(())
    }

    fn rewind(&mut self) -> Result<(), ContainerError> {
        let input = self.input_mut()?;
        // Stream -1 seeks in AV_TIME_BASE units; fails on unseekable network streams
        let ret = unsafe {
            ffmpeg::ffi::avformat_seek_file(
                input.as_mut_ptr(),
                -1,
                i64::MIN,
                0,
                i64::MAX,
                ffmpeg::ffi::AVSEEK_FLAG_BACKWARD as i32,
            )
        };
        if ret < 0 {
            return Err(ContainerError::Seek(format!("avformat_seek_file returned {}", ret)));
        }
        self.flush_decoder();
        Ok(())
    }

    fn close(&mut self) {
        if self.input.take().is_some() {
            self.decoder = None;
            self.scaler = None;
            debug!(stream = ?self.stream_index, "closed container");
        }
    }
}

/// Picture layout and size from the stream's codec parameters, without opening a codec
fn parameter_format(parameters: &ffmpeg::codec::Parameters) -> Option<(PixelLayout, u32, u32)> {
    if parameters.medium() != ffmpeg::media::Type::Video {
        return None;
    }
    // Dimensions are plain fields of a valid AVCodecParameters
    let (width, height) = unsafe {
        let raw = parameters.as_ptr();
        ((*raw).width, (*raw).height)
    };
    Some((PixelLayout::Rgb24, width.max(0) as u32, height.max(0) as u32))
}

fn open_video_decoder(parameters: ffmpeg::codec::Parameters) -> Result<ffmpeg::decoder::Video, ContainerError> {
    let context = ffmpeg::codec::context::Context::from_parameters(parameters)
        .map_err(|e| ContainerError::DecoderOpen(e.to_string()))?;
    context
        .decoder()
        .video()
        .map_err(|e| ContainerError::DecoderOpen(e.to_string()))
}

/// Offer a packet to a decoder. When its output is full (EAGAIN) one frame
/// is received and the packet sent again; returns whether that happened.
fn send_or_drain<D>(
    decoder: &mut D,
    mut send: impl FnMut(&mut D) -> Result<(), ffmpeg::Error>,
    mut receive: impl FnMut(&mut D) -> Result<(), ffmpeg::Error>,
) -> Result<bool, ffmpeg::Error> {
    match send(decoder) {
        Ok(()) => Ok(false),
        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
            receive(decoder)?;
            send(decoder)?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

impl Drop for FfmpegContainer {
    fn drop(&mut self) {
        if self.input.is_some() {
            warn!("container dropped without close");
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EAGAIN: ffmpeg::Error = ffmpeg::Error::Other { errno: ffmpeg::util::error::EAGAIN };

    /// Decoder holding at most `capacity` undelivered frames
    struct Backlog {
        queued: usize,
        capacity: usize,
        received: usize,
    }

    fn send(d: &mut Backlog) -> Result<(), ffmpeg::Error> {
        if d.queued >= d.capacity {
            return Err(EAGAIN);
        }
        d.queued += 1;
        Ok(())
    }

    fn receive(d: &mut Backlog) -> Result<(), ffmpeg::Error> {
        if d.queued == 0 {
            return Err(EAGAIN);
        }
        d.queued -= 1;
        d.received += 1;
        Ok(())
    }

    #[test]
    fn test_send_with_room() {
        let mut decoder = Backlog { queued: 0, capacity: 2, received: 0 };
        assert_eq!(send_or_drain(&mut decoder, send, receive), Ok(false));
        assert_eq!(decoder.queued, 1);
        assert_eq!(decoder.received, 0);
    }

    #[test]
    fn test_full_decoder_drains_then_sends() {
        let mut decoder = Backlog { queued: 2, capacity: 2, received: 0 };
        assert_eq!(send_or_drain(&mut decoder, send, receive), Ok(true));
        assert_eq!(decoder.received, 1);
        assert_eq!(decoder.queued, 2);
    }

    #[test]
    fn test_other_send_errors_propagate() {
        let mut decoder = Backlog { queued: 0, capacity: 1, received: 0 };
        let result = send_or_drain(&mut decoder, |_| Err(ffmpeg::Error::InvalidData), receive);
        assert_eq!(result, Err(ffmpeg::Error::InvalidData));
    }

    fn video_parameters(codec: ffmpeg::ffi::AVCodecID) -> ffmpeg::codec::Parameters {
        let mut parameters = ffmpeg::codec::Parameters::new();
        unsafe {
            let raw = parameters.as_mut_ptr();
            (*raw).codec_type = ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
            (*raw).codec_id = codec;
            (*raw).width = 64;
            (*raw).height = 48;
        }
        parameters
    }

    #[test]
    fn test_format_known_without_decoder() {
        let parameters = video_parameters(ffmpeg::ffi::AVCodecID::AV_CODEC_ID_NONE);
        assert_eq!(parameter_format(&parameters), Some((PixelLayout::Rgb24, 64, 48)));
    }

    #[test]
    fn test_missing_codec_is_decoder_open_error() {
        let parameters = video_parameters(ffmpeg::ffi::AVCodecID::AV_CODEC_ID_NONE);
        assert!(matches!(open_video_decoder(parameters), Err(ContainerError::DecoderOpen(_))));
    }

    #[test]
    fn test_audio_parameters_have_no_picture() {
        let mut parameters = ffmpeg::codec::Parameters::new();
        unsafe {
            (*parameters.as_mut_ptr()).codec_type = ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
        }
        assert_eq!(parameter_format(&parameters), None);
    }
}
