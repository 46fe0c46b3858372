//! Media access: container abstraction, locations, pixel layouts and the
//! decoding back ends.

pub mod container;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod location;
pub mod pixel;
pub mod stream_info;
pub mod synthetic;

pub use container::{ContainerError, MediaContainer, MediaSource, Packet, Picture, SeekDirection};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegSource;
pub use location::MediaLocation;
pub use pixel::{ConvertError, PixelLayout};
pub use stream_info::{StreamInfo, StreamKind, VideoStreamInfo};
pub use synthetic::{SyntheticMedia, SyntheticSource, SyntheticStats};
