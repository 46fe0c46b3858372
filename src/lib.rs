//! Frame-accurate video decoding and indexing.
//!
//! A container is scanned once to build a table of every frame's packet
//! and governing key packet. Frames are then served from a small cache or
//! decoded on demand by seeking to the right key packet, and a catch-up
//! playback engine drives display at any rate.

pub mod core;
pub mod decode;
pub mod events;
pub mod media;
pub mod persist;
pub mod playback;
pub mod thumbnail;
pub mod video;

pub use crate::core::{CancelToken, EngineConfig};
pub use decode::LoadError;
pub use events::{EventSink, VideoEvent};
pub use media::{MediaLocation, MediaSource};
pub use persist::VideoDescriptor;
pub use playback::PlaybackEngine;
pub use thumbnail::ThumbnailTool;
pub use video::Video;
