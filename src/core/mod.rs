//! Core types shared by the scanner, locator and playback driver:
//! stream time, configuration, logging setup and cancellation.

pub mod cancel;
pub mod config;
pub mod logging;
pub mod time;

pub use cancel::CancelToken;
pub use config::{ConfigError, EngineConfig};
pub use time::{Rational, Timestamp};
