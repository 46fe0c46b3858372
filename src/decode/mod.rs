pub mod decoder;
pub mod frame_cache;
pub mod frame_index;
pub mod loader;
pub mod locator;
pub mod scanner;

pub use decoder::{DecodeOutcome, DecodeSession, LoadError};
pub use frame_cache::{ImageCache, ImageCacheBuilder};
pub use frame_index::{FrameIndexBuilder, FrameIndexTable, IndexEntry};
pub use loader::scan_in_background;
pub use locator::{FrameLocator, LocatorStats};
pub use scanner::{ContainerScanner, ScanOptions, ScanResult, ScanStatus};
