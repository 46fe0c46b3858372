//! Saved form of an opened video.
//!
//! Only the media location and the number of logical frames to expose are
//! stored. Decoded data is rebuilt by scanning again on load.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::EngineConfig;
use crate::media::location::MediaLocation;
use crate::video::Video;

/// Error type for descriptor files
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Failed to access descriptor: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid descriptor: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    /// Media path, relative to the descriptor's base directory when possible, or a URL
    pub path: String,
    /// Logical frames to expose; `None` exposes all of them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<usize>,
}

impl VideoDescriptor {
    /// Describe `video`, storing local paths relative to `base`
    pub fn describe(video: &Video, base: Option<&Path>) -> Self {
        let path = match video.location() {
            MediaLocation::File(path) => {
                let relative = base.and_then(|base| path.strip_prefix(base).ok()).unwrap_or(path);
                relative.to_string_lossy().replace('\\', "/")
            }
            MediaLocation::Url(url) => url.to_string(),
        };
        Self { path, frame_count: video.frame_limit() }
    }

    /// Location of the media, with relative paths joined onto `base`
    pub fn resolve(&self, base: Option<&Path>) -> MediaLocation {
        match MediaLocation::parse(&self.path) {
            MediaLocation::File(path) if path.is_relative() => {
                let joined: PathBuf = base.map(|b| b.join(&path)).unwrap_or(path);
                MediaLocation::File(joined)
            }
            location => location,
        }
    }

    /// `config` with this descriptor's frame count applied
    pub fn apply(&self, config: &EngineConfig) -> EngineConfig {
        EngineConfig { frame_limit: self.frame_count.or(config.frame_limit), ..config.clone() }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        debug!(path = %path.as_ref().display(), "descriptor saved");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PersistError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::cancel::CancelToken;
    use crate::events::EventSink;
    use crate::media::synthetic::{SyntheticMedia, SyntheticSource};

    fn open(location: &str, config: &EngineConfig) -> Video {
        Video::open(
            Arc::new(SyntheticSource::new(SyntheticMedia::new(20))),
            &MediaLocation::parse(location),
            config,
            EventSink::disabled(),
            CancelToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_relative_path_round_trip() {
        let config = EngineConfig { frame_limit: Some(12), ..EngineConfig::default() };
        let video = open("/data/project/clips/drop.mp4", &config);
        let descriptor = VideoDescriptor::describe(&video, Some(Path::new("/data/project")));
        assert_eq!(descriptor.path, "clips/drop.mp4");
        assert_eq!(descriptor.frame_count, Some(12));
        assert_eq!(
            descriptor.resolve(Some(Path::new("/moved/project"))),
            MediaLocation::File(PathBuf::from("/moved/project/clips/drop.mp4"))
        );
    }

    #[test]
    fn test_path_outside_base_stays_absolute() {
        let video = open("/elsewhere/drop.mp4", &EngineConfig::default());
        let descriptor = VideoDescriptor::describe(&video, Some(Path::new("/data/project")));
        assert_eq!(descriptor.path, "/elsewhere/drop.mp4");
        assert_eq!(descriptor.frame_count, None);
        assert!(descriptor.resolve(Some(Path::new("/data"))).is_local());
    }

    #[test]
    fn test_url_kept_verbatim() {
        let video = open("https://example.com/media/drop.mp4", &EngineConfig::default());
        let descriptor = VideoDescriptor::describe(&video, Some(Path::new("/data")));
        assert_eq!(descriptor.path, "https://example.com/media/drop.mp4");
        assert!(!descriptor.resolve(Some(Path::new("/data"))).is_local());
    }

    #[test]
    fn test_frame_count_limits_reopened_video() {
        let descriptor = VideoDescriptor { path: "drop.mp4".to_string(), frame_count: Some(7) };
        let config = descriptor.apply(&EngineConfig::default());
        let video = open("drop.mp4", &config);
        assert_eq!(video.frame_count(), 7);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("video.json");
        let descriptor = VideoDescriptor { path: "clips/drop.mp4".to_string(), frame_count: Some(40) };
        descriptor.save(&file).unwrap();
        assert_eq!(VideoDescriptor::load(&file).unwrap(), descriptor);

        std::fs::write(&file, r#"{"path": "a.mp4"}"#).unwrap();
        assert_eq!(VideoDescriptor::load(&file).unwrap().frame_count, None);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(VideoDescriptor::load(dir.path().join("missing.json")), Err(PersistError::Io(_))));
        let file = dir.path().join("bad.json");
        std::fs::write(&file, "not json").unwrap();
        assert!(matches!(VideoDescriptor::load(&file), Err(PersistError::Json(_))));
    }
}
