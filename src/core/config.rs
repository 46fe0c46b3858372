//! Engine configuration, loaded from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tunables for scanning, caching, seeking and logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Decoded frames cached during the scan in addition to the leading
    /// incomplete ones, which are always kept
    pub cache_capacity: usize,

    /// Frames indexed per scanner chunk
    pub load_chunk_frames: usize,

    /// Time without a new frame before a scan reports itself stalled
    pub stall_timeout_ms: u64,

    /// Key packets closer than this are reached by reading forward instead of seeking
    pub forward_window_secs: f64,

    /// Expose at most this many logical frames
    pub frame_limit: Option<usize>,

    /// Default tracing filter when FRAMEDEX_LOG is unset
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 0,
            load_chunk_frames: 32,
            stall_timeout_ms: 6000,
            forward_window_secs: 1.0,
            frame_limit: None,
            log_filter: "framedex=info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load_chunk_frames == 0 {
            return Err(ConfigError::Invalid {
                field: "load_chunk_frames",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.forward_window_secs.is_finite() || self.forward_window_secs < 0.0 {
            return Err(ConfigError::Invalid {
                field: "forward_window_secs",
                reason: format!("{} is not a non-negative number", self.forward_window_secs),
            });
        }
        if self.frame_limit == Some(0) {
            return Err(ConfigError::Invalid {
                field: "frame_limit",
                reason: "must expose at least one frame".to_string(),
            });
        }
        Ok(())
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_capacity, 0);
        assert_eq!(config.stall_timeout(), Duration::from_secs(6));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("cache_capacity = 24\nframe_limit = 100\n").unwrap();
        assert_eq!(config.cache_capacity, 24);
        assert_eq!(config.frame_limit, Some(100));
        assert_eq!(config.load_chunk_frames, 32);
        assert_eq!(config.log_filter, "framedex=info");
    }

    #[test]
    fn test_rejects_zero_chunk() {
        let err = EngineConfig::from_toml_str("load_chunk_frames = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "load_chunk_frames", .. }));
    }

    #[test]
    fn test_rejects_bad_syntax() {
        assert!(matches!(
            EngineConfig::from_toml_str("cache_capacity = \"lots\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framedex.toml");
        std::fs::write(&path, "stall_timeout_ms = 250\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.stall_timeout(), Duration::from_millis(250));
    }
}
