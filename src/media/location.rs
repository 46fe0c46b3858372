//! Where a media resource lives: a local file or a network URL.

use std::fmt;
use std::path::PathBuf;

use url::Url;

/// A media resource readable as a demuxable container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaLocation {
    File(PathBuf),
    Url(Url),
}

impl MediaLocation {
    /// Interpret a user-supplied string.
    /// `file://` URLs and Windows drive paths become files; other URLs stay URLs.
    pub fn parse(input: &str) -> Self {
        match Url::parse(input) {
            // "C:/clips/a.mp4" parses with a one-letter scheme
            Ok(url) if url.scheme().len() == 1 => Self::File(PathBuf::from(input)),
            Ok(url) if url.scheme() == "file" => match url.to_file_path() {
                Ok(path) => Self::File(path),
                Err(()) => Self::File(PathBuf::from(url.path())),
            },
            Ok(url) => Self::Url(url),
            Err(_) => Self::File(PathBuf::from(input)),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::File(_))
    }

    /// Last path segment, used for display
    pub fn name(&self) -> String {
        match self {
            Self::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            Self::Url(url) => url
                .path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| url.as_str().to_string()),
        }
    }
}

impl fmt::Display for MediaLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{}", url),
        }
    }
}
