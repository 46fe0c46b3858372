//! Notifications emitted while loading and playing a video.
//! Delivered over a crossbeam channel; a dropped receiver silences the sink.

use crossbeam::channel;

/// Event observed by whoever owns the receiving end
#[derive(Debug, Clone, PartialEq)]
pub enum VideoEvent {
    /// Number of frames indexed so far
    Progress { location: String, frames: usize },
    /// Scan ended; `None` when it was canceled
    LoadFinished { location: String, frames: Option<usize> },
    /// No new frame arrived within the stall timeout (advisory)
    Stalled { location: String },
    /// The displayed logical frame changed
    FrameChanged(usize),
    PlayingChanged(bool),
}

/// Sending half for video events
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<channel::Sender<VideoEvent>>,
}

impl EventSink {
    /// Create a connected sink and its receiver
    pub fn channel() -> (Self, channel::Receiver<VideoEvent>) {
        let (tx, rx) = channel::unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: VideoEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means nobody is listening any more
            let _ = tx.send(event);
        }
    }
}
