//! Playback state machine.

use crate::playback::sync::PlaybackAnchor;

/// Playback state. Moving to a frame is a transient step, not a state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    /// Catching up with the clock from `anchor`
    Playing { anchor: PlaybackAnchor },
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, PlaybackState::Stopped)
    }

    pub fn anchor(&self) -> Option<&PlaybackAnchor> {
        match self {
            PlaybackState::Playing { anchor } => Some(anchor),
            PlaybackState::Stopped => None,
        }
    }
}
