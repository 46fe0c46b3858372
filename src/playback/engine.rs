//! Catch-up playback over an opened video.
//!
//! Playing anchors a clock time to a frame time. Each tick computes the
//! media time that should be showing, jumps to the last frame starting
//! before it, and otherwise waits until the next frame is due. Frames that
//! decode slowly are skipped rather than delaying playback.
//!
//! All work runs on the thread that owns the engine; other threads submit
//! commands through a `CommandSender`.

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use tracing::{debug, trace, warn};

use crate::events::{EventSink, VideoEvent};
use crate::playback::clip::ClipRange;
use crate::playback::scheduler::{CommandSender, PlaybackCommand, Scheduler};
use crate::playback::state::PlaybackState;
use crate::playback::sync::{Clock, PlaybackAnchor, SystemClock};
use crate::video::Video;

/// Error type for playback control
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Play rate must be a positive finite number, got {0}")]
    InvalidRate(f64),
}

/// Minimum wait before re-checking the clock
const MIN_TICK: Duration = Duration::from_millis(1);

pub struct PlaybackEngine<C: Clock = SystemClock> {
    video: Video,
    clock: C,
    state: PlaybackState,
    clip: ClipRange,
    frame: usize,
    rate: f64,
    looping: bool,
    image: Option<Arc<RgbImage>>,
    scheduler: Scheduler,
    events: EventSink,
}

impl PlaybackEngine<SystemClock> {
    /// Engine driven by the wall clock
    pub fn new(video: Video, events: EventSink) -> Self {
        Self::with_clock(video, SystemClock::new(), events)
    }
}

impl<C: Clock> PlaybackEngine<C> {
    /// Starts stopped at the video's first displayable frame
    pub fn with_clock(mut video: Video, clock: C, events: EventSink) -> Self {
        let clip = ClipRange::new(video.frame_count());
        let frame = video.initial_frame();
        let image = video.image(frame);
        Self {
            video,
            clock,
            state: PlaybackState::Stopped,
            clip,
            frame,
            rate: 1.0,
            looping: false,
            image,
            scheduler: Scheduler::new(),
            events,
        }
    }

    /// The video being played
    pub fn video(&self) -> &Video {
        &self.video
    }

    /// Clock driving playback
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Current playback state
    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Check if currently playing
    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// Current logical frame
    pub fn frame_number(&self) -> usize {
        self.frame
    }

    /// Most recently resolved image
    pub fn image(&self) -> Option<Arc<RgbImage>> {
        self.image.clone()
    }

    /// Start and end frames of the clip
    pub fn clip(&self) -> &ClipRange {
        &self.clip
    }

    /// Relative play rate
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Check if playback wraps to the clip start
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Set whether playback wraps to the clip start
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Handle for queueing commands from other threads
    pub fn sender(&self) -> CommandSender {
        self.scheduler.sender()
    }

    /// Start playing from the frame after the current one
    pub fn play(&mut self) {
        if self.clip.len() <= 1 || self.state.is_playing() {
            return;
        }
        self.start_playing_at(self.frame + 1);
        self.events.emit(VideoEvent::PlayingChanged(true));
    }

    /// Stop playing; the current frame stays up
    pub fn stop(&mut self) {
        if !self.state.is_playing() {
            return;
        }
        self.state = PlaybackState::Stopped;
        self.scheduler.cancel_ticks();
        debug!(frame = self.frame, "playback stopped");
        self.events.emit(VideoEvent::PlayingChanged(false));
    }

    fn start_playing_at(&mut self, frame: usize) {
        let frame = self.clip.clamp(frame);
        let frame_time = self.video.frame_time(frame).unwrap_or(0.0);
        let anchor = PlaybackAnchor::new(self.clock.now(), frame_time, self.rate);
        self.state = PlaybackState::Playing { anchor };
        trace!(frame, frame_time, rate = self.rate, "playback anchored");
        self.set_frame_number(frame);
        self.scheduler.schedule(self.clock.now(), PlaybackCommand::ContinuePlaying);
    }

    /// Show frame `n`, clamped to the clip.
    /// If it cannot be decoded the previous image stays up.
    pub fn set_frame_number(&mut self, n: usize) {
        let n = self.clip.clamp(n);
        if n == self.frame && self.image.is_some() {
            return;
        }
        self.frame = n;
        match self.video.image(n) {
            Some(image) => {
                self.image = Some(image);
                self.events.emit(VideoEvent::FrameChanged(n));
            }
            None => debug!(frame = n, "frame unavailable, keeping previous image"),
        }
        if self.state.is_playing() {
            self.scheduler.schedule(self.clock.now(), PlaybackCommand::ContinuePlaying);
        }
    }

    /// Change the relative play rate; playback re-anchors at the current frame
    pub fn set_rate(&mut self, rate: f64) -> Result<(), PlaybackError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PlaybackError::InvalidRate(rate));
        }
        self.rate = rate;
        if self.state.is_playing() {
            self.start_playing_at(self.frame);
        }
        Ok(())
    }

    /// One catch-up tick
    pub fn continue_playing(&mut self) {
        let Some(anchor) = self.state.anchor().copied() else {
            return;
        };
        let current = self.frame;
        let end = self.clip.end();

        if current < end {
            let now = self.clock.now();
            let target = anchor.target_time(now);
            // Past the last frame means the end of the clip
            let next = self.video.frame_before(target).map_or(end, |k| k.min(end));
            if next > current {
                trace!(current, next, target, "catching up");
                self.set_frame_number(next);
            } else {
                let next_start = self.video.frame_time(current + 1).unwrap_or(target);
                let due = anchor.system_time_for(next_start).max(now + MIN_TICK);
                self.scheduler.schedule(due, PlaybackCommand::ContinuePlaying);
            }
        } else if self.looping && self.clip.len() > 1 {
            debug!(start = self.clip.start(), "looping");
            self.start_playing_at(self.clip.start());
        } else {
            self.stop();
        }
    }

    fn dispatch(&mut self, command: PlaybackCommand) {
        match command {
            PlaybackCommand::Play => self.play(),
            PlaybackCommand::Stop => self.stop(),
            PlaybackCommand::SetFrame(n) => self.set_frame_number(n),
            PlaybackCommand::SetRate(rate) => {
                if let Err(e) = self.set_rate(rate) {
                    warn!("ignoring rate change: {}", e);
                }
            }
            PlaybackCommand::SetLooping(looping) => self.set_looping(looping),
            PlaybackCommand::ContinuePlaying => self.continue_playing(),
        }
    }

    /// Run every command due now. Returns how many ran.
    pub fn pump(&mut self) -> usize {
        let mut ran = 0;
        while let Some(command) = self.scheduler.pop_due(self.clock.now()) {
            self.dispatch(command);
            ran += 1;
        }
        ran
    }

    /// Run until playback has stopped and nothing is queued
    pub fn run(&mut self) {
        loop {
            self.pump();
            match self.scheduler.next_due() {
                Some(due) => self.clock.sleep_until(due),
                None if self.state.is_playing() => {
                    self.scheduler.schedule(self.clock.now(), PlaybackCommand::ContinuePlaying);
                }
                None => break,
            }
        }
    }

    /// Stop and advance one frame
    pub fn step(&mut self) {
        self.stop();
        self.set_frame_number(self.frame + 1);
    }

    /// Stop and go back one frame
    pub fn back(&mut self) {
        self.stop();
        self.set_frame_number(self.frame.saturating_sub(1));
    }

    /// Stop and return to the start frame
    pub fn reset(&mut self) {
        self.stop();
        self.set_frame_number(self.clip.start());
    }

    /// Show the clip start frame
    pub fn go_to_start(&mut self) {
        self.set_frame_number(self.clip.start());
    }

    /// Show the clip end frame
    pub fn go_to_end(&mut self) {
        self.set_frame_number(self.clip.end());
    }

    /// Start time of the current frame in milliseconds
    pub fn time(&self) -> f64 {
        self.video.frame_time(self.frame).unwrap_or(0.0)
    }

    /// Move to the frame showing at `ms`
    pub fn set_time(&mut self, ms: f64) {
        let frame = self.video.frame_at_time(ms.abs());
        self.set_frame_number(frame);
    }

    /// Set the clip start frame
    pub fn set_start_frame(&mut self, n: usize) {
        self.clip.set_start(n);
        self.keep_frame_in_clip();
    }

    /// Set the clip end frame
    pub fn set_end_frame(&mut self, n: usize) {
        self.clip.set_end(n);
        self.keep_frame_in_clip();
    }

    fn keep_frame_in_clip(&mut self) {
        let clamped = self.clip.clamp(self.frame);
        if clamped != self.frame {
            self.set_frame_number(clamped);
        }
    }

    /// Start time of the clip in milliseconds
    pub fn start_time(&self) -> f64 {
        self.video.frame_time(self.clip.start()).unwrap_or(0.0)
    }

    /// End of the last clip frame in milliseconds
    pub fn end_time(&self) -> f64 {
        let end = self.clip.end();
        if end + 1 < self.video.frame_count() {
            return self.video.frame_time(end + 1).unwrap_or(0.0);
        }
        self.video.duration_ms()
    }

    /// Set the clip start to the frame showing at `ms`
    pub fn set_start_time(&mut self, ms: f64) {
        let frame = self.video.frame_at_time(ms.abs());
        self.set_start_frame(frame);
    }

    /// Set the clip end to the frame showing at `ms`
    pub fn set_end_time(&mut self, ms: f64) {
        let ms = ms.abs().min(self.video.duration_ms());
        let frame = self.video.frame_at_time(ms);
        self.set_end_frame(frame);
    }
}
