//! Serialized continuation queue.
//! Every playback command, whether from the engine itself or from another
//! thread, passes through one queue consumed by the engine's thread.

use std::time::Duration;

use crossbeam::channel;

/// Command for the playback engine
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Play,
    Stop,
    SetFrame(usize),
    SetRate(f64),
    SetLooping(bool),
    /// Catch up with the clock
    ContinuePlaying,
}

/// A command due at a clock time
#[derive(Debug, Clone, PartialEq)]
pub struct Continuation {
    pub due: Duration,
    pub command: PlaybackCommand,
}

/// Handle for submitting commands from any thread
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: channel::Sender<Continuation>,
}

impl CommandSender {
    /// Queue a command to run as soon as the engine next pumps.
    /// Returns false when the engine is gone.
    pub fn send(&self, command: PlaybackCommand) -> bool {
        self.tx.send(Continuation { due: Duration::ZERO, command }).is_ok()
    }
}

pub struct Scheduler {
    tx: channel::Sender<Continuation>,
    rx: channel::Receiver<Continuation>,
    pending: Vec<Continuation>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx, pending: Vec::new() }
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender { tx: self.tx.clone() }
    }

    /// Queue a command. A new catch-up tick replaces any pending one.
    pub fn schedule(&mut self, due: Duration, command: PlaybackCommand) {
        self.drain();
        if command == PlaybackCommand::ContinuePlaying {
            self.cancel_ticks();
        }
        self.pending.push(Continuation { due, command });
    }

    /// Drop pending catch-up ticks
    pub fn cancel_ticks(&mut self) {
        self.pending.retain(|c| c.command != PlaybackCommand::ContinuePlaying);
    }

    fn drain(&mut self) {
        self.pending.extend(self.rx.try_iter());
    }

    /// Earliest due time among queued commands
    pub fn next_due(&mut self) -> Option<Duration> {
        self.drain();
        self.pending.iter().map(|c| c.due).min()
    }

    /// Remove and return the earliest command due at `now`; ties run in submission order
    pub fn pop_due(&mut self, now: Duration) -> Option<PlaybackCommand> {
        self.drain();
        let (position, _) = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, c)| c.due <= now)
            .min_by_key(|(i, c)| (c.due, *i))?;
        Some(self.pending.remove(position).command)
    }

    pub fn is_empty(&mut self) -> bool {
        self.drain();
        self.pending.is_empty()
    }

    pub fn len(&mut self) -> usize {
        self.drain();
        self.pending.len()
    }
}
