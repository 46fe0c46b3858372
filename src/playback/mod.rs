pub mod clip;
pub mod engine;
pub mod scheduler;
pub mod state;
pub mod sync;

pub use clip::ClipRange;
pub use engine::{PlaybackEngine, PlaybackError};
pub use scheduler::{CommandSender, PlaybackCommand, Scheduler};
pub use state::PlaybackState;
pub use sync::{Clock, ManualClock, PlaybackAnchor, SystemClock};
