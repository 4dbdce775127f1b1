pub mod controller;
pub mod events;

use std::time::Duration;

// Re-export main types
pub use controller::{FailoverController, Phase};
pub use events::{FailoverEvent, FailureReason, PlaybackStatus};

/// How long a stream may sit in `Loading` before the controller gives up on
/// it and tries the next backup
pub const PLAYBACK_TIMEOUT: Duration = Duration::from_secs(15);
