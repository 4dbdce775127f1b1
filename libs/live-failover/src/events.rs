use serde::{Deserialize, Serialize};

/// Signals the playback collaborator feeds back into the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackStatus {
    Playing,
    Buffering,
}

/// What finally killed the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    Error,
    Timeout,
}

/// Controller events (pure metadata, no data)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FailoverEvent {
    /// A stream URL became the active one, at session start
    StreamSelected { url: String, backup_index: usize },
    /// The active stream failed and a backup took over
    SwitchingBackup { url: String, backup_index: usize },
    /// Playback confirmed on the active stream
    Playing { on_backup: bool },
    /// The player reported buffering; the session is unchanged
    Buffering,
    /// Terminal: every queued stream failed
    Failed { reason: FailureReason },
}
