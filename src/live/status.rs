use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of the live session controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveState {
    /// No session; `start()` allowed
    #[default]
    Idle,
    /// Devices acquired, waiting for the remote session to open
    Connecting,
    /// Audio flowing both ways
    Open,
    /// Ended by the remote side (close or error); `start()` allowed
    Closed,
}

/// Snapshot of the live session, published to observers on every change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: LiveState,

    /// True while any synthesized speech is playing
    pub speaking: bool,

    /// Identifier of the current session, if one exists
    pub session_id: Option<String>,

    /// When the current session was started
    pub started_at: Option<DateTime<Utc>>,

    /// Outbound audio frames delivered to the transport
    pub frames_sent: u64,

    /// Outbound frames evicted from a full queue
    pub frames_dropped: u64,

    /// Inbound speech chunks scheduled for playback
    pub chunks_scheduled: u64,

    /// Last failure, cleared when a new session starts
    pub last_error: Option<String>,
}

impl SessionStatus {
    pub fn is_live(&self) -> bool {
        self.state == LiveState::Open
    }
}
