//! Session lifecycle and negotiation

pub mod manager;
pub mod negotiation;

pub use manager::SessionManager;

use bytes::Bytes;

use crate::transport::TransportKind;
use crate::video::RenderedFrame;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Starting,
    Running,
    Stopping,
    Closed,
}

impl SessionState {
    /// Whether a peer negotiation may be requested in this state.
    pub fn allows_peer_request(self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }
}

/// Events delivered to the consumer over the per-session event queue.
///
/// One queue replaces the scattered connect/disconnect/frame/audio
/// callbacks a UI would otherwise have to wire up field by field.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected {
        transport: TransportKind,
    },
    Disconnected {
        transport: TransportKind,
        reason: String,
    },
    VideoFrame(RenderedFrame),
    /// Audio playback is set up and scheduled.
    AudioReady,
    StateSaved {
        state: Bytes,
        thumbnail: Option<Bytes>,
    },
    Error {
        message: String,
    },
}

/// Result of a save-state request: opaque blobs the core does not interpret.
#[derive(Debug, Clone)]
pub struct SaveStatePayload {
    pub state: Bytes,
    pub thumbnail: Option<Bytes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_request_state_guard() {
        assert!(SessionState::Created.allows_peer_request());
        assert!(SessionState::Running.allows_peer_request());
        assert!(!SessionState::Stopping.allows_peer_request());
        assert!(!SessionState::Closed.allows_peer_request());
    }
}
