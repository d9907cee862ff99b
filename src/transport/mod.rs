//! Dual media transports
//!
//! Two delivery mechanisms coexist per session: the always-on reliable
//! WebSocket channel (control, signaling, fallback media) and the
//! on-demand WebRTC peer transport (media tracks plus input/audio
//! sub-channels). Both feed one [`MediaEvent`] queue per session, so the
//! scheduler and renderer never know which transport produced a block.

pub mod peer;
pub mod reliable;

pub use peer::PeerTransport;
pub use reliable::ReliableChannel;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::protocol::ServerMessage;

/// Which delivery mechanism produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Reliable,
    Peer,
}

/// Requested delivery mode for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Reliable,
    Peer,
    Both,
}

impl TransportMode {
    /// Whether this mode requires a negotiated peer transport.
    pub fn wants_peer(self) -> bool {
        matches!(self, Self::Peer | Self::Both)
    }
}

/// Transport-neutral ICE candidate description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Everything a transport can hand to the session pump.
#[derive(Debug, Clone)]
pub enum MediaEvent {
    Connected(TransportKind),
    Disconnected {
        origin: TransportKind,
        reason: String,
    },
    /// One discrete encoded video frame
    VideoFrame {
        origin: TransportKind,
        format: u8,
        data: Bytes,
    },
    /// One audio block, headered per [`crate::protocol::parse_audio_block`]
    AudioBlock {
        origin: TransportKind,
        block: Bytes,
    },
    /// Control/signaling message from the reliable channel
    Control(ServerMessage),
    /// Save-state payload from the reliable channel
    SaveState {
        state: Bytes,
        thumbnail: Option<Bytes>,
    },
    /// The peer input sub-channel became ready
    PeerInputOpen,
    TransportError {
        origin: TransportKind,
        message: String,
    },
}

/// Common face of the two transports.
///
/// Media itself flows through the shared [`MediaEvent`] queue; this trait
/// covers what the session needs to manage a transport's lifetime.
pub trait MediaSource: Send + Sync {
    fn kind(&self) -> TransportKind;
    fn is_connected(&self) -> bool;
    /// Signal shutdown. Must be idempotent.
    fn shutdown(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_wants_peer() {
        assert!(!TransportMode::Reliable.wants_peer());
        assert!(TransportMode::Peer.wants_peer());
        assert!(TransportMode::Both.wants_peer());
    }

    #[test]
    fn test_mode_serde_names() {
        assert_eq!(
            serde_json::to_string(&TransportMode::Both).unwrap(),
            "\"both\""
        );
        let mode: TransportMode = serde_json::from_str("\"reliable\"").unwrap();
        assert_eq!(mode, TransportMode::Reliable);
    }
}
