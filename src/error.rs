//! Error types for the streaming client core

use thiserror::Error;

/// Main error type for the client
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio playback errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Truncated payload: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Invalid step index: {0}")]
    InvalidStepIndex(u8),

    #[error("Invalid channel count: {0}")]
    InvalidChannels(u32),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),
}

/// Video pipeline errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Frame decode failed: {0}")]
    DecodeFailed(String),

    #[error("Render loop already running")]
    AlreadyRunning,
}

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Signaling failed: {0}")]
    SignalingFailed(String),

    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("Invalid frame")]
    InvalidFrame,

    #[error("Timeout")]
    Timeout,
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Invalid state for operation: {0}")]
    InvalidState(String),

    #[error("Another session is already active")]
    AlreadyActive,

    #[error("Server rejected request: {0}")]
    Rejected(String),
}

/// Result type alias for the client
pub type Result<T> = std::result::Result<T, Error>;
