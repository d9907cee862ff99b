//! # Emustream Client
//!
//! Low-latency client core for remote emulator streaming.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                              SERVER                                       │
//! │        emulator ──► video frames / audio blocks ──► transports            │
//! └───────────────┬───────────────────────────────────────────┬──────────────┘
//!                 │ WebSocket (control + fallback media)      │ WebRTC (media
//!                 │                                           │ tracks + input/
//!                 ▼                                           ▼ audio channels)
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                              CLIENT CORE                                  │
//! │  ┌────────────────┐      ┌──────────────────────────────────────────┐    │
//! │  │ Reliable       │      │ Peer Transport (transport::peer)          │    │
//! │  │ Channel        │      │  video track  audio track  input  audio   │    │
//! │  │ (transport::   │      │      │            │        chan   chan    │    │
//! │  │  reliable)     │      │      │            │          ▲      │     │    │
//! │  └───────┬────────┘      └──────┼────────────┼──────────┼──────┼─────┘    │
//! │          │    MediaEvent stream │            │          │      │          │
//! │          ▼                      ▼            ▼          │      ▼          │
//! │  ┌──────────────────────────────────────────────────────┼──────────┐     │
//! │  │ Session (session::manager) — lifecycle + negotiation │          │     │
//! │  └───────┬──────────────────────┬───────────────────────┼───┬──────┘     │
//! │          ▼                      ▼                       │   ▼            │
//! │  ┌──────────────┐      ┌─────────────────┐   ┌──────────┴─────────┐      │
//! │  │ Video        │      │ ADPCM decode +  │   │ Input Encoder      │      │
//! │  │ Pipeline     │      │ Resampler       │   │ (input)            │      │
//! │  │ (video)      │      │ (codec)         │   └────────────────────┘      │
//! │  └───────┬──────┘      └────────┬────────┘                               │
//! │          ▼                      ▼                                        │
//! │  ┌──────────────┐      ┌─────────────────┐                               │
//! │  │ Raster       │      │ Playback        │   scheduler pull runs on the  │
//! │  │ Target       │      │ Scheduler +     │   cpal callback thread,       │
//! │  │              │      │ cpal output     │   isolated from control flow  │
//! │  └──────────────┘      └─────────────────┘                               │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod input;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod video;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default playback sample rate requested from the output device
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Jitter buffer ceiling in milliseconds of queued audio
    pub const DEFAULT_JITTER_CEILING_MS: u32 = 80;

    /// Logical video canvas width in pixels
    pub const CANVAS_WIDTH: u32 = 240;

    /// Logical video canvas height in pixels
    pub const CANVAS_HEIGHT: u32 = 160;

    /// Render loop pacing for the continuous frame source (display refresh)
    pub const REFRESH_INTERVAL_MS: u64 = 16;

    /// Default control/fallback WebSocket endpoint
    pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080/stream";

    /// Default STUN server for peer negotiation
    pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

    /// Capacity of the per-session media/control event queue
    pub const EVENT_QUEUE_CAPACITY: usize = 256;

    /// Label of the peer input sub-channel
    pub const INPUT_CHANNEL_LABEL: &str = "input";

    /// Label of the peer audio-data sub-channel
    pub const AUDIO_CHANNEL_LABEL: &str = "audio";
}
