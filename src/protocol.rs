//! Wire protocol definitions
//!
//! Three surfaces live here: the JSON control/signaling messages exchanged
//! over the reliable channel, the tagged binary framing the reliable
//! channel uses for fallback media, and the audio block header shared by
//! both transports (with the backward-compatible length auto-detection).

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Messages sent from the client over the reliable channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateSession {
        rom: String,
        client_id: String,
    },
    Subscribe {
        session_id: String,
    },
    Unsubscribe {
        session_id: String,
    },
    Start {
        session_id: String,
    },
    Stop {
        session_id: String,
    },
    RequestPeer {
        session_id: String,
    },
    Answer {
        session_id: String,
        sdp: String,
    },
    IceCandidate {
        session_id: String,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    },
    /// Input fallback when the peer input channel is not open.
    Input {
        session_id: String,
        button: String,
        pressed: bool,
    },
    SaveState {
        session_id: String,
    },
    LoadState {
        session_id: String,
    },
}

/// Messages received from the server over the reliable channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionCreated {
        session_id: String,
    },
    Started {
        session_id: String,
    },
    Stopped {
        session_id: String,
    },
    Offer {
        session_id: String,
        sdp: String,
    },
    IceCandidate {
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<u16>,
    },
    LoadStateResult {
        session_id: String,
        success: bool,
    },
    Error {
        message: String,
    },
}

/// Binary frame kinds on the reliable channel.
const FRAME_VIDEO: u8 = 1;
const FRAME_AUDIO: u8 = 2;
const FRAME_SAVE_STATE: u8 = 3;

/// A binary message on the reliable channel.
///
/// Framing is `u8 kind | body`. Video bodies carry a format tag and the
/// encoded image; audio bodies reuse the audio block layout of
/// [`parse_audio_block`]; save-state bodies are `u32 state_len (LE) |
/// state | thumbnail` with an empty thumbnail meaning none.
#[derive(Debug, Clone, PartialEq)]
pub enum ReliableFrame {
    Video { format: u8, data: Bytes },
    Audio { block: Bytes },
    SaveState { state: Bytes, thumbnail: Option<Bytes> },
}

impl ReliableFrame {
    pub fn parse(buf: &[u8]) -> Result<Self, TransportError> {
        let (&kind, body) = buf.split_first().ok_or(TransportError::InvalidFrame)?;
        match kind {
            FRAME_VIDEO => {
                let (&format, data) = body.split_first().ok_or(TransportError::InvalidFrame)?;
                Ok(Self::Video {
                    format,
                    data: Bytes::copy_from_slice(data),
                })
            }
            FRAME_AUDIO => Ok(Self::Audio {
                block: Bytes::copy_from_slice(body),
            }),
            FRAME_SAVE_STATE => {
                if body.len() < 4 {
                    return Err(TransportError::InvalidFrame);
                }
                let state_len =
                    u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
                let rest = &body[4..];
                if rest.len() < state_len {
                    return Err(TransportError::InvalidFrame);
                }
                let (state, thumbnail) = rest.split_at(state_len);
                Ok(Self::SaveState {
                    state: Bytes::copy_from_slice(state),
                    thumbnail: if thumbnail.is_empty() {
                        None
                    } else {
                        Some(Bytes::copy_from_slice(thumbnail))
                    },
                })
            }
            _ => Err(TransportError::InvalidFrame),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Self::Video { format, data } => {
                buf.put_u8(FRAME_VIDEO);
                buf.put_u8(*format);
                buf.put_slice(data);
            }
            Self::Audio { block } => {
                buf.put_u8(FRAME_AUDIO);
                buf.put_slice(block);
            }
            Self::SaveState { state, thumbnail } => {
                buf.put_u8(FRAME_SAVE_STATE);
                buf.put_u32_le(state.len() as u32);
                buf.put_slice(state);
                if let Some(thumb) = thumbnail {
                    buf.put_slice(thumb);
                }
            }
        }
        buf.freeze()
    }
}

/// Audio payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// Linear PCM, interleaved i16 little-endian.
    Pcm,
    /// 4-bit adaptive delta encoding ([`crate::codec::adpcm`]).
    Adpcm,
}

impl AudioFormat {
    fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Pcm),
            1 => Some(Self::Adpcm),
            _ => None,
        }
    }
}

/// Parsed audio block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioBlockHeader {
    pub sample_rate: u32,
    pub channels: u32,
    pub format: AudioFormat,
}

const AUDIO_HEADER_LEGACY: usize = 12;
const AUDIO_HEADER_EXTENDED: usize = 16;

/// Parse an audio block: `u32 sample_rate | u32 channels | [u32 format,
/// u32 length]? | payload`, all little-endian.
///
/// Header length is detected, not declared: the extended 16-byte header is
/// selected only when the candidate format word is a valid tag (0 or 1)
/// *and* the declared payload length matches the remaining bytes. Anything
/// else falls back to the legacy 12-byte header, whose payload is always
/// linear PCM. Blocks shorter than the legacy header are rejected and the
/// caller drops them.
pub fn parse_audio_block(buf: &[u8]) -> Result<(AudioBlockHeader, &[u8]), TransportError> {
    if buf.len() < AUDIO_HEADER_LEGACY {
        return Err(TransportError::InvalidFrame);
    }

    let sample_rate = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let channels = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if sample_rate == 0 || channels == 0 || channels > 8 {
        return Err(TransportError::InvalidFrame);
    }

    if buf.len() >= AUDIO_HEADER_EXTENDED {
        let format_tag = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let declared_len = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]) as usize;

        if let Some(format) = AudioFormat::from_tag(format_tag) {
            if declared_len == buf.len() - AUDIO_HEADER_EXTENDED {
                return Ok((
                    AudioBlockHeader {
                        sample_rate,
                        channels,
                        format,
                    },
                    &buf[AUDIO_HEADER_EXTENDED..],
                ));
            }
        }
    }

    Ok((
        AudioBlockHeader {
            sample_rate,
            channels,
            format: AudioFormat::Pcm,
        },
        &buf[AUDIO_HEADER_LEGACY..],
    ))
}

/// Build an audio block with the extended header.
pub fn build_audio_block(
    sample_rate: u32,
    channels: u32,
    format: AudioFormat,
    payload: &[u8],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(AUDIO_HEADER_EXTENDED + payload.len());
    buf.put_u32_le(sample_rate);
    buf.put_u32_le(channels);
    buf.put_u32_le(match format {
        AudioFormat::Pcm => 0,
        AudioFormat::Adpcm => 1,
    });
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Build an audio block with the legacy 12-byte header (linear PCM only).
pub fn build_legacy_audio_block(sample_rate: u32, channels: u32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(AUDIO_HEADER_LEGACY + payload.len());
    buf.put_u32_le(sample_rate);
    buf.put_u32_le(channels);
    buf.put_slice(payload);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_header_detected() {
        let payload = [0xAA; 20];
        let block = build_audio_block(32768, 2, AudioFormat::Adpcm, &payload);
        let (header, body) = parse_audio_block(&block).unwrap();

        assert_eq!(header.sample_rate, 32768);
        assert_eq!(header.channels, 2);
        assert_eq!(header.format, AudioFormat::Adpcm);
        assert_eq!(body, &payload[..]);
    }

    #[test]
    fn test_legacy_header_fallback() {
        let payload = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let block = build_legacy_audio_block(44100, 1, &payload);
        let (header, body) = parse_audio_block(&block).unwrap();

        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.format, AudioFormat::Pcm);
        assert_eq!(body, &payload[..]);
    }

    #[test]
    fn test_length_mismatch_falls_back_to_legacy() {
        // Format word is a valid tag but the declared length is wrong, so
        // bytes 8.. are legacy payload, not an extended header.
        let mut buf = Vec::new();
        buf.extend_from_slice(&48000u32.to_le_bytes());
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes()); // would-be format
        buf.extend_from_slice(&999u32.to_le_bytes()); // wrong length
        buf.extend_from_slice(&[0; 8]);

        let (header, body) = parse_audio_block(&buf).unwrap();
        assert_eq!(header.format, AudioFormat::Pcm);
        assert_eq!(body.len(), buf.len() - 12);
    }

    #[test]
    fn test_invalid_format_tag_falls_back_to_legacy() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&48000u32.to_le_bytes());
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&7u32.to_le_bytes()); // not a valid tag
        buf.extend_from_slice(&4u32.to_le_bytes()); // length happens to match
        buf.extend_from_slice(&[0; 4]);

        let (header, body) = parse_audio_block(&buf).unwrap();
        assert_eq!(header.format, AudioFormat::Pcm);
        assert_eq!(body.len(), 8);
    }

    #[test]
    fn test_short_block_rejected() {
        assert!(parse_audio_block(&[0; 11]).is_err());
    }

    #[test]
    fn test_zero_channels_rejected() {
        let block = build_legacy_audio_block(48000, 0, &[0; 4]);
        assert!(parse_audio_block(&block).is_err());
    }

    #[test]
    fn test_empty_extended_payload() {
        let block = build_audio_block(48000, 2, AudioFormat::Pcm, &[]);
        let (header, body) = parse_audio_block(&block).unwrap();
        assert_eq!(header.format, AudioFormat::Pcm);
        assert!(body.is_empty());
    }

    #[test]
    fn test_reliable_frame_video_roundtrip() {
        let frame = ReliableFrame::Video {
            format: 0,
            data: Bytes::from_static(b"\x89PNG\r\n"),
        };
        let parsed = ReliableFrame::parse(&frame.to_bytes()).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_reliable_frame_save_state_roundtrip() {
        let frame = ReliableFrame::SaveState {
            state: Bytes::from_static(b"state-blob"),
            thumbnail: Some(Bytes::from_static(b"thumb")),
        };
        let parsed = ReliableFrame::parse(&frame.to_bytes()).unwrap();
        assert_eq!(parsed, frame);

        let no_thumb = ReliableFrame::SaveState {
            state: Bytes::from_static(b"state-blob"),
            thumbnail: None,
        };
        let parsed = ReliableFrame::parse(&no_thumb.to_bytes()).unwrap();
        assert_eq!(parsed, no_thumb);
    }

    #[test]
    fn test_reliable_frame_rejects_garbage() {
        assert!(ReliableFrame::parse(&[]).is_err());
        assert!(ReliableFrame::parse(&[99, 1, 2]).is_err());
        // Save-state frame with a length field pointing past the buffer.
        assert!(ReliableFrame::parse(&[3, 0xFF, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_control_message_json_shape() {
        let msg = ClientMessage::IceCandidate {
            session_id: "s1".into(),
            candidate: "candidate:0 1 UDP ...".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"ice_candidate\""));

        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ClientMessage::IceCandidate { .. }));
    }

    #[test]
    fn test_server_message_parse() {
        let json = r#"{"type":"session_created","session_id":"abc"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ServerMessage::SessionCreated { session_id } if session_id == "abc"));
    }
}
