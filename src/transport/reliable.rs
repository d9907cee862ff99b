//! Reliable control/fallback channel
//!
//! A WebSocket client connection that exists for the whole session: JSON
//! text messages carry control and signaling, binary messages carry
//! fallback media and save-state payloads (framing in
//! [`crate::protocol::ReliableFrame`]). Losing this channel fails the
//! session; the peer transport is optional, this one is not.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;
use crate::protocol::{ClientMessage, ReliableFrame};
use crate::transport::{MediaEvent, MediaSource, TransportKind};

/// Always-on bidirectional channel to the streaming server.
pub struct ReliableChannel {
    outgoing: mpsc::UnboundedSender<Message>,
    connected: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
}

impl ReliableChannel {
    /// Connect and spawn the read/write tasks. Inbound traffic is decoded
    /// into [`MediaEvent`]s on `media_tx`.
    pub async fn connect(
        url: &str,
        media_tx: mpsc::Sender<MediaEvent>,
    ) -> Result<Self, TransportError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        tracing::info!(url, "reliable channel connected");
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let connected = Arc::new(AtomicBool::new(true));

        // Writer task: serializes all outbound traffic onto the sink.
        let writer_connected = connected.clone();
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if let Err(e) = ws_tx.send(msg).await {
                    tracing::warn!(error = %e, "reliable channel send failed");
                    break;
                }
            }
            writer_connected.store(false, Ordering::SeqCst);
        });

        // Reader task: decodes inbound traffic into media events.
        let reader_connected = connected.clone();
        tokio::spawn(async move {
            let reason = loop {
                tokio::select! {
                    msg = ws_rx.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str(text.as_str()) {
                                Ok(server_msg) => {
                                    if media_tx.send(MediaEvent::Control(server_msg)).await.is_err() {
                                        break "session gone".to_string();
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "invalid control message");
                                }
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if let Some(event) = Self::decode_binary(&data) {
                                if media_tx.send(event).await.is_err() {
                                    break "session gone".to_string();
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break frame
                                .map(|f| f.reason.to_string())
                                .unwrap_or_else(|| "closed by server".to_string());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break e.to_string(),
                        None => break "connection lost".to_string(),
                    },
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break "client shutdown".to_string();
                        }
                    }
                }
            };

            reader_connected.store(false, Ordering::SeqCst);
            let _ = media_tx
                .send(MediaEvent::Disconnected {
                    origin: TransportKind::Reliable,
                    reason,
                })
                .await;
        });

        Ok(Self {
            outgoing,
            connected,
            shutdown,
        })
    }

    fn decode_binary(data: &[u8]) -> Option<MediaEvent> {
        match ReliableFrame::parse(data) {
            Ok(ReliableFrame::Video { format, data }) => Some(MediaEvent::VideoFrame {
                origin: TransportKind::Reliable,
                format,
                data,
            }),
            Ok(ReliableFrame::Audio { block }) => Some(MediaEvent::AudioBlock {
                origin: TransportKind::Reliable,
                block,
            }),
            Ok(ReliableFrame::SaveState { state, thumbnail }) => {
                Some(MediaEvent::SaveState { state, thumbnail })
            }
            Err(_) => {
                tracing::debug!(len = data.len(), "dropped malformed binary frame");
                None
            }
        }
    }

    /// Send a JSON control message.
    pub fn send(&self, msg: &ClientMessage) -> Result<(), TransportError> {
        let text =
            serde_json::to_string(msg).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.outgoing
            .send(Message::Text(text.into()))
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Send a binary frame (e.g. a load-state payload).
    pub fn send_frame(&self, frame: &ReliableFrame) -> Result<(), TransportError> {
        self.outgoing
            .send(Message::Binary(frame.to_bytes()))
            .map_err(|_| TransportError::ChannelClosed)
    }
}

impl MediaSource for ReliableChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Reliable
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let _ = self.outgoing.send(Message::Close(None));
    }
}

impl Drop for ReliableChannel {
    fn drop(&mut self) {
        MediaSource::shutdown(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_audio_block;
    use crate::protocol::AudioFormat;
    use bytes::Bytes;

    #[test]
    fn test_decode_binary_video() {
        let frame = ReliableFrame::Video {
            format: 0,
            data: Bytes::from_static(b"img"),
        };
        let event = ReliableChannel::decode_binary(&frame.to_bytes()).unwrap();
        assert!(matches!(
            event,
            MediaEvent::VideoFrame {
                origin: TransportKind::Reliable,
                format: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_binary_audio() {
        let block = build_audio_block(48000, 2, AudioFormat::Pcm, &[0, 0, 0, 0]);
        let frame = ReliableFrame::Audio { block };
        let event = ReliableChannel::decode_binary(&frame.to_bytes()).unwrap();
        assert!(matches!(event, MediaEvent::AudioBlock { .. }));
    }

    #[test]
    fn test_decode_binary_garbage_dropped() {
        assert!(ReliableChannel::decode_binary(&[0xFE, 1, 2, 3]).is_none());
        assert!(ReliableChannel::decode_binary(&[]).is_none());
    }
}
