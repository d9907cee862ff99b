//! Session lifecycle management
//!
//! One manager owns every session a consumer creates (at most one active
//! at a time, since they share the display and audio device). Each
//! session runs a pump task that drains the unified [`MediaEvent`] queue:
//! signaling drives negotiation, media is decoded and fanned out to the
//! scheduler and renderer, and everything the consumer should see becomes
//! a [`SessionEvent`].

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::audio::output::{probe_output_config, AudioOutput};
use crate::audio::scheduler::{PlaybackScheduler, SchedulerConfig};
use crate::audio::{adapt_channels, AudioFrame};
use crate::codec::{self, resample, AdpcmDecoder};
use crate::config::AppConfig;
use crate::constants::EVENT_QUEUE_CAPACITY;
use crate::error::{Error, Result, SessionError, TransportError};
use crate::input::{Edge, InputEvent};
use crate::protocol::{
    parse_audio_block, AudioFormat, ClientMessage, ReliableFrame, ServerMessage,
};
use crate::session::negotiation::Negotiation;
use crate::session::{SaveStatePayload, SessionEvent, SessionState};
use crate::transport::{
    CandidateInit, MediaEvent, MediaSource, PeerTransport, ReliableChannel, TransportKind,
    TransportMode,
};
use crate::video::{LiveFrameSource, VideoPipeline};

/// Peer transport plus its negotiation bookkeeping.
struct PeerRuntime {
    transport: Arc<PeerTransport>,
    negotiation: Negotiation<PeerTransport>,
    video_source: LiveFrameSource,
}

/// One emulator run bound to this client.
pub struct SessionHandle {
    id: String,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    mode: Mutex<TransportMode>,
    peer_requested: AtomicBool,

    reliable: Arc<ReliableChannel>,
    peer: tokio::sync::Mutex<Option<PeerRuntime>>,
    media_tx: mpsc::Sender<MediaEvent>,

    scheduler: Arc<PlaybackScheduler>,
    output: Mutex<Option<AudioOutput>>,
    decoder: Mutex<AdpcmDecoder>,
    device_rate: u32,
    device_channels: u16,

    pipeline: Arc<VideoPipeline>,

    events_tx: mpsc::Sender<SessionEvent>,
    save_waiter: Mutex<Option<oneshot::Sender<SaveStatePayload>>>,
    load_waiter: Mutex<Option<oneshot::Sender<bool>>>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.try_send(event);
    }

    /// Release every session resource. Safe to call repeatedly.
    async fn teardown(&self, reason: &str) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }

        if let Some(runtime) = self.peer.lock().await.take() {
            runtime.transport.close().await;
        }
        self.pipeline.stop_continuous();
        if let Some(mut output) = self.output.lock().take() {
            output.stop();
        }
        self.scheduler.clear();

        let _ = self.reliable.send(&ClientMessage::Unsubscribe {
            session_id: self.id.clone(),
        });
        MediaSource::shutdown(self.reliable.as_ref());

        self.emit(SessionEvent::Disconnected {
            transport: TransportKind::Reliable,
            reason: reason.to_string(),
        });
        tracing::info!(session = %self.id, reason, "session closed");
    }
}

/// Session statistics for monitoring surfaces.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub state: SessionState,
    pub mode: TransportMode,
    pub queued_audio_ms: u32,
    pub audio_underruns: u64,
    pub audio_blocks_decoded: u64,
    pub audio_blocks_failed: u64,
    pub frames_drawn: u64,
    pub frames_dropped: u64,
}

/// Entry point for the consumer (the UI layer).
pub struct SessionManager {
    config: AppConfig,
    sessions: DashMap<String, Arc<SessionHandle>>,
}

impl SessionManager {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    fn get(&self, session_id: &str) -> Result<Arc<SessionHandle>> {
        self.sessions
            .get(session_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()).into())
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.network.request_timeout_ms)
    }

    /// Create a session for `rom` and return its id plus the event queue
    /// the consumer subscribes to.
    pub async fn create_session(
        &self,
        rom: &str,
        mode: TransportMode,
    ) -> Result<(String, mpsc::Receiver<SessionEvent>)> {
        if self
            .sessions
            .iter()
            .any(|s| s.value().state() != SessionState::Closed)
        {
            return Err(SessionError::AlreadyActive.into());
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (media_tx, mut media_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let reliable =
            Arc::new(ReliableChannel::connect(&self.config.network.ws_url, media_tx.clone()).await?);
        reliable.send(&ClientMessage::CreateSession {
            rom: rom.to_string(),
            client_id: Uuid::new_v4().to_string(),
        })?;

        let session_id = self.await_session_created(&mut media_rx).await?;
        reliable.send(&ClientMessage::Subscribe {
            session_id: session_id.clone(),
        })?;

        // Audio is best-effort: without a playback device the session
        // continues video-only (the consumer hears about it once).
        let (scheduler, output, device_rate, device_channels, audio_error) =
            self.setup_audio();

        let pipeline = Arc::new(VideoPipeline::new(
            self.config.video.width,
            self.config.video.height,
            events_tx.clone(),
        ));

        let handle = Arc::new(SessionHandle {
            id: session_id.clone(),
            created_at: Utc::now(),
            state: Mutex::new(SessionState::Created),
            mode: Mutex::new(mode),
            peer_requested: AtomicBool::new(false),
            reliable,
            peer: tokio::sync::Mutex::new(None),
            media_tx,
            scheduler,
            output: Mutex::new(output),
            decoder: Mutex::new(AdpcmDecoder::new()),
            device_rate,
            device_channels,
            pipeline,
            events_tx,
            save_waiter: Mutex::new(None),
            load_waiter: Mutex::new(None),
        });

        handle.emit(SessionEvent::Connected {
            transport: TransportKind::Reliable,
        });
        if let Some(message) = audio_error {
            handle.emit(SessionEvent::Error { message });
        } else {
            handle.emit(SessionEvent::AudioReady);
        }

        if mode.wants_peer() {
            self.request_peer(&handle)?;
        }

        self.sessions.insert(session_id.clone(), handle.clone());
        let stun = self.config.network.stun_servers.clone();
        tokio::spawn(async move {
            pump(handle, media_rx, stun).await;
        });

        Ok((session_id, events_rx))
    }

    async fn await_session_created(
        &self,
        media_rx: &mut mpsc::Receiver<MediaEvent>,
    ) -> Result<String> {
        let deadline = tokio::time::Instant::now() + self.request_timeout();
        loop {
            let event = tokio::time::timeout_at(deadline, media_rx.recv())
                .await
                .map_err(|_| Error::Transport(TransportError::Timeout))?
                .ok_or(Error::Transport(TransportError::ChannelClosed))?;

            match event {
                MediaEvent::Control(ServerMessage::SessionCreated { session_id }) => {
                    return Ok(session_id);
                }
                MediaEvent::Control(ServerMessage::Error { message }) => {
                    return Err(SessionError::Rejected(message).into());
                }
                MediaEvent::Disconnected { reason, .. } => {
                    return Err(Error::Transport(TransportError::ConnectionFailed(reason)));
                }
                other => {
                    tracing::debug!(?other, "event before session id, ignoring");
                }
            }
        }
    }

    fn setup_audio(
        &self,
    ) -> (
        Arc<PlaybackScheduler>,
        Option<AudioOutput>,
        u32,
        u16,
        Option<String>,
    ) {
        let ceiling_ms = self.config.audio.jitter_ceiling_ms;
        match probe_output_config() {
            Ok((rate, channels)) => {
                let scheduler = Arc::new(PlaybackScheduler::new(SchedulerConfig {
                    sample_rate: rate,
                    channels,
                    ceiling_ms,
                }));
                let mut output_err = None;
                let output = match AudioOutput::new(scheduler.clone()) {
                    Ok(mut output) => match output.start() {
                        Ok(()) => Some(output),
                        Err(e) => {
                            output_err = Some(format!("audio output failed: {e}"));
                            None
                        }
                    },
                    Err(e) => {
                        output_err = Some(format!("audio output failed: {e}"));
                        None
                    }
                };
                (scheduler, output, rate, channels, output_err)
            }
            Err(e) => {
                let scheduler = Arc::new(PlaybackScheduler::new(SchedulerConfig {
                    ceiling_ms,
                    ..SchedulerConfig::default()
                }));
                let config = scheduler.config().clone();
                (
                    scheduler,
                    None,
                    config.sample_rate,
                    config.channels,
                    Some(format!("no playback device: {e}")),
                )
            }
        }
    }

    /// Toggle the emulator run state on. Orthogonal to transport mode.
    pub fn start_session(&self, session_id: &str) -> Result<()> {
        let handle = self.get(session_id)?;
        match handle.state() {
            SessionState::Created | SessionState::Running => {}
            state => {
                return Err(SessionError::InvalidState(format!("{state:?}")).into());
            }
        }
        handle.reliable.send(&ClientMessage::Start {
            session_id: session_id.to_string(),
        })?;
        handle.set_state(SessionState::Starting);
        Ok(())
    }

    /// Tear the session down: stop the emulator, close both transports,
    /// release the audio device and cancel the render loop. Idempotent.
    pub async fn stop_session(&self, session_id: &str) -> Result<()> {
        let handle = self.get(session_id)?;
        if handle.state() == SessionState::Closed {
            return Ok(());
        }
        handle.set_state(SessionState::Stopping);
        let _ = handle.reliable.send(&ClientMessage::Stop {
            session_id: session_id.to_string(),
        });
        handle.teardown("stopped by client").await;
        Ok(())
    }

    /// Send one button transition over the fastest available path.
    pub async fn send_input(&self, session_id: &str, button: &str, edge: Edge) -> Result<()> {
        let handle = self.get(session_id)?;
        let event = InputEvent::new(button, edge);

        {
            let peer = handle.peer.lock().await;
            if let Some(runtime) = peer.as_ref() {
                if runtime.transport.input_ready()
                    && runtime.transport.send_input(event.encode()).await.is_ok()
                {
                    return Ok(());
                }
            }
        }

        // Fallback path: same semantic content, richer framing.
        handle.reliable.send(&ClientMessage::Input {
            session_id: session_id.to_string(),
            button: event.button,
            pressed: event.edge.is_down(),
        })?;
        Ok(())
    }

    /// Change the delivery mode mid-session.
    ///
    /// Never interrupts audio scheduling; stale buffered audio is cleared
    /// so the old and new paths cannot mix.
    pub async fn set_stream_mode(&self, session_id: &str, mode: TransportMode) -> Result<()> {
        let handle = self.get(session_id)?;
        if handle.state() == SessionState::Closed {
            return Err(SessionError::InvalidState("Closed".to_string()).into());
        }

        let previous = {
            let mut current = handle.mode.lock();
            let previous = *current;
            *current = mode;
            previous
        };
        if previous == mode {
            return Ok(());
        }

        handle.scheduler.clear();

        if mode.wants_peer() {
            if handle.peer.lock().await.is_none() {
                self.request_peer(&handle)?;
            }
        } else if let Some(runtime) = handle.peer.lock().await.take() {
            handle.peer_requested.store(false, Ordering::SeqCst);
            handle.pipeline.stop_continuous();
            runtime.transport.close().await;
        }
        Ok(())
    }

    pub fn get_stream_mode(&self, session_id: &str) -> Result<TransportMode> {
        Ok(*self.get(session_id)?.mode.lock())
    }

    pub fn session_state(&self, session_id: &str) -> Result<SessionState> {
        Ok(self.get(session_id)?.state())
    }

    /// Snapshot a session's pipeline statistics.
    pub fn session_stats(&self, session_id: &str) -> Result<SessionStats> {
        let handle = self.get(session_id)?;
        let scheduler_stats = handle.scheduler.stats();
        let decoder_stats = handle.decoder.lock().stats();
        let mode = *handle.mode.lock();
        Ok(SessionStats {
            state: handle.state(),
            mode,
            queued_audio_ms: handle.scheduler.queued_ms(),
            audio_underruns: scheduler_stats.underruns,
            audio_blocks_decoded: decoder_stats.blocks_decoded,
            audio_blocks_failed: decoder_stats.blocks_failed,
            frames_drawn: handle.pipeline.frames_drawn(),
            frames_dropped: handle.pipeline.frames_dropped(),
        })
    }

    /// Request an emulator save state; blobs are opaque to the core.
    pub async fn save_state(&self, session_id: &str) -> Result<SaveStatePayload> {
        let handle = self.get(session_id)?;
        let (tx, rx) = oneshot::channel();
        *handle.save_waiter.lock() = Some(tx);

        handle.reliable.send(&ClientMessage::SaveState {
            session_id: session_id.to_string(),
        })?;

        match tokio::time::timeout(self.request_timeout(), rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(Error::Transport(TransportError::ChannelClosed)),
            Err(_) => {
                handle.save_waiter.lock().take();
                Err(Error::Transport(TransportError::Timeout))
            }
        }
    }

    /// Upload a previously saved state blob.
    pub async fn load_state(&self, session_id: &str, state: Bytes) -> Result<bool> {
        let handle = self.get(session_id)?;
        let (tx, rx) = oneshot::channel();
        *handle.load_waiter.lock() = Some(tx);

        handle.reliable.send(&ClientMessage::LoadState {
            session_id: session_id.to_string(),
        })?;
        handle.reliable.send_frame(&ReliableFrame::SaveState {
            state,
            thumbnail: None,
        })?;

        match tokio::time::timeout(self.request_timeout(), rx).await {
            Ok(Ok(success)) => Ok(success),
            Ok(Err(_)) => Err(Error::Transport(TransportError::ChannelClosed)),
            Err(_) => {
                handle.load_waiter.lock().take();
                Err(Error::Transport(TransportError::Timeout))
            }
        }
    }

    /// Ask the server to negotiate a peer transport for this session.
    fn request_peer(&self, handle: &Arc<SessionHandle>) -> Result<()> {
        let state = handle.state();
        if !state.allows_peer_request() {
            return Err(SessionError::InvalidState(format!("{state:?}")).into());
        }
        handle.peer_requested.store(true, Ordering::SeqCst);
        handle.reliable.send(&ClientMessage::RequestPeer {
            session_id: handle.id.clone(),
        })?;
        Ok(())
    }
}

/// Decode one audio block and hand it to the scheduler, adapted to the
/// playback device's rate and channel layout. Bad blocks are dropped.
fn process_audio_block(
    block: &[u8],
    device_rate: u32,
    device_channels: u16,
    decoder: &mut AdpcmDecoder,
    scheduler: &PlaybackScheduler,
) {
    let (header, payload) = match parse_audio_block(block) {
        Ok(parsed) => parsed,
        Err(_) => {
            tracing::debug!(len = block.len(), "dropped unparseable audio block");
            return;
        }
    };

    let samples = match header.format {
        AudioFormat::Pcm => codec::pcm_bytes_to_i16(payload),
        AudioFormat::Adpcm => match decoder.decode(payload, header.channels) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::debug!(error = %e, "dropped undecodable audio block");
                return;
            }
        },
    };

    let frame = AudioFrame::new(
        codec::samples_to_f32(&samples),
        header.sample_rate,
        header.channels as u16,
    );
    let adapted = adapt_channels(frame.samples, header.channels as u16, device_channels);
    let resampled = resample(adapted, frame.sample_rate, device_rate, device_channels);
    scheduler.push(resampled);
}

/// Per-session event pump: drains the unified media queue until the
/// reliable channel goes away or the session is torn down.
async fn pump(
    handle: Arc<SessionHandle>,
    mut media_rx: mpsc::Receiver<MediaEvent>,
    stun_servers: Vec<String>,
) {
    // Candidates that arrive before the peer transport exists.
    let mut early_candidates: Vec<CandidateInit> = Vec::new();

    while let Some(event) = media_rx.recv().await {
        if handle.state() == SessionState::Closed {
            break;
        }

        match event {
            MediaEvent::Control(msg) => {
                handle_control(&handle, msg, &stun_servers, &mut early_candidates).await;
            }
            MediaEvent::VideoFrame { data, .. } => {
                handle.pipeline.handle_discrete(&data);
            }
            MediaEvent::AudioBlock { block, .. } => {
                process_audio_block(
                    &block,
                    handle.device_rate,
                    handle.device_channels,
                    &mut handle.decoder.lock(),
                    &handle.scheduler,
                );
            }
            MediaEvent::SaveState { state, thumbnail } => {
                let payload = SaveStatePayload {
                    state: state.clone(),
                    thumbnail: thumbnail.clone(),
                };
                if let Some(waiter) = handle.save_waiter.lock().take() {
                    let _ = waiter.send(payload);
                }
                handle.emit(SessionEvent::StateSaved { state, thumbnail });
            }
            MediaEvent::Connected(TransportKind::Peer) => {
                handle.emit(SessionEvent::Connected {
                    transport: TransportKind::Peer,
                });
                // The peer video track is a continuous source; start
                // draining it at display refresh.
                let peer = handle.peer.lock().await;
                if let Some(runtime) = peer.as_ref() {
                    if let Err(e) = handle
                        .pipeline
                        .start_continuous(runtime.video_source.clone())
                    {
                        tracing::debug!(error = %e, "render loop already active");
                    }
                }
            }
            MediaEvent::Connected(TransportKind::Reliable) => {
                handle.emit(SessionEvent::Connected {
                    transport: TransportKind::Reliable,
                });
            }
            MediaEvent::Disconnected {
                origin: TransportKind::Reliable,
                reason,
            } => {
                // Losing the control channel fails the whole session.
                handle.teardown(&reason).await;
                break;
            }
            MediaEvent::Disconnected {
                origin: TransportKind::Peer,
                reason,
            } => {
                handle_peer_loss(&handle, &reason).await;
            }
            MediaEvent::PeerInputOpen => {
                tracing::debug!(session = %handle.id, "peer input channel open");
            }
            MediaEvent::TransportError { origin, message } => {
                tracing::warn!(session = %handle.id, ?origin, message, "transport error");
                handle.emit(SessionEvent::Error { message });
            }
        }
    }
}

async fn handle_control(
    handle: &Arc<SessionHandle>,
    msg: ServerMessage,
    stun_servers: &[String],
    early_candidates: &mut Vec<CandidateInit>,
) {
    match msg {
        ServerMessage::Started { .. } => {
            handle.set_state(SessionState::Running);
        }
        ServerMessage::Stopped { .. } => {
            // Emulator paused; the session itself stays alive.
            if handle.state() == SessionState::Running {
                handle.set_state(SessionState::Created);
            }
        }
        ServerMessage::Offer { sdp, .. } => {
            if !handle.peer_requested.load(Ordering::SeqCst) {
                tracing::warn!(session = %handle.id, "unsolicited offer ignored");
                return;
            }
            if let Err(e) = handle_offer(handle, sdp, stun_servers, early_candidates).await {
                // Negotiation failure never touches the reliable path: the
                // session degrades to it and keeps going.
                tracing::warn!(session = %handle.id, error = %e, "peer negotiation failed");
                handle.peer_requested.store(false, Ordering::SeqCst);
                *handle.mode.lock() = TransportMode::Reliable;
                if let Some(runtime) = handle.peer.lock().await.take() {
                    runtime.transport.close().await;
                }
                handle.emit(SessionEvent::Error {
                    message: format!("peer negotiation failed: {e}"),
                });
            }
        }
        ServerMessage::IceCandidate {
            candidate,
            sdp_mid,
            sdp_mline_index,
        } => {
            let candidate = CandidateInit {
                candidate,
                sdp_mid,
                sdp_mline_index,
            };
            let mut peer = handle.peer.lock().await;
            match peer.as_mut() {
                Some(runtime) => {
                    if let Err(e) = runtime.negotiation.handle_candidate(candidate).await {
                        tracing::warn!(session = %handle.id, error = %e, "candidate rejected");
                    }
                }
                None => early_candidates.push(candidate),
            }
        }
        ServerMessage::LoadStateResult { success, .. } => {
            if let Some(waiter) = handle.load_waiter.lock().take() {
                let _ = waiter.send(success);
            }
        }
        ServerMessage::Error { message } => {
            handle.emit(SessionEvent::Error { message });
        }
        ServerMessage::SessionCreated { .. } => {}
    }
}

/// Build the peer transport (first offer only), apply the offer, answer,
/// and flush any candidates that arrived early.
async fn handle_offer(
    handle: &Arc<SessionHandle>,
    sdp: String,
    stun_servers: &[String],
    early_candidates: &mut Vec<CandidateInit>,
) -> std::result::Result<(), TransportError> {
    let mut peer = handle.peer.lock().await;

    if peer.is_none() {
        let video_source = LiveFrameSource::new();
        let (candidate_tx, mut candidate_rx) = mpsc::unbounded_channel::<CandidateInit>();
        let transport = PeerTransport::new(
            stun_servers.to_vec(),
            handle.media_tx.clone(),
            video_source.clone(),
            candidate_tx,
        )
        .await?;

        // Trickle local candidates back through the signaling path.
        let reliable = handle.reliable.clone();
        let session_id = handle.id.clone();
        tokio::spawn(async move {
            while let Some(c) = candidate_rx.recv().await {
                let _ = reliable.send(&ClientMessage::IceCandidate {
                    session_id: session_id.clone(),
                    candidate: c.candidate,
                    sdp_mid: c.sdp_mid,
                    sdp_mline_index: c.sdp_mline_index,
                });
            }
        });

        let mut negotiation = Negotiation::new(transport.clone());
        for candidate in early_candidates.drain(..) {
            let _ = negotiation.handle_candidate(candidate).await;
        }

        *peer = Some(PeerRuntime {
            transport,
            negotiation,
            video_source,
        });
    }

    if let Some(runtime) = peer.as_mut() {
        let answer = runtime.negotiation.handle_offer(sdp).await?;
        handle.reliable.send(&ClientMessage::Answer {
            session_id: handle.id.clone(),
            sdp: answer,
        })?;
    }
    Ok(())
}

/// A lost peer transport downgrades the session, never kills it.
async fn handle_peer_loss(handle: &Arc<SessionHandle>, reason: &str) {
    let had_peer = handle.peer.lock().await.take().is_some();
    if !had_peer {
        return;
    }
    handle.peer_requested.store(false, Ordering::SeqCst);
    handle.pipeline.stop_continuous();
    // Do not mix buffered peer audio with the reliable path.
    handle.scheduler.clear();
    *handle.mode.lock() = TransportMode::Reliable;

    handle.emit(SessionEvent::Disconnected {
        transport: TransportKind::Peer,
        reason: reason.to_string(),
    });
    tracing::info!(session = %handle.id, reason, "peer transport lost, continuing on reliable");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::adpcm;
    use crate::protocol::build_audio_block;

    fn scheduler_48k_stereo() -> PlaybackScheduler {
        PlaybackScheduler::new(SchedulerConfig {
            sample_rate: 48000,
            channels: 2,
            ceiling_ms: 80,
        })
    }

    #[test]
    fn test_process_pcm_block() {
        let scheduler = scheduler_48k_stereo();
        let mut decoder = AdpcmDecoder::new();
        let samples: Vec<i16> = vec![1000; 960]; // 480 stereo frames
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let block = build_audio_block(48000, 2, AudioFormat::Pcm, &payload);

        process_audio_block(&block, 48000, 2, &mut decoder, &scheduler);
        assert_eq!(scheduler.queued_samples(), 960);
    }

    #[test]
    fn test_process_adpcm_block_resampled() {
        let scheduler = scheduler_48k_stereo();
        let mut decoder = AdpcmDecoder::new();
        let samples: Vec<i16> = (0..656).map(|i| (i % 128) as i16).collect(); // 328 stereo frames
        let (encoded, _) = adpcm::encode(&samples, 2).unwrap();
        let block = build_audio_block(32768, 2, AudioFormat::Adpcm, &encoded);

        process_audio_block(&block, 48000, 2, &mut decoder, &scheduler);
        // 328 frames at 32768 Hz resample to 480 frames at 48 kHz.
        assert_eq!(scheduler.queued_samples(), 480 * 2);
        assert_eq!(decoder.stats().blocks_decoded, 1);
    }

    #[test]
    fn test_process_mono_block_upmixed() {
        let scheduler = scheduler_48k_stereo();
        let mut decoder = AdpcmDecoder::new();
        let payload: Vec<u8> = vec![100i16; 480]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let block = build_audio_block(48000, 1, AudioFormat::Pcm, &payload);

        process_audio_block(&block, 48000, 2, &mut decoder, &scheduler);
        assert_eq!(scheduler.queued_samples(), 960);
    }

    #[test]
    fn test_bad_block_dropped_silently() {
        let scheduler = scheduler_48k_stereo();
        let mut decoder = AdpcmDecoder::new();
        process_audio_block(&[1, 2, 3], 48000, 2, &mut decoder, &scheduler);
        // Truncated ADPCM payload (extended header promises more).
        let block = build_audio_block(48000, 2, AudioFormat::Adpcm, &[0x00]);
        process_audio_block(&block, 48000, 2, &mut decoder, &scheduler);

        assert_eq!(scheduler.queued_samples(), 0);
        assert_eq!(decoder.stats().blocks_failed, 1);
    }

    #[tokio::test]
    async fn test_create_session_unreachable_server() {
        let mut config = AppConfig::default();
        config.network.ws_url = "ws://127.0.0.1:9/stream".to_string();
        config.network.request_timeout_ms = 2000;
        let manager = SessionManager::new(config);

        let err = manager
            .create_session("game.gba", TransportMode::Reliable)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_session_operations() {
        let manager = SessionManager::new(AppConfig::default());

        assert!(matches!(
            manager.start_session("nope"),
            Err(Error::Session(SessionError::NotFound(_)))
        ));
        assert!(matches!(
            manager.get_stream_mode("nope"),
            Err(Error::Session(SessionError::NotFound(_)))
        ));
        assert!(matches!(
            manager.send_input("nope", "A", Edge::Down).await,
            Err(Error::Session(SessionError::NotFound(_)))
        ));
    }
}
