//! Video delivery pipeline
//!
//! Two consumption modes, selected by what the active transport provides:
//! discrete encoded frames (reliable channel) are decoded and drawn as they
//! arrive; a continuous source (peer video track) is drained by a render
//! loop paced at the display refresh interval. Both land on the same
//! [`RasterTarget`] and publish [`SessionEvent::VideoFrame`] snapshots.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

use crate::constants::REFRESH_INTERVAL_MS;
use crate::error::VideoError;
use crate::session::SessionEvent;
use crate::video::raster::RasterTarget;

/// Minimum spacing between decode-failure warnings
const DECODE_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Latest-frame slot fed by a live producer (the peer video track reader).
///
/// Holds at most one frame: a new frame replaces an unconsumed one, which
/// is the right policy for interactive video — always show the newest.
#[derive(Clone, Default)]
pub struct LiveFrameSource {
    slot: Arc<Mutex<Option<Bytes>>>,
}

impl LiveFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame, replacing any unconsumed one.
    pub fn publish(&self, frame: Bytes) {
        *self.slot.lock() = Some(frame);
    }

    /// Take the latest frame, leaving the slot empty.
    pub fn take(&self) -> Option<Bytes> {
        self.slot.lock().take()
    }
}

/// Transport-agnostic consumer of inbound video.
pub struct VideoPipeline {
    raster: Mutex<RasterTarget>,
    events: mpsc::Sender<SessionEvent>,
    /// Stop signal of the running continuous loop, if any
    loop_stop: Mutex<Option<watch::Sender<bool>>>,
    last_decode_log: Mutex<Instant>,
}

impl VideoPipeline {
    pub fn new(width: u32, height: u32, events: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            raster: Mutex::new(RasterTarget::new(width, height)),
            events,
            loop_stop: Mutex::new(None),
            last_decode_log: Mutex::new(
                Instant::now()
                    .checked_sub(DECODE_LOG_INTERVAL)
                    .unwrap_or_else(Instant::now),
            ),
        }
    }

    /// Decode and draw one discrete encoded frame, then publish the canvas.
    ///
    /// Malformed frames leave the fallback fill behind (never stale pixels)
    /// and are logged at a throttled rate.
    pub fn handle_discrete(&self, data: &[u8]) {
        let frame = {
            let mut raster = self.raster.lock();
            if let Err(e) = raster.draw_encoded(data) {
                self.log_decode_error(&e);
            }
            raster.snapshot()
        };
        let _ = self.events.try_send(SessionEvent::VideoFrame(frame));
    }

    /// Start the continuous render loop over a live frame source.
    ///
    /// The loop polls the source at the display refresh interval, draws each
    /// available frame, and releases it. It owns the source: stopping the
    /// loop drops it, so a renderer re-initialization cannot leak the old
    /// source into the new loop.
    pub fn start_continuous(
        self: &Arc<Self>,
        source: LiveFrameSource,
    ) -> Result<(), VideoError> {
        let mut guard = self.loop_stop.lock();
        if guard.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(VideoError::AlreadyRunning);
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        *guard = Some(stop_tx);
        drop(guard);

        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(REFRESH_INTERVAL_MS));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Some(frame) = source.take() {
                            pipeline.handle_discrete(&frame);
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("continuous render loop stopped");
        });

        Ok(())
    }

    /// Stop the continuous render loop. Idempotent.
    pub fn stop_continuous(&self) {
        if let Some(stop) = self.loop_stop.lock().take() {
            let _ = stop.send(true);
        }
    }

    /// Whether a continuous loop is active.
    pub fn continuous_running(&self) -> bool {
        self.loop_stop
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Current canvas snapshot.
    pub fn snapshot(&self) -> crate::video::RenderedFrame {
        self.raster.lock().snapshot()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.raster.lock().frames_drawn()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.raster.lock().frames_dropped()
    }

    fn log_decode_error(&self, e: &VideoError) {
        let mut last = self.last_decode_log.lock();
        if last.elapsed() >= DECODE_LOG_INTERVAL {
            *last = Instant::now();
            tracing::warn!(error = %e, "dropped undecodable video frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> (Arc<VideoPipeline>, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (Arc::new(VideoPipeline::new(4, 4, tx)), rx)
    }

    fn tiny_png() -> Vec<u8> {
        // Encode a 2x2 image through the same crate the decoder uses.
        let img = image::RgbaImage::from_fn(2, 2, |x, y| {
            image::Rgba([(x * 200) as u8, (y * 200) as u8, 0, 255])
        });
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_discrete_frame_published() {
        let (pipeline, mut rx) = pipeline();
        pipeline.handle_discrete(&tiny_png());

        let event = rx.recv().await.unwrap();
        match event {
            SessionEvent::VideoFrame(frame) => {
                assert_eq!(frame.width, 4);
                assert_eq!(frame.height, 4);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(pipeline.frames_drawn(), 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_publishes_fallback() {
        let (pipeline, mut rx) = pipeline();
        pipeline.handle_discrete(b"garbage");

        // A frame event is still published so the consumer sees the
        // fallback fill instead of a stale picture.
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::VideoFrame(_)
        ));
        assert_eq!(pipeline.frames_dropped(), 1);
    }

    #[tokio::test]
    async fn test_continuous_loop_draws_and_stops() {
        let (pipeline, mut rx) = pipeline();
        let source = LiveFrameSource::new();

        pipeline.start_continuous(source.clone()).unwrap();
        assert!(pipeline.continuous_running());

        source.publish(Bytes::from(tiny_png()));
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("render loop never drew the published frame")
            .unwrap();
        assert!(matches!(event, SessionEvent::VideoFrame(_)));

        pipeline.stop_continuous();
        pipeline.stop_continuous(); // idempotent
    }

    #[tokio::test]
    async fn test_second_loop_rejected_while_running() {
        let (pipeline, _rx) = pipeline();
        pipeline.start_continuous(LiveFrameSource::new()).unwrap();

        let err = pipeline.start_continuous(LiveFrameSource::new());
        assert!(matches!(err, Err(VideoError::AlreadyRunning)));

        pipeline.stop_continuous();
    }

    #[tokio::test]
    async fn test_loop_restart_after_stop() {
        let (pipeline, _rx) = pipeline();
        let first = LiveFrameSource::new();
        pipeline.start_continuous(first).unwrap();
        pipeline.stop_continuous();

        // Re-initialization gets a fresh loop with a fresh source.
        pipeline.start_continuous(LiveFrameSource::new()).unwrap();
        pipeline.stop_continuous();
    }

    #[test]
    fn test_latest_frame_replaces_unconsumed() {
        let source = LiveFrameSource::new();
        source.publish(Bytes::from_static(b"old"));
        source.publish(Bytes::from_static(b"new"));

        assert_eq!(source.take().unwrap(), Bytes::from_static(b"new"));
        assert!(source.take().is_none());
    }
}
