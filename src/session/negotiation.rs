//! Offer/answer negotiation bookkeeping
//!
//! The server sends its offer and trickles ICE candidates through the
//! reliable channel. Candidates can arrive before the offer has been
//! applied; they are buffered and flushed, in arrival order, immediately
//! after the remote description is set. Nothing is dropped.

use std::sync::Arc;

use crate::error::TransportError;
use crate::transport::CandidateInit;

/// What negotiation needs from a peer connection.
///
/// [`crate::transport::PeerTransport`] is the real implementation; tests
/// use a recording mock.
pub trait PeerEndpoint: Send + Sync {
    /// Apply a remote offer and return the local answer SDP.
    fn set_remote_offer(
        &self,
        sdp: String,
    ) -> impl std::future::Future<Output = Result<String, TransportError>> + Send;

    fn add_remote_candidate(
        &self,
        candidate: CandidateInit,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}

/// Per-session negotiation state.
pub struct Negotiation<P: PeerEndpoint> {
    peer: Arc<P>,
    remote_description_set: bool,
    pending: Vec<CandidateInit>,
    candidates_applied: u64,
}

impl<P: PeerEndpoint> Negotiation<P> {
    pub fn new(peer: Arc<P>) -> Self {
        Self {
            peer,
            remote_description_set: false,
            pending: Vec::new(),
            candidates_applied: 0,
        }
    }

    /// Apply the remote offer, then flush every buffered candidate in
    /// arrival order. Returns the answer SDP to send back.
    pub async fn handle_offer(&mut self, sdp: String) -> Result<String, TransportError> {
        let answer = self.peer.set_remote_offer(sdp).await?;
        self.remote_description_set = true;

        for candidate in std::mem::take(&mut self.pending) {
            if let Err(e) = self.peer.add_remote_candidate(candidate).await {
                // A single bad candidate is not fatal; others may connect.
                tracing::warn!(error = %e, "failed to add buffered ICE candidate");
            } else {
                self.candidates_applied += 1;
            }
        }

        Ok(answer)
    }

    /// Apply a remote candidate, or buffer it if the remote description is
    /// not set yet.
    pub async fn handle_candidate(
        &mut self,
        candidate: CandidateInit,
    ) -> Result<(), TransportError> {
        if !self.remote_description_set {
            self.pending.push(candidate);
            return Ok(());
        }
        self.peer.add_remote_candidate(candidate).await?;
        self.candidates_applied += 1;
        Ok(())
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    pub fn candidates_applied(&self) -> u64 {
        self.candidates_applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MockPeer {
        applied: Mutex<Vec<String>>,
        offer_seen: Mutex<Option<String>>,
        fail_candidates: bool,
    }

    impl PeerEndpoint for MockPeer {
        fn set_remote_offer(
            &self,
            sdp: String,
        ) -> impl std::future::Future<Output = Result<String, TransportError>> + Send {
            async move {
                *self.offer_seen.lock() = Some(sdp);
                Ok("answer-sdp".to_string())
            }
        }

        fn add_remote_candidate(
            &self,
            candidate: CandidateInit,
        ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send {
            async move {
                if self.fail_candidates {
                    return Err(TransportError::SignalingFailed("nope".to_string()));
                }
                self.applied.lock().push(candidate.candidate);
                Ok(())
            }
        }
    }

    fn candidate(n: u32) -> CandidateInit {
        CandidateInit {
            candidate: format!("candidate-{n}"),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }
    }

    #[tokio::test]
    async fn test_early_candidates_buffered_then_flushed_in_order() {
        let peer = Arc::new(MockPeer::default());
        let mut negotiation = Negotiation::new(peer.clone());

        negotiation.handle_candidate(candidate(1)).await.unwrap();
        negotiation.handle_candidate(candidate(2)).await.unwrap();
        negotiation.handle_candidate(candidate(3)).await.unwrap();
        assert_eq!(negotiation.pending_candidates(), 3);
        assert!(peer.applied.lock().is_empty());

        let answer = negotiation.handle_offer("offer-sdp".to_string()).await.unwrap();
        assert_eq!(answer, "answer-sdp");
        assert_eq!(negotiation.pending_candidates(), 0);
        assert_eq!(
            *peer.applied.lock(),
            vec!["candidate-1", "candidate-2", "candidate-3"]
        );
    }

    #[tokio::test]
    async fn test_late_candidates_applied_directly() {
        let peer = Arc::new(MockPeer::default());
        let mut negotiation = Negotiation::new(peer.clone());

        negotiation.handle_offer("offer".to_string()).await.unwrap();
        negotiation.handle_candidate(candidate(7)).await.unwrap();

        assert_eq!(*peer.applied.lock(), vec!["candidate-7"]);
        assert_eq!(negotiation.candidates_applied(), 1);
    }

    #[tokio::test]
    async fn test_bad_buffered_candidate_does_not_abort_flush() {
        let peer = Arc::new(MockPeer {
            fail_candidates: true,
            ..Default::default()
        });
        let mut negotiation = Negotiation::new(peer.clone());

        negotiation.handle_candidate(candidate(1)).await.unwrap();
        // The offer still succeeds even though the flush fails.
        negotiation.handle_offer("offer".to_string()).await.unwrap();
        assert!(negotiation.remote_description_set());
    }
}
