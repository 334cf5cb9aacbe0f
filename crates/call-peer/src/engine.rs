//! Trait seams between the call client and the platform media stack.
//!
//! Production wires these to a real WebRTC implementation; tests use
//! scripted fakes. The engine reports transport-level happenings (tracks,
//! connectivity, locally gathered candidates) through the event sender it is
//! given at creation time.

use async_trait::async_trait;
use tokio::sync::mpsc;

use signal_protocol::{IceCandidate, SessionDescription};

use crate::errors::PeerError;

/// Media track kinds a participant can toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Offer/answer position of the negotiation engine, mirroring the subset of
/// signaling states the client gates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    /// No outstanding local description.
    Stable,
    /// A local offer is applied and awaiting exactly one answer.
    HaveLocalOffer,
    /// A remote offer is applied and awaiting the local answer.
    HaveRemoteOffer,
}

/// Transport-level connectivity as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Connected,
    Disconnected,
    Failed,
}

/// Events the engine pushes toward the client.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A remote media track arrived; media is flowing.
    TrackReceived,
    /// The connectivity checks changed state.
    Connectivity(ConnectivityState),
    /// A locally gathered candidate ready to be relayed to the peer.
    LocalCandidate(IceCandidate),
}

/// A handle on acquired local media.
pub trait LocalMedia: Send {
    fn set_track_enabled(&mut self, kind: TrackKind, enabled: bool);
    fn track_enabled(&self, kind: TrackKind) -> bool;
    /// Release the capture devices. Called exactly once, on teardown.
    fn stop(&mut self);
}

/// Fallible, blocking acquisition of camera and microphone. Must complete
/// before any signaling that references local media is sent.
#[async_trait]
pub trait MediaSource: Send {
    async fn acquire(&mut self) -> Result<Box<dyn LocalMedia>, PeerError>;
}

/// One negotiation engine instance, owned by the client for the life of a
/// single call.
#[async_trait]
pub trait NegotiationEngine: Send {
    /// Create the local offer and apply it as the local description.
    async fn create_offer(&mut self) -> Result<SessionDescription, PeerError>;

    /// Create the local answer and apply it as the local description.
    async fn create_answer(&mut self) -> Result<SessionDescription, PeerError>;

    /// Apply the counterpart's description.
    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), PeerError>;

    /// Apply a relayed connectivity candidate.
    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), PeerError>;

    fn signaling_state(&self) -> SignalingState;

    /// Shut the engine down. Called exactly once, on teardown.
    fn close(&mut self);
}

/// Creates one engine per call, wired to the given event sender.
pub trait EngineFactory: Send {
    /// # Errors
    ///
    /// Returns `PeerError::Negotiation` when the platform stack cannot
    /// construct an engine.
    fn create(
        &mut self,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Box<dyn NegotiationEngine>, PeerError>;
}
