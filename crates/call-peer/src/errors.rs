//! Peer client error types.

use thiserror::Error;

/// Errors surfaced by the peer negotiation client. Every failure path that
/// carries one of these also resolves to a full local teardown.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Local media (camera/microphone) could not be acquired.
    #[error("media acquisition failed: {0}")]
    MediaAcquisition(String),

    /// The negotiation engine failed creating or applying a description.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// The channel to the relay (or the embedding application) is gone.
    #[error("signaling channel closed")]
    ChannelClosed,

    /// `accept_call`/`reject_call` without a pending invite.
    #[error("no incoming call")]
    NoIncomingCall,

    /// `start_call` while a call is already active.
    #[error("call already in progress")]
    CallInProgress,
}
