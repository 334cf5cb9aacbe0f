//! Per-participant call negotiation client.
//!
//! [`client::PeerCallClient`] drives one side of a two-party call against
//! the Switchboard relay: it acquires local media before signaling, owns one
//! negotiation engine per call, fixes the offer-originator role at session
//! start (only the inviter offers - glare cannot occur), buffers early
//! connectivity candidates, and tears down deterministically on any terminal
//! event.
//!
//! Media capture and the negotiation engine are trait seams ([`engine`]), so
//! the client embeds against a real WebRTC stack in production and scripted
//! fakes in tests. "Connected" is only ever derived from engine events
//! (track received, connectivity reports), never from a relay message - the
//! relay cannot see the media plane.

#![warn(clippy::pedantic)]

pub mod client;
pub mod engine;
pub mod errors;
pub mod negotiation;

pub use client::{CallNotification, CallPhase, PeerCallClient};
pub use engine::{
    ConnectivityState, EngineEvent, EngineFactory, LocalMedia, MediaSource, NegotiationEngine,
    SignalingState, TrackKind,
};
pub use errors::PeerError;
pub use negotiation::{Negotiation, NegotiationRole, NegotiationState};
