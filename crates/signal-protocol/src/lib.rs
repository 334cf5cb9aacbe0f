//! Signaling wire protocol for Switchboard.
//!
//! This crate defines the JSON event vocabulary exchanged between clients
//! and the call relay, plus the identifier and payload types both sides
//! share. Events are externally tagged (`event` / `data`) with kebab-case
//! event names so a frame reads as, for example:
//!
//! ```json
//! {"event":"initiate-video-call","data":{"callerId":"u1","receiverId":"u2"}}
//! ```
//!
//! The relay treats session descriptions and connectivity candidates as
//! opaque payloads; only the peer clients interpret them.

#![warn(clippy::pedantic)]

pub mod events;
pub mod types;

pub use events::{ClientEvent, ServerEvent};
pub use types::{CallId, CallStatus, IceCandidate, SdpType, SessionDescription, UserId};
