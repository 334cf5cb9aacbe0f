//! Switchboard Call Controller library.
//!
//! A stateful WebSocket signaling relay that coordinates two authenticated
//! users establishing a peer-to-peer audio/video session:
//!
//! - Presence directory mapping user ids to live connections
//! - Authoritative call-session registry and state machine
//! - Verbatim forwarding of offer/answer/candidate payloads
//! - Lifecycle supervision: dial timeout, connect timeout, stale-session sweep
//!
//! # Architecture
//!
//! All signaling state has a single owner:
//!
//! ```text
//! axum /ws ── per-socket reader ──► RegistryActor mailbox
//!                                        │ owns directory + sessions + timers
//!                                        ▼
//!                        ClientConnection senders ──► per-socket writers
//! ```
//!
//! The `RegistryActor` processes its mailbox serially, so two inbound events
//! for the same call can never interleave. Timers are independent tasks that
//! post back into the mailbox and re-check session status at fire time; every
//! transition that invalidates a timer also aborts its handle.
//!
//! # Modules
//!
//! - [`actors`] - registry actor, its mailbox messages, connection handles
//! - [`config`] - service configuration from environment
//! - [`directory`] - user-to-connection presence directory
//! - [`errors`] - signaling error taxonomy with client-safe messages
//! - [`server`] - axum WebSocket endpoint and health route
//! - [`session`] - call-session records and status transitions

pub mod actors;
pub mod config;
pub mod directory;
pub mod errors;
pub mod server;
pub mod session;
