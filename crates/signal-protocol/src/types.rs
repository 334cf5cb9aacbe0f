//! Identifier and payload types shared by the relay and peer clients.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque stable user identity, issued by the external user directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Unique identifier for one call session.
///
/// Derived from the participants and the creation time as
/// `call-{millis:013}-{caller}-{receiver}`. The zero-padded millisecond
/// prefix makes lexicographic order equal creation order; uniqueness within
/// the sweep horizon is the registry's responsibility (it bumps the
/// millisecond component on a same-instant collision).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Derive a call id for a caller/receiver pair created at `at_millis`
    /// (unix epoch milliseconds).
    #[must_use]
    pub fn derive(caller: &UserId, receiver: &UserId, at_millis: i64) -> Self {
        Self(format!("call-{at_millis:013}-{caller}-{receiver}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Relay-visible lifecycle of a call session.
///
/// Transitions move strictly forward (`Ringing` → `Accepted` →
/// `Connecting`), except `Ended`, which is reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Invite delivered, awaiting accept/reject/timeout.
    Ringing,
    /// Receiver agreed, awaiting the caller's offer.
    Accepted,
    /// Offer forwarded, awaiting the answer.
    Connecting,
    /// Terminal; the session record is destroyed on entry.
    Ended,
}

impl CallStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Accepted => "accepted",
            CallStatus::Connecting => "connecting",
            CallStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of the offer/answer exchange a description carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// A session-description negotiation payload (offer or answer).
///
/// Field names match the browser `RTCSessionDescriptionInit` shape so a
/// JavaScript client can pass descriptions through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A proposed network path endpoint for the media connection.
///
/// Mirrors `RTCIceCandidateInit`; the relay forwards it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u32>,
}
