//! Event vocabulary for the client/relay channel.
//!
//! `ClientEvent` covers everything a client may send to the relay,
//! `ServerEvent` everything the relay may send back. Both serialize as
//! `{"event": <kebab-case name>, "data": <payload>}` with camelCase payload
//! fields, so the enum variant names below are the protocol.

use serde::{Deserialize, Serialize};

use crate::types::{CallId, CallStatus, IceCandidate, SessionDescription, UserId};

fn declined() -> String {
    "declined".to_string()
}

/// Events sent from a client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Register presence for the authenticated user on this connection.
    Join { user_id: UserId },

    /// Typing indicator, relayed to all clients as `show-typing`.
    Typing {
        sender_id: UserId,
        receiver_id: UserId,
    },

    /// Typing indicator cleared, relayed as `hide-typing`.
    StopTyping {
        sender_id: UserId,
        receiver_id: UserId,
    },

    /// Ask the relay to ring another user.
    InitiateVideoCall {
        caller_id: UserId,
        receiver_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caller_name: Option<String>,
    },

    /// Accept a ringing call.
    AcceptVideoCall { call_id: CallId },

    /// Decline a ringing call.
    RejectVideoCall {
        call_id: CallId,
        #[serde(default = "declined")]
        reason: String,
    },

    /// Hang up an in-flight call.
    EndVideoCall { call_id: CallId },

    /// Negotiation offer, forwarded verbatim to the other participant.
    WebrtcOffer {
        call_id: CallId,
        offer: SessionDescription,
    },

    /// Negotiation answer, forwarded verbatim to the other participant.
    WebrtcAnswer {
        call_id: CallId,
        answer: SessionDescription,
    },

    /// Connectivity candidate, forwarded verbatim to the other participant.
    WebrtcIceCandidate {
        call_id: CallId,
        candidate: IceCandidate,
    },
}

/// Events sent from the relay to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Full roster of online users, broadcast on every join/leave.
    UpdateOnlineUsers(Vec<UserId>),

    /// Another user started typing.
    ShowTyping {
        sender_id: UserId,
        receiver_id: UserId,
    },

    /// Another user stopped typing.
    HideTyping {
        sender_id: UserId,
        receiver_id: UserId,
    },

    /// A caller is ringing this client.
    IncomingVideoCall {
        call_id: CallId,
        caller_id: UserId,
        caller_name: String,
    },

    /// Acknowledgment that an invite was delivered and is ringing.
    CallInitiated {
        call_id: CallId,
        receiver_id: UserId,
        status: CallStatus,
    },

    /// The receiver accepted; sent to both participants. `peer_id` is the
    /// other participant from the recipient's point of view.
    CallAccepted {
        call_id: CallId,
        peer_id: UserId,
        status: CallStatus,
    },

    /// The receiver declined; sent to the caller.
    CallRejected { call_id: CallId, reason: String },

    /// The call is over (hangup, timeout, or disconnect); sent to the
    /// participant that did not cause the termination.
    CallEnded { call_id: CallId, reason: String },

    /// A request could not be carried out.
    CallFailed {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<CallId>,
    },

    /// Forwarded negotiation offer. `sender` is the originating user.
    WebrtcOffer {
        call_id: CallId,
        offer: SessionDescription,
        sender: UserId,
    },

    /// Forwarded negotiation answer.
    WebrtcAnswer {
        call_id: CallId,
        answer: SessionDescription,
        sender: UserId,
    },

    /// Forwarded connectivity candidate.
    WebrtcIceCandidate {
        call_id: CallId,
        candidate: IceCandidate,
        sender: UserId,
    },
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_kebab_case_names() {
        let event = ClientEvent::InitiateVideoCall {
            caller_id: UserId::from("u1"),
            receiver_id: UserId::from("u2"),
            caller_name: Some("Alice".to_string()),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "initiate-video-call");
        assert_eq!(json["data"]["callerId"], "u1");
        assert_eq!(json["data"]["receiverId"], "u2");
        assert_eq!(json["data"]["callerName"], "Alice");
    }

    #[test]
    fn reject_reason_defaults_to_declined() {
        let frame = r#"{"event":"reject-video-call","data":{"callId":"call-1"}}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();

        match event {
            ClientEvent::RejectVideoCall { reason, .. } => assert_eq!(reason, "declined"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn roster_broadcast_is_a_bare_array() {
        let event =
            ServerEvent::UpdateOnlineUsers(vec![UserId::from("u1"), UserId::from("u2")]);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "update-online-users");
        assert_eq!(json["data"], serde_json::json!(["u1", "u2"]));
    }

    #[test]
    fn forwarded_offer_carries_sender() {
        let event = ServerEvent::WebrtcOffer {
            call_id: CallId::derive(&UserId::from("u1"), &UserId::from("u2"), 1),
            offer: SessionDescription::offer("v=0"),
            sender: UserId::from("u1"),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "webrtc-offer");
        assert_eq!(json["data"]["sender"], "u1");
        assert_eq!(json["data"]["offer"]["type"], "offer");
    }

    #[test]
    fn client_frame_round_trips_through_json() {
        let event = ClientEvent::WebrtcIceCandidate {
            call_id: CallId::derive(&UserId::from("a"), &UserId::from("b"), 42),
            candidate: IceCandidate {
                candidate: "candidate:1".to_string(),
                sdp_mid: None,
                sdp_mline_index: Some(0),
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        let back: ClientEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
