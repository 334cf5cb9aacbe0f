//! Call controller error types.
//!
//! Registry-detected failures are reported to the originating connection as
//! `call-failed` events carrying [`SignalingError::client_message`]; internal
//! detail stays in the logs.

use signal_protocol::CallStatus;
use thiserror::Error;

/// Errors detected while processing a signaling request.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Invite target has no live connection.
    #[error("user offline")]
    UserOffline,

    /// Action referenced an unknown or already-destroyed call id.
    #[error("call session not found")]
    SessionNotFound,

    /// Action is not legal for the session's current status
    /// (e.g. accept on a non-ringing session).
    #[error("invalid transition from {status}")]
    InvalidTransition { status: CallStatus },

    /// Internal failure (channel closed, task gone).
    #[error("internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    /// The message carried in the `call-failed` reply. Wire-compatible with
    /// the strings the original clients match on.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SignalingError::UserOffline => "User is offline".to_string(),
            SignalingError::SessionNotFound => "Call session not found".to_string(),
            SignalingError::InvalidTransition { status } => format!("Call already {status}"),
            SignalingError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_match_wire_strings() {
        assert_eq!(SignalingError::UserOffline.client_message(), "User is offline");
        assert_eq!(
            SignalingError::SessionNotFound.client_message(),
            "Call session not found"
        );
        assert_eq!(
            SignalingError::InvalidTransition {
                status: CallStatus::Accepted
            }
            .client_message(),
            "Call already accepted"
        );
    }

    #[test]
    fn internal_detail_never_reaches_the_client() {
        let err = SignalingError::Internal("mpsc closed at 10.0.0.3".to_string());
        assert!(!err.client_message().contains("10.0.0.3"));
    }
}
