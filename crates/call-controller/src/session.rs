//! Call session records and their status transitions.
//!
//! Sessions are owned exclusively by the registry actor; everything here is
//! plain single-threaded state. Timestamps are monotonic (`tokio::time`) so
//! aging works under paused-clock tests.

use tokio::task::AbortHandle;
use tokio::time::{Duration, Instant};

use signal_protocol::{CallId, CallStatus, UserId};

use crate::directory::ConnectionId;
use crate::errors::SignalingError;

/// One in-flight call between two participants.
#[derive(Debug)]
pub struct CallSession {
    pub call_id: CallId,
    pub caller: UserId,
    pub receiver: UserId,
    pub caller_conn: ConnectionId,
    pub receiver_conn: ConnectionId,
    pub status: CallStatus,
    pub created_at: Instant,
    pub accepted_at: Option<Instant>,
    pub offer_sent_at: Option<Instant>,
    pub answer_sent_at: Option<Instant>,
    /// Armed while ringing; aborted on accept/reject/end.
    pub dial_timer: Option<AbortHandle>,
    /// Armed while accepted; aborted once negotiation progresses or the
    /// session ends.
    pub connect_timer: Option<AbortHandle>,
}

impl CallSession {
    #[must_use]
    pub fn new(
        call_id: CallId,
        caller: UserId,
        receiver: UserId,
        caller_conn: ConnectionId,
        receiver_conn: ConnectionId,
    ) -> Self {
        Self {
            call_id,
            caller,
            receiver,
            caller_conn,
            receiver_conn,
            status: CallStatus::Ringing,
            created_at: Instant::now(),
            accepted_at: None,
            offer_sent_at: None,
            answer_sent_at: None,
            dial_timer: None,
            connect_timer: None,
        }
    }

    /// Move ringing → accepted, stamping the acceptance time.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` with the current status if the session is
    /// not ringing.
    pub fn accept(&mut self) -> Result<(), SignalingError> {
        if self.status != CallStatus::Ringing {
            return Err(SignalingError::InvalidTransition {
                status: self.status,
            });
        }
        self.status = CallStatus::Accepted;
        self.accepted_at = Some(Instant::now());
        // The dial deadline no longer applies.
        if let Some(timer) = self.dial_timer.take() {
            timer.abort();
        }
        Ok(())
    }

    /// Record the first forwarded offer: accepted → connecting.
    ///
    /// Later offers (renegotiation retries) leave the status and the original
    /// stamp untouched.
    pub fn mark_offer_forwarded(&mut self) {
        if self.status == CallStatus::Accepted {
            self.status = CallStatus::Connecting;
            self.offer_sent_at = Some(Instant::now());
            // Negotiation is progressing; the connect deadline no longer
            // applies.
            if let Some(timer) = self.connect_timer.take() {
                timer.abort();
            }
        }
    }

    /// Record the first forwarded answer while connecting.
    pub fn mark_answer_forwarded(&mut self) {
        if self.status == CallStatus::Connecting && self.answer_sent_at.is_none() {
            self.answer_sent_at = Some(Instant::now());
        }
    }

    /// Whether an offer may be forwarded: the receiver must have accepted.
    #[must_use]
    pub fn offer_allowed(&self) -> bool {
        matches!(self.status, CallStatus::Accepted | CallStatus::Connecting)
    }

    /// Whether `conn` is one of the two stored participant connections.
    #[must_use]
    pub fn involves(&self, conn: ConnectionId) -> bool {
        self.caller_conn == conn || self.receiver_conn == conn
    }

    /// Resolve the participant opposite to `sender`, or `None` when the
    /// sender is not part of this session.
    #[must_use]
    pub fn other_party(&self, sender: ConnectionId) -> Option<(&UserId, ConnectionId)> {
        if sender == self.caller_conn {
            Some((&self.receiver, self.receiver_conn))
        } else if sender == self.receiver_conn {
            Some((&self.caller, self.caller_conn))
        } else {
            None
        }
    }

    /// Routing for a relayed message: the sending user and the connection of
    /// the participant it must be forwarded to. `None` when the sender is not
    /// part of this session.
    #[must_use]
    pub fn route_from(&self, sender: ConnectionId) -> Option<(UserId, ConnectionId)> {
        if sender == self.caller_conn {
            Some((self.caller.clone(), self.receiver_conn))
        } else if sender == self.receiver_conn {
            Some((self.receiver.clone(), self.caller_conn))
        } else {
            None
        }
    }

    /// The user id bound to `conn` within this session.
    #[must_use]
    pub fn participant(&self, conn: ConnectionId) -> Option<&UserId> {
        if conn == self.caller_conn {
            Some(&self.caller)
        } else if conn == self.receiver_conn {
            Some(&self.receiver)
        } else {
            None
        }
    }

    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.created_at)
    }

    /// Abort any armed supervision timers. Safe to call repeatedly.
    pub fn abort_timers(&mut self) {
        if let Some(timer) = self.dial_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.connect_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        // A destroyed session must never leave a timer behind to fire on a
        // recycled call id.
        self.abort_timers();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn session() -> CallSession {
        CallSession::new(
            CallId::derive(&UserId::from("alice"), &UserId::from("bob"), 1_000),
            UserId::from("alice"),
            UserId::from("bob"),
            ConnectionId::new(),
            ConnectionId::new(),
        )
    }

    #[tokio::test]
    async fn accept_moves_ringing_to_accepted_exactly_once() {
        let mut session = session();
        assert_eq!(session.status, CallStatus::Ringing);

        session.accept().unwrap();
        assert_eq!(session.status, CallStatus::Accepted);
        assert!(session.accepted_at.is_some());

        let err = session.accept().unwrap_err();
        assert!(matches!(
            err,
            SignalingError::InvalidTransition {
                status: CallStatus::Accepted
            }
        ));
    }

    #[tokio::test]
    async fn offer_is_rejected_while_ringing() {
        let session = session();
        assert!(!session.offer_allowed());
    }

    #[tokio::test]
    async fn first_offer_moves_to_connecting_and_stamps_once() {
        let mut session = session();
        session.accept().unwrap();

        session.mark_offer_forwarded();
        assert_eq!(session.status, CallStatus::Connecting);
        let first_stamp = session.offer_sent_at;
        assert!(first_stamp.is_some());

        // A duplicate offer does not restamp.
        session.mark_offer_forwarded();
        assert_eq!(session.offer_sent_at, first_stamp);
    }

    #[tokio::test]
    async fn other_party_never_echoes_to_sender() {
        let session = session();

        let (user, conn) = session.other_party(session.caller_conn).unwrap();
        assert_eq!(user, &session.receiver);
        assert_eq!(conn, session.receiver_conn);

        let (user, conn) = session.other_party(session.receiver_conn).unwrap();
        assert_eq!(user, &session.caller);
        assert_eq!(conn, session.caller_conn);

        // A connection outside the session resolves to nobody.
        assert!(session.other_party(ConnectionId::new()).is_none());
    }

    #[tokio::test]
    async fn age_tracks_the_monotonic_clock() {
        tokio::time::pause();
        let session = session();

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(session.age(Instant::now()), Duration::from_secs(90));
    }
}
