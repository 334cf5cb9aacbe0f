//! Local negotiation sub-state machine.
//!
//! One [`Negotiation`] lives exactly as long as its call. The fixed
//! [`NegotiationRole`] decides who originates the offer, and the explicit
//! state machine makes the one-shot guards structural: a duplicate relay
//! message finds the transition already taken and cannot re-trigger offer or
//! answer creation.

use std::collections::VecDeque;

use signal_protocol::IceCandidate;

/// Which side of the call this participant is. Fixed at session start and
/// never changed for the life of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    /// Originated the call; emits the offer upon acceptance.
    Caller,
    /// Accepted the call; waits passively for the inbound offer.
    Acceptor,
}

/// Progress of the local offer/answer exchange.
///
/// Caller path: `Idle` → `OfferSent` → `AnswerApplied`.
/// Acceptor path: `Idle` → `OfferReceived` → `AnswerSent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    OfferSent,
    OfferReceived,
    AnswerSent,
    AnswerApplied,
}

/// Per-call negotiation bookkeeping: role, exchange progress, and the queue
/// of candidates that arrived before the remote description.
#[derive(Debug)]
pub struct Negotiation {
    role: NegotiationRole,
    state: NegotiationState,
    pending: VecDeque<IceCandidate>,
    remote_ready: bool,
}

impl Negotiation {
    #[must_use]
    pub fn new(role: NegotiationRole) -> Self {
        Self {
            role,
            state: NegotiationState::Idle,
            pending: VecDeque::new(),
            remote_ready: false,
        }
    }

    #[must_use]
    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    #[must_use]
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// One-shot gate for originating the offer. Only the caller, only once.
    pub fn begin_offer(&mut self) -> bool {
        if self.role == NegotiationRole::Caller && self.state == NegotiationState::Idle {
            self.state = NegotiationState::OfferSent;
            true
        } else {
            false
        }
    }

    /// One-shot gate for answering an inbound offer. A duplicate offer finds
    /// the transition taken and is not answered again.
    pub fn begin_answer(&mut self) -> bool {
        if self.role == NegotiationRole::Acceptor && self.state == NegotiationState::Idle {
            self.state = NegotiationState::OfferReceived;
            true
        } else {
            false
        }
    }

    /// Record that the answer went out.
    pub fn answer_sent(&mut self) {
        if self.state == NegotiationState::OfferReceived {
            self.state = NegotiationState::AnswerSent;
        }
    }

    /// Whether an inbound answer may be applied: the local side must have an
    /// outstanding offer awaiting exactly one answer.
    #[must_use]
    pub fn may_apply_answer(&self) -> bool {
        self.state == NegotiationState::OfferSent
    }

    /// Record that the answer was applied.
    pub fn answer_applied(&mut self) {
        if self.state == NegotiationState::OfferSent {
            self.state = NegotiationState::AnswerApplied;
        }
    }

    /// Whether the remote description has been applied, i.e. candidates can
    /// go straight to the engine.
    #[must_use]
    pub fn remote_ready(&self) -> bool {
        self.remote_ready
    }

    pub fn mark_remote_ready(&mut self) {
        self.remote_ready = true;
    }

    /// Queue a candidate that arrived before the remote description.
    pub fn buffer_candidate(&mut self, candidate: IceCandidate) {
        self.pending.push_back(candidate);
    }

    /// Next buffered candidate, in arrival order.
    pub fn pop_pending(&mut self) -> Option<IceCandidate> {
        self.pending.pop_front()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n}"),
            sdp_mid: None,
            sdp_mline_index: Some(0),
        }
    }

    #[test]
    fn caller_offers_exactly_once() {
        let mut negotiation = Negotiation::new(NegotiationRole::Caller);

        assert!(negotiation.begin_offer());
        assert_eq!(negotiation.state(), NegotiationState::OfferSent);

        // A duplicate call-accepted cannot re-trigger the offer.
        assert!(!negotiation.begin_offer());
    }

    #[test]
    fn acceptor_never_originates_the_offer() {
        let mut negotiation = Negotiation::new(NegotiationRole::Acceptor);
        assert!(!negotiation.begin_offer());
        assert_eq!(negotiation.state(), NegotiationState::Idle);
    }

    #[test]
    fn duplicate_offer_is_not_answered_twice() {
        let mut negotiation = Negotiation::new(NegotiationRole::Acceptor);

        assert!(negotiation.begin_answer());
        negotiation.answer_sent();
        assert_eq!(negotiation.state(), NegotiationState::AnswerSent);

        assert!(!negotiation.begin_answer());
    }

    #[test]
    fn answer_applies_only_against_an_outstanding_offer() {
        let mut negotiation = Negotiation::new(NegotiationRole::Caller);
        assert!(!negotiation.may_apply_answer());

        negotiation.begin_offer();
        assert!(negotiation.may_apply_answer());

        negotiation.answer_applied();
        assert_eq!(negotiation.state(), NegotiationState::AnswerApplied);
        // A duplicate answer finds no outstanding offer.
        assert!(!negotiation.may_apply_answer());
    }

    #[test]
    fn candidates_drain_in_arrival_order() {
        let mut negotiation = Negotiation::new(NegotiationRole::Acceptor);

        negotiation.buffer_candidate(candidate(1));
        negotiation.buffer_candidate(candidate(2));
        negotiation.buffer_candidate(candidate(3));
        assert_eq!(negotiation.pending_len(), 3);

        let drained: Vec<String> = std::iter::from_fn(|| negotiation.pop_pending())
            .map(|c| c.candidate)
            .collect();
        assert_eq!(drained, vec!["candidate:1", "candidate:2", "candidate:3"]);
        assert_eq!(negotiation.pending_len(), 0);
    }
}
