//! The per-participant call client.
//!
//! Event-driven: the embedding application feeds relayed [`ServerEvent`]s
//! and [`EngineEvent`]s in, and the client pushes [`ClientEvent`]s toward
//! the relay and [`CallNotification`]s toward the UI. All per-call state
//! lives in one [`ActiveCall`] so teardown is a single `take()`.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use signal_protocol::{CallId, ClientEvent, IceCandidate, ServerEvent, UserId};

use crate::engine::{
    ConnectivityState, EngineEvent, EngineFactory, LocalMedia, MediaSource, NegotiationEngine,
    SignalingState, TrackKind,
};
use crate::errors::PeerError;
use crate::negotiation::{Negotiation, NegotiationRole};

/// Buffer for UI notifications; they are advisory and drop when the
/// embedder lags.
const NOTIFICATION_CHANNEL_BUFFER: usize = 32;

/// Locally observed call phase.
///
/// `Connected` is entered only from engine events; relay messages can drive
/// everything up to `Connecting` but never past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    /// Invite sent, awaiting the relay's acknowledgment.
    Calling,
    /// Invite acknowledged, ringing on the far side.
    Ringing,
    /// An invite is waiting for the local user's decision.
    Incoming,
    /// Negotiation in progress.
    Connecting,
    /// Media is flowing.
    Connected,
}

/// UI-facing happenings, in the spirit of the toasts they replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallNotification {
    IncomingCall {
        call_id: CallId,
        caller_id: UserId,
        caller_name: String,
    },
    Connected,
    CallRejected {
        reason: String,
    },
    CallEnded {
        reason: String,
    },
    CallFailed {
        error: String,
    },
}

/// A ringing invite awaiting accept/reject.
#[derive(Debug, Clone)]
struct IncomingInvite {
    call_id: CallId,
    caller_id: UserId,
    caller_name: String,
}

/// Everything owned for the duration of one call.
struct ActiveCall {
    /// Known from the invite (acceptor) or from `call-initiated` (caller).
    call_id: Option<CallId>,
    negotiation: Negotiation,
    engine: Box<dyn NegotiationEngine>,
    media: Box<dyn LocalMedia>,
}

impl ActiveCall {
    /// Apply buffered candidates in arrival order. Individual failures are
    /// logged, not fatal; a bad candidate must not kill the call.
    async fn flush_pending_candidates(&mut self) {
        while let Some(candidate) = self.negotiation.pop_pending() {
            if let Err(err) = self.engine.add_ice_candidate(candidate).await {
                warn!(target: "cp.client", error = %err, "Failed to apply buffered candidate");
            }
        }
    }

    fn shutdown(&mut self) {
        self.engine.close();
        self.media.stop();
    }
}

/// One side of a two-party call.
pub struct PeerCallClient {
    user_id: UserId,
    display_name: Option<String>,
    outbound: mpsc::Sender<ClientEvent>,
    notifications: mpsc::Sender<CallNotification>,
    engine_events: mpsc::Sender<EngineEvent>,
    media_source: Box<dyn MediaSource>,
    engine_factory: Box<dyn EngineFactory>,
    active: Option<ActiveCall>,
    incoming: Option<IncomingInvite>,
    phase: CallPhase,
}

impl PeerCallClient {
    /// Build a client.
    ///
    /// `outbound` carries events to the relay connection; `engine_events` is
    /// handed to every engine the client creates, and the embedder routes
    /// what arrives on the paired receiver back through
    /// [`handle_engine_event`](Self::handle_engine_event). The returned
    /// receiver carries UI notifications.
    #[must_use]
    pub fn new(
        user_id: UserId,
        display_name: Option<String>,
        media_source: Box<dyn MediaSource>,
        engine_factory: Box<dyn EngineFactory>,
        outbound: mpsc::Sender<ClientEvent>,
        engine_events: mpsc::Sender<EngineEvent>,
    ) -> (Self, mpsc::Receiver<CallNotification>) {
        let (notifications, notification_rx) = mpsc::channel(NOTIFICATION_CHANNEL_BUFFER);
        (
            Self {
                user_id,
                display_name,
                outbound,
                notifications,
                engine_events,
                media_source,
                engine_factory,
                active: None,
                incoming: None,
                phase: CallPhase::Idle,
            },
            notification_rx,
        )
    }

    #[must_use]
    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    #[must_use]
    pub fn is_call_active(&self) -> bool {
        self.active.is_some()
    }

    /// Ring `receiver_id`. Media is acquired before any signaling leaves.
    ///
    /// # Errors
    ///
    /// `CallInProgress` when a call is already active; media or engine
    /// failures abort setup with the client back in `Idle`.
    pub async fn start_call(&mut self, receiver_id: UserId) -> Result<(), PeerError> {
        if self.active.is_some() || self.incoming.is_some() {
            return Err(PeerError::CallInProgress);
        }

        let (media, engine) = self.prepare_media_and_engine().await?;
        self.active = Some(ActiveCall {
            call_id: None,
            negotiation: Negotiation::new(NegotiationRole::Caller),
            engine,
            media,
        });
        self.phase = CallPhase::Calling;

        info!(target: "cp.client", receiver_id = %receiver_id, "Starting call");
        self.send(ClientEvent::InitiateVideoCall {
            caller_id: self.user_id.clone(),
            receiver_id,
            caller_name: self.display_name.clone(),
        })
        .await
    }

    /// Accept the pending invite. Media is acquired before the acceptance is
    /// signaled; on failure the invite is rejected instead.
    ///
    /// # Errors
    ///
    /// `NoIncomingCall` without a pending invite; media or engine failures
    /// after rejecting the invite.
    pub async fn accept_call(&mut self) -> Result<(), PeerError> {
        let Some(invite) = self.incoming.take() else {
            return Err(PeerError::NoIncomingCall);
        };

        let prepared = self.prepare_media_and_engine().await;
        let (media, engine) = match prepared {
            Ok(parts) => parts,
            Err(err) => {
                // The caller must not be left ringing against a dead side.
                let _ = self
                    .send(ClientEvent::RejectVideoCall {
                        call_id: invite.call_id,
                        reason: "declined".to_string(),
                    })
                    .await;
                self.phase = CallPhase::Idle;
                return Err(err);
            }
        };

        let call_id = invite.call_id.clone();
        self.active = Some(ActiveCall {
            call_id: Some(call_id.clone()),
            negotiation: Negotiation::new(NegotiationRole::Acceptor),
            engine,
            media,
        });
        self.phase = CallPhase::Connecting;

        info!(target: "cp.client", call_id = %call_id, "Accepting call");
        self.send(ClientEvent::AcceptVideoCall { call_id }).await
    }

    /// Decline the pending invite.
    ///
    /// # Errors
    ///
    /// `NoIncomingCall` without a pending invite.
    pub async fn reject_call(&mut self, reason: &str) -> Result<(), PeerError> {
        let Some(invite) = self.incoming.take() else {
            return Err(PeerError::NoIncomingCall);
        };

        if self.active.is_none() {
            self.phase = CallPhase::Idle;
        }
        self.send(ClientEvent::RejectVideoCall {
            call_id: invite.call_id,
            reason: reason.to_string(),
        })
        .await
    }

    /// Hang up: notify the counterpart when a session exists, then tear
    /// everything down locally. Safe to call in any state.
    pub async fn end_call(&mut self) {
        let call_id = self.active.as_ref().and_then(|a| a.call_id.clone());
        if let Some(call_id) = call_id {
            let _ = self.send(ClientEvent::EndVideoCall { call_id }).await;
        }
        self.teardown();
    }

    /// Toggle a local media track; returns the new enabled state.
    pub fn toggle_track(&mut self, kind: TrackKind) -> Option<bool> {
        let active = self.active.as_mut()?;
        let enabled = !active.media.track_enabled(kind);
        active.media.set_track_enabled(kind, enabled);
        Some(enabled)
    }

    /// Feed one relayed event through the client.
    pub async fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::CallInitiated { call_id, .. } => self.on_call_initiated(call_id),
            ServerEvent::IncomingVideoCall {
                call_id,
                caller_id,
                caller_name,
            } => self.on_incoming_call(call_id, caller_id, caller_name).await,
            ServerEvent::CallAccepted { call_id, .. } => self.on_call_accepted(call_id).await,
            ServerEvent::CallRejected { reason, .. } => {
                self.notify(CallNotification::CallRejected { reason });
                self.teardown();
            }
            ServerEvent::CallEnded { reason, .. } => {
                info!(target: "cp.client", reason = %reason, "Call ended by relay");
                self.notify(CallNotification::CallEnded { reason });
                self.teardown();
            }
            ServerEvent::CallFailed { error, .. } => {
                warn!(target: "cp.client", error = %error, "Call failed");
                self.notify(CallNotification::CallFailed { error });
                self.teardown();
            }
            ServerEvent::WebrtcOffer { call_id, offer, .. } => {
                self.on_offer(call_id, offer).await;
            }
            ServerEvent::WebrtcAnswer { answer, .. } => self.on_answer(answer).await,
            ServerEvent::WebrtcIceCandidate { candidate, .. } => self.on_candidate(candidate).await,
            // Roster and typing traffic is not the call client's concern.
            ServerEvent::UpdateOnlineUsers(_)
            | ServerEvent::ShowTyping { .. }
            | ServerEvent::HideTyping { .. } => {}
        }
    }

    /// Feed one engine event through the client.
    pub async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::TrackReceived => self.mark_connected(),
            EngineEvent::Connectivity(ConnectivityState::Connected) => self.mark_connected(),
            EngineEvent::Connectivity(state) => {
                if self.active.is_some() {
                    warn!(target: "cp.client", state = ?state, "Connectivity lost");
                    self.notify(CallNotification::CallFailed {
                        error: "Connection lost".to_string(),
                    });
                    self.end_call().await;
                }
            }
            EngineEvent::LocalCandidate(candidate) => self.on_local_candidate(candidate).await,
        }
    }

    fn on_call_initiated(&mut self, call_id: CallId) {
        if let Some(active) = self.active.as_mut() {
            if active.call_id.is_none() {
                active.call_id = Some(call_id);
                self.phase = CallPhase::Ringing;
            }
        }
    }

    async fn on_incoming_call(&mut self, call_id: CallId, caller_id: UserId, caller_name: String) {
        // Already in a call (or weighing another invite): auto-reject.
        if self.active.is_some() || self.incoming.is_some() {
            info!(target: "cp.client", call_id = %call_id, "Busy, rejecting incoming call");
            let _ = self
                .send(ClientEvent::RejectVideoCall {
                    call_id,
                    reason: "busy".to_string(),
                })
                .await;
            return;
        }

        self.incoming = Some(IncomingInvite {
            call_id: call_id.clone(),
            caller_id: caller_id.clone(),
            caller_name: caller_name.clone(),
        });
        self.phase = CallPhase::Incoming;
        self.notify(CallNotification::IncomingCall {
            call_id,
            caller_id,
            caller_name,
        });
    }

    async fn on_call_accepted(&mut self, call_id: CallId) {
        let Some(active) = self.active.as_mut() else {
            debug!(target: "cp.client", "call-accepted without an active call, ignoring");
            return;
        };

        self.phase = CallPhase::Connecting;
        if active.call_id.is_none() {
            active.call_id = Some(call_id.clone());
        }

        // Only the original caller creates the offer, exactly once; the
        // acceptor waits for it to arrive.
        if !active.negotiation.begin_offer() {
            debug!(target: "cp.client", "Not the offerer here, or offer already sent");
            return;
        }

        let offer = active.engine.create_offer().await;
        match offer {
            Ok(offer) => {
                let _ = self.send(ClientEvent::WebrtcOffer { call_id, offer }).await;
            }
            Err(err) => {
                self.fail_call(&format!("Failed to create offer: {err}"))
                    .await;
            }
        }
    }

    async fn on_offer(&mut self, call_id: CallId, offer: signal_protocol::SessionDescription) {
        let Some(active) = self.active.as_mut() else {
            debug!(target: "cp.client", "Offer without an active call, ignoring");
            return;
        };

        if let Err(err) = active.engine.set_remote_description(offer).await {
            self.fail_call(&format!("Failed to handle offer: {err}"))
                .await;
            return;
        }

        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.negotiation.mark_remote_ready();
        active.flush_pending_candidates().await;

        if !active.negotiation.begin_answer() {
            debug!(target: "cp.client", "Answer already created, skipping");
            return;
        }

        let answer = active.engine.create_answer().await;
        match answer {
            Ok(answer) => {
                if let Some(active) = self.active.as_mut() {
                    active.negotiation.answer_sent();
                }
                let _ = self
                    .send(ClientEvent::WebrtcAnswer { call_id, answer })
                    .await;
            }
            Err(err) => {
                self.fail_call(&format!("Failed to create answer: {err}"))
                    .await;
            }
        }
    }

    async fn on_answer(&mut self, answer: signal_protocol::SessionDescription) {
        let Some(active) = self.active.as_mut() else {
            debug!(target: "cp.client", "Answer without an active call, ignoring");
            return;
        };

        // Apply only while a local offer is awaiting exactly one answer; an
        // out-of-order or duplicate answer would put the engine in an
        // invalid state.
        if !active.negotiation.may_apply_answer()
            || active.engine.signaling_state() != SignalingState::HaveLocalOffer
        {
            warn!(
                target: "cp.client",
                state = ?active.engine.signaling_state(),
                "Discarding answer in wrong state"
            );
            return;
        }

        if let Err(err) = active.engine.set_remote_description(answer).await {
            self.fail_call(&format!("Failed to handle answer: {err}"))
                .await;
            return;
        }

        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.negotiation.answer_applied();
        active.negotiation.mark_remote_ready();
        active.flush_pending_candidates().await;
    }

    async fn on_candidate(&mut self, candidate: IceCandidate) {
        let Some(active) = self.active.as_mut() else {
            debug!(target: "cp.client", "Candidate without an active call, dropping");
            return;
        };

        if active.negotiation.remote_ready() {
            if let Err(err) = active.engine.add_ice_candidate(candidate).await {
                warn!(target: "cp.client", error = %err, "Failed to apply candidate");
            }
        } else {
            // FIFO per sender does not order candidates against the
            // offer/answer they pair with; hold them until the remote
            // description lands.
            active.negotiation.buffer_candidate(candidate);
        }
    }

    async fn on_local_candidate(&mut self, candidate: IceCandidate) {
        let call_id = self.active.as_ref().and_then(|a| a.call_id.clone());
        let Some(call_id) = call_id else {
            debug!(target: "cp.client", "Local candidate before the call id is known, dropping");
            return;
        };

        let _ = self
            .send(ClientEvent::WebrtcIceCandidate { call_id, candidate })
            .await;
    }

    fn mark_connected(&mut self) {
        if self.active.is_some() && self.phase != CallPhase::Connected {
            info!(target: "cp.client", "Call connected");
            self.phase = CallPhase::Connected;
            self.notify(CallNotification::Connected);
        }
    }

    /// Acquire media and build an engine, in that order; nothing referencing
    /// local media may be signaled before acquisition succeeds.
    async fn prepare_media_and_engine(
        &mut self,
    ) -> Result<(Box<dyn LocalMedia>, Box<dyn NegotiationEngine>), PeerError> {
        let media = match self.media_source.acquire().await {
            Ok(media) => media,
            Err(err) => {
                warn!(target: "cp.client", error = %err, "Media acquisition failed");
                self.notify(CallNotification::CallFailed {
                    error: "Failed to access camera/microphone".to_string(),
                });
                return Err(err);
            }
        };

        match self.engine_factory.create(self.engine_events.clone()) {
            Ok(engine) => Ok((media, engine)),
            Err(err) => {
                let mut media = media;
                media.stop();
                warn!(target: "cp.client", error = %err, "Engine creation failed");
                self.notify(CallNotification::CallFailed {
                    error: "Failed to set up the call".to_string(),
                });
                Err(err)
            }
        }
    }

    /// A local failure mid-call: surface it, notify the counterpart, and
    /// tear down symmetrically.
    async fn fail_call(&mut self, error: &str) {
        warn!(target: "cp.client", error = %error, "Local call failure");
        self.notify(CallNotification::CallFailed {
            error: error.to_string(),
        });
        self.end_call().await;
    }

    /// Deterministic local teardown: close the engine, release media, drop
    /// buffers, reset phase. Idempotent.
    fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.shutdown();
        }
        self.incoming = None;
        self.phase = CallPhase::Idle;
    }

    async fn send(&self, event: ClientEvent) -> Result<(), PeerError> {
        self.outbound
            .send(event)
            .await
            .map_err(|_| PeerError::ChannelClosed)
    }

    fn notify(&self, notification: CallNotification) {
        if self.notifications.try_send(notification).is_err() {
            debug!(target: "cp.client", "Notification receiver lagging or gone");
        }
    }
}
