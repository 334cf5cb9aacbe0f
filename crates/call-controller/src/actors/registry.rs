//! `RegistryActor` - single owner of all signaling state.
//!
//! The actor owns the presence directory, the live connection table, and the
//! call-session map, and processes its mailbox serially. That serialization
//! is the concurrency contract: two inbound events for the same call cannot
//! interleave because both pass through this one task.
//!
//! Supervision timers (dial timeout, connect timeout) are independent tasks
//! that sleep and post back into the mailbox; they re-check session status at
//! fire time, and every transition that invalidates a timer also aborts its
//! handle. The stale-session sweep runs on an interval inside the actor loop.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use signal_protocol::{
    CallId, CallStatus, ClientEvent, IceCandidate, ServerEvent, SessionDescription, UserId,
};

use super::messages::{ClientConnection, RegistryMessage, RegistrySnapshot};
use crate::config::Config;
use crate::directory::{ConnectionDirectory, ConnectionId};
use crate::errors::SignalingError;
use crate::session::CallSession;

/// Mailbox buffer for the registry actor.
const REGISTRY_CHANNEL_BUFFER: usize = 1024;

/// Reason strings delivered with `call-ended`.
const REASON_HANGUP: &str = "Call ended by participant";
const REASON_CONNECT_TIMEOUT: &str = "Connection timeout";
const REASON_DISCONNECT: &str = "User disconnected";

/// Failure string for an unanswered invite.
const DIAL_TIMEOUT_ERROR: &str = "Call timeout - no answer";

/// Placeholder display name when the caller did not supply one.
const UNKNOWN_CALLER: &str = "Unknown User";

/// Handle to the `RegistryActor`.
#[derive(Clone)]
pub struct RegistryActorHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl RegistryActorHandle {
    /// Spawn the registry actor and return a handle to it.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RegistryActor::new(config, receiver, sender.clone(), cancel_token.clone());
        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Register a freshly opened connection.
    ///
    /// # Errors
    ///
    /// Fails only when the actor is gone.
    pub async fn connected(&self, connection: ClientConnection) -> Result<(), SignalingError> {
        self.sender
            .send(RegistryMessage::Connected { connection })
            .await
            .map_err(|e| SignalingError::Internal(format!("registry send failed: {e}")))
    }

    /// Feed one client event into the registry.
    ///
    /// # Errors
    ///
    /// Fails only when the actor is gone.
    pub async fn event(
        &self,
        conn_id: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), SignalingError> {
        self.sender
            .send(RegistryMessage::Event { conn_id, event })
            .await
            .map_err(|e| SignalingError::Internal(format!("registry send failed: {e}")))
    }

    /// Report a closed connection.
    ///
    /// # Errors
    ///
    /// Fails only when the actor is gone.
    pub async fn disconnected(&self, conn_id: ConnectionId) -> Result<(), SignalingError> {
        self.sender
            .send(RegistryMessage::Disconnected { conn_id })
            .await
            .map_err(|e| SignalingError::Internal(format!("registry send failed: {e}")))
    }

    /// Fetch a point-in-time snapshot of live state.
    ///
    /// # Errors
    ///
    /// Fails only when the actor is gone.
    pub async fn snapshot(&self) -> Result<RegistrySnapshot, SignalingError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Snapshot { respond_to: tx })
            .await
            .map_err(|e| SignalingError::Internal(format!("registry send failed: {e}")))?;

        rx.await
            .map_err(|e| SignalingError::Internal(format!("registry response failed: {e}")))
    }

    /// Cancel the actor (graceful shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Child token for per-connection tasks, so socket loops stop with the
    /// actor.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// The `RegistryActor` implementation.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryMessage>,
    /// Clone handed to timer tasks so they can post back into the mailbox.
    self_sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
    directory: ConnectionDirectory,
    connections: HashMap<ConnectionId, ClientConnection>,
    sessions: HashMap<CallId, CallSession>,
    dial_timeout: Duration,
    connect_timeout: Duration,
    sweep_interval: Duration,
    session_max_age: Duration,
}

impl RegistryActor {
    fn new(
        config: &Config,
        receiver: mpsc::Receiver<RegistryMessage>,
        self_sender: mpsc::Sender<RegistryMessage>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            self_sender,
            cancel_token,
            directory: ConnectionDirectory::new(),
            connections: HashMap::new(),
            sessions: HashMap::new(),
            dial_timeout: config.dial_timeout(),
            connect_timeout: config.connect_timeout(),
            sweep_interval: config.sweep_interval(),
            session_max_age: config.session_max_age(),
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "cc.actor.registry")]
    async fn run(mut self) {
        info!(target: "cc.registry", "RegistryActor started");

        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "cc.registry", "RegistryActor received cancellation signal");
                    break;
                }

                _ = sweep.tick() => {
                    self.sweep();
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!(target: "cc.registry", "RegistryActor channel closed, exiting");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "cc.registry",
            connections = self.connections.len(),
            sessions = self.sessions.len(),
            "RegistryActor stopped"
        );
    }

    fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::Connected { connection } => {
                debug!(
                    target: "cc.registry",
                    connection_id = %connection.id(),
                    "Connection opened"
                );
                self.connections.insert(connection.id(), connection);
            }

            RegistryMessage::Event { conn_id, event } => self.handle_event(conn_id, event),

            RegistryMessage::Disconnected { conn_id } => self.handle_disconnect(conn_id),

            RegistryMessage::DialTimeout { call_id } => self.handle_dial_timeout(&call_id),

            RegistryMessage::ConnectTimeout { call_id } => self.handle_connect_timeout(&call_id),

            RegistryMessage::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    fn handle_event(&mut self, conn_id: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::Join { user_id } => self.handle_join(conn_id, user_id),

            ClientEvent::Typing {
                sender_id,
                receiver_id,
            } => self.broadcast(ServerEvent::ShowTyping {
                sender_id,
                receiver_id,
            }),

            ClientEvent::StopTyping {
                sender_id,
                receiver_id,
            } => self.broadcast(ServerEvent::HideTyping {
                sender_id,
                receiver_id,
            }),

            ClientEvent::InitiateVideoCall {
                caller_id,
                receiver_id,
                caller_name,
            } => self.handle_invite(conn_id, caller_id, receiver_id, caller_name),

            ClientEvent::AcceptVideoCall { call_id } => self.handle_accept(conn_id, &call_id),

            ClientEvent::RejectVideoCall { call_id, reason } => {
                self.handle_reject(&call_id, reason);
            }

            ClientEvent::EndVideoCall { call_id } => self.handle_end(conn_id, &call_id),

            ClientEvent::WebrtcOffer { call_id, offer } => {
                self.handle_offer(conn_id, call_id, offer);
            }

            ClientEvent::WebrtcAnswer { call_id, answer } => {
                self.handle_answer(conn_id, call_id, answer);
            }

            ClientEvent::WebrtcIceCandidate { call_id, candidate } => {
                self.handle_candidate(conn_id, &call_id, candidate);
            }
        }
    }

    /// Register presence and rebroadcast the roster.
    fn handle_join(&mut self, conn_id: ConnectionId, user_id: UserId) {
        let replaced = self.directory.join(user_id.clone(), conn_id);
        if let Some(old) = replaced {
            debug!(
                target: "cc.registry",
                user_id = %user_id,
                old_connection = %old,
                "User rejoined on a new connection"
            );
        }

        info!(
            target: "cc.registry",
            user_id = %user_id,
            connection_id = %conn_id,
            online = self.directory.len(),
            "User joined"
        );

        self.broadcast_roster();
    }

    /// Create a session and ring the receiver, or fail fast when offline.
    fn handle_invite(
        &mut self,
        conn_id: ConnectionId,
        caller_id: UserId,
        receiver_id: UserId,
        caller_name: Option<String>,
    ) {
        let Some(receiver_conn) = self.directory.resolve(&receiver_id) else {
            info!(
                target: "cc.registry",
                receiver_id = %receiver_id,
                "Invite failed, receiver offline"
            );
            self.fail(conn_id, &SignalingError::UserOffline, None);
            return;
        };

        let call_id = self.mint_call_id(&caller_id, &receiver_id);
        let mut session = CallSession::new(
            call_id.clone(),
            caller_id.clone(),
            receiver_id.clone(),
            conn_id,
            receiver_conn,
        );
        session.dial_timer = Some(spawn_timer(
            self.self_sender.clone(),
            self.dial_timeout,
            RegistryMessage::DialTimeout {
                call_id: call_id.clone(),
            },
        ));
        self.sessions.insert(call_id.clone(), session);

        self.send_to(
            receiver_conn,
            ServerEvent::IncomingVideoCall {
                call_id: call_id.clone(),
                caller_id,
                caller_name: caller_name.unwrap_or_else(|| UNKNOWN_CALLER.to_string()),
            },
        );
        self.send_to(
            conn_id,
            ServerEvent::CallInitiated {
                call_id: call_id.clone(),
                receiver_id,
                status: CallStatus::Ringing,
            },
        );

        info!(target: "cc.registry", call_id = %call_id, "Call initiated");
    }

    /// Ringing → accepted: notify both sides and arm the connect timer.
    fn handle_accept(&mut self, conn_id: ConnectionId, call_id: &CallId) {
        let Some(session) = self.sessions.get_mut(call_id) else {
            info!(target: "cc.registry", call_id = %call_id, "Accept failed, session not found");
            self.fail(
                conn_id,
                &SignalingError::SessionNotFound,
                Some(call_id.clone()),
            );
            return;
        };

        if let Err(err) = session.accept() {
            info!(
                target: "cc.registry",
                call_id = %call_id,
                status = %session.status,
                "Accept failed, wrong status"
            );
            self.fail(conn_id, &err, Some(call_id.clone()));
            return;
        }

        // Accepting disarmed the dial timer; the connect deadline starts.
        session.connect_timer = Some(spawn_timer(
            self.self_sender.clone(),
            self.connect_timeout,
            RegistryMessage::ConnectTimeout {
                call_id: call_id.clone(),
            },
        ));

        let caller = session.caller.clone();
        let receiver = session.receiver.clone();
        let caller_conn = session.caller_conn;
        let receiver_conn = session.receiver_conn;

        self.send_to(
            caller_conn,
            ServerEvent::CallAccepted {
                call_id: call_id.clone(),
                peer_id: receiver,
                status: CallStatus::Accepted,
            },
        );
        self.send_to(
            receiver_conn,
            ServerEvent::CallAccepted {
                call_id: call_id.clone(),
                peer_id: caller,
                status: CallStatus::Accepted,
            },
        );

        info!(target: "cc.registry", call_id = %call_id, "Call accepted");
    }

    /// Notify the caller and destroy the session; no-op when already gone.
    fn handle_reject(&mut self, call_id: &CallId, reason: String) {
        let Some(session) = self.destroy_session(call_id) else {
            debug!(target: "cc.registry", call_id = %call_id, "Reject for unknown session ignored");
            return;
        };

        self.send_to(
            session.caller_conn,
            ServerEvent::CallRejected {
                call_id: call_id.clone(),
                reason: reason.clone(),
            },
        );

        info!(target: "cc.registry", call_id = %call_id, reason = %reason, "Call rejected");
    }

    /// Notify the other participant and destroy the session; no-op when
    /// already gone.
    fn handle_end(&mut self, conn_id: ConnectionId, call_id: &CallId) {
        let Some(target) = self
            .sessions
            .get(call_id)
            .and_then(|s| s.other_party(conn_id).map(|(_, conn)| conn))
        else {
            debug!(target: "cc.registry", call_id = %call_id, "End for unknown session ignored");
            return;
        };

        self.destroy_session(call_id);
        self.send_to(
            target,
            ServerEvent::CallEnded {
                call_id: call_id.clone(),
                reason: REASON_HANGUP.to_string(),
            },
        );

        info!(target: "cc.registry", call_id = %call_id, "Call ended by participant");
    }

    /// Forward an offer to the other participant, moving the session to
    /// connecting on the first one.
    fn handle_offer(
        &mut self,
        conn_id: ConnectionId,
        call_id: CallId,
        offer: SessionDescription,
    ) {
        let Some(session) = self.sessions.get_mut(&call_id) else {
            info!(target: "cc.registry", call_id = %call_id, "Offer failed, session not found");
            self.fail(conn_id, &SignalingError::SessionNotFound, Some(call_id));
            return;
        };

        if !session.offer_allowed() {
            let status = session.status;
            info!(
                target: "cc.registry",
                call_id = %call_id,
                status = %status,
                "Offer refused before acceptance"
            );
            self.fail(
                conn_id,
                &SignalingError::InvalidTransition { status },
                Some(call_id),
            );
            return;
        }

        let Some((sender, target)) = session.route_from(conn_id) else {
            warn!(
                target: "cc.registry",
                call_id = %call_id,
                connection_id = %conn_id,
                "Offer from a connection outside the session"
            );
            self.fail(conn_id, &SignalingError::SessionNotFound, Some(call_id));
            return;
        };

        session.mark_offer_forwarded();
        debug!(target: "cc.registry", call_id = %call_id, "Forwarding offer");
        self.send_to(
            target,
            ServerEvent::WebrtcOffer {
                call_id,
                offer,
                sender,
            },
        );
    }

    /// Forward an answer to the other participant.
    fn handle_answer(
        &mut self,
        conn_id: ConnectionId,
        call_id: CallId,
        answer: SessionDescription,
    ) {
        let Some(session) = self.sessions.get_mut(&call_id) else {
            info!(target: "cc.registry", call_id = %call_id, "Answer failed, session not found");
            self.fail(conn_id, &SignalingError::SessionNotFound, Some(call_id));
            return;
        };

        let Some((sender, target)) = session.route_from(conn_id) else {
            warn!(
                target: "cc.registry",
                call_id = %call_id,
                connection_id = %conn_id,
                "Answer from a connection outside the session"
            );
            self.fail(conn_id, &SignalingError::SessionNotFound, Some(call_id));
            return;
        };

        session.mark_answer_forwarded();
        debug!(target: "cc.registry", call_id = %call_id, "Forwarding answer");
        self.send_to(
            target,
            ServerEvent::WebrtcAnswer {
                call_id,
                answer,
                sender,
            },
        );
    }

    /// Forward a connectivity candidate verbatim. Candidates for unknown
    /// sessions are dropped silently: they are fire-and-forget and arrive in
    /// bursts around teardown races, while offer/answer must surface
    /// failures because the sender is blocked on them.
    fn handle_candidate(
        &mut self,
        conn_id: ConnectionId,
        call_id: &CallId,
        candidate: IceCandidate,
    ) {
        let Some((sender, target)) = self
            .sessions
            .get(call_id)
            .and_then(|s| s.route_from(conn_id))
        else {
            debug!(
                target: "cc.registry",
                call_id = %call_id,
                "Dropping candidate for unknown session"
            );
            return;
        };

        self.send_to(
            target,
            ServerEvent::WebrtcIceCandidate {
                call_id: call_id.clone(),
                candidate,
                sender,
            },
        );
    }

    /// Tear down everything a vanished connection touched.
    fn handle_disconnect(&mut self, conn_id: ConnectionId) {
        self.connections.remove(&conn_id);

        // Forced end for every session the connection was part of.
        let affected: Vec<CallId> = self
            .sessions
            .values()
            .filter(|s| s.involves(conn_id))
            .map(|s| s.call_id.clone())
            .collect();

        for call_id in affected {
            let Some(session) = self.destroy_session(&call_id) else {
                continue;
            };
            if let Some((_, survivor)) = session.other_party(conn_id) {
                self.send_to(
                    survivor,
                    ServerEvent::CallEnded {
                        call_id: call_id.clone(),
                        reason: REASON_DISCONNECT.to_string(),
                    },
                );
            }
            info!(
                target: "cc.registry",
                call_id = %call_id,
                "Call ended by disconnect"
            );
        }

        if let Some(user) = self.directory.remove_connection(conn_id) {
            info!(
                target: "cc.registry",
                user_id = %user,
                connection_id = %conn_id,
                online = self.directory.len(),
                "User disconnected"
            );
            self.broadcast_roster();
        } else {
            debug!(
                target: "cc.registry",
                connection_id = %conn_id,
                "Connection closed before joining"
            );
        }
    }

    /// Dial timer fired: only a still-ringing session times out.
    fn handle_dial_timeout(&mut self, call_id: &CallId) {
        let still_ringing = self
            .sessions
            .get(call_id)
            .is_some_and(|s| s.status == CallStatus::Ringing);
        if !still_ringing {
            return;
        }

        let Some(session) = self.destroy_session(call_id) else {
            return;
        };

        info!(target: "cc.registry", call_id = %call_id, "Dial timeout, no answer");
        self.send_to(
            session.caller_conn,
            ServerEvent::CallFailed {
                error: DIAL_TIMEOUT_ERROR.to_string(),
                call_id: Some(call_id.clone()),
            },
        );
    }

    /// Connect timer fired: only a session still waiting in accepted times
    /// out; both participants hear about it exactly once.
    fn handle_connect_timeout(&mut self, call_id: &CallId) {
        let still_accepted = self
            .sessions
            .get(call_id)
            .is_some_and(|s| s.status == CallStatus::Accepted);
        if !still_accepted {
            return;
        }

        let Some(session) = self.destroy_session(call_id) else {
            return;
        };

        info!(target: "cc.registry", call_id = %call_id, "Connect timeout");
        for conn in [session.caller_conn, session.receiver_conn] {
            self.send_to(
                conn,
                ServerEvent::CallEnded {
                    call_id: call_id.clone(),
                    reason: REASON_CONNECT_TIMEOUT.to_string(),
                },
            );
        }
    }

    /// Backstop cleanup: drop sessions older than the configured maximum,
    /// whatever their status. Primary cleanup is event-driven; this only
    /// catches records whose teardown events were lost.
    fn sweep(&mut self) {
        let now = Instant::now();
        let stale: Vec<CallId> = self
            .sessions
            .values()
            .filter(|s| s.age(now) > self.session_max_age)
            .map(|s| s.call_id.clone())
            .collect();

        if stale.is_empty() {
            return;
        }

        for call_id in &stale {
            warn!(target: "cc.registry", call_id = %call_id, "Sweeping stale session");
            self.destroy_session(call_id);
        }

        info!(target: "cc.registry", swept = stale.len(), "Stale session sweep complete");
    }

    /// Remove a session; its timers are aborted on drop.
    fn destroy_session(&mut self, call_id: &CallId) -> Option<CallSession> {
        self.sessions.remove(call_id)
    }

    /// Mint a unique, creation-ordered call id. Two invites for the same
    /// pair inside one millisecond get consecutive timestamps rather than a
    /// shared id.
    fn mint_call_id(&self, caller: &UserId, receiver: &UserId) -> CallId {
        let mut at_millis = chrono::Utc::now().timestamp_millis();
        let mut call_id = CallId::derive(caller, receiver, at_millis);
        while self.sessions.contains_key(&call_id) {
            at_millis += 1;
            call_id = CallId::derive(caller, receiver, at_millis);
        }
        call_id
    }

    fn fail(&self, conn_id: ConnectionId, error: &SignalingError, call_id: Option<CallId>) {
        self.send_to(
            conn_id,
            ServerEvent::CallFailed {
                error: error.client_message(),
                call_id,
            },
        );
    }

    fn send_to(&self, conn_id: ConnectionId, event: ServerEvent) {
        if let Some(connection) = self.connections.get(&conn_id) {
            connection.deliver(event);
        }
    }

    fn broadcast(&self, event: ServerEvent) {
        for connection in self.connections.values() {
            connection.deliver(event.clone());
        }
    }

    fn broadcast_roster(&self) {
        self.broadcast(ServerEvent::UpdateOnlineUsers(self.directory.online_users()));
    }

    fn snapshot(&self) -> RegistrySnapshot {
        let mut active_calls: Vec<CallId> = self.sessions.keys().cloned().collect();
        active_calls.sort();
        RegistrySnapshot {
            online_users: self.directory.online_users(),
            active_calls,
            connections: self.connections.len(),
        }
    }
}

/// Sleep, then post `message` back into the registry mailbox. The returned
/// handle lets a state transition cancel the deadline outright; the handler
/// still re-checks status at fire time.
fn spawn_timer(
    sender: mpsc::Sender<RegistryMessage>,
    delay: Duration,
    message: RegistryMessage,
) -> AbortHandle {
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = sender.send(message).await;
    });
    task.abort_handle()
}
