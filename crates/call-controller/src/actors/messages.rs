//! Mailbox messages for the registry actor, and the outbound connection
//! handle it delivers events through.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use signal_protocol::{CallId, ClientEvent, ServerEvent, UserId};

use crate::directory::ConnectionId;

/// Outbound buffer per connection. A client that stalls past this many
/// undelivered events starts losing them rather than stalling the registry.
pub const CONNECTION_CHANNEL_BUFFER: usize = 64;

/// Handle to one live client connection, held by the registry actor.
///
/// Delivery is non-blocking: the registry must never wait on a slow socket,
/// so a full buffer drops the event with a warning and a closed channel is
/// ignored (the disconnect notification is already on its way).
#[derive(Debug, Clone)]
pub struct ClientConnection {
    id: ConnectionId,
    sender: mpsc::Sender<ServerEvent>,
}

impl ClientConnection {
    #[must_use]
    pub fn new(id: ConnectionId, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self { id, sender }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event for the socket writer.
    pub fn deliver(&self, event: ServerEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    target: "cc.connection",
                    connection_id = %self.id,
                    event = ?std::mem::discriminant(&event),
                    "Outbound buffer full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(
                    target: "cc.connection",
                    connection_id = %self.id,
                    "Outbound channel closed, connection is going away"
                );
            }
        }
    }
}

/// Messages processed by the registry actor.
#[derive(Debug)]
pub enum RegistryMessage {
    /// A WebSocket connection opened; its outbound handle is registered
    /// before any event from it can arrive.
    Connected { connection: ClientConnection },

    /// A client event read off a socket.
    Event {
        conn_id: ConnectionId,
        event: ClientEvent,
    },

    /// The socket closed or errored.
    Disconnected { conn_id: ConnectionId },

    /// Dial timer fired; acted on only if the session is still ringing.
    DialTimeout { call_id: CallId },

    /// Connect timer fired; acted on only if the session is still accepted.
    ConnectTimeout { call_id: CallId },

    /// Observability/testing snapshot of live state.
    Snapshot {
        respond_to: oneshot::Sender<RegistrySnapshot>,
    },
}

/// Point-in-time view of the registry, for health reporting and tests.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub online_users: Vec<UserId>,
    pub active_calls: Vec<CallId>,
    pub connections: usize,
}
