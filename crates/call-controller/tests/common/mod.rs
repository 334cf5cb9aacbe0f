//! Shared helpers for registry integration tests: fake clients backed by
//! plain mpsc channels, driven straight against the registry actor.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::time::Duration;

use tokio::sync::mpsc;

use call_controller::actors::{ClientConnection, RegistryActorHandle};
use call_controller::directory::ConnectionId;
use signal_protocol::{CallId, ClientEvent, ServerEvent, UserId};

/// One fake participant: a registered connection plus its outbound stream.
pub struct TestClient {
    pub user: UserId,
    pub conn: ConnectionId,
    pub rx: mpsc::Receiver<ServerEvent>,
}

impl TestClient {
    /// Receive the next event, failing the test after a bounded wait.
    pub async fn recv(&mut self) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for server event")
            .expect("connection channel closed")
    }

    /// Receive the next call-signaling event, skipping roster and typing
    /// broadcasts.
    pub async fn recv_signal(&mut self) -> ServerEvent {
        loop {
            match self.recv().await {
                ServerEvent::UpdateOnlineUsers(_)
                | ServerEvent::ShowTyping { .. }
                | ServerEvent::HideTyping { .. } => continue,
                event => return event,
            }
        }
    }

    /// Assert that nothing (beyond broadcasts) is waiting for this client.
    pub fn assert_no_signal(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(ServerEvent::UpdateOnlineUsers(_))
                | Ok(ServerEvent::ShowTyping { .. })
                | Ok(ServerEvent::HideTyping { .. }) => continue,
                Ok(event) => panic!("unexpected event: {event:?}"),
                Err(_) => return,
            }
        }
    }
}

/// Open a connection and join as `user`.
pub async fn connect(handle: &RegistryActorHandle, user: &str) -> TestClient {
    let conn = ConnectionId::new();
    let (tx, rx) = mpsc::channel(64);
    handle
        .connected(ClientConnection::new(conn, tx))
        .await
        .unwrap();
    handle
        .event(
            conn,
            ClientEvent::Join {
                user_id: UserId::from(user),
            },
        )
        .await
        .unwrap();

    TestClient {
        user: UserId::from(user),
        conn,
        rx,
    }
}

/// Ring `receiver` from `caller` and return the minted call id. The
/// receiver's `incoming-video-call` is left in its stream for the test to
/// consume.
pub async fn invite(
    handle: &RegistryActorHandle,
    caller: &mut TestClient,
    receiver: &TestClient,
) -> CallId {
    handle
        .event(
            caller.conn,
            ClientEvent::InitiateVideoCall {
                caller_id: caller.user.clone(),
                receiver_id: receiver.user.clone(),
                caller_name: Some(format!("{} (display)", caller.user)),
            },
        )
        .await
        .unwrap();

    match caller.recv_signal().await {
        ServerEvent::CallInitiated { call_id, .. } => call_id,
        other => panic!("expected call-initiated, got {other:?}"),
    }
}

/// Drive a session all the way to `connecting`: invite, accept, offer. Both
/// clients' streams are drained of the events this produces.
pub async fn establish_connecting(
    handle: &RegistryActorHandle,
    caller: &mut TestClient,
    receiver: &mut TestClient,
) -> CallId {
    let call_id = invite(handle, caller, receiver).await;

    match receiver.recv_signal().await {
        ServerEvent::IncomingVideoCall { .. } => {}
        other => panic!("expected incoming-video-call, got {other:?}"),
    }

    handle
        .event(
            receiver.conn,
            ClientEvent::AcceptVideoCall {
                call_id: call_id.clone(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(
        caller.recv_signal().await,
        ServerEvent::CallAccepted { .. }
    ));
    assert!(matches!(
        receiver.recv_signal().await,
        ServerEvent::CallAccepted { .. }
    ));

    handle
        .event(
            caller.conn,
            ClientEvent::WebrtcOffer {
                call_id: call_id.clone(),
                offer: signal_protocol::SessionDescription::offer("v=0"),
            },
        )
        .await
        .unwrap();
    assert!(matches!(
        receiver.recv_signal().await,
        ServerEvent::WebrtcOffer { .. }
    ));

    call_id
}
