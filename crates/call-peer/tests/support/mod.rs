//! Scripted media/engine fakes for driving `PeerCallClient` end-to-end.
//!
//! The probes are shared handles the tests assert against: every engine call
//! is appended to a log, so ordering properties (candidate flush order, one-
//! shot offer/answer) are directly observable.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use call_peer::engine::{
    EngineEvent, EngineFactory, LocalMedia, MediaSource, NegotiationEngine, SignalingState,
    TrackKind,
};
use call_peer::{CallNotification, PeerCallClient, PeerError};
use signal_protocol::{
    CallId, ClientEvent, IceCandidate, SdpType, ServerEvent, SessionDescription, UserId,
};

/// Observable engine state shared between a test and its mock engine.
pub struct EngineProbe {
    log: Mutex<Vec<String>>,
    state: Mutex<SignalingState>,
    pub closed: AtomicBool,
}

impl EngineProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            state: Mutex::new(SignalingState::Stable),
            closed: AtomicBool::new(false),
        })
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    pub fn set_state(&self, state: SignalingState) {
        *self.state.lock().unwrap() = state;
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

/// Observable media lifecycle.
pub struct MediaProbe {
    pub acquired: AtomicUsize,
    pub stopped: AtomicBool,
}

impl MediaProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            acquired: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        })
    }
}

/// Failure script for a harness.
#[derive(Default, Clone, Copy)]
pub struct MockOptions {
    pub fail_media: bool,
    pub fail_create: bool,
    pub fail_offer: bool,
    pub fail_answer: bool,
    pub fail_set_remote: bool,
}

struct MockMedia {
    probe: Arc<MediaProbe>,
    audio: bool,
    video: bool,
}

impl LocalMedia for MockMedia {
    fn set_track_enabled(&mut self, kind: TrackKind, enabled: bool) {
        match kind {
            TrackKind::Audio => self.audio = enabled,
            TrackKind::Video => self.video = enabled,
        }
    }

    fn track_enabled(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.audio,
            TrackKind::Video => self.video,
        }
    }

    fn stop(&mut self) {
        self.probe.stopped.store(true, Ordering::SeqCst);
    }
}

struct MockMediaSource {
    probe: Arc<MediaProbe>,
    fail: bool,
}

#[async_trait]
impl MediaSource for MockMediaSource {
    async fn acquire(&mut self) -> Result<Box<dyn LocalMedia>, PeerError> {
        if self.fail {
            return Err(PeerError::MediaAcquisition("scripted failure".to_string()));
        }
        self.probe.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockMedia {
            probe: Arc::clone(&self.probe),
            audio: true,
            video: true,
        }))
    }
}

struct MockEngine {
    probe: Arc<EngineProbe>,
    options: MockOptions,
}

#[async_trait]
impl NegotiationEngine for MockEngine {
    async fn create_offer(&mut self) -> Result<SessionDescription, PeerError> {
        self.probe.push("create_offer".to_string());
        if self.options.fail_offer {
            return Err(PeerError::Negotiation("scripted offer failure".to_string()));
        }
        self.probe.set_state(SignalingState::HaveLocalOffer);
        Ok(SessionDescription::offer("mock-offer"))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, PeerError> {
        self.probe.push("create_answer".to_string());
        if self.options.fail_answer {
            return Err(PeerError::Negotiation(
                "scripted answer failure".to_string(),
            ));
        }
        self.probe.set_state(SignalingState::Stable);
        Ok(SessionDescription::answer("mock-answer"))
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), PeerError> {
        let kind = match description.kind {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        };
        self.probe.push(format!("set_remote:{kind}"));
        if self.options.fail_set_remote {
            return Err(PeerError::Negotiation(
                "scripted set-remote failure".to_string(),
            ));
        }
        self.probe.set_state(match description.kind {
            SdpType::Offer => SignalingState::HaveRemoteOffer,
            SdpType::Answer => SignalingState::Stable,
        });
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), PeerError> {
        self.probe.push(format!("add_candidate:{}", candidate.candidate));
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        *self.probe.state.lock().unwrap()
    }

    fn close(&mut self) {
        self.probe.push("close".to_string());
        self.probe.closed.store(true, Ordering::SeqCst);
    }
}

struct MockEngineFactory {
    probe: Arc<EngineProbe>,
    options: MockOptions,
}

impl EngineFactory for MockEngineFactory {
    fn create(
        &mut self,
        _events: mpsc::Sender<EngineEvent>,
    ) -> Result<Box<dyn NegotiationEngine>, PeerError> {
        if self.options.fail_create {
            return Err(PeerError::Negotiation(
                "scripted factory failure".to_string(),
            ));
        }
        Ok(Box::new(MockEngine {
            probe: Arc::clone(&self.probe),
            options: self.options,
        }))
    }
}

/// A client wired to mocks, plus every observable end.
pub struct Harness {
    pub client: PeerCallClient,
    pub outbound: mpsc::Receiver<ClientEvent>,
    pub notifications: mpsc::Receiver<CallNotification>,
    pub engine: Arc<EngineProbe>,
    pub media: Arc<MediaProbe>,
    // Held so engine event senders stay connected.
    _engine_events: mpsc::Receiver<EngineEvent>,
}

impl Harness {
    pub fn expect_out(&mut self) -> ClientEvent {
        self.outbound
            .try_recv()
            .expect("expected an outbound client event")
    }

    pub fn assert_no_out(&mut self) {
        if let Ok(event) = self.outbound.try_recv() {
            panic!("unexpected outbound event: {event:?}");
        }
    }

    pub fn expect_notification(&mut self) -> CallNotification {
        self.notifications
            .try_recv()
            .expect("expected a notification")
    }
}

pub fn harness(user: &str) -> Harness {
    harness_with(user, MockOptions::default())
}

pub fn harness_with(user: &str, options: MockOptions) -> Harness {
    let engine = EngineProbe::new();
    let media = MediaProbe::new();
    let (outbound_tx, outbound_rx) = mpsc::channel(32);
    let (engine_events_tx, engine_events_rx) = mpsc::channel(32);

    let (client, notifications) = PeerCallClient::new(
        UserId::from(user),
        Some(format!("{user} (display)")),
        Box::new(MockMediaSource {
            probe: Arc::clone(&media),
            fail: options.fail_media,
        }),
        Box::new(MockEngineFactory {
            probe: Arc::clone(&engine),
            options,
        }),
        outbound_tx,
        engine_events_tx,
    );

    Harness {
        client,
        outbound: outbound_rx,
        notifications,
        engine,
        media,
        _engine_events: engine_events_rx,
    }
}

pub fn call_id_for(caller: &str, receiver: &str) -> CallId {
    CallId::derive(&UserId::from(caller), &UserId::from(receiver), 1_700_000)
}

pub fn incoming(caller: &str, receiver: &str) -> ServerEvent {
    ServerEvent::IncomingVideoCall {
        call_id: call_id_for(caller, receiver),
        caller_id: UserId::from(caller),
        caller_name: format!("{caller} (display)"),
    }
}

pub fn candidate(n: u32) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n}"),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
    }
}
