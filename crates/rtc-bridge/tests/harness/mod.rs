//! In-memory RTC engine for integration tests
//!
//! Provides a fake [`RtcEngine`] whose peer connections record what the bridge
//! asked of them and let a test inject native notifications as the library
//! would, without any network.
//!
//! Basic usage pattern:
//!
//! 1. Create a bridge with `harness::bridge()`
//! 2. Drive it through its command methods
//! 3. Inject native events with `FakePeerConnection::emit` or `remote_track`
//! 4. Inspect the fake objects through `bridge.engine()`

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rtc_bridge::{
    BridgeConfig, BridgeEvent, Error, IceCandidate, MediaConstraints, MediaStreamConstraints,
    NativeEvent, NativeEventSender, NativePeerConnection, NativeTrack, Result, RtcBridge,
    RtcConfiguration, RtcEngine, SdpType, SessionDescription, SignalingState, TrackKind,
    TrackState,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Create a bridge over a fresh fake engine, with logging enabled
pub fn bridge() -> RtcBridge<FakeEngine> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    RtcBridge::new(FakeEngine::default(), BridgeConfig::default())
        .expect("default config is valid")
}

/// Receive the next event, failing the test after one second
pub async fn next_event(rx: &mut mpsc::Receiver<BridgeEvent>) -> BridgeEvent {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Assert that no event arrives within a short grace period
pub async fn assert_no_event(rx: &mut mpsc::Receiver<BridgeEvent>) {
    if let Ok(Some(event)) = timeout(Duration::from_millis(100), rx.recv()).await {
        panic!("unexpected event: {:?}", event);
    }
}

/// Poll `condition` until it holds, failing the test after one second
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

/// Fake engine; keeps every object it created
#[derive(Default)]
pub struct FakeEngine {
    pub connections: Mutex<Vec<Arc<FakePeerConnection>>>,
    pub tracks: Mutex<Vec<Arc<FakeTrack>>>,

    /// Next `create_local_track` of this kind fails
    pub fail_track_kind: Mutex<Option<TrackKind>>,

    track_counter: AtomicUsize,
}

impl FakeEngine {
    /// Most recently created connection
    pub fn last_connection(&self) -> Arc<FakePeerConnection> {
        self.connections
            .lock()
            .last()
            .cloned()
            .expect("no peer connection created")
    }

    fn next_track_id(&self, kind: TrackKind) -> String {
        format!("{}-{}", kind, self.track_counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl RtcEngine for FakeEngine {
    type Track = FakeTrack;
    type PeerConnection = FakePeerConnection;

    async fn create_peer_connection(
        &self,
        config: &RtcConfiguration,
        _constraints: &MediaConstraints,
        events: NativeEventSender<FakeTrack>,
    ) -> Result<Arc<FakePeerConnection>> {
        let pc = Arc::new(FakePeerConnection {
            events,
            config: Mutex::new(config.clone()),
            senders: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            local_description: Mutex::new(None),
            remote_description: Mutex::new(None),
            fail_next: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        self.connections.lock().push(Arc::clone(&pc));
        Ok(pc)
    }

    async fn create_local_track(
        &self,
        kind: TrackKind,
        _stream_id: &str,
        _constraints: &MediaStreamConstraints,
    ) -> Result<Arc<FakeTrack>> {
        {
            let mut fail = self.fail_track_kind.lock();
            if *fail == Some(kind) {
                *fail = None;
                return Err(Error::library("CAPTURE_FAILED", format!("no {} device", kind)));
            }
        }

        let track = Arc::new(FakeTrack::new(self.next_track_id(kind), kind, false));
        self.tracks.lock().push(Arc::clone(&track));
        Ok(track)
    }
}

/// Fake peer connection
pub struct FakePeerConnection {
    events: NativeEventSender<FakeTrack>,
    pub config: Mutex<RtcConfiguration>,

    /// Ids of tracks currently being sent
    pub senders: Mutex<Vec<String>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub local_description: Mutex<Option<SessionDescription>>,
    pub remote_description: Mutex<Option<SessionDescription>>,

    /// Next negotiation call fails with this library error (code, message)
    pub fail_next: Mutex<Option<(String, String)>>,

    pub closed: AtomicBool,
}

impl FakePeerConnection {
    /// Inject a native notification, as the library would from its own thread
    pub fn emit(&self, event: NativeEvent<FakeTrack>) {
        let _ = self.events.send(event);
    }

    /// Inject a remote track arrival
    pub fn remote_track(&self, stream_id: &str, kind: TrackKind) -> Arc<FakeTrack> {
        let track = Arc::new(FakeTrack::new(
            format!("remote-{}-{}", stream_id, kind),
            kind,
            true,
        ));
        self.emit(NativeEvent::TrackAdded {
            stream_id: stream_id.to_string(),
            track: Arc::clone(&track),
        });
        track
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::library("INVALID_STATE", "connection closed"));
        }
        if let Some((code, message)) = self.fail_next.lock().take() {
            return Err(Error::library(code, message));
        }
        Ok(())
    }
}

#[async_trait]
impl NativePeerConnection for FakePeerConnection {
    type Track = FakeTrack;

    async fn create_offer(&self, constraints: &MediaConstraints) -> Result<SessionDescription> {
        self.check()?;
        Ok(SessionDescription::offer(format!(
            "v=0 tracks={} ice-restart={}",
            self.senders.lock().len(),
            constraints.ice_restart()
        )))
    }

    async fn create_answer(&self, _constraints: &MediaConstraints) -> Result<SessionDescription> {
        self.check()?;
        if self.remote_description.lock().is_none() {
            return Err(Error::library("INVALID_STATE", "no remote offer"));
        }
        Ok(SessionDescription::answer(format!(
            "v=0 tracks={}",
            self.senders.lock().len()
        )))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.check()?;
        let state = match description.sdp_type {
            SdpType::Offer => SignalingState::HaveLocalOffer,
            SdpType::Pranswer => SignalingState::HaveLocalPranswer,
            _ => SignalingState::Stable,
        };
        *self.local_description.lock() = Some(description);
        self.emit(NativeEvent::SignalingStateChanged(state));
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.check()?;
        let state = match description.sdp_type {
            SdpType::Offer => SignalingState::HaveRemoteOffer,
            SdpType::Pranswer => SignalingState::HaveRemotePranswer,
            _ => SignalingState::Stable,
        };
        *self.remote_description.lock() = Some(description);
        self.emit(NativeEvent::SignalingStateChanged(state));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.check()?;
        if candidate.candidate.is_empty() {
            return Err(Error::library("ICE_CANDIDATE", "empty candidate"));
        }
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn set_configuration(&self, config: &RtcConfiguration) -> Result<()> {
        self.check()?;
        *self.config.lock() = config.clone();
        Ok(())
    }

    async fn add_track(&self, track: Arc<FakeTrack>) -> Result<()> {
        self.check()?;
        let mut senders = self.senders.lock();
        if !senders.contains(&track.id) {
            senders.push(track.id.clone());
        }
        Ok(())
    }

    async fn remove_track(&self, track: &FakeTrack) -> Result<()> {
        self.senders.lock().retain(|id| id != &track.id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::library("INVALID_STATE", "already closed"));
        }
        self.senders.lock().clear();
        Ok(())
    }
}

/// Fake media track
#[derive(Debug)]
pub struct FakeTrack {
    pub id: String,
    kind: TrackKind,
    remote: bool,
    enabled: AtomicBool,
    ended: AtomicBool,
}

impl FakeTrack {
    pub fn new(id: String, kind: TrackKind, remote: bool) -> Self {
        Self {
            id,
            kind,
            remote,
            enabled: AtomicBool::new(true),
            ended: AtomicBool::new(false),
        }
    }
}

impl NativeTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn is_remote(&self) -> bool {
        self.remote
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn ready_state(&self) -> TrackState {
        if self.ended.load(Ordering::SeqCst) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    fn stop(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }
}
