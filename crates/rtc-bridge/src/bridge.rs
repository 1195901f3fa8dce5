//! Command surface exposed to the scripting side
//!
//! [`RtcBridge`] owns one [`HandleRegistry`] and an [`RtcEngine`]. Commands
//! address native objects by handle only; native notifications are translated
//! into handle-tagged [`BridgeEvent`]s by one forwarder task per peer
//! connection.

use crate::config::{BridgeConfig, MediaConstraints, MediaStreamConstraints, RtcConfiguration};
use crate::engine::{
    IceCandidate, NativeEvent, NativePeerConnection, NativeTrack, PeerConnectionState, RtcEngine,
    SessionDescription,
};
use crate::events::BridgeEvent;
use crate::media::{MediaStream, StreamInfo, TrackInfo, TrackKind};
use crate::registry::{Handle, HandleRegistry, NativeObject, ObjectKind, Released};
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Registry type used by a bridge over engine `E`
pub type BridgeRegistry<E> = HandleRegistry<
    <E as RtcEngine>::PeerConnection,
    MediaStream,
    <E as RtcEngine>::Track,
>;

/// Event forwarder task per live peer connection
type Forwarders = Arc<Mutex<HashMap<Handle, JoinHandle<()>>>>;

/// Bridge between handle-addressed commands and native RTC objects
pub struct RtcBridge<E: RtcEngine> {
    engine: E,

    config: BridgeConfig,

    registry: Arc<BridgeRegistry<E>>,

    /// Event sender towards the scripting side
    event_tx: mpsc::Sender<BridgeEvent>,

    /// Event receiver, taken once by the host glue
    event_rx: Mutex<Option<mpsc::Receiver<BridgeEvent>>>,

    /// Set once the host glue owns the receiver
    receiver_taken: Arc<AtomicBool>,

    forwarders: Forwarders,
}

impl<E: RtcEngine> RtcBridge<E> {
    /// Create a bridge over `engine`
    pub fn new(engine: E, config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);

        Ok(Self {
            engine,
            config,
            registry: Arc::new(HandleRegistry::new()),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            receiver_taken: Arc::new(AtomicBool::new(false)),
            forwarders: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The registry of live objects
    pub fn registry(&self) -> &BridgeRegistry<E> {
        &self.registry
    }

    /// Take the event receiver for polling
    ///
    /// This can only be called once - subsequent calls return None. Until
    /// then, events that do not fit in the channel are dropped.
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<BridgeEvent>> {
        let rx = self.event_rx.lock().take();
        if rx.is_some() {
            self.receiver_taken.store(true, Ordering::Release);
        }
        rx
    }

    /// The scripting layer (re)loaded: drop everything from the previous load
    pub async fn finish_loading(&self) {
        let released = self.registry.clear();
        if !released.is_empty() {
            info!(released = released.len(), "Discarding objects from previous load");
        }
        self.teardown(released).await;

        // Forwarders of connections released above are already gone
        for (handle, task) in self.forwarders.lock().drain() {
            debug!(handle = %handle, "Stopping leftover event forwarder");
            task.abort();
        }
    }

    /// Create a local stream with no owner
    ///
    /// The stream outlives any connection it is added to and is released by
    /// [`dispose`](Self::dispose) or [`stop_user_media`](Self::stop_user_media).
    pub async fn get_user_media(&self, constraints: &MediaStreamConstraints) -> Result<StreamInfo> {
        self.create_stream(None, constraints).await
    }

    /// Release every local stream created by [`get_user_media`](Self::get_user_media)
    ///
    /// Returns the number of streams released.
    pub async fn stop_user_media(&self) -> usize {
        let ownerless: Vec<Handle> = self
            .registry
            .handles(ObjectKind::MediaStream)
            .into_iter()
            .filter(|h| self.registry.owner_of(h).is_none())
            .collect();

        let mut stopped = 0;
        for handle in ownerless {
            let released = self.registry.release(&handle, ObjectKind::MediaStream);
            if !released.is_empty() {
                stopped += 1;
                self.teardown(released).await;
            }
        }
        info!(streams = stopped, "Stopped user media");
        stopped
    }

    /// Create a peer connection and start forwarding its events
    pub async fn create_peer_connection(
        &self,
        config: RtcConfiguration,
        constraints: &MediaConstraints,
    ) -> Result<Handle> {
        let config = config.with_default_servers(&self.config.default_ice_servers);
        config.validate()?;

        let (native_tx, native_rx) = mpsc::unbounded_channel();
        let pc = self
            .engine
            .create_peer_connection(&config, constraints, native_tx)
            .await?;

        let handle = match self
            .registry
            .insert(NativeObject::PeerConnection(Arc::clone(&pc)), None)
        {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(close_err) = pc.close().await {
                    warn!("Failed to close unregistered peer connection: {}", close_err);
                }
                return Err(e);
            }
        };

        let forwarder = Forwarder {
            pc: handle.clone(),
            registry: Arc::clone(&self.registry),
            event_tx: self.event_tx.clone(),
            receiver_taken: Arc::clone(&self.receiver_taken),
            forwarders: Arc::clone(&self.forwarders),
        };
        {
            let mut forwarders = self.forwarders.lock();
            forwarders.insert(handle.clone(), tokio::spawn(forwarder.run(native_rx)));
        }

        // Disposed before its forwarder was recorded
        if !self.registry.contains(&handle) {
            if let Some(task) = self.forwarders.lock().remove(&handle) {
                task.abort();
            }
        }

        info!(handle = %handle, "Peer connection created");
        Ok(handle)
    }

    /// Create a local stream owned by `pc`
    ///
    /// The stream and its tracks are released together with the connection.
    pub async fn create_local_stream(
        &self,
        pc: &Handle,
        constraints: &MediaStreamConstraints,
    ) -> Result<StreamInfo> {
        self.registry.peer_connection(pc)?;
        self.create_stream(Some(pc), constraints).await
    }

    async fn create_stream(
        &self,
        owner: Option<&Handle>,
        constraints: &MediaStreamConstraints,
    ) -> Result<StreamInfo> {
        constraints.validate()?;

        let stream = MediaStream::local();

        let mut kinds = Vec::with_capacity(2);
        if constraints.wants_audio() {
            kinds.push(TrackKind::Audio);
        }
        if constraints.wants_video() {
            kinds.push(TrackKind::Video);
        }

        let mut tracks: Vec<Arc<E::Track>> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match self
                .engine
                .create_local_track(kind, stream.id(), constraints)
                .await
            {
                Ok(track) => tracks.push(track),
                Err(e) => {
                    tracks.iter().for_each(|t| t.stop());
                    return Err(e);
                }
            }
        }

        // The owner may have been disposed while the tracks were created
        let stream_handle = match self
            .registry
            .insert(NativeObject::MediaStream(Arc::new(stream)), owner)
        {
            Ok(handle) => handle,
            Err(e) => {
                tracks.iter().for_each(|t| t.stop());
                return Err(e);
            }
        };

        register_stream_tracks(&self.registry, &stream_handle, &tracks)?;

        self.stream_info(&stream_handle)
    }

    /// Add a remote ICE candidate
    pub async fn add_ice_candidate(&self, pc: &Handle, candidate: IceCandidate) -> Result<()> {
        self.registry.peer_connection(pc)?.add_ice_candidate(candidate).await
    }

    /// Start sending every track of `stream` on `pc`
    ///
    /// Ownership is unchanged: disposing `pc` later does not release `stream`.
    pub async fn add_stream(&self, pc: &Handle, stream: &Handle) -> Result<()> {
        let connection = self.registry.peer_connection(pc)?;
        self.registry.stream(stream)?;

        for track_handle in self.registry.children(stream) {
            let track = self.registry.track(&track_handle)?;
            connection.add_track(track).await?;
        }

        debug!(pc = %pc, stream = %stream, "Stream added to peer connection");
        Ok(())
    }

    /// Stop sending the tracks of `stream` on `pc`
    pub async fn remove_stream(&self, pc: &Handle, stream: &Handle) -> Result<()> {
        let connection = self.registry.peer_connection(pc)?;
        self.registry.stream(stream)?;

        for track_handle in self.registry.children(stream) {
            let track = self.registry.track(&track_handle)?;
            connection.remove_track(&track).await?;
        }

        debug!(pc = %pc, stream = %stream, "Stream removed from peer connection");
        Ok(())
    }

    pub async fn create_offer(
        &self,
        pc: &Handle,
        constraints: &MediaConstraints,
    ) -> Result<SessionDescription> {
        self.registry.peer_connection(pc)?.create_offer(constraints).await
    }

    pub async fn create_answer(
        &self,
        pc: &Handle,
        constraints: &MediaConstraints,
    ) -> Result<SessionDescription> {
        self.registry.peer_connection(pc)?.create_answer(constraints).await
    }

    pub async fn set_local_description(
        &self,
        pc: &Handle,
        description: SessionDescription,
    ) -> Result<()> {
        self.registry
            .peer_connection(pc)?
            .set_local_description(description)
            .await
    }

    pub async fn set_remote_description(
        &self,
        pc: &Handle,
        description: SessionDescription,
    ) -> Result<()> {
        self.registry
            .peer_connection(pc)?
            .set_remote_description(description)
            .await
    }

    /// Replace the connection's configuration
    pub async fn set_configuration(&self, pc: &Handle, config: RtcConfiguration) -> Result<()> {
        let connection = self.registry.peer_connection(pc)?;
        let config = config.with_default_servers(&self.config.default_ice_servers);
        config.validate()?;
        connection.set_configuration(&config).await
    }

    /// Close a peer connection, releasing the streams and tracks it owns
    ///
    /// A handle that is not a live peer connection is ignored.
    pub async fn close(&self, pc: &Handle) {
        let released = self.registry.release(pc, ObjectKind::PeerConnection);
        self.teardown(released).await;
    }

    /// Enable or disable a track's output. The track stays live.
    pub fn track_set_enabled(&self, track: &Handle, enabled: bool) -> Result<()> {
        self.registry.track(track)?.set_enabled(enabled);
        debug!(handle = %track, enabled, "Track enabled state changed");
        Ok(())
    }

    /// Release any handle along with everything it owns
    ///
    /// Idempotent. The registry entries are gone before native teardown
    /// starts; teardown failures are logged and never returned. Returns the
    /// number of objects released.
    pub async fn dispose(&self, handle: &Handle) -> usize {
        let released = self.registry.release_all(handle);
        let count = released.len();
        self.teardown(released).await;
        count
    }

    /// Snapshot of a stream and its tracks
    pub fn stream_info(&self, stream: &Handle) -> Result<StreamInfo> {
        let media = self.registry.stream(stream)?;

        let tracks = self
            .registry
            .children(stream)
            .into_iter()
            .filter_map(|h| {
                let track = self.registry.track(&h).ok()?;
                Some(track_info(h, Some(stream.clone()), track.as_ref()))
            })
            .collect();

        Ok(StreamInfo {
            handle: stream.clone(),
            id: media.id().to_string(),
            remote: media.is_remote(),
            tracks,
        })
    }

    /// Snapshot of a track
    pub fn track_info(&self, track: &Handle) -> Result<TrackInfo> {
        let native = self.registry.track(track)?;
        Ok(track_info(
            track.clone(),
            self.registry.owner_of(track),
            native.as_ref(),
        ))
    }

    async fn teardown(&self, released: Released<E::PeerConnection, MediaStream, E::Track>) {
        teardown(released, &self.event_tx, &self.forwarders).await;
    }
}

impl<E: RtcEngine> Drop for RtcBridge<E> {
    fn drop(&mut self) {
        for (_, task) in self.forwarders.lock().drain() {
            task.abort();
        }
    }
}

fn track_info<T: NativeTrack>(handle: Handle, stream: Option<Handle>, track: &T) -> TrackInfo {
    TrackInfo {
        handle,
        stream_handle: stream,
        id: track.id(),
        kind: track.kind(),
        ready_state: track.ready_state(),
        remote: track.is_remote(),
        enabled: track.is_enabled(),
    }
}

/// Queue an event without waiting; the event is dropped if the channel is full
fn emit(tx: &mpsc::Sender<BridgeEvent>, event: BridgeEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            warn!(event = event.name(), "Event channel full, dropping event");
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

/// Native teardown of released objects, children first
async fn teardown<P, T>(
    released: Released<P, MediaStream, T>,
    event_tx: &mpsc::Sender<BridgeEvent>,
    forwarders: &Mutex<HashMap<Handle, JoinHandle<()>>>,
) where
    P: NativePeerConnection,
    T: NativeTrack,
{
    for (handle, object) in released {
        match object {
            NativeObject::MediaTrack(track) => {
                track.stop();
                emit(event_tx, BridgeEvent::TrackEnded { track: handle });
            }
            NativeObject::MediaStream(_) => {
                emit(event_tx, BridgeEvent::StreamRemoved { stream: handle });
            }
            NativeObject::PeerConnection(pc) => {
                if let Some(task) = forwarders.lock().remove(&handle) {
                    task.abort();
                }
                if let Err(e) = pc.close().await {
                    warn!(handle = %handle, "Error closing peer connection: {}", e);
                }
                info!(handle = %handle, "Peer connection closed");
            }
        }
    }
}

/// Register `tracks` under `stream`
///
/// On failure every track is stopped and nothing of the stream stays
/// registered. The stream was never announced, so no events are emitted.
fn register_stream_tracks<P, T>(
    registry: &HandleRegistry<P, MediaStream, T>,
    stream: &Handle,
    tracks: &[Arc<T>],
) -> Result<()>
where
    T: NativeTrack,
{
    for track in tracks {
        if let Err(e) = registry.insert(NativeObject::MediaTrack(Arc::clone(track)), Some(stream)) {
            registry.release_all(stream);
            tracks.iter().for_each(|t| t.stop());
            return Err(e);
        }
    }
    Ok(())
}

/// Translates native notifications of one peer connection into bridge events
struct Forwarder<P, T> {
    pc: Handle,
    registry: Arc<HandleRegistry<P, MediaStream, T>>,
    event_tx: mpsc::Sender<BridgeEvent>,
    receiver_taken: Arc<AtomicBool>,
    forwarders: Forwarders,
}

impl<P, T> Forwarder<P, T>
where
    P: NativePeerConnection,
    T: NativeTrack,
{
    async fn run(self, mut native_rx: mpsc::UnboundedReceiver<NativeEvent<T>>) {
        let pc = self.pc.clone();

        while let Some(event) = native_rx.recv().await {
            if self.registry.kind_of(&pc) != Some(ObjectKind::PeerConnection) {
                warn!(handle = %pc, event = ?event, "Dropping event for released peer connection");
                if let NativeEvent::TrackAdded { track, .. } = &event {
                    track.stop();
                }
                continue;
            }

            let events = match event {
                NativeEvent::ConnectionStateChanged(PeerConnectionState::Closed) => {
                    self.deliver(BridgeEvent::ConnectionStateChanged {
                        peer_connection: pc.clone(),
                        state: PeerConnectionState::Closed,
                    })
                    .await;
                    self.release_closed().await;
                    return;
                }
                NativeEvent::ConnectionStateChanged(state) => {
                    vec![BridgeEvent::ConnectionStateChanged {
                        peer_connection: pc.clone(),
                        state,
                    }]
                }
                NativeEvent::SignalingStateChanged(state) => {
                    vec![BridgeEvent::SignalingStateChanged {
                        peer_connection: pc.clone(),
                        state,
                    }]
                }
                NativeEvent::IceConnectionStateChanged(state) => {
                    vec![BridgeEvent::IceConnectionStateChanged {
                        peer_connection: pc.clone(),
                        state,
                    }]
                }
                NativeEvent::IceGatheringStateChanged(state) => {
                    vec![BridgeEvent::IceGatheringStateChanged {
                        peer_connection: pc.clone(),
                        state,
                    }]
                }
                NativeEvent::IceCandidate(candidate) => vec![BridgeEvent::IceCandidate {
                    peer_connection: pc.clone(),
                    candidate,
                }],
                NativeEvent::TrackAdded { stream_id, track } => {
                    match register_remote_track(&self.registry, &pc, &stream_id, track) {
                        Ok(events) => events,
                        Err(e) => {
                            // Connection released between the check above and registration
                            warn!(
                                handle = %pc,
                                stream_id = %stream_id,
                                "Remote track dropped: {}",
                                e
                            );
                            continue;
                        }
                    }
                }
            };

            for event in events {
                self.deliver(event).await;
            }
        }
    }

    /// Send one event, waiting for room once the host glue owns the receiver
    async fn deliver(&self, event: BridgeEvent) {
        debug!(handle = %self.pc, event = event.name(), "Forwarding event");
        if !self.receiver_taken.load(Ordering::Acquire) {
            emit(&self.event_tx, event);
            return;
        }
        if self.event_tx.send(event).await.is_err() {
            debug!(handle = %self.pc, "Event receiver dropped");
        }
    }

    /// The connection closed on its own: release it like `dispose` would
    async fn release_closed(&self) {
        // Detach rather than abort: this task runs the teardown
        drop(self.forwarders.lock().remove(&self.pc));

        let released = self.registry.release(&self.pc, ObjectKind::PeerConnection);
        if released.is_empty() {
            return;
        }
        info!(handle = %self.pc, objects = released.len(), "Peer connection closed natively");
        teardown(released, &self.event_tx, &self.forwarders).await;
    }
}

/// Register a remote track under the connection's stream for `stream_id`
///
/// The remote stream is created on first use and owned by the connection.
/// On failure the track is stopped and nothing new stays registered.
fn register_remote_track<P, T>(
    registry: &HandleRegistry<P, MediaStream, T>,
    pc: &Handle,
    stream_id: &str,
    track: Arc<T>,
) -> Result<Vec<BridgeEvent>>
where
    T: NativeTrack,
{
    let mut events = Vec::with_capacity(2);

    let existing = registry.children(pc).into_iter().find(|h| {
        registry
            .stream(h)
            .map(|s| s.is_remote() && s.id() == stream_id)
            .unwrap_or(false)
    });

    let stream_handle = match existing {
        Some(handle) => handle,
        None => {
            let inserted = registry.insert(
                NativeObject::MediaStream(Arc::new(MediaStream::remote(stream_id))),
                Some(pc),
            );
            let handle = match inserted {
                Ok(handle) => handle,
                Err(e) => {
                    track.stop();
                    return Err(e);
                }
            };
            events.push(BridgeEvent::StreamAdded {
                peer_connection: pc.clone(),
                stream: StreamInfo {
                    handle: handle.clone(),
                    id: stream_id.to_string(),
                    remote: true,
                    tracks: Vec::new(),
                },
            });
            handle
        }
    };

    let track_handle = match registry.insert(
        NativeObject::MediaTrack(Arc::clone(&track)),
        Some(&stream_handle),
    ) {
        Ok(handle) => handle,
        Err(e) => {
            track.stop();
            return Err(e);
        }
    };

    events.push(BridgeEvent::TrackAdded {
        peer_connection: pc.clone(),
        stream: stream_handle.clone(),
        track: track_info(track_handle, Some(stream_handle), track.as_ref()),
    });

    Ok(events)
}
