//! Integration tests for event forwarding and stale-event handling

mod harness;

use harness::{assert_no_event, next_event, wait_until, FakeEngine};
use rtc_bridge::{
    BridgeConfig, BridgeEvent, IceCandidate, IceGatheringState, MediaConstraints,
    MediaStreamConstraints, NativeEvent, NativeTrack, ObjectKind, PeerConnectionState,
    RtcBridge, RtcConfiguration, SessionDescription, SignalingState, TrackKind, TrackState,
};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_take_event_receiver_once() {
    let bridge = harness::bridge();

    assert!(bridge.take_event_receiver().is_some());
    assert!(bridge.take_event_receiver().is_none());
}

#[tokio::test]
async fn test_native_events_tagged_with_connection_handle() {
    let bridge = harness::bridge();
    let mut events = bridge.take_event_receiver().unwrap();

    let pc = bridge
        .create_peer_connection(RtcConfiguration::default(), &MediaConstraints::default())
        .await
        .unwrap();

    bridge
        .set_local_description(&pc, SessionDescription::offer("v=0"))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::SignalingStateChanged {
            peer_connection: pc.clone(),
            state: SignalingState::HaveLocalOffer,
        }
    );

    let connection = bridge.engine().last_connection();
    connection.emit(NativeEvent::IceGatheringStateChanged(
        IceGatheringState::Gathering,
    ));
    let candidate = IceCandidate {
        candidate: "candidate:1 1 udp 2122260223 192.168.1.2 54321 typ host".to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    };
    connection.emit(NativeEvent::IceCandidate(candidate.clone()));
    connection.emit(NativeEvent::ConnectionStateChanged(
        PeerConnectionState::Connecting,
    ));

    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::IceGatheringStateChanged {
            peer_connection: pc.clone(),
            state: IceGatheringState::Gathering,
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::IceCandidate {
            peer_connection: pc.clone(),
            candidate,
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::ConnectionStateChanged {
            peer_connection: pc.clone(),
            state: PeerConnectionState::Connecting,
        }
    );
}

#[tokio::test]
async fn test_remote_tracks_grouped_under_connection_owned_stream() {
    let bridge = harness::bridge();
    let mut events = bridge.take_event_receiver().unwrap();

    let pc = bridge
        .create_peer_connection(RtcConfiguration::default(), &MediaConstraints::default())
        .await
        .unwrap();
    let connection = bridge.engine().last_connection();

    connection.remote_track("remote-1", TrackKind::Audio);
    connection.remote_track("remote-1", TrackKind::Video);

    let stream = match next_event(&mut events).await {
        BridgeEvent::StreamAdded {
            peer_connection,
            stream,
        } => {
            assert_eq!(peer_connection, pc);
            assert_eq!(stream.id, "remote-1");
            assert!(stream.remote);
            stream.handle
        }
        other => panic!("expected stream added, got {:?}", other),
    };

    let mut track_handles = Vec::new();
    for expected_kind in [TrackKind::Audio, TrackKind::Video] {
        match next_event(&mut events).await {
            BridgeEvent::TrackAdded {
                peer_connection,
                stream: track_stream,
                track,
            } => {
                assert_eq!(peer_connection, pc);
                assert_eq!(track_stream, stream);
                assert_eq!(track.kind, expected_kind);
                assert!(track.remote);
                track_handles.push(track.handle);
            }
            other => panic!("expected track added, got {:?}", other),
        }
    }

    assert_eq!(bridge.registry().owner_of(&stream), Some(pc.clone()));
    assert_eq!(bridge.registry().children(&stream), track_handles);
    assert_eq!(bridge.stream_info(&stream).unwrap().tracks.len(), 2);

    // Remote streams cascade with their connection
    assert_eq!(bridge.dispose(&pc).await, 4);
    assert!(bridge.registry().is_empty());
}

#[tokio::test]
async fn test_dispose_emits_teardown_events_children_first() {
    let bridge = harness::bridge();
    let mut events = bridge.take_event_receiver().unwrap();

    let pc = bridge
        .create_peer_connection(RtcConfiguration::default(), &MediaConstraints::default())
        .await
        .unwrap();
    let stream = bridge
        .create_local_stream(&pc, &MediaStreamConstraints::audio_video())
        .await
        .unwrap();

    bridge.dispose(&pc).await;

    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::TrackEnded {
            track: stream.tracks[0].handle.clone()
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::TrackEnded {
            track: stream.tracks[1].handle.clone()
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::StreamRemoved {
            stream: stream.handle.clone()
        }
    );
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn test_events_after_dispose_are_dropped() {
    let bridge = harness::bridge();
    let mut events = bridge.take_event_receiver().unwrap();

    let pc = bridge
        .create_peer_connection(RtcConfiguration::default(), &MediaConstraints::default())
        .await
        .unwrap();
    let connection = bridge.engine().last_connection();

    bridge.dispose(&pc).await;

    // The library keeps calling back after close
    connection.emit(NativeEvent::ConnectionStateChanged(
        PeerConnectionState::Closed,
    ));
    connection.remote_track("late-stream", TrackKind::Audio);

    assert_no_event(&mut events).await;
    assert!(bridge.registry().is_empty());
    assert!(bridge.registry().handles(ObjectKind::MediaStream).is_empty());
}

#[tokio::test]
async fn test_forwarder_drops_events_for_released_connection() {
    let bridge = harness::bridge();
    let mut events = bridge.take_event_receiver().unwrap();

    let pc = bridge
        .create_peer_connection(RtcConfiguration::default(), &MediaConstraints::default())
        .await
        .unwrap();
    let connection = bridge.engine().last_connection();

    // Released without native teardown, so the forwarder is still running
    let released = bridge.registry().release(&pc, ObjectKind::PeerConnection);
    assert_eq!(released.len(), 1);

    connection.emit(NativeEvent::SignalingStateChanged(SignalingState::Stable));
    let late = connection.remote_track("late-stream", TrackKind::Video);

    assert_no_event(&mut events).await;
    assert_eq!(late.ready_state(), TrackState::Ended);
    assert!(bridge.registry().is_empty());
}

#[tokio::test]
async fn test_native_close_releases_connection_subtree() {
    let bridge = harness::bridge();
    let mut events = bridge.take_event_receiver().unwrap();

    let pc = bridge
        .create_peer_connection(RtcConfiguration::default(), &MediaConstraints::default())
        .await
        .unwrap();
    let stream = bridge
        .create_local_stream(&pc, &MediaStreamConstraints::audio_only())
        .await
        .unwrap();
    let connection = bridge.engine().last_connection();

    connection.closed.store(true, Ordering::SeqCst);
    connection.emit(NativeEvent::ConnectionStateChanged(
        PeerConnectionState::Closed,
    ));

    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::ConnectionStateChanged {
            peer_connection: pc.clone(),
            state: PeerConnectionState::Closed,
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::TrackEnded {
            track: stream.tracks[0].handle.clone()
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::StreamRemoved {
            stream: stream.handle.clone()
        }
    );

    assert!(bridge.registry().is_empty());
    let err = bridge
        .create_offer(&pc, &MediaConstraints::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        bridge.engine().tracks.lock()[0].ready_state(),
        TrackState::Ended
    );

    // Scripting-side dispose arriving afterwards is a no-op
    assert_eq!(bridge.dispose(&pc).await, 0);
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn test_failed_connection_stays_registered() {
    let bridge = harness::bridge();
    let mut events = bridge.take_event_receiver().unwrap();

    let pc = bridge
        .create_peer_connection(RtcConfiguration::default(), &MediaConstraints::default())
        .await
        .unwrap();
    bridge
        .engine()
        .last_connection()
        .emit(NativeEvent::ConnectionStateChanged(
            PeerConnectionState::Failed,
        ));

    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::ConnectionStateChanged {
            peer_connection: pc.clone(),
            state: PeerConnectionState::Failed,
        }
    );
    assert_eq!(bridge.registry().kind_of(&pc), Some(ObjectKind::PeerConnection));

    // An ICE restart is still possible
    bridge
        .create_offer(&pc, &MediaConstraints::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_forwarder_keeps_running_before_receiver_is_taken() {
    let config = BridgeConfig {
        event_channel_capacity: 2,
        ..BridgeConfig::default()
    };
    let bridge = RtcBridge::new(FakeEngine::default(), config).unwrap();

    let pc = bridge
        .create_peer_connection(RtcConfiguration::default(), &MediaConstraints::default())
        .await
        .unwrap();
    let connection = bridge.engine().last_connection();

    for _ in 0..10 {
        connection.emit(NativeEvent::IceGatheringStateChanged(
            IceGatheringState::Gathering,
        ));
    }
    connection.emit(NativeEvent::ConnectionStateChanged(
        PeerConnectionState::Closed,
    ));

    // The close is only handled if the forwarder never blocked on the full channel
    wait_until(|| bridge.registry().is_empty()).await;
    assert_eq!(bridge.registry().kind_of(&pc), None);

    let mut events = bridge.take_event_receiver().unwrap();
    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::IceGatheringStateChanged {
            peer_connection: pc.clone(),
            state: IceGatheringState::Gathering,
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispose_racing_remote_tracks_leaves_no_state() {
    let bridge = harness::bridge();
    let _events = bridge.take_event_receiver().unwrap();

    for round in 0..20 {
        let pc = bridge
            .create_peer_connection(RtcConfiguration::default(), &MediaConstraints::default())
            .await
            .unwrap();
        let connection = bridge.engine().last_connection();

        let injector = tokio::spawn(async move {
            for i in 0..50 {
                connection.remote_track(&format!("stream-{}-{}", round, i % 3), TrackKind::Audio);
                tokio::task::yield_now().await;
            }
        });

        tokio::task::yield_now().await;
        bridge.dispose(&pc).await;
        injector.await.unwrap();

        assert!(
            bridge.registry().is_empty(),
            "round {} left {} objects",
            round,
            bridge.registry().len()
        );
    }
}
