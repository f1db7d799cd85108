// Integration tests for playback state replication
//
// The shared snapshot follows last-writer-wins: every apply replaces the
// relevant fields wholesale and stamps the writer, and readers only ever
// see a complete snapshot.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use watchroom::config::RoomConfig;
use watchroom::{BroadcastThrottle, ClientEvent, PlaybackEvent, PlaybackState, Room, ServerEvent};

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_last_writer_wins() {
    let mut state = PlaybackState::default();

    state.apply(
        &PlaybackEvent::Seek {
            position_seconds: 10.0,
        },
        "alice",
    );
    state.apply(
        &PlaybackEvent::Seek {
            position_seconds: 20.0,
        },
        "bob",
    );

    // Whichever apply ran last owns the snapshot outright
    assert_eq!(state.position_seconds, 20.0);
    assert_eq!(state.last_writer.as_deref(), Some("bob"));
    assert!(state.last_write.is_some());
}

#[test]
fn test_play_pause_carry_position() {
    let mut state = PlaybackState::default();

    state.apply(
        &PlaybackEvent::Play {
            position_seconds: 12.5,
        },
        "alice",
    );
    assert!(state.is_playing);
    assert_eq!(state.position_seconds, 12.5);

    state.apply(
        &PlaybackEvent::Pause {
            position_seconds: 13.0,
        },
        "alice",
    );
    assert!(!state.is_playing);
    assert_eq!(state.position_seconds, 13.0);
}

#[test]
fn test_select_asset_restarts_playback() {
    let mut state = PlaybackState::default();
    state.apply(
        &PlaybackEvent::Play {
            position_seconds: 99.0,
        },
        "alice",
    );

    state.apply(
        &PlaybackEvent::SelectAsset {
            name: "movie.mp4".to_string(),
        },
        "bob",
    );

    assert_eq!(state.current_asset.as_deref(), Some("movie.mp4"));
    assert!(!state.is_playing);
    assert_eq!(state.position_seconds, 0.0);
    assert_eq!(state.last_writer.as_deref(), Some("bob"));
}

#[test]
fn test_volume_is_clamped() {
    let mut state = PlaybackState::default();

    state.apply(&PlaybackEvent::Volume { level: 1.7 }, "alice");
    assert_eq!(state.volume, 1.0);

    state.apply(&PlaybackEvent::Volume { level: -0.3 }, "alice");
    assert_eq!(state.volume, 0.0);

    state.apply(&PlaybackEvent::Mute, "alice");
    assert!(state.muted);
    state.apply(&PlaybackEvent::Unmute, "alice");
    assert!(!state.muted);
}

#[test]
fn test_throttle_debounces_per_class() {
    let mut throttle = BroadcastThrottle::new(Duration::from_millis(500));
    let start = Instant::now();

    assert!(throttle.allow_at("seek", start));
    assert!(!throttle.allow_at("seek", start + Duration::from_millis(100)));
    // Classes are independent
    assert!(throttle.allow_at("volume", start + Duration::from_millis(100)));
    assert!(throttle.allow_at("seek", start + Duration::from_millis(600)));
}

#[tokio::test]
async fn test_playback_broadcast_excludes_origin() {
    let cfg = RoomConfig {
        max_participants: 2,
        broadcast_throttle_ms: 0,
        call_timeout_secs: 30,
    };
    let room = Room::new(&cfg);

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let alice = room.admit("alice", tx_a).await.unwrap();
    room.admit("bob", tx_b).await.unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    room.handle_event(
        &alice.id,
        ClientEvent::Play {
            position_seconds: 5.0,
        },
    )
    .await;

    // The origin already knows its own outcome
    assert!(drain(&mut rx_a).is_empty());
    let events = drain(&mut rx_b);
    assert!(matches!(
        &events[0],
        ServerEvent::PlaybackState { state }
            if state.is_playing && state.position_seconds == 5.0
                && state.last_writer.as_deref() == Some(alice.id.as_str())
    ));
}

#[tokio::test]
async fn test_suppressed_broadcast_still_keeps_freshest_state() {
    // A huge throttle interval: only the first seek fans out
    let cfg = RoomConfig {
        max_participants: 2,
        broadcast_throttle_ms: 60_000,
        call_timeout_secs: 30,
    };
    let room = Room::new(&cfg);

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let alice = room.admit("alice", tx_a).await.unwrap();
    room.admit("bob", tx_b).await.unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    room.handle_event(
        &alice.id,
        ClientEvent::Seek {
            position_seconds: 10.0,
        },
    )
    .await;
    room.handle_event(
        &alice.id,
        ClientEvent::Seek {
            position_seconds: 20.0,
        },
    )
    .await;

    let events = drain(&mut rx_b);
    assert_eq!(events.len(), 1, "second seek broadcast should be debounced");

    // The state itself always keeps the latest value
    assert_eq!(room.playback().await.position_seconds, 20.0);

    // Discrete actions are never debounced
    room.handle_event(
        &alice.id,
        ClientEvent::Pause {
            position_seconds: 21.0,
        },
    )
    .await;
    let events = drain(&mut rx_b);
    assert!(matches!(
        &events[0],
        ServerEvent::PlaybackState { state } if state.position_seconds == 21.0
    ));
}
