//! Room lifecycle against the in-memory hub: creation, joining, browsing,
//! fail-open teardown, and engine rollback.

mod common;

use common::{settle, started_manager, RecordingEngine, SignalingHub};

use tokio_test::assert_ok;

use liveroom_client_core::manager::recovery::{retry_with_backoff, RetryConfig};
use liveroom_client_core::room::{RoomPhase, RoomRole};
use liveroom_client_core::user::UserInfo;
use liveroom_client_core::{ChatRoomMode, RoomError};

#[tokio::test]
async fn created_rooms_are_listable_and_joinable() {
    let hub = SignalingHub::new();
    let host = started_manager(&hub, UserInfo::new("h-1", "host"), RecordingEngine::new()).await;
    let viewer = started_manager(&hub, UserInfo::new("u-1", "ivy"), RecordingEngine::new()).await;

    let (room, _) = host.create_room("visible room").await.unwrap();

    // The read-only listing, wrapped in the caller-side retry helper
    let listing = retry_with_backoff("fetch_room_list", RetryConfig::quick(), || async {
        viewer.fetch_room_list(0, 10).await
    })
    .await
    .unwrap();
    assert_eq!(listing.rooms.len(), 1);
    assert_eq!(listing.rooms[0].room_id, room.room_id);
    assert_eq!(listing.rooms[0].name, "visible room");

    let joined = viewer.join_room(&room.room_id).await.unwrap();
    assert_eq!(joined.host.user_id, "h-1");
    assert_eq!(viewer.session().await.phase, RoomPhase::Active(RoomRole::Audience));

    // Read-only renderer lookup passes straight through to the engine
    assert!(viewer.render_handle("h-1").await.is_some());

    settle().await;
    let audience = host.fetch_audience_list().await.unwrap();
    assert_eq!(audience.len(), 1);
    assert_eq!(audience[0].user_id, "u-1");
}

#[tokio::test]
async fn joining_a_missing_room_reports_room_not_found() {
    let hub = SignalingHub::new();
    let viewer = started_manager(&hub, UserInfo::new("u-1", "jan"), RecordingEngine::new()).await;

    let err = viewer.join_room("room-404").await.unwrap_err();
    assert!(matches!(err, RoomError::RoomNotFound { .. }));
    assert_eq!(viewer.session().await.phase, RoomPhase::Idle);
}

#[tokio::test]
async fn engine_join_failure_rolls_the_join_back() {
    let hub = SignalingHub::new();
    let engine = RecordingEngine::new();
    let host = started_manager(&hub, UserInfo::new("h-1", "host"), RecordingEngine::new()).await;
    let viewer = started_manager(&hub, UserInfo::new("u-1", "kay"), engine.clone()).await;

    let (room, _) = host.create_room("media down").await.unwrap();

    engine.set_fail_join(true);
    let err = viewer.join_room(&room.room_id).await.unwrap_err();
    assert!(matches!(err, RoomError::Engine { .. }));
    assert_eq!(viewer.session().await.phase, RoomPhase::Idle);

    // Recoverable at session granularity: fix the engine and rejoin
    engine.set_fail_join(false);
    viewer.join_room(&room.room_id).await.unwrap();
    assert_eq!(viewer.session().await.phase, RoomPhase::Active(RoomRole::Audience));
}

#[tokio::test]
async fn leaving_releases_the_engine_before_the_backend_hears() {
    let hub = SignalingHub::new();
    let engine = RecordingEngine::new();
    let host = started_manager(&hub, UserInfo::new("h-1", "host"), RecordingEngine::new()).await;
    let viewer = started_manager(&hub, UserInfo::new("u-1", "lee"), engine.clone()).await;

    let (room, _) = host.create_room("brief visit").await.unwrap();
    viewer.join_room(&room.room_id).await.unwrap();
    tokio_test::assert_ok!(viewer.leave_room().await);

    assert!(engine.has_call("leave_room"));
    assert_eq!(viewer.session().await.phase, RoomPhase::Ended);
    assert!(viewer.session().await.room.is_none());

    settle().await;
    assert_eq!(host.session().await.room.as_ref().unwrap().audience_count, 0);
}

#[tokio::test]
async fn host_toggles_reach_the_audience() {
    let hub = SignalingHub::new();
    let host = started_manager(&hub, UserInfo::new("h-1", "host"), RecordingEngine::new()).await;
    let viewer = started_manager(&hub, UserInfo::new("u-1", "mia"), RecordingEngine::new()).await;

    let (room, _) = host.create_room("toggles").await.unwrap();
    viewer.join_room(&room.room_id).await.unwrap();
    settle().await;

    host.set_audience_apply_enabled(false).await.unwrap();
    host.switch_room_mode(ChatRoomMode::ChatRoom).await.unwrap();
    settle().await;

    let viewer_room = viewer.session().await.room.unwrap();
    assert!(!viewer_room.enable_audience_apply);
    assert_eq!(viewer_room.mode, ChatRoomMode::ChatRoom);

    // And the flipped switch now short-circuits applications
    let outcome = viewer.apply_for_seat(1).await.unwrap();
    assert!(!outcome.needs_apply);
}

#[tokio::test]
async fn a_fresh_session_can_host_after_ending_one() {
    let hub = SignalingHub::new();
    let host = started_manager(&hub, UserInfo::new("h-1", "host"), RecordingEngine::new()).await;

    let (first, _) = host.create_room("first").await.unwrap();
    host.finish_live().await.unwrap();
    assert_eq!(host.session().await.phase, RoomPhase::Ended);

    let (second, _) = host.create_room("second").await.unwrap();
    assert_ne!(first.room_id, second.room_id);
    assert_eq!(host.session().await.phase, RoomPhase::Active(RoomRole::Host));
}
