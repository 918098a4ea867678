//! Cross-room PK battle flows between two host managers, each in its own
//! room, wired through the in-memory signaling hub.

mod common;

use std::time::Duration;

use common::{expect_event, settle, started_manager, started_manager_with_config, RecordingEngine, SignalingHub};

use liveroom_client_core::events::{PkTransition, RoomEvent};
use liveroom_client_core::pk::{PkReply, PkState};
use liveroom_client_core::user::UserInfo;
use liveroom_client_core::{RoomConfig, RoomError};

#[tokio::test]
async fn accepted_invite_pairs_both_sides_and_forwards_both_streams() {
    let hub = SignalingHub::new();
    let x_engine = RecordingEngine::new();
    let y_engine = RecordingEngine::new();

    let x = started_manager(&hub, UserInfo::new("x-1", "anchor-x"), x_engine.clone()).await;
    let y = started_manager(&hub, UserInfo::new("y-1", "anchor-y"), y_engine.clone()).await;

    let (rx, _) = x.create_room("room x").await.unwrap();
    let (ry, _) = y.create_room("room y").await.unwrap();

    let mut x_events = x.subscribe().await;
    let mut y_events = y.subscribe().await;

    x.request_pk_invite(&ry.room_id, UserInfo::new("y-1", "anchor-y"), 2)
        .await
        .unwrap();
    assert!(matches!(x.session().await.pk, PkState::Inviting { .. }));

    expect_event(&mut y_events, "PK invite", |e| {
        matches!(e, RoomEvent::PkChanged { info, .. }
            if info.transition == PkTransition::InviteReceived)
    })
    .await;
    assert!(matches!(y.session().await.pk, PkState::Invited { .. }));

    y.reply_pk_invite(true).await.unwrap();

    expect_event(&mut x_events, "pairing on the inviter", |e| {
        matches!(e, RoomEvent::PkChanged { info, .. }
            if info.transition == PkTransition::Paired)
    })
    .await;
    settle().await;

    let x_pk = x.session().await.pk;
    let y_pk = y.session().await.pk;
    assert!(x_pk.is_paired());
    assert!(y_pk.is_paired());

    // Both sides forward toward the counterpart room with the same token
    let token = y_pk.partner().unwrap().token.clone().unwrap();
    assert!(x_engine.has_call(&format!("start_forward_stream:{}:{token}", ry.room_id)));
    assert!(y_engine.has_call(&format!("start_forward_stream:{}:{token}", rx.room_id)));
    assert_eq!(x_pk.partner().unwrap().token.as_deref(), Some(token.as_str()));
}

#[tokio::test]
async fn stop_from_either_anchor_tears_both_sides_down() {
    let hub = SignalingHub::new();
    let x_engine = RecordingEngine::new();
    let y_engine = RecordingEngine::new();

    let x = started_manager(&hub, UserInfo::new("x-1", "anchor-x"), x_engine.clone()).await;
    let y = started_manager(&hub, UserInfo::new("y-1", "anchor-y"), y_engine.clone()).await;

    let (_rx, _) = x.create_room("room x").await.unwrap();
    let (ry, _) = y.create_room("room y").await.unwrap();

    let mut y_events = y.subscribe().await;
    x.request_pk_invite(&ry.room_id, UserInfo::new("y-1", "anchor-y"), 2)
        .await
        .unwrap();
    expect_event(&mut y_events, "PK invite", |e| {
        matches!(e, RoomEvent::PkChanged { info, .. }
            if info.transition == PkTransition::InviteReceived)
    })
    .await;
    y.reply_pk_invite(true).await.unwrap();
    settle().await;
    assert!(x.session().await.pk.is_paired());

    let mut x_events = x.subscribe().await;
    x.request_stop_pk().await.unwrap();

    // The stopping side reaches None immediately
    assert!(matches!(x.session().await.pk, PkState::None));

    // The remote side is torn down by the notification
    expect_event(&mut y_events, "remote PK end", |e| {
        matches!(e, RoomEvent::PkChanged { info, .. }
            if info.transition == (PkTransition::Ended { by_remote: true }))
    })
    .await;
    settle().await;
    assert!(matches!(y.session().await.pk, PkState::None));

    assert!(x_engine.has_call("stop_forward_stream"));
    assert!(y_engine.has_call("stop_forward_stream"));

    // The echo of the stop back to the initiator is a no-op: exactly one
    // Ended transition on the initiator's stream.
    let mut ended = 0;
    while let Ok(event) = x_events.try_recv() {
        if let RoomEvent::PkChanged { info, .. } = event {
            if matches!(info.transition, PkTransition::Ended { .. }) {
                ended += 1;
            }
        }
    }
    assert_eq!(ended, 1, "the initiator sees exactly one Ended transition");
}

#[tokio::test]
async fn rejected_invite_returns_both_sides_to_none() {
    let hub = SignalingHub::new();
    let x = started_manager(&hub, UserInfo::new("x-1", "anchor-x"), RecordingEngine::new()).await;
    let y = started_manager(&hub, UserInfo::new("y-1", "anchor-y"), RecordingEngine::new()).await;

    x.create_room("room x").await.unwrap();
    let (ry, _) = y.create_room("room y").await.unwrap();

    let mut x_events = x.subscribe().await;
    let mut y_events = y.subscribe().await;
    x.request_pk_invite(&ry.room_id, UserInfo::new("y-1", "anchor-y"), 2)
        .await
        .unwrap();
    expect_event(&mut y_events, "PK invite", |e| {
        matches!(e, RoomEvent::PkChanged { info, .. }
            if info.transition == PkTransition::InviteReceived)
    })
    .await;

    y.reply_pk_invite(false).await.unwrap();
    expect_event(&mut x_events, "rejection on the inviter", |e| {
        matches!(e, RoomEvent::PkChanged { info, .. }
            if info.transition == PkTransition::Resolved(PkReply::Reject))
    })
    .await;

    assert!(matches!(x.session().await.pk, PkState::None));
    assert!(matches!(y.session().await.pk, PkState::None));
}

#[tokio::test]
#[serial_test::serial]
async fn unanswered_invite_times_out_on_both_sides_and_late_accept_is_dead() {
    let hub = SignalingHub::new();
    let x_engine = RecordingEngine::new();

    let short = Duration::from_millis(100);
    let x = started_manager_with_config(
        &hub,
        UserInfo::new("x-1", "anchor-x"),
        x_engine.clone(),
        RoomConfig::new(UserInfo::new("x-1", "anchor-x")).with_pk_invite_timeout(short),
    )
    .await;
    let y = started_manager_with_config(
        &hub,
        UserInfo::new("y-1", "anchor-y"),
        RecordingEngine::new(),
        RoomConfig::new(UserInfo::new("y-1", "anchor-y")).with_pk_invite_timeout(short),
    )
    .await;

    x.create_room("room x").await.unwrap();
    let (ry, _) = y.create_room("room y").await.unwrap();

    let mut x_events = x.subscribe().await;
    x.request_pk_invite(&ry.room_id, UserInfo::new("y-1", "anchor-y"), 2)
        .await
        .unwrap();

    // Nobody answers; both windows elapse
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(matches!(x.session().await.pk, PkState::None));
    assert!(matches!(y.session().await.pk, PkState::None));

    let mut timeouts = 0;
    while let Ok(event) = x_events.try_recv() {
        if let RoomEvent::PkChanged { info, .. } = event {
            if info.transition == PkTransition::Resolved(PkReply::Timeout) {
                timeouts += 1;
            }
        }
    }
    assert_eq!(timeouts, 1, "the inviter times out exactly once");

    // The invited side's window also resolved, so a late accept is refused
    // locally before any request goes out
    let err = y.reply_pk_invite(true).await.unwrap_err();
    assert!(matches!(err, RoomError::Precondition { .. }));

    // And the inviter never started forwarding
    assert!(!x_engine.has_call("start_forward_stream"));
}

#[tokio::test]
async fn busy_anchor_auto_rejects_a_second_invite() {
    let hub = SignalingHub::new();
    let x = started_manager(&hub, UserInfo::new("x-1", "anchor-x"), RecordingEngine::new()).await;
    let y = started_manager(&hub, UserInfo::new("y-1", "anchor-y"), RecordingEngine::new()).await;
    let z = started_manager(&hub, UserInfo::new("z-1", "anchor-z"), RecordingEngine::new()).await;

    let (rx, _) = x.create_room("room x").await.unwrap();
    let (ry, _) = y.create_room("room y").await.unwrap();
    z.create_room("room z").await.unwrap();

    // Pair x with y
    let mut y_events = y.subscribe().await;
    x.request_pk_invite(&ry.room_id, UserInfo::new("y-1", "anchor-y"), 2)
        .await
        .unwrap();
    expect_event(&mut y_events, "PK invite", |e| {
        matches!(e, RoomEvent::PkChanged { info, .. }
            if info.transition == PkTransition::InviteReceived)
    })
    .await;
    y.reply_pk_invite(true).await.unwrap();
    settle().await;
    assert!(x.session().await.pk.is_paired());

    // A third anchor invites the busy x and is rejected without x's UI
    // ever being involved
    let mut z_events = z.subscribe().await;
    z.request_pk_invite(&rx.room_id, UserInfo::new("x-1", "anchor-x"), 2)
        .await
        .unwrap();
    expect_event(&mut z_events, "busy rejection", |e| {
        matches!(e, RoomEvent::PkChanged { info, .. }
            if info.transition == PkTransition::Resolved(PkReply::Reject))
    })
    .await;

    assert!(matches!(z.session().await.pk, PkState::None));
    assert!(x.session().await.pk.is_paired(), "the busy pairing survives");
}

#[tokio::test]
async fn engine_disconnect_tears_an_active_pairing_down() {
    let hub = SignalingHub::new();
    let x_engine = RecordingEngine::new();
    let x = started_manager(&hub, UserInfo::new("x-1", "anchor-x"), x_engine.clone()).await;
    let y = started_manager(&hub, UserInfo::new("y-1", "anchor-y"), RecordingEngine::new()).await;

    x.create_room("room x").await.unwrap();
    let (ry, _) = y.create_room("room y").await.unwrap();

    let mut y_events = y.subscribe().await;
    x.request_pk_invite(&ry.room_id, UserInfo::new("y-1", "anchor-y"), 2)
        .await
        .unwrap();
    expect_event(&mut y_events, "PK invite", |e| {
        matches!(e, RoomEvent::PkChanged { info, .. }
            if info.transition == PkTransition::InviteReceived)
    })
    .await;
    y.reply_pk_invite(true).await.unwrap();
    settle().await;
    assert!(x.session().await.pk.is_paired());

    let mut x_events = x.subscribe().await;
    x_engine.push_event(liveroom_client_core::EngineEvent::ConnectionStateChanged {
        connected: false,
    });

    expect_event(&mut x_events, "disconnect teardown", |e| {
        matches!(e, RoomEvent::PkChanged { info, .. }
            if matches!(info.transition, PkTransition::Ended { .. }))
    })
    .await;
    assert!(matches!(x.session().await.pk, PkState::None));
    assert!(x_engine.has_call("stop_forward_stream"));
}

#[tokio::test]
async fn muting_the_partner_is_local_and_tracked() {
    let hub = SignalingHub::new();
    let x_engine = RecordingEngine::new();
    let x = started_manager(&hub, UserInfo::new("x-1", "anchor-x"), x_engine.clone()).await;
    let y = started_manager(&hub, UserInfo::new("y-1", "anchor-y"), RecordingEngine::new()).await;

    x.create_room("room x").await.unwrap();
    let (ry, _) = y.create_room("room y").await.unwrap();

    let mut y_events = y.subscribe().await;
    x.request_pk_invite(&ry.room_id, UserInfo::new("y-1", "anchor-y"), 2)
        .await
        .unwrap();
    expect_event(&mut y_events, "PK invite", |e| {
        matches!(e, RoomEvent::PkChanged { info, .. }
            if info.transition == PkTransition::InviteReceived)
    })
    .await;
    y.reply_pk_invite(true).await.unwrap();
    settle().await;

    x.mute_pk_anchor(true).await.unwrap();
    assert!(x_engine.has_call("mute_remote_anchor:y-1:true"));
    let partner = x.session().await.pk.partner().cloned().unwrap();
    assert_eq!(partner.mic, liveroom_client_core::PkAnchorMic::Muted);
}
