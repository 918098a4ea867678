//! In-memory test backend
//!
//! [`SignalingHub`] is a miniature signaling service: it owns room state,
//! turns requests into acks, and fans notifications out to connected
//! clients with per-room sequence numbers, exactly the contract the
//! manager expects. [`RecordingEngine`] is an RTC engine that records
//! every call and lets tests feed callback events in.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex};

use liveroom_client_core::engine::{EngineEvent, RenderHandle, RtcEngine};
use liveroom_client_core::error::{RoomError, RoomResult};
use liveroom_client_core::events::RoomEvent;
use liveroom_client_core::room::{Room, RoomStatus, RoomSummary};
use liveroom_client_core::signaling::{
    AudienceListPayload, CreateRoomPayload, JoinRoomPayload, NotificationEvent, PkReplyPayload,
    RequestBody, RoomListPayload, SeatOccupantSnapshot, SeatSnapshot, SignalingAck,
    SignalingClient, SignalingNotification, SignalingRequest, CODE_ROOM_NOT_FOUND,
};
use liveroom_client_core::user::{MediaSwitch, UserInfo};

// ===== HUB =====

struct HubRoom {
    room: Room,
    seq: u64,
    members: Vec<String>,
    seats: Vec<SeatSnapshot>,
    users: HashMap<String, UserInfo>,
    pending_applies: HashMap<String, u8>,
}

impl HubRoom {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn seat_mut(&mut self, index: u8) -> Option<&mut SeatSnapshot> {
        self.seats.iter_mut().find(|s| s.index == index)
    }
}

#[derive(Default)]
struct HubState {
    rooms: HashMap<String, HubRoom>,
    clients: HashMap<String, mpsc::UnboundedSender<SignalingNotification>>,
    user_rooms: HashMap<String, String>,
    pk_links: HashMap<String, String>,
    next_room: u32,
    next_token: u32,
}

impl HubState {
    /// Deliver an event to one user, stamped with their room's sequence
    fn send_to(&mut self, user_id: &str, event: NotificationEvent) {
        let Some(room_id) = self.user_rooms.get(user_id).cloned() else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        let seq = room.next_seq();
        if let Some(tx) = self.clients.get(user_id) {
            let _ = tx.send(SignalingNotification {
                seq,
                room_id,
                event,
            });
        }
    }

    fn broadcast(&mut self, room_id: &str, event: NotificationEvent) {
        let members = match self.rooms.get(room_id) {
            Some(room) => room.members.clone(),
            None => return,
        };
        for member in members {
            self.send_to(&member, event.clone());
        }
    }

    fn broadcast_except(&mut self, room_id: &str, skip: &str, event: NotificationEvent) {
        let members = match self.rooms.get(room_id) {
            Some(room) => room.members.clone(),
            None => return,
        };
        for member in members {
            if member != skip {
                self.send_to(&member, event.clone());
            }
        }
    }
}

/// The in-memory signaling service shared by every connected test client
#[derive(Default)]
pub struct SignalingHub {
    state: Mutex<HubState>,
}

impl SignalingHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connect a client; the returned adapter implements `SignalingClient`
    pub async fn connect(self: &Arc<Self>, user: UserInfo) -> Arc<HubClient> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .lock()
            .await
            .clients
            .insert(user.user_id.clone(), tx);
        Arc::new(HubClient {
            hub: self.clone(),
            user,
            rx: Mutex::new(rx),
        })
    }

    /// Inject a raw notification to one user, for duplicate/stale replays
    pub async fn replay(&self, user_id: &str, seq: u64, room_id: &str, event: NotificationEvent) {
        let state = self.state.lock().await;
        if let Some(tx) = state.clients.get(user_id) {
            let _ = tx.send(SignalingNotification {
                seq,
                room_id: room_id.to_string(),
                event,
            });
        }
    }

    async fn handle(&self, sender: &UserInfo, body: RequestBody) -> RoomResult<(i32, String, Option<serde_json::Value>)> {
        let mut state = self.state.lock().await;
        let sender_id = sender.user_id.clone();

        fn ok(
            payload: Option<serde_json::Value>,
        ) -> RoomResult<(i32, String, Option<serde_json::Value>)> {
            Ok((0, String::new(), payload))
        }

        match body {
            RequestBody::CreateRoom {
                room_name,
                host,
                seat_count,
                enable_audience_apply,
            } => {
                state.next_room += 1;
                let room_id = format!("room-{}", state.next_room);
                let room = Room {
                    room_id: room_id.clone(),
                    name: room_name,
                    host_id: host.user_id.clone(),
                    status: RoomStatus::Living,
                    enable_audience_apply,
                    ..Default::default()
                };
                let hub_room = HubRoom {
                    room: room.clone(),
                    seq: 0,
                    members: vec![host.user_id.clone()],
                    seats: (1..=seat_count)
                        .map(|index| SeatSnapshot {
                            index,
                            locked: false,
                            occupant: None,
                        })
                        .collect(),
                    users: HashMap::from([(host.user_id.clone(), host.clone())]),
                    pending_applies: HashMap::new(),
                };
                state.rooms.insert(room_id.clone(), hub_room);
                state.user_rooms.insert(host.user_id.clone(), room_id);
                let payload = CreateRoomPayload {
                    room,
                    rtc_token: format!("rtc-{sender_id}"),
                };
                ok(Some(serde_json::to_value(payload).unwrap()))
            }

            RequestBody::JoinRoom { room_id, user } => {
                if !state.rooms.contains_key(&room_id) {
                    return Ok((CODE_ROOM_NOT_FOUND, "no such room".to_string(), None));
                }
                {
                    let room = state.rooms.get_mut(&room_id).unwrap();
                    room.members.push(user.user_id.clone());
                    room.users.insert(user.user_id.clone(), user.clone());
                    room.room.audience_count += 1;
                }
                state.user_rooms.insert(user.user_id.clone(), room_id.clone());
                state.broadcast_except(
                    &room_id,
                    &user.user_id,
                    NotificationEvent::AudienceJoined { user: user.clone() },
                );
                let room = state.rooms.get(&room_id).unwrap();
                let host = room
                    .users
                    .get(&room.room.host_id)
                    .cloned()
                    .unwrap_or_else(|| UserInfo::new(room.room.host_id.clone(), "host"));
                let payload = JoinRoomPayload {
                    room: room.room.clone(),
                    host,
                    seats: room.seats.clone(),
                    pk_anchors: Vec::new(),
                    rtc_token: format!("rtc-{sender_id}"),
                };
                ok(Some(serde_json::to_value(payload).unwrap()))
            }

            RequestBody::LeaveRoom { room_id } => {
                if let Some(room) = state.rooms.get_mut(&room_id) {
                    room.members.retain(|m| m != &sender_id);
                    room.users.remove(&sender_id);
                    room.room.audience_count = room.room.audience_count.saturating_sub(1);
                    if let Some(seat) = room
                        .seats
                        .iter_mut()
                        .find(|s| s.occupant.as_ref().map(|o| &o.user.user_id) == Some(&sender_id))
                    {
                        seat.occupant = None;
                    }
                }
                state.user_rooms.remove(&sender_id);
                state.broadcast(
                    &room_id,
                    NotificationEvent::AudienceExited {
                        user_id: sender_id,
                    },
                );
                ok(None)
            }

            RequestBody::DestroyRoom { room_id } => {
                state.broadcast_except(&room_id, &sender_id, NotificationEvent::RoomDestroyed);
                if let Some(room) = state.rooms.remove(&room_id) {
                    for member in room.members {
                        state.user_rooms.remove(&member);
                    }
                }
                state.pk_links.remove(&room_id);
                ok(None)
            }

            RequestBody::FetchRoomList { .. } => {
                let rooms: Vec<RoomSummary> = state
                    .rooms
                    .values()
                    .map(|r| RoomSummary {
                        room_id: r.room.room_id.clone(),
                        name: r.room.name.clone(),
                        host_name: r
                            .users
                            .get(&r.room.host_id)
                            .map(|u| u.user_name.clone())
                            .unwrap_or_default(),
                        cover_url: String::new(),
                        audience_count: r.room.audience_count,
                    })
                    .collect();
                let payload = RoomListPayload {
                    rooms,
                    next_cursor: 0,
                };
                ok(Some(serde_json::to_value(payload).unwrap()))
            }

            RequestBody::FetchAudienceList { room_id } => {
                let users = state
                    .rooms
                    .get(&room_id)
                    .map(|room| {
                        room.users
                            .values()
                            .filter(|u| u.user_id != room.room.host_id)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                let payload = AudienceListPayload { users };
                ok(Some(serde_json::to_value(payload).unwrap()))
            }

            RequestBody::ApplyForSeat { room_id, seat_index } => {
                let host_id = match state.rooms.get_mut(&room_id) {
                    Some(room) => {
                        room.pending_applies.insert(sender_id.clone(), seat_index);
                        room.room.host_id.clone()
                    }
                    None => return Ok((CODE_ROOM_NOT_FOUND, "no such room".to_string(), None)),
                };
                state.send_to(
                    &host_id,
                    NotificationEvent::SeatApplyReceived {
                        user: sender.clone(),
                        seat_index,
                    },
                );
                ok(None)
            }

            RequestBody::CancelSeatApply { room_id } => {
                let host_id = match state.rooms.get_mut(&room_id) {
                    Some(room) => {
                        room.pending_applies.remove(&sender_id);
                        room.room.host_id.clone()
                    }
                    None => return ok(None),
                };
                state.send_to(
                    &host_id,
                    NotificationEvent::SeatApplyCancelled {
                        user_id: sender_id,
                    },
                );
                ok(None)
            }

            RequestBody::ReplySeatInvite {
                room_id,
                seat_index,
                agree,
            } => {
                if agree {
                    let occupant = SeatOccupantSnapshot {
                        user: sender.clone(),
                        mic: MediaSwitch::On,
                        camera: MediaSwitch::On,
                    };
                    let locked = {
                        let room = state.rooms.get_mut(&room_id).unwrap();
                        let seat = room.seat_mut(seat_index).unwrap();
                        seat.occupant = Some(occupant.clone());
                        seat.locked
                    };
                    state.broadcast(
                        &room_id,
                        NotificationEvent::SeatStatusChanged {
                            seat_index,
                            locked,
                            occupant: Some(occupant),
                        },
                    );
                }
                ok(None)
            }

            RequestBody::InviteToSeat {
                room_id,
                user_id,
                seat_index,
            } => {
                let host = state
                    .rooms
                    .get(&room_id)
                    .and_then(|r| r.users.get(&r.room.host_id))
                    .cloned()
                    .unwrap_or_else(|| sender.clone());
                state.send_to(
                    &user_id,
                    NotificationEvent::SeatInviteReceived {
                        seat_index,
                        host,
                    },
                );
                ok(None)
            }

            RequestBody::AgreeSeatApply { room_id, user_id } => {
                let seated = {
                    let room = match state.rooms.get_mut(&room_id) {
                        Some(room) => room,
                        None => return ok(None),
                    };
                    let Some(seat_index) = room.pending_applies.remove(&user_id) else {
                        return Ok((1, "no pending application".to_string(), None));
                    };
                    let user = room
                        .users
                        .get(&user_id)
                        .cloned()
                        .unwrap_or_else(|| UserInfo::new(user_id.clone(), user_id.clone()));
                    let occupant = SeatOccupantSnapshot {
                        user,
                        mic: MediaSwitch::On,
                        camera: MediaSwitch::On,
                    };
                    let seat = room.seat_mut(seat_index).unwrap();
                    seat.occupant = Some(occupant.clone());
                    (seat_index, seat.locked, occupant)
                };
                state.broadcast(
                    &room_id,
                    NotificationEvent::SeatStatusChanged {
                        seat_index: seated.0,
                        locked: seated.1,
                        occupant: Some(seated.2),
                    },
                );
                ok(None)
            }

            RequestBody::RejectSeatApply { room_id, user_id } => {
                if let Some(room) = state.rooms.get_mut(&room_id) {
                    room.pending_applies.remove(&user_id);
                }
                state.send_to(
                    &sender_id,
                    NotificationEvent::SeatApplyCancelled { user_id },
                );
                ok(None)
            }

            RequestBody::ManageSeat {
                room_id,
                seat_index,
                action,
            } => {
                use liveroom_client_core::seat::SeatAction;
                let snapshot = {
                    let room = match state.rooms.get_mut(&room_id) {
                        Some(room) => room,
                        None => return ok(None),
                    };
                    let seat = match room.seat_mut(seat_index) {
                        Some(seat) => seat,
                        None => return Ok((1, "no such seat".to_string(), None)),
                    };
                    match action {
                        SeatAction::Kick => seat.occupant = None,
                        SeatAction::Lock => seat.locked = true,
                        SeatAction::Unlock => seat.locked = false,
                        SeatAction::Mute => {
                            if let Some(occ) = seat.occupant.as_mut() {
                                occ.mic = MediaSwitch::Off;
                            }
                        }
                        SeatAction::Unmute => {
                            if let Some(occ) = seat.occupant.as_mut() {
                                occ.mic = MediaSwitch::On;
                            }
                        }
                    }
                    seat.clone()
                };
                state.broadcast(
                    &room_id,
                    NotificationEvent::SeatStatusChanged {
                        seat_index,
                        locked: snapshot.locked,
                        occupant: snapshot.occupant,
                    },
                );
                ok(None)
            }

            RequestBody::LeaveSeat { room_id, seat_index } => {
                let locked = {
                    let room = match state.rooms.get_mut(&room_id) {
                        Some(room) => room,
                        None => return ok(None),
                    };
                    match room.seat_mut(seat_index) {
                        Some(seat) => {
                            seat.occupant = None;
                            seat.locked
                        }
                        None => false,
                    }
                };
                state.broadcast(
                    &room_id,
                    NotificationEvent::SeatStatusChanged {
                        seat_index,
                        locked,
                        occupant: None,
                    },
                );
                ok(None)
            }

            RequestBody::UpdateMediaStatus { room_id, mic, camera } => {
                if let Some(room) = state.rooms.get_mut(&room_id) {
                    if let Some(seat) = room
                        .seats
                        .iter_mut()
                        .find(|s| s.occupant.as_ref().map(|o| &o.user.user_id) == Some(&sender_id))
                    {
                        if let Some(occ) = seat.occupant.as_mut() {
                            occ.mic = mic;
                            occ.camera = camera;
                        }
                    }
                }
                // Everyone hears about it, the sender included; the echo
                // must be a no-op on the sender's side.
                state.broadcast(
                    &room_id,
                    NotificationEvent::MediaStatusChanged {
                        user_id: sender_id,
                        mic,
                        camera,
                    },
                );
                ok(None)
            }

            RequestBody::SetAudienceApplyEnabled { room_id, enabled } => {
                if let Some(room) = state.rooms.get_mut(&room_id) {
                    room.room.enable_audience_apply = enabled;
                }
                state.broadcast(
                    &room_id,
                    NotificationEvent::AudienceApplySwitchChanged { enabled },
                );
                ok(None)
            }

            RequestBody::SwitchRoomMode { room_id, mode } => {
                if let Some(room) = state.rooms.get_mut(&room_id) {
                    room.room.mode = mode;
                }
                state.broadcast(&room_id, NotificationEvent::RoomModeChanged { mode });
                ok(None)
            }

            RequestBody::PkInvite {
                invite_id,
                room_id,
                target_room_id,
                target_user_id,
                seat_index,
            } => {
                let _ = target_room_id;
                state.send_to(
                    &target_user_id,
                    NotificationEvent::AnchorPkInvite {
                        invite_id,
                        from_room_id: room_id,
                        from_user: sender.clone(),
                        seat_index,
                    },
                );
                ok(None)
            }

            RequestBody::PkReply {
                invite_id,
                room_id,
                target_room_id,
                agree,
            } => {
                let pk_token = if agree {
                    state.next_token += 1;
                    Some(format!("pk-token-{}", state.next_token))
                } else {
                    None
                };
                if agree {
                    state
                        .pk_links
                        .insert(room_id.clone(), target_room_id.clone());
                    state
                        .pk_links
                        .insert(target_room_id.clone(), room_id.clone());
                }
                let target_host = state
                    .rooms
                    .get(&target_room_id)
                    .map(|r| r.room.host_id.clone());
                if let Some(host_id) = target_host {
                    state.send_to(
                        &host_id,
                        NotificationEvent::AnchorPkReply {
                            invite_id,
                            from_room_id: room_id,
                            agree,
                            pk_token: pk_token.clone(),
                        },
                    );
                }
                match pk_token {
                    Some(pk_token) => ok(Some(
                        serde_json::to_value(PkReplyPayload { pk_token }).unwrap(),
                    )),
                    None => ok(None),
                }
            }

            RequestBody::PkStop { room_id } => {
                let partner_room = state.pk_links.remove(&room_id);
                if let Some(partner_room) = partner_room {
                    state.pk_links.remove(&partner_room);
                    let hosts: Vec<String> = [&room_id, &partner_room]
                        .iter()
                        .filter_map(|id| state.rooms.get(*id).map(|r| r.room.host_id.clone()))
                        .collect();
                    for host in hosts {
                        state.send_to(
                            &host,
                            NotificationEvent::AnchorPkEnded {
                                room_id: room_id.clone(),
                            },
                        );
                    }
                }
                ok(None)
            }

            RequestBody::SendChatMessage { room_id, text } => {
                state.broadcast_except(
                    &room_id,
                    &sender_id,
                    NotificationEvent::ChatMessage {
                        sender: sender.clone(),
                        text,
                    },
                );
                ok(None)
            }
        }
    }
}

/// One client's connection to the hub
pub struct HubClient {
    hub: Arc<SignalingHub>,
    user: UserInfo,
    rx: Mutex<mpsc::UnboundedReceiver<SignalingNotification>>,
}

#[async_trait]
impl SignalingClient for HubClient {
    async fn request(&self, request: SignalingRequest) -> RoomResult<SignalingAck> {
        let (code, message, payload) = self.hub.handle(&self.user, request.body).await?;
        Ok(SignalingAck {
            request_id: request.request_id,
            code,
            message,
            payload,
        })
    }

    async fn next_notification(&self) -> Option<SignalingNotification> {
        self.rx.lock().await.recv().await
    }
}

// ===== ENGINE =====

/// An engine that records every call and replays injected events
pub struct RecordingEngine {
    calls: std::sync::Mutex<Vec<String>>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: Mutex<mpsc::UnboundedReceiver<EngineEvent>>,
    fail_join: std::sync::atomic::AtomicBool,
}

impl RecordingEngine {
    pub fn new() -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            calls: std::sync::Mutex::new(Vec::new()),
            events_tx,
            events_rx: Mutex::new(events_rx),
            fail_join: std::sync::atomic::AtomicBool::new(false),
        })
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether any recorded call starts with `prefix`
    pub fn has_call(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }

    /// Feed a callback event into the pump
    pub fn push_event(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Make subsequent joins fail, for rollback tests
    pub fn set_fail_join(&self, fail: bool) {
        self.fail_join.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RtcEngine for RecordingEngine {
    async fn join_room(
        &self,
        _token: &str,
        room_id: &str,
        user_id: &str,
        is_host: bool,
    ) -> RoomResult<()> {
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(RoomError::engine("join refused by test engine"));
        }
        self.record(format!("join_room:{room_id}:{user_id}:{is_host}"));
        Ok(())
    }
    async fn leave_room(&self) -> RoomResult<()> {
        self.record("leave_room".to_string());
        Ok(())
    }
    async fn enable_local_audio(&self, enabled: bool) -> RoomResult<()> {
        self.record(format!("enable_local_audio:{enabled}"));
        Ok(())
    }
    async fn enable_local_video(&self, enabled: bool) -> RoomResult<()> {
        self.record(format!("enable_local_video:{enabled}"));
        Ok(())
    }
    async fn mute_local_audio(&self, muted: bool) -> RoomResult<()> {
        self.record(format!("mute_local_audio:{muted}"));
        Ok(())
    }
    async fn mute_local_video(&self, muted: bool) -> RoomResult<()> {
        self.record(format!("mute_local_video:{muted}"));
        Ok(())
    }
    async fn switch_camera(&self) -> RoomResult<()> {
        self.record("switch_camera".to_string());
        Ok(())
    }
    async fn update_video_config(&self, is_host: bool) -> RoomResult<()> {
        self.record(format!("update_video_config:{is_host}"));
        Ok(())
    }
    async fn start_forward_stream(&self, room_id: &str, token: &str) -> RoomResult<()> {
        self.record(format!("start_forward_stream:{room_id}:{token}"));
        Ok(())
    }
    async fn stop_forward_stream(&self) -> RoomResult<()> {
        self.record("stop_forward_stream".to_string());
        Ok(())
    }
    async fn mute_remote_anchor(&self, user_id: &str, muted: bool) -> RoomResult<()> {
        self.record(format!("mute_remote_anchor:{user_id}:{muted}"));
        Ok(())
    }
    async fn render_handle(&self, _user_id: &str) -> Option<RenderHandle> {
        Some(RenderHandle(7))
    }
    async fn next_event(&self) -> Option<EngineEvent> {
        self.events_rx.lock().await.recv().await
    }
}

// ===== HELPERS =====

/// Wait until an event matching the predicate arrives, or panic after 2s
pub async fn expect_event(
    rx: &mut broadcast::Receiver<RoomEvent>,
    what: &str,
    pred: impl Fn(&RoomEvent) -> bool,
) -> RoomEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("event stream closed while waiting for {what}")
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

/// Give the pumps a moment to drain
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// Initialize test logging once per binary; honors RUST_LOG
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Build and start a manager connected to the hub with default config
pub async fn started_manager(
    hub: &Arc<SignalingHub>,
    user: UserInfo,
    engine: Arc<RecordingEngine>,
) -> Arc<liveroom_client_core::RoomManager> {
    init_tracing();
    let config = liveroom_client_core::RoomConfig::new(user.clone());
    started_manager_with_config(hub, user, engine, config).await
}

/// Build and start a manager with an explicit configuration
pub async fn started_manager_with_config(
    hub: &Arc<SignalingHub>,
    user: UserInfo,
    engine: Arc<RecordingEngine>,
    config: liveroom_client_core::RoomConfig,
) -> Arc<liveroom_client_core::RoomManager> {
    let signaling = hub.connect(user).await;
    let manager = liveroom_client_core::RoomManagerBuilder::new(config.local_user.clone())
        .with_config(config)
        .with_signaling(signaling)
        .with_engine(engine)
        .build()
        .await
        .expect("manager construction");
    manager.start().await.expect("manager start");
    manager
}
