//! Notification reconciliation for the room manager
//!
//! This module contains the bridge that turns inbound signaling
//! notifications, engine callbacks, and internally scheduled timers into
//! state transitions and published [`RoomEvent`]s.
//!
//! Reconciliation follows three rules:
//!
//! 1. Notifications outside the active room, or whose (kind, subject)
//!    sequence number does not advance, are dropped before any state is
//!    touched.
//! 2. Applying a change the state already reflects is a no-op: no delta,
//!    no event. Echoes of optimistic local mutations fall out this way.
//! 3. The session lock is held only across the synchronous mutation.
//!    Engine and signaling side effects, and event delivery, run after the
//!    lock is released.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::dedup::DedupWindow;
use crate::engine::{EngineEvent, RtcEngine};
use crate::error::RoomError;
use crate::events::{
    ApplySwitchInfo, AudienceExitedInfo, AudienceJoinedInfo, ChatMessageInfo, ConnectivityInfo,
    EventPriority, EventSubscription, FirstFrameInfo, MediaStatusInfo, NetworkQualityInfo,
    PkEventInfo, PkTransition, RoomEndedInfo, RoomEvent, RoomEventHandler, RoomModeInfo,
    RoomPhaseInfo, SeatApplyInfo, SeatChangeInfo, SeatInviteInfo, VolumeInfo,
};
use crate::pk::{PkPartner, PkReply, PkState};
use crate::room::{ChatRoomMode, RoomPhase, RoomRole, RoomStatus};
use crate::signaling::{
    NotificationEvent, RequestBody, SignalingClient, SignalingNotification, SignalingRequest,
};
use crate::user::{MediaSwitch, User, UserRole, UserStatus};

use super::config::RoomConfig;
use super::manager::{InternalEvent, ManagerStats, RoomSession};
use super::media::MediaStats;

/// Deferred work computed under the session lock and executed after it is
/// released
enum SideEffect {
    /// This client took a seat; bring local publishing up
    StartLocalMedia { mic: MediaSwitch, camera: MediaSwitch },
    /// This client left a seat; take local publishing down
    StopLocalMedia,
    /// The session ended; release the media room
    LeaveEngineRoom,
    /// A PK pairing was established; forward the local stream
    StartForward { room_id: String, token: String },
    /// A PK pairing ended; release the forwarded stream
    StopForward,
    /// A PK invite arrived while another pairing is pending or active
    RejectPkBusy { invite_id: Uuid, from_room_id: String },
    /// An invite was accepted into the pending state; arm its window
    SchedulePkTimeout { invite_id: Uuid },
}

/// Internal handler that bridges signaling and engine events to room events
///
/// The manager's operation methods and the pump task share this structure;
/// it owns the authoritative session state, the transient media statistics,
/// the de-duplication window, and both event delivery paths.
pub struct RoomNotificationHandler {
    /// Application event handler, when one is registered
    pub event_handler: Arc<RwLock<Option<Arc<dyn RoomEventHandler>>>>,
    /// Filtered subscriptions
    pub subscriptions: Arc<RwLock<Vec<EventSubscription>>>,
    /// Authoritative session state
    pub session: Arc<RwLock<RoomSession>>,
    /// Transient per-user media statistics, last value wins
    pub media_stats: Arc<DashMap<String, MediaStats>>,
    /// Sequence window for duplicate suppression
    pub dedup: Arc<Mutex<DedupWindow>>,
    /// Broadcast side of the event fan-out
    pub event_tx: broadcast::Sender<RoomEvent>,
    pub(crate) config: RoomConfig,
    signaling: Arc<dyn SignalingClient>,
    engine: Arc<dyn RtcEngine>,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    stats: Arc<Mutex<ManagerStats>>,
}

impl RoomNotificationHandler {
    pub(crate) fn new(
        config: RoomConfig,
        signaling: Arc<dyn SignalingClient>,
        engine: Arc<dyn RtcEngine>,
        event_tx: broadcast::Sender<RoomEvent>,
        internal_tx: mpsc::UnboundedSender<InternalEvent>,
        stats: Arc<Mutex<ManagerStats>>,
    ) -> Self {
        Self {
            event_handler: Arc::new(RwLock::new(None)),
            subscriptions: Arc::new(RwLock::new(Vec::new())),
            session: Arc::new(RwLock::new(RoomSession::default())),
            media_stats: Arc::new(DashMap::new()),
            dedup: Arc::new(Mutex::new(DedupWindow::new())),
            event_tx,
            config,
            signaling,
            engine,
            internal_tx,
            stats,
        }
    }

    /// Deliver one event through both fan-out paths
    pub(crate) async fn emit(&self, event: RoomEvent) {
        // Broadcast first; a lagging receiver must not delay the handler path
        let _ = self.event_tx.send(event.clone());

        let handler = self.event_handler.read().await.clone();
        if let Some(handler) = handler {
            handler.on_room_event(event.clone()).await;
        }

        for subscription in self.subscriptions.read().await.iter() {
            subscription.deliver(&event).await;
        }
    }

    pub(crate) async fn emit_all(&self, events: Vec<RoomEvent>) {
        for event in events {
            self.emit(event).await;
        }
    }

    /// Arm the window for a pending PK invite
    pub(crate) fn schedule_pk_timeout(&self, invite_id: Uuid) {
        let tx = self.internal_tx.clone();
        let window = self.config.pk_invite_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(InternalEvent::PkInviteTimeout { invite_id });
        });
    }

    async fn count_applied(&self) {
        self.stats.lock().await.notifications_applied += 1;
    }

    async fn count_dropped(&self) {
        self.stats.lock().await.notifications_dropped += 1;
    }

    // ===== SIGNALING NOTIFICATIONS =====

    /// Entry point for the pump: reconcile one notification
    pub(crate) async fn handle_notification(&self, notification: SignalingNotification) {
        let SignalingNotification { seq, room_id, event } = notification;

        // Scope check before anything else; notifications for a room we are
        // not in describe state we do not own.
        let in_scope = {
            let session = self.session.read().await;
            session.room_id() == Some(room_id.as_str())
        };
        if !in_scope {
            tracing::debug!(seq, %room_id, event = ?event.kind(), "dropping out-of-room notification");
            self.count_dropped().await;
            return;
        }

        let fresh = self
            .dedup
            .lock()
            .await
            .observe(event.kind(), &event.subject(), seq);
        if !fresh {
            tracing::debug!(seq, event = ?event.kind(), subject = %event.subject(), "dropping duplicate notification");
            self.count_dropped().await;
            return;
        }

        let mut events = Vec::new();
        let mut effects = Vec::new();
        let applied = {
            let mut session = self.session.write().await;
            self.apply_event(&mut session, event, &mut events, &mut effects)
        };

        match applied {
            Ok(true) => self.count_applied().await,
            Ok(false) => self.count_dropped().await,
            Err(err) => {
                tracing::debug!(%err, "notification not applied");
                self.count_dropped().await;
            }
        }

        self.run_side_effects(effects).await;
        self.emit_all(events).await;
    }

    /// Apply one notification to the session.
    ///
    /// Returns Ok(true) when state changed, Ok(false) for an idempotent
    /// no-op, and Err for stale events. Never performs I/O; side effects
    /// are queued for execution after the lock is dropped.
    fn apply_event(
        &self,
        session: &mut RoomSession,
        event: NotificationEvent,
        events: &mut Vec<RoomEvent>,
        effects: &mut Vec<SideEffect>,
    ) -> Result<bool, RoomError> {
        let now = Utc::now();
        let local_id = self.config.local_user.user_id.clone();

        match event {
            NotificationEvent::AudienceJoined { user } => {
                if user.user_id == local_id {
                    return Ok(false);
                }
                if session.audience.contains_key(&user.user_id) {
                    return Ok(false);
                }
                session
                    .audience
                    .insert(user.user_id.clone(), User::from_info(user.clone(), UserRole::Audience));
                let count = {
                    let room = session.room.as_mut().ok_or_else(|| {
                        RoomError::internal("active session without a room")
                    })?;
                    room.audience_count = room.audience_count.saturating_add(1);
                    room.audience_count
                };
                events.push(RoomEvent::AudienceJoined {
                    info: AudienceJoinedInfo {
                        user,
                        audience_count: count,
                        timestamp: now,
                    },
                    priority: EventPriority::Normal,
                });
                Ok(true)
            }

            NotificationEvent::AudienceExited { user_id } => {
                let seat_index = session.seats.seat_of(&user_id);
                let from_roster = session.audience.remove(&user_id).is_some();
                let vacated = session.seats.vacate_user(&user_id).is_some();
                if !from_roster && !vacated {
                    return Ok(false);
                }
                session.pending_applies.remove(&user_id);
                let count = {
                    let room = session.room.as_mut().ok_or_else(|| {
                        RoomError::internal("active session without a room")
                    })?;
                    room.audience_count = room.audience_count.saturating_sub(1);
                    room.audience_count
                };
                if vacated {
                    if let Some(seat) = seat_index.and_then(|i| session.seats.get(i)) {
                        events.push(RoomEvent::SeatChanged {
                            info: SeatChangeInfo {
                                seat: seat.clone(),
                                timestamp: now,
                            },
                            priority: EventPriority::Normal,
                        });
                    }
                }
                events.push(RoomEvent::AudienceExited {
                    info: AudienceExitedInfo {
                        user_id,
                        audience_count: count,
                        timestamp: now,
                    },
                    priority: EventPriority::Normal,
                });
                Ok(true)
            }

            NotificationEvent::SeatStatusChanged { seat_index, locked, occupant } => {
                if session.seats.get(seat_index).is_none() {
                    return Err(RoomError::stale(format!("unknown seat {seat_index}")));
                }

                let mut changed = false;

                match occupant {
                    Some(snapshot) => {
                        let was_self_seated = session.is_seated(&local_id);
                        let role = match session.room.as_ref() {
                            Some(room) if room.host_id == snapshot.user.user_id => UserRole::Host,
                            _ => UserRole::Audience,
                        };
                        let mut user = session
                            .audience
                            .remove(&snapshot.user.user_id)
                            .unwrap_or_else(|| User::from_info(snapshot.user.clone(), role));
                        user.status = UserStatus::Active;
                        user.mic = snapshot.mic;
                        user.camera = snapshot.camera;

                        let is_self = user.id() == local_id;
                        let restore = user.clone();
                        let occupied = match session.seats.occupy(seat_index, user) {
                            Ok(occupied) => occupied,
                            Err(err) => {
                                // Conflicting snapshot; put the user back
                                // where they were and drop the event
                                session
                                    .audience
                                    .insert(restore.id().to_string(), restore);
                                return Err(RoomError::stale(format!(
                                    "seat snapshot conflicts with local state: {err}"
                                )));
                            }
                        };
                        changed |= occupied;

                        if occupied && is_self {
                            session.pending_invite = None;
                            session.pending_applies.remove(&local_id);
                            if let Some(local) = session.local.as_mut() {
                                local.status = UserStatus::Active;
                                local.mic = snapshot.mic;
                                local.camera = snapshot.camera;
                            }
                            if !was_self_seated {
                                effects.push(SideEffect::StartLocalMedia {
                                    mic: snapshot.mic,
                                    camera: snapshot.camera,
                                });
                            }
                        }
                        if occupied {
                            session.pending_applies.remove(&snapshot.user.user_id);
                        }
                    }
                    None => {
                        if let Some(previous) = session.seats.vacate(seat_index) {
                            changed = true;
                            let is_self = previous.id() == local_id;
                            if is_self {
                                if let Some(local) = session.local.as_mut() {
                                    local.status = UserStatus::Default;
                                }
                                effects.push(SideEffect::StopLocalMedia);
                            } else {
                                // Former occupant returns to the audience
                                let mut user = previous;
                                user.status = UserStatus::Default;
                                session.audience.insert(user.id().to_string(), user);
                            }
                        }
                    }
                }

                changed |= session
                    .seats
                    .set_locked(seat_index, locked)
                    .unwrap_or(false);

                if !changed {
                    return Ok(false);
                }
                if let Some(seat) = session.seats.get(seat_index) {
                    events.push(RoomEvent::SeatChanged {
                        info: SeatChangeInfo {
                            seat: seat.clone(),
                            timestamp: now,
                        },
                        priority: EventPriority::Normal,
                    });
                }
                Ok(true)
            }

            NotificationEvent::SeatApplyReceived { user, seat_index } => {
                if session.phase != RoomPhase::Active(RoomRole::Host) {
                    return Err(RoomError::stale("seat application received while not hosting"));
                }
                if session.pending_applies.contains_key(&user.user_id) {
                    return Ok(false);
                }
                session
                    .pending_applies
                    .insert(user.user_id.clone(), (user.clone(), seat_index));
                if let Some(applicant) = session.audience.get_mut(&user.user_id) {
                    applicant.status = UserStatus::Applied;
                }
                events.push(RoomEvent::SeatApplyReceived {
                    info: SeatApplyInfo {
                        user,
                        seat_index,
                        timestamp: now,
                    },
                    priority: EventPriority::High,
                });
                Ok(true)
            }

            NotificationEvent::SeatApplyCancelled { user_id } => {
                if session.pending_applies.remove(&user_id).is_none() {
                    return Ok(false);
                }
                if let Some(applicant) = session.audience.get_mut(&user_id) {
                    applicant.status = UserStatus::Default;
                }
                events.push(RoomEvent::SeatApplyCancelled {
                    user_id,
                    priority: EventPriority::Normal,
                });
                Ok(true)
            }

            NotificationEvent::SeatInviteReceived { seat_index, host } => {
                if session.is_seated(&local_id) {
                    return Err(RoomError::stale("seat invite received while already seated"));
                }
                if session
                    .pending_invite
                    .map(|pending| pending == seat_index)
                    .unwrap_or(false)
                {
                    return Ok(false);
                }
                session.pending_invite = Some(seat_index);
                if let Some(local) = session.local.as_mut() {
                    local.status = UserStatus::Invited;
                }
                events.push(RoomEvent::SeatInviteReceived {
                    info: SeatInviteInfo {
                        seat_index,
                        host,
                        timestamp: now,
                    },
                    priority: EventPriority::High,
                });
                Ok(true)
            }

            NotificationEvent::MediaStatusChanged { user_id, mic, camera } => {
                let mut changed = false;
                let mut seat_snapshot = None;

                if let Some(local) = session.local.as_mut() {
                    if local.id() == user_id && (local.mic != mic || local.camera != camera) {
                        local.mic = mic;
                        local.camera = camera;
                        changed = true;
                    }
                }
                let mut on_seat = false;
                if let Some(occupant) = session.seats.occupant_mut(&user_id) {
                    if occupant.mic != mic || occupant.camera != camera {
                        occupant.mic = mic;
                        occupant.camera = camera;
                        changed = true;
                    }
                    on_seat = true;
                }
                if on_seat {
                    if let Some(index) = session.seats.seat_of(&user_id) {
                        seat_snapshot = session.seats.get(index).cloned();
                    }
                } else if let Some(user) = session.audience.get_mut(&user_id) {
                    if user.mic != mic || user.camera != camera {
                        user.mic = mic;
                        user.camera = camera;
                        changed = true;
                    }
                }

                if !changed {
                    // Usually the echo of our own optimistic update
                    return Ok(false);
                }
                events.push(RoomEvent::MediaStatusChanged {
                    info: MediaStatusInfo {
                        user_id,
                        mic,
                        camera,
                        timestamp: now,
                    },
                    priority: EventPriority::Normal,
                });
                if let Some(seat) = seat_snapshot {
                    events.push(RoomEvent::SeatChanged {
                        info: SeatChangeInfo { seat, timestamp: now },
                        priority: EventPriority::Normal,
                    });
                }
                Ok(true)
            }

            NotificationEvent::AudienceApplySwitchChanged { enabled } => {
                let room = session
                    .room
                    .as_mut()
                    .ok_or_else(|| RoomError::internal("active session without a room"))?;
                if room.enable_audience_apply == enabled {
                    return Ok(false);
                }
                room.enable_audience_apply = enabled;
                events.push(RoomEvent::AudienceApplySwitchChanged {
                    info: ApplySwitchInfo {
                        enabled,
                        timestamp: now,
                    },
                    priority: EventPriority::Normal,
                });
                Ok(true)
            }

            NotificationEvent::RoomModeChanged { mode } => {
                let room = session
                    .room
                    .as_mut()
                    .ok_or_else(|| RoomError::internal("active session without a room"))?;
                if room.mode == mode {
                    return Ok(false);
                }
                room.mode = mode;
                room.status = match mode {
                    ChatRoomMode::MakeCoHost => RoomStatus::MadeCoHost,
                    ChatRoomMode::ChatRoom => RoomStatus::MadeGuest,
                };
                events.push(RoomEvent::RoomModeChanged {
                    info: RoomModeInfo {
                        mode,
                        timestamp: now,
                    },
                    priority: EventPriority::Normal,
                });
                Ok(true)
            }

            NotificationEvent::AnchorPkInvite { invite_id, from_room_id, from_user, seat_index: _ } => {
                if session.phase != RoomPhase::Active(RoomRole::Host) {
                    return Err(RoomError::stale("PK invite received while not hosting"));
                }
                match &session.pk {
                    PkState::None => {}
                    PkState::Invited { invite_id: pending, .. } if *pending == invite_id => {
                        return Ok(false);
                    }
                    _ => {
                        effects.push(SideEffect::RejectPkBusy {
                            invite_id,
                            from_room_id,
                        });
                        return Err(RoomError::stale("PK invite received while already engaged"));
                    }
                }
                let from = PkPartner::new(from_room_id, from_user);
                session.active_end_pk = false;
                session.pk = PkState::Invited {
                    invite_id,
                    from: from.clone(),
                };
                effects.push(SideEffect::SchedulePkTimeout { invite_id });
                events.push(RoomEvent::PkChanged {
                    info: PkEventInfo {
                        transition: PkTransition::InviteReceived,
                        partner: Some(from),
                        timestamp: now,
                    },
                    priority: EventPriority::High,
                });
                Ok(true)
            }

            NotificationEvent::AnchorPkReply { invite_id, from_room_id, agree, pk_token } => {
                let target = match &session.pk {
                    PkState::Inviting { invite_id: pending, target } if *pending == invite_id => {
                        target.clone()
                    }
                    _ => {
                        // Covers the post-timeout late accept: the pending
                        // invite is gone, so the reply no longer applies.
                        return Err(RoomError::stale(format!(
                            "PK reply for invite {invite_id} does not match any pending invite"
                        )));
                    }
                };

                if agree {
                    let token = pk_token.ok_or_else(|| {
                        RoomError::stale("accepting PK reply carried no forwarding token")
                    })?;
                    let mut partner = PkPartner::new(target.room_id.clone(), target.user.clone());
                    partner.token = Some(token.clone());
                    session.pk = PkState::Paired {
                        partner: partner.clone(),
                    };
                    effects.push(SideEffect::StartForward {
                        room_id: from_room_id,
                        token,
                    });
                    events.push(RoomEvent::PkChanged {
                        info: PkEventInfo {
                            transition: PkTransition::Paired,
                            partner: Some(partner),
                            timestamp: now,
                        },
                        priority: EventPriority::High,
                    });
                } else {
                    session.pk = PkState::None;
                    events.push(RoomEvent::PkChanged {
                        info: PkEventInfo {
                            transition: PkTransition::Resolved(PkReply::Reject),
                            partner: Some(target),
                            timestamp: now,
                        },
                        priority: EventPriority::Normal,
                    });
                }
                Ok(true)
            }

            NotificationEvent::AnchorPkEnded { .. } => match std::mem::take(&mut session.pk) {
                PkState::Paired { partner } => {
                    session.active_end_pk = false;
                    effects.push(SideEffect::StopForward);
                    events.push(RoomEvent::PkChanged {
                        info: PkEventInfo {
                            transition: PkTransition::Ended { by_remote: true },
                            partner: Some(partner),
                            timestamp: now,
                        },
                        priority: EventPriority::High,
                    });
                    Ok(true)
                }
                PkState::Ending => {
                    // Echo of our own stop request; already handled locally
                    session.active_end_pk = false;
                    Ok(false)
                }
                PkState::None if session.active_end_pk => {
                    session.active_end_pk = false;
                    Ok(false)
                }
                previous => {
                    session.pk = previous;
                    Err(RoomError::stale("PK end received without an active pairing"))
                }
            },

            NotificationEvent::UserKicked { user_id } => {
                if user_id == local_id {
                    let room_id = session.room_id().unwrap_or_default().to_string();
                    let previous = session.phase;
                    session.reset();
                    session.phase = RoomPhase::Ended;
                    effects.push(SideEffect::StopLocalMedia);
                    effects.push(SideEffect::LeaveEngineRoom);
                    events.push(RoomEvent::KickedFromRoom {
                        info: RoomEndedInfo {
                            room_id: room_id.clone(),
                            reason: "kicked".to_string(),
                            timestamp: now,
                        },
                        priority: EventPriority::Critical,
                    });
                    events.push(RoomEvent::RoomPhaseChanged {
                        info: RoomPhaseInfo {
                            new_phase: RoomPhase::Ended,
                            previous_phase: Some(previous),
                            reason: Some("kicked from room".to_string()),
                            timestamp: now,
                        },
                        priority: EventPriority::Critical,
                    });
                    return Ok(true);
                }

                let seat_index = session.seats.seat_of(&user_id);
                let from_seat = session.seats.vacate_user(&user_id).is_some();
                let from_roster = session.audience.remove(&user_id).is_some();
                session.pending_applies.remove(&user_id);
                if !from_seat && !from_roster {
                    return Ok(false);
                }
                if let Some(index) = seat_index {
                    if let Some(seat) = session.seats.get(index) {
                        events.push(RoomEvent::SeatChanged {
                            info: SeatChangeInfo {
                                seat: seat.clone(),
                                timestamp: now,
                            },
                            priority: EventPriority::Normal,
                        });
                    }
                }
                events.push(RoomEvent::AudienceExited {
                    info: AudienceExitedInfo {
                        user_id,
                        audience_count: session
                            .room
                            .as_ref()
                            .map(|r| r.audience_count)
                            .unwrap_or_default(),
                        timestamp: now,
                    },
                    priority: EventPriority::Normal,
                });
                Ok(true)
            }

            NotificationEvent::RoomDestroyed => {
                let room_id = session.room_id().unwrap_or_default().to_string();
                let previous = session.phase;
                let was_paired = session.pk.is_paired();
                session.reset();
                session.phase = RoomPhase::Ended;
                if was_paired {
                    effects.push(SideEffect::StopForward);
                }
                effects.push(SideEffect::LeaveEngineRoom);
                events.push(RoomEvent::RoomEnded {
                    info: RoomEndedInfo {
                        room_id,
                        reason: "destroyed".to_string(),
                        timestamp: now,
                    },
                    priority: EventPriority::Critical,
                });
                events.push(RoomEvent::RoomPhaseChanged {
                    info: RoomPhaseInfo {
                        new_phase: RoomPhase::Ended,
                        previous_phase: Some(previous),
                        reason: Some("room destroyed".to_string()),
                        timestamp: now,
                    },
                    priority: EventPriority::Critical,
                });
                Ok(true)
            }

            NotificationEvent::ChatMessage { sender, text } => {
                events.push(RoomEvent::ChatMessageReceived {
                    info: ChatMessageInfo {
                        sender,
                        text,
                        timestamp: now,
                    },
                    priority: EventPriority::Normal,
                });
                Ok(true)
            }
        }
    }

    // ===== ENGINE EVENTS =====

    /// Entry point for the pump: ingest one engine callback.
    ///
    /// Volume and quality data is transient and last-value-wins; it goes
    /// through neither the dedup window nor the request/ack path.
    pub(crate) async fn handle_engine_event(&self, event: EngineEvent) {
        let now = Utc::now();
        match event {
            EngineEvent::VolumesReported { volumes } => {
                let threshold = self.config.speaking_threshold;
                {
                    let mut session = self.session.write().await;
                    for (user_id, volume) in &volumes {
                        if let Some(local) = session.local.as_mut() {
                            if local.id() == user_id {
                                local.update_volume(*volume, threshold);
                            }
                        }
                        if let Some(occupant) = session.seats.occupant_mut(user_id) {
                            occupant.update_volume(*volume, threshold);
                        }
                    }
                }
                for (user_id, volume) in &volumes {
                    let mut entry = self
                        .media_stats
                        .entry(user_id.clone())
                        .or_insert_with(MediaStats::default);
                    entry.volume = (*volume).min(255);
                    entry.is_speaking = entry.volume > threshold;
                }
                self.emit(RoomEvent::VolumesUpdated {
                    info: VolumeInfo {
                        volumes,
                        timestamp: now,
                    },
                    priority: EventPriority::Low,
                })
                .await;
            }

            EngineEvent::NetworkQualityChanged { user_id, quality } => {
                self.media_stats
                    .entry(user_id.clone())
                    .or_insert_with(MediaStats::default)
                    .quality = quality;
                self.emit(RoomEvent::NetworkQualityChanged {
                    info: NetworkQualityInfo {
                        user_id,
                        quality,
                        timestamp: now,
                    },
                    priority: EventPriority::Low,
                })
                .await;
            }

            EngineEvent::FirstRemoteVideoFrame { user_id } => {
                self.emit(RoomEvent::FirstRemoteFrame {
                    info: FirstFrameInfo {
                        user_id,
                        timestamp: now,
                    },
                    priority: EventPriority::Normal,
                })
                .await;
            }

            EngineEvent::ConnectionStateChanged { connected } => {
                let mut events = Vec::new();
                let mut effects = Vec::new();
                if !connected {
                    let mut session = self.session.write().await;
                    if session.pk.is_paired() {
                        if let PkState::Paired { partner } = std::mem::take(&mut session.pk) {
                            session.active_end_pk = false;
                            effects.push(SideEffect::StopForward);
                            events.push(RoomEvent::PkChanged {
                                info: PkEventInfo {
                                    transition: PkTransition::Ended { by_remote: true },
                                    partner: Some(partner),
                                    timestamp: now,
                                },
                                priority: EventPriority::High,
                            });
                        }
                    }
                }
                events.push(RoomEvent::ConnectivityChanged {
                    info: ConnectivityInfo {
                        connected,
                        timestamp: now,
                    },
                    priority: if connected {
                        EventPriority::Normal
                    } else {
                        EventPriority::Critical
                    },
                });
                self.run_side_effects(effects).await;
                self.emit_all(events).await;
            }
        }
    }

    // ===== INTERNAL EVENTS =====

    /// Entry point for the pump: apply one internally scheduled event
    pub(crate) async fn handle_internal(&self, event: InternalEvent) {
        match event {
            InternalEvent::PkInviteTimeout { invite_id } => {
                let now = Utc::now();
                let mut events = Vec::new();
                {
                    let mut session = self.session.write().await;
                    match session.pk.pending_invite_id() {
                        Some(pending) if pending == invite_id => {
                            let partner = match std::mem::take(&mut session.pk) {
                                PkState::Inviting { target, .. } => Some(target),
                                PkState::Invited { from, .. } => Some(from),
                                _ => None,
                            };
                            events.push(RoomEvent::PkChanged {
                                info: PkEventInfo {
                                    transition: PkTransition::Resolved(PkReply::Timeout),
                                    partner,
                                    timestamp: now,
                                },
                                priority: EventPriority::Normal,
                            });
                            tracing::info!(%invite_id, "PK invite timed out");
                        }
                        _ => {
                            // The invite already resolved; the timer is stale
                            tracing::debug!(%invite_id, "ignoring stale PK timeout");
                        }
                    }
                }
                self.emit_all(events).await;
            }
        }
    }

    // ===== SIDE EFFECTS =====

    async fn run_side_effects(&self, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::StartLocalMedia { mic, camera } => {
                    if let Err(err) = self.engine.update_video_config(false).await {
                        tracing::warn!(%err, "video config update failed after taking seat");
                    }
                    if let Err(err) = self.engine.enable_local_audio(mic.is_on()).await {
                        tracing::warn!(%err, "enabling local audio failed");
                    }
                    if let Err(err) = self.engine.enable_local_video(camera.is_on()).await {
                        tracing::warn!(%err, "enabling local video failed");
                    }
                }
                SideEffect::StopLocalMedia => {
                    if let Err(err) = self.engine.enable_local_audio(false).await {
                        tracing::warn!(%err, "disabling local audio failed");
                    }
                    if let Err(err) = self.engine.enable_local_video(false).await {
                        tracing::warn!(%err, "disabling local video failed");
                    }
                }
                SideEffect::LeaveEngineRoom => {
                    if let Err(err) = self.engine.leave_room().await {
                        tracing::warn!(%err, "engine leave failed during teardown");
                    }
                }
                SideEffect::StartForward { room_id, token } => {
                    if let Err(err) = self.engine.start_forward_stream(&room_id, &token).await {
                        tracing::warn!(%err, %room_id, "starting forwarded stream failed");
                        self.emit(RoomEvent::SessionError {
                            error: RoomError::engine(format!(
                                "failed to start forwarded stream: {err}"
                            )),
                            priority: EventPriority::Critical,
                        })
                        .await;
                    } else {
                        self.stats.lock().await.pk_battles_started += 1;
                    }
                }
                SideEffect::StopForward => {
                    if let Err(err) = self.engine.stop_forward_stream().await {
                        tracing::warn!(%err, "stopping forwarded stream failed");
                    }
                }
                SideEffect::RejectPkBusy { invite_id, from_room_id } => {
                    let room_id = {
                        let session = self.session.read().await;
                        session.room_id().unwrap_or_default().to_string()
                    };
                    let request = SignalingRequest::new(RequestBody::PkReply {
                        invite_id,
                        room_id,
                        target_room_id: from_room_id,
                        agree: false,
                    });
                    if let Err(err) = self.signaling.request(request).await {
                        tracing::warn!(%err, "busy rejection of PK invite failed");
                    }
                }
                SideEffect::SchedulePkTimeout { invite_id } => {
                    self.schedule_pk_timeout(invite_id);
                }
            }
        }
    }
}
