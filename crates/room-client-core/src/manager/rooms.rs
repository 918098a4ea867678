//! Room lifecycle operations
//!
//! This module contains the create/join/leave/finish operations and the
//! read-only room queries.
//!
//! # Lifecycle Overview
//!
//! - **Hosting**: `create_room()` stands a room up and enters it as host
//! - **Viewing**: `join_room()` seeds the full snapshot and enters as audience
//! - **Teardown**: `leave_room()` / `finish_live()` release engine resources
//!   first and never let a backend failure wedge the local session
//! - **Browsing**: `fetch_room_list()` / `fetch_audience_list()` are
//!   read-only; transport failures surface directly and retry policy is the
//!   caller's (see [`crate::manager::recovery`])
//!
//! Joins seed seats and PK state from the response snapshot rather than
//! relying on subsequent deltas, because deltas can be missed during the
//! join race window.

use chrono::Utc;

use crate::error::{RoomError, RoomResult};
use crate::events::{EventPriority, RoomEndedInfo, RoomEvent, RoomPhaseInfo};
use crate::pk::{PkPartner, PkState};
use crate::room::{Room, RoomPhase, RoomRole, RoomStatus};
use crate::seat::{Seat, SeatList, SeatStatus};
use crate::signaling::{
    decode_payload, AudienceListPayload, CreateRoomPayload, JoinRoomPayload, PkAnchorSnapshot,
    RequestBody, RoomListPayload, SignalingAck, SignalingRequest, CODE_OK, CODE_ROOM_NOT_FOUND,
};
use crate::user::{MediaSwitch, User, UserInfo, UserRole, UserStatus};

/// Everything a successful join seeds locally
#[derive(Debug, Clone)]
pub struct JoinedRoom {
    /// The room as the backend recorded it
    pub room: Room,
    /// The room's host
    pub host: UserInfo,
    /// Seat grid at join time
    pub seats: SeatList,
    /// PK pairings already in progress at join time
    pub pk_anchors: Vec<PkAnchorSnapshot>,
}

/// Room lifecycle operations for RoomManager
impl super::manager::RoomManager {
    /// Send one request and translate the ack envelope.
    ///
    /// A transport failure propagates as [`RoomError::Transport`]; a
    /// non-zero ack code becomes [`RoomError::BackendRejected`]. No request
    /// is ever retried here.
    pub(crate) async fn send_request(&self, body: RequestBody) -> RoomResult<SignalingAck> {
        let request = SignalingRequest::new(body);
        let name = request.body.event_name();
        tracing::debug!(request_id = %request.request_id, name, "sending signaling request");
        let ack = self.signaling.request(request).await?;
        if ack.code != CODE_OK {
            return Err(RoomError::rejected(ack.code, ack.message.clone()));
        }
        Ok(ack)
    }

    /// Move the session phase and publish the transition
    pub(crate) async fn set_phase(&self, new_phase: RoomPhase, reason: impl Into<String>) {
        let previous = {
            let mut session = self.handler.session.write().await;
            let previous = session.phase;
            session.phase = new_phase;
            previous
        };
        if previous == new_phase {
            return;
        }
        let priority = match new_phase {
            RoomPhase::Active(_) | RoomPhase::Ended => EventPriority::High,
            _ => EventPriority::Normal,
        };
        self.handler
            .emit(RoomEvent::RoomPhaseChanged {
                info: RoomPhaseInfo {
                    new_phase,
                    previous_phase: Some(previous),
                    reason: Some(reason.into()),
                    timestamp: Utc::now(),
                },
                priority,
            })
            .await;
    }

    /// Create a room and enter it as host
    ///
    /// On success the session is `Active(Host)`, the engine has joined the
    /// media room with the returned token, and local publishing is up.
    ///
    /// # Arguments
    ///
    /// * `room_name` - Display name for the new room
    ///
    /// # Returns
    ///
    /// The room as the backend recorded it, plus the engine token.
    ///
    /// # Errors
    ///
    /// * [`RoomError::InvalidState`] - already in a room
    /// * [`RoomError::Transport`] / [`RoomError::BackendRejected`] - the
    ///   create request failed; the session is back at `Idle`
    /// * [`RoomError::Engine`] - the engine join failed; the session is
    ///   rolled back to `Idle` and the backend room is released best-effort
    pub async fn create_room(&self, room_name: impl Into<String>) -> RoomResult<(Room, String)> {
        self.ensure_running().await?;
        let room_name = room_name.into();

        {
            let mut session = self.handler.session.write().await;
            match session.phase {
                RoomPhase::Idle | RoomPhase::Ended => {}
                phase => {
                    return Err(RoomError::invalid_state(format!(
                        "cannot create a room while {phase}"
                    )))
                }
            }
            session.reset();
            session.phase = RoomPhase::Creating;
        }
        self.handler.dedup.lock().await.clear();
        self.media_reset();

        let body = RequestBody::CreateRoom {
            room_name: room_name.clone(),
            host: self.config.local_user.clone(),
            seat_count: self.config.seat_count,
            enable_audience_apply: self.config.enable_audience_apply,
        };
        let ack = match self.send_request(body).await {
            Ok(ack) => ack,
            Err(err) => {
                self.set_phase(RoomPhase::Idle, "room creation failed").await;
                return Err(err);
            }
        };
        let payload: CreateRoomPayload = match decode_payload(&ack) {
            Ok(payload) => payload,
            Err(err) => {
                self.set_phase(RoomPhase::Idle, "room creation failed").await;
                return Err(err);
            }
        };

        let mut room = payload.room;
        room.host_id = self.config.local_user.user_id.clone();
        if room.status == RoomStatus::Created {
            room.status = RoomStatus::Living;
        }

        if let Err(err) = self
            .engine
            .join_room(
                &payload.rtc_token,
                &room.room_id,
                &self.config.local_user.user_id,
                true,
            )
            .await
        {
            tracing::warn!(%err, room_id = %room.room_id, "engine join failed; aborting creation");
            let release = self
                .send_request(RequestBody::DestroyRoom {
                    room_id: room.room_id.clone(),
                })
                .await;
            if let Err(release_err) = release {
                tracing::warn!(%release_err, "failed to release room after engine join failure");
            }
            self.set_phase(RoomPhase::Idle, "engine join failed").await;
            return Err(RoomError::engine(format!("engine join failed: {err}")));
        }

        // Host publishes from the start; failures here degrade, not abort
        if let Err(err) = self.engine.update_video_config(true).await {
            tracing::warn!(%err, "host video config update failed");
        }
        if let Err(err) = self.engine.enable_local_audio(true).await {
            tracing::warn!(%err, "host audio enable failed");
        }
        if let Err(err) = self.engine.enable_local_video(true).await {
            tracing::warn!(%err, "host video enable failed");
        }

        {
            let mut session = self.handler.session.write().await;
            let mut local = User::from_info(self.config.local_user.clone(), UserRole::Host);
            local.status = UserStatus::Active;
            local.mic = MediaSwitch::On;
            local.camera = MediaSwitch::On;
            session.room = Some(room.clone());
            session.seats = SeatList::new(self.config.seat_count);
            session.local = Some(local);
            session.rtc_token = Some(payload.rtc_token.clone());
        }
        self.set_phase(RoomPhase::Active(RoomRole::Host), "room created")
            .await;
        self.stats.lock().await.rooms_created += 1;

        tracing::info!(room_id = %room.room_id, name = %room_name, "created room as host");
        Ok((room, payload.rtc_token))
    }

    /// Join an existing room as audience
    ///
    /// Seeds seats and PK state from the response snapshot, then joins the
    /// media room with the returned token.
    ///
    /// # Errors
    ///
    /// * [`RoomError::RoomNotFound`] - no such room
    /// * [`RoomError::Transport`] / [`RoomError::BackendRejected`] - the
    ///   join request failed; the session is back at `Idle`
    /// * [`RoomError::Engine`] - the engine join failed; the backend join is
    ///   released best-effort and the session is rolled back to `Idle`
    pub async fn join_room(&self, room_id: impl Into<String>) -> RoomResult<JoinedRoom> {
        self.ensure_running().await?;
        let room_id = room_id.into();

        {
            let mut session = self.handler.session.write().await;
            match session.phase {
                RoomPhase::Idle | RoomPhase::Ended => {}
                phase => {
                    return Err(RoomError::invalid_state(format!(
                        "cannot join a room while {phase}"
                    )))
                }
            }
            session.reset();
            session.phase = RoomPhase::Joining;
        }
        self.handler.dedup.lock().await.clear();
        self.media_reset();

        let body = RequestBody::JoinRoom {
            room_id: room_id.clone(),
            user: self.config.local_user.clone(),
        };
        let ack = match self.send_request(body).await {
            Ok(ack) => ack,
            Err(RoomError::BackendRejected { code, .. }) if code == CODE_ROOM_NOT_FOUND => {
                self.set_phase(RoomPhase::Idle, "room not found").await;
                return Err(RoomError::RoomNotFound { room_id });
            }
            Err(err) => {
                self.set_phase(RoomPhase::Idle, "join failed").await;
                return Err(err);
            }
        };
        let payload: JoinRoomPayload = match decode_payload(&ack) {
            Ok(payload) => payload,
            Err(err) => {
                self.set_phase(RoomPhase::Idle, "join failed").await;
                return Err(err);
            }
        };

        if let Err(err) = self
            .engine
            .join_room(
                &payload.rtc_token,
                &room_id,
                &self.config.local_user.user_id,
                false,
            )
            .await
        {
            tracing::warn!(%err, %room_id, "engine join failed; aborting join");
            let release = self
                .send_request(RequestBody::LeaveRoom {
                    room_id: room_id.clone(),
                })
                .await;
            if let Err(release_err) = release {
                tracing::warn!(%release_err, "failed to release join after engine failure");
            }
            self.set_phase(RoomPhase::Idle, "engine join failed").await;
            return Err(RoomError::engine(format!("engine join failed: {err}")));
        }

        let host_id = payload.room.host_id.clone();
        let seats = {
            let mut seats = Vec::with_capacity(payload.seats.len());
            for snapshot in &payload.seats {
                let occupant = snapshot.occupant.as_ref().map(|occ| {
                    let role = if occ.user.user_id == host_id {
                        UserRole::Host
                    } else {
                        UserRole::Audience
                    };
                    let mut user = User::from_info(occ.user.clone(), role);
                    user.status = UserStatus::Active;
                    user.mic = occ.mic;
                    user.camera = occ.camera;
                    user
                });
                seats.push(Seat {
                    index: snapshot.index,
                    status: if occupant.is_some() {
                        SeatStatus::Open
                    } else {
                        SeatStatus::Closed
                    },
                    locked: snapshot.locked,
                    occupant,
                });
            }
            SeatList::from_snapshot(seats)
        };

        let joined = JoinedRoom {
            room: payload.room.clone(),
            host: payload.host.clone(),
            seats: seats.clone(),
            pk_anchors: payload.pk_anchors.clone(),
        };

        {
            let mut session = self.handler.session.write().await;
            session.room = Some(payload.room);
            session.seats = seats;
            session.local = Some(User::from_info(
                self.config.local_user.clone(),
                UserRole::Audience,
            ));
            session.rtc_token = Some(payload.rtc_token);
            session.pk = match payload.pk_anchors.into_iter().next() {
                Some(anchor) => PkState::Paired {
                    partner: PkPartner::new(anchor.room_id, anchor.user),
                },
                None => PkState::None,
            };
        }
        self.set_phase(RoomPhase::Active(RoomRole::Audience), "room joined")
            .await;
        self.stats.lock().await.rooms_joined += 1;

        tracing::info!(%room_id, "joined room as audience");
        Ok(joined)
    }

    /// Leave the current room.
    ///
    /// Engine resources are released first; a backend failure is logged and
    /// never blocks the local teardown. The local session must not get
    /// stuck "in a room" because a server call failed.
    pub async fn leave_room(&self) -> RoomResult<()> {
        self.ensure_running().await?;
        let (room_id, was_seated, was_paired) = {
            let session = self.handler.session.read().await;
            session.require_active()?;
            (
                session.room_id().unwrap_or_default().to_string(),
                session.is_seated(&self.config.local_user.user_id),
                session.pk.is_paired(),
            )
        };

        self.teardown_engine(was_seated, was_paired).await;

        if let Err(err) = self
            .send_request(RequestBody::LeaveRoom {
                room_id: room_id.clone(),
            })
            .await
        {
            tracing::warn!(%err, %room_id, "leave request failed; proceeding with local teardown");
        }

        self.finish_local_session(&room_id, "left").await;
        tracing::info!(%room_id, "left room");
        Ok(())
    }

    /// End the room (host only).
    ///
    /// Same fail-open teardown as [`Self::leave_room`], but destroys the
    /// room on the backend so the audience is dismissed.
    pub async fn finish_live(&self) -> RoomResult<()> {
        self.ensure_running().await?;
        let (room_id, was_paired) = {
            let session = self.handler.session.read().await;
            session.require_host()?;
            (
                session.room_id().unwrap_or_default().to_string(),
                session.pk.is_paired(),
            )
        };

        self.teardown_engine(true, was_paired).await;

        if let Err(err) = self
            .send_request(RequestBody::DestroyRoom {
                room_id: room_id.clone(),
            })
            .await
        {
            tracing::warn!(%err, %room_id, "destroy request failed; proceeding with local teardown");
        }

        self.finish_local_session(&room_id, "finished").await;
        tracing::info!(%room_id, "finished live");
        Ok(())
    }

    /// Page through the live room list.
    ///
    /// Read-only; transport errors surface directly. Callers who want
    /// retries wrap this in [`super::recovery::retry_with_backoff`].
    pub async fn fetch_room_list(&self, cursor: u32, count: u32) -> RoomResult<RoomListPayload> {
        self.ensure_running().await?;
        let ack = self
            .send_request(RequestBody::FetchRoomList { cursor, count })
            .await?;
        decode_payload(&ack)
    }

    /// List the audience of the current room. Read-only, like
    /// [`Self::fetch_room_list`].
    pub async fn fetch_audience_list(&self) -> RoomResult<Vec<UserInfo>> {
        self.ensure_running().await?;
        let room_id = {
            let session = self.handler.session.read().await;
            session.require_active()?;
            session.room_id().unwrap_or_default().to_string()
        };
        let ack = self
            .send_request(RequestBody::FetchAudienceList { room_id })
            .await?;
        let payload: AudienceListPayload = decode_payload(&ack)?;
        Ok(payload.users)
    }

    /// Release engine resources in teardown order: publishing, forwarded
    /// stream, then the media room itself. Every failure is logged only.
    async fn teardown_engine(&self, was_publishing: bool, was_paired: bool) {
        if was_publishing {
            if let Err(err) = self.engine.enable_local_audio(false).await {
                tracing::warn!(%err, "audio release failed during teardown");
            }
            if let Err(err) = self.engine.enable_local_video(false).await {
                tracing::warn!(%err, "video release failed during teardown");
            }
        }
        if was_paired {
            if let Err(err) = self.engine.stop_forward_stream().await {
                tracing::warn!(%err, "forward stream release failed during teardown");
            }
        }
        if let Err(err) = self.engine.leave_room().await {
            tracing::warn!(%err, "engine leave failed during teardown");
        }
    }

    /// Reset local state to `Ended` and publish the end of the session
    async fn finish_local_session(&self, room_id: &str, reason: &str) {
        {
            let mut session = self.handler.session.write().await;
            session.reset();
            session.phase = RoomPhase::Ended;
        }
        self.handler.dedup.lock().await.clear();
        self.media_reset();
        self.handler
            .emit(RoomEvent::RoomEnded {
                info: RoomEndedInfo {
                    room_id: room_id.to_string(),
                    reason: reason.to_string(),
                    timestamp: Utc::now(),
                },
                priority: EventPriority::High,
            })
            .await;
        self.handler
            .emit(RoomEvent::RoomPhaseChanged {
                info: RoomPhaseInfo {
                    new_phase: RoomPhase::Ended,
                    previous_phase: None,
                    reason: Some(reason.to_string()),
                    timestamp: Utc::now(),
                },
                priority: EventPriority::High,
            })
            .await;
    }
}
