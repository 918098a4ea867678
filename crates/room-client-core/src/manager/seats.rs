//! Seat operations
//!
//! Everything that moves users on and off the seat grid: the audience-side
//! apply/reply flow, the host-side invite/approve/manage flow, and leaving
//! a seat.
//!
//! Optimistic mutation occurs only after the local ack of a request, never
//! speculatively before the round trip; this keeps the local grid from
//! diverging from the host's authoritative seat state. The confirming
//! notification that follows an ack is recognized as an echo by the
//! reconciler and applied as a no-op.

use chrono::Utc;

use crate::error::{RoomError, RoomResult};
use crate::events::{EventPriority, RoomEvent, SeatChangeInfo};
use crate::room::RoomRole;
use crate::seat::SeatAction;
use crate::signaling::RequestBody;
use crate::user::{MediaSwitch, UserStatus};

/// Result of an audience seat application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatApplyOutcome {
    /// False when the room has audience applications disabled; the host
    /// must invite instead and no request was sent
    pub needs_apply: bool,
}

/// Seat operations for RoomManager
impl super::manager::RoomManager {
    /// Apply for a seat as audience.
    ///
    /// If the room has `enable_audience_apply` off this returns immediately
    /// with `needs_apply == false` and sends nothing; the host must invite
    /// instead. Otherwise the application is sent and the host's manager
    /// surfaces it as a `SeatApplyReceived` event for approval.
    ///
    /// # Errors
    ///
    /// * [`RoomError::InvalidState`] - not in a room as audience
    /// * [`RoomError::Precondition`] - unknown, occupied, or locked seat,
    ///   or already seated
    pub async fn apply_for_seat(&self, seat_index: u8) -> RoomResult<SeatApplyOutcome> {
        self.ensure_running().await?;
        let room_id = {
            let session = self.handler.session.read().await;
            if session.require_active()? != RoomRole::Audience {
                return Err(RoomError::invalid_state("the host does not apply for seats"));
            }
            if session.is_seated(&self.config.local_user.user_id) {
                return Err(RoomError::precondition("already on a seat"));
            }
            let seat = session
                .seats
                .get(seat_index)
                .ok_or_else(|| RoomError::precondition(format!("no seat with index {seat_index}")))?;
            if !seat.is_available() {
                return Err(RoomError::precondition(format!(
                    "seat {seat_index} is not available"
                )));
            }
            let room = session
                .room
                .as_ref()
                .ok_or_else(|| RoomError::internal("active session without a room"))?;
            if !room.enable_audience_apply {
                return Ok(SeatApplyOutcome { needs_apply: false });
            }
            room.room_id.clone()
        };

        self.send_request(RequestBody::ApplyForSeat { room_id, seat_index })
            .await?;

        {
            let mut session = self.handler.session.write().await;
            if let Some(local) = session.local.as_mut() {
                local.status = UserStatus::Applied;
            }
        }
        tracing::info!(seat_index, "applied for seat");
        Ok(SeatApplyOutcome { needs_apply: true })
    }

    /// Withdraw a pending seat application
    pub async fn cancel_seat_apply(&self) -> RoomResult<()> {
        self.ensure_running().await?;
        let room_id = {
            let session = self.handler.session.read().await;
            session.require_active()?;
            let applied = session
                .local
                .as_ref()
                .map(|l| l.status == UserStatus::Applied)
                .unwrap_or(false);
            if !applied {
                return Err(RoomError::precondition("no application is pending"));
            }
            session.room_id().unwrap_or_default().to_string()
        };

        self.send_request(RequestBody::CancelSeatApply { room_id })
            .await?;

        {
            let mut session = self.handler.session.write().await;
            if let Some(local) = session.local.as_mut() {
                local.status = UserStatus::Default;
            }
        }
        tracing::info!("seat application withdrawn");
        Ok(())
    }

    /// Answer a pending seat invite from the host.
    ///
    /// Accepting does not seat this client locally; the backend confirms
    /// with a seat change notification that the reconciler applies.
    pub async fn reply_seat_invite(&self, agree: bool) -> RoomResult<()> {
        self.ensure_running().await?;
        let (room_id, seat_index) = {
            let session = self.handler.session.read().await;
            session.require_active()?;
            let seat_index = session
                .pending_invite
                .ok_or_else(|| RoomError::precondition("no seat invite is pending"))?;
            (session.room_id().unwrap_or_default().to_string(), seat_index)
        };

        self.send_request(RequestBody::ReplySeatInvite {
            room_id,
            seat_index,
            agree,
        })
        .await?;

        {
            let mut session = self.handler.session.write().await;
            session.pending_invite = None;
            if !agree {
                if let Some(local) = session.local.as_mut() {
                    local.status = UserStatus::Default;
                }
            }
        }
        tracing::info!(seat_index, agree, "replied to seat invite");
        Ok(())
    }

    /// Invite an audience member onto a seat (host only)
    ///
    /// # Errors
    ///
    /// * [`RoomError::InvalidState`] - not hosting
    /// * [`RoomError::Precondition`] - unknown user, unavailable seat, or
    ///   the user already holds a seat
    pub async fn invite_to_seat(&self, user_id: &str, seat_index: u8) -> RoomResult<()> {
        self.ensure_running().await?;
        let room_id = {
            let session = self.handler.session.read().await;
            let room = session.require_host()?;
            let seat = session
                .seats
                .get(seat_index)
                .ok_or_else(|| RoomError::precondition(format!("no seat with index {seat_index}")))?;
            if !seat.is_available() {
                return Err(RoomError::precondition(format!(
                    "seat {seat_index} is not available"
                )));
            }
            if session.is_seated(user_id) {
                return Err(RoomError::precondition(format!(
                    "user {user_id} already holds a seat"
                )));
            }
            if !session.audience.contains_key(user_id) {
                return Err(RoomError::precondition(format!(
                    "user {user_id} is not in the audience"
                )));
            }
            room.room_id.clone()
        };

        self.send_request(RequestBody::InviteToSeat {
            room_id,
            user_id: user_id.to_string(),
            seat_index,
        })
        .await?;

        {
            let mut session = self.handler.session.write().await;
            if let Some(user) = session.audience.get_mut(user_id) {
                user.status = UserStatus::Invited;
            }
        }
        tracing::info!(user_id, seat_index, "invited user to seat");
        Ok(())
    }

    /// Approve a pending seat application (host only).
    ///
    /// On ack the applicant is seated optimistically on this side; the
    /// backend's confirming notification reaches both sides and is a no-op
    /// here.
    pub async fn agree_seat_apply(&self, user_id: &str) -> RoomResult<()> {
        self.ensure_running().await?;
        let (room_id, applicant, seat_index) = {
            let session = self.handler.session.read().await;
            let room = session.require_host()?;
            let (applicant, seat_index) = session
                .pending_applies
                .get(user_id)
                .cloned()
                .ok_or_else(|| {
                    RoomError::precondition(format!("user {user_id} has no pending application"))
                })?;
            let seat = session
                .seats
                .get(seat_index)
                .ok_or_else(|| RoomError::precondition(format!("no seat with index {seat_index}")))?;
            if !seat.is_available() {
                return Err(RoomError::precondition(format!(
                    "seat {seat_index} is no longer available"
                )));
            }
            (room.room_id.clone(), applicant, seat_index)
        };

        self.send_request(RequestBody::AgreeSeatApply {
            room_id,
            user_id: user_id.to_string(),
        })
        .await?;

        let seat_snapshot = {
            let mut session = self.handler.session.write().await;
            session.pending_applies.remove(user_id);
            let mut user = session
                .audience
                .remove(user_id)
                .unwrap_or_else(|| {
                    crate::user::User::from_info(applicant, crate::user::UserRole::Audience)
                });
            user.status = UserStatus::Active;
            user.mic = MediaSwitch::On;
            user.camera = MediaSwitch::On;
            match session.seats.occupy(seat_index, user) {
                Ok(_) => session.seats.get(seat_index).cloned(),
                Err(err) => {
                    tracing::warn!(%err, seat_index, "optimistic seating failed; awaiting notification");
                    None
                }
            }
        };
        if let Some(seat) = seat_snapshot {
            self.handler
                .emit(RoomEvent::SeatChanged {
                    info: SeatChangeInfo {
                        seat,
                        timestamp: Utc::now(),
                    },
                    priority: EventPriority::Normal,
                })
                .await;
        }
        tracing::info!(user_id, seat_index, "approved seat application");
        Ok(())
    }

    /// Decline a pending seat application (host only)
    pub async fn reject_seat_apply(&self, user_id: &str) -> RoomResult<()> {
        self.ensure_running().await?;
        let room_id = {
            let session = self.handler.session.read().await;
            let room = session.require_host()?;
            if !session.pending_applies.contains_key(user_id) {
                return Err(RoomError::precondition(format!(
                    "user {user_id} has no pending application"
                )));
            }
            room.room_id.clone()
        };

        self.send_request(RequestBody::RejectSeatApply {
            room_id,
            user_id: user_id.to_string(),
        })
        .await?;

        {
            let mut session = self.handler.session.write().await;
            session.pending_applies.remove(user_id);
            if let Some(user) = session.audience.get_mut(user_id) {
                user.status = UserStatus::Default;
            }
        }
        self.handler
            .emit(RoomEvent::SeatApplyCancelled {
                user_id: user_id.to_string(),
                priority: EventPriority::Normal,
            })
            .await;
        tracing::info!(user_id, "rejected seat application");
        Ok(())
    }

    /// Kick, lock, unlock, mute, or unmute one seat (host only).
    ///
    /// Maps one-to-one onto a signaling request; on ack the change is
    /// applied optimistically and the later confirming notification is a
    /// no-op.
    pub async fn manage_seat(&self, seat_index: u8, action: SeatAction) -> RoomResult<()> {
        self.ensure_running().await?;
        let room_id = {
            let session = self.handler.session.read().await;
            let room = session.require_host()?;
            let seat = session
                .seats
                .get(seat_index)
                .ok_or_else(|| RoomError::precondition(format!("no seat with index {seat_index}")))?;
            match action {
                SeatAction::Kick | SeatAction::Mute | SeatAction::Unmute => {
                    if seat.occupant.is_none() {
                        return Err(RoomError::precondition(format!(
                            "seat {seat_index} has no occupant"
                        )));
                    }
                }
                SeatAction::Lock => {
                    if seat.occupant.is_some() {
                        return Err(RoomError::precondition(format!(
                            "seat {seat_index} is occupied and cannot be locked"
                        )));
                    }
                    if seat.locked {
                        return Err(RoomError::precondition(format!(
                            "seat {seat_index} is already locked"
                        )));
                    }
                }
                SeatAction::Unlock => {
                    if !seat.locked {
                        return Err(RoomError::precondition(format!(
                            "seat {seat_index} is not locked"
                        )));
                    }
                }
            }
            room.room_id.clone()
        };

        self.send_request(RequestBody::ManageSeat {
            room_id,
            seat_index,
            action,
        })
        .await?;

        let seat_snapshot = {
            let mut session = self.handler.session.write().await;
            let applied = match action {
                SeatAction::Kick => {
                    if let Some(mut user) = session.seats.vacate(seat_index) {
                        user.status = UserStatus::Default;
                        session.audience.insert(user.id().to_string(), user);
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                }
                SeatAction::Lock => session.seats.set_locked(seat_index, true),
                SeatAction::Unlock => session.seats.set_locked(seat_index, false),
                SeatAction::Mute => session.seats.set_occupant_mic(seat_index, MediaSwitch::Off),
                SeatAction::Unmute => session.seats.set_occupant_mic(seat_index, MediaSwitch::On),
            };
            match applied {
                Ok(true) => session.seats.get(seat_index).cloned(),
                Ok(false) => None,
                Err(err) => {
                    tracing::warn!(%err, seat_index, %action, "optimistic seat change failed");
                    None
                }
            }
        };
        if let Some(seat) = seat_snapshot {
            self.handler
                .emit(RoomEvent::SeatChanged {
                    info: SeatChangeInfo {
                        seat,
                        timestamp: Utc::now(),
                    },
                    priority: EventPriority::Normal,
                })
                .await;
        }
        tracing::info!(seat_index, %action, "managed seat");
        Ok(())
    }

    /// Step down from the own seat.
    ///
    /// Local publishing stops and the seat is vacated locally before the
    /// backend is told; a failing request is logged and never re-seats us.
    pub async fn leave_seat(&self) -> RoomResult<()> {
        self.ensure_running().await?;
        let (room_id, seat_index) = {
            let session = self.handler.session.read().await;
            session.require_active()?;
            let seat_index = session
                .seats
                .seat_of(&self.config.local_user.user_id)
                .ok_or_else(|| RoomError::precondition("not on a seat"))?;
            (session.room_id().unwrap_or_default().to_string(), seat_index)
        };

        if let Err(err) = self.engine.enable_local_audio(false).await {
            tracing::warn!(%err, "audio release failed while leaving seat");
        }
        if let Err(err) = self.engine.enable_local_video(false).await {
            tracing::warn!(%err, "video release failed while leaving seat");
        }

        let seat_snapshot = {
            let mut session = self.handler.session.write().await;
            session.seats.vacate(seat_index);
            if let Some(local) = session.local.as_mut() {
                local.status = UserStatus::Default;
                local.mic = MediaSwitch::Off;
                local.camera = MediaSwitch::Off;
            }
            session.seats.get(seat_index).cloned()
        };

        if let Err(err) = self
            .send_request(RequestBody::LeaveSeat { room_id, seat_index })
            .await
        {
            tracing::warn!(%err, seat_index, "leave-seat request failed; local state already cleared");
        }

        if let Some(seat) = seat_snapshot {
            self.handler
                .emit(RoomEvent::SeatChanged {
                    info: SeatChangeInfo {
                        seat,
                        timestamp: Utc::now(),
                    },
                    priority: EventPriority::Normal,
                })
                .await;
        }
        tracing::info!(seat_index, "left seat");
        Ok(())
    }
}
