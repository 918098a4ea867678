//! PK battle operations
//!
//! The invite/reply/stop flow between two hosts. Both sides drive their own
//! engine independently: the inviter starts forwarding when the accepting
//! reply arrives, the acceptor when its accepting reply is acked. A stop
//! from either side reaches the other as an `AnchorPkEnded` notification.
//!
//! Every invite is identified by a locally generated id. An invite left
//! unanswered past the configured window resolves to a timeout rejection
//! exactly once, and a late accept that still names the dead id is dropped
//! as stale by the reconciler.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{RoomError, RoomResult};
use crate::events::{EventPriority, PkEventInfo, PkTransition, RoomEvent};
use crate::pk::{PkPartner, PkState};
use crate::signaling::{decode_payload, PkReplyPayload, RequestBody};
use crate::user::{PkAnchorMic, UserInfo};

/// PK operations for RoomManager
impl super::manager::RoomManager {
    /// Invite another room's anchor to a PK battle (host only).
    ///
    /// On ack the PK sub-state is `Inviting` and the invite window is
    /// armed. The battle starts when the remote accept arrives; rejection,
    /// timeout, or a stale reply leave the sub-state at `None`.
    ///
    /// # Arguments
    ///
    /// * `target_room_id` - The remote anchor's room
    /// * `target_user` - The remote anchor
    /// * `seat_index` - Which local slot presents the battle
    ///
    /// # Errors
    ///
    /// * [`RoomError::InvalidState`] - not hosting
    /// * [`RoomError::Precondition`] - a pairing or invite is already in
    ///   progress
    pub async fn request_pk_invite(
        &self,
        target_room_id: &str,
        target_user: UserInfo,
        seat_index: u8,
    ) -> RoomResult<Uuid> {
        self.ensure_running().await?;
        let room_id = {
            let session = self.handler.session.read().await;
            let room = session.require_host()?;
            if !matches!(session.pk, PkState::None) {
                return Err(RoomError::precondition(format!(
                    "a PK pairing is already {}",
                    session.pk
                )));
            }
            room.room_id.clone()
        };

        let invite_id = Uuid::new_v4();
        self.send_request(RequestBody::PkInvite {
            invite_id,
            room_id,
            target_room_id: target_room_id.to_string(),
            target_user_id: target_user.user_id.clone(),
            seat_index,
        })
        .await?;

        let target = PkPartner::new(target_room_id, target_user);
        {
            let mut session = self.handler.session.write().await;
            session.active_end_pk = false;
            session.pk = PkState::Inviting {
                invite_id,
                target: target.clone(),
            };
        }
        self.handler.schedule_pk_timeout(invite_id);
        self.stats.lock().await.pk_invites_sent += 1;

        self.handler
            .emit(RoomEvent::PkChanged {
                info: PkEventInfo {
                    transition: PkTransition::InviteSent,
                    partner: Some(target),
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;
        tracing::info!(%invite_id, target_room_id, "sent PK invite");
        Ok(invite_id)
    }

    /// Answer a pending PK invite (host only).
    ///
    /// Accepting receives the forwarding token in the ack and starts the
    /// forwarded stream immediately; the inviter does the same when the
    /// accept notification reaches it, so both sides come up independently.
    ///
    /// # Errors
    ///
    /// * [`RoomError::Precondition`] - no invite is pending
    /// * [`RoomError::Engine`] - forwarding failed to start; the pairing is
    ///   abandoned and the remote side is told to stop
    pub async fn reply_pk_invite(&self, agree: bool) -> RoomResult<()> {
        self.ensure_running().await?;
        let (room_id, invite_id, from) = {
            let session = self.handler.session.read().await;
            session.require_host()?;
            match &session.pk {
                PkState::Invited { invite_id, from } => {
                    (
                        session.room_id().unwrap_or_default().to_string(),
                        *invite_id,
                        from.clone(),
                    )
                }
                _ => return Err(RoomError::precondition("no PK invite is pending")),
            }
        };

        let ack = self
            .send_request(RequestBody::PkReply {
                invite_id,
                room_id: room_id.clone(),
                target_room_id: from.room_id.clone(),
                agree,
            })
            .await?;

        if !agree {
            {
                let mut session = self.handler.session.write().await;
                if session.pk.pending_invite_id() == Some(invite_id) {
                    session.pk = PkState::None;
                }
            }
            self.handler
                .emit(RoomEvent::PkChanged {
                    info: PkEventInfo {
                        transition: PkTransition::Resolved(crate::pk::PkReply::Reject),
                        partner: Some(from),
                        timestamp: Utc::now(),
                    },
                    priority: EventPriority::Normal,
                })
                .await;
            tracing::info!(%invite_id, "rejected PK invite");
            return Ok(());
        }

        let payload: PkReplyPayload = decode_payload(&ack)?;
        if let Err(err) = self
            .engine
            .start_forward_stream(&from.room_id, &payload.pk_token)
            .await
        {
            tracing::warn!(%err, "forward stream failed after accepting PK invite");
            {
                let mut session = self.handler.session.write().await;
                session.pk = PkState::None;
            }
            let stop = self
                .send_request(RequestBody::PkStop { room_id })
                .await;
            if let Err(stop_err) = stop {
                tracing::warn!(%stop_err, "failed to notify PK stop after engine failure");
            }
            return Err(RoomError::engine(format!(
                "failed to start forwarded stream: {err}"
            )));
        }

        let partner = {
            let mut session = self.handler.session.write().await;
            let mut partner = from;
            partner.token = Some(payload.pk_token);
            session.pk = PkState::Paired {
                partner: partner.clone(),
            };
            partner
        };
        self.stats.lock().await.pk_battles_started += 1;

        self.handler
            .emit(RoomEvent::PkChanged {
                info: PkEventInfo {
                    transition: PkTransition::Paired,
                    partner: Some(partner),
                    timestamp: Utc::now(),
                },
                priority: EventPriority::High,
            })
            .await;
        tracing::info!(%invite_id, "accepted PK invite; forwarding started");
        Ok(())
    }

    /// End the current PK battle (either paired anchor may call this).
    ///
    /// The forwarded stream is released and the sub-state reaches `None`
    /// locally regardless of backend reachability; the stop request informs
    /// the remote side, whose reconciler tears its half down independently.
    pub async fn request_stop_pk(&self) -> RoomResult<()> {
        self.ensure_running().await?;
        let (room_id, partner) = {
            let mut session = self.handler.session.write().await;
            let partner = match &session.pk {
                PkState::Paired { partner } => partner.clone(),
                other => {
                    return Err(RoomError::precondition(format!(
                        "no PK battle to stop (state {other})"
                    )))
                }
            };
            session.pk = PkState::Ending;
            // Set before the request so the backend echo is recognized even
            // when it races the ack
            session.active_end_pk = true;
            (session.room_id().unwrap_or_default().to_string(), partner)
        };

        if let Err(err) = self.engine.stop_forward_stream().await {
            tracing::warn!(%err, "forward stream release failed during PK stop");
        }

        if let Err(err) = self
            .send_request(RequestBody::PkStop { room_id })
            .await
        {
            tracing::warn!(%err, "PK stop request failed; local teardown proceeds");
        }

        {
            let mut session = self.handler.session.write().await;
            // Only move Ending to None; if the backend echo already landed
            // it has done both and consumed the echo flag
            if matches!(session.pk, PkState::Ending) {
                session.pk = PkState::None;
            }
        }
        self.handler
            .emit(RoomEvent::PkChanged {
                info: PkEventInfo {
                    transition: PkTransition::Ended { by_remote: false },
                    partner: Some(partner),
                    timestamp: Utc::now(),
                },
                priority: EventPriority::High,
            })
            .await;
        tracing::info!("stopped PK battle");
        Ok(())
    }

    /// Mute or unmute the PK partner's forwarded audio locally
    pub async fn mute_pk_anchor(&self, muted: bool) -> RoomResult<()> {
        self.ensure_running().await?;
        let partner_id = {
            let session = self.handler.session.read().await;
            session
                .pk
                .partner()
                .map(|p| p.user.user_id.clone())
                .ok_or_else(|| RoomError::precondition("no PK battle is active"))?
        };

        self.engine
            .mute_remote_anchor(&partner_id, muted)
            .await
            .map_err(|err| RoomError::engine(format!("partner mute failed: {err}")))?;

        let partner = {
            let mut session = self.handler.session.write().await;
            match &mut session.pk {
                PkState::Paired { partner } => {
                    partner.mic = if muted {
                        PkAnchorMic::Muted
                    } else {
                        PkAnchorMic::Unmuted
                    };
                    Some(partner.clone())
                }
                _ => None,
            }
        };

        self.handler
            .emit(RoomEvent::PkChanged {
                info: PkEventInfo {
                    transition: PkTransition::PartnerMuteChanged { muted },
                    partner,
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;
        tracing::info!(muted, "changed PK partner mute");
        Ok(())
    }
}
