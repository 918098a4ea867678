//! Room-level controls and chat
//!
//! Host toggles (presentation mode, the audience-apply switch) and the
//! chat passthrough. Each maps one-to-one onto a signaling request; on ack
//! the flag flips optimistically and the confirming notification is a
//! no-op for the reconciler.

use chrono::Utc;

use crate::error::{RoomError, RoomResult};
use crate::events::{ApplySwitchInfo, EventPriority, RoomEvent, RoomModeInfo};
use crate::room::{ChatRoomMode, RoomStatus};
use crate::signaling::RequestBody;

/// Room control operations for RoomManager
impl super::manager::RoomManager {
    /// Toggle the co-host/chat-room presentation mode (host only)
    pub async fn switch_room_mode(&self, mode: ChatRoomMode) -> RoomResult<()> {
        self.ensure_running().await?;
        let room_id = {
            let session = self.handler.session.read().await;
            let room = session.require_host()?;
            if room.mode == mode {
                return Ok(());
            }
            room.room_id.clone()
        };

        self.send_request(RequestBody::SwitchRoomMode { room_id, mode })
            .await?;

        {
            let mut session = self.handler.session.write().await;
            if let Some(room) = session.room.as_mut() {
                room.mode = mode;
                room.status = match mode {
                    ChatRoomMode::MakeCoHost => RoomStatus::MadeCoHost,
                    ChatRoomMode::ChatRoom => RoomStatus::MadeGuest,
                };
            }
        }
        self.handler
            .emit(RoomEvent::RoomModeChanged {
                info: RoomModeInfo {
                    mode,
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;
        tracing::info!(%mode, "switched room mode");
        Ok(())
    }

    /// Flip whether the audience may apply for seats (host only)
    pub async fn set_audience_apply_enabled(&self, enabled: bool) -> RoomResult<()> {
        self.ensure_running().await?;
        let room_id = {
            let session = self.handler.session.read().await;
            let room = session.require_host()?;
            if room.enable_audience_apply == enabled {
                return Ok(());
            }
            room.room_id.clone()
        };

        self.send_request(RequestBody::SetAudienceApplyEnabled { room_id, enabled })
            .await?;

        {
            let mut session = self.handler.session.write().await;
            if let Some(room) = session.room.as_mut() {
                room.enable_audience_apply = enabled;
            }
        }
        self.handler
            .emit(RoomEvent::AudienceApplySwitchChanged {
                info: ApplySwitchInfo {
                    enabled,
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;
        tracing::info!(enabled, "audience apply switch changed");
        Ok(())
    }

    /// Send an in-room chat message.
    ///
    /// The sender does not receive their own line back as a notification;
    /// local rendering is the shell's concern.
    pub async fn send_chat_message(&self, text: impl Into<String>) -> RoomResult<()> {
        self.ensure_running().await?;
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RoomError::precondition("chat message must not be empty"));
        }
        let room_id = {
            let session = self.handler.session.read().await;
            session.require_active()?;
            session.room_id().unwrap_or_default().to_string()
        };
        self.send_request(RequestBody::SendChatMessage { room_id, text })
            .await?;
        Ok(())
    }
}
