//! Media status operations and transient statistics
//!
//! The mic/camera switches are room state and go through the signaling
//! service; volume, speaking, and network quality are engine telemetry and
//! do not. The telemetry lives in a concurrent map outside the session
//! lock because it changes many times per second and nothing reconciles
//! it; the last value always wins.

use chrono::Utc;

use crate::engine::NetworkQuality;
use crate::error::{RoomError, RoomResult};
use crate::events::{EventPriority, MediaStatusInfo, RoomEvent, SeatChangeInfo};
use crate::signaling::RequestBody;
use crate::user::MediaSwitch;

/// Transient per-user media statistics
#[derive(Debug, Clone, Default)]
pub struct MediaStats {
    /// Most recent reported volume, 0..=255
    pub volume: u32,
    /// Whether the last report was above the speaking threshold
    pub is_speaking: bool,
    /// Most recent link quality bucket
    pub quality: NetworkQuality,
}

/// Media operations for RoomManager
impl super::manager::RoomManager {
    /// Update the local mic/camera switches.
    ///
    /// The engine is driven and local state updated first; the outbound
    /// notification to the room follows. A failing request surfaces as an
    /// error but does not roll the local switches back, because they
    /// describe local capture, which did change. The backend's self-echo of
    /// this change is recognized by the reconciler and applied as a no-op.
    ///
    /// # Errors
    ///
    /// * [`RoomError::InvalidState`] - not in a room
    /// * [`RoomError::Precondition`] - audience member not on a seat
    pub async fn update_media_status(
        &self,
        mic: MediaSwitch,
        camera: MediaSwitch,
    ) -> RoomResult<()> {
        self.ensure_running().await?;
        let local_id = self.config.local_user.user_id.clone();
        let room_id = {
            let session = self.handler.session.read().await;
            let role = session.require_active()?;
            if role == crate::room::RoomRole::Audience && !session.is_seated(&local_id) {
                return Err(RoomError::precondition(
                    "take a seat before publishing media",
                ));
            }
            session.room_id().unwrap_or_default().to_string()
        };

        if let Err(err) = self.engine.mute_local_audio(!mic.is_on()).await {
            return Err(RoomError::engine(format!("audio switch failed: {err}")));
        }
        if let Err(err) = self.engine.mute_local_video(!camera.is_on()).await {
            return Err(RoomError::engine(format!("video switch failed: {err}")));
        }

        let seat_snapshot = {
            let mut session = self.handler.session.write().await;
            if let Some(local) = session.local.as_mut() {
                local.mic = mic;
                local.camera = camera;
            }
            if let Some(occupant) = session.seats.occupant_mut(&local_id) {
                occupant.mic = mic;
                occupant.camera = camera;
            }
            session
                .seats
                .seat_of(&local_id)
                .and_then(|index| session.seats.get(index).cloned())
        };

        self.handler
            .emit(RoomEvent::MediaStatusChanged {
                info: MediaStatusInfo {
                    user_id: local_id,
                    mic,
                    camera,
                    timestamp: Utc::now(),
                },
                priority: EventPriority::Normal,
            })
            .await;
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

        self.send_request(RequestBody::UpdateMediaStatus { room_id, mic, camera })
            .await?;
        tracing::info!(%mic, %camera, "updated media status");
        Ok(())
    }

    /// Toggle between front and back camera. Engine-local; the room is not
    /// notified because the published stream does not change shape.
    pub async fn switch_camera(&self) -> RoomResult<()> {
        self.ensure_running().await?;
        {
            let session = self.handler.session.read().await;
            session.require_active()?;
        }
        self.engine
            .switch_camera()
            .await
            .map_err(|err| RoomError::engine(format!("camera switch failed: {err}")))
    }

    /// Most recent engine telemetry for a user, if any has arrived
    pub async fn media_stats(&self, user_id: &str) -> Option<MediaStats> {
        self.handler
            .media_stats
            .get(user_id)
            .map(|entry| entry.value().clone())
    }

    /// Drop all transient telemetry, e.g. between rooms
    pub(crate) fn media_reset(&self) {
        self.handler.media_stats.clear();
    }
}
