//! Event fan-out for the room coordination layer
//!
//! Presentation components never poll the manager; they observe it. Every
//! state transition the manager applies is published as a [`RoomEvent`],
//! both through a broadcast channel and to any registered
//! [`RoomEventHandler`]. Handlers hold no business state of their own; they
//! render projections and forward user intents back as manager operations.
//!
//! # Event Types
//!
//! - **Session events** - phase changes, room end, kicks, connectivity
//! - **Seat events** - occupancy and lock changes, applications, invites
//! - **Media events** - mic/camera switches, volume and quality reports
//! - **PK events** - invites, replies, pairing, teardown
//! - **Chat events** - in-room chat lines
//!
//! # Usage Examples
//!
//! ```rust
//! use liveroom_client_core::events::{RoomEventHandler, RoomPhaseInfo, SeatChangeInfo, PkEventInfo};
//! use async_trait::async_trait;
//!
//! struct LoggingHandler;
//!
//! #[async_trait]
//! impl RoomEventHandler for LoggingHandler {
//!     async fn on_room_phase_changed(&self, info: RoomPhaseInfo) {
//!         println!("phase: {}", info.new_phase);
//!     }
//!
//!     async fn on_seat_changed(&self, info: SeatChangeInfo) {
//!         println!("seat {} changed", info.seat.index);
//!     }
//!
//!     async fn on_pk_event(&self, info: PkEventInfo) {
//!         println!("pk: {:?}", info.transition);
//!     }
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::engine::NetworkQuality;
use crate::error::RoomError;
use crate::pk::{PkPartner, PkReply};
use crate::room::{ChatRoomMode, RoomPhase};
use crate::seat::Seat;
use crate::user::{MediaSwitch, UserInfo};

/// Event priority levels for filtering and handling
///
/// # Examples
///
/// ```rust
/// use liveroom_client_core::events::EventPriority;
///
/// assert!(EventPriority::Critical > EventPriority::High);
/// assert!(EventPriority::Normal > EventPriority::Low);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// Routine telemetry (volume reports, quality buckets)
    Low,
    /// Ordinary state changes (seats, media switches, chat)
    Normal,
    /// Things the user must react to (applications, invites, kicks)
    High,
    /// Failures and forced teardowns
    Critical,
}

// ===== EVENT INFO STRUCTS =====

/// Details of a session phase transition
#[derive(Debug, Clone)]
pub struct RoomPhaseInfo {
    /// Phase after the transition
    pub new_phase: RoomPhase,
    /// Phase before the transition, when known
    pub previous_phase: Option<RoomPhase>,
    /// Why the transition happened
    pub reason: Option<String>,
    /// When the transition was applied locally
    pub timestamp: DateTime<Utc>,
}

/// A seat after a change was applied to it
#[derive(Debug, Clone)]
pub struct SeatChangeInfo {
    /// Snapshot of the seat after the change
    pub seat: Seat,
    /// When the change was applied locally
    pub timestamp: DateTime<Utc>,
}

/// A viewer entering the room
#[derive(Debug, Clone)]
pub struct AudienceJoinedInfo {
    pub user: UserInfo,
    /// Headcount after the join
    pub audience_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// A viewer leaving the room
#[derive(Debug, Clone)]
pub struct AudienceExitedInfo {
    pub user_id: String,
    /// Headcount after the exit
    pub audience_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// A seat application as seen by the host
#[derive(Debug, Clone)]
pub struct SeatApplyInfo {
    /// Who applied
    pub user: UserInfo,
    /// The seat they asked for
    pub seat_index: u8,
    pub timestamp: DateTime<Utc>,
}

/// A seat invite as seen by the invited audience member
#[derive(Debug, Clone)]
pub struct SeatInviteInfo {
    /// The seat offered
    pub seat_index: u8,
    /// The inviting host
    pub host: UserInfo,
    pub timestamp: DateTime<Utc>,
}

/// A user's published media switches after a change
#[derive(Debug, Clone)]
pub struct MediaStatusInfo {
    pub user_id: String,
    pub mic: MediaSwitch,
    pub camera: MediaSwitch,
    pub timestamp: DateTime<Utc>,
}

/// What happened to the PK sub-state
#[derive(Debug, Clone, PartialEq)]
pub enum PkTransition {
    /// We sent an invite and are waiting
    InviteSent,
    /// We received an invite and must answer
    InviteReceived,
    /// Both sides accepted; forwarding is up
    Paired,
    /// The invite resolved without a pairing
    Resolved(PkReply),
    /// An established battle ended
    Ended {
        /// True when the remote side initiated the teardown
        by_remote: bool,
    },
    /// The partner's forwarded audio was muted or unmuted locally
    PartnerMuteChanged {
        /// New local mute state of the partner's audio
        muted: bool,
    },
}

/// Details of a PK sub-state change
#[derive(Debug, Clone)]
pub struct PkEventInfo {
    /// The transition that was applied
    pub transition: PkTransition,
    /// The remote side involved, when there is one
    pub partner: Option<PkPartner>,
    pub timestamp: DateTime<Utc>,
}

/// One engine volume report after threshold evaluation
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    /// user id to volume, 0..=255
    pub volumes: HashMap<String, u32>,
    pub timestamp: DateTime<Utc>,
}

/// A per-user network quality measurement
#[derive(Debug, Clone)]
pub struct NetworkQualityInfo {
    pub user_id: String,
    pub quality: NetworkQuality,
    pub timestamp: DateTime<Utc>,
}

/// An in-room chat line
#[derive(Debug, Clone)]
pub struct ChatMessageInfo {
    pub sender: UserInfo,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// The presentation mode after a toggle
#[derive(Debug, Clone)]
pub struct RoomModeInfo {
    pub mode: ChatRoomMode,
    pub timestamp: DateTime<Utc>,
}

/// The audience-apply flag after a flip
#[derive(Debug, Clone)]
pub struct ApplySwitchInfo {
    pub enabled: bool,
    pub timestamp: DateTime<Utc>,
}

/// The room session ending
#[derive(Debug, Clone)]
pub struct RoomEndedInfo {
    pub room_id: String,
    /// Why the session ended ("destroyed", "kicked", "left", ...)
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// First decoded frame for a remote stream
#[derive(Debug, Clone)]
pub struct FirstFrameInfo {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Engine transport connectivity change
#[derive(Debug, Clone)]
pub struct ConnectivityInfo {
    pub connected: bool,
    pub timestamp: DateTime<Utc>,
}

// ===== THE EVENT ENUM =====

/// Comprehensive room client event types
///
/// Unified event type covering everything the manager publishes, with an
/// associated priority for filtering.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Session phase changed
    RoomPhaseChanged { info: RoomPhaseInfo, priority: EventPriority },
    /// A seat's occupancy, lock, or occupant switches changed
    SeatChanged { info: SeatChangeInfo, priority: EventPriority },
    /// A viewer entered the room
    AudienceJoined { info: AudienceJoinedInfo, priority: EventPriority },
    /// A viewer left the room
    AudienceExited { info: AudienceExitedInfo, priority: EventPriority },
    /// An audience member asked the host for a seat
    SeatApplyReceived { info: SeatApplyInfo, priority: EventPriority },
    /// A pending application was withdrawn
    SeatApplyCancelled { user_id: String, priority: EventPriority },
    /// The host offered this client a seat
    SeatInviteReceived { info: SeatInviteInfo, priority: EventPriority },
    /// A user's published media switches changed
    MediaStatusChanged { info: MediaStatusInfo, priority: EventPriority },
    /// The PK sub-state moved
    PkChanged { info: PkEventInfo, priority: EventPriority },
    /// Fresh volume report
    VolumesUpdated { info: VolumeInfo, priority: EventPriority },
    /// Fresh quality measurement
    NetworkQualityChanged { info: NetworkQualityInfo, priority: EventPriority },
    /// In-room chat line
    ChatMessageReceived { info: ChatMessageInfo, priority: EventPriority },
    /// Presentation mode toggled
    RoomModeChanged { info: RoomModeInfo, priority: EventPriority },
    /// Audience-apply flag flipped
    AudienceApplySwitchChanged { info: ApplySwitchInfo, priority: EventPriority },
    /// This client was removed from the room
    KickedFromRoom { info: RoomEndedInfo, priority: EventPriority },
    /// The room session ended
    RoomEnded { info: RoomEndedInfo, priority: EventPriority },
    /// First decoded frame for a remote stream
    FirstRemoteFrame { info: FirstFrameInfo, priority: EventPriority },
    /// Engine transport connectivity changed
    ConnectivityChanged { info: ConnectivityInfo, priority: EventPriority },
    /// A failure the manager handled but the UI should surface
    SessionError { error: RoomError, priority: EventPriority },
}

impl RoomEvent {
    /// Get the priority of this event
    pub fn priority(&self) -> EventPriority {
        match self {
            RoomEvent::RoomPhaseChanged { priority, .. }
            | RoomEvent::SeatChanged { priority, .. }
            | RoomEvent::AudienceJoined { priority, .. }
            | RoomEvent::AudienceExited { priority, .. }
            | RoomEvent::SeatApplyReceived { priority, .. }
            | RoomEvent::SeatApplyCancelled { priority, .. }
            | RoomEvent::SeatInviteReceived { priority, .. }
            | RoomEvent::MediaStatusChanged { priority, .. }
            | RoomEvent::PkChanged { priority, .. }
            | RoomEvent::VolumesUpdated { priority, .. }
            | RoomEvent::NetworkQualityChanged { priority, .. }
            | RoomEvent::ChatMessageReceived { priority, .. }
            | RoomEvent::RoomModeChanged { priority, .. }
            | RoomEvent::AudienceApplySwitchChanged { priority, .. }
            | RoomEvent::KickedFromRoom { priority, .. }
            | RoomEvent::RoomEnded { priority, .. }
            | RoomEvent::FirstRemoteFrame { priority, .. }
            | RoomEvent::ConnectivityChanged { priority, .. }
            | RoomEvent::SessionError { priority, .. } => *priority,
        }
    }

    /// The seat this event is about, if any
    pub fn seat_index(&self) -> Option<u8> {
        match self {
            RoomEvent::SeatChanged { info, .. } => Some(info.seat.index),
            RoomEvent::SeatApplyReceived { info, .. } => Some(info.seat_index),
            RoomEvent::SeatInviteReceived { info, .. } => Some(info.seat_index),
            _ => None,
        }
    }

    /// The user this event is about, if any
    pub fn user_id(&self) -> Option<&str> {
        match self {
            RoomEvent::SeatChanged { info, .. } => info.seat.occupant_id(),
            RoomEvent::AudienceJoined { info, .. } => Some(&info.user.user_id),
            RoomEvent::AudienceExited { info, .. } => Some(&info.user_id),
            RoomEvent::SeatApplyReceived { info, .. } => Some(&info.user.user_id),
            RoomEvent::SeatApplyCancelled { user_id, .. } => Some(user_id),
            RoomEvent::MediaStatusChanged { info, .. } => Some(&info.user_id),
            RoomEvent::NetworkQualityChanged { info, .. } => Some(&info.user_id),
            RoomEvent::ChatMessageReceived { info, .. } => Some(&info.sender.user_id),
            RoomEvent::FirstRemoteFrame { info, .. } => Some(&info.user_id),
            _ => None,
        }
    }

    /// Check if this event passes the given filter
    pub fn passes_filter(&self, filter: &EventFilter) -> bool {
        if let Some(min_priority) = &filter.min_priority {
            if self.priority() < *min_priority {
                return false;
            }
        }

        if let Some(seat_indices) = &filter.seat_indices {
            match self.seat_index() {
                Some(index) if seat_indices.contains(&index) => {}
                Some(_) => return false,
                // Events without a seat pass a seat filter untouched
                None => {}
            }
        }

        if let Some(user_ids) = &filter.user_ids {
            match self.user_id() {
                Some(id) if user_ids.contains(id) => {}
                Some(_) => return false,
                None => {}
            }
        }

        true
    }
}

/// Event filtering options for selective subscription
///
/// # Examples
///
/// ```rust
/// use liveroom_client_core::events::{EventFilter, EventPriority};
///
/// // High-priority events only
/// let filter = EventFilter {
///     min_priority: Some(EventPriority::High),
///     seat_indices: None,
///     user_ids: None,
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Minimum event priority level (None = all priorities)
    pub min_priority: Option<EventPriority>,
    /// Only receive events about specific seats (None = all seats)
    pub seat_indices: Option<HashSet<u8>>,
    /// Only receive events about specific users (None = all users)
    pub user_ids: Option<HashSet<String>>,
}

// ===== HANDLER TRAIT =====

/// Observer of manager state transitions
///
/// Implement this to receive room events. Three callbacks are required
/// because no presentation layer can function without them; everything else
/// defaults to a no-op.
#[async_trait]
pub trait RoomEventHandler: Send + Sync {
    /// The session phase moved
    async fn on_room_phase_changed(&self, info: RoomPhaseInfo);

    /// A seat changed; re-render that slot
    async fn on_seat_changed(&self, info: SeatChangeInfo);

    /// The PK sub-state moved
    async fn on_pk_event(&self, info: PkEventInfo);

    /// A viewer entered the room
    async fn on_audience_joined(&self, _info: AudienceJoinedInfo) {}

    /// A viewer left the room
    async fn on_audience_exited(&self, _info: AudienceExitedInfo) {}

    /// An audience member asked for a seat (host side)
    async fn on_seat_apply_received(&self, _info: SeatApplyInfo) {}

    /// A pending application was withdrawn (host side)
    async fn on_seat_apply_cancelled(&self, _user_id: String) {}

    /// The host offered this client a seat (audience side)
    async fn on_seat_invite_received(&self, _info: SeatInviteInfo) {}

    /// A user's published media switches changed
    async fn on_media_status_changed(&self, _info: MediaStatusInfo) {}

    /// Fresh volume report
    async fn on_volumes_updated(&self, _info: VolumeInfo) {}

    /// Fresh per-user quality measurement
    async fn on_network_quality_changed(&self, _info: NetworkQualityInfo) {}

    /// In-room chat line
    async fn on_chat_message(&self, _info: ChatMessageInfo) {}

    /// Presentation mode toggled
    async fn on_room_mode_changed(&self, _info: RoomModeInfo) {}

    /// Audience-apply flag flipped
    async fn on_audience_apply_switch_changed(&self, _info: ApplySwitchInfo) {}

    /// This client was removed from the room
    async fn on_kicked_from_room(&self, _info: RoomEndedInfo) {}

    /// The room session ended
    async fn on_room_ended(&self, _info: RoomEndedInfo) {}

    /// First decoded frame for a remote stream
    async fn on_first_remote_frame(&self, _info: FirstFrameInfo) {}

    /// Engine transport connectivity changed
    async fn on_connectivity_changed(&self, _info: ConnectivityInfo) {}

    /// A failure the manager handled but the UI should surface
    async fn on_session_error(&self, _error: RoomError) {}

    /// Unified dispatch. Override only for custom routing.
    async fn on_room_event(&self, event: RoomEvent) {
        match event {
            RoomEvent::RoomPhaseChanged { info, .. } => self.on_room_phase_changed(info).await,
            RoomEvent::SeatChanged { info, .. } => self.on_seat_changed(info).await,
            RoomEvent::AudienceJoined { info, .. } => self.on_audience_joined(info).await,
            RoomEvent::AudienceExited { info, .. } => self.on_audience_exited(info).await,
            RoomEvent::SeatApplyReceived { info, .. } => self.on_seat_apply_received(info).await,
            RoomEvent::SeatApplyCancelled { user_id, .. } => {
                self.on_seat_apply_cancelled(user_id).await
            }
            RoomEvent::SeatInviteReceived { info, .. } => self.on_seat_invite_received(info).await,
            RoomEvent::MediaStatusChanged { info, .. } => self.on_media_status_changed(info).await,
            RoomEvent::PkChanged { info, .. } => self.on_pk_event(info).await,
            RoomEvent::VolumesUpdated { info, .. } => self.on_volumes_updated(info).await,
            RoomEvent::NetworkQualityChanged { info, .. } => {
                self.on_network_quality_changed(info).await
            }
            RoomEvent::ChatMessageReceived { info, .. } => self.on_chat_message(info).await,
            RoomEvent::RoomModeChanged { info, .. } => self.on_room_mode_changed(info).await,
            RoomEvent::AudienceApplySwitchChanged { info, .. } => {
                self.on_audience_apply_switch_changed(info).await
            }
            RoomEvent::KickedFromRoom { info, .. } => self.on_kicked_from_room(info).await,
            RoomEvent::RoomEnded { info, .. } => self.on_room_ended(info).await,
            RoomEvent::FirstRemoteFrame { info, .. } => self.on_first_remote_frame(info).await,
            RoomEvent::ConnectivityChanged { info, .. } => {
                self.on_connectivity_changed(info).await
            }
            RoomEvent::SessionError { error, .. } => self.on_session_error(error).await,
        }
    }
}

// ===== SUBSCRIPTIONS =====

/// A handler paired with a filter
///
/// Subscriptions determine which events are delivered to which handlers.
pub struct EventSubscription {
    handler: Arc<dyn RoomEventHandler>,
    filter: EventFilter,
    id: uuid::Uuid,
}

impl EventSubscription {
    /// Subscribe a handler to events matching `filter`
    pub fn new(handler: Arc<dyn RoomEventHandler>, filter: EventFilter) -> Self {
        Self {
            handler,
            filter,
            id: uuid::Uuid::new_v4(),
        }
    }

    /// Subscribe a handler to every event
    pub fn all_events(handler: Arc<dyn RoomEventHandler>) -> Self {
        Self::new(handler, EventFilter::default())
    }

    /// Unique identifier for this subscription
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Deliver `event` if it passes this subscription's filter
    pub async fn deliver(&self, event: &RoomEvent) {
        if event.passes_filter(&self.filter) {
            self.handler.on_room_event(event.clone()).await;
        }
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish()
    }
}
