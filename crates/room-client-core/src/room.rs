//! Room model and session phase
//!
//! [`Room`] is the passive record describing the currently active room, as
//! seeded by a create/join response and kept current by notifications.
//! [`RoomPhase`] is the session-level state machine the manager drives:
//!
//! ```text
//! Idle -> Creating/Joining -> Active(Host|Audience) -> Ended
//! ```
//!
//! The co-host/chat-room presentation toggle ([`ChatRoomMode`]) changes which
//! seats and streams a client surfaces but never leaves `Active`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a room, as reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    /// Created but not yet streaming
    #[default]
    Created,
    /// Live and joinable
    Living,
    /// Finished; no longer joinable
    Ended,
    /// Live in guest mode (audience members can be brought on stage)
    MadeGuest,
    /// Live in co-host mode (other anchors can be linked in)
    MadeCoHost,
}

/// Presentation mode toggle inside an active room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRoomMode {
    /// Seat grid shows linked co-hosts
    #[default]
    MakeCoHost,
    /// Seat grid shows the audio chat layout
    ChatRoom,
}

impl std::fmt::Display for ChatRoomMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRoomMode::MakeCoHost => write!(f, "MakeCoHost"),
            ChatRoomMode::ChatRoom => write!(f, "ChatRoom"),
        }
    }
}

/// The active room record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Backend-assigned room identifier
    pub room_id: String,
    /// Display name
    pub name: String,
    /// User id of the room's single host
    pub host_id: String,
    /// Lifecycle status
    pub status: RoomStatus,
    /// Presentation mode
    #[serde(default)]
    pub mode: ChatRoomMode,
    /// Whether audience members may apply for seats themselves.
    /// When false the host must invite; applications short-circuit locally.
    #[serde(default)]
    pub enable_audience_apply: bool,
    /// Current audience headcount as reported by the backend
    #[serde(default)]
    pub audience_count: u32,
    /// Free-form extension metadata carried by the backend
    #[serde(default)]
    pub extension: HashMap<String, String>,
}

/// Summary row for the room-list browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    /// Backend-assigned room identifier
    pub room_id: String,
    /// Display name
    pub name: String,
    /// Host display name
    pub host_name: String,
    /// Cover image reference
    #[serde(default)]
    pub cover_url: String,
    /// Audience headcount at listing time
    #[serde(default)]
    pub audience_count: u32,
}

/// Which side of the room this client is on while active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomRole {
    /// This client created and owns the room
    Host,
    /// This client joined somebody else's room
    Audience,
}

impl std::fmt::Display for RoomRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomRole::Host => write!(f, "Host"),
            RoomRole::Audience => write!(f, "Audience"),
        }
    }
}

/// Session phase driven by the manager
///
/// `Creating` and `Joining` are transitional: an engine failure while in
/// either rolls the session back to `Idle` rather than leaving it wedged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoomPhase {
    /// Not in a room
    #[default]
    Idle,
    /// A create request is in flight
    Creating,
    /// A join request is in flight
    Joining,
    /// In a room with the given role
    Active(RoomRole),
    /// The session ended (left, kicked, or the room was destroyed)
    Ended,
}

impl RoomPhase {
    /// Role while active, if any
    pub fn role(&self) -> Option<RoomRole> {
        match self {
            RoomPhase::Active(role) => Some(*role),
            _ => None,
        }
    }

    /// True for either active role
    pub fn is_active(&self) -> bool {
        matches!(self, RoomPhase::Active(_))
    }
}

impl std::fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomPhase::Idle => write!(f, "Idle"),
            RoomPhase::Creating => write!(f, "Creating"),
            RoomPhase::Joining => write!(f, "Joining"),
            RoomPhase::Active(role) => write!(f, "Active({role})"),
            RoomPhase::Ended => write!(f, "Ended"),
        }
    }
}
