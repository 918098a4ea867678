//! Signaling client contract
//!
//! The signaling service is a managed backend reached over a persistent
//! channel. This module specifies the two halves of its contract:
//!
//! - **Request/ack**: every request carries an event name (the
//!   [`RequestBody`] variant) and a generated request id; the ack carries a
//!   result code plus an optional JSON payload. A non-zero code is an
//!   authoritative rejection.
//! - **Notifications**: a separate out-of-band stream of named events with
//!   JSON-like payloads. The transport does NOT guarantee at-most-once
//!   delivery; consumers must tolerate duplicated and stale notifications.
//!   Every notification therefore carries a sequence number and a room id.
//!
//! Adapters implement [`SignalingClient`]; the in-memory hub used by the
//! integration tests is one such adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RoomResult;
use crate::room::{ChatRoomMode, Room, RoomSummary};
use crate::seat::SeatAction;
use crate::user::{MediaSwitch, UserInfo};

// ===== RESULT CODES =====

/// Ack result code for success
pub const CODE_OK: i32 = 0;
/// Ack result code for a join/lookup against a room that does not exist
pub const CODE_ROOM_NOT_FOUND: i32 = 1001;

// ===== REQUESTS =====

/// A request sent over the signaling channel
///
/// The request id is generated locally and echoed back in the ack so that
/// adapters multiplexing one socket can correlate responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingRequest {
    /// Locally generated correlation id
    pub request_id: Uuid,
    /// The named operation and its payload
    pub body: RequestBody,
}

impl SignalingRequest {
    /// Wrap a body with a fresh request id
    pub fn new(body: RequestBody) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            body,
        }
    }
}

/// The named operations the backend understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestBody {
    /// Create a room owned by `host`
    CreateRoom {
        room_name: String,
        host: UserInfo,
        seat_count: u8,
        enable_audience_apply: bool,
    },
    /// Join an existing room as audience
    JoinRoom { room_id: String, user: UserInfo },
    /// Leave the current room
    LeaveRoom { room_id: String },
    /// End the room (host only)
    DestroyRoom { room_id: String },
    /// Page through the live room list
    FetchRoomList { cursor: u32, count: u32 },
    /// List the audience roster of the current room
    FetchAudienceList { room_id: String },
    /// Ask the host for a seat
    ApplyForSeat { room_id: String, seat_index: u8 },
    /// Withdraw a pending seat application
    CancelSeatApply { room_id: String },
    /// Answer a seat invite from the host
    ReplySeatInvite {
        room_id: String,
        seat_index: u8,
        agree: bool,
    },
    /// Invite an audience member onto a seat (host only)
    InviteToSeat {
        room_id: String,
        user_id: String,
        seat_index: u8,
    },
    /// Approve a pending application (host only)
    AgreeSeatApply { room_id: String, user_id: String },
    /// Decline a pending application (host only)
    RejectSeatApply { room_id: String, user_id: String },
    /// Kick/lock/unlock/mute/unmute one seat (host only)
    ManageSeat {
        room_id: String,
        seat_index: u8,
        action: SeatAction,
    },
    /// Step down from the own seat
    LeaveSeat { room_id: String, seat_index: u8 },
    /// Broadcast the local mic/camera switches
    UpdateMediaStatus {
        room_id: String,
        mic: MediaSwitch,
        camera: MediaSwitch,
    },
    /// Flip whether the audience may apply for seats (host only)
    SetAudienceApplyEnabled { room_id: String, enabled: bool },
    /// Toggle the co-host/chat-room presentation mode (host only)
    SwitchRoomMode { room_id: String, mode: ChatRoomMode },
    /// Invite another room's anchor to a PK battle
    PkInvite {
        invite_id: Uuid,
        room_id: String,
        target_room_id: String,
        target_user_id: String,
        seat_index: u8,
    },
    /// Answer a PK invite
    PkReply {
        invite_id: Uuid,
        room_id: String,
        target_room_id: String,
        agree: bool,
    },
    /// End the current PK battle
    PkStop { room_id: String },
    /// Send an in-room chat message
    SendChatMessage { room_id: String, text: String },
}

impl RequestBody {
    /// Event name on the wire, used for logging and adapter routing
    pub fn event_name(&self) -> &'static str {
        match self {
            RequestBody::CreateRoom { .. } => "createRoom",
            RequestBody::JoinRoom { .. } => "joinRoom",
            RequestBody::LeaveRoom { .. } => "leaveRoom",
            RequestBody::DestroyRoom { .. } => "destroyRoom",
            RequestBody::FetchRoomList { .. } => "fetchRoomList",
            RequestBody::FetchAudienceList { .. } => "fetchAudienceList",
            RequestBody::ApplyForSeat { .. } => "applyForSeat",
            RequestBody::CancelSeatApply { .. } => "cancelSeatApply",
            RequestBody::ReplySeatInvite { .. } => "replySeatInvite",
            RequestBody::InviteToSeat { .. } => "inviteToSeat",
            RequestBody::AgreeSeatApply { .. } => "agreeSeatApply",
            RequestBody::RejectSeatApply { .. } => "rejectSeatApply",
            RequestBody::ManageSeat { .. } => "manageSeat",
            RequestBody::LeaveSeat { .. } => "leaveSeat",
            RequestBody::UpdateMediaStatus { .. } => "updateMediaStatus",
            RequestBody::SetAudienceApplyEnabled { .. } => "setAudienceApplyEnabled",
            RequestBody::SwitchRoomMode { .. } => "switchRoomMode",
            RequestBody::PkInvite { .. } => "pkInvite",
            RequestBody::PkReply { .. } => "pkReply",
            RequestBody::PkStop { .. } => "pkStop",
            RequestBody::SendChatMessage { .. } => "sendChatMessage",
        }
    }
}

/// Acknowledgement of one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingAck {
    /// Echo of the request id
    pub request_id: Uuid,
    /// Result code; [`CODE_OK`] on success
    pub code: i32,
    /// Human-readable detail for non-zero codes
    #[serde(default)]
    pub message: String,
    /// Operation-specific payload (snapshots, tokens, listings)
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl SignalingAck {
    /// A bare success ack for the given request
    pub fn ok(request_id: Uuid) -> Self {
        Self {
            request_id,
            code: CODE_OK,
            message: String::new(),
            payload: None,
        }
    }

    /// A success ack carrying a serialized payload
    pub fn ok_with<T: Serialize>(request_id: Uuid, payload: &T) -> RoomResult<Self> {
        let value = serde_json::to_value(payload)
            .map_err(|e| crate::error::RoomError::internal(format!("encode ack payload: {e}")))?;
        Ok(Self {
            request_id,
            code: CODE_OK,
            message: String::new(),
            payload: Some(value),
        })
    }

    /// A rejection ack
    pub fn rejected(request_id: Uuid, code: i32, message: impl Into<String>) -> Self {
        Self {
            request_id,
            code,
            message: message.into(),
            payload: None,
        }
    }
}

// ===== ACK PAYLOADS =====

/// Payload of a successful `createRoom` ack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomPayload {
    /// The room as the backend recorded it
    pub room: Room,
    /// Token for the engine join
    pub rtc_token: String,
}

/// One seat row inside a room snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatSnapshot {
    pub index: u8,
    pub locked: bool,
    /// Occupant identity plus their published switches
    pub occupant: Option<SeatOccupantSnapshot>,
}

/// Occupant identity and media switches inside a seat snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatOccupantSnapshot {
    pub user: UserInfo,
    pub mic: MediaSwitch,
    pub camera: MediaSwitch,
}

/// A PK pairing already in progress when this client joins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkAnchorSnapshot {
    /// The remote anchor's room
    pub room_id: String,
    /// The remote anchor
    pub user: UserInfo,
}

/// Payload of a successful `joinRoom` ack.
///
/// Joins seed the full room picture instead of relying on deltas, because
/// notifications can be missed during the join race window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomPayload {
    pub room: Room,
    pub host: UserInfo,
    pub seats: Vec<SeatSnapshot>,
    #[serde(default)]
    pub pk_anchors: Vec<PkAnchorSnapshot>,
    /// Token for the engine join
    pub rtc_token: String,
}

/// Payload of a successful `fetchRoomList` ack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomListPayload {
    pub rooms: Vec<RoomSummary>,
    /// Cursor for the next page; 0 when exhausted
    #[serde(default)]
    pub next_cursor: u32,
}

/// Payload of a successful `fetchAudienceList` ack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudienceListPayload {
    pub users: Vec<UserInfo>,
}

/// Payload of a successful accepting `pkReply` ack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkReplyPayload {
    /// Backend-issued token both anchors use for stream forwarding
    pub pk_token: String,
}

/// Decode a typed payload out of a successful ack
pub fn decode_payload<T: serde::de::DeserializeOwned>(ack: &SignalingAck) -> RoomResult<T> {
    let value = ack
        .payload
        .clone()
        .ok_or_else(|| crate::error::RoomError::internal("ack carried no payload"))?;
    serde_json::from_value(value)
        .map_err(|e| crate::error::RoomError::internal(format!("malformed ack payload: {e}")))
}

// ===== NOTIFICATIONS =====

/// One notification from the out-of-band stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingNotification {
    /// Backend sequence number, monotonically increasing per room.
    /// Duplicated deliveries reuse the original number.
    pub seq: u64,
    /// Room the notification belongs to
    pub room_id: String,
    /// The named event
    pub event: NotificationEvent,
}

/// Named events delivered over the notification stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NotificationEvent {
    /// A viewer entered the room
    AudienceJoined { user: UserInfo },
    /// A viewer left the room
    AudienceExited { user_id: String },
    /// A seat's occupancy or lock changed
    SeatStatusChanged {
        seat_index: u8,
        locked: bool,
        occupant: Option<SeatOccupantSnapshot>,
    },
    /// An audience member asked for a seat (delivered to the host)
    SeatApplyReceived { user: UserInfo, seat_index: u8 },
    /// A pending application was withdrawn (delivered to the host)
    SeatApplyCancelled { user_id: String },
    /// The host invited this client onto a seat
    SeatInviteReceived { seat_index: u8, host: UserInfo },
    /// A user's published mic/camera switches changed
    MediaStatusChanged {
        user_id: String,
        mic: MediaSwitch,
        camera: MediaSwitch,
    },
    /// The audience-apply flag was flipped
    AudienceApplySwitchChanged { enabled: bool },
    /// The presentation mode was toggled
    RoomModeChanged { mode: ChatRoomMode },
    /// Another room's anchor invites ours to a PK battle
    AnchorPkInvite {
        invite_id: Uuid,
        from_room_id: String,
        from_user: UserInfo,
        seat_index: u8,
    },
    /// The invited anchor answered our PK invite
    AnchorPkReply {
        invite_id: Uuid,
        from_room_id: String,
        agree: bool,
        /// Forwarding token, present on accept
        pk_token: Option<String>,
    },
    /// The PK battle ended (stop request or remote teardown)
    AnchorPkEnded { room_id: String },
    /// A user was removed from the room by the host or the backend
    UserKicked { user_id: String },
    /// The room was destroyed
    RoomDestroyed,
    /// An in-room chat line
    ChatMessage { sender: UserInfo, text: String },
}

/// Fieldless discriminant of a notification, used as half of the
/// de-duplication key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    AudienceJoined,
    AudienceExited,
    SeatStatusChanged,
    SeatApplyReceived,
    SeatApplyCancelled,
    SeatInviteReceived,
    MediaStatusChanged,
    AudienceApplySwitchChanged,
    RoomModeChanged,
    AnchorPkInvite,
    AnchorPkReply,
    AnchorPkEnded,
    UserKicked,
    RoomDestroyed,
    ChatMessage,
}

impl NotificationEvent {
    /// The de-duplication discriminant for this event
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationEvent::AudienceJoined { .. } => NotificationKind::AudienceJoined,
            NotificationEvent::AudienceExited { .. } => NotificationKind::AudienceExited,
            NotificationEvent::SeatStatusChanged { .. } => NotificationKind::SeatStatusChanged,
            NotificationEvent::SeatApplyReceived { .. } => NotificationKind::SeatApplyReceived,
            NotificationEvent::SeatApplyCancelled { .. } => NotificationKind::SeatApplyCancelled,
            NotificationEvent::SeatInviteReceived { .. } => NotificationKind::SeatInviteReceived,
            NotificationEvent::MediaStatusChanged { .. } => NotificationKind::MediaStatusChanged,
            NotificationEvent::AudienceApplySwitchChanged { .. } => {
                NotificationKind::AudienceApplySwitchChanged
            }
            NotificationEvent::RoomModeChanged { .. } => NotificationKind::RoomModeChanged,
            NotificationEvent::AnchorPkInvite { .. } => NotificationKind::AnchorPkInvite,
            NotificationEvent::AnchorPkReply { .. } => NotificationKind::AnchorPkReply,
            NotificationEvent::AnchorPkEnded { .. } => NotificationKind::AnchorPkEnded,
            NotificationEvent::UserKicked { .. } => NotificationKind::UserKicked,
            NotificationEvent::RoomDestroyed => NotificationKind::RoomDestroyed,
            NotificationEvent::ChatMessage { .. } => NotificationKind::ChatMessage,
        }
    }

    /// The subject this event is about, used as the other half of the
    /// de-duplication key. Events about the room as a whole use the room
    /// scope marker.
    pub fn subject(&self) -> String {
        match self {
            NotificationEvent::AudienceJoined { user } => user.user_id.clone(),
            NotificationEvent::AudienceExited { user_id } => user_id.clone(),
            NotificationEvent::SeatStatusChanged { seat_index, .. } => seat_index.to_string(),
            NotificationEvent::SeatApplyReceived { user, .. } => user.user_id.clone(),
            NotificationEvent::SeatApplyCancelled { user_id } => user_id.clone(),
            NotificationEvent::SeatInviteReceived { seat_index, .. } => seat_index.to_string(),
            NotificationEvent::MediaStatusChanged { user_id, .. } => user_id.clone(),
            NotificationEvent::AudienceApplySwitchChanged { .. } => "room".to_string(),
            NotificationEvent::RoomModeChanged { .. } => "room".to_string(),
            NotificationEvent::AnchorPkInvite { invite_id, .. } => invite_id.to_string(),
            NotificationEvent::AnchorPkReply { invite_id, .. } => invite_id.to_string(),
            NotificationEvent::AnchorPkEnded { room_id } => room_id.clone(),
            NotificationEvent::UserKicked { user_id } => user_id.clone(),
            NotificationEvent::RoomDestroyed => "room".to_string(),
            NotificationEvent::ChatMessage { sender, .. } => sender.user_id.clone(),
        }
    }
}

// ===== CLIENT TRAIT =====

/// The signaling channel as consumed by the manager
///
/// `request` performs one round trip; transport failures map to
/// [`crate::error::RoomError::Transport`] and never to a fabricated ack.
/// `next_notification` is pulled by a single pump task so notifications for
/// a room are applied strictly in receipt order.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Send one request and wait for its ack
    async fn request(&self, request: SignalingRequest) -> RoomResult<SignalingAck>;

    /// Pull the next notification. Returns `None` when the channel closed.
    async fn next_notification(&self) -> Option<SignalingNotification>;
}
