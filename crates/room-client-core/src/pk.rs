//! Cross-room PK battle state
//!
//! In a PK battle two hosts agree to have their streams mutually forwarded
//! into each other's rooms. The pairing is ephemeral: it exists only while
//! both sides have exchanged an accept, and is torn down by a stop request
//! from either side, by an unanswered invite timing out, or by losing the
//! engine connection.
//!
//! # State Transitions
//!
//! Typical invite flow on the inviting side:
//! `None` → `Inviting` → `Paired` → `None`
//!
//! and on the invited side:
//! `None` → `Invited` → `Paired` → `None`
//!
//! Every invite carries a locally generated id; replies and timeouts that
//! name a different id are stale and must not move the state machine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::UserInfo;

/// How a PK invite was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkReply {
    /// The invited anchor accepted; forwarding starts on both sides
    Accept,
    /// The invited anchor declined
    Reject,
    /// The invite window elapsed with no answer
    Timeout,
}

impl std::fmt::Display for PkReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PkReply::Accept => write!(f, "Accept"),
            PkReply::Reject => write!(f, "Reject"),
            PkReply::Timeout => write!(f, "Timeout"),
        }
    }
}

/// The remote side of an active or pending pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkPartner {
    /// The partner anchor's room
    pub room_id: String,
    /// The partner anchor
    pub user: UserInfo,
    /// Token granting access to the partner's forwarded stream.
    /// Present once the pairing is established.
    pub token: Option<String>,
    /// Local mute state of the partner's forwarded audio
    #[serde(default)]
    pub mic: crate::user::PkAnchorMic,
}

impl PkPartner {
    /// A partner record before any token or mute state exists
    pub fn new(room_id: impl Into<String>, user: UserInfo) -> Self {
        Self {
            room_id: room_id.into(),
            user,
            token: None,
            mic: crate::user::PkAnchorMic::Unmuted,
        }
    }
}

/// PK sub-state of an active host session
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PkState {
    /// No battle and no pending invite
    #[default]
    None,
    /// We sent an invite and are waiting for the reply
    Inviting {
        /// Locally generated invite id; stale replies are matched against it
        invite_id: Uuid,
        /// Who we invited
        target: PkPartner,
    },
    /// We received an invite and have not answered yet
    Invited {
        /// Invite id generated by the remote side
        invite_id: Uuid,
        /// Who invited us
        from: PkPartner,
    },
    /// Both sides accepted; streams are being forwarded
    Paired {
        /// The remote anchor
        partner: PkPartner,
    },
    /// A stop request is in flight
    Ending,
}

impl PkState {
    /// True while a battle is established
    pub fn is_paired(&self) -> bool {
        matches!(self, PkState::Paired { .. })
    }

    /// True while an invite (in either direction) is unresolved
    pub fn is_pending(&self) -> bool {
        matches!(self, PkState::Inviting { .. } | PkState::Invited { .. })
    }

    /// The invite id this state is waiting on, if any
    pub fn pending_invite_id(&self) -> Option<Uuid> {
        match self {
            PkState::Inviting { invite_id, .. } | PkState::Invited { invite_id, .. } => {
                Some(*invite_id)
            }
            _ => None,
        }
    }

    /// The partner of an established pairing, if any
    pub fn partner(&self) -> Option<&PkPartner> {
        match self {
            PkState::Paired { partner } => Some(partner),
            _ => None,
        }
    }

    /// Short label for logging and events
    pub fn label(&self) -> &'static str {
        match self {
            PkState::None => "None",
            PkState::Inviting { .. } => "Inviting",
            PkState::Invited { .. } => "Invited",
            PkState::Paired { .. } => "Paired",
            PkState::Ending => "Ending",
        }
    }
}

impl std::fmt::Display for PkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
