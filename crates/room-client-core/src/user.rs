//! User model for the live-room client
//!
//! A [`User`] is the coordination layer's view of one participant in the
//! active room. It combines the wire-facing identity ([`UserInfo`]) with the
//! per-session fields every notification or local action mutates: role,
//! seat-application status, mic/camera switches, and the transient speaking
//! metrics fed by the engine's volume callbacks.
//!
//! # Usage Examples
//!
//! ```rust
//! use liveroom_client_core::user::{User, UserInfo, UserRole, UserStatus, MediaSwitch};
//!
//! let info = UserInfo {
//!     user_id: "u-1001".to_string(),
//!     user_name: "alice".to_string(),
//!     avatar_url: String::new(),
//! };
//!
//! let user = User::from_info(info, UserRole::Audience);
//! assert_eq!(user.role, UserRole::Audience);
//! assert_eq!(user.status, UserStatus::Default);
//! assert_eq!(user.mic, MediaSwitch::Off);
//! assert!(!user.is_speaking);
//! ```

use serde::{Deserialize, Serialize};

/// Wire-facing identity of a participant
///
/// This is the payload shape exchanged with the signaling service. Session
/// state (role, seat status, media switches) lives on [`User`] and never
/// crosses the wire as part of the identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Backend-assigned user identifier
    pub user_id: String,
    /// Display name shown in seat and audience lists
    pub user_name: String,
    /// Avatar resource reference (empty when the user has none)
    #[serde(default)]
    pub avatar_url: String,
}

impl UserInfo {
    /// Convenience constructor for the common id + name case
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            avatar_url: String::new(),
        }
    }
}

/// Role of a user within the active room
///
/// Exactly one user per room holds [`UserRole::Host`]; everyone else who has
/// joined is [`UserRole::Audience`]. `None` is the state before a room is
/// entered or after it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    /// Not currently part of any room
    #[default]
    None,
    /// Owner of the room; the only role allowed to manage seats and PK
    Host,
    /// Viewer; may apply for a seat or be invited onto one
    Audience,
}

/// Seat-application status of a user
///
/// Tracks where a user is in the take-seat handshake. `Active` means the
/// user currently occupies a seat and publishes media.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    /// In the room with no pending seat interaction
    #[default]
    Default,
    /// Occupying a seat
    Active,
    /// Applied for a seat and awaiting the host's decision
    Applied,
    /// Invited onto a seat by the host and awaiting their own reply
    Invited,
}

/// On/off switch for a local or remote media track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaSwitch {
    /// Track is closed or muted
    #[default]
    Off,
    /// Track is publishing
    On,
}

impl MediaSwitch {
    /// True when the switch is [`MediaSwitch::On`]
    pub fn is_on(&self) -> bool {
        matches!(self, MediaSwitch::On)
    }
}

impl std::fmt::Display for MediaSwitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaSwitch::Off => write!(f, "Off"),
            MediaSwitch::On => write!(f, "On"),
        }
    }
}

/// Mute state of a PK partner's forwarded audio, as heard locally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkAnchorMic {
    /// Partner audio plays through
    #[default]
    Unmuted,
    /// Partner audio is muted on this side only
    Muted,
}

/// One participant in the active room
///
/// Created when a user joins (or appears in a snapshot) and mutated by every
/// relevant notification or local action. Destroyed when the user leaves, is
/// kicked, or the room ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Wire-facing identity
    pub info: UserInfo,
    /// Role within the room
    pub role: UserRole,
    /// Seat-application status
    pub status: UserStatus,
    /// Microphone switch
    pub mic: MediaSwitch,
    /// Camera switch
    pub camera: MediaSwitch,
    /// Most recent reported volume, 0..=255. Last value wins; not reconciled.
    pub volume: u32,
    /// Derived from `volume` against the configured speaking threshold
    pub is_speaking: bool,
}

impl User {
    /// Build a user from wire identity with session fields at their defaults
    pub fn from_info(info: UserInfo, role: UserRole) -> Self {
        Self {
            info,
            role,
            status: UserStatus::Default,
            mic: MediaSwitch::Off,
            camera: MediaSwitch::Off,
            volume: 0,
            is_speaking: false,
        }
    }

    /// Backend-assigned user identifier
    pub fn id(&self) -> &str {
        &self.info.user_id
    }

    /// Update the transient volume fields from an engine report.
    ///
    /// Returns true when the derived speaking flag flipped, which is the only
    /// part of a volume report worth notifying observers about.
    pub fn update_volume(&mut self, volume: u32, speaking_threshold: u32) -> bool {
        self.volume = volume.min(255);
        let speaking = self.volume > speaking_threshold;
        let changed = speaking != self.is_speaking;
        self.is_speaking = speaking;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_update_derives_speaking_flag() {
        let mut user = User::from_info(UserInfo::new("u1", "alice"), UserRole::Audience);

        assert!(user.update_volume(120, 25), "crossing up should report a change");
        assert!(user.is_speaking);
        assert_eq!(user.volume, 120);

        assert!(!user.update_volume(200, 25), "staying above threshold is not a change");
        assert!(user.update_volume(10, 25), "crossing down should report a change");
        assert!(!user.is_speaking);
    }

    #[test]
    fn volume_is_clamped_to_report_range() {
        let mut user = User::from_info(UserInfo::new("u1", "alice"), UserRole::Audience);
        user.update_volume(4000, 25);
        assert_eq!(user.volume, 255);
    }
}
