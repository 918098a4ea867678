//! Configuration for the room manager
//!
//! One [`RoomConfig`] is supplied at construction and never changes for the
//! manager's lifetime. Per-room values (seat count, the audience-apply flag)
//! only govern rooms this client creates; joined rooms use whatever the
//! snapshot says.

use std::time::Duration;

use crate::user::UserInfo;

/// Configuration for a [`crate::manager::RoomManager`]
///
/// # Examples
///
/// ```rust
/// use liveroom_client_core::manager::RoomConfig;
/// use liveroom_client_core::user::UserInfo;
/// use std::time::Duration;
///
/// let config = RoomConfig::new(UserInfo::new("u-42", "alice"))
///     .with_seat_count(6)
///     .with_audience_apply(true)
///     .with_pk_invite_timeout(Duration::from_secs(15));
///
/// assert_eq!(config.seat_count, 6);
/// assert_eq!(config.pk_invite_timeout, Duration::from_secs(15));
/// ```
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Identity this client acts as
    pub local_user: UserInfo,
    /// Seat count for rooms this client creates
    pub seat_count: u8,
    /// Initial audience-apply flag for rooms this client creates
    pub enable_audience_apply: bool,
    /// How long an unanswered PK invite stays pending before it resolves
    /// to a timeout rejection
    pub pk_invite_timeout: Duration,
    /// Volume above which a user counts as speaking, 0..=255
    pub speaking_threshold: u32,
    /// Capacity of the broadcast event channel
    pub event_channel_capacity: usize,
}

impl RoomConfig {
    /// Create a configuration with default settings for the given identity
    pub fn new(local_user: UserInfo) -> Self {
        Self {
            local_user,
            seat_count: 8,
            enable_audience_apply: true,
            pk_invite_timeout: Duration::from_secs(10),
            speaking_threshold: 25,
            event_channel_capacity: 256,
        }
    }

    /// Set the seat count for created rooms
    pub fn with_seat_count(mut self, count: u8) -> Self {
        self.seat_count = count;
        self
    }

    /// Set the initial audience-apply flag for created rooms
    pub fn with_audience_apply(mut self, enabled: bool) -> Self {
        self.enable_audience_apply = enabled;
        self
    }

    /// Set the PK invite window
    pub fn with_pk_invite_timeout(mut self, timeout: Duration) -> Self {
        self.pk_invite_timeout = timeout;
        self
    }

    /// Set the speaking threshold (0..=255)
    pub fn with_speaking_threshold(mut self, threshold: u32) -> Self {
        self.speaking_threshold = threshold.min(255);
        self
    }

    /// Set the broadcast event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }
}
