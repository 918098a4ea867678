//! RTC engine facade
//!
//! The media engine is a vendored, opaque collaborator. This module pins
//! down the only part of it the coordination layer depends on: the call
//! surface the manager drives (join, publish switches, stream forwarding)
//! and the callback stream it ingests (volume reports, network quality,
//! first frames, connection state).
//!
//! Adapters implement [`RtcEngine`]; the manager never references a vendor
//! SDK type directly. Tests substitute a recording fake.
//!
//! Engine callbacks are transient, last-value-wins data. They bypass the
//! request/ack path entirely and are never de-duplicated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RoomResult;

/// Opaque handle to a renderer for one user's stream.
///
/// The coordination layer never touches platform views; the application
/// shell maps this handle onto whatever rendering surface it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderHandle(pub u64);

/// Network quality bucket reported per user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkQuality {
    /// No measurement yet
    #[default]
    Unknown,
    /// Smooth playback expected
    Excellent,
    /// Minor degradation
    Good,
    /// Noticeable degradation
    Poor,
    /// Barely usable
    Bad,
    /// Link is down
    Down,
}

impl std::fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkQuality::Unknown => write!(f, "Unknown"),
            NetworkQuality::Excellent => write!(f, "Excellent"),
            NetworkQuality::Good => write!(f, "Good"),
            NetworkQuality::Poor => write!(f, "Poor"),
            NetworkQuality::Bad => write!(f, "Bad"),
            NetworkQuality::Down => write!(f, "Down"),
        }
    }
}

/// Callback events emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Per-user link quality changed
    NetworkQualityChanged {
        /// User the measurement applies to
        user_id: String,
        /// New quality bucket
        quality: NetworkQuality,
    },
    /// Periodic volume report covering every audible user
    VolumesReported {
        /// user id to volume, 0..=255
        volumes: std::collections::HashMap<String, u32>,
    },
    /// First decoded video frame arrived for a remote user
    FirstRemoteVideoFrame {
        /// User whose stream became visible
        user_id: String,
    },
    /// The engine's transport connection came up or went down
    ConnectionStateChanged {
        /// Whether media transport is currently connected
        connected: bool,
    },
}

/// Call surface of the vendored media engine
///
/// One engine instance exists per process. The manager is its sole mutator
/// of room-join state; rendering components only perform read-only queries
/// such as [`RtcEngine::render_handle`].
#[async_trait]
pub trait RtcEngine: Send + Sync {
    /// Join the media room. `is_host` selects the publisher role and the
    /// matching video configuration.
    async fn join_room(
        &self,
        token: &str,
        room_id: &str,
        user_id: &str,
        is_host: bool,
    ) -> RoomResult<()>;

    /// Leave the media room and release transports
    async fn leave_room(&self) -> RoomResult<()>;

    /// Open or close local audio capture and publishing
    async fn enable_local_audio(&self, enabled: bool) -> RoomResult<()>;

    /// Open or close local video capture and publishing
    async fn enable_local_video(&self, enabled: bool) -> RoomResult<()>;

    /// Mute local audio without releasing the capture device
    async fn mute_local_audio(&self, muted: bool) -> RoomResult<()>;

    /// Mute local video without releasing the capture device
    async fn mute_local_video(&self, muted: bool) -> RoomResult<()>;

    /// Toggle between front and back camera
    async fn switch_camera(&self) -> RoomResult<()>;

    /// Reapply the encoder configuration for the given role
    async fn update_video_config(&self, is_host: bool) -> RoomResult<()>;

    /// Start cross-room forwarding of the local stream for a PK battle
    async fn start_forward_stream(&self, room_id: &str, token: &str) -> RoomResult<()>;

    /// Stop cross-room forwarding
    async fn stop_forward_stream(&self) -> RoomResult<()>;

    /// Mute a remote anchor's forwarded audio locally
    async fn mute_remote_anchor(&self, user_id: &str, muted: bool) -> RoomResult<()>;

    /// Read-only renderer lookup for a user's stream
    async fn render_handle(&self, user_id: &str) -> Option<RenderHandle>;

    /// Pull the next callback event. Returns `None` when the engine has
    /// shut down. A single pump task consumes this; events arrive in the
    /// order the engine produced them.
    async fn next_event(&self) -> Option<EngineEvent>;
}
