//! # liveroom-client-core
//!
//! Room/seat/session coordination layer for live video-chat clients.
//!
//! This crate owns the authoritative in-memory state of one live room
//! (seats, users, PK pairings, media status) and keeps it consistent with
//! asynchronous, possibly duplicated notifications arriving from a
//! signaling service, while driving an externally supplied RTC engine.
//! It contains no media transport and no UI; both are injected behind
//! traits ([`signaling::SignalingClient`] and [`engine::RtcEngine`]) and
//! the presentation layer observes state through [`events::RoomEvent`].
//!
//! # Architecture
//!
//! ```text
//! UI intent ──► RoomManager ──► SignalingClient ──► backend
//!                  │    ▲                             │
//!                  │    └───── notifications ◄────────┘
//!                  ▼
//!              RtcEngine (join / publish / forward streams)
//! ```
//!
//! All state mutations flow through one pump task, so the UI never
//! observes a torn intermediate state mid-reconciliation. Duplicate and
//! stale notifications are filtered by a per-(event, subject) sequence
//! window, and reconciliation itself is idempotent.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use liveroom_client_core::{RoomManagerBuilder, UserInfo};
//! # use std::sync::Arc;
//! # async fn example(
//! #     signaling: Arc<dyn liveroom_client_core::signaling::SignalingClient>,
//! #     engine: Arc<dyn liveroom_client_core::engine::RtcEngine>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = RoomManagerBuilder::new(UserInfo::new("u-1", "alice"))
//!     .with_signaling(signaling)
//!     .with_engine(engine)
//!     .build()
//!     .await?;
//!
//! manager.start().await?;
//! let (room, _token) = manager.create_room("alice's room").await?;
//! println!("hosting {}", room.room_id);
//! # Ok(())
//! # }
//! ```

pub mod dedup;
pub mod engine;
pub mod error;
pub mod events;
pub mod manager;
pub mod pk;
pub mod room;
pub mod seat;
pub mod signaling;
pub mod user;

// Convenience re-exports for the common surface
pub use engine::{EngineEvent, NetworkQuality, RenderHandle, RtcEngine};
pub use error::{RoomError, RoomResult};
pub use events::{EventFilter, EventPriority, EventSubscription, RoomEvent, RoomEventHandler};
pub use manager::{
    JoinedRoom, ManagerStats, MediaStats, RoomConfig, RoomManager, RoomManagerBuilder,
    RoomSession, SeatApplyOutcome,
};
pub use pk::{PkPartner, PkReply, PkState};
pub use room::{ChatRoomMode, Room, RoomPhase, RoomRole, RoomStatus, RoomSummary};
pub use seat::{Seat, SeatAction, SeatList, SeatStatus};
pub use signaling::{
    NotificationEvent, SignalingAck, SignalingClient, SignalingNotification, SignalingRequest,
};
pub use user::{MediaSwitch, PkAnchorMic, User, UserInfo, UserRole, UserStatus};
