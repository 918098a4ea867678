//! Room manager module
//!
//! The manager is split by concern, one file per operation family, all
//! implementing methods on the same [`RoomManager`] type:
//!
//! - [`manager`] - the type itself, session state, the event pump
//! - [`rooms`] - create/join/leave/finish and the read-only queries
//! - [`seats`] - the seat apply/invite/manage flows
//! - [`pk`] - the cross-room PK battle flow
//! - [`media`] - media switches and transient telemetry
//! - [`controls`] - room-level toggles and chat
//! - [`events`] - the notification reconciler
//! - [`recovery`] - caller-side retry helpers
//! - [`builder`] - construction
//! - [`config`] - configuration

pub mod builder;
pub mod config;
pub mod controls;
pub mod events;
pub mod manager;
pub mod media;
pub mod pk;
pub mod recovery;
pub mod rooms;
pub mod seats;


pub use builder::RoomManagerBuilder;
pub use config::RoomConfig;
pub use manager::{ManagerStats, RoomManager, RoomSession};
pub use media::MediaStats;
pub use rooms::JoinedRoom;
pub use seats::SeatApplyOutcome;
