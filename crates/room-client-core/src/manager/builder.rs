//! Builder for the room manager
//!
//! The manager needs its two collaborators and a configuration; the builder
//! keeps call sites readable and validates the wiring in one place.
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use liveroom_client_core::manager::RoomManagerBuilder;
//! use liveroom_client_core::user::UserInfo;
//! # use std::sync::Arc;
//! # async fn example(
//! #     signaling: Arc<dyn liveroom_client_core::signaling::SignalingClient>,
//! #     engine: Arc<dyn liveroom_client_core::engine::RtcEngine>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = RoomManagerBuilder::new(UserInfo::new("u-1", "alice"))
//!     .with_signaling(signaling)
//!     .with_engine(engine)
//!     .with_seat_count(8)
//!     .build()
//!     .await?;
//! manager.start().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::engine::RtcEngine;
use crate::error::{RoomError, RoomResult};
use crate::signaling::SignalingClient;
use crate::user::UserInfo;

use super::config::RoomConfig;
use super::manager::RoomManager;

/// Builder for [`RoomManager`]
pub struct RoomManagerBuilder {
    config: RoomConfig,
    signaling: Option<Arc<dyn SignalingClient>>,
    engine: Option<Arc<dyn RtcEngine>>,
}

impl RoomManagerBuilder {
    /// Start a builder for the given local identity
    pub fn new(local_user: UserInfo) -> Self {
        Self {
            config: RoomConfig::new(local_user),
            signaling: None,
            engine: None,
        }
    }

    /// Inject the signaling client
    pub fn with_signaling(mut self, signaling: Arc<dyn SignalingClient>) -> Self {
        self.signaling = Some(signaling);
        self
    }

    /// Inject the RTC engine facade
    pub fn with_engine(mut self, engine: Arc<dyn RtcEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: RoomConfig) -> Self {
        self.config = config;
        self
    }

    /// Seat count for rooms this client creates
    pub fn with_seat_count(mut self, count: u8) -> Self {
        self.config.seat_count = count;
        self
    }

    /// Initial audience-apply flag for rooms this client creates
    pub fn with_audience_apply(mut self, enabled: bool) -> Self {
        self.config.enable_audience_apply = enabled;
        self
    }

    /// The PK invite window
    pub fn with_pk_invite_timeout(mut self, timeout: Duration) -> Self {
        self.config.pk_invite_timeout = timeout;
        self
    }

    /// Volume threshold above which a user counts as speaking
    pub fn with_speaking_threshold(mut self, threshold: u32) -> Self {
        self.config.speaking_threshold = threshold.min(255);
        self
    }

    /// Validate the wiring and construct the manager
    pub async fn build(self) -> RoomResult<Arc<RoomManager>> {
        let signaling = self
            .signaling
            .ok_or_else(|| RoomError::invalid_state("a signaling client is required"))?;
        let engine = self
            .engine
            .ok_or_else(|| RoomError::invalid_state("an RTC engine is required"))?;
        RoomManager::new(self.config, signaling, engine).await
    }
}
