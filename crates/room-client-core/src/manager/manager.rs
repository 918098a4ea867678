//! The room manager
//!
//! [`RoomManager`] is the single authoritative owner of local room state.
//! It turns inbound signaling notifications and local intents into
//! consistent state transitions and outbound engine/signaling calls, and
//! publishes every applied transition as a [`RoomEvent`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐
//! │  Presentation (UI)      │
//! └─────┬──────────▲────────┘
//!       │ intents  │ RoomEvents
//! ┌─────▼──────────┴────────┐
//! │       RoomManager       │ ◄── This Module
//! │  session state + pump   │
//! └───┬─────────────────┬───┘
//!     │ requests/acks   │ join/publish/forward
//! ┌───▼─────────┐  ┌────▼────────┐
//! │  Signaling  │  │  RTC Engine │
//! └─────────────┘  └─────────────┘
//! ```
//!
//! All mutations of the session state happen behind one `RwLock`, taken
//! only across synchronous sections. Notifications, engine callbacks, and
//! internally scheduled timeouts are funneled through a single pump task,
//! so they are applied strictly in receipt order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::engine::{RenderHandle, RtcEngine};
use crate::error::{RoomError, RoomResult};
use crate::events::{EventSubscription, RoomEvent, RoomEventHandler};
use crate::pk::PkState;
use crate::room::{Room, RoomPhase, RoomRole};
use crate::seat::SeatList;
use crate::signaling::SignalingClient;
use crate::user::User;

use super::config::RoomConfig;
use super::events::RoomNotificationHandler;

/// Events the manager schedules for itself, delivered through the same pump
/// as external notifications so ordering is preserved
#[derive(Debug, Clone)]
pub(crate) enum InternalEvent {
    /// A PK invite window elapsed
    PkInviteTimeout { invite_id: Uuid },
}

/// Authoritative in-memory state of the active room session
///
/// Presentation components only ever see clones of this; the live copy is
/// mutated exclusively behind the manager's lock.
#[derive(Debug, Clone, Default)]
pub struct RoomSession {
    /// Session phase
    pub phase: RoomPhase,
    /// The active room, present from Creating/Joining success until Ended
    pub room: Option<Room>,
    /// The room's seat grid
    pub seats: SeatList,
    /// Non-seated viewers by user id
    pub audience: HashMap<String, User>,
    /// This client's own user record
    pub local: Option<User>,
    /// PK sub-state
    pub pk: PkState,
    /// True while a locally initiated PK stop is being processed, so the
    /// remote-end notification is recognized as an echo
    pub active_end_pk: bool,
    /// Engine token from the create/join response
    pub rtc_token: Option<String>,
    /// Host side: applications awaiting a decision, by applicant id
    pub pending_applies: HashMap<String, (crate::user::UserInfo, u8)>,
    /// Audience side: the seat a received invite is for, while unanswered
    pub pending_invite: Option<u8>,
}

impl RoomSession {
    /// The active room id, if any
    pub fn room_id(&self) -> Option<&str> {
        self.room.as_ref().map(|r| r.room_id.as_str())
    }

    /// Require an active session, returning the local role
    pub fn require_active(&self) -> RoomResult<RoomRole> {
        self.phase
            .role()
            .ok_or_else(|| RoomError::invalid_state(format!("not in a room (phase {})", self.phase)))
    }

    /// Require the active session to be the host side
    pub fn require_host(&self) -> RoomResult<&Room> {
        match self.phase {
            RoomPhase::Active(RoomRole::Host) => self
                .room
                .as_ref()
                .ok_or_else(|| RoomError::internal("active host session without a room")),
            _ => Err(RoomError::invalid_state(
                "only the host may perform this operation",
            )),
        }
    }

    /// Whether the given user currently occupies any seat
    pub fn is_seated(&self, user_id: &str) -> bool {
        self.seats.seat_of(user_id).is_some()
    }

    pub(crate) fn reset(&mut self) {
        *self = RoomSession::default();
    }
}

/// Statistics about the manager's current state and activity
#[derive(Debug, Clone, Default)]
pub struct ManagerStats {
    /// Whether the pump is running
    pub is_running: bool,
    /// Rooms created since construction
    pub rooms_created: usize,
    /// Rooms joined since construction
    pub rooms_joined: usize,
    /// Notifications applied to local state
    pub notifications_applied: usize,
    /// Notifications dropped as duplicates, stale, or no-ops
    pub notifications_dropped: usize,
    /// PK invites sent
    pub pk_invites_sent: usize,
    /// PK battles that reached the paired state
    pub pk_battles_started: usize,
}

/// The room session coordinator
///
/// Constructed with its two injected collaborators and a [`RoomConfig`];
/// see [`crate::manager::RoomManagerBuilder`] for the ergonomic path.
///
/// # Usage Examples
///
/// ```rust,no_run
/// use liveroom_client_core::manager::{RoomManager, RoomConfig};
/// use liveroom_client_core::user::UserInfo;
/// # use std::sync::Arc;
/// # async fn example(
/// #     signaling: Arc<dyn liveroom_client_core::signaling::SignalingClient>,
/// #     engine: Arc<dyn liveroom_client_core::engine::RtcEngine>,
/// # ) -> Result<(), Box<dyn std::error::Error>> {
/// let config = RoomConfig::new(UserInfo::new("u-1", "alice"));
/// let manager = RoomManager::new(config, signaling, engine).await?;
/// manager.start().await?;
///
/// let (room, _token) = manager.create_room("alice's room").await?;
/// println!("live in {}", room.room_id);
/// # Ok(())
/// # }
/// ```
pub struct RoomManager {
    pub(crate) config: RoomConfig,
    pub(crate) signaling: Arc<dyn SignalingClient>,
    pub(crate) engine: Arc<dyn RtcEngine>,
    /// Shared state bridge; the pump and the operation methods both go
    /// through it
    pub(crate) handler: Arc<RoomNotificationHandler>,
    /// Whether the pump is running; operations are rejected until it is
    pub(crate) is_running: Arc<RwLock<bool>>,
    internal_rx: Mutex<Option<mpsc::UnboundedReceiver<InternalEvent>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    pub(crate) stats: Arc<Mutex<ManagerStats>>,
}

impl RoomManager {
    /// Create a manager wired to the given signaling client and engine
    pub async fn new(
        config: RoomConfig,
        signaling: Arc<dyn SignalingClient>,
        engine: Arc<dyn RtcEngine>,
    ) -> RoomResult<Arc<Self>> {
        if config.local_user.user_id.is_empty() {
            return Err(RoomError::invalid_state(
                "local user id must not be empty",
            ));
        }

        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Mutex::new(ManagerStats::default()));

        let handler = Arc::new(RoomNotificationHandler::new(
            config.clone(),
            signaling.clone(),
            engine.clone(),
            event_tx,
            internal_tx,
            stats.clone(),
        ));

        Ok(Arc::new(Self {
            config,
            signaling,
            engine,
            handler,
            is_running: Arc::new(RwLock::new(false)),
            internal_rx: Mutex::new(Some(internal_rx)),
            pump: Mutex::new(None),
            stats,
        }))
    }

    /// Start the event pump.
    ///
    /// Must be called once before any room operation. Notifications,
    /// engine callbacks, and internal timers are consumed by one task so
    /// their effects are applied in receipt order.
    pub async fn start(&self) -> RoomResult<()> {
        {
            let mut running = self.is_running.write().await;
            if *running {
                return Err(RoomError::invalid_state("manager is already started"));
            }
            *running = true;
        }

        let mut internal_rx = self
            .internal_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| RoomError::internal("manager cannot be restarted"))?;

        let handler = self.handler.clone();
        let signaling = self.signaling.clone();
        let engine = self.engine.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    notification = signaling.next_notification() => match notification {
                        Some(n) => handler.handle_notification(n).await,
                        None => {
                            tracing::debug!("signaling notification stream closed");
                            break;
                        }
                    },
                    event = engine.next_event() => match event {
                        Some(e) => handler.handle_engine_event(e).await,
                        None => {
                            tracing::debug!("engine event stream closed");
                            break;
                        }
                    },
                    internal = internal_rx.recv() => match internal {
                        Some(i) => handler.handle_internal(i).await,
                        None => break,
                    },
                }
            }
            tracing::debug!("room event pump exited");
        });

        *self.pump.lock().await = Some(task);
        self.stats.lock().await.is_running = true;
        tracing::info!("room manager started for user {}", self.config.local_user.user_id);
        Ok(())
    }

    /// Stop the event pump. In-room state, if any, is torn down locally.
    pub async fn stop(&self) -> RoomResult<()> {
        {
            let mut running = self.is_running.write().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        if let Some(task) = self.pump.lock().await.take() {
            task.abort();
        }
        self.handler.session.write().await.reset();
        self.handler.dedup.lock().await.clear();
        self.handler.media_stats.clear();
        self.stats.lock().await.is_running = false;
        tracing::info!("room manager stopped");
        Ok(())
    }

    /// Register the application-level event handler
    pub async fn set_event_handler(&self, handler: Arc<dyn RoomEventHandler>) {
        *self.handler.event_handler.write().await = Some(handler);
    }

    /// Subscribe to the raw broadcast event stream
    pub async fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.handler.event_tx.subscribe()
    }

    /// Add a filtered subscription
    pub async fn add_subscription(&self, subscription: EventSubscription) -> Uuid {
        let id = subscription.id();
        self.handler.subscriptions.write().await.push(subscription);
        id
    }

    /// Clone of the current session state
    pub async fn session(&self) -> RoomSession {
        self.handler.session.read().await.clone()
    }

    /// Current manager statistics
    pub async fn get_stats(&self) -> ManagerStats {
        let mut stats = self.stats.lock().await.clone();
        stats.is_running = *self.is_running.read().await;
        stats
    }

    /// Read-only renderer lookup, delegated to the engine
    pub async fn render_handle(&self, user_id: &str) -> Option<RenderHandle> {
        self.engine.render_handle(user_id).await
    }

    /// Guard shared by every operation: the pump must be running
    pub(crate) async fn ensure_running(&self) -> RoomResult<()> {
        if !*self.is_running.read().await {
            return Err(RoomError::internal(
                "manager is not started. Call start() before room operations.",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for RoomManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomManager")
            .field("local_user", &self.config.local_user.user_id)
            .finish()
    }
}
