//! Error recovery and retry mechanisms for room operations
//!
//! The manager itself never retries a state-mutating request; an ack is
//! authoritative and a duplicate mutation could diverge from the host's
//! seat state. These helpers exist for the caller side of read-only
//! queries (room lists, audience lists), where a transient transport
//! failure is worth absorbing.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{RoomError, RoomResult};

/// Configuration for retry behavior
///
/// # Examples
///
/// ```rust
/// # use liveroom_client_core::manager::recovery::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::default();
/// assert_eq!(config.max_attempts, 3);
/// assert_eq!(config.initial_delay, Duration::from_millis(100));
/// assert!(config.use_jitter);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration for quick retries (list queries, lookups)
    pub fn quick() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            use_jitter: true,
        }
    }

    /// Configuration for slow retries (reconnect-grade operations)
    pub fn slow() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 3.0,
            use_jitter: false,
        }
    }
}

/// Retry an operation with exponential backoff.
///
/// Only recoverable errors (see [`RoomError::is_recoverable`]) are retried;
/// backend rejections and local validation failures return immediately.
///
/// # Examples
///
/// ```rust,no_run
/// # use liveroom_client_core::manager::recovery::{retry_with_backoff, RetryConfig};
/// # use liveroom_client_core::manager::RoomManager;
/// # use std::sync::Arc;
/// # async fn example(manager: Arc<RoomManager>) -> Result<(), Box<dyn std::error::Error>> {
/// let rooms = retry_with_backoff("fetch_room_list", RetryConfig::quick(), || async {
///     manager.fetch_room_list(0, 20).await
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> RoomResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RoomResult<T>>,
{
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation_name, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_recoverable() && attempt < config.max_attempts => {
                let wait = if config.use_jitter {
                    jittered(delay)
                } else {
                    delay
                };
                warn!(
                    operation_name,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    %err,
                    "operation failed; retrying"
                );
                sleep(wait).await;
                delay = next_delay(delay, &config);
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_error.unwrap_or_else(|| RoomError::internal("retry loop produced no error")))
}

fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let scaled = current.as_millis() as f64 * config.backoff_multiplier;
    Duration::from_millis(scaled as u64).min(config.max_delay)
}

fn jittered(delay: Duration) -> Duration {
    use rand::Rng;
    // Up to 25% early or late keeps synchronized clients from stampeding
    let millis = delay.as_millis() as f64;
    let factor = rand::thread_rng().gen_range(0.75..=1.25);
    Duration::from_millis((millis * factor) as u64)
}

/// Extension trait for attaching operation context to errors
pub trait ErrorContext<T> {
    /// Wrap the error message with context produced on demand
    fn with_context<F: FnOnce() -> String>(self, context: F) -> RoomResult<T>;
}

impl<T> ErrorContext<T> for RoomResult<T> {
    fn with_context<F: FnOnce() -> String>(self, context: F) -> RoomResult<T> {
        self.map_err(|err| match err {
            RoomError::Transport { message } => RoomError::Transport {
                message: format!("{}: {message}", context()),
            },
            RoomError::Internal { message } => RoomError::Internal {
                message: format!("{}: {message}", context()),
            },
            other => other,
        })
    }
}
