//! # Configuration Module
//!
//! Session settings: request timeouts, long-polling, the handshake
//! announcement, and the reconnection policy of the connect loop.
//!
//! ## Core Types
//!
//! - **Config**: main configuration struct for a session
//! - **ReconnectStrategy**: trait for custom backoff between failed connects
//! - **BackoffReconnect**: exponential backoff reconnection strategy

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;

use crate::protocol::{BAYEUX_VERSION, ConnectionTypes, MINIMUM_VERSION};

/// Main configuration struct for a Bayeux session
///
/// ## Example
///
/// ```rust
/// use tokio_bayeux::config::Config;
/// use std::time::Duration;
///
/// let config = Config::new()
///     .with_timeout(Duration::from_secs(5))
///     .with_long_poll_timeout(Duration::from_secs(60))
///     .with_max_reconnect_attempts(3);
///
/// assert!(config.long_polling);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Timeout for every request except the long-poll connect
    pub timeout: Duration,

    /// Timeout for the long-poll `/meta/connect` request
    ///
    /// Must exceed the server's advised hold time, otherwise every poll
    /// ends in a client-side timeout.
    pub long_poll_timeout: Duration,

    /// Start the connect loop automatically after a successful handshake
    pub long_polling: bool,

    /// Protocol version announced in the handshake
    pub version: String,

    /// Lowest protocol version the client accepts
    pub minimum_version: String,

    /// Connection types announced in the handshake
    pub connection_types: ConnectionTypes,

    /// Extension payload attached to every handshake
    pub ext: Option<Value>,

    /// Consecutive failed connects (or re-handshakes) tolerated before giving up
    pub max_reconnect_attempts: u32,

    /// Delay between failed connects when the server gives no interval
    pub reconnect_strategy: Arc<dyn ReconnectStrategy>,

    /// Optional custom tokio runtime handle
    ///
    /// Background tasks (the connect loop, blocking calls) are spawned on it.
    pub runtime: Option<Handle>,
}

impl Default for Config {
    /// Defaults:
    /// - 10 second request timeout
    /// - 45 second long-poll timeout
    /// - long-polling on
    /// - Bayeux version 1.0, minimum 1.0
    /// - every supported connection type
    /// - 5 reconnect attempts with exponential backoff
    fn default() -> Self {
        Config {
            timeout: Duration::from_secs(10),
            long_poll_timeout: Duration::from_secs(45),
            long_polling: true,
            version: BAYEUX_VERSION.to_string(),
            minimum_version: MINIMUM_VERSION.to_string(),
            connection_types: ConnectionTypes::ALL,
            ext: None,
            max_reconnect_attempts: 5,
            reconnect_strategy: Arc::new(BackoffReconnect::default()),
            runtime: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-request timeout
    ///
    /// ```rust
    /// use tokio_bayeux::config::Config;
    /// use std::time::Duration;
    ///
    /// let config = Config::new().with_timeout(Duration::from_secs(30));
    /// assert_eq!(config.timeout, Duration::from_secs(30));
    /// ```
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.long_poll_timeout = timeout;
        self
    }

    /// Disables the automatic connect loop; start it later with `Client::start_long_polling`.
    pub fn without_long_polling(mut self) -> Self {
        self.long_polling = false;
        self
    }

    pub fn with_versions(mut self, version: impl Into<String>, minimum: impl Into<String>) -> Self {
        self.version = version.into();
        self.minimum_version = minimum.into();
        self
    }

    pub fn with_connection_types(mut self, types: ConnectionTypes) -> Self {
        self.connection_types = types;
        self
    }

    /// Sets the handshake `ext` payload, e.g. authentication credentials
    ///
    /// ```rust
    /// use tokio_bayeux::config::Config;
    ///
    /// let config = Config::new().with_ext(serde_json::json!({"auth": {"token": "secret"}}));
    /// assert_eq!(config.ext.unwrap()["auth"]["token"], "secret");
    /// ```
    pub fn with_ext(mut self, ext: Value) -> Self {
        self.ext = Some(ext);
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the reconnection strategy
    ///
    /// ```rust
    /// use tokio_bayeux::config::{Config, BackoffReconnect};
    /// use std::time::Duration;
    ///
    /// let strategy = BackoffReconnect {
    ///     factor: 1.5,
    ///     min_delay: Duration::from_millis(100),
    ///     max_delay: Duration::from_secs(10),
    /// };
    ///
    /// let config = Config::new().with_reconnect_strategy(strategy);
    /// ```
    pub fn with_reconnect_strategy(mut self, strategy: impl ReconnectStrategy) -> Self {
        self.reconnect_strategy = Arc::new(strategy);
        self
    }

    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

/// Trait for implementing custom reconnection strategies
///
/// Consulted by the connect loop after a failed connect when the server
/// advice carries no `interval`.
///
/// ## Example
///
/// ```rust
/// use tokio_bayeux::config::ReconnectStrategy;
/// use std::time::Duration;
///
/// #[derive(Debug)]
/// struct LinearReconnect {
///     base_delay: Duration,
/// }
///
/// impl ReconnectStrategy for LinearReconnect {
///     fn time_before_next_attempt(&self, attempt: u32) -> Duration {
///         self.base_delay * attempt
///     }
/// }
/// ```
pub trait ReconnectStrategy: std::fmt::Debug + Send + Sync + 'static {
    /// Delay before reconnect attempt number `attempt` (1-based)
    fn time_before_next_attempt(&self, attempt: u32) -> Duration;
}

/// Exponential backoff reconnection strategy
///
/// The delay is `min_delay * factor^attempt`, clamped between `min_delay`
/// and `max_delay`.
///
/// ```rust
/// use tokio_bayeux::config::{BackoffReconnect, ReconnectStrategy};
/// use std::time::Duration;
///
/// let strategy = BackoffReconnect {
///     factor: 2.0,
///     min_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(1),
/// };
///
/// assert!(strategy.time_before_next_attempt(1) < strategy.time_before_next_attempt(2));
/// assert_eq!(strategy.time_before_next_attempt(10), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct BackoffReconnect {
    /// Each attempt multiplies the delay by this factor
    pub factor: f64,
    /// Lower bound of the delay
    pub min_delay: Duration,
    /// Upper bound of the delay
    pub max_delay: Duration,
}

impl ReconnectStrategy for BackoffReconnect {
    fn time_before_next_attempt(&self, attempt: u32) -> Duration {
        if self.min_delay > self.max_delay {
            return self.max_delay;
        }

        let time = self.min_delay.as_secs_f64() * self.factor.powi(attempt as i32);
        let time = time.clamp(self.min_delay.as_secs_f64(), self.max_delay.as_secs_f64());
        Duration::from_secs_f64(time)
    }
}

impl Default for BackoffReconnect {
    /// factor 2.0, between 200ms and 20s
    fn default() -> Self {
        BackoffReconnect {
            factor: 2.0,
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(20),
        }
    }
}
