//! Connection manager
//!
//! Every backend call goes through [`ConnectionManager::execute`], which
//! adds a timeout, retries transport failures with capped exponential
//! backoff, collapses concurrent calls that share a dedupe key, and keeps
//! a health state machine (`Healthy -> Degraded -> Offline`). While offline
//! the manager fails fast without touching the backend until a health
//! probe or a manual retry succeeds.
//!
//! Construct one per application and share it through an `Arc`.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Backend health as seen by this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Healthy,
    Degraded,
    Offline,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Healthy => "healthy",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Offline => "offline",
        };
        write!(f, "{}", s)
    }
}

/// Errors that know whether they came from the transport
pub trait Retryable {
    fn is_connection_error(&self) -> bool;
}

impl Retryable for stack_core::Error {
    fn is_connection_error(&self) -> bool {
        stack_core::Error::is_connection_error(self)
    }
}

impl Retryable for crate::error::Error {
    fn is_connection_error(&self) -> bool {
        crate::error::Error::is_connection_error(self)
    }
}

/// Typed failure of a managed call
#[derive(Debug)]
pub enum CallError<E> {
    /// The call did not settle within the timeout. It may still have been
    /// applied by the backend.
    Timeout(Duration),
    /// Circuit open or retries exhausted
    Offline { reason: String },
    /// The backend answered with an error; never retried
    Application(Arc<E>),
}

impl<E> CallError<E> {
    pub fn is_offline(&self) -> bool {
        matches!(self, CallError::Offline { .. })
    }

    /// The backend's own error, if that is what this is
    pub fn application(&self) -> Option<&E> {
        match self {
            CallError::Application(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> Clone for CallError<E> {
    fn clone(&self) -> Self {
        match self {
            CallError::Timeout(d) => CallError::Timeout(*d),
            CallError::Offline { reason } => CallError::Offline {
                reason: reason.clone(),
            },
            CallError::Application(e) => CallError::Application(Arc::clone(e)),
        }
    }
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Timeout(d) => write!(f, "Operation timed out after {}ms", d.as_millis()),
            CallError::Offline { reason } => write!(f, "Backend offline: {}", reason),
            CallError::Application(e) => write!(f, "{}", e),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for CallError<E> {}

/// Tunables for retry, timeout and health probing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub retry_count: u32,
    pub timeout_ms: u64,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub health_interval_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retry_count: 3,
            timeout_ms: 10_000,
            base_backoff_ms: 200,
            max_backoff_ms: 5_000,
            health_interval_ms: 10_000,
            probe_timeout_ms: 5_000,
        }
    }
}

/// Per-call options
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub retry_count: u32,
    pub timeout: Duration,
    pub dedupe_key: Option<String>,
}

impl ExecuteOptions {
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }
}

impl From<&ConnectionConfig> for ExecuteOptions {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            retry_count: config.retry_count,
            timeout: Duration::from_millis(config.timeout_ms),
            dedupe_key: None,
        }
    }
}

/// `min(2^attempt * base, max)`
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

/// Future returned by a health probe
pub type ProbeFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// Lightweight reachability check
pub type Probe = Arc<dyn Fn() -> ProbeFuture + Send + Sync>;

type Listener = Arc<dyn Fn(ConnectionState, Option<&str>) + Send + Sync>;

/// Handle for removing a state listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Health {
    state: ConnectionState,
    last_error: Option<String>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

type Settled = Arc<dyn Any + Send + Sync>;

/// Retry, circuit breaking and request collapsing for backend calls
pub struct ConnectionManager {
    config: ConnectionConfig,
    health: Mutex<Health>,
    inflight: Mutex<HashMap<String, Arc<OnceCell<Settled>>>>,
    probe: Option<Probe>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            health: Mutex::new(Health {
                state: ConnectionState::Healthy,
                last_error: None,
                listeners: Vec::new(),
                next_listener: 0,
            }),
            inflight: Mutex::new(HashMap::new()),
            probe: None,
        }
    }

    /// Attach the reachability check used by health monitoring and
    /// [`retry_now`](Self::retry_now)
    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Default options derived from the config
    pub fn options(&self) -> ExecuteOptions {
        ExecuteOptions::from(&self.config)
    }

    fn health(&self) -> std::sync::MutexGuard<'_, Health> {
        self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.health().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.health().last_error.clone()
    }

    /// Register a listener called synchronously on every state change
    pub fn on_state_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ConnectionState, Option<&str>) + Send + Sync + 'static,
    {
        let mut health = self.health();
        let id = ListenerId(health.next_listener);
        health.next_listener += 1;
        health.listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut health = self.health();
        let before = health.listeners.len();
        health.listeners.retain(|(lid, _)| *lid != id);
        health.listeners.len() != before
    }

    fn set_state(&self, new_state: ConnectionState, error: Option<String>) {
        let listeners: Vec<Listener> = {
            let mut health = self.health();
            health.last_error = error.clone();
            if health.state == new_state {
                return;
            }
            info!(from = %health.state, to = %new_state, error = ?error, "Connection state changed");
            health.state = new_state;
            health.listeners.iter().map(|(_, l)| l.clone()).collect()
        };

        // Listeners run outside the lock so they may query the manager
        for listener in listeners {
            listener(new_state, error.as_deref());
        }
    }

    /// Run a backend call under the manager's policy.
    ///
    /// `op` is invoked once per attempt. Transport failures (per
    /// [`Retryable`]) are retried up to `retry_count` attempts in total;
    /// anything else is returned immediately as
    /// [`CallError::Application`]. A timeout is not retried, since the
    /// call may already have been applied.
    ///
    /// With a dedupe key, callers that overlap share one invocation and
    /// all receive its settled result.
    pub async fn execute<T, E, F, Fut>(
        &self,
        opts: ExecuteOptions,
        mut op: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Clone + Send + Sync + 'static,
        E: Retryable + fmt::Display + Send + Sync + 'static,
    {
        let Some(key) = opts.dedupe_key.clone() else {
            return self.run(&opts, op).await;
        };

        let cell = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            inflight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let settled = cell
            .get_or_init(|| async {
                let result = self.run(&opts, &mut op).await;
                Arc::new(result) as Settled
            })
            .await
            .clone();

        {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            if inflight.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                inflight.remove(&key);
            }
        }

        match settled.downcast_ref::<Result<T, CallError<E>>>() {
            Some(result) => result.clone(),
            None => {
                warn!(key = %key, "Dedupe key shared by calls of different types; running separately");
                self.run(&opts, op).await
            }
        }
    }

    async fn run<T, E, F, Fut>(&self, opts: &ExecuteOptions, mut op: F) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        if self.state() == ConnectionState::Offline {
            let reason = self
                .last_error()
                .unwrap_or_else(|| "backend unreachable".to_string());
            debug!("Circuit open, failing fast");
            return Err(CallError::Offline { reason });
        }

        let attempts = opts.retry_count.max(1);
        let base = Duration::from_millis(self.config.base_backoff_ms);
        let max = Duration::from_millis(self.config.max_backoff_ms);
        let mut last_error = None;

        for attempt in 0..attempts {
            match tokio::time::timeout(opts.timeout, op()).await {
                Err(_) => {
                    warn!(attempt = attempt + 1, timeout_ms = opts.timeout.as_millis() as u64, "Backend call timed out");
                    self.set_state(
                        ConnectionState::Degraded,
                        Some(format!("timed out after {}ms", opts.timeout.as_millis())),
                    );
                    return Err(CallError::Timeout(opts.timeout));
                }
                Ok(Ok(value)) => {
                    self.set_state(ConnectionState::Healthy, None);
                    return Ok(value);
                }
                Ok(Err(e)) if e.is_connection_error() => {
                    let message = e.to_string();
                    warn!(attempt = attempt + 1, attempts, error = %message, "Connection error");
                    last_error = Some(message);

                    if attempt + 1 < attempts {
                        self.set_state(ConnectionState::Degraded, last_error.clone());
                        let delay = backoff_delay(attempt, base, max);
                        debug!(delay_ms = delay.as_millis() as u64, "Retry backoff");
                        tokio::time::sleep(delay).await;
                    }
                }
                Ok(Err(e)) => {
                    // The backend answered, so it is reachable
                    self.set_state(ConnectionState::Healthy, None);
                    return Err(CallError::Application(Arc::new(e)));
                }
            }
        }

        let reason = last_error.unwrap_or_else(|| "retries exhausted".to_string());
        self.set_state(ConnectionState::Offline, Some(reason.clone()));
        Err(CallError::Offline { reason })
    }

    /// Probe the backend. Success restores `Healthy`; failure sets
    /// `Offline` only when `force` is set. Without a probe, a forced check
    /// simply closes the circuit so the next call may try again.
    pub async fn check_health(&self, force: bool) -> bool {
        let Some(probe) = self.probe.clone() else {
            if force {
                self.set_state(ConnectionState::Healthy, None);
            }
            return self.state() == ConnectionState::Healthy;
        };

        let timeout = Duration::from_millis(self.config.probe_timeout_ms);
        let reachable = matches!(tokio::time::timeout(timeout, probe()).await, Ok(true));

        if reachable {
            self.set_state(ConnectionState::Healthy, None);
        } else if force {
            self.set_state(
                ConnectionState::Offline,
                Some("health probe failed".to_string()),
            );
        } else {
            debug!(state = %self.state(), "Health probe failed");
        }
        reachable
    }

    /// User-triggered retry
    pub async fn retry_now(&self) -> bool {
        info!("Manual connection retry");
        self.check_health(true).await
    }

    /// Re-probe on an interval whenever the state is not `Healthy`
    pub fn spawn_health_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = Duration::from_millis(self.config.health_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if manager.state() != ConnectionState::Healthy {
                    manager.check_health(false).await;
                }
            }
        })
    }
}
