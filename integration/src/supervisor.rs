//! ConnectionSupervisor (component C9): reconnect loop with exponential
//! backoff + jitter, a heartbeat monitor, warm-up, and cooperative pause/resume.

use parking_lot::Mutex;
use quoteflow_data::wire::ConnectionStatus;
use std::{
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    time::Duration,
};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_fraction: f64,
    /// `None` means unlimited attempts.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter_fraction: 0.25,
            max_attempts: Some(10),
        }
    }
}

impl ReconnectPolicy {
    /// `delay_n = min(base * multiplier^(n-1), max)`, plus uniform jitter in
    /// `[0, delay_n * jitter_fraction]`. `attempt` is 1-based.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64();
        let scaled = base * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        let jitter_max = capped * self.jitter_fraction;
        let jitter = rand::random::<f64>() * jitter_max.max(0.0);
        Duration::from_secs_f64(capped + jitter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
        }
    }
}

/// The full external connection configuration surface a caller supplies when
/// wiring an adapter: endpoint, identity, and the two supervised behaviors
/// (auto-reconnect, heartbeat) each with its own on/off switch plus policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub enable_auto_reconnect: bool,
    pub enable_heartbeat: bool,
    pub reconnect: ReconnectPolicy,
    pub heartbeat: HeartbeatConfig,
}

/// Latency statistics from a [`ConnectionSupervisor::warm_up`] run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarmUpStats {
    pub iterations: u32,
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    Success,
    Failed,
    AttemptsExhausted,
    Canceled,
}

/// Drives the reconnect state machine for a single logical connection. The
/// caller supplies the actual `connect` and `liveness probe` behavior as
/// async closures; this type owns only the state machine, backoff policy,
/// and pause/resume/cancellation plumbing.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    state: Mutex<ConnectionState>,
    policy: ReconnectPolicy,
    heartbeat: HeartbeatConfig,
    auto_reconnect: bool,
    heartbeat_enabled: bool,
    paused: AtomicBool,
    attempt: AtomicU32,
}

impl ConnectionSupervisor {
    pub fn new(policy: ReconnectPolicy, heartbeat: HeartbeatConfig) -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            policy,
            heartbeat,
            auto_reconnect: true,
            heartbeat_enabled: true,
            paused: AtomicBool::new(false),
            attempt: AtomicU32::new(0),
        }
    }

    /// Builds a supervisor from the full `{host, port, client_id,
    /// enable_auto_reconnect, enable_heartbeat, reconnect, heartbeat}`
    /// connection configuration surface. The `enable_*` flags are exposed via
    /// [`Self::auto_reconnect_enabled`]/[`Self::heartbeat_enabled`] for the
    /// caller driving [`Self::run`]/[`Self::monitor_heartbeat`] to check
    /// before spawning either loop; `host`/`port`/`client_id` are transport
    /// addressing, consumed by the adapter's own connect closure rather than
    /// by the supervisor itself.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            policy: config.reconnect,
            heartbeat: config.heartbeat,
            auto_reconnect: config.enable_auto_reconnect,
            heartbeat_enabled: config.enable_heartbeat,
            paused: AtomicBool::new(false),
            attempt: AtomicU32::new(0),
        }
    }

    /// Whether this supervisor was configured to run the reconnect loop at
    /// all (`enable_auto_reconnect` from its [`ConnectionConfig`]).
    pub fn auto_reconnect_enabled(&self) -> bool {
        self.auto_reconnect
    }

    /// Whether this supervisor was configured to run heartbeat monitoring
    /// (`enable_heartbeat` from its [`ConnectionConfig`]).
    pub fn heartbeat_enabled(&self) -> bool {
        self.heartbeat_enabled
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Runs the reconnect loop until `connect` succeeds, attempts are
    /// exhausted, or `cancel` fires. `connect` returns `Ok(())` on success.
    pub async fn run<F, Fut>(&self, mut connect: F, mut cancel: watch::Receiver<bool>) -> ReconnectOutcome
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(), String>>,
    {
        loop {
            if *cancel.borrow() {
                return ReconnectOutcome::Canceled;
            }

            while self.is_paused() {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                    _ = cancel.changed() => {
                        if *cancel.borrow() {
                            return ReconnectOutcome::Canceled;
                        }
                    }
                }
            }

            *self.state.lock() = ConnectionState::Connecting;
            let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
            info!(attempt, "OnReconnectionAttempt");

            match connect().await {
                Ok(()) => {
                    info!(attempt, "OnReconnectionSuccess");
                    *self.state.lock() = ConnectionState::Connected;
                    self.attempt.store(0, Ordering::SeqCst);
                    return ReconnectOutcome::Success;
                }
                Err(reason) => {
                    warn!(attempt, %reason, "OnReconnectionFailed");
                    if let Some(max) = self.policy.max_attempts {
                        if attempt >= max {
                            *self.state.lock() = ConnectionState::Disconnected;
                            return ReconnectOutcome::AttemptsExhausted;
                        }
                    }
                }
            }

            *self.state.lock() = ConnectionState::Waiting;
            let delay = self.policy.delay_for_attempt(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        return ReconnectOutcome::Canceled;
                    }
                }
            }
        }
    }

    /// Signals loss of connection, transitioning `Connected -> Waiting` so the
    /// next call to [`Self::run`] resumes the reconnect loop.
    pub fn notify_connection_lost(&self) {
        *self.state.lock() = ConnectionState::Waiting;
    }

    /// Consumes an adapter's `on_status(ConnectionStatus)` callback, mapping
    /// the vendor-facing status onto this supervisor's own state machine.
    /// `Connected` also resets the attempt counter, matching what
    /// [`Self::run`] does on a successful `connect`. `Faulted` is treated the
    /// same as an observed connection loss, so the next `run` call reconnects
    /// without waiting on a full heartbeat-timeout cycle to notice.
    pub fn on_status(&self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Disconnected => *self.state.lock() = ConnectionState::Disconnected,
            ConnectionStatus::Connecting => *self.state.lock() = ConnectionState::Connecting,
            ConnectionStatus::Connected => {
                *self.state.lock() = ConnectionState::Connected;
                self.attempt.store(0, Ordering::SeqCst);
            }
            ConnectionStatus::Reconnecting => *self.state.lock() = ConnectionState::Waiting,
            ConnectionStatus::Faulted => self.notify_connection_lost(),
        }
    }

    /// Runs `probe` on the configured heartbeat interval until `cancel` fires,
    /// returning the number of consecutive failures observed at exit.
    /// Consecutive failures beyond `consecutive_failure_limit` trigger
    /// [`Self::notify_connection_lost`] without waiting for the next heartbeat.
    pub async fn monitor_heartbeat<F, Fut>(
        &self,
        mut probe: F,
        consecutive_failure_limit: u32,
        mut cancel: watch::Receiver<bool>,
    ) -> u32
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let mut consecutive_failures = 0u32;
        let mut interval = tokio::time::interval(self.heartbeat.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let probe_fut = probe();
                    let ok = tokio::time::timeout(self.heartbeat.timeout, probe_fut)
                        .await
                        .unwrap_or(false);
                    if ok {
                        consecutive_failures = 0;
                    } else {
                        consecutive_failures += 1;
                        if consecutive_failures >= consecutive_failure_limit {
                            self.notify_connection_lost();
                            return consecutive_failures;
                        }
                    }
                }
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        return consecutive_failures;
                    }
                }
            }
        }
    }

    /// Executes `iterations` lightweight request/response round trips (default
    /// 5), reporting min/max/avg latency. Intended to prime the link before
    /// market open.
    pub async fn warm_up<F, Fut>(&self, iterations: u32, mut probe: F) -> WarmUpStats
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Duration>,
    {
        let mut min = Duration::MAX;
        let mut max = Duration::ZERO;
        let mut total = Duration::ZERO;

        for _ in 0..iterations {
            let elapsed = probe().await;
            min = min.min(elapsed);
            max = max.max(elapsed);
            total += elapsed;
        }

        let avg = if iterations > 0 {
            total / iterations
        } else {
            Duration::ZERO
        };

        WarmUpStats {
            iterations,
            min: if iterations > 0 { min } else { Duration::ZERO },
            max,
            avg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as Counter;
    use std::sync::Arc;

    #[test]
    fn delay_for_attempt_is_capped_at_max_delay() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_fraction: 0.0,
            max_attempts: None,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn run_succeeds_on_first_attempt() {
        let supervisor = ConnectionSupervisor::new(ReconnectPolicy::default(), HeartbeatConfig::default());
        let (_tx, rx) = watch::channel(false);
        let outcome = supervisor.run(|| async { Ok(()) }, rx).await;
        assert_eq!(outcome, ReconnectOutcome::Success);
        assert_eq!(supervisor.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn run_exhausts_attempts_and_reports_failure() {
        let supervisor = ConnectionSupervisor::new(
            ReconnectPolicy {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                multiplier: 1.0,
                jitter_fraction: 0.0,
                max_attempts: Some(3),
            },
            HeartbeatConfig::default(),
        );
        let (_tx, rx) = watch::channel(false);
        let outcome = supervisor
            .run(|| async { Err::<(), _>("down".to_string()) }, rx)
            .await;
        assert_eq!(outcome, ReconnectOutcome::AttemptsExhausted);
    }

    #[tokio::test]
    async fn cancel_signal_stops_the_loop() {
        let supervisor = ConnectionSupervisor::new(
            ReconnectPolicy {
                initial_delay: Duration::from_secs(60),
                ..ReconnectPolicy::default()
            },
            HeartbeatConfig::default(),
        );
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let outcome = supervisor
            .run(|| async { Err::<(), _>("down".to_string()) }, rx)
            .await;
        assert_eq!(outcome, ReconnectOutcome::Canceled);
    }

    #[tokio::test]
    async fn warm_up_reports_iteration_count_and_stats() {
        let supervisor = ConnectionSupervisor::new(ReconnectPolicy::default(), HeartbeatConfig::default());
        let stats = supervisor
            .warm_up(5, || async { Duration::from_millis(10) })
            .await;
        assert_eq!(stats.iterations, 5);
        assert_eq!(stats.min, Duration::from_millis(10));
        assert_eq!(stats.max, Duration::from_millis(10));
    }

    #[test]
    fn from_config_carries_reconnect_and_heartbeat_policy_and_enable_flags() {
        let config = ConnectionConfig {
            host: "md.example.com".to_string(),
            port: 443,
            client_id: "desk-7".to_string(),
            enable_auto_reconnect: false,
            enable_heartbeat: true,
            reconnect: ReconnectPolicy {
                max_attempts: Some(1),
                ..ReconnectPolicy::default()
            },
            heartbeat: HeartbeatConfig::default(),
        };
        let supervisor = ConnectionSupervisor::from_config(&config);
        assert!(!supervisor.auto_reconnect_enabled());
        assert!(supervisor.heartbeat_enabled());
        assert_eq!(supervisor.policy.max_attempts, Some(1));
    }

    #[test]
    fn on_status_maps_vendor_status_onto_the_state_machine() {
        let supervisor = ConnectionSupervisor::new(ReconnectPolicy::default(), HeartbeatConfig::default());

        supervisor.on_status(ConnectionStatus::Connecting);
        assert_eq!(supervisor.state(), ConnectionState::Connecting);

        supervisor.on_status(ConnectionStatus::Connected);
        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert_eq!(supervisor.attempt.load(Ordering::SeqCst), 0);

        supervisor.on_status(ConnectionStatus::Reconnecting);
        assert_eq!(supervisor.state(), ConnectionState::Waiting);

        supervisor.on_status(ConnectionStatus::Faulted);
        assert_eq!(supervisor.state(), ConnectionState::Waiting);

        supervisor.on_status(ConnectionStatus::Disconnected);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn heartbeat_failure_triggers_connection_lost_at_threshold() {
        let supervisor = Arc::new(ConnectionSupervisor::new(
            ReconnectPolicy::default(),
            HeartbeatConfig {
                interval: Duration::from_millis(1),
                timeout: Duration::from_millis(50),
            },
        ));
        *supervisor.state.lock() = ConnectionState::Connected;
        let failures = Arc::new(Counter::new(0));
        let failures2 = failures.clone();
        let (_tx, rx) = watch::channel(false);

        let result = supervisor
            .monitor_heartbeat(
                move || {
                    failures2.fetch_add(1, Ordering::SeqCst);
                    async { false }
                },
                2,
                rx,
            )
            .await;

        assert_eq!(result, 2);
        assert_eq!(supervisor.state(), ConnectionState::Waiting);
    }
}
