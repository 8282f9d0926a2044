// Streaming session client
//
// Orchestrates one metrics stream session:
// - connection lifecycle (connect, read loop, backoff reconnect)
// - frame dispatch into the latest-value cache and the history aggregator
// - the periodic history commit timer
// - event emission to the consumer
// - teardown via CancellationToken so every exit path (EOF, error, dispose)
//   releases the connection and both timers
//
// The connection loop is a single task, so only one attempt is ever in
// flight; the history timer is a second task that runs for the whole session
// regardless of connection state. Cache, pending map and history buffers are
// mutated only from these two tasks; external callers only read.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::{AgentId, AgentMetrics, StreamEvent};
use crate::streaming::cache::MetricsCache;
use crate::streaming::connection::{
    ChunkStream, HttpStreamTransport, ReconnectPolicy, StreamTransport,
};
use crate::streaming::history::{HistoryAggregator, HistoryPoint, DEFAULT_MAX_POINTS};
use crate::streaming::parser::{SseFrame, SseParser};
use crate::streaming::types::{ConnectionState, SessionStats, StreamError};

/// Session configuration
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// API base, e.g. `http://localhost:8080/api`.
    pub base_url: String,
    /// Bearer token sent with the stream request.
    pub access_token: Option<String>,
    /// Bound on each agent's history series.
    pub history_max_points: usize,
    /// History commit tick.
    pub history_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            access_token: None,
            history_max_points: DEFAULT_MAX_POINTS,
            history_interval: Duration::from_millis(1500),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Events emitted to the consumer
#[derive(Debug, Clone)]
pub enum ClientEvent {
    StateChanged { state: ConnectionState },
    /// One dispatch worth of samples: a single update or a whole `init` set.
    MetricsUpdated { samples: Vec<AgentMetrics> },
    /// Retries exhausted; the session is parked until a manual reconnect.
    Terminated { error: String },
}

type EventCallback = Box<dyn Fn(ClientEvent) + Send + Sync>;

/// Client handle for one streaming session.
///
/// Dropping the handle cancels the session. `dispose` does the same
/// explicitly and is the intended teardown path.
pub struct MetricsStreamClient {
    shared: Arc<ClientShared>,
}

struct ClientShared {
    config: StreamClientConfig,
    transport: Arc<dyn StreamTransport>,
    cache: MetricsCache,
    history: HistoryAggregator,
    state: RwLock<ConnectionState>,
    is_running: AtomicBool,
    cancel: CancellationToken,
    reconnect_signal: Notify,
    frames_received: AtomicU64,
    samples_received: AtomicU64,
    dropped_frames: AtomicU64,
    points_committed: AtomicU64,
    reconnects: AtomicU64,
    event_callback: RwLock<Option<EventCallback>>,
}

enum ReadOutcome {
    /// Session teardown; never enters the reconnect path.
    Cancelled,
    /// User-initiated retry; restart immediately with a reset counter.
    ManualReconnect,
    /// EOF or transport fault; enters the backoff path.
    Disconnected,
}

impl MetricsStreamClient {
    pub fn new(config: StreamClientConfig) -> Self {
        let transport = Arc::new(HttpStreamTransport::new(
            config.base_url.clone(),
            config.access_token.clone(),
        ));
        Self::with_transport(config, transport)
    }

    /// Build with a custom transport. This is the seam used by tests.
    pub fn with_transport(config: StreamClientConfig, transport: Arc<dyn StreamTransport>) -> Self {
        let history = HistoryAggregator::new(config.history_max_points);
        Self {
            shared: Arc::new(ClientShared {
                config,
                transport,
                cache: MetricsCache::new(),
                history,
                state: RwLock::new(ConnectionState::Disconnected),
                is_running: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                reconnect_signal: Notify::new(),
                frames_received: AtomicU64::new(0),
                samples_received: AtomicU64::new(0),
                dropped_frames: AtomicU64::new(0),
                points_committed: AtomicU64::new(0),
                reconnects: AtomicU64::new(0),
                event_callback: RwLock::new(None),
            }),
        }
    }

    /// Start the session: spawns the connection loop and the history commit
    /// timer. A second call while running is a no-op.
    pub fn connect(&self, scope: Option<AgentId>) {
        if self.shared.is_running.swap(true, Ordering::SeqCst) {
            log::debug!("connect() ignored: session already running");
            return;
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.run_connection(scope).await });

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.run_history_timer().await });
    }

    /// Register the consumer callback for state changes and sample updates.
    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(ClientEvent) + Send + Sync + 'static,
    {
        *self.shared.event_callback.write() = Some(Box::new(callback));
    }

    /// Most recent sample for an agent, or absence. Never blocks the stream.
    pub fn latest(&self, id: AgentId) -> Option<AgentMetrics> {
        self.shared.cache.get(id)
    }

    pub fn latest_all(&self) -> HashMap<AgentId, AgentMetrics> {
        self.shared.cache.snapshot()
    }

    /// Committed history points for an agent, oldest first.
    pub fn history(&self, id: AgentId) -> Vec<HistoryPoint> {
        self.shared.history.history(id)
    }

    pub fn clear_history(&self, id: AgentId) {
        self.shared.history.clear(id);
    }

    /// Drop all accumulated history, pending values and cached samples.
    pub fn clear_all(&self) {
        self.shared.history.clear_all();
        self.shared.cache.clear();
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames_received: self.shared.frames_received.load(Ordering::Relaxed),
            samples_received: self.shared.samples_received.load(Ordering::Relaxed),
            dropped_frames: self.shared.dropped_frames.load(Ordering::Relaxed),
            points_committed: self.shared.points_committed.load(Ordering::Relaxed),
            reconnects: self.shared.reconnects.load(Ordering::Relaxed),
        }
    }

    /// User-initiated retry: aborts any in-flight attempt or pending backoff
    /// timer, resets the attempt counter and connects immediately. Also
    /// revives a session parked in `Failed`.
    pub fn force_reconnect(&self) {
        self.shared.reconnect_signal.notify_one();
    }

    /// Tear the session down: the connection, the backoff timer and the
    /// history timer all stop, on every exit path. Terminal for this handle.
    pub fn dispose(&self) {
        log::info!("Disposing metrics stream session");
        self.shared.cancel.cancel();
        self.shared.is_running.store(false, Ordering::SeqCst);
    }
}

impl Drop for MetricsStreamClient {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl ClientShared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state.clone();
        self.emit(ClientEvent::StateChanged { state });
    }

    fn emit(&self, event: ClientEvent) {
        if let Some(callback) = self.event_callback.read().as_ref() {
            callback(event);
        }
    }

    /// Connection state machine: Connecting -> Connected -> (backoff)
    /// Reconnecting -> Connecting -> ... until cancelled or exhausted.
    async fn run_connection(self: Arc<Self>, scope: Option<AgentId>) {
        let mut failures: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);

            let opened = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                _ = self.reconnect_signal.notified() => {
                    failures = 0;
                    continue;
                }

                result = self.transport.open(scope) => result,
            };

            match opened {
                Ok(mut stream) => {
                    failures = 0;
                    self.set_state(ConnectionState::Connected);
                    log::info!("Metrics stream connected");

                    match self.read_stream(stream.as_mut()).await {
                        ReadOutcome::Cancelled => break,
                        ReadOutcome::ManualReconnect => {
                            log::info!("Manual reconnect requested");
                            continue;
                        }
                        ReadOutcome::Disconnected => {}
                    }
                }
                Err(StreamError::Cancelled) => break,
                Err(e) => log::warn!("Connect attempt failed: {}", e),
            }

            // Unexpected disconnect or failed handshake: back off.
            if self.config.reconnect.exhausted(failures) {
                let error = StreamError::RetriesExhausted { attempts: failures };
                log::error!("{}", error);
                self.set_state(ConnectionState::Failed { attempts: failures });
                self.emit(ClientEvent::Terminated {
                    error: error.to_string(),
                });

                // Park until the user retries or tears the session down.
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = self.reconnect_signal.notified() => {
                        failures = 0;
                        continue;
                    }
                }
            }

            let delay = self.config.reconnect.delay_for(failures);
            failures += 1;
            self.reconnects.fetch_add(1, Ordering::Relaxed);
            self.set_state(ConnectionState::Reconnecting {
                attempt: failures,
                delay_ms: delay.as_millis() as u64,
            });
            log::info!(
                "Metrics stream lost, reconnecting in {:?} (attempt {})",
                delay,
                failures
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.reconnect_signal.notified() => { failures = 0; }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        log::info!("Metrics stream task stopped");
    }

    async fn read_stream(&self, stream: &mut dyn ChunkStream) -> ReadOutcome {
        let mut parser = SseParser::new();

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return ReadOutcome::Cancelled,

                _ = self.reconnect_signal.notified() => return ReadOutcome::ManualReconnect,

                chunk = stream.next_chunk() => match chunk {
                    Ok(Some(bytes)) => {
                        let text = String::from_utf8_lossy(&bytes);
                        for frame in parser.push(&text) {
                            self.frames_received.fetch_add(1, Ordering::Relaxed);
                            self.dispatch(&frame);
                        }
                    }
                    Ok(None) => {
                        log::info!("Metrics stream closed by server");
                        return ReadOutcome::Disconnected;
                    }
                    Err(e) => {
                        log::warn!("Stream read error: {}", e);
                        return ReadOutcome::Disconnected;
                    }
                }
            }
        }
    }

    fn dispatch(&self, frame: &SseFrame) {
        match StreamEvent::decode(&frame.event, &frame.data) {
            Ok(StreamEvent::Heartbeat) => {}
            Ok(StreamEvent::Init(samples)) => {
                self.cache.reset(samples.clone());
                self.history.record_all(&samples);
                self.samples_received
                    .fetch_add(samples.len() as u64, Ordering::Relaxed);
                self.emit(ClientEvent::MetricsUpdated { samples });
            }
            Ok(StreamEvent::Metrics(sample)) => {
                self.cache.insert(sample.clone());
                self.history.record(&sample);
                self.samples_received.fetch_add(1, Ordering::Relaxed);
                self.emit(ClientEvent::MetricsUpdated {
                    samples: vec![sample],
                });
            }
            Ok(StreamEvent::MetricsAll(samples)) => {
                for sample in &samples {
                    self.cache.insert(sample.clone());
                }
                self.history.record_all(&samples);
                self.samples_received
                    .fetch_add(samples.len() as u64, Ordering::Relaxed);
                self.emit(ClientEvent::MetricsUpdated { samples });
            }
            Ok(StreamEvent::Other) => {
                log::debug!("Ignoring event '{}'", frame.event);
            }
            Err(e) => {
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                log::warn!("Dropping undecodable '{}' frame: {}", frame.event, e);
            }
        }
    }

    /// Periodic history commit, active for the whole session regardless of
    /// connection state. Pending values are not cleared on disconnect, so
    /// commits keep producing points across reconnects.
    async fn run_history_timer(self: Arc<Self>) {
        let period = self.config.history_interval;
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                _ = tick.tick() => {
                    let committed = self.history.commit(Utc::now());
                    if committed > 0 {
                        self.points_committed
                            .fetch_add(committed as u64, Ordering::Relaxed);
                        log::debug!("Committed {} history points", committed);
                    }
                }
            }
        }

        log::debug!("History commit task stopped");
    }
}
