//! Async client for one tournament session.
//!
//! [`TournamentClient`] is a handle around a background session loop. The
//! loop consumes [`LinkEvent`]s from the [`ConnectionManager`], routes push
//! frames onto the [`SessionState`], ticks the match clock and runs the
//! periodic status poll. Foreground actions (answers, ready, start) run on
//! the caller's task and return their errors. Events are emitted on a bounded
//! channel ([`tokio::sync::mpsc::Receiver<TournamentEvent>`]) returned from
//! [`TournamentClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = Arc::new(WebSocketConnector::new("ws://localhost:8000"));
//! let api = Arc::new(HttpApi::new(ApiConfig::new("http://localhost:8000").with_auth_token(token)));
//! let (client, mut events) =
//!     TournamentClient::start(connector, api, TournamentConfig::new().with_self_name("alice"));
//!
//! client.open("5f0c9b2e").await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         TournamentEvent::TournamentStarted { .. } => { /* show the game */ }
//!         TournamentEvent::SessionOver { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::TournamentApi;
use crate::connection::{
    next_tick, ConnectionConfig, ConnectionManager, LinkEvent, LinkState, DEFAULT_RECONNECT_DELAY,
};
use crate::error::{Result, TournamentError};
use crate::event::TournamentEvent;
use crate::notifications::{Notification, NotificationQueue, Severity, DEFAULT_NOTIFICATION_TTL};
use crate::polling::{PollingFallback, DEFAULT_STATUS_POLL_INTERVAL};
use crate::protocol::{
    CreateTournamentRequest, CreateTournamentResponse, JoinTournamentResponse, TournamentId,
    TournamentResults, TournamentStatus,
};
use crate::router::MessageRouter;
use crate::session::{AnswerOutcome, SessionState, StageTransition, DEFAULT_PARTICIPANT_CAPACITY};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default wait between a stage advance and the transcript reset.
pub const DEFAULT_STAGE_TRANSITION_DELAY: Duration = Duration::from_secs(3);

/// Match clock resolution.
const CLOCK_TICK: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`TournamentClient`].
///
/// Every field has a default. `self_name` should be set for registered
/// users so the client can tell its own progress events from opponents'.
/// Guests get it from [`TournamentClient::join_as_guest`].
///
/// # Example
///
/// ```
/// use tournament_sync_client::client::TournamentConfig;
/// use std::time::Duration;
///
/// let config = TournamentConfig::new()
///     .with_self_name("alice")
///     .with_status_poll_interval(None)
///     .with_event_channel_capacity(0);
/// assert_eq!(config.self_name.as_deref(), Some("alice"));
/// assert_eq!(config.reconnect_delay, Duration::from_secs(3));
/// assert_eq!(config.event_channel_capacity, 1);
/// ```
#[derive(Debug, Clone)]
pub struct TournamentConfig {
    /// Username or guest name of this client.
    pub self_name: Option<String>,
    /// Fixed wait before reconnecting a dropped push channel.
    ///
    /// Defaults to **3 seconds**.
    pub reconnect_delay: Duration,
    /// Wait between a stage advance and the fresh transcript for the new
    /// stage.
    ///
    /// Defaults to **3 seconds**.
    pub stage_transition_delay: Duration,
    /// Lifetime of a notice.
    ///
    /// Defaults to **3 seconds**.
    pub notification_ttl: Duration,
    /// Period of the background status poll. `None` disables it.
    ///
    /// Defaults to **10 seconds**.
    pub status_poll_interval: Option<Duration>,
    /// Keepalive ping period on the push channel. `None` disables it.
    ///
    /// Defaults to `None`.
    pub keepalive_interval: Option<Duration>,
    /// Participant capacity assumed until the service reports one.
    ///
    /// Defaults to **2**. Not enforced client-side.
    pub default_capacity: usize,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped with a warning.
    /// `Disconnected` and `SessionOver` are always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl TournamentConfig {
    pub fn new() -> Self {
        Self {
            self_name: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            stage_transition_delay: DEFAULT_STAGE_TRANSITION_DELAY,
            notification_ttl: DEFAULT_NOTIFICATION_TTL,
            status_poll_interval: Some(DEFAULT_STATUS_POLL_INTERVAL),
            keepalive_interval: None,
            default_capacity: DEFAULT_PARTICIPANT_CAPACITY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_self_name(mut self, name: impl Into<String>) -> Self {
        self.self_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn with_stage_transition_delay(mut self, delay: Duration) -> Self {
        self.stage_transition_delay = delay;
        self
    }

    #[must_use]
    pub fn with_notification_ttl(mut self, ttl: Duration) -> Self {
        self.notification_ttl = ttl;
        self
    }

    /// `None` (or a zero interval) disables the poll.
    #[must_use]
    pub fn with_status_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.status_poll_interval = interval.filter(|d| !d.is_zero());
        self
    }

    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval.filter(|d| !d.is_zero());
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_default_capacity(mut self, capacity: usize) -> Self {
        self.default_capacity = capacity.max(1);
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    fn connection_config(&self) -> ConnectionConfig {
        let config = ConnectionConfig::new().with_reconnect_delay(self.reconnect_delay);
        match self.keepalive_interval {
            Some(interval) => config.with_keepalive_interval(interval),
            None => config,
        }
    }
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// The open tournament and the link generation its events must carry.
struct Current {
    tournament_id: TournamentId,
    generation: u64,
    router: MessageRouter,
}

struct Session {
    state: SessionState,
    current: Option<Current>,
}

/// State shared between the handle, the session loop and timer tasks.
struct Shared {
    session: Mutex<Session>,
    connections: ConnectionManager,
    polling: PollingFallback,
    notices: NotificationQueue,
    events: mpsc::Sender<TournamentEvent>,
    transition_task: StdMutex<Option<JoinHandle<()>>>,
    stage_transition_delay: Duration,
    running: AtomicBool,
}

impl Shared {
    /// `true` if `(tournament_id, generation)` is the open session and its
    /// link has not been torn down.
    fn is_live(&self, session: &Session, tournament_id: &str, generation: u64) -> bool {
        session.current.as_ref().is_some_and(|c| {
            c.tournament_id == tournament_id && c.generation == generation
        }) && self.connections.is_live(tournament_id, generation)
    }

    async fn current(&self) -> Option<(TournamentId, u64)> {
        let session = self.session.lock().await;
        session
            .current
            .as_ref()
            .map(|c| (c.tournament_id.clone(), c.generation))
    }

    /// Fetch the status snapshot and apply it if the session is still live.
    async fn reconcile_status(&self, tournament_id: &str, generation: u64) {
        let Some(snapshot) = self.polling.fetch_status(tournament_id).await else {
            return;
        };
        let mut session = self.session.lock().await;
        if !self.is_live(&session, tournament_id, generation) {
            debug!(tournament_id, generation, "status snapshot for a closed session discarded");
            return;
        }
        let was_terminal = session.state.is_terminal();
        session.state.hydrate(&snapshot);
        let status = session.state.status();
        let ended = (!was_terminal && session.state.is_terminal())
            .then(|| session.state.outcome().cloned())
            .flatten();
        drop(session);

        self.emit(TournamentEvent::Hydrated { status }).await;
        if let Some(outcome) = ended {
            self.cancel_transition();
            self.emit(TournamentEvent::SessionOver {
                winner: outcome.winner,
                final_score: outcome.final_score,
                won: outcome.won,
            })
            .await;
        }
    }

    /// Fetch the leaderboard and apply it if the session is still live.
    async fn reconcile_leaderboard(&self, tournament_id: &str, generation: u64) {
        let Some(entries) = self.polling.fetch_leaderboard(tournament_id).await else {
            return;
        };
        let mut session = self.session.lock().await;
        if !self.is_live(&session, tournament_id, generation) {
            debug!(tournament_id, generation, "leaderboard for a closed session discarded");
            return;
        }
        session.state.replace_leaderboard(entries);
        drop(session);
        self.emit(TournamentEvent::LeaderboardUpdated).await;
    }

    fn schedule_transition(self: &Arc<Self>, tournament_id: TournamentId, generation: u64, t: StageTransition) {
        let shared = Arc::clone(self);
        let delay = self.stage_transition_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut session = shared.session.lock().await;
            if !shared.is_live(&session, &tournament_id, generation) {
                return;
            }
            if session.state.finish_stage_transition(t.seq) {
                drop(session);
                debug!(%tournament_id, stage = t.to, "stage transcript reset");
                shared
                    .emit(TournamentEvent::StageTranscriptReset { stage: t.to })
                    .await;
            }
        });
        let previous = self
            .transition_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn cancel_transition(&self) {
        let task = self
            .transition_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }

    fn notify(&self, message: impl Into<String>, severity: Severity) -> TournamentEvent {
        let message = message.into();
        let id = self.notices.push(message.clone(), severity);
        TournamentEvent::Notice(Notification {
            id,
            message,
            severity,
        })
    }

    /// Emit an event. If the channel is full, log a warning and drop the
    /// event so the session loop never blocks on a slow consumer.
    /// `Disconnected` and `SessionOver` wait for room instead.
    async fn emit(&self, event: TournamentEvent) {
        if matches!(
            event,
            TournamentEvent::Disconnected { .. } | TournamentEvent::SessionOver { .. }
        ) {
            if self.events.send(event).await.is_err() {
                debug!("event channel closed, receiver dropped");
            }
            return;
        }
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("event channel full, dropping event: {dropped:?}");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a tournament session client.
///
/// Created via [`TournamentClient::start`], which spawns the background
/// session loop and returns this handle together with an event receiver.
pub struct TournamentClient {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl TournamentClient {
    /// Start the session loop and return a handle plus event receiver.
    ///
    /// No tournament is open yet; call [`open`](Self::open).
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        connector: Arc<dyn crate::transport::Connector>,
        api: Arc<dyn TournamentApi>,
        config: TournamentConfig,
    ) -> (Self, mpsc::Receiver<TournamentEvent>) {
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<TournamentEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (connections, link_rx) = ConnectionManager::new(connector, config.connection_config());

        let shared = Arc::new(Shared {
            session: Mutex::new(Session {
                state: SessionState::new(config.default_capacity, config.self_name.clone()),
                current: None,
            }),
            connections,
            polling: PollingFallback::new(api),
            notices: NotificationQueue::new(config.notification_ttl),
            events: event_tx,
            transition_task: StdMutex::new(None),
            stage_transition_delay: config.stage_transition_delay,
            running: AtomicBool::new(true),
        });

        let task = tokio::spawn(session_loop(
            Arc::clone(&shared),
            link_rx,
            shutdown_rx,
            config.status_poll_interval,
        ));

        let client = Self {
            shared,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (client, event_rx)
    }

    // ── Session lifecycle ───────────────────────────────────────────

    /// Open `tournament_id`: leave any current session, connect the push
    /// channel, hydrate from the status endpoint and load the leaderboard.
    ///
    /// A failed hydration is logged and retried by the status poll; it does
    /// not fail `open`.
    ///
    /// # Errors
    ///
    /// [`TournamentError::NotConnected`] after shutdown,
    /// [`TournamentError::InvalidUrl`] for an empty id.
    pub async fn open(&self, tournament_id: &str) -> Result<()> {
        self.ensure_running()?;
        if tournament_id.is_empty() {
            return Err(TournamentError::InvalidUrl("empty tournament id".into()));
        }
        self.leave().await;

        let generation = {
            let mut session = self.shared.session.lock().await;
            let generation = self.shared.connections.connect(tournament_id);
            session.current = Some(Current {
                tournament_id: tournament_id.to_string(),
                generation,
                router: MessageRouter::new(tournament_id),
            });
            generation
        };
        info!(tournament_id, generation, "tournament session opened");

        self.shared.reconcile_status(tournament_id, generation).await;
        self.shared
            .reconcile_leaderboard(tournament_id, generation)
            .await;
        Ok(())
    }

    /// Close the open tournament: disconnect, cancel timers, clear notices
    /// and reset the session. Late results for it are discarded.
    pub async fn leave(&self) {
        let left = {
            let mut session = self.shared.session.lock().await;
            let left = session.current.take();
            session.state.reset();
            left
        };
        self.shared.cancel_transition();
        self.shared.notices.clear();
        if let Some(current) = left {
            self.shared.connections.disconnect(&current.tournament_id);
            info!(tournament_id = %current.tournament_id, "tournament session left");
        }
    }

    // ── Foreground actions ──────────────────────────────────────────

    /// Submit an answer for the current stage and apply the server's result.
    ///
    /// On success the transcript, score, keys and stage are replaced from the
    /// response. A stage advance schedules the transcript reset after the
    /// configured delay.
    ///
    /// # Errors
    ///
    /// [`TournamentError::EmptyMessage`], [`TournamentError::NoActiveSession`],
    /// [`TournamentError::SessionEnded`] if the match was already over, or the
    /// REST error. On error the session is unchanged. If the match ends while
    /// the request is in flight the result is not applied and the returned
    /// outcome has `terminal` set.
    pub async fn submit_answer(&self, message: &str) -> Result<AnswerOutcome> {
        self.ensure_running()?;
        let message = message.trim();
        if message.is_empty() {
            return Err(TournamentError::EmptyMessage);
        }
        let (tournament_id, generation) = {
            let session = self.shared.session.lock().await;
            let current = session.current.as_ref().ok_or(TournamentError::NoActiveSession)?;
            if session.state.is_terminal() {
                return Err(TournamentError::SessionEnded);
            }
            (current.tournament_id.clone(), current.generation)
        };

        let response = self
            .shared
            .polling
            .api()
            .submit_answer(&tournament_id, message)
            .await?;

        let (outcome, ended) = {
            let mut session = self.shared.session.lock().await;
            if !self.shared.is_live(&session, &tournament_id, generation) {
                debug!(%tournament_id, "answer result for a closed session discarded");
                return Err(TournamentError::NoActiveSession);
            }
            let Some(outcome) = session.state.apply_answer_result(message, &response) else {
                debug!(%tournament_id, "session ended while the answer was in flight");
                return Ok(session.state.settled_outcome(&response));
            };
            let ended = outcome
                .terminal
                .then(|| session.state.outcome().cloned())
                .flatten();
            (outcome, ended)
        };
        debug!(%tournament_id, status = ?outcome.status, score = outcome.score, "answer applied");

        if !outcome.new_keys.is_empty() {
            self.shared
                .emit(TournamentEvent::KeysAcquired {
                    keys: outcome.new_keys.clone(),
                })
                .await;
        }
        if let Some(t) = outcome.transition {
            info!(%tournament_id, from = t.from, to = t.to, "stage completed");
            self.shared
                .emit(TournamentEvent::StageTransition {
                    from: t.from,
                    to: t.to,
                    score: t.score,
                })
                .await;
            self.shared
                .schedule_transition(tournament_id.clone(), generation, t);
        }
        if let Some(end) = ended {
            self.shared.cancel_transition();
            let notice = self
                .shared
                .notify("🏆 Congratulations! You won the tournament!", Severity::Success);
            self.shared.emit(notice).await;
            self.shared
                .emit(TournamentEvent::SessionOver {
                    winner: end.winner,
                    final_score: end.final_score,
                    won: end.won,
                })
                .await;
        }
        Ok(outcome)
    }

    /// Flip our ready flag. Returns the flag the service confirmed.
    ///
    /// # Errors
    ///
    /// [`TournamentError::NoActiveSession`], [`TournamentError::SessionEnded`],
    /// or the REST error.
    pub async fn toggle_ready(&self) -> Result<bool> {
        self.ensure_running()?;
        let (tournament_id, generation, desired) = {
            let session = self.shared.session.lock().await;
            let current = session.current.as_ref().ok_or(TournamentError::NoActiveSession)?;
            if session.state.is_terminal() {
                return Err(TournamentError::SessionEnded);
            }
            (
                current.tournament_id.clone(),
                current.generation,
                !session.state.self_ready(),
            )
        };

        let response = self
            .shared
            .polling
            .api()
            .set_ready(&tournament_id, desired)
            .await?;

        let mut session = self.shared.session.lock().await;
        if self.shared.is_live(&session, &tournament_id, generation) {
            session.state.set_self_ready(response.is_ready);
        }
        Ok(response.is_ready)
    }

    /// Ask the service to start the match. Only the host may do this.
    ///
    /// # Errors
    ///
    /// [`TournamentError::NotHost`] when we know we are not the host,
    /// [`TournamentError::NoActiveSession`], [`TournamentError::SessionEnded`],
    /// or the REST error.
    pub async fn start_match(&self) -> Result<()> {
        self.ensure_running()?;
        let (tournament_id, generation) = {
            let session = self.shared.session.lock().await;
            let current = session.current.as_ref().ok_or(TournamentError::NoActiveSession)?;
            if session.state.is_terminal() {
                return Err(TournamentError::SessionEnded);
            }
            if session.state.is_host() == Some(false) {
                return Err(TournamentError::NotHost);
            }
            (current.tournament_id.clone(), current.generation)
        };

        self.shared.polling.api().start(&tournament_id).await?;

        let started = {
            let mut session = self.shared.session.lock().await;
            (self.shared.is_live(&session, &tournament_id, generation)
                && session.state.mark_started(None, None))
            .then(|| {
                (
                    session.state.game().current_stage,
                    session.state.game().time_remaining,
                )
            })
        };
        if let Some((stage, time_limit)) = started {
            self.shared
                .emit(TournamentEvent::TournamentStarted { stage, time_limit })
                .await;
        }
        Ok(())
    }

    /// Create a tournament. Open it with the returned id.
    ///
    /// # Errors
    ///
    /// Returns the REST error.
    pub async fn create_tournament(
        &self,
        request: &CreateTournamentRequest,
    ) -> Result<CreateTournamentResponse> {
        self.ensure_running()?;
        self.shared.polling.api().create(request).await
    }

    /// Join a tournament by room code as the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns the REST error.
    pub async fn join_tournament(&self, room_code: &str) -> Result<JoinTournamentResponse> {
        self.ensure_running()?;
        self.shared.polling.api().join(room_code.trim()).await
    }

    /// Join a tournament by room code as a guest. On success `guest_name`
    /// becomes this client's self name.
    ///
    /// # Errors
    ///
    /// Returns the REST error.
    pub async fn join_as_guest(
        &self,
        room_code: &str,
        guest_name: &str,
    ) -> Result<JoinTournamentResponse> {
        self.ensure_running()?;
        let guest_name = guest_name.trim();
        let response = self
            .shared
            .polling
            .api()
            .join_guest(room_code.trim(), guest_name)
            .await?;
        self.shared
            .session
            .lock()
            .await
            .state
            .set_self_name(guest_name);
        Ok(response)
    }

    /// Final results of the open tournament. Does not change the session.
    ///
    /// # Errors
    ///
    /// [`TournamentError::NoActiveSession`] or the REST error.
    pub async fn results(&self) -> Result<TournamentResults> {
        self.ensure_running()?;
        let (tournament_id, _) = self
            .shared
            .current()
            .await
            .ok_or(TournamentError::NoActiveSession)?;
        self.shared.polling.api().results(&tournament_id).await
    }

    /// Shut down the client: close the push channel and stop the loop.
    ///
    /// After calling this method, the event receiver will yield `None` once
    /// every handle to the channel is gone.
    pub async fn shutdown(&mut self) {
        debug!("TournamentClient: shutdown requested");
        self.shared.running.store(false, Ordering::Release);

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.shared.cancel_transition();
        self.shared.notices.clear();
        self.shared.connections.disconnect_all();
    }

    // ── View models ─────────────────────────────────────────────────

    /// A snapshot of the session for rendering.
    pub async fn session(&self) -> SessionState {
        self.shared.session.lock().await.state.clone()
    }

    /// Live notices, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.shared.notices.list()
    }

    /// Id of the open tournament, if any.
    pub async fn current_tournament(&self) -> Option<TournamentId> {
        self.shared.current().await.map(|(id, _)| id)
    }

    /// Returns `true` if the push channel of the open tournament is up.
    pub async fn is_connected(&self) -> bool {
        match self.shared.current().await {
            Some((id, _)) => self.shared.connections.link_state(&id) == Some(LinkState::Open),
            None => false,
        }
    }

    /// Returns `true` until [`shutdown`](Self::shutdown) is called.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Connection attempts for the open tournament's current link.
    pub async fn connect_attempts(&self) -> u32 {
        match self.shared.current().await {
            Some((id, _)) => self.shared.connections.connect_attempts(&id),
            None => 0,
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(TournamentError::NotConnected)
        }
    }
}

impl std::fmt::Debug for TournamentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TournamentClient")
            .field("running", &self.is_running())
            .field("connections", &self.shared.connections)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for TournamentClient {
    fn drop(&mut self) {
        // `Drop` cannot await a graceful shutdown. Abort the loop and the
        // timers; dropping the loop drops its background fetches too.
        self.shared.running.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.shared.cancel_transition();
        self.shared.connections.disconnect_all();
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Background loop multiplexing link events, the clock and the status poll.
///
/// Exits on the shutdown signal or when the link event channel closes.
async fn session_loop(
    shared: Arc<Shared>,
    mut link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    status_poll_interval: Option<Duration>,
) {
    debug!("session loop started");

    let mut clock = tokio::time::interval_at(Instant::now() + CLOCK_TICK, CLOCK_TICK);
    clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut poll = status_poll_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let mut background: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let open = shared.session.lock().await.current.is_some();
                shared.connections.disconnect_all();
                if open {
                    shared
                        .emit(TournamentEvent::Disconnected {
                            reason: Some("client shut down".into()),
                        })
                        .await;
                }
                break;
            }

            event = link_rx.recv() => {
                match event {
                    Some(event) => handle_link_event(&shared, event, &mut background).await,
                    None => {
                        debug!("link event channel closed");
                        break;
                    }
                }
            }

            _ = clock.tick() => {
                let mut session = shared.session.lock().await;
                if session.current.is_some() && session.state.status() == TournamentStatus::Active {
                    session.state.tick(1);
                }
            }

            () = next_tick(&mut poll) => {
                let due = {
                    let session = shared.session.lock().await;
                    match &session.current {
                        Some(c) if !session.state.is_terminal() => {
                            Some((c.tournament_id.clone(), c.generation))
                        }
                        _ => None,
                    }
                };
                if let Some((tournament_id, generation)) = due {
                    let shared = Arc::clone(&shared);
                    background.spawn(async move {
                        shared.reconcile_status(&tournament_id, generation).await;
                    });
                }
            }

            Some(joined) = background.join_next(), if !background.is_empty() => {
                if let Err(e) = joined {
                    if !e.is_cancelled() {
                        warn!("background fetch failed: {e}");
                    }
                }
            }
        }
    }

    background.abort_all();
    debug!("session loop exited");
}

async fn handle_link_event(shared: &Arc<Shared>, event: LinkEvent, background: &mut JoinSet<()>) {
    match event {
        LinkEvent::Opened {
            tournament_id,
            generation,
            reconnect,
        } => {
            if !shared.is_live(&*shared.session.lock().await, &tournament_id, generation) {
                return;
            }
            shared.emit(TournamentEvent::Connected { reconnect }).await;
            if reconnect {
                // Missed pushes are not replayed; pull the truth instead.
                let shared = Arc::clone(shared);
                background.spawn(async move {
                    shared.reconcile_status(&tournament_id, generation).await;
                    shared.reconcile_leaderboard(&tournament_id, generation).await;
                });
            }
        }

        LinkEvent::Frame {
            tournament_id,
            generation,
            message,
        } => {
            let dispatch = {
                let mut guard = shared.session.lock().await;
                if !shared.is_live(&guard, &tournament_id, generation) {
                    debug!(%tournament_id, generation, kind = message.kind(), "frame for a closed session discarded");
                    return;
                }
                let Session { state, current } = &mut *guard;
                let Some(current) = current.as_ref() else {
                    return;
                };
                current.router.route(message, state, &shared.notices)
            };

            if dispatch.session_over {
                shared.cancel_transition();
            }
            for event in dispatch.events {
                shared.emit(event).await;
            }
            if dispatch.refresh_leaderboard {
                let shared = Arc::clone(shared);
                background.spawn(async move {
                    shared.reconcile_leaderboard(&tournament_id, generation).await;
                });
            }
        }

        LinkEvent::Closed {
            tournament_id,
            generation,
            reason,
        } => {
            if !shared.is_live(&*shared.session.lock().await, &tournament_id, generation) {
                return;
            }
            shared.emit(TournamentEvent::Disconnected { reason }).await;
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = TournamentConfig::default();
        assert!(config.self_name.is_none());
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.stage_transition_delay, Duration::from_secs(3));
        assert_eq!(config.notification_ttl, Duration::from_secs(3));
        assert_eq!(config.status_poll_interval, Some(Duration::from_secs(10)));
        assert!(config.keepalive_interval.is_none());
        assert_eq!(config.default_capacity, 2);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn zero_intervals_disable_timers() {
        let config = TournamentConfig::new()
            .with_status_poll_interval(Some(Duration::ZERO))
            .with_keepalive_interval(Some(Duration::ZERO))
            .with_default_capacity(0);
        assert!(config.status_poll_interval.is_none());
        assert!(config.keepalive_interval.is_none());
        assert_eq!(config.default_capacity, 1);
    }

    #[test]
    fn connection_config_carries_reconnect_and_keepalive() {
        let config = TournamentConfig::new()
            .with_reconnect_delay(Duration::from_millis(500))
            .with_keepalive_interval(Some(Duration::from_secs(15)))
            .connection_config();
        assert_eq!(config.reconnect_delay, Duration::from_millis(500));
        assert_eq!(config.keepalive_interval, Some(Duration::from_secs(15)));
    }
}
