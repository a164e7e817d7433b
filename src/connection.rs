//! One push connection per tournament id, with fixed-delay reconnect.
//!
//! [`ConnectionManager::connect`] spawns a single task per tournament id. That
//! task owns the transport, decodes every text frame into a
//! [`PushMessage`] and forwards it as a [`LinkEvent`]. When the transport
//! closes, the same task sleeps for the reconnect delay and connects again.
//! The reconnect wait lives in that task, so there is never more than one
//! pending reconnect per id.
//!
//! Every link carries a generation number. [`ConnectionManager::disconnect`]
//! forgets the generation and aborts the task, which also drops a pending
//! reconnect sleep. Consumers check [`ConnectionManager::is_live`] before
//! applying anything tagged with a generation. An event from a torn-down
//! link then never touches state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tracing::{debug, error, info, warn};

use crate::protocol::{ClientFrame, PushMessage, TournamentId};
use crate::transport::{Connector, Transport};

/// Wait between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

// ── Configuration ───────────────────────────────────────────────────

/// Tuning for a [`ConnectionManager`].
///
/// ```
/// use tournament_sync_client::connection::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::new().with_keepalive_interval(Duration::from_secs(20));
/// assert_eq!(config.reconnect_delay, Duration::from_secs(3));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Fixed delay before reconnecting. There is no exponential growth.
    ///
    /// Defaults to **3 seconds**.
    pub reconnect_delay: Duration,
    /// Send `{"type":"ping"}` on this interval while connected.
    ///
    /// Defaults to `None`.
    pub keepalive_interval: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            keepalive_interval: None,
        }
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// A zero interval disables the keepalive.
    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = (!interval.is_zero()).then_some(interval);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Link events ─────────────────────────────────────────────────────

/// Something that happened on a tournament's push connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A transport was established. `reconnect` is `false` only for the
    /// first successful connection of this generation.
    Opened {
        tournament_id: TournamentId,
        generation: u64,
        reconnect: bool,
    },
    /// A decoded push frame.
    Frame {
        tournament_id: TournamentId,
        generation: u64,
        message: PushMessage,
    },
    /// The transport closed or a connection attempt failed. `reason` is
    /// `None` for a clean close.
    Closed {
        tournament_id: TournamentId,
        generation: u64,
        reason: Option<String>,
    },
}

impl LinkEvent {
    pub fn tournament_id(&self) -> &str {
        match self {
            Self::Opened { tournament_id, .. }
            | Self::Frame { tournament_id, .. }
            | Self::Closed { tournament_id, .. } => tournament_id,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            Self::Opened { generation, .. }
            | Self::Frame { generation, .. }
            | Self::Closed { generation, .. } => *generation,
        }
    }
}

/// Where a link is in its connect/reconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Open,
    ReconnectPending,
}

// ── Manager ─────────────────────────────────────────────────────────

struct Link {
    generation: u64,
    state: LinkState,
    attempts: u32,
    task: Option<JoinHandle<()>>,
}

type Links = Arc<StdMutex<HashMap<TournamentId, Link>>>;

fn lock(links: &Links) -> MutexGuard<'_, HashMap<TournamentId, Link>> {
    links.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_live_in(links: &Links, tournament_id: &str, generation: u64) -> bool {
    lock(links)
        .get(tournament_id)
        .is_some_and(|link| link.generation == generation)
}

/// Update the link only if it still belongs to `generation`.
fn update_link(links: &Links, tournament_id: &str, generation: u64, f: impl FnOnce(&mut Link)) {
    if let Some(link) = lock(links).get_mut(tournament_id) {
        if link.generation == generation {
            f(link);
        }
    }
}

/// Owns the push connections, keyed by tournament id.
///
/// Dropping the manager aborts every connection task.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    links: Links,
    next_generation: AtomicU64,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl ConnectionManager {
    /// Create a manager and the receiver its [`LinkEvent`]s arrive on.
    pub fn new(
        connector: Arc<dyn Connector>,
        config: ConnectionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            connector,
            config,
            links: Arc::new(StdMutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            events,
        };
        (manager, events_rx)
    }

    /// Start the connection task for `tournament_id` and return its
    /// generation. If the id already has a link, nothing is started and the
    /// existing generation is returned.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, tournament_id: &str) -> u64 {
        let mut links = lock(&self.links);
        if let Some(link) = links.get(tournament_id) {
            debug!(tournament_id, generation = link.generation, "already connected");
            return link.generation;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        info!(tournament_id, generation, "opening push link");

        let task = tokio::spawn(link_task(
            Arc::clone(&self.connector),
            tournament_id.to_string(),
            generation,
            self.config.clone(),
            Arc::clone(&self.links),
            self.events.clone(),
        ));
        links.insert(
            tournament_id.to_string(),
            Link {
                generation,
                state: LinkState::Connecting,
                attempts: 0,
                task: Some(task),
            },
        );
        generation
    }

    /// Tear down the link for `tournament_id`. The task is aborted, which
    /// drops the transport and any pending reconnect sleep.
    pub fn disconnect(&self, tournament_id: &str) {
        let removed = lock(&self.links).remove(tournament_id);
        if let Some(link) = removed {
            info!(tournament_id, generation = link.generation, "closing push link");
            if let Some(task) = link.task {
                task.abort();
            }
        }
    }

    /// Tear down every link.
    pub fn disconnect_all(&self) {
        let drained: Vec<(TournamentId, Link)> = lock(&self.links).drain().collect();
        for (tournament_id, link) in drained {
            debug!(%tournament_id, generation = link.generation, "closing push link");
            if let Some(task) = link.task {
                task.abort();
            }
        }
    }

    /// Returns `true` if `generation` is the current link for
    /// `tournament_id`.
    pub fn is_live(&self, tournament_id: &str, generation: u64) -> bool {
        is_live_in(&self.links, tournament_id, generation)
    }

    pub fn generation(&self, tournament_id: &str) -> Option<u64> {
        lock(&self.links).get(tournament_id).map(|l| l.generation)
    }

    pub fn link_state(&self, tournament_id: &str) -> Option<LinkState> {
        lock(&self.links).get(tournament_id).map(|l| l.state)
    }

    /// Connection attempts made by the current generation, including the
    /// first one.
    pub fn connect_attempts(&self, tournament_id: &str) -> u32 {
        lock(&self.links)
            .get(tournament_id)
            .map_or(0, |l| l.attempts)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("links", &lock(&self.links).len())
            .field("config", &self.config)
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

// ── Link task ───────────────────────────────────────────────────────

async fn link_task(
    connector: Arc<dyn Connector>,
    tournament_id: TournamentId,
    generation: u64,
    config: ConnectionConfig,
    links: Links,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let mut attempt: u32 = 0;
    let mut opened_before = false;

    loop {
        attempt = attempt.saturating_add(1);
        update_link(&links, &tournament_id, generation, |l| {
            l.state = LinkState::Connecting;
            l.attempts = attempt;
        });
        debug!(%tournament_id, generation, attempt, "connecting");

        let reason = match connector.connect(&tournament_id).await {
            Ok(mut transport) => {
                update_link(&links, &tournament_id, generation, |l| {
                    l.state = LinkState::Open;
                });
                info!(%tournament_id, generation, attempt, "push link open");
                let opened = LinkEvent::Opened {
                    tournament_id: tournament_id.clone(),
                    generation,
                    reconnect: opened_before,
                };
                opened_before = true;
                if events.send(opened).is_err() {
                    debug!(%tournament_id, "link event receiver dropped");
                    let _ = transport.close().await;
                    return;
                }

                let reason =
                    pump(transport.as_mut(), &tournament_id, generation, &config, &events).await;
                let _ = transport.close().await;
                reason
            }
            Err(e) => {
                warn!(%tournament_id, generation, attempt, error = %e, "connection attempt failed");
                Some(e.to_string())
            }
        };

        match &reason {
            Some(r) => warn!(%tournament_id, generation, reason = %r, "push link closed"),
            None => info!(%tournament_id, generation, "push link closed by server"),
        }
        let closed = LinkEvent::Closed {
            tournament_id: tournament_id.clone(),
            generation,
            reason,
        };
        if events.send(closed).is_err() {
            debug!(%tournament_id, "link event receiver dropped");
            return;
        }

        if !is_live_in(&links, &tournament_id, generation) {
            return;
        }
        update_link(&links, &tournament_id, generation, |l| {
            l.state = LinkState::ReconnectPending;
        });
        info!(
            %tournament_id,
            generation,
            delay_ms = u64::try_from(config.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
            "reconnect scheduled"
        );
        tokio::time::sleep(config.reconnect_delay).await;
        if !is_live_in(&links, &tournament_id, generation) {
            return;
        }
    }
}

/// Read frames until the transport closes. Returns the close reason, `None`
/// for a clean close.
async fn pump(
    transport: &mut dyn Transport,
    tournament_id: &str,
    generation: u64,
    config: &ConnectionConfig,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> Option<String> {
    let mut keepalive = config
        .keepalive_interval
        .map(|period| tokio::time::interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => match serde_json::from_str::<PushMessage>(&text) {
                    Ok(message) => {
                        let frame = LinkEvent::Frame {
                            tournament_id: tournament_id.to_string(),
                            generation,
                            message,
                        };
                        if events.send(frame).is_err() {
                            return Some("link event receiver dropped".into());
                        }
                    }
                    Err(e) => {
                        warn!(tournament_id, error = %e, raw = %text, "undecodable push frame dropped");
                    }
                },
                Some(Err(e)) => return Some(e.to_string()),
                None => return None,
            },

            () = next_tick(&mut keepalive) => {
                match serde_json::to_string(&ClientFrame::Ping) {
                    Ok(json) => {
                        if let Err(e) = transport.send(json).await {
                            return Some(format!("keepalive failed: {e}"));
                        }
                    }
                    Err(e) => error!("failed to serialize keepalive: {e}"),
                }
            }
        }
    }
}

/// Wait for the next tick, or forever when there is no interval.
pub(crate) async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
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
    use crate::error::TournamentError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    type Script = Vec<Option<Result<String, TournamentError>>>;

    /// Yields scripted frames, then waits forever.
    struct ScriptedTransport {
        incoming: VecDeque<Option<Result<String, TournamentError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, message: String) -> Result<(), TournamentError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, TournamentError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<(), TournamentError> {
            Ok(())
        }
    }

    /// Hands out one scripted transport per attempt. Once the scripts run
    /// out, every attempt gets a transport that never closes.
    struct ScriptedConnector {
        scripts: StdMutex<VecDeque<Script>>,
        attempts: AtomicU32,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    impl ScriptedConnector {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: StdMutex::new(scripts.into()),
                attempts: AtomicU32::new(0),
                sent: Arc::new(StdMutex::new(Vec::new())),
            })
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, _id: &str) -> Result<Box<dyn Transport>, TournamentError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
            Ok(Box::new(ScriptedTransport {
                incoming: script.into(),
                sent: Arc::clone(&self.sent),
            }))
        }
    }

    fn closing() -> Script {
        vec![None]
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_decoded_and_bad_frames_dropped() {
        let connector = ScriptedConnector::new(vec![vec![
            Some(Ok(r#"{"type":"participant_joined","username":"alice"}"#.into())),
            Some(Ok("not json".into())),
            Some(Ok(r#"{"type":"pong"}"#.into())),
        ]]);
        let (manager, mut rx) = ConnectionManager::new(connector, ConnectionConfig::new());
        let generation = manager.connect("t-1");

        assert_eq!(
            rx.recv().await.unwrap(),
            LinkEvent::Opened {
                tournament_id: "t-1".into(),
                generation,
                reconnect: false
            }
        );
        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            LinkEvent::Frame { message: PushMessage::ParticipantJoined { .. }, .. }
        ));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, LinkEvent::Frame { message: PushMessage::Pong, .. }));
        assert_eq!(manager.link_state("t-1"), Some(LinkState::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_once_after_fixed_delay() {
        let connector = ScriptedConnector::new(vec![closing()]);
        let (manager, mut rx) =
            ConnectionManager::new(Arc::clone(&connector) as Arc<dyn Connector>, ConnectionConfig::new());
        manager.connect("t-1");
        settle().await;

        assert_eq!(manager.link_state("t-1"), Some(LinkState::ReconnectPending));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(manager.link_state("t-1"), Some(LinkState::Open));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);

        let events: Vec<LinkEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(events[0], LinkEvent::Opened { reconnect: false, .. }));
        assert!(matches!(events[1], LinkEvent::Closed { reason: None, .. }));
        assert!(matches!(events[2], LinkEvent::Opened { reconnect: true, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn n_closes_make_n_reconnects() {
        const CLOSES: u32 = 4;
        let connector = ScriptedConnector::new((0..CLOSES).map(|_| closing()).collect());
        let (manager, _rx) =
            ConnectionManager::new(Arc::clone(&connector) as Arc<dyn Connector>, ConnectionConfig::new());
        manager.connect("t-1");

        for close in 1..=CLOSES {
            settle().await;
            assert_eq!(connector.attempts.load(Ordering::SeqCst), close);
            assert_eq!(manager.link_state("t-1"), Some(LinkState::ReconnectPending));
            tokio::time::sleep(DEFAULT_RECONNECT_DELAY).await;
        }
        settle().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), CLOSES + 1);
        assert_eq!(manager.connect_attempts("t-1"), CLOSES + 1);
        assert_eq!(manager.link_state("t-1"), Some(LinkState::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let connector = ScriptedConnector::new(vec![closing()]);
        let (manager, _rx) =
            ConnectionManager::new(Arc::clone(&connector) as Arc<dyn Connector>, ConnectionConfig::new());
        let generation = manager.connect("t-1");
        settle().await;
        assert_eq!(manager.link_state("t-1"), Some(LinkState::ReconnectPending));

        manager.disconnect("t-1");
        assert!(!manager.is_live("t-1", generation));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.link_state("t-1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent_per_id() {
        let connector = ScriptedConnector::new(vec![]);
        let (manager, _rx) =
            ConnectionManager::new(Arc::clone(&connector) as Arc<dyn Connector>, ConnectionConfig::new());
        let first = manager.connect("t-1");
        let again = manager.connect("t-1");
        assert_eq!(first, again);
        settle().await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);

        let other = manager.connect("t-2");
        assert_ne!(first, other);
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_gets_a_new_generation() {
        let connector = ScriptedConnector::new(vec![]);
        let (manager, _rx) = ConnectionManager::new(connector, ConnectionConfig::new());
        let old = manager.connect("t-1");
        manager.disconnect("t-1");
        let new = manager.connect("t-1");
        assert_ne!(old, new);
        assert!(!manager.is_live("t-1", old));
        assert!(manager.is_live("t-1", new));
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_sends_ping_frames() {
        let connector = ScriptedConnector::new(vec![]);
        let config = ConnectionConfig::new().with_keepalive_interval(Duration::from_secs(20));
        let (manager, _rx) =
            ConnectionManager::new(Arc::clone(&connector) as Arc<dyn Connector>, config);
        manager.connect("t-1");

        tokio::time::sleep(Duration::from_secs(45)).await;
        let sent = connector.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![r#"{"type":"ping"}"#.to_string(); 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_manager_stops_tasks() {
        let connector = ScriptedConnector::new(vec![closing()]);
        let (manager, _rx) =
            ConnectionManager::new(Arc::clone(&connector) as Arc<dyn Connector>, ConnectionConfig::new());
        manager.connect("t-1");
        settle().await;
        drop(manager);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }
}
