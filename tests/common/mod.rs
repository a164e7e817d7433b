#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for tournament client integration tests.
//!
//! Provides a [`MockConnector`] whose transports are driven from the test
//! through [`ServerHandle`]s, a scriptable [`MockApi`], and helpers for
//! building push frame JSON and REST payloads.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use tournament_sync_client::protocol::{
    AnswerResult, AnswerStatus, CreateTournamentRequest, CreateTournamentResponse,
    JoinTournamentResponse, LeaderboardEntry, ParticipantRecord, ParticipantStatus, ReadyResponse,
    StartResponse, StatusSnapshot, SubmitAnswerResponse, TournamentInfo, TournamentResults,
    TournamentStatus,
};
use tournament_sync_client::{Connector, TournamentApi, TournamentError, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// A transport fed by a channel. `Some(text)` is a frame, `None` closes the
/// connection cleanly, and so does dropping the [`ServerHandle`].
pub struct MockTransport {
    frames: mpsc::UnboundedReceiver<Option<String>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), TournamentError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TournamentError>> {
        self.frames.recv().await.flatten().map(Ok)
    }

    async fn close(&mut self) -> Result<(), TournamentError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// The server side of one [`MockTransport`].
pub struct ServerHandle {
    pub tournament_id: String,
    frames: mpsc::UnboundedSender<Option<String>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Push one text frame to the client.
    pub fn push(&self, json: impl Into<String>) {
        let _ = self.frames.send(Some(json.into()));
    }

    /// Close the connection from the server side.
    pub fn close(&self) {
        let _ = self.frames.send(None);
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out a fresh [`MockTransport`] per attempt and sends the matching
/// [`ServerHandle`] to the test.
pub struct MockConnector {
    attempts: AtomicU32,
    failures: AtomicU32,
    handles: mpsc::UnboundedSender<ServerHandle>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerHandle>) {
        let (handles, handles_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            attempts: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            handles,
        });
        (connector, handles_rx)
    }

    /// Total `connect` calls so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Make the next `n` attempts fail.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, tournament_id: &str) -> Result<Box<dyn Transport>, TournamentError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TournamentError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let _ = self.handles.send(ServerHandle {
            tournament_id: tournament_id.to_string(),
            frames: frames_tx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        });
        Ok(Box::new(MockTransport {
            frames: frames_rx,
            sent,
            closed,
        }))
    }
}

// ── MockApi ─────────────────────────────────────────────────────────

/// A scriptable [`TournamentApi`]. Every call is recorded in `calls`.
#[derive(Default)]
pub struct MockApi {
    /// Returned by `get_status`; `None` makes the call fail with HTTP 500.
    pub status: StdMutex<Option<StatusSnapshot>>,
    pub leaderboard: StdMutex<Vec<LeaderboardEntry>>,
    /// Consumed in order by `submit_answer`. Empty queue means HTTP 500.
    pub answers: StdMutex<VecDeque<Result<SubmitAnswerResponse, TournamentError>>>,
    /// Delay applied to `submit_answer` before it answers.
    pub answer_delay: StdMutex<Duration>,
    /// Error returned by `set_ready` and `start` when set.
    pub fail_actions: AtomicBool,
    pub calls: StdMutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_status(snapshot: StatusSnapshot) -> Arc<Self> {
        let api = Self::default();
        *api.status.lock().unwrap() = Some(snapshot);
        Arc::new(api)
    }

    pub fn set_status(&self, snapshot: Option<StatusSnapshot>) {
        *self.status.lock().unwrap() = snapshot;
    }

    pub fn set_leaderboard(&self, entries: Vec<LeaderboardEntry>) {
        *self.leaderboard.lock().unwrap() = entries;
    }

    pub fn queue_answer(&self, response: SubmitAnswerResponse) {
        self.answers.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_answer_error(&self, error: TournamentError) {
        self.answers.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn server_error() -> TournamentError {
    TournamentError::Http {
        status: 500,
        message: "internal error".into(),
    }
}

#[async_trait]
impl TournamentApi for MockApi {
    async fn get_status(&self, tournament_id: &str) -> Result<StatusSnapshot, TournamentError> {
        self.record(format!("status {tournament_id}"));
        self.status.lock().unwrap().clone().ok_or_else(server_error)
    }

    async fn get_leaderboard(
        &self,
        tournament_id: &str,
    ) -> Result<Vec<LeaderboardEntry>, TournamentError> {
        self.record(format!("leaderboard {tournament_id}"));
        Ok(self.leaderboard.lock().unwrap().clone())
    }

    async fn set_ready(
        &self,
        tournament_id: &str,
        ready: bool,
    ) -> Result<ReadyResponse, TournamentError> {
        self.record(format!("ready {tournament_id} {ready}"));
        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        Ok(ReadyResponse {
            status: TournamentStatus::Lobby,
            is_ready: ready,
        })
    }

    async fn start(&self, tournament_id: &str) -> Result<StartResponse, TournamentError> {
        self.record(format!("start {tournament_id}"));
        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        Ok(StartResponse {
            status: "started".into(),
            started_at: Some("2025-01-01T00:00:00".into()),
        })
    }

    async fn submit_answer(
        &self,
        tournament_id: &str,
        message: &str,
    ) -> Result<SubmitAnswerResponse, TournamentError> {
        self.record(format!("submit {tournament_id} {message}"));
        let delay = *self.answer_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(server_error()))
    }

    async fn create(
        &self,
        request: &CreateTournamentRequest,
    ) -> Result<CreateTournamentResponse, TournamentError> {
        self.record(format!("create {}", request.stage));
        Ok(CreateTournamentResponse {
            tournament_id: "t-new".into(),
            room_code: "XYZ789".into(),
            status: TournamentStatus::Lobby,
            stage: request.stage,
            time_limit: request.time_limit,
        })
    }

    async fn join(&self, room_code: &str) -> Result<JoinTournamentResponse, TournamentError> {
        self.record(format!("join {room_code}"));
        Ok(JoinTournamentResponse {
            tournament_id: "t-1".into(),
            room_code: room_code.to_string(),
            status: "joined".into(),
            participant_id: None,
            is_guest: false,
        })
    }

    async fn join_guest(
        &self,
        room_code: &str,
        guest_name: &str,
    ) -> Result<JoinTournamentResponse, TournamentError> {
        self.record(format!("join-guest {room_code} {guest_name}"));
        Ok(JoinTournamentResponse {
            tournament_id: "t-1".into(),
            room_code: room_code.to_string(),
            status: "joined".into(),
            participant_id: Some(2),
            is_guest: true,
        })
    }

    async fn results(&self, tournament_id: &str) -> Result<TournamentResults, TournamentError> {
        self.record(format!("results {tournament_id}"));
        let snapshot = self.status.lock().unwrap().clone().ok_or_else(server_error)?;
        let results = self.leaderboard.lock().unwrap().clone();
        Ok(TournamentResults {
            tournament: snapshot.tournament,
            winner: results.first().cloned(),
            results,
        })
    }
}

// ── REST payload builders ───────────────────────────────────────────

/// A status snapshot for `ABC123` hosted by alice.
pub fn snapshot(
    status: TournamentStatus,
    participants: &[(&str, bool)],
    time_remaining: Option<f64>,
) -> StatusSnapshot {
    StatusSnapshot {
        tournament: TournamentInfo {
            id: "t-1".into(),
            room_code: "ABC123".into(),
            host_username: Some("alice".into()),
            stage: 1,
            status,
            time_limit: Some(600),
            max_participants: Some(2),
            tournament_mode: Some("head_to_head".into()),
            started_at: None,
        },
        participants: participants
            .iter()
            .map(|(name, ready)| ParticipantRecord {
                username: Some((*name).to_string()),
                is_ready: *ready,
                ..Default::default()
            })
            .collect(),
        time_remaining,
    }
}

pub fn answer(
    status: AnswerStatus,
    current_stage: u32,
    keys: &[&str],
    keys_found: u32,
    total_score: i64,
) -> SubmitAnswerResponse {
    SubmitAnswerResponse {
        status,
        current_stage,
        result: AnswerResult {
            response: Some("I cannot share that.".into()),
            message: None,
            total_score: Some(total_score),
            extracted_keys: keys.iter().map(|k| (*k).to_string()).collect(),
            keys_found: Some(keys_found),
            total_keys: Some(2),
        },
    }
}

pub fn leaderboard_entry(name: &str, stage: u32, score: i64) -> LeaderboardEntry {
    LeaderboardEntry {
        rank: 0,
        username: Some(name.into()),
        is_guest: false,
        stage,
        score,
        time_taken: 0.0,
        status: ParticipantStatus::Active,
        completed_at: None,
    }
}

// ── Push frame builders ─────────────────────────────────────────────

pub fn participant_joined_json(username: &str) -> String {
    serde_json::json!({"type": "participant_joined", "username": username}).to_string()
}

pub fn guest_joined_json(guest_name: &str, count: usize) -> String {
    serde_json::json!({
        "type": "participant_joined",
        "guest_name": guest_name,
        "participant_count": count,
    })
    .to_string()
}

pub fn ready_json(username: &str, is_ready: bool, all_ready: bool) -> String {
    serde_json::json!({
        "type": "ready_status_changed",
        "username": username,
        "is_ready": is_ready,
        "all_ready": all_ready,
    })
    .to_string()
}

pub fn started_json(stage: u32, time_limit: u64) -> String {
    serde_json::json!({
        "type": "tournament_started",
        "started_at": "2025-01-01T00:00:00",
        "time_limit": time_limit,
        "stage": stage,
    })
    .to_string()
}

pub fn progress_json(username: &str, notification: Option<&str>) -> String {
    let mut value = serde_json::json!({
        "type": "progress_update",
        "username": username,
        "stage": 1,
        "status": "active",
        "keys_found": 1,
        "total_keys": 2,
        "score": 50,
    });
    if let Some(text) = notification {
        value["notification"] = serde_json::Value::String(text.into());
    }
    value.to_string()
}

pub fn ended_json(winner: &str, final_score: i64) -> String {
    serde_json::json!({
        "type": "tournament_ended",
        "winner": winner,
        "final_score": final_score,
        "stage": 1,
        "message": format!("{winner} won the tournament!"),
    })
    .to_string()
}

pub fn completed_json() -> String {
    serde_json::json!({"type": "tournament_completed"}).to_string()
}

// ── Async helpers ───────────────────────────────────────────────────

/// Let spawned tasks run. Under paused time this also advances the clock a
/// little.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
