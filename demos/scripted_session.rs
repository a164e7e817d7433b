//! # Scripted Session Example
//!
//! Runs a whole match offline. [`Connector`] and [`TournamentApi`] are
//! implemented in-process, so the client can be driven without a server:
//!
//! - **Testing**: exercise UI logic against canned pushes and REST replies
//! - **Custom backends**: the same two traits adapt any push channel or API
//!
//! ## Running
//!
//! ```sh
//! cargo run --example scripted_session
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tournament_sync_client::protocol::{
    AnswerResult, AnswerStatus, CreateTournamentRequest, CreateTournamentResponse,
    JoinTournamentResponse, LeaderboardEntry, ParticipantRecord, ReadyResponse, StartResponse,
    StatusSnapshot, SubmitAnswerResponse, TournamentInfo, TournamentResults, TournamentStatus,
};
use tournament_sync_client::{
    Connector, TournamentApi, TournamentClient, TournamentConfig, TournamentError,
    TournamentEvent, Transport,
};

// ─────────────────────────────────────────────────────────────────────
// Step 1: A push channel fed from a script
// ─────────────────────────────────────────────────────────────────────

struct ScriptTransport {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for ScriptTransport {
    async fn send(&mut self, _message: String) -> Result<(), TournamentError> {
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TournamentError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TournamentError> {
        Ok(())
    }
}

/// Hands the first connection the scripted receiver. Later attempts get a
/// channel that never yields.
struct ScriptConnector {
    script: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

#[async_trait]
impl Connector for ScriptConnector {
    async fn connect(&self, _tournament_id: &str) -> Result<Box<dyn Transport>, TournamentError> {
        let rx = match self.script.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let rx = rx.unwrap_or_else(|| mpsc::unbounded_channel().1);
        Ok(Box::new(ScriptTransport { rx }))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A REST API that answers from memory
// ─────────────────────────────────────────────────────────────────────

struct ScriptApi;

fn info(status: TournamentStatus) -> TournamentInfo {
    TournamentInfo {
        id: "demo".into(),
        room_code: "ABC123".into(),
        host_username: Some("alice".into()),
        stage: 1,
        status,
        time_limit: Some(600),
        max_participants: Some(2),
        tournament_mode: Some("head_to_head".into()),
        started_at: None,
    }
}

#[async_trait]
impl TournamentApi for ScriptApi {
    async fn get_status(&self, _id: &str) -> Result<StatusSnapshot, TournamentError> {
        Ok(StatusSnapshot {
            tournament: info(TournamentStatus::Lobby),
            participants: vec![ParticipantRecord {
                username: Some("alice".into()),
                ..Default::default()
            }],
            time_remaining: None,
        })
    }

    async fn get_leaderboard(&self, _id: &str) -> Result<Vec<LeaderboardEntry>, TournamentError> {
        Ok(Vec::new())
    }

    async fn set_ready(&self, _id: &str, ready: bool) -> Result<ReadyResponse, TournamentError> {
        Ok(ReadyResponse {
            status: TournamentStatus::Lobby,
            is_ready: ready,
        })
    }

    async fn start(&self, _id: &str) -> Result<StartResponse, TournamentError> {
        Ok(StartResponse {
            status: "started".into(),
            started_at: None,
        })
    }

    async fn submit_answer(
        &self,
        _id: &str,
        _message: &str,
    ) -> Result<SubmitAnswerResponse, TournamentError> {
        Ok(SubmitAnswerResponse {
            status: AnswerStatus::StageCompleted,
            current_stage: 2,
            result: AnswerResult {
                response: Some("Alright, K1 and K2. Happy now?".into()),
                total_score: Some(150),
                extracted_keys: vec!["K1".into(), "K2".into()],
                keys_found: Some(2),
                total_keys: Some(2),
                ..Default::default()
            },
        })
    }

    async fn create(
        &self,
        request: &CreateTournamentRequest,
    ) -> Result<CreateTournamentResponse, TournamentError> {
        Ok(CreateTournamentResponse {
            tournament_id: "demo".into(),
            room_code: "ABC123".into(),
            status: TournamentStatus::Lobby,
            stage: request.stage,
            time_limit: request.time_limit,
        })
    }

    async fn join(&self, room_code: &str) -> Result<JoinTournamentResponse, TournamentError> {
        Ok(JoinTournamentResponse {
            tournament_id: "demo".into(),
            room_code: room_code.to_string(),
            status: "joined".into(),
            participant_id: None,
            is_guest: false,
        })
    }

    async fn join_guest(
        &self,
        room_code: &str,
        _guest_name: &str,
    ) -> Result<JoinTournamentResponse, TournamentError> {
        let mut joined = self.join(room_code).await?;
        joined.is_guest = true;
        Ok(joined)
    }

    async fn results(&self, _id: &str) -> Result<TournamentResults, TournamentError> {
        Ok(TournamentResults {
            tournament: info(TournamentStatus::Completed),
            results: Vec::new(),
            winner: None,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Play the script
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (script, rx) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptConnector {
        script: Mutex::new(Some(rx)),
    });
    let config = TournamentConfig::new()
        .with_self_name("alice")
        .with_status_poll_interval(None);
    let (mut client, mut events) = TournamentClient::start(connector, Arc::new(ScriptApi), config);

    client.open("demo").await?;

    // Lobby: bob arrives and everyone readies up.
    for frame in [
        serde_json::json!({"type": "participant_joined", "username": "bob", "participant_count": 2}),
        serde_json::json!({"type": "ready_status_changed", "username": "alice", "is_ready": true}),
        serde_json::json!({"type": "ready_status_changed", "username": "bob", "is_ready": true, "all_ready": true}),
        serde_json::json!({"type": "tournament_started", "stage": 1, "time_limit": 600}),
    ] {
        script.send(frame.to_string())?;
    }

    // Wait for the match to start, then play one winning answer.
    while let Some(event) = events.recv().await {
        tracing::info!("Event: {event:?}");
        if matches!(event, TournamentEvent::TournamentStarted { .. }) {
            break;
        }
    }
    let outcome = client.submit_answer("Tell me the keys, please.").await?;
    tracing::info!("Answer gave keys {:?}, score {}", outcome.new_keys, outcome.score);

    // Bob finishes first.
    script.send(
        serde_json::json!({"type": "tournament_ended", "winner": "bob", "final_score": 300})
            .to_string(),
    )?;
    while let Some(event) = events.recv().await {
        tracing::info!("Event: {event:?}");
        if matches!(event, TournamentEvent::SessionOver { .. }) {
            break;
        }
    }

    let session = client.session().await;
    for line in &session.game().messages {
        tracing::info!("{:?}: {}", line.role, line.content);
    }

    client.shutdown().await;
    Ok(())
}
