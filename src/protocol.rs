//! Wire types for the tournament service.
//!
//! Push frames arrive on `WS /tournament/{id}/ws` as JSON objects with a
//! `type` discriminator. REST payloads mirror the service's
//! `/tournament/...` endpoints. The service stores booleans in SQLite on some
//! deployments, so flags such as `is_guest` accept either `true`/`false` or
//! `0`/`1`.

use serde::{Deserialize, Deserializer, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Server-assigned tournament identifier (a UUID string on the wire).
pub type TournamentId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// Lifecycle status of a tournament.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    /// Waiting for players. The service calls this `waiting`.
    #[default]
    #[serde(alias = "waiting")]
    Lobby,
    /// Every participant has marked themselves ready.
    Ready,
    /// The match is running.
    Active,
    /// The match is over.
    Completed,
    /// The host abandoned the tournament.
    Cancelled,
    /// A status string this client does not know. Snapshots carrying it
    /// still decode; the session keeps its prior status.
    #[serde(other)]
    Other,
}

impl TournamentStatus {
    /// Returns `true` for statuses after which no game progress is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Per-participant progress status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    #[default]
    Active,
    Completed,
    /// Any status string this client does not know about.
    #[serde(other)]
    Other,
}

/// Outcome tag of a `submit-answer` round-trip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// The stage continues. The service sends `continue` for this.
    #[serde(alias = "continue")]
    InProgress,
    /// The player cleared a stage and moved to the next one.
    StageCompleted,
    /// The player cleared every stage.
    Completed,
    /// The player cleared the tournament stage first.
    TournamentWon,
}

impl AnswerStatus {
    /// Returns `true` if this answer ends the player's game.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TournamentWon)
    }
}

// ── Push frames ─────────────────────────────────────────────────────

/// Frames pushed by the service on the tournament WebSocket.
///
/// Unknown `type` tags decode to [`PushMessage::Unknown`] so that new server
/// events never break an older client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// A registered user or a guest joined the lobby.
    ParticipantJoined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guest_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant_count: Option<usize>,
    },
    /// A participant toggled their ready flag.
    ReadyStatusChanged {
        username: String,
        is_ready: bool,
        #[serde(default)]
        all_ready: bool,
    },
    /// The host started the match.
    TournamentStarted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_limit: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<u32>,
    },
    /// Some participant submitted an answer. Used as a trigger to re-fetch
    /// the leaderboard, never applied as a diff.
    ProgressUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        keys_found: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_keys: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        score: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notification: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },
    /// A participant won; the match is over for everyone.
    TournamentEnded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_score: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// The match finished (time ran out or the host closed it).
    TournamentCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_score: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Reply to a keepalive ping.
    Pong,
    /// Any tag this client does not handle.
    #[serde(other)]
    Unknown,
}

impl PushMessage {
    /// Short name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ReadyStatusChanged { .. } => "ready_status_changed",
            Self::TournamentStarted { .. } => "tournament_started",
            Self::ProgressUpdate { .. } => "progress_update",
            Self::TournamentEnded { .. } => "tournament_ended",
            Self::TournamentCompleted { .. } => "tournament_completed",
            Self::Pong => "pong",
            Self::Unknown => "unknown",
        }
    }
}

/// Frames the client may send on the tournament WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Keepalive; the service answers with [`PushMessage::Pong`].
    Ping,
}

// ── REST payloads ───────────────────────────────────────────────────

/// Tournament row as returned by `GET /tournament/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TournamentInfo {
    pub id: TournamentId,
    pub room_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_username: Option<String>,
    #[serde(default = "first_stage")]
    pub stage: u32,
    #[serde(default)]
    pub status: TournamentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_participants: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

/// Participant row as returned by `GET /tournament/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ParticipantRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_name: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_guest: bool,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_ready: bool,
    #[serde(default)]
    pub final_score: i64,
    #[serde(default)]
    pub keys_found: u32,
}

impl ParticipantRecord {
    /// Username for registered players, guest name otherwise.
    pub fn display_name(&self) -> Option<&str> {
        self.username.as_deref().or(self.guest_name.as_deref())
    }
}

/// Full snapshot from `GET /tournament/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    pub tournament: TournamentInfo,
    #[serde(default)]
    pub participants: Vec<ParticipantRecord>,
    /// Seconds left; only present while the match is active.
    #[serde(default)]
    pub time_remaining: Option<f64>,
}

/// One row of `GET /tournament/{id}/leaderboard`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_guest: bool,
    #[serde(default = "first_stage")]
    pub stage: u32,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub time_taken: f64,
    #[serde(default)]
    pub status: ParticipantStatus,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// Body of `GET /tournament/{id}/leaderboard`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardResponse {
    #[serde(default)]
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Response of `POST /tournament/{id}/ready?ready=...`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadyResponse {
    /// `ready` once every participant is ready, `waiting` otherwise.
    #[serde(default)]
    pub status: TournamentStatus,
    pub is_ready: bool,
}

/// Response of `POST /tournament/{id}/start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

/// Body of `POST /tournament/{id}/submit-answer`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitAnswerRequest {
    pub message: String,
}

/// Scoring part of a `submit-answer` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AnswerResult {
    /// Assistant reply for ordinary turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Fallback text some service paths use instead of `response`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_score: Option<i64>,
    #[serde(default)]
    pub extracted_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys_found: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_keys: Option<u32>,
}

impl AnswerResult {
    /// The text to show as the assistant's reply.
    pub fn reply_text(&self) -> &str {
        self.response
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or_default()
    }
}

/// Response of `POST /tournament/{id}/submit-answer`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmitAnswerResponse {
    pub status: AnswerStatus,
    pub current_stage: u32,
    pub result: AnswerResult,
}

/// Body of `POST /tournament/create`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTournamentRequest {
    pub stage: u32,
    /// Match length in seconds.
    pub time_limit: u64,
    pub tournament_mode: String,
}

impl Default for CreateTournamentRequest {
    fn default() -> Self {
        Self {
            stage: 1,
            time_limit: 600,
            tournament_mode: "head_to_head".into(),
        }
    }
}

/// Response of `POST /tournament/create`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTournamentResponse {
    pub tournament_id: TournamentId,
    pub room_code: String,
    #[serde(default)]
    pub status: TournamentStatus,
    #[serde(default = "first_stage")]
    pub stage: u32,
    #[serde(default)]
    pub time_limit: u64,
}

/// Body of `POST /tournament/join` and `POST /tournament/join-guest`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinTournamentRequest {
    pub room_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_name: Option<String>,
}

/// Response of the join endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinTournamentResponse {
    pub tournament_id: TournamentId,
    pub room_code: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<i64>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_guest: bool,
}

/// Response of `GET /tournament/{id}/results`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TournamentResults {
    pub tournament: TournamentInfo,
    #[serde(default)]
    pub results: Vec<LeaderboardEntry>,
    #[serde(default)]
    pub winner: Option<LeaderboardEntry>,
}

// ── Helpers ─────────────────────────────────────────────────────────

fn first_stage() -> u32 {
    1
}

/// Accepts `true`/`false`, `0`/`1` and `null` (as `false`).
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flex {
        Bool(bool),
        Int(i64),
        Null(()),
    }

    Ok(match Flex::deserialize(deserializer)? {
        Flex::Bool(b) => b,
        Flex::Int(n) => n != 0,
        Flex::Null(()) => false,
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn participant_joined_guest_frame() {
        let msg: PushMessage = serde_json::from_str(
            r#"{"type":"participant_joined","guest_name":"neo","participant_count":2}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            PushMessage::ParticipantJoined {
                username: None,
                guest_name: Some("neo".into()),
                participant_count: Some(2),
            }
        );
    }

    #[test]
    fn unknown_tag_decodes_to_unknown() {
        let msg: PushMessage =
            serde_json::from_str(r#"{"type":"spectator_joined","name":"x"}"#).unwrap();
        assert_eq!(msg, PushMessage::Unknown);
        assert_eq!(msg.kind(), "unknown");
    }

    #[test]
    fn frame_without_type_is_rejected() {
        assert!(serde_json::from_str::<PushMessage>(r#"{"username":"alice"}"#).is_err());
    }

    #[test]
    fn pong_frame_decodes() {
        let msg: PushMessage = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(msg, PushMessage::Pong);
    }

    #[test]
    fn ping_frame_encodes_with_type_tag() {
        let json = serde_json::to_string(&ClientFrame::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn waiting_status_maps_to_lobby() {
        let status: TournamentStatus = serde_json::from_str(r#""waiting""#).unwrap();
        assert_eq!(status, TournamentStatus::Lobby);
        assert!(!status.is_terminal());
        assert!(TournamentStatus::Cancelled.is_terminal());
    }

    #[test]
    fn continue_status_maps_to_in_progress() {
        let status: AnswerStatus = serde_json::from_str(r#""continue""#).unwrap();
        assert_eq!(status, AnswerStatus::InProgress);
        let status: AnswerStatus = serde_json::from_str(r#""in_progress""#).unwrap();
        assert_eq!(status, AnswerStatus::InProgress);
    }

    #[test]
    fn status_snapshot_from_sqlite_row() {
        let json = r#"{
            "tournament": {
                "id": "t-1", "room_code": "ABC123", "host_user_id": 7,
                "stage": 2, "status": "waiting", "max_participants": 2,
                "tournament_mode": "head_to_head", "time_limit": 600,
                "created_at": "2025-01-01T00:00:00", "started_at": null,
                "completed_at": null, "winner_user_id": null,
                "host_username": "alice"
            },
            "participants": [
                {"id": 1, "user_id": 7, "username": "alice", "is_guest": 0,
                 "guest_name": null, "is_ready": 1, "final_score": 0},
                {"id": 2, "user_id": null, "username": null, "is_guest": 1,
                 "guest_name": "bob", "is_ready": 0, "final_score": 0}
            ],
            "time_remaining": null
        }"#;
        let snap: StatusSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.tournament.host_username.as_deref(), Some("alice"));
        assert_eq!(snap.tournament.status, TournamentStatus::Lobby);
        assert_eq!(snap.tournament.max_participants, Some(2));
        assert!(snap.participants[0].is_ready);
        assert!(!snap.participants[0].is_guest);
        assert!(snap.participants[1].is_guest);
        assert_eq!(snap.participants[1].display_name(), Some("bob"));
        assert!(snap.time_remaining.is_none());
    }

    #[test]
    fn submit_answer_response_decodes() {
        let json = r#"{
            "status": "stage_completed",
            "current_stage": 2,
            "result": {"response": "ok", "total_score": 150,
                       "extracted_keys": ["K1", "K2"], "keys_found": 2, "total_keys": 2,
                       "stage_completed": true, "score": 50}
        }"#;
        let resp: SubmitAnswerResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.status, AnswerStatus::StageCompleted);
        assert_eq!(resp.current_stage, 2);
        assert_eq!(resp.result.total_score, Some(150));
        assert_eq!(resp.result.reply_text(), "ok");
    }

    #[test]
    fn reply_text_falls_back_to_message() {
        let result = AnswerResult {
            message: Some("fallback".into()),
            ..Default::default()
        };
        assert_eq!(result.reply_text(), "fallback");
        assert_eq!(AnswerResult::default().reply_text(), "");
    }

    #[test]
    fn leaderboard_entry_defaults_missing_fields() {
        let entry: LeaderboardEntry =
            serde_json::from_str(r#"{"rank":1,"username":"alice","status":"disqualified"}"#)
                .unwrap();
        assert_eq!(entry.stage, 1);
        assert_eq!(entry.score, 0);
        assert_eq!(entry.status, ParticipantStatus::Other);
    }

    #[test]
    fn create_request_defaults_match_service() {
        let req = CreateTournamentRequest::default();
        assert_eq!(req.stage, 1);
        assert_eq!(req.time_limit, 600);
        assert_eq!(req.tournament_mode, "head_to_head");
    }
}
