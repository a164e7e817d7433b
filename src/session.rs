//! The client's authoritative view of one tournament.
//!
//! [`SessionState`] is what the presentation layer renders. It is changed only
//! through the named intents below. Push handlers and REST round-trips never
//! assign fields directly.
//!
//! Rules the intents enforce:
//!
//! - A participant name appears at most once, however often a join is delivered.
//! - Score, keys, key counts and stage are copied from the service. They are
//!   never added up locally.
//! - `time_remaining` only counts down between server values. A server value
//!   replaces it.
//! - Once the session is terminal, game progress is frozen.

use std::collections::HashSet;

use tracing::debug;

use crate::protocol::{
    AnswerStatus, LeaderboardEntry, ParticipantStatus, StatusSnapshot, SubmitAnswerResponse,
    TournamentId, TournamentStatus,
};
use crate::stages::{stage_info, welcome_text};

/// Participant capacity used until the service reports `max_participants`.
pub const DEFAULT_PARTICIPANT_CAPACITY: usize = 2;

/// Keys per stage assumed before the first answer reports `total_keys`.
const DEFAULT_TOTAL_KEYS: u32 = 3;

/// Match length assumed when the start event carries no time limit.
const DEFAULT_TIME_LIMIT_SECS: u64 = 300;

// ── View types ──────────────────────────────────────────────────────

/// Tournament metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TournamentSession {
    pub id: TournamentId,
    pub room_code: String,
    pub host_username: Option<String>,
    pub stage: u32,
    pub time_limit: Option<u64>,
    pub max_participants: Option<usize>,
}

/// One player in the tournament.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Username, or guest display name.
    pub name: String,
    pub is_guest: bool,
    pub is_ready: bool,
    pub stage: u32,
    pub score: i64,
    pub status: ParticipantStatus,
}

impl Participant {
    fn new(name: impl Into<String>, is_guest: bool) -> Self {
        Self {
            name: name.into(),
            is_guest,
            is_ready: false,
            stage: 1,
            score: 0,
            status: ParticipantStatus::Active,
        }
    }
}

/// Who wrote a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
    KeyExtraction,
    StageTransition,
}

/// One line of the chat transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// This client's own game progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub messages: Vec<ChatMessage>,
    /// Keys extracted so far, in discovery order, unique by value.
    pub extracted_keys: Vec<String>,
    pub keys_found: u32,
    pub total_keys: u32,
    pub score: i64,
    pub current_stage: u32,
    /// Whole seconds left in the match, once known.
    pub time_remaining: Option<u64>,
    pub stage_completed: bool,
    pub game_completed: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            extracted_keys: Vec::new(),
            keys_found: 0,
            total_keys: DEFAULT_TOTAL_KEYS,
            score: 0,
            current_stage: 1,
            time_remaining: None,
            stage_completed: false,
            game_completed: false,
        }
    }
}

/// How the match ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub winner: Option<String>,
    pub final_score: Option<i64>,
    /// `true` if this client is the winner.
    pub won: bool,
}

/// A stage advance waiting for its delayed transcript reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTransition {
    pub from: u32,
    pub to: u32,
    pub score: i64,
    /// Identifies this transition so a stale timer cannot finish a newer one.
    pub seq: u64,
}

/// What an applied `submit-answer` response changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub status: AnswerStatus,
    /// Keys reported now that were not known before, in server order. Only
    /// used for the "key acquired" effect; not stored.
    pub new_keys: Vec<String>,
    pub transition: Option<StageTransition>,
    pub score: i64,
    /// `true` if this answer ended the game.
    pub terminal: bool,
}

// ── SessionState ────────────────────────────────────────────────────

/// Everything the presentation layer reads about the open tournament.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    tournament: Option<TournamentSession>,
    status: TournamentStatus,
    participants: Vec<Participant>,
    default_capacity: usize,
    self_name: Option<String>,
    self_ready: bool,
    game: GameState,
    leaderboard: Vec<LeaderboardEntry>,
    outcome: Option<Outcome>,
    pending_transition: Option<StageTransition>,
    transition_seq: u64,
}

impl SessionState {
    /// Empty state. `self_name` is this client's username or guest name, used
    /// to tell our own events from opponents'.
    pub fn new(default_capacity: usize, self_name: Option<String>) -> Self {
        Self {
            tournament: None,
            status: TournamentStatus::Lobby,
            participants: Vec::new(),
            default_capacity: default_capacity.max(1),
            self_name,
            self_ready: false,
            game: GameState::default(),
            leaderboard: Vec::new(),
            outcome: None,
            pending_transition: None,
            transition_seq: 0,
        }
    }

    /// Forget everything about the current tournament. Identity and capacity
    /// settings are kept.
    pub fn reset(&mut self) {
        *self = Self::new(self.default_capacity, self.self_name.take());
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn tournament(&self) -> Option<&TournamentSession> {
        self.tournament.as_ref()
    }

    pub fn status(&self) -> TournamentStatus {
        self.status
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, name: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.name == name)
    }

    /// Seats in the tournament: the service's `max_participants` when known,
    /// the configured default otherwise.
    pub fn capacity(&self) -> usize {
        self.tournament
            .as_ref()
            .and_then(|t| t.max_participants)
            .unwrap_or(self.default_capacity)
    }

    pub fn self_name(&self) -> Option<&str> {
        self.self_name.as_deref()
    }

    pub fn is_self(&self, name: &str) -> bool {
        self.self_name.as_deref() == Some(name)
    }

    /// `Some(true)` if we are the host, `None` if either name is unknown.
    pub fn is_host(&self) -> Option<bool> {
        let host = self.tournament.as_ref()?.host_username.as_deref()?;
        Some(self.is_self(host))
    }

    pub fn self_ready(&self) -> bool {
        self.self_ready
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn pending_transition(&self) -> Option<StageTransition> {
        self.pending_transition
    }

    /// Once terminal, score, keys and stage are frozen.
    pub fn is_terminal(&self) -> bool {
        self.game.game_completed
    }

    // ── Identity ────────────────────────────────────────────────────

    pub fn set_self_name(&mut self, name: impl Into<String>) {
        self.self_name = Some(name.into());
    }

    // ── Lobby intents ───────────────────────────────────────────────

    /// Seed or reconcile from a full status snapshot.
    ///
    /// The participant list is replaced wholesale. Applying the same snapshot
    /// twice gives the same state as applying it once.
    pub fn hydrate(&mut self, snapshot: &StatusSnapshot) {
        let info = &snapshot.tournament;
        self.tournament = Some(TournamentSession {
            id: info.id.clone(),
            room_code: info.room_code.clone(),
            host_username: info.host_username.clone(),
            stage: info.stage,
            time_limit: info.time_limit,
            max_participants: info.max_participants,
        });

        let mut participants: Vec<Participant> = Vec::with_capacity(snapshot.participants.len());
        for record in &snapshot.participants {
            let Some(name) = record.display_name() else {
                continue;
            };
            if participants.iter().any(|p| p.name == name) {
                continue;
            }
            let previous = self.participant(name);
            participants.push(Participant {
                name: name.to_string(),
                is_guest: record.is_guest,
                is_ready: record.is_ready,
                stage: previous.map_or(info.stage, |p| p.stage),
                score: previous.map_or(record.final_score, |p| p.score),
                status: previous.map_or(ParticipantStatus::Active, |p| p.status),
            });
        }
        self.participants = participants;

        if let Some(me) = self.self_name.as_deref() {
            if let Some(p) = self.participants.iter().find(|p| p.name == me) {
                self.self_ready = p.is_ready;
            }
        }

        if self.is_terminal() {
            debug!(tournament_id = %info.id, "hydrate: session terminal, game fields frozen");
            return;
        }

        let was_running = self.status == TournamentStatus::Active;
        if info.status == TournamentStatus::Other {
            debug!(tournament_id = %info.id, status = ?self.status, "hydrate: unknown tournament status, keeping prior");
        } else {
            self.status = info.status;
        }
        // `stage` is the configured starting stage. Once the match runs, the
        // answer results own the current stage and a snapshot may not lower it.
        if was_running {
            self.game.current_stage = self.game.current_stage.max(info.stage);
        } else {
            self.game.current_stage = info.stage;
        }
        if let Some(secs) = snapshot.time_remaining {
            self.correct_time_remaining(secs);
        }
        if self.status == TournamentStatus::Active && self.game.messages.is_empty() {
            self.game.messages.push(ChatMessage::new(
                Role::Assistant,
                welcome_text(self.game.current_stage),
            ));
        }
        if info.status.is_terminal() {
            self.set_terminal(None, None);
        }
    }

    /// Add a participant unless one with the same name exists. Returns
    /// `true` if the list changed.
    pub fn upsert_participant(&mut self, name: &str, is_guest: bool) -> bool {
        if name.is_empty() || self.participant(name).is_some() {
            return false;
        }
        self.participants.push(Participant::new(name, is_guest));
        true
    }

    /// Apply a readiness change. `all_ready` decides between `Ready` and
    /// `Lobby` while the match has not started.
    pub fn set_ready(&mut self, name: &str, ready: bool, all_ready: bool) {
        self.upsert_participant(name, false);
        if let Some(p) = self.participants.iter_mut().find(|p| p.name == name) {
            p.is_ready = ready;
        }
        if self.is_self(name) {
            self.self_ready = ready;
        }

        match (self.status, all_ready) {
            (TournamentStatus::Lobby, true) => self.status = TournamentStatus::Ready,
            (TournamentStatus::Ready, false) => self.status = TournamentStatus::Lobby,
            _ => {}
        }
    }

    /// Record our own readiness after the service acknowledged it.
    pub fn set_self_ready(&mut self, ready: bool) {
        self.self_ready = ready;
        if let Some(me) = self.self_name.clone() {
            if let Some(p) = self.participants.iter_mut().find(|p| p.name == me) {
                p.is_ready = ready;
            }
        }
    }

    /// Move to `Active` and open a fresh transcript for `stage`. Returns
    /// `false` if the match was already running or is over.
    pub fn mark_started(&mut self, stage: Option<u32>, time_limit: Option<u64>) -> bool {
        if self.is_terminal() || self.status == TournamentStatus::Active {
            return false;
        }
        let stage = stage
            .or_else(|| self.tournament.as_ref().map(|t| t.stage))
            .unwrap_or(1);
        let time_limit = time_limit
            .or_else(|| self.tournament.as_ref().and_then(|t| t.time_limit))
            .unwrap_or(DEFAULT_TIME_LIMIT_SECS);

        if let Some(t) = self.tournament.as_mut() {
            t.stage = stage;
            t.time_limit = Some(time_limit);
        }
        self.status = TournamentStatus::Active;
        self.game.current_stage = stage;
        self.game.time_remaining = Some(time_limit);
        self.game.messages = vec![ChatMessage::new(Role::Assistant, welcome_text(stage))];
        true
    }

    // ── Game intents ────────────────────────────────────────────────

    /// Apply a successful `submit-answer` round-trip.
    ///
    /// Returns `None` without touching anything when the session is already
    /// terminal, so a late response cannot rewrite a finished match.
    pub fn apply_answer_result(
        &mut self,
        prompt: &str,
        response: &SubmitAnswerResponse,
    ) -> Option<AnswerOutcome> {
        if self.is_terminal() {
            debug!("answer result arrived after session end, ignored");
            return None;
        }

        let result = &response.result;
        let prev_stage = self.game.current_stage;

        let new_keys: Vec<String> = {
            let known: HashSet<&str> = self.game.extracted_keys.iter().map(String::as_str).collect();
            let mut seen = HashSet::new();
            result
                .extracted_keys
                .iter()
                .filter(|k| !known.contains(k.as_str()) && seen.insert(k.as_str()))
                .cloned()
                .collect()
        };

        if !prompt.is_empty() {
            self.game.messages.push(ChatMessage::new(Role::User, prompt));
        }
        self.game
            .messages
            .push(ChatMessage::new(Role::Assistant, result.reply_text()));

        let mut seen = HashSet::new();
        self.game.extracted_keys = result
            .extracted_keys
            .iter()
            .filter(|k| seen.insert(k.as_str()))
            .cloned()
            .collect();
        self.game.score = result.total_score.unwrap_or(self.game.score);
        self.game.keys_found = result.keys_found.unwrap_or(self.game.keys_found);
        self.game.total_keys = result.total_keys.unwrap_or(self.game.total_keys);
        self.game.current_stage = response.current_stage;
        self.game.stage_completed = response.status == AnswerStatus::StageCompleted;

        if !new_keys.is_empty() {
            self.game.messages.push(ChatMessage::new(
                Role::KeyExtraction,
                format!("Key extracted: {}", new_keys.join(", ")),
            ));
        }

        let mut transition = None;
        if response.current_stage > prev_stage {
            self.transition_seq += 1;
            let t = StageTransition {
                from: prev_stage,
                to: response.current_stage,
                score: self.game.score,
                seq: self.transition_seq,
            };
            self.game.messages.push(ChatMessage::new(
                Role::StageTransition,
                format!(
                    "Stage {} completed! Moving to {}...",
                    t.from,
                    stage_info(t.to).name
                ),
            ));
            self.pending_transition = Some(t);
            transition = Some(t);
        }

        let score = self.game.score;
        match response.status {
            AnswerStatus::TournamentWon => {
                self.game.messages.push(ChatMessage::new(
                    Role::System,
                    format!(
                        "TOURNAMENT WINNER! You completed Stage {prev_stage} first! Final Score: {score}"
                    ),
                ));
                self.enter_terminal(self.self_name.clone(), Some(score), true);
                transition = None;
            }
            AnswerStatus::Completed => {
                self.game.messages.push(ChatMessage::new(
                    Role::System,
                    format!("Congratulations! You've completed all stages! Final Score: {score}"),
                ));
                self.enter_terminal(self.self_name.clone(), Some(score), true);
                transition = None;
            }
            AnswerStatus::InProgress | AnswerStatus::StageCompleted => {}
        }

        Some(AnswerOutcome {
            status: response.status,
            new_keys,
            transition,
            score,
            terminal: self.is_terminal(),
        })
    }

    /// Finish the match with the given winner. Appends the closing transcript
    /// line. Returns `None` if the session was already terminal.
    pub fn set_terminal(
        &mut self,
        winner: Option<String>,
        final_score: Option<i64>,
    ) -> Option<Outcome> {
        if self.is_terminal() {
            return None;
        }
        let won = winner.as_deref().is_some_and(|w| self.is_self(w));
        let line = match (&winner, won) {
            (Some(_), true) => {
                "TOURNAMENT WINNER! You completed the stage first and won the tournament!".to_string()
            }
            (Some(w), false) => format!("Tournament ended! {w} won by completing the stage first."),
            (None, _) => "Tournament ended.".to_string(),
        };
        self.game.messages.push(ChatMessage::new(Role::System, line));
        self.enter_terminal(winner, final_score, won);
        self.outcome.clone()
    }

    fn enter_terminal(&mut self, winner: Option<String>, final_score: Option<i64>, won: bool) {
        self.game.game_completed = true;
        self.game.stage_completed = false;
        self.status = TournamentStatus::Completed;
        self.pending_transition = None;
        self.outcome = Some(Outcome {
            winner,
            final_score,
            won,
        });
    }

    /// Outcome reported for an answer whose result arrived after the session
    /// ended. Nothing is applied; the frozen score is echoed back.
    pub fn settled_outcome(&self, response: &SubmitAnswerResponse) -> AnswerOutcome {
        AnswerOutcome {
            status: response.status,
            new_keys: Vec::new(),
            transition: None,
            score: self.game.score,
            terminal: true,
        }
    }

    /// Second phase of a stage advance: replace the transcript with a fresh
    /// one for the new stage. Does nothing for a stale `seq` or after the
    /// session ended.
    pub fn finish_stage_transition(&mut self, seq: u64) -> bool {
        if self.is_terminal() {
            return false;
        }
        let Some(t) = self.pending_transition.filter(|t| t.seq == seq) else {
            return false;
        };
        self.pending_transition = None;
        self.game.stage_completed = false;
        self.game.messages = vec![ChatMessage::new(
            Role::StageTransition,
            format!("Stage {} completed! Welcome to Stage {}!", t.from, t.to),
        )];
        true
    }

    // ── Clock ───────────────────────────────────────────────────────

    /// Count down by `secs` while the match is running. Returns the new value.
    pub fn tick(&mut self, secs: u64) -> Option<u64> {
        if self.is_terminal() || self.status != TournamentStatus::Active {
            return self.game.time_remaining;
        }
        if let Some(t) = self.game.time_remaining.as_mut() {
            *t = t.saturating_sub(secs);
        }
        self.game.time_remaining
    }

    /// Replace the countdown with a server value (fractional seconds are
    /// dropped).
    pub fn correct_time_remaining(&mut self, secs: f64) {
        if self.is_terminal() {
            return;
        }
        let secs = if secs.is_finite() { secs.max(0.0).floor() } else { 0.0 };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let secs = secs as u64;
        self.game.time_remaining = Some(secs);
    }

    // ── Leaderboard ─────────────────────────────────────────────────

    /// Replace the leaderboard wholesale, sorted by score descending. Equal
    /// scores keep server order. Matching participants pick up the reported
    /// stage, score and status.
    pub fn replace_leaderboard(&mut self, mut entries: Vec<LeaderboardEntry>) {
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        for entry in &entries {
            let Some(name) = entry.username.as_deref() else {
                continue;
            };
            if let Some(p) = self.participants.iter_mut().find(|p| p.name == name) {
                p.stage = entry.stage;
                p.score = entry.score;
                p.status = entry.status;
            }
        }
        self.leaderboard = entries;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(DEFAULT_PARTICIPANT_CAPACITY, None)
    }
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
    use crate::protocol::{AnswerResult, ParticipantRecord, TournamentInfo};

    fn snapshot(status: TournamentStatus, time_remaining: Option<f64>) -> StatusSnapshot {
        StatusSnapshot {
            tournament: TournamentInfo {
                id: "t-1".into(),
                room_code: "ABC123".into(),
                host_username: Some("alice".into()),
                stage: 1,
                status,
                time_limit: Some(600),
                max_participants: Some(4),
                tournament_mode: None,
                started_at: None,
            },
            participants: vec![
                ParticipantRecord {
                    username: Some("alice".into()),
                    is_ready: true,
                    ..Default::default()
                },
                ParticipantRecord {
                    guest_name: Some("bob".into()),
                    is_guest: true,
                    ..Default::default()
                },
            ],
            time_remaining,
        }
    }

    fn answer(status: AnswerStatus, stage: u32, keys: &[&str], score: i64) -> SubmitAnswerResponse {
        SubmitAnswerResponse {
            status,
            current_stage: stage,
            result: AnswerResult {
                response: Some("reply".into()),
                total_score: Some(score),
                extracted_keys: keys.iter().map(|k| k.to_string()).collect(),
                keys_found: Some(u32::try_from(keys.len()).unwrap()),
                total_keys: Some(2),
                ..Default::default()
            },
        }
    }

    #[test]
    fn duplicate_joins_keep_one_entry() {
        let mut state = SessionState::default();
        assert!(state.upsert_participant("alice", false));
        for _ in 0..5 {
            assert!(!state.upsert_participant("alice", false));
        }
        assert_eq!(state.participants().len(), 1);
    }

    #[test]
    fn ready_status_follows_latest_all_ready_flag() {
        let mut state = SessionState::default();
        state.set_ready("alice", true, false);
        assert_eq!(state.status(), TournamentStatus::Lobby);
        state.set_ready("bob", true, true);
        assert_eq!(state.status(), TournamentStatus::Ready);
        state.set_ready("bob", false, false);
        assert_eq!(state.status(), TournamentStatus::Lobby);
        assert!(state.participant("alice").unwrap().is_ready);
        assert!(!state.participant("bob").unwrap().is_ready);
    }

    #[test]
    fn ready_does_not_rewind_an_active_match() {
        let mut state = SessionState::default();
        state.mark_started(Some(1), Some(60));
        state.set_ready("alice", false, false);
        assert_eq!(state.status(), TournamentStatus::Active);
    }

    #[test]
    fn snapshot_does_not_rewind_an_advanced_stage() {
        let mut state = SessionState::new(2, Some("alice".into()));
        state.hydrate(&snapshot(TournamentStatus::Active, Some(600.0)));
        assert_eq!(state.game().current_stage, 1);

        let first = state
            .apply_answer_result("go", &answer(AnswerStatus::StageCompleted, 2, &["K1"], 100))
            .unwrap();
        assert!(first.transition.is_some());

        state.hydrate(&snapshot(TournamentStatus::Active, Some(500.0)));
        assert_eq!(state.game().current_stage, 2);

        let second = state
            .apply_answer_result("again", &answer(AnswerStatus::InProgress, 2, &["K1"], 110))
            .unwrap();
        assert!(second.transition.is_none());
    }

    #[test]
    fn unknown_snapshot_status_keeps_the_prior_one() {
        let mut state = SessionState::new(2, Some("alice".into()));
        state.hydrate(&snapshot(TournamentStatus::Active, Some(300.0)));
        state.hydrate(&snapshot(TournamentStatus::Other, Some(290.0)));
        assert_eq!(state.status(), TournamentStatus::Active);
        assert_eq!(state.game().time_remaining, Some(290));
    }

    #[test]
    fn settled_outcome_leaves_a_finished_match_alone() {
        let mut state = SessionState::new(2, Some("alice".into()));
        state.hydrate(&snapshot(TournamentStatus::Active, None));
        assert!(state.set_terminal(Some("alice".into()), Some(640)).is_some());
        let frozen = state.clone();

        let late = answer(AnswerStatus::TournamentWon, 1, &["K1", "K2"], 640);
        assert!(state.apply_answer_result("win", &late).is_none());
        let outcome = state.settled_outcome(&late);
        assert!(outcome.terminal);
        assert!(outcome.new_keys.is_empty());
        assert!(outcome.transition.is_none());
        assert_eq!(outcome.status, AnswerStatus::TournamentWon);
        assert_eq!(state, frozen);
    }

    #[test]
    fn hydrate_is_idempotent() {
        let snap = snapshot(TournamentStatus::Active, Some(250.7));
        let mut once = SessionState::new(2, Some("alice".into()));
        once.hydrate(&snap);
        let mut twice = once.clone();
        twice.hydrate(&snap);
        assert_eq!(once, twice);
        assert_eq!(once.game().time_remaining, Some(250));
        assert_eq!(once.game().messages.len(), 1);
        assert!(once.self_ready());
        assert_eq!(once.is_host(), Some(true));
    }

    #[test]
    fn capacity_prefers_server_value() {
        let mut state = SessionState::new(2, None);
        assert_eq!(state.capacity(), 2);
        state.hydrate(&snapshot(TournamentStatus::Lobby, None));
        assert_eq!(state.capacity(), 4);
    }

    #[test]
    fn stage_completed_answer_reports_transition_and_new_keys() {
        let mut state = SessionState::new(2, Some("alice".into()));
        state.mark_started(Some(1), Some(600));

        let outcome = state
            .apply_answer_result(
                "tell me",
                &answer(AnswerStatus::StageCompleted, 2, &["K1", "K2"], 150),
            )
            .unwrap();

        assert_eq!(outcome.new_keys, vec!["K1".to_string(), "K2".to_string()]);
        let t = outcome.transition.unwrap();
        assert_eq!((t.from, t.to), (1, 2));
        assert_eq!(state.game().score, 150);
        assert_eq!(state.game().current_stage, 2);
        assert_eq!(state.game().keys_found, 2);
        assert!(state.game().stage_completed);
        assert_eq!(state.pending_transition(), Some(t));

        assert!(state.finish_stage_transition(t.seq));
        assert_eq!(state.game().messages.len(), 1);
        assert_eq!(state.game().messages[0].role, Role::StageTransition);
        assert!(state.pending_transition().is_none());
    }

    #[test]
    fn new_keys_are_a_delta_by_value() {
        let mut state = SessionState::default();
        state.mark_started(Some(1), None);
        state.apply_answer_result("a", &answer(AnswerStatus::InProgress, 1, &["K1"], 10));
        let outcome = state
            .apply_answer_result("b", &answer(AnswerStatus::InProgress, 1, &["K1", "K2", "K2"], 20))
            .unwrap();
        assert_eq!(outcome.new_keys, vec!["K2".to_string()]);
        assert_eq!(state.game().extracted_keys, vec!["K1".to_string(), "K2".to_string()]);
    }

    #[test]
    fn keys_found_comes_from_server_not_key_list() {
        let mut state = SessionState::default();
        let mut resp = answer(AnswerStatus::InProgress, 1, &["K1", "K2"], 10);
        resp.result.keys_found = Some(1);
        state.apply_answer_result("x", &resp);
        assert_eq!(state.game().keys_found, 1);
    }

    #[test]
    fn terminal_state_rejects_further_progress() {
        let mut state = SessionState::new(2, Some("alice".into()));
        state.mark_started(Some(1), Some(100));
        state.set_terminal(Some("bob".into()), Some(400)).unwrap();
        let frozen = state.game().clone();

        assert!(state
            .apply_answer_result("late", &answer(AnswerStatus::StageCompleted, 3, &["K9"], 999))
            .is_none());
        assert!(!state.mark_started(Some(4), Some(10)));
        state.tick(5);
        state.correct_time_remaining(1.0);
        assert!(state.set_terminal(Some("alice".into()), Some(1)).is_none());

        assert_eq!(state.game(), &frozen);
        let outcome = state.outcome().unwrap();
        assert_eq!(outcome.winner.as_deref(), Some("bob"));
        assert!(!outcome.won);
    }

    #[test]
    fn tournament_won_answer_is_terminal() {
        let mut state = SessionState::new(2, Some("alice".into()));
        state.mark_started(Some(2), Some(100));
        let outcome = state
            .apply_answer_result("go", &answer(AnswerStatus::TournamentWon, 2, &["K1", "K2"], 640))
            .unwrap();
        assert!(outcome.terminal);
        assert!(state.is_terminal());
        assert!(state.outcome().unwrap().won);
        assert_eq!(state.status(), TournamentStatus::Completed);
    }

    #[test]
    fn terminal_cancels_pending_transition() {
        let mut state = SessionState::default();
        state.mark_started(Some(1), None);
        let t = state
            .apply_answer_result("x", &answer(AnswerStatus::StageCompleted, 2, &["K1"], 50))
            .unwrap()
            .transition
            .unwrap();
        state.set_terminal(None, None);
        assert!(!state.finish_stage_transition(t.seq));
        assert_eq!(state.game().messages.last().unwrap().content, "Tournament ended.");
    }

    #[test]
    fn stale_transition_seq_is_ignored() {
        let mut state = SessionState::default();
        state.mark_started(Some(1), None);
        let first = state
            .apply_answer_result("x", &answer(AnswerStatus::StageCompleted, 2, &[], 50))
            .unwrap()
            .transition
            .unwrap();
        let second = state
            .apply_answer_result("y", &answer(AnswerStatus::StageCompleted, 3, &[], 90))
            .unwrap()
            .transition
            .unwrap();
        assert!(!state.finish_stage_transition(first.seq));
        assert!(state.finish_stage_transition(second.seq));
    }

    #[test]
    fn countdown_is_corrected_not_accumulated() {
        let mut state = SessionState::default();
        state.mark_started(Some(1), Some(100));
        assert_eq!(state.tick(1), Some(99));
        assert_eq!(state.tick(200), Some(0));
        state.correct_time_remaining(42.9);
        assert_eq!(state.game().time_remaining, Some(42));
        state.correct_time_remaining(-3.0);
        assert_eq!(state.game().time_remaining, Some(0));
    }

    #[test]
    fn countdown_only_runs_while_active() {
        let mut state = SessionState::default();
        state.correct_time_remaining(30.0);
        assert_eq!(state.tick(1), Some(30));
    }

    #[test]
    fn leaderboard_sorts_by_score_and_keeps_tie_order() {
        let entry = |name: &str, score| LeaderboardEntry {
            rank: 0,
            username: Some(name.into()),
            is_guest: false,
            stage: 1,
            score,
            time_taken: 0.0,
            status: ParticipantStatus::Active,
            completed_at: None,
        };
        let mut state = SessionState::default();
        state.upsert_participant("carol", false);
        state.replace_leaderboard(vec![
            entry("alice", 10),
            entry("bob", 30),
            entry("carol", 10),
            entry("dave", 30),
        ]);
        let names: Vec<_> = state
            .leaderboard()
            .iter()
            .map(|e| e.username.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["bob", "dave", "alice", "carol"]);
        assert_eq!(state.participant("carol").unwrap().score, 10);
    }

    #[test]
    fn reset_keeps_identity() {
        let mut state = SessionState::new(3, Some("alice".into()));
        state.hydrate(&snapshot(TournamentStatus::Lobby, None));
        state.reset();
        assert!(state.tournament().is_none());
        assert!(state.participants().is_empty());
        assert_eq!(state.self_name(), Some("alice"));
        assert_eq!(state.capacity(), 3);
    }
}
