//! Events emitted by [`TournamentClient`](crate::client::TournamentClient).
//!
//! Events are notifications that something changed. The full picture is
//! always available from [`TournamentClient::session`](crate::client::TournamentClient::session).

use crate::notifications::Notification;
use crate::protocol::TournamentStatus;

/// Everything the presentation layer may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TournamentEvent {
    /// The push channel for the open tournament is up. `reconnect` is `true`
    /// for every connection after the first.
    Connected { reconnect: bool },
    /// The push channel dropped. A reconnect is scheduled unless the
    /// tournament was left.
    Disconnected { reason: Option<String> },
    /// A participant appeared in the lobby for the first time.
    ParticipantJoined {
        name: String,
        is_guest: bool,
        participant_count: Option<usize>,
    },
    /// Someone's ready flag changed.
    ReadyChanged {
        name: String,
        is_ready: bool,
        status: TournamentStatus,
    },
    /// The match began on `stage`.
    TournamentStarted { stage: u32, time_limit: Option<u64> },
    /// The session was rebuilt from a REST status snapshot.
    Hydrated { status: TournamentStatus },
    /// The leaderboard was replaced with fresh server data.
    LeaderboardUpdated,
    /// Our answer produced keys not seen before.
    KeysAcquired { keys: Vec<String> },
    /// Our answer advanced us to a new stage. The transcript is reset once
    /// the transition delay elapses.
    StageTransition { from: u32, to: u32, score: i64 },
    /// The delayed transcript reset after a stage advance happened.
    StageTranscriptReset { stage: u32 },
    /// The match is over.
    SessionOver {
        winner: Option<String>,
        final_score: Option<i64>,
        won: bool,
    },
    /// A transient notice was queued.
    Notice(Notification),
}
