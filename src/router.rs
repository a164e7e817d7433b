//! Applies push frames to the session.
//!
//! The router is synchronous and never performs I/O. Pushes are treated as
//! triggers: anything that needs server truth (the leaderboard after a
//! `progress_update`) is requested through [`Dispatch`] and fetched over REST
//! by the caller.

use tracing::{debug, info};

use crate::event::TournamentEvent;
use crate::notifications::{Notification, NotificationQueue, Severity};
use crate::protocol::{PushMessage, TournamentId};
use crate::session::SessionState;

/// What the caller must do after a frame was routed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Events to forward to the presentation layer, in order.
    pub events: Vec<TournamentEvent>,
    /// Re-fetch the leaderboard over REST.
    pub refresh_leaderboard: bool,
    /// The match just ended. Pending stage transitions must be cancelled.
    pub session_over: bool,
}

/// Routes [`PushMessage`]s for one tournament onto its [`SessionState`].
#[derive(Debug, Clone)]
pub struct MessageRouter {
    tournament_id: TournamentId,
}

impl MessageRouter {
    pub fn new(tournament_id: impl Into<TournamentId>) -> Self {
        Self {
            tournament_id: tournament_id.into(),
        }
    }

    pub fn tournament_id(&self) -> &str {
        &self.tournament_id
    }

    /// Apply one push frame.
    pub fn route(
        &self,
        msg: PushMessage,
        state: &mut SessionState,
        notices: &NotificationQueue,
    ) -> Dispatch {
        let mut dispatch = Dispatch::default();
        debug!(tournament_id = %self.tournament_id, kind = msg.kind(), "routing push frame");

        match msg {
            PushMessage::ParticipantJoined {
                username,
                guest_name,
                participant_count,
            } => {
                let is_guest = username.is_none();
                let Some(name) = username.or(guest_name) else {
                    debug!(tournament_id = %self.tournament_id, "participant_joined without a name, ignored");
                    return dispatch;
                };
                if state.upsert_participant(&name, is_guest) {
                    dispatch.events.push(TournamentEvent::ParticipantJoined {
                        name,
                        is_guest,
                        participant_count,
                    });
                }
            }

            PushMessage::ReadyStatusChanged {
                username,
                is_ready,
                all_ready,
            } => {
                state.set_ready(&username, is_ready, all_ready);
                dispatch.events.push(TournamentEvent::ReadyChanged {
                    name: username,
                    is_ready,
                    status: state.status(),
                });
            }

            PushMessage::TournamentStarted {
                time_limit, stage, ..
            } => {
                if state.mark_started(stage, time_limit) {
                    info!(tournament_id = %self.tournament_id, "tournament started");
                    dispatch.events.push(TournamentEvent::TournamentStarted {
                        stage: state.game().current_stage,
                        time_limit: state.game().time_remaining,
                    });
                }
            }

            PushMessage::ProgressUpdate {
                username,
                notification,
                warning,
                ..
            } => {
                dispatch.refresh_leaderboard = true;
                let from_self = username.as_deref().is_some_and(|u| state.is_self(u));
                if !from_self {
                    if let Some(text) = notification {
                        push_notice(&mut dispatch, notices, text, Severity::Success);
                    }
                    if let Some(text) = warning {
                        push_notice(&mut dispatch, notices, text, Severity::Warning);
                    }
                }
            }

            PushMessage::TournamentEnded {
                winner,
                final_score,
                ..
            }
            | PushMessage::TournamentCompleted {
                winner,
                final_score,
                ..
            } => {
                let Some(outcome) = state.set_terminal(winner, final_score) else {
                    debug!(tournament_id = %self.tournament_id, "session already over, end frame ignored");
                    return dispatch;
                };
                info!(
                    tournament_id = %self.tournament_id,
                    winner = ?outcome.winner,
                    won = outcome.won,
                    "tournament over"
                );
                let notice = match (&outcome.winner, outcome.won) {
                    (_, true) => "🏆 Congratulations! You won the tournament!".to_string(),
                    (Some(w), false) => format!("Tournament ended! Winner: {w}"),
                    (None, false) => "Tournament ended!".to_string(),
                };
                let severity = if outcome.won {
                    Severity::Success
                } else {
                    Severity::Info
                };
                push_notice(&mut dispatch, notices, notice, severity);
                dispatch.session_over = true;
                dispatch.refresh_leaderboard = true;
                dispatch.events.push(TournamentEvent::SessionOver {
                    winner: outcome.winner,
                    final_score: outcome.final_score,
                    won: outcome.won,
                });
            }

            PushMessage::Pong | PushMessage::Unknown => {}
        }

        dispatch
    }
}

fn push_notice(
    dispatch: &mut Dispatch,
    notices: &NotificationQueue,
    message: String,
    severity: Severity,
) {
    let id = notices.push(message.clone(), severity);
    dispatch.events.push(TournamentEvent::Notice(Notification {
        id,
        message,
        severity,
    }));
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
    use crate::protocol::TournamentStatus;

    fn frame(json: &str) -> PushMessage {
        serde_json::from_str(json).unwrap()
    }

    fn setup(self_name: &str) -> (MessageRouter, SessionState, NotificationQueue) {
        (
            MessageRouter::new("ABC123"),
            SessionState::new(2, Some(self_name.to_string())),
            NotificationQueue::default(),
        )
    }

    #[tokio::test]
    async fn lobby_scenario_reaches_ready() {
        let (router, mut state, notices) = setup("alice");
        for json in [
            r#"{"type":"participant_joined","username":"alice"}"#,
            r#"{"type":"participant_joined","username":"bob"}"#,
            r#"{"type":"ready_status_changed","username":"alice","is_ready":true,"all_ready":false}"#,
            r#"{"type":"ready_status_changed","username":"bob","is_ready":true,"all_ready":true}"#,
        ] {
            router.route(frame(json), &mut state, &notices);
        }
        assert_eq!(state.status(), TournamentStatus::Ready);
        assert_eq!(state.participants().len(), 2);
        assert!(state.self_ready());
    }

    #[tokio::test]
    async fn duplicate_join_emits_nothing() {
        let (router, mut state, notices) = setup("alice");
        let json = r#"{"type":"participant_joined","guest_name":"neo","participant_count":2}"#;
        let first = router.route(frame(json), &mut state, &notices);
        let second = router.route(frame(json), &mut state, &notices);
        assert_eq!(first.events.len(), 1);
        assert!(second.events.is_empty());
        assert!(state.participant("neo").unwrap().is_guest);
    }

    #[tokio::test]
    async fn progress_from_opponent_notifies_and_refreshes() {
        let (router, mut state, notices) = setup("alice");
        let dispatch = router.route(
            frame(
                r#"{"type":"progress_update","username":"bob","stage":1,"score":50,
                    "notification":"bob unlocked Key 1!","warning":"bob is close!"}"#,
            ),
            &mut state,
            &notices,
        );
        assert!(dispatch.refresh_leaderboard);
        let severities: Vec<Severity> = notices.list().iter().map(|n| n.severity).collect();
        assert_eq!(severities, vec![Severity::Success, Severity::Warning]);
        assert_eq!(state.game().score, 0);
    }

    #[tokio::test]
    async fn progress_from_self_is_silent() {
        let (router, mut state, notices) = setup("alice");
        let dispatch = router.route(
            frame(r#"{"type":"progress_update","username":"alice","notification":"you!"}"#),
            &mut state,
            &notices,
        );
        assert!(dispatch.refresh_leaderboard);
        assert!(notices.is_empty());
    }

    #[tokio::test]
    async fn tournament_end_is_applied_once() {
        let (router, mut state, notices) = setup("alice");
        let json = r#"{"type":"tournament_ended","winner":"bob","final_score":300}"#;
        let first = router.route(frame(json), &mut state, &notices);
        assert!(first.session_over);
        assert!(state.is_terminal());
        assert_eq!(notices.list()[0].message, "Tournament ended! Winner: bob");

        let again = router.route(
            frame(r#"{"type":"tournament_completed","winner":"alice"}"#),
            &mut state,
            &notices,
        );
        assert_eq!(again, Dispatch::default());
        assert_eq!(state.outcome().unwrap().winner.as_deref(), Some("bob"));
        assert_eq!(notices.len(), 1);
    }

    #[tokio::test]
    async fn winning_end_frame_congratulates() {
        let (router, mut state, notices) = setup("alice");
        let dispatch = router.route(
            frame(r#"{"type":"tournament_ended","winner":"alice","final_score":500}"#),
            &mut state,
            &notices,
        );
        assert!(matches!(
            dispatch.events.last(),
            Some(TournamentEvent::SessionOver { won: true, .. })
        ));
        assert_eq!(notices.list()[0].severity, Severity::Success);
    }

    #[tokio::test]
    async fn progress_after_end_changes_no_game_fields() {
        let (router, mut state, notices) = setup("alice");
        router.route(
            frame(r#"{"type":"tournament_started","stage":2,"time_limit":600}"#),
            &mut state,
            &notices,
        );
        router.route(
            frame(r#"{"type":"tournament_completed"}"#),
            &mut state,
            &notices,
        );
        let frozen = state.game().clone();
        router.route(
            frame(r#"{"type":"progress_update","username":"bob","stage":5,"score":900}"#),
            &mut state,
            &notices,
        );
        router.route(
            frame(r#"{"type":"tournament_started","stage":4}"#),
            &mut state,
            &notices,
        );
        assert_eq!(state.game(), &frozen);
    }

    #[tokio::test]
    async fn start_seeds_game_and_ignores_duplicates() {
        let (router, mut state, notices) = setup("alice");
        let json = r#"{"type":"tournament_started","stage":3,"time_limit":120}"#;
        let first = router.route(frame(json), &mut state, &notices);
        assert_eq!(
            first.events,
            vec![TournamentEvent::TournamentStarted {
                stage: 3,
                time_limit: Some(120)
            }]
        );
        assert_eq!(state.status(), TournamentStatus::Active);
        assert!(state.game().messages[0].content.contains("Logic Hacker"));

        let second = router.route(frame(json), &mut state, &notices);
        assert!(second.events.is_empty());
    }

    #[tokio::test]
    async fn pong_and_unknown_are_ignored() {
        let (router, mut state, notices) = setup("alice");
        let before = state.clone();
        for json in [r#"{"type":"pong"}"#, r#"{"type":"chat","text":"hi"}"#] {
            assert_eq!(
                router.route(frame(json), &mut state, &notices),
                Dispatch::default()
            );
        }
        assert_eq!(state, before);
    }
}
