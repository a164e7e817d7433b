#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Push-frame ordering properties for the message router.
//!
//! Frames can arrive in any order relative to each other. The lobby must end
//! up in the state the last frame per participant describes, no matter how
//! they interleave.

use std::time::Duration;

use tournament_sync_client::protocol::{PushMessage, TournamentStatus};
use tournament_sync_client::{MessageRouter, NotificationQueue, SessionState};

fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

fn ready(name: &str, is_ready: bool, all_ready: bool) -> PushMessage {
    PushMessage::ReadyStatusChanged {
        username: name.into(),
        is_ready,
        all_ready,
    }
}

fn joined(name: &str) -> PushMessage {
    PushMessage::ParticipantJoined {
        username: Some(name.into()),
        guest_name: None,
        participant_count: None,
    }
}

fn run(frames: impl IntoIterator<Item = PushMessage>) -> SessionState {
    let router = MessageRouter::new("t-1");
    let notices = NotificationQueue::new(Duration::from_secs(3));
    let mut state = SessionState::new(3, Some("alice".into()));
    for frame in frames {
        router.route(frame, &mut state, &notices);
    }
    state
}

#[tokio::test]
async fn all_ready_in_any_order_reaches_ready() {
    let names = ["alice", "bob", "carol"];
    for order in permutations(&names) {
        let last = order.len() - 1;
        let frames = order
            .iter()
            .enumerate()
            .map(|(i, name)| ready(name, true, i == last));
        let state = run(frames);

        assert_eq!(state.status(), TournamentStatus::Ready, "order {order:?}");
        assert_eq!(state.participants().len(), 3);
        assert!(state.participants().iter().all(|p| p.is_ready));
        assert!(state.self_ready());
    }
}

#[tokio::test]
async fn joins_and_readies_interleaved_keep_one_entry_each() {
    let frames = vec![
        joined("alice"),
        joined("bob"),
        ready("alice", true, false),
        ready("bob", true, true),
        joined("bob"),
    ];
    for order in permutations(&frames) {
        let state = run(order.clone());
        let mut names: Vec<_> = state.participants().iter().map(|p| p.name.clone()).collect();
        names.sort();
        assert_eq!(names, ["alice", "bob"], "order {order:?}");
        assert!(state.participants().iter().all(|p| p.is_ready));
    }
}

#[tokio::test]
async fn last_frame_per_participant_wins() {
    // bob toggles on then off; whichever of his frames comes last decides.
    let frames = vec![
        ready("alice", true, false),
        ready("bob", true, true),
        ready("bob", false, false),
    ];
    for order in permutations(&frames) {
        let state = run(order.clone());
        let bob_last = order
            .iter()
            .rev()
            .find_map(|f| match f {
                PushMessage::ReadyStatusChanged {
                    username,
                    is_ready,
                    all_ready,
                } if username == "bob" => Some((*is_ready, *all_ready)),
                _ => None,
            })
            .unwrap();
        assert_eq!(state.participant("bob").unwrap().is_ready, bob_last.0);
        assert!(state.participant("alice").unwrap().is_ready);

        let last = &order[order.len() - 1];
        if let PushMessage::ReadyStatusChanged { all_ready, .. } = last {
            let expected = if *all_ready {
                TournamentStatus::Ready
            } else {
                TournamentStatus::Lobby
            };
            assert_eq!(state.status(), expected, "order {order:?}");
        }
    }
}

#[tokio::test]
async fn start_after_terminal_is_ignored() {
    let frames = vec![
        PushMessage::TournamentEnded {
            winner: Some("bob".into()),
            final_score: Some(300),
            stage: Some(1),
            message: None,
        },
        PushMessage::TournamentStarted {
            started_at: None,
            time_limit: Some(600),
            stage: Some(2),
        },
    ];
    let state = run(frames);
    assert!(state.is_terminal());
    assert_eq!(state.status(), TournamentStatus::Completed);
    assert_eq!(state.game().current_stage, 1);
}
