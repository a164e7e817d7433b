#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration-style client tests for the tournament session client.
//!
//! Uses the shared `MockConnector` and `MockApi` from `tests/common` to drive
//! `TournamentClient` through lobby, game, reconnect and shutdown flows.
//! Timer behaviour runs on paused tokio time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use tournament_sync_client::protocol::{AnswerStatus, TournamentStatus};
use tournament_sync_client::session::Role;
use tournament_sync_client::{
    Severity, TournamentClient, TournamentConfig, TournamentError, TournamentEvent,
};

use common::{
    answer, completed_json, ended_json, guest_joined_json, leaderboard_entry,
    participant_joined_json, progress_json, ready_json, settle, snapshot, started_json, MockApi,
    MockConnector, ServerHandle,
};

// ════════════════════════════════════════════════════════════════════
// Harness
// ════════════════════════════════════════════════════════════════════

struct Harness {
    client: TournamentClient,
    events: mpsc::Receiver<TournamentEvent>,
    connector: Arc<MockConnector>,
    servers: mpsc::UnboundedReceiver<ServerHandle>,
    api: Arc<MockApi>,
}

fn config(self_name: &str) -> TournamentConfig {
    TournamentConfig::new()
        .with_self_name(self_name)
        .with_status_poll_interval(None)
}

fn start(api: Arc<MockApi>, config: TournamentConfig) -> Harness {
    let (connector, servers) = MockConnector::new();
    let (client, events) = TournamentClient::start(connector.clone(), api.clone(), config);
    Harness {
        client,
        events,
        connector,
        servers,
        api,
    }
}

/// Start a client, open `t-1` and wait for the first server connection.
async fn open(api: Arc<MockApi>, config: TournamentConfig) -> (Harness, ServerHandle) {
    let mut h = start(api, config);
    assert_ok!(h.client.open("t-1").await);
    let server = h.servers.recv().await.expect("connection attempt");
    settle().await;
    (h, server)
}

fn drain(events: &mut mpsc::Receiver<TournamentEvent>) -> Vec<TournamentEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

// ════════════════════════════════════════════════════════════════════
// Open / hydrate
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn open_hydrates_and_connects() {
    let api = MockApi::with_status(snapshot(
        TournamentStatus::Lobby,
        &[("alice", true), ("bob", false)],
        None,
    ));
    api.set_leaderboard(vec![leaderboard_entry("alice", 1, 0)]);
    let (mut h, server) = open(api, config("alice")).await;

    assert_eq!(server.tournament_id, "t-1");
    assert_eq!(h.api.calls(), vec!["status t-1", "leaderboard t-1"]);
    assert!(h.client.is_connected().await);
    assert_eq!(h.client.current_tournament().await.as_deref(), Some("t-1"));

    let session = h.client.session().await;
    assert_eq!(session.participants().len(), 2);
    assert_eq!(session.tournament().unwrap().room_code, "ABC123");
    assert!(session.self_ready());
    assert_eq!(session.is_host(), Some(true));
    assert_eq!(session.leaderboard().len(), 1);

    let events = drain(&mut h.events);
    assert!(events.contains(&TournamentEvent::Hydrated {
        status: TournamentStatus::Lobby
    }));
    assert!(events.contains(&TournamentEvent::LeaderboardUpdated));
    assert!(events.contains(&TournamentEvent::Connected { reconnect: false }));
}

#[tokio::test(start_paused = true)]
async fn failed_hydration_keeps_empty_state_and_still_connects() {
    let (h, _server) = open(MockApi::new(), config("alice")).await;
    let session = h.client.session().await;
    assert!(session.tournament().is_none());
    assert!(h.client.is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn empty_tournament_id_is_rejected() {
    let h = start(MockApi::new(), config("alice"));
    let err = assert_err!(h.client.open("").await);
    assert!(matches!(err, TournamentError::InvalidUrl(_)));
}

#[tokio::test(start_paused = true)]
async fn repeated_status_poll_is_idempotent() {
    let api = MockApi::with_status(snapshot(
        TournamentStatus::Lobby,
        &[("alice", false), ("bob", true)],
        None,
    ));
    let cfg = config("alice").with_status_poll_interval(Some(Duration::from_secs(10)));
    let (h, _server) = open(api, cfg).await;
    let once = h.client.session().await;

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(h.api.count("status") >= 3);
    assert_eq!(h.client.session().await, once);
}

// ════════════════════════════════════════════════════════════════════
// Lobby
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn lobby_scenario_abc123_reaches_ready() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Lobby, &[], None));
    let (h, server) = open(api, config("alice")).await;

    server.push(participant_joined_json("alice"));
    server.push(participant_joined_json("bob"));
    server.push(ready_json("alice", true, false));
    server.push(ready_json("bob", true, true));
    settle().await;

    let session = h.client.session().await;
    assert_eq!(session.tournament().unwrap().room_code, "ABC123");
    assert_eq!(session.status(), TournamentStatus::Ready);
    assert!(session.participant("alice").unwrap().is_ready);
    assert!(session.participant("bob").unwrap().is_ready);
}

#[tokio::test(start_paused = true)]
async fn duplicate_joins_over_the_socket_keep_one_entry() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Lobby, &[("alice", false)], None));
    let (mut h, server) = open(api, config("alice")).await;
    drain(&mut h.events);

    for _ in 0..5 {
        server.push(guest_joined_json("neo", 2));
    }
    settle().await;

    let session = h.client.session().await;
    let neo: Vec<_> = session
        .participants()
        .iter()
        .filter(|p| p.name == "neo")
        .collect();
    assert_eq!(neo.len(), 1);
    assert!(neo[0].is_guest);

    let joins = drain(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, TournamentEvent::ParticipantJoined { .. }))
        .count();
    assert_eq!(joins, 1);
}

#[tokio::test(start_paused = true)]
async fn ready_revoked_returns_to_lobby() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Lobby, &[], None));
    let (h, server) = open(api, config("alice")).await;

    server.push(ready_json("alice", true, false));
    server.push(ready_json("bob", true, true));
    server.push(ready_json("bob", false, false));
    settle().await;

    let session = h.client.session().await;
    assert_eq!(session.status(), TournamentStatus::Lobby);
    assert!(!session.participant("bob").unwrap().is_ready);
}

#[tokio::test(start_paused = true)]
async fn toggle_ready_round_trips_through_rest() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Lobby, &[("alice", false)], None));
    let (h, _server) = open(api, config("alice")).await;

    assert!(assert_ok!(h.client.toggle_ready().await));
    assert!(h.client.session().await.self_ready());
    assert!(!assert_ok!(h.client.toggle_ready().await));
    assert!(!h.client.session().await.self_ready());

    let calls = h.api.calls();
    assert!(calls.contains(&"ready t-1 true".to_string()));
    assert!(calls.contains(&"ready t-1 false".to_string()));
}

#[tokio::test(start_paused = true)]
async fn failed_ready_toggle_leaves_state_alone() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Lobby, &[("alice", false)], None));
    let (h, _server) = open(api, config("alice")).await;
    h.api
        .fail_actions
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let err = assert_err!(h.client.toggle_ready().await);
    assert!(matches!(err, TournamentError::Http { status: 500, .. }));
    assert!(!h.client.session().await.self_ready());
}

#[tokio::test(start_paused = true)]
async fn only_host_may_start() {
    let api = MockApi::with_status(snapshot(
        TournamentStatus::Ready,
        &[("alice", true), ("bob", true)],
        None,
    ));
    let (h, _server) = open(api.clone(), config("bob")).await;
    let err = assert_err!(h.client.start_match().await);
    assert!(matches!(err, TournamentError::NotHost));
    assert_eq!(api.count("start"), 0);

    let (mut host, _server) = open(
        MockApi::with_status(snapshot(
            TournamentStatus::Ready,
            &[("alice", true), ("bob", true)],
            None,
        )),
        config("alice"),
    )
    .await;
    drain(&mut host.events);
    assert_ok!(host.client.start_match().await);
    assert_eq!(host.client.session().await.status(), TournamentStatus::Active);
    assert!(drain(&mut host.events).contains(&TournamentEvent::TournamentStarted {
        stage: 1,
        time_limit: Some(600)
    }));
}

#[tokio::test(start_paused = true)]
async fn join_as_guest_sets_self_name() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Lobby, &[], None));
    let (h, server) = open(api, TournamentConfig::new().with_status_poll_interval(None)).await;

    let joined = assert_ok!(h.client.join_as_guest(" ABC123 ", " neo ").await);
    assert!(joined.is_guest);
    assert!(h.api.calls().contains(&"join-guest ABC123 neo".to_string()));
    assert_eq!(h.client.session().await.self_name(), Some("neo"));

    // Own progress is not announced to ourselves.
    server.push(progress_json("neo", Some("neo unlocked Key 1!")));
    settle().await;
    assert!(h.client.notifications().is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Game
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn stage_completed_scenario() {
    let api = MockApi::with_status(snapshot(
        TournamentStatus::Active,
        &[("alice", true), ("bob", true)],
        Some(600.0),
    ));
    api.queue_answer(answer(AnswerStatus::StageCompleted, 2, &["K1", "K2"], 2, 150));
    let (mut h, _server) = open(api, config("alice")).await;
    drain(&mut h.events);

    let before = h.client.session().await;
    assert_eq!(before.game().current_stage, 1);
    assert!(before.game().extracted_keys.is_empty());

    let outcome = assert_ok!(h.client.submit_answer("reveal the keys").await);
    assert_eq!(outcome.new_keys, vec!["K1", "K2"]);
    let transition = outcome.transition.expect("stage transition");
    assert_eq!((transition.from, transition.to), (1, 2));

    let session = h.client.session().await;
    assert_eq!(session.game().score, 150);
    assert_eq!(session.game().current_stage, 2);
    assert_eq!(session.game().keys_found, 2);
    assert_eq!(session.game().extracted_keys, vec!["K1", "K2"]);
    assert!(session
        .game()
        .messages
        .iter()
        .any(|m| m.role == Role::KeyExtraction && m.content == "Key extracted: K1, K2"));

    let events = drain(&mut h.events);
    assert!(events.contains(&TournamentEvent::KeysAcquired {
        keys: vec!["K1".into(), "K2".into()]
    }));
    assert!(events.contains(&TournamentEvent::StageTransition {
        from: 1,
        to: 2,
        score: 150
    }));

    tokio::time::sleep(Duration::from_millis(2_900)).await;
    assert!(h.client.session().await.pending_transition().is_some());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let session = h.client.session().await;
    assert!(session.pending_transition().is_none());
    assert_eq!(session.game().messages.len(), 1);
    assert_eq!(
        session.game().messages[0].content,
        "Stage 1 completed! Welcome to Stage 2!"
    );
    assert!(drain(&mut h.events).contains(&TournamentEvent::StageTranscriptReset { stage: 2 }));
}

#[tokio::test(start_paused = true)]
async fn status_poll_after_stage_advance_keeps_the_new_stage() {
    let api = MockApi::with_status(snapshot(
        TournamentStatus::Active,
        &[("alice", true), ("bob", true)],
        Some(600.0),
    ));
    api.queue_answer(answer(AnswerStatus::StageCompleted, 2, &["K1", "K2"], 2, 150));
    api.queue_answer(answer(AnswerStatus::InProgress, 2, &["K1", "K2"], 2, 160));
    let polled = config("alice").with_status_poll_interval(Some(Duration::from_secs(10)));
    let (mut h, _server) = open(api, polled).await;
    drain(&mut h.events);

    let first = assert_ok!(h.client.submit_answer("reveal the keys").await);
    assert!(first.transition.is_some());

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(h.api.count("status") >= 2);
    let session = h.client.session().await;
    assert_eq!(session.game().current_stage, 2);
    assert!(session.pending_transition().is_none());

    let second = assert_ok!(h.client.submit_answer("keep going").await);
    assert!(second.transition.is_none());
    assert_eq!(h.client.session().await.game().current_stage, 2);

    let transitions = drain(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, TournamentEvent::StageTransition { .. }))
        .count();
    assert_eq!(transitions, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_submit_leaves_session_unchanged() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Active, &[("alice", true)], None));
    api.queue_answer_error(TournamentError::Http {
        status: 401,
        message: "Invalid token".into(),
    });
    let (h, _server) = open(api, config("alice")).await;
    let before = h.client.session().await;

    let err = assert_err!(h.client.submit_answer("hello").await);
    assert!(err.is_unauthorized());
    assert_eq!(h.client.session().await, before);
}

#[tokio::test(start_paused = true)]
async fn submit_rejects_empty_and_sessionless_calls() {
    let h = start(MockApi::new(), config("alice"));
    let err = assert_err!(h.client.submit_answer("   ").await);
    assert!(matches!(err, TournamentError::EmptyMessage));
    let err = assert_err!(h.client.submit_answer("hi").await);
    assert!(matches!(err, TournamentError::NoActiveSession));
    assert_eq!(h.api.count("submit"), 0);
}

#[tokio::test(start_paused = true)]
async fn late_answer_after_leave_is_discarded() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Active, &[("alice", true)], None));
    api.queue_answer(answer(AnswerStatus::InProgress, 1, &["K1"], 1, 50));
    *api.answer_delay.lock().unwrap() = Duration::from_secs(2);
    let (h, _server) = open(api, config("alice")).await;
    let client = Arc::new(h.client);

    let pending = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.submit_answer("slow").await }
    });
    settle().await;
    client.leave().await;

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(TournamentError::NoActiveSession)));
    let session = client.session().await;
    assert_eq!(session.game().score, 0);
    assert!(session.game().extracted_keys.is_empty());
}

#[tokio::test(start_paused = true)]
async fn tournament_won_answer_ends_session() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Active, &[("alice", true)], None));
    api.queue_answer(answer(AnswerStatus::TournamentWon, 1, &["K1", "K2"], 2, 640));
    let (mut h, _server) = open(api, config("alice")).await;
    drain(&mut h.events);

    let outcome = assert_ok!(h.client.submit_answer("final move").await);
    assert!(outcome.terminal);
    assert!(outcome.transition.is_none());

    let session = h.client.session().await;
    assert!(session.is_terminal());
    assert!(session.outcome().unwrap().won);
    assert_eq!(
        session.game().messages.last().unwrap().content,
        "TOURNAMENT WINNER! You completed Stage 1 first! Final Score: 640"
    );
    assert!(drain(&mut h.events).contains(&TournamentEvent::SessionOver {
        winner: Some("alice".into()),
        final_score: Some(640),
        won: true,
    }));
    assert_eq!(h.client.notifications()[0].severity, Severity::Success);
}

#[tokio::test(start_paused = true)]
async fn winning_answer_landing_after_end_push_is_not_an_error() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Active, &[("alice", true)], None));
    api.queue_answer(answer(AnswerStatus::TournamentWon, 1, &["K1", "K2"], 2, 640));
    *api.answer_delay.lock().unwrap() = Duration::from_secs(1);
    let (h, server) = open(api, config("alice")).await;
    let Harness {
        client, mut events, ..
    } = h;
    let client = Arc::new(client);
    drain(&mut events);

    let pending = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.submit_answer("final move").await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    server.push(ended_json("alice", 640));
    settle().await;
    let frozen = client.session().await;
    assert!(frozen.is_terminal());

    let outcome = assert_ok!(pending.await.unwrap());
    assert!(outcome.terminal);
    assert!(outcome.new_keys.is_empty());
    assert!(outcome.transition.is_none());
    assert_eq!(outcome.score, frozen.game().score);
    assert_eq!(client.session().await, frozen);

    let over = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, TournamentEvent::SessionOver { .. }))
        .count();
    assert_eq!(over, 1);
}

#[tokio::test(start_paused = true)]
async fn terminal_session_ignores_further_progress() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Active, &[("alice", true)], None));
    api.queue_answer(answer(AnswerStatus::InProgress, 1, &["K1"], 1, 50));
    let (mut h, server) = open(api, config("alice")).await;
    assert_ok!(h.client.submit_answer("first").await);

    server.push(ended_json("bob", 300));
    settle().await;
    let frozen = h.client.session().await;
    assert!(frozen.is_terminal());
    assert_eq!(frozen.game().score, 50);
    let outcome = frozen.outcome().unwrap();
    assert_eq!(outcome.winner.as_deref(), Some("bob"));
    assert!(!outcome.won);

    h.api
        .queue_answer(answer(AnswerStatus::StageCompleted, 2, &["K1", "K2"], 2, 999));
    let err = assert_err!(h.client.submit_answer("too late").await);
    assert!(matches!(err, TournamentError::SessionEnded));
    assert_eq!(h.api.count("submit"), 1);

    server.push(progress_json("bob", Some("bob unlocked Key 2!")));
    server.push(started_json(3, 60));
    server.push(completed_json());
    settle().await;
    assert_eq!(h.client.session().await.game(), frozen.game());

    let over = drain(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, TournamentEvent::SessionOver { .. }))
        .count();
    assert_eq!(over, 1);
}

#[tokio::test(start_paused = true)]
async fn session_end_cancels_pending_stage_transition() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Active, &[("alice", true)], None));
    api.queue_answer(answer(AnswerStatus::StageCompleted, 2, &["K1", "K2"], 2, 150));
    let (mut h, server) = open(api, config("alice")).await;
    assert_ok!(h.client.submit_answer("go").await);

    server.push(ended_json("bob", 200));
    settle().await;
    drain(&mut h.events);
    tokio::time::sleep(Duration::from_secs(5)).await;

    let session = h.client.session().await;
    assert_eq!(
        session.game().messages.last().unwrap().content,
        "Tournament ended! bob won by completing the stage first."
    );
    assert!(!drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, TournamentEvent::StageTranscriptReset { .. })));
}

#[tokio::test(start_paused = true)]
async fn started_push_opens_game_and_clock_counts_down() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Ready, &[("alice", true)], None));
    let (h, server) = open(api, config("alice")).await;

    server.push(started_json(2, 120));
    settle().await;
    let session = h.client.session().await;
    assert_eq!(session.status(), TournamentStatus::Active);
    assert_eq!(session.game().current_stage, 2);
    assert!(session.game().messages[0].content.contains("Code Breaker"));

    tokio::time::sleep(Duration::from_secs(5)).await;
    let remaining = h.client.session().await.game().time_remaining.unwrap();
    assert!((114..=116).contains(&remaining), "remaining = {remaining}");
}

#[tokio::test(start_paused = true)]
async fn status_poll_corrects_the_clock() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Active, &[("alice", true)], Some(300.0)));
    let cfg = config("alice").with_status_poll_interval(Some(Duration::from_secs(10)));
    let (h, _server) = open(api, cfg).await;

    h.api.set_status(Some(snapshot(
        TournamentStatus::Active,
        &[("alice", true)],
        Some(42.7),
    )));
    tokio::time::sleep(Duration::from_millis(10_500)).await;
    // The clock tick and the poll share the 10 s instant.
    let remaining = h.client.session().await.game().time_remaining.unwrap();
    assert!((41..=42).contains(&remaining), "remaining = {remaining}");
}

#[tokio::test(start_paused = true)]
async fn progress_update_refreshes_leaderboard_and_notifies() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Active, &[("alice", true)], None));
    let (h, server) = open(api, config("alice")).await;
    h.api.set_leaderboard(vec![
        leaderboard_entry("alice", 1, 50),
        leaderboard_entry("bob", 2, 150),
    ]);

    server.push(progress_json("bob", Some("bob unlocked Key 1!")));
    settle().await;

    assert_eq!(h.api.count("leaderboard"), 2);
    let session = h.client.session().await;
    assert_eq!(session.leaderboard()[0].username.as_deref(), Some("bob"));
    assert_eq!(session.game().score, 0);

    let notices = h.client.notifications();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].message, "bob unlocked Key 1!");

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(h.client.notifications().is_empty());
}

#[tokio::test(start_paused = true)]
async fn undecodable_frames_do_not_drop_the_connection() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Lobby, &[], None));
    let (h, server) = open(api, config("alice")).await;

    server.push("{not json");
    server.push(r#"{"type":"spectator_joined","name":"x"}"#);
    server.push(r#"{"type":"pong"}"#);
    server.push(participant_joined_json("bob"));
    settle().await;

    assert!(h.client.is_connected().await);
    assert_eq!(h.connector.attempts(), 1);
    assert!(h.client.session().await.participant("bob").is_some());
}

// ════════════════════════════════════════════════════════════════════
// Reconnect
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn reconnects_once_after_fixed_backoff_and_rehydrates() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Active, &[("alice", true)], Some(500.0)));
    let (mut h, server) = open(api, config("alice")).await;
    drain(&mut h.events);

    server.close();
    settle().await;
    assert_eq!(h.connector.attempts(), 1);
    assert!(!h.client.is_connected().await);
    assert!(drain(&mut h.events).contains(&TournamentEvent::Disconnected { reason: None }));

    tokio::time::sleep(Duration::from_millis(2_900)).await;
    assert_eq!(h.connector.attempts(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.connector.attempts(), 2);
    let second = h.servers.recv().await.expect("reconnect attempt");
    assert_eq!(second.tournament_id, "t-1");
    settle().await;

    assert!(h.client.is_connected().await);
    assert_eq!(h.api.count("status"), 2);
    assert!(drain(&mut h.events).contains(&TournamentEvent::Connected { reconnect: true }));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn n_unexpected_closes_make_at_most_n_reconnects() {
    const CLOSES: u32 = 5;
    let api = MockApi::with_status(snapshot(TournamentStatus::Active, &[], None));
    let (mut h, mut server) = open(api, config("alice")).await;

    for n in 1..=CLOSES {
        server.close();
        settle().await;
        assert_eq!(h.connector.attempts(), n);
        assert_eq!(h.client.connect_attempts().await, n);
        tokio::time::sleep(Duration::from_secs(3)).await;
        server = h.servers.recv().await.expect("reconnect attempt");
    }
    settle().await;
    assert_eq!(h.connector.attempts(), CLOSES + 1);
    assert!(h.client.is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn failed_attempts_keep_the_fixed_delay() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Active, &[], None));
    let (h, server) = open(api, config("alice")).await;
    h.connector.fail_next(2);

    server.close();
    settle().await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.connector.attempts(), 2);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.connector.attempts(), 3);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.connector.attempts(), 4);
    settle().await;
    assert!(h.client.is_connected().await);
}

#[tokio::test(start_paused = true)]
async fn leave_cancels_pending_reconnect_and_resets() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Lobby, &[("alice", false)], None));
    let (h, server) = open(api, config("alice")).await;

    server.close();
    settle().await;
    h.client.leave().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.connector.attempts(), 1);
    assert!(h.client.current_tournament().await.is_none());
    let session = h.client.session().await;
    assert!(session.participants().is_empty());
    assert_eq!(session.self_name(), Some("alice"));
}

#[tokio::test(start_paused = true)]
async fn reopening_ignores_the_old_socket() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Lobby, &[], None));
    let (mut h, old) = open(api, config("alice")).await;

    assert_ok!(h.client.open("t-1").await);
    let new = h.servers.recv().await.expect("new connection");
    settle().await;

    old.push(participant_joined_json("ghost"));
    new.push(participant_joined_json("bob"));
    settle().await;

    let session = h.client.session().await;
    assert!(session.participant("ghost").is_none());
    assert!(session.participant("bob").is_some());
}

// ════════════════════════════════════════════════════════════════════
// Misc REST and shutdown
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn create_join_and_results_pass_through() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Completed, &[], None));
    api.set_leaderboard(vec![leaderboard_entry("alice", 2, 300)]);
    let mut h = start(api, config("alice"));

    let created = assert_ok!(h.client.create_tournament(&Default::default()).await);
    assert_eq!(created.room_code, "XYZ789");
    let joined = assert_ok!(h.client.join_tournament("XYZ789").await);
    assert_eq!(joined.tournament_id, "t-1");

    let err = assert_err!(h.client.results().await);
    assert!(matches!(err, TournamentError::NoActiveSession));

    assert_ok!(h.client.open(&joined.tournament_id).await);
    let _server = h.servers.recv().await;
    let before = h.client.session().await;
    let results = assert_ok!(h.client.results().await);
    assert_eq!(results.winner.unwrap().username.as_deref(), Some("alice"));
    assert_eq!(h.client.session().await, before);
}

#[tokio::test(start_paused = true)]
async fn completed_snapshot_marks_session_over() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Completed, &[("alice", true)], None));
    let (mut h, _server) = open(api, config("alice")).await;
    let session = h.client.session().await;
    assert!(session.is_terminal());
    assert!(drain(&mut h.events)
        .iter()
        .any(|e| matches!(e, TournamentEvent::SessionOver { .. })));
    let err = assert_err!(h.client.submit_answer("anything").await);
    assert!(matches!(err, TournamentError::SessionEnded));
}

#[tokio::test(start_paused = true)]
async fn shutdown_disconnects_and_rejects_further_calls() {
    let api = MockApi::with_status(snapshot(TournamentStatus::Lobby, &[], None));
    let (mut h, server) = open(api, config("alice")).await;
    drain(&mut h.events);

    h.client.shutdown().await;
    assert!(!h.client.is_running());
    assert!(drain(&mut h.events).contains(&TournamentEvent::Disconnected {
        reason: Some("client shut down".into())
    }));

    server.close();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.connector.attempts(), 1);

    let err = assert_err!(h.client.open("t-1").await);
    assert!(matches!(err, TournamentError::NotConnected));
}
