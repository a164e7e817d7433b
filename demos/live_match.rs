//! # Live Match Example
//!
//! Plays one tournament against a running tournament service:
//!
//! 1. Join a room by code (or open a tournament id directly)
//! 2. Follow lobby and match events on the push channel
//! 3. Submit each line typed on stdin as an answer
//! 4. Shut down on Ctrl+C or when the match ends
//!
//! ## Running
//!
//! ```sh
//! TOURNAMENT_TOKEN=<jwt> TOURNAMENT_ROOM=ABC123 TOURNAMENT_USER=alice \
//!     cargo run --example live_match
//!
//! # Guest play, custom hosts:
//! TOURNAMENT_API_URL=http://game:8000 TOURNAMENT_WS_URL=ws://game:8000 \
//! TOURNAMENT_ROOM=ABC123 TOURNAMENT_GUEST=neo cargo run --example live_match
//! ```

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tournament_sync_client::session::Role;
use tournament_sync_client::{
    ApiConfig, HttpApi, TournamentClient, TournamentConfig, TournamentEvent, WebSocketConnector,
};

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_WS_URL: &str = "ws://localhost:8000";

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let api_url = env("TOURNAMENT_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let ws_url = env("TOURNAMENT_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string());

    let mut api_config = ApiConfig::new(api_url);
    if let Some(token) = env("TOURNAMENT_TOKEN") {
        api_config = api_config.with_auth_token(token);
    }
    let mut config = TournamentConfig::new();
    if let Some(user) = env("TOURNAMENT_USER") {
        config = config.with_self_name(user);
    }

    let connector = Arc::new(WebSocketConnector::new(ws_url));
    let api = Arc::new(HttpApi::new(api_config));
    let (mut client, mut events) = TournamentClient::start(connector, api, config);

    // ── Join ────────────────────────────────────────────────────────
    let tournament_id = match (env("TOURNAMENT_ID"), env("TOURNAMENT_ROOM")) {
        (Some(id), _) => id,
        (None, Some(room)) => match env("TOURNAMENT_GUEST") {
            Some(guest) => client.join_as_guest(&room, &guest).await?.tournament_id,
            None => client.join_tournament(&room).await?.tournament_id,
        },
        (None, None) => return Err("set TOURNAMENT_ID or TOURNAMENT_ROOM".into()),
    };
    client.open(&tournament_id).await?;
    tracing::info!("Opened tournament {tournament_id}; type `ready`, `start` or an answer");

    // ── Event loop ──────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    TournamentEvent::Connected { reconnect } => {
                        tracing::info!("Push channel up (reconnect={reconnect})");
                    }
                    TournamentEvent::Disconnected { reason } => {
                        tracing::warn!("Push channel down: {}", reason.as_deref().unwrap_or("closed"));
                    }
                    TournamentEvent::ParticipantJoined { name, participant_count, .. } => {
                        tracing::info!("{name} joined ({participant_count:?} present)");
                    }
                    TournamentEvent::ReadyChanged { name, is_ready, status } => {
                        tracing::info!("{name} ready={is_ready}, lobby {status:?}");
                    }
                    TournamentEvent::TournamentStarted { stage, time_limit } => {
                        tracing::info!("Match started at stage {stage}, {time_limit:?}s on the clock");
                    }
                    TournamentEvent::KeysAcquired { keys } => {
                        tracing::info!("New keys: {}", keys.join(", "));
                    }
                    TournamentEvent::StageTransition { from, to, score } => {
                        tracing::info!("Stage {from} cleared, moving to {to} (score {score})");
                    }
                    TournamentEvent::Notice(notice) => {
                        tracing::info!("[{:?}] {}", notice.severity, notice.message);
                    }
                    TournamentEvent::SessionOver { winner, final_score, won } => {
                        tracing::info!("Match over: winner={winner:?} score={final_score:?} won={won}");
                        break;
                    }
                    other => tracing::debug!("Event: {other:?}"),
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let result = match line.trim() {
                    "ready" => client.toggle_ready().await.map(|r| tracing::info!("ready={r}")),
                    "start" => client.start_match().await,
                    answer => match client.submit_answer(answer).await {
                        Ok(outcome) => {
                            let session = client.session().await;
                            if let Some(reply) = session
                                .game()
                                .messages
                                .iter()
                                .rev()
                                .find(|m| m.role == Role::Assistant)
                            {
                                println!("{}", reply.content);
                            }
                            tracing::info!("score {} ({:?})", outcome.score, outcome.status);
                            Ok(())
                        }
                        Err(e) => Err(e),
                    },
                };
                if let Err(e) = result {
                    tracing::error!("{e}");
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.shutdown().await;
    Ok(())
}
