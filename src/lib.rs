//! # Tournament Sync Client
//!
//! Async client for the real-time tournament mode of the prompt-injection
//! training game.
//!
//! The crate keeps a local [`SessionState`] in sync with the tournament
//! service. Pushes arrive over a WebSocket. The REST snapshot is the source of
//! truth.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any
//!   text-frame backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   [`WebSocketConnector`]
//! - **REST built-in**: the default `http-api` feature provides [`HttpApi`]
//! - **Event-driven**: receive typed [`TournamentEvent`]s via a channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "transport-websocket", feature = "http-api"))]
//! # async fn run() -> Result<(), tournament_sync_client::TournamentError> {
//! use std::sync::Arc;
//! use tournament_sync_client::{
//!     ApiConfig, HttpApi, TournamentClient, TournamentConfig, TournamentEvent, WebSocketConnector,
//! };
//!
//! let connector = Arc::new(WebSocketConnector::new("ws://localhost:8000"));
//! let api = Arc::new(HttpApi::new(
//!     ApiConfig::new("http://localhost:8000").with_auth_token("jwt"),
//! ));
//! let (client, mut events) =
//!     TournamentClient::start(connector, api, TournamentConfig::new().with_self_name("alice"));
//!
//! client.open("5f0c9b2e").await?;
//! while let Some(event) = events.recv().await {
//!     if let TournamentEvent::SessionOver { winner, .. } = event {
//!         println!("winner: {winner:?}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod connection;
pub mod error;
pub mod event;
pub mod notifications;
pub mod polling;
pub mod protocol;
pub mod router;
pub mod session;
pub mod stages;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use api::{ApiConfig, TournamentApi};
pub use client::{TournamentClient, TournamentConfig};
pub use connection::{ConnectionConfig, ConnectionManager, LinkEvent, LinkState};
pub use error::{Result, TournamentError};
pub use event::TournamentEvent;
pub use notifications::{Notification, NotificationQueue, Severity};
pub use polling::PollingFallback;
pub use protocol::{PushMessage, TournamentStatus};
pub use router::{Dispatch, MessageRouter};
pub use session::{AnswerOutcome, SessionState};
pub use transport::{Connector, Transport};

#[cfg(feature = "http-api")]
pub use api::HttpApi;
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
