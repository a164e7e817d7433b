//! Transport abstraction for the tournament push channel.
//!
//! The [`Transport`] trait is a bidirectional text frame channel to one
//! tournament's `WS /tournament/{id}/ws` endpoint. The service only pushes
//! JSON objects to the client. The client sends nothing except an optional
//! keepalive ping.
//!
//! # Reconnection
//!
//! A closed transport is never reused. The
//! [`ConnectionManager`](crate::connection::ConnectionManager) asks a
//! [`Connector`] for a fresh transport every time it (re)connects. That lets
//! tests script a different transport for each attempt.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use tournament_sync_client::error::TournamentError;
//! use tournament_sync_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), TournamentError> {
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, TournamentError>> {
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), TournamentError> {
//!         Ok(())
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self, _tournament_id: &str) -> Result<Box<dyn Transport>, TournamentError> {
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::TournamentError;

/// A bidirectional text frame transport for one tournament's push channel.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because the
/// connection task polls it inside `tokio::select!` next to the keepalive
/// timer. Channel-based implementations are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one text frame to the service.
    ///
    /// # Errors
    ///
    /// Returns [`TournamentError::TransportSend`] if the frame could not be sent.
    async fn send(&mut self, message: String) -> Result<(), TournamentError>;

    /// Receive the next text frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the service closed the connection cleanly
    async fn recv(&mut self) -> Option<Result<String, TournamentError>>;

    /// Close the connection. Implementations release resources even if the
    /// close handshake fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails.
    async fn close(&mut self) -> Result<(), TournamentError>;
}

/// Opens a new [`Transport`] for a tournament id.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a connection to the push channel of `tournament_id`.
    ///
    /// # Errors
    ///
    /// Any error is treated as a failed attempt. The connection manager logs
    /// it and schedules the next reconnect.
    async fn connect(&self, tournament_id: &str) -> Result<Box<dyn Transport>, TournamentError>;
}
