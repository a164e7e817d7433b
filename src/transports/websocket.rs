//! WebSocket push channel built on `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] turns a tournament id into
//! `{base}/tournament/{id}/ws` and opens a [`WebSocketTransport`] on it.
//! Both `ws://` and `wss://` bases work; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), tournament_sync_client::TournamentError> {
//! use tournament_sync_client::transport::{Connector, Transport};
//! use tournament_sync_client::WebSocketConnector;
//!
//! let connector = WebSocketConnector::new("ws://localhost:8000");
//! let mut transport = connector.connect("5f0c9b2e").await?;
//!
//! if let Some(Ok(frame)) = transport.recv().await {
//!     println!("push frame: {frame}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::TournamentError;
use crate::transport::{Connector, Transport};

/// Client side of a push channel socket, plain or TLS.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// What one incoming WebSocket message means for the push channel.
enum Incoming {
    Frame(String),
    Closed,
    Skip,
}

fn classify(message: Message) -> Incoming {
    match message {
        Message::Text(text) => Incoming::Frame(text.to_string()),
        Message::Close(frame) => {
            tracing::debug!(?frame, "push channel close frame");
            Incoming::Closed
        }
        Message::Binary(bytes) => {
            tracing::warn!(len = bytes.len(), "binary frame on tournament push channel, skipping");
            Incoming::Skip
        }
        // tungstenite queues the pong itself.
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Incoming::Skip,
    }
}

/// Keep the I/O error kind so callers can tell a refused socket from a
/// handshake failure.
fn connect_error(err: tokio_tungstenite::tungstenite::Error) -> TournamentError {
    let kind = if let tokio_tungstenite::tungstenite::Error::Io(io) = &err {
        io.kind()
    } else {
        std::io::ErrorKind::Other
    };
    TournamentError::Io(std::io::Error::new(kind, err))
}

/// A [`Transport`] over one tournament push channel socket.
///
/// [`recv`](Transport::recv) can be cancelled by `select!` without losing a
/// frame.
#[derive(Debug)]
pub struct WebSocketTransport {
    socket: WsStream,
    shut: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TournamentError::Io`] if the URL is invalid or the connection
    /// cannot be established.
    pub async fn connect(url: &str) -> Result<Self, TournamentError> {
        tracing::debug!(url = %url, "opening tournament push channel");
        let (socket, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(connect_error)?;
        tracing::info!(url = %url, "tournament push channel open");
        Ok(Self::from_stream(socket))
    }

    /// Wrap an already-established stream (custom TLS, proxies, headers).
    pub fn from_stream(socket: WsStream) -> Self {
        Self {
            socket,
            shut: false,
        }
    }

    /// Like [`connect`](Self::connect), but gives up after `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`TournamentError::Timeout`] if the deadline elapses, or any
    /// error [`connect`](Self::connect) may return.
    pub async fn connect_within(url: &str, limit: Duration) -> Result<Self, TournamentError> {
        match tokio::time::timeout(limit, Self::connect(url)).await {
            Ok(result) => result,
            Err(_) => Err(TournamentError::Timeout),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), TournamentError> {
        if self.shut {
            return Err(TournamentError::TransportClosed);
        }
        self.socket
            .send(Message::text(frame))
            .await
            .map_err(|e| TournamentError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TournamentError>> {
        while let Some(next) = self.socket.next().await {
            let message = match next {
                Ok(message) => message,
                Err(e) => return Some(Err(TournamentError::TransportReceive(e.to_string()))),
            };
            match classify(message) {
                Incoming::Frame(text) => return Some(Ok(text)),
                Incoming::Closed => return None,
                Incoming::Skip => continue,
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), TournamentError> {
        if std::mem::replace(&mut self.shut, true) {
            return Ok(());
        }
        self.socket
            .close(None)
            .await
            .map_err(|e| TournamentError::TransportSend(e.to_string()))
    }
}

/// [`Connector`] that opens `{base_url}/tournament/{id}/ws`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base_url: String,
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    /// Create a connector for a `ws://` or `wss://` base URL such as
    /// `ws://localhost:8000`. A trailing slash is ignored.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            connect_timeout: None,
        }
    }

    /// Fail connection attempts that take longer than `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// The push channel URL for a tournament.
    ///
    /// # Errors
    ///
    /// Returns [`TournamentError::InvalidUrl`] if the id is empty or would
    /// change the path (contains `/`, `?` or `#`).
    pub fn endpoint(&self, tournament_id: &str) -> Result<String, TournamentError> {
        if tournament_id.is_empty() || tournament_id.contains(['/', '?', '#']) {
            return Err(TournamentError::InvalidUrl(format!(
                "bad tournament id {tournament_id:?}"
            )));
        }
        Ok(format!("{}/tournament/{tournament_id}/ws", self.base_url))
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, tournament_id: &str) -> Result<Box<dyn Transport>, TournamentError> {
        let url = self.endpoint(tournament_id)?;
        let transport = match self.connect_timeout {
            Some(limit) => WebSocketTransport::connect_within(&url, limit).await?,
            None => WebSocketTransport::connect(&url).await?,
        };
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn transport_can_move_into_the_link_task() {
        fn is_send<T: Send + 'static>() {}
        is_send::<WebSocketTransport>();
    }

    #[test]
    fn classify_skips_control_and_binary_frames() {
        assert!(matches!(classify(Message::text("{}")), Incoming::Frame(f) if f == "{}"));
        assert!(matches!(classify(Message::Close(None)), Incoming::Closed));
        assert!(matches!(classify(Message::Ping(vec![1].into())), Incoming::Skip));
        assert!(matches!(classify(Message::Binary(vec![7].into())), Incoming::Skip));
    }

    #[test]
    fn endpoint_appends_tournament_path() {
        let connector = WebSocketConnector::new("ws://localhost:8000/");
        assert_eq!(
            connector.endpoint("abc-123").unwrap(),
            "ws://localhost:8000/tournament/abc-123/ws"
        );
    }

    #[test]
    fn endpoint_rejects_path_injection() {
        let connector = WebSocketConnector::new("ws://localhost:8000");
        assert!(matches!(
            connector.endpoint("../admin"),
            Err(TournamentError::InvalidUrl(_))
        ));
        assert!(matches!(
            connector.endpoint(""),
            Err(TournamentError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn refused_socket_surfaces_as_io_error() {
        let result = WebSocketTransport::connect("ws://127.0.0.1:1").await;
        assert!(matches!(result.unwrap_err(), TournamentError::Io(_)));
    }

    // ── Mock-server helpers ──────────────────────────────────────────────

    /// Start a local WebSocket server that checks the request path and runs
    /// `handler` on the accepted connection. Returns the `ws://` base URL.
    async fn start_mock_server<F, Fut>(expected_path: &'static str, handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let check_path = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                assert_eq!(req.uri().path(), expected_path);
                Ok(resp)
            };
            let ws = tokio_tungstenite::accept_hdr_async(tcp, check_path)
                .await
                .unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn connector_receives_push_frames() {
        let base = start_mock_server("/tournament/t-1/ws", |mut ws| async move {
            ws.send(Message::Text(
                r#"{"type":"participant_joined","username":"alice"}"#.into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"pong"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new(base);
        let mut transport = connector.connect("t-1").await.unwrap();

        let first = transport.recv().await.unwrap().unwrap();
        assert!(first.contains("participant_joined"));

        // The binary frame is skipped.
        let second = transport.recv().await.unwrap().unwrap();
        assert_eq!(second, r#"{"type":"pong"}"#);

        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn keepalive_ping_reaches_server() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel::<String>();
        let base = start_mock_server("/tournament/t-2/ws", |mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text.to_string());
            }
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketConnector::new(base)
            .with_connect_timeout(Duration::from_secs(5))
            .connect("t-2")
            .await
            .unwrap();
        transport.send(r#"{"type":"ping"}"#.to_string()).await.unwrap();

        assert_eq!(seen_rx.await.unwrap(), r#"{"type":"ping"}"#);
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let base = start_mock_server("/tournament/t-3/ws", |mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketConnector::new(base).connect("t-3").await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, TournamentError::TransportClosed));
    }

    #[tokio::test]
    async fn connect_within_gives_up_on_a_blackholed_host() {
        let result =
            WebSocketTransport::connect_within("ws://192.0.2.1:1", Duration::from_millis(50)).await;
        assert!(matches!(result.unwrap_err(), TournamentError::Timeout));
    }
}
