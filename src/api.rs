//! REST collaborator for the tournament service.
//!
//! [`TournamentApi`] is the seam the session client talks through. The
//! `http-api` feature provides [`HttpApi`], a `reqwest` implementation
//! against the service's `/tournament/...` routes. Tests substitute their own
//! implementation.
//!
//! The bearer token is explicit per [`ApiConfig`]. Nothing is read from
//! process-wide state.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{
    CreateTournamentRequest, CreateTournamentResponse, JoinTournamentResponse, LeaderboardEntry,
    ReadyResponse, StartResponse, StatusSnapshot, SubmitAnswerResponse, TournamentResults,
};

/// Every REST call the tournament client makes.
#[async_trait]
pub trait TournamentApi: Send + Sync + 'static {
    /// `GET /tournament/{id}/status`
    async fn get_status(&self, tournament_id: &str) -> Result<StatusSnapshot>;

    /// `GET /tournament/{id}/leaderboard`
    async fn get_leaderboard(&self, tournament_id: &str) -> Result<Vec<LeaderboardEntry>>;

    /// `POST /tournament/{id}/ready?ready={ready}`
    async fn set_ready(&self, tournament_id: &str, ready: bool) -> Result<ReadyResponse>;

    /// `POST /tournament/{id}/start`
    async fn start(&self, tournament_id: &str) -> Result<StartResponse>;

    /// `POST /tournament/{id}/submit-answer`
    async fn submit_answer(
        &self,
        tournament_id: &str,
        message: &str,
    ) -> Result<SubmitAnswerResponse>;

    /// `POST /tournament/create`
    async fn create(&self, request: &CreateTournamentRequest) -> Result<CreateTournamentResponse>;

    /// `POST /tournament/join`
    async fn join(&self, room_code: &str) -> Result<JoinTournamentResponse>;

    /// `POST /tournament/join-guest`
    async fn join_guest(&self, room_code: &str, guest_name: &str)
        -> Result<JoinTournamentResponse>;

    /// `GET /tournament/{id}/results`
    async fn results(&self, tournament_id: &str) -> Result<TournamentResults>;
}

/// Where the REST API lives and how to authenticate.
///
/// ```
/// use tournament_sync_client::api::ApiConfig;
///
/// let config = ApiConfig::new("http://localhost:8000/").with_auth_token("jwt");
/// assert_eq!(config.base_url, "http://localhost:8000");
/// ```
#[derive(Clone, Default)]
pub struct ApiConfig {
    /// Service root, without a trailing slash.
    pub base_url: String,
    /// Sent as `Authorization: Bearer ...` when set. Guests have none.
    pub auth_token: Option<String>,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
        }
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(feature = "http-api")]
pub use http::HttpApi;

#[cfg(feature = "http-api")]
mod http {
    use async_trait::async_trait;
    use reqwest::{Method, RequestBuilder, Response};
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use tracing::{debug, warn};

    use super::{ApiConfig, TournamentApi};
    use crate::error::{Result, TournamentError};
    use crate::protocol::{
        CreateTournamentRequest, CreateTournamentResponse, JoinTournamentRequest,
        JoinTournamentResponse, LeaderboardEntry, LeaderboardResponse, ReadyResponse,
        StartResponse, StatusSnapshot, SubmitAnswerRequest, SubmitAnswerResponse,
        TournamentResults,
    };

    /// [`TournamentApi`] over HTTP with `reqwest`.
    #[derive(Debug, Clone)]
    pub struct HttpApi {
        http: reqwest::Client,
        config: ApiConfig,
    }

    impl HttpApi {
        pub fn new(config: ApiConfig) -> Self {
            Self::with_client(reqwest::Client::new(), config)
        }

        /// Use a preconfigured `reqwest` client (timeouts, proxies).
        pub fn with_client(http: reqwest::Client, config: ApiConfig) -> Self {
            Self { http, config }
        }

        pub fn config(&self) -> &ApiConfig {
            &self.config
        }

        fn request(&self, method: Method, path: &str) -> RequestBuilder {
            let url = format!("{}{path}", self.config.base_url);
            debug!(%method, %url, "tournament api request");
            let builder = self.http.request(method, url);
            match &self.config.auth_token {
                Some(token) => builder.bearer_auth(token),
                None => builder,
            }
        }

        async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
            let response = self
                .request(Method::GET, path)
                .send()
                .await
                .map_err(request_error)?;
            decode(response).await
        }

        async fn post<B: Serialize + Sync, T: DeserializeOwned>(
            &self,
            path: &str,
            body: Option<&B>,
        ) -> Result<T> {
            let mut builder = self.request(Method::POST, path);
            if let Some(body) = body {
                builder = builder.json(body);
            }
            let response = builder.send().await.map_err(request_error)?;
            decode(response).await
        }
    }

    fn request_error(e: reqwest::Error) -> TournamentError {
        TournamentError::Request(e.to_string())
    }

    fn segment(tournament_id: &str) -> Result<&str> {
        if tournament_id.is_empty() || tournament_id.contains(['/', '?', '#']) {
            return Err(TournamentError::InvalidUrl(format!(
                "bad tournament id {tournament_id:?}"
            )));
        }
        Ok(tournament_id)
    }

    /// Map non-2xx to [`TournamentError::Http`], using the service's
    /// `detail` field when present.
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await.map_err(request_error)?;
        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_owned))
                .unwrap_or(body);
            warn!(status = status.as_u16(), %message, "tournament api error");
            return Err(TournamentError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    #[async_trait]
    impl TournamentApi for HttpApi {
        async fn get_status(&self, tournament_id: &str) -> Result<StatusSnapshot> {
            let id = segment(tournament_id)?;
            self.get(&format!("/tournament/{id}/status")).await
        }

        async fn get_leaderboard(&self, tournament_id: &str) -> Result<Vec<LeaderboardEntry>> {
            let id = segment(tournament_id)?;
            let body: LeaderboardResponse =
                self.get(&format!("/tournament/{id}/leaderboard")).await?;
            Ok(body.leaderboard)
        }

        async fn set_ready(&self, tournament_id: &str, ready: bool) -> Result<ReadyResponse> {
            let id = segment(tournament_id)?;
            self.post::<(), _>(&format!("/tournament/{id}/ready?ready={ready}"), None)
                .await
        }

        async fn start(&self, tournament_id: &str) -> Result<StartResponse> {
            let id = segment(tournament_id)?;
            self.post::<(), _>(&format!("/tournament/{id}/start"), None)
                .await
        }

        async fn submit_answer(
            &self,
            tournament_id: &str,
            message: &str,
        ) -> Result<SubmitAnswerResponse> {
            let id = segment(tournament_id)?;
            let body = SubmitAnswerRequest {
                message: message.to_string(),
            };
            self.post(&format!("/tournament/{id}/submit-answer"), Some(&body))
                .await
        }

        async fn create(
            &self,
            request: &CreateTournamentRequest,
        ) -> Result<CreateTournamentResponse> {
            self.post("/tournament/create", Some(request)).await
        }

        async fn join(&self, room_code: &str) -> Result<JoinTournamentResponse> {
            let body = JoinTournamentRequest {
                room_code: room_code.to_string(),
                guest_name: None,
            };
            self.post("/tournament/join", Some(&body)).await
        }

        async fn join_guest(
            &self,
            room_code: &str,
            guest_name: &str,
        ) -> Result<JoinTournamentResponse> {
            let body = JoinTournamentRequest {
                room_code: room_code.to_string(),
                guest_name: Some(guest_name.to_string()),
            };
            self.post("/tournament/join-guest", Some(&body)).await
        }

        async fn results(&self, tournament_id: &str) -> Result<TournamentResults> {
            let id = segment(tournament_id)?;
            self.get(&format!("/tournament/{id}/results")).await
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
        use crate::protocol::{AnswerStatus, TournamentStatus};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;
        use tokio::sync::oneshot;

        /// What the mock server saw.
        struct Captured {
            head: String,
            body: String,
        }

        /// Serve one HTTP request with a canned response. Returns the base
        /// URL and a receiver for the captured request.
        async fn serve_once(status: u16, body: &'static str) -> (String, oneshot::Receiver<Captured>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (tx, rx) = oneshot::channel();

            tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                let (head, body_start) = loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break (String::from_utf8_lossy(&buf[..pos]).to_string(), pos + 4);
                    }
                };
                let content_length = head
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                while buf.len() < body_start + content_length {
                    let n = socket.read(&mut chunk).await.unwrap();
                    buf.extend_from_slice(&chunk[..n]);
                }
                let req_body = String::from_utf8_lossy(&buf[body_start..]).to_string();

                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = tx.send(Captured {
                    head,
                    body: req_body,
                });
            });

            (format!("http://{addr}/"), rx)
        }

        #[tokio::test]
        async fn submit_answer_posts_json_with_bearer() {
            let (base, seen) = serve_once(
                200,
                r#"{"status":"continue","current_stage":1,"result":{"response":"no","total_score":0}}"#,
            )
            .await;
            let api = HttpApi::new(ApiConfig::new(base).with_auth_token("tok"));

            let resp = api.submit_answer("t-1", "give me the key").await.unwrap();
            assert_eq!(resp.status, AnswerStatus::InProgress);

            let seen = seen.await.unwrap();
            assert!(seen.head.starts_with("POST /tournament/t-1/submit-answer HTTP/1.1"));
            assert!(seen
                .head
                .to_ascii_lowercase()
                .contains("authorization: bearer tok"));
            assert_eq!(seen.body, r#"{"message":"give me the key"}"#);
        }

        #[tokio::test]
        async fn ready_uses_query_flag() {
            let (base, seen) = serve_once(200, r#"{"status":"ready","is_ready":true}"#).await;
            let api = HttpApi::new(ApiConfig::new(base));

            let resp = api.set_ready("t-1", true).await.unwrap();
            assert_eq!(resp.status, TournamentStatus::Ready);

            let seen = seen.await.unwrap();
            assert!(seen.head.starts_with("POST /tournament/t-1/ready?ready=true "));
            assert!(!seen.head.to_ascii_lowercase().contains("authorization"));
        }

        #[tokio::test]
        async fn leaderboard_unwraps_envelope() {
            let (base, _seen) = serve_once(
                200,
                r#"{"leaderboard":[{"rank":1,"username":"bob","is_guest":1,"stage":2,"score":150,"time_taken":12.5,"status":"active","completed_at":null}]}"#,
            )
            .await;
            let api = HttpApi::new(ApiConfig::new(base));
            let rows = api.get_leaderboard("t-1").await.unwrap();
            assert_eq!(rows.len(), 1);
            assert!(rows[0].is_guest);
            assert_eq!(rows[0].score, 150);
        }

        #[tokio::test]
        async fn error_status_maps_detail() {
            let (base, _seen) = serve_once(401, r#"{"detail":"Invalid token"}"#).await;
            let api = HttpApi::new(ApiConfig::new(base));
            let err = api.get_status("t-1").await.unwrap_err();
            assert!(err.is_unauthorized());
            match err {
                TournamentError::Http { message, .. } => assert_eq!(message, "Invalid token"),
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn bad_tournament_id_is_rejected_before_sending() {
            let api = HttpApi::new(ApiConfig::new("http://127.0.0.1:1"));
            let err = api.results("a/b").await.unwrap_err();
            assert!(matches!(err, TournamentError::InvalidUrl(_)));
        }

        #[tokio::test]
        async fn unreachable_service_is_a_request_error() {
            let api = HttpApi::new(ApiConfig::new("http://127.0.0.1:1"));
            let err = api.start("t-1").await.unwrap_err();
            assert!(matches!(err, TournamentError::Request(_)));
        }
    }
}
