//! Best-effort REST reconciliation.
//!
//! The push channel only signals that something changed. The REST snapshot is
//! the truth. Every fetch here swallows its error (logged at `warn`) and
//! returns `None`, so the caller keeps whatever state it had.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::api::TournamentApi;
use crate::protocol::{LeaderboardEntry, StatusSnapshot};

/// Default period of the background status poll.
pub const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Fetches snapshots through a [`TournamentApi`] without failing.
#[derive(Clone)]
pub struct PollingFallback {
    api: Arc<dyn TournamentApi>,
}

impl PollingFallback {
    pub fn new(api: Arc<dyn TournamentApi>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &Arc<dyn TournamentApi> {
        &self.api
    }

    pub async fn fetch_status(&self, tournament_id: &str) -> Option<StatusSnapshot> {
        match self.api.get_status(tournament_id).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(tournament_id, error = %e, "status fetch failed, keeping prior state");
                None
            }
        }
    }

    pub async fn fetch_leaderboard(&self, tournament_id: &str) -> Option<Vec<LeaderboardEntry>> {
        match self.api.get_leaderboard(tournament_id).await {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!(tournament_id, error = %e, "leaderboard fetch failed, keeping prior state");
                None
            }
        }
    }
}

impl std::fmt::Debug for PollingFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingFallback").finish_non_exhaustive()
    }
}
