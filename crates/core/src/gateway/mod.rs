//! Upstream service gateways
//!
//! The lobby never owns user accounts, question packs, or game sessions; it
//! reaches those services through these traits. Production wiring injects
//! network clients, tests inject fakes.

mod retry;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::models::{PlayerRole, SettingsView};

pub use retry::{RetryPolicy, RetryingCatalog, RetryingIdentity};

/// A resolved user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// What the catalog says about a pack for a given user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackValidation {
    pub exists: bool,
    pub approved: bool,
    pub owned_by_user: bool,
}

/// Display details for a pack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackInfo {
    pub id: Uuid,
    pub name: String,
    pub round_count: u32,
    pub question_count: u32,
}

/// One seat handed to the game service at start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: Uuid,
    pub username: String,
    pub role: PlayerRole,
}

/// Everything the game service needs to spin up a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub room_id: Uuid,
    pub pack_id: Uuid,
    pub roster: Vec<RosterEntry>,
    pub settings: SettingsView,
}

/// A running game session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: String,
    pub connect_url: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Transient failures are worth retrying; the rest are verdicts
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::DeadlineExceeded(_) | Self::ResourceExhausted(_)
        )
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// User account service
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// Resolve a user id to a profile
    async fn resolve(&self, user_id: Uuid) -> GatewayResult<UserIdentity>;

    /// Validate a presented credential and return who it belongs to
    async fn verify(&self, credential: &str) -> GatewayResult<UserIdentity>;
}

/// Question pack catalog service
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    /// May this user host a game with this pack?
    async fn validate(&self, pack_id: Uuid, user_id: Uuid) -> GatewayResult<PackValidation>;

    /// Display details for a pack
    async fn describe(&self, pack_id: Uuid) -> GatewayResult<PackInfo>;
}

/// Game session service
#[async_trait]
pub trait GameSessionGateway: Send + Sync {
    /// Create a session for a starting room. Not idempotent, so callers get
    /// exactly one attempt.
    async fn create(&self, request: NewSession) -> GatewayResult<SessionHandle>;
}

/// Look up details for a batch of packs concurrently. A failed lookup is a
/// gap in the result, never an error for the whole page.
pub async fn describe_packs(
    catalog: &dyn ContentCatalog,
    pack_ids: impl IntoIterator<Item = Uuid>,
) -> HashMap<Uuid, PackInfo> {
    let unique: HashSet<Uuid> = pack_ids.into_iter().collect();
    let lookups = unique
        .into_iter()
        .map(|id| async move { (id, catalog.describe(id).await) });

    let mut found = HashMap::new();
    for (id, result) in join_all(lookups).await {
        match result {
            Ok(info) => {
                found.insert(id, info);
            }
            Err(e) => warn!(pack_id = %id, error = %e, "pack lookup failed, omitting details"),
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingCatalog {
        known: Uuid,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ContentCatalog for CountingCatalog {
        async fn validate(&self, _pack_id: Uuid, _user_id: Uuid) -> GatewayResult<PackValidation> {
            unreachable!("not exercised here")
        }

        async fn describe(&self, pack_id: Uuid) -> GatewayResult<PackInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if pack_id == self.known {
                Ok(PackInfo {
                    id: pack_id,
                    name: "Quiz Night".into(),
                    round_count: 3,
                    question_count: 30,
                })
            } else {
                Err(GatewayError::NotFound(format!("pack {pack_id}")))
            }
        }
    }

    #[tokio::test]
    async fn test_batch_describe_tolerates_gaps_and_dedups() {
        let known = Uuid::new_v4();
        let missing = Uuid::new_v4();
        let catalog = CountingCatalog {
            known,
            calls: AtomicU32::new(0),
        };

        let found = describe_packs(&catalog, vec![known, missing, known, known]).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[&known].name, "Quiz Night");
        assert!(!found.contains_key(&missing));
        // Duplicate ids collapse to one lookup each
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::Unavailable("x".into()).is_transient());
        assert!(GatewayError::DeadlineExceeded("x".into()).is_transient());
        assert!(GatewayError::ResourceExhausted("x".into()).is_transient());
        assert!(!GatewayError::NotFound("x".into()).is_transient());
        assert!(!GatewayError::Rejected("x".into()).is_transient());
        assert!(!GatewayError::Protocol("x".into()).is_transient());
    }
}
