//! In-memory gateway fakes shared by the service tests

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::config::LobbyConfig;
use crate::gateway::{
    ContentCatalog, GameSessionGateway, GatewayError, GatewayResult, IdentityGateway, NewSession,
    PackInfo, PackValidation, SessionHandle, UserIdentity,
};
use crate::storage::Database;

use super::{Gateways, Lobby};

#[derive(Default)]
struct IdentityInner {
    users: DashMap<Uuid, UserIdentity>,
    credentials: DashMap<String, Uuid>,
    resolve_calls: AtomicU32,
    offline: AtomicBool,
}

/// Identity service double backed by a user table
#[derive(Clone, Default)]
pub(crate) struct FakeIdentity {
    inner: Arc<IdentityInner>,
}

impl FakeIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, username: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        self.inner.users.insert(
            user_id,
            UserIdentity {
                user_id,
                username: username.to_string(),
                avatar_url: None,
            },
        );
        user_id
    }

    pub fn add_user_with_avatar(&self, username: &str, avatar_url: &str) -> Uuid {
        let user_id = self.add_user(username);
        if let Some(mut user) = self.inner.users.get_mut(&user_id) {
            user.avatar_url = Some(avatar_url.to_string());
        }
        user_id
    }

    pub fn grant_credential(&self, credential: &str, user_id: Uuid) {
        self.inner
            .credentials
            .insert(credential.to_string(), user_id);
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn resolve_calls(&self) -> u32 {
        self.inner.resolve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityGateway for FakeIdentity {
    async fn resolve(&self, user_id: Uuid) -> GatewayResult<UserIdentity> {
        self.inner.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("identity offline".into()));
        }
        self.inner
            .users
            .get(&user_id)
            .map(|user| user.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("user {user_id}")))
    }

    async fn verify(&self, credential: &str) -> GatewayResult<UserIdentity> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("identity offline".into()));
        }
        let user_id = self
            .inner
            .credentials
            .get(credential)
            .map(|entry| *entry)
            .ok_or_else(|| GatewayError::Rejected("unknown credential".into()))?;
        self.resolve(user_id).await
    }
}

struct PackRecord {
    info: PackInfo,
    approved: bool,
    owner: Option<Uuid>,
}

#[derive(Default)]
struct CatalogInner {
    packs: DashMap<Uuid, PackRecord>,
    describe_calls: AtomicU32,
    offline: AtomicBool,
}

/// Catalog service double; packs default to approved and freely usable
#[derive(Clone, Default)]
pub(crate) struct FakeCatalog {
    inner: Arc<CatalogInner>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, name: &str, approved: bool, owner: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.packs.insert(
            id,
            PackRecord {
                info: PackInfo {
                    id,
                    name: name.to_string(),
                    round_count: 3,
                    question_count: 30,
                },
                approved,
                owner,
            },
        );
        id
    }

    pub fn add_pack(&self, name: &str) -> Uuid {
        self.insert(name, true, None)
    }

    pub fn add_unapproved_pack(&self, name: &str) -> Uuid {
        self.insert(name, false, None)
    }

    pub fn add_private_pack(&self, name: &str, owner: Uuid) -> Uuid {
        self.insert(name, true, Some(owner))
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn describe_calls(&self) -> u32 {
        self.inner.describe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentCatalog for FakeCatalog {
    async fn validate(&self, pack_id: Uuid, user_id: Uuid) -> GatewayResult<PackValidation> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("catalog offline".into()));
        }
        Ok(match self.inner.packs.get(&pack_id) {
            Some(record) => PackValidation {
                exists: true,
                approved: record.approved,
                owned_by_user: record.owner.map_or(true, |owner| owner == user_id),
            },
            None => PackValidation {
                exists: false,
                approved: false,
                owned_by_user: false,
            },
        })
    }

    async fn describe(&self, pack_id: Uuid) -> GatewayResult<PackInfo> {
        self.inner.describe_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("catalog offline".into()));
        }
        self.inner
            .packs
            .get(&pack_id)
            .map(|record| record.info.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("pack {pack_id}")))
    }
}

#[derive(Default)]
struct GamesInner {
    created: Mutex<Vec<NewSession>>,
    counter: AtomicU32,
    fail_next: Mutex<Option<GatewayError>>,
}

/// Game service double that mints predictable session handles
#[derive(Clone, Default)]
pub(crate) struct FakeGames {
    inner: Arc<GamesInner>,
}

impl FakeGames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail exactly the next create call with this error
    pub fn fail_next(&self, error: GatewayError) {
        *self.inner.fail_next.lock().unwrap() = Some(error);
    }

    pub fn created(&self) -> Vec<NewSession> {
        self.inner.created.lock().unwrap().clone()
    }

    pub fn sessions_created(&self) -> u32 {
        self.inner.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GameSessionGateway for FakeGames {
    async fn create(&self, request: NewSession) -> GatewayResult<SessionHandle> {
        if let Some(error) = self.inner.fail_next.lock().unwrap().take() {
            return Err(error);
        }
        let n = self.inner.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.created.lock().unwrap().push(request);
        Ok(SessionHandle {
            session_id: format!("session-{n}"),
            connect_url: format!("wss://game.test/session-{n}"),
        })
    }
}

/// A fully wired lobby over an in-memory store and the fakes above.
/// The scratch directory holds the audit log and lives as long as the
/// harness does.
pub(crate) struct TestLobby {
    pub lobby: Lobby,
    pub identity: FakeIdentity,
    pub catalog: FakeCatalog,
    pub games: FakeGames,
    pub dir: tempfile::TempDir,
}

impl TestLobby {
    pub fn audit_path(&self) -> std::path::PathBuf {
        self.dir.path().join("events.jsonl")
    }
}

pub(crate) async fn lobby() -> TestLobby {
    lobby_with_config(LobbyConfig::default()).await
}

pub(crate) async fn lobby_with_config(mut config: LobbyConfig) -> TestLobby {
    // Honors RUST_LOG when set; later calls lose the race and that is fine
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    config.audit_log_path = dir.path().join("events.jsonl");

    let identity = FakeIdentity::new();
    let catalog = FakeCatalog::new();
    let games = FakeGames::new();

    let db = Database::open_in_memory().unwrap();
    let lobby = Lobby::open(
        config,
        db,
        Gateways {
            identity: Arc::new(identity.clone()),
            catalog: Arc::new(catalog.clone()),
            games: Arc::new(games.clone()),
        },
    )
    .await
    .unwrap();

    TestLobby {
        lobby,
        identity,
        catalog,
        games,
        dir,
    }
}
