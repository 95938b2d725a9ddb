//! In-memory default implementations of the collaborator traits, sufficient
//! to run the binary and the orchestrator's own end-to-end tests without a
//! real persistence engine.
//!
//! Grounded on `services/game/store.rs`'s `Games { games: RwLock<...> }`
//! shape — a single `parking_lot::RwLock<HashMap<...>>` guarding all state,
//! no async needed for the lock itself since critical sections are short.

use super::{
    AuthTokenValidator, CollabError, LeaderboardEntry, LeaderboardStore, Player, PlayerStore,
    RoundLogStore, SessionStore,
};
use crate::session::{RoundLog, Session};
use crate::types::{PlayerId, SessionId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// A fixed roster of known players, keyed by id.
#[derive(Default)]
pub struct InMemoryPlayerStore {
    players: RwLock<HashMap<PlayerId, Player>>,
}

impl InMemoryPlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a player directly, bypassing `add`'s async signature —
    /// convenient for tests and for the binary's own bootstrap.
    pub fn insert(&self, player: Player) {
        self.players.write().insert(player.id, player);
    }
}

#[async_trait]
impl PlayerStore for InMemoryPlayerStore {
    async fn get_by_id(&self, id: PlayerId) -> Result<Player, CollabError> {
        self.players
            .read()
            .get(&id)
            .cloned()
            .ok_or(CollabError::PlayerNotFound(id))
    }

    async fn add(&self, player: Player) -> Result<(), CollabError> {
        self.players.write().insert(player.id, player);
        Ok(())
    }

    async fn update(&self, player: Player) -> Result<(), CollabError> {
        let mut players = self.players.write();
        if !players.contains_key(&player.id) {
            return Err(CollabError::PlayerNotFound(player.id));
        }
        players.insert(player.id, player);
        Ok(())
    }
}

/// Tracks every session across its lifecycle, keyed by id.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_by_id(&self, session_id: SessionId) -> Result<Session, CollabError> {
        self.sessions
            .read()
            .get(&session_id)
            .cloned()
            .ok_or(CollabError::SessionNotFound(session_id))
    }

    async fn add(&self, session: &Session) -> Result<(), CollabError> {
        self.sessions.write().insert(session.id, session.clone());
        Ok(())
    }

    async fn update(&self, session: &Session) -> Result<(), CollabError> {
        let mut sessions = self.sessions.write();
        if !sessions.contains_key(&session.id) {
            return Err(CollabError::SessionNotFound(session.id));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_active(&self) -> Result<Vec<Session>, CollabError> {
        use crate::session::SessionPhase;
        Ok(self
            .sessions
            .read()
            .values()
            .filter(|s| s.phase != SessionPhase::Completed)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryRoundLogStore {
    log: RwLock<HashMap<SessionId, Vec<RoundLog>>>,
}

impl InMemoryRoundLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoundLogStore for InMemoryRoundLogStore {
    async fn add(&self, log: RoundLog) -> Result<(), CollabError> {
        self.log.write().entry(log.session_id).or_default().push(log);
        Ok(())
    }

    async fn get_by_game_id(&self, session_id: SessionId) -> Result<Vec<RoundLog>, CollabError> {
        Ok(self
            .log
            .read()
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Cross-session point tallies, re-ranked on every read — adequate for the
/// scale this crate targets; a real deployment would cache ranks the way
/// the teacher's `leaderboard.rs` does.
#[derive(Default)]
pub struct InMemoryLeaderboardStore {
    rows: RwLock<HashMap<PlayerId, LeaderboardEntry>>,
}

impl InMemoryLeaderboardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaderboardStore for InMemoryLeaderboardStore {
    async fn get_by_player_id(&self, player: PlayerId) -> Result<Option<LeaderboardEntry>, CollabError> {
        Ok(self.rows.read().get(&player).cloned())
    }

    async fn upsert(&self, entry: LeaderboardEntry) -> Result<(), CollabError> {
        self.rows.write().insert(entry.player, entry);
        Ok(())
    }

    async fn get_top(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, CollabError> {
        let rows = self.rows.read();
        let mut entries: Vec<LeaderboardEntry> = rows.values().cloned().collect();
        entries.sort_by(|a, b| b.total_points.cmp(&a.total_points));
        entries.truncate(limit as usize);
        Ok(entries)
    }
}

/// Accepts any registered token and resolves it to the player it was
/// issued for — adequate for local testing. Real token issuance and
/// verification is an external concern.
#[derive(Default)]
pub struct InMemoryAuthTokenValidator {
    tokens: RwLock<HashMap<String, PlayerId>>,
}

impl InMemoryAuthTokenValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, token: impl Into<String>, player: PlayerId) {
        self.tokens.write().insert(token.into(), player);
    }
}

#[async_trait]
impl AuthTokenValidator for InMemoryAuthTokenValidator {
    async fn validate(&self, token: &str) -> Result<PlayerId, CollabError> {
        self.tokens
            .read()
            .get(token)
            .copied()
            .ok_or(CollabError::InvalidToken)
    }
}
