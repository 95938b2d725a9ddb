//! External collaborator interfaces: persistence, auth token validation,
//! and leaderboard maintenance are modeled as async traits so the
//! registry/orchestrator never depends on a concrete storage engine.
//!
//! Grounded on the teacher's `services/sessions.rs` (`Sessions` struct
//! wrapping lookup + verification behind a trait-shaped API) and
//! `core/src/leaderboard/leaderboard.rs` (cached rank entries).

pub mod memory;

use crate::session::Session;
use crate::types::{PlayerId, SessionId, UtcDateTime};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Errors a collaborator implementation may raise.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollabError {
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error("auth token is invalid or expired")]
    InvalidToken,
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A player profile, tracked independently of any one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub created_at: UtcDateTime,
    pub last_active_at: UtcDateTime,
    pub games_played: u32,
    pub games_won: u32,
}

impl Player {
    pub fn new(id: PlayerId, display_name: impl Into<String>, now: UtcDateTime) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            created_at: now,
            last_active_at: now,
            games_played: 0,
            games_won: 0,
        }
    }

    /// Applied once per participant at `Finalize`, regardless of whether
    /// they won: every participant's games-played counter advances, and
    /// their won counter advances only if they are in the winner set.
    pub fn register_game_result(&mut self, won: bool, now: UtcDateTime) {
        self.games_played += 1;
        if won {
            self.games_won += 1;
        }
        self.last_active_at = now;
    }
}

/// One leaderboard row: cumulative points and game counts for a player
/// across every session they have finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub player: PlayerId,
    pub total_points: u32,
    pub games_played: u32,
    pub games_won: u32,
    pub last_updated_at: UtcDateTime,
}

/// Resolves and validates player identities.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    async fn get_by_id(&self, id: PlayerId) -> Result<Player, CollabError>;
    async fn add(&self, player: Player) -> Result<(), CollabError>;
    async fn update(&self, player: Player) -> Result<(), CollabError>;
}

/// Persists session snapshots across the lifecycle, not only at
/// completion — `CreateGame` adds a session the moment it is scheduled,
/// and later operations update the same record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_by_id(&self, session_id: SessionId) -> Result<Session, CollabError>;
    async fn add(&self, session: &Session) -> Result<(), CollabError>;
    async fn update(&self, session: &Session) -> Result<(), CollabError>;
    async fn get_active(&self) -> Result<Vec<Session>, CollabError>;
}

/// Appends resolved rounds for audit/replay and supports reading a
/// session's full round history back.
#[async_trait]
pub trait RoundLogStore: Send + Sync {
    async fn add(&self, log: crate::session::RoundLog) -> Result<(), CollabError>;
    async fn get_by_game_id(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<crate::session::RoundLog>, CollabError>;
}

/// Maintains cross-session point totals and rank.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    async fn get_by_player_id(&self, player: PlayerId) -> Result<Option<LeaderboardEntry>, CollabError>;
    async fn upsert(&self, entry: LeaderboardEntry) -> Result<(), CollabError>;
    async fn get_top(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, CollabError>;
}

/// Validates a connection's bearer token into a [`PlayerId`]. Token
/// issuance itself is out of scope.
#[async_trait]
pub trait AuthTokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<PlayerId, CollabError>;
}
