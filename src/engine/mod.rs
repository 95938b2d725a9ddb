//! Tower Game Engine — round dealing, attempt resolution, and scoring,
//! expressed behind a `GameMode` trait so a future `Well` mode shares the
//! same operation set.

pub mod tower;

use crate::types::{PlayerId, UtcDateTime};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while driving a [`GameMode`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EngineError {
    #[error("game has already ended")]
    GameOverAlready,
    #[error("the previous round has not been resolved yet")]
    PreviousUnresolved,
    #[error("there is no active round to register an attempt against")]
    NoActiveRound,
    #[error("player {0} is not part of this game")]
    NotParticipant(PlayerId),
    #[error("this game mode is not implemented")]
    Unimplemented,
}

/// A single participant's running score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerScore {
    pub player: PlayerId,
    pub wins: u32,
}

/// Immutable snapshot of every participant's score at a point in time.
#[derive(Debug, Clone)]
pub struct ScoreSnapshot {
    pub scores: Vec<PlayerScore>,
    pub captured_at: UtcDateTime,
}

/// The materialized deal for a freshly started round: the shared card plus
/// each participant's own card, keyed by player so a client can be told
/// only its own card index.
#[derive(Debug, Clone)]
pub struct RoundStart {
    pub round_number: u32,
    pub shared_card_index: u32,
    pub player_card_indexes: HashMap<PlayerId, u32>,
    pub started_at: UtcDateTime,
}

/// The result of registering a `ClickSymbol` attempt. Resolution is a
/// two-stage decision: `attempt_accepted` only asserts that the guessed
/// symbol is a member of the caller's own dealt card (a bounds check, not
/// a correctness check); `round_resolved` is additionally true only when
/// the guessed symbol is the one the card shares with the round's shared
/// card. A rejected guess (`attempt_accepted == false`) and an accepted
/// but wrong guess (`attempt_accepted == true`, `round_resolved == false`)
/// both leave the round open for further attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResolution {
    pub round_number: u32,
    pub attempt_accepted: bool,
    pub round_resolved: bool,
    pub resolving_player: Option<PlayerId>,
    pub resolving_player_card_index: Option<u32>,
    pub matching_symbol_id: Option<u32>,
    pub resolution_duration_ms: Option<i64>,
    pub game_completed: bool,
}

/// Uniform operation set shared by every game mode. `Tower` is the only
/// mode that runs; `Well` is a reserved stub that returns
/// [`EngineError::Unimplemented`] for everything.
pub trait GameMode {
    /// `Initialize`: prepares the runtime for the first round. Idempotent
    /// only before the first round starts.
    fn initialize(&mut self) -> Result<(), EngineError>;

    /// `StartNextRound`: deals the next round's cards from the deck
    /// cursor. Fails if the previous round has not been resolved.
    fn start_next_round(&mut self, now: UtcDateTime) -> Result<RoundStart, EngineError>;

    /// `RegisterAttempt`: resolves a participant's guess against the
    /// active round's shared symbol. The player's own dealt card is
    /// looked up internally; the caller supplies only the guessed symbol.
    fn register_attempt(
        &mut self,
        player: PlayerId,
        symbol_id: u32,
        now: UtcDateTime,
    ) -> Result<RoundResolution, EngineError>;

    /// `GetScoreSnapshot`.
    fn score_snapshot(&self, now: UtcDateTime) -> ScoreSnapshot;

    /// Whether the game has reached its terminal state.
    fn is_game_over(&self) -> bool;
}
