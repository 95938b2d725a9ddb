//! Session Registry & Orchestrator — owns every live session's runtime,
//! serializes access to each one behind a per-session lock held across
//! collaborator calls, and composes the session aggregate, the game
//! engine, and the collaborator interfaces into the orchestrator's public
//! operations.
//!
//! Grounded on `core/src/game/manager.rs`'s `Games { games: RwLock<HashMap
//! <GameID, Game>> }` outer-map shape, generalized from a synchronous
//! `RwLock` critical section to a `tokio::sync::Mutex` per entry so the
//! lock can be held across the `.await`s this orchestrator's collaborator
//! calls require.
//!
//! The runtime holds a concrete `Tower` engine rather than a boxed
//! `GameMode` — `Tower` is the only mode this registry wires up (the
//! `Well` stub is exercised only by `engine`'s own tests), and a concrete
//! field avoids a pointless trait-object indirection.

use crate::collab::{
    AuthTokenValidator, CollabError, LeaderboardEntry, LeaderboardStore, Player, PlayerStore,
    RoundLogStore, SessionStore,
};
use crate::deck::DeckDesign;
use crate::engine::tower::Tower;
use crate::engine::{EngineError, GameMode, RoundResolution, ScoreSnapshot};
use crate::session::{RoundLog, Session, SessionError, SessionPhase};
use crate::types::{Mode, PlayerId, SessionId, UtcDateTime};
use log::{debug, error};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Errors raised by the orchestrator's public operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error("session {0} has no active runtime (not yet started)")]
    NotActive(SessionId),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("collaborator error: {0}")]
    Collab(#[from] CollabError),
    #[error("game mode {0} has no engine implementation")]
    UnsupportedMode(Mode),
    #[error("requested roster size {requested} is outside the configured bounds [{min}, {max}]")]
    RosterSizeOutOfBounds { requested: u32, min: u32, max: u32 },
    #[error("requested round count {requested} is outside the configured bounds [{min}, {max}]")]
    RoundCountOutOfBounds { requested: u32, min: u32, max: u32 },
    #[error("operation canceled")]
    Canceled,
}

/// A single active game: the lifecycle aggregate plus the engine driving
/// its rounds. Exists only between `StartGame` and completion — a
/// scheduled-but-not-yet-started session has no engine and lives in the
/// registry's `pending` map instead.
struct Runtime {
    session: Session,
    engine: Tower,
}

/// Bundles every collaborator handle the orchestrator calls out to. Held
/// as `Arc<dyn Trait>` so a real deployment can swap in persistence-backed
/// implementations without touching this module.
pub struct Collaborators {
    pub players: Arc<dyn PlayerStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub round_logs: Arc<dyn RoundLogStore>,
    pub leaderboard: Arc<dyn LeaderboardStore>,
    pub auth: Arc<dyn AuthTokenValidator>,
}

/// Roster/round bounds and deck-order discipline the registry enforces
/// for every session it creates.
pub struct RegistryLimits {
    pub min_players: u32,
    pub max_players: u32,
    pub min_rounds: u32,
    pub max_rounds: u32,
    pub shuffle_deck: bool,
    pub random_seed: Option<u64>,
}

/// Events the dispatcher must broadcast after a registry operation
/// completes and its session lock has been released (ordering guarantee:
/// RoundStart(k) < RoundResult(k) < {RoundStart(k+1) | GameOver}).
#[derive(Debug, Clone)]
pub enum GameEvent {
    RoundStart {
        session_id: SessionId,
        round_number: u32,
        shared_card_index: u32,
        player_card_indexes: HashMap<PlayerId, u32>,
        started_at: UtcDateTime,
    },
    RoundResult {
        session_id: SessionId,
        round_number: u32,
        attempt_accepted: bool,
        round_resolved: bool,
        resolving_player: Option<PlayerId>,
        resolving_player_card_index: Option<u32>,
        matching_symbol_id: Option<u32>,
        processed_at: UtcDateTime,
        resolution_duration_ms: Option<i64>,
        scores: Option<ScoreSnapshot>,
        game_completed: bool,
    },
    GameOver {
        session_id: SessionId,
        final_scores: ScoreSnapshot,
        completed_at: UtcDateTime,
    },
}

/// The result of a `ClickSymbol` call: a direct reply for the invoking
/// connection, and the (possibly longer) sequence of events every
/// connection in the session's group should receive. Both carry the same
/// `RoundResult` so a client that only looks at broadcasts still sees its
/// own attempt resolved; callers must dedupe on round number.
pub struct ClickOutcome {
    pub reply: GameEvent,
    pub broadcast: Vec<GameEvent>,
}

/// Owns every scheduled-but-not-started session's lock and every active
/// game's runtime, as two separate maps. Both outer maps are synchronous
/// `parking_lot::RwLock`s — lookups and inserts are short and never cross
/// an `.await` — while each entry's `tokio::sync::Mutex` is held for the
/// full duration of an operation, including collaborator calls, to
/// guarantee per-session linearizability.
pub struct Registry {
    deck: Arc<DeckDesign>,
    pending: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    games: RwLock<HashMap<SessionId, Arc<Mutex<Runtime>>>>,
    collab: Collaborators,
    limits: RegistryLimits,
    /// Canceled once, on graceful shutdown. Every public operation is
    /// handed a clone of this token: an operation that has not yet taken
    /// its session lock aborts immediately with `Canceled` and no side
    /// effects; one already past the lock treats cancellation as advisory,
    /// running to a consistent state before reporting `Canceled`.
    shutdown: CancellationToken,
}

impl Registry {
    pub fn new(deck: Arc<DeckDesign>, collab: Collaborators, limits: RegistryLimits) -> Self {
        Self {
            deck,
            pending: RwLock::new(HashMap::new()),
            games: RwLock::new(HashMap::new()),
            collab,
            limits,
            shutdown: CancellationToken::new(),
        }
    }

    /// The cancellation handle every caller should thread through the
    /// operations below. Cloning is cheap (an `Arc` under the hood).
    pub fn cancellation(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn check_canceled(cancel: &CancellationToken) -> Result<(), OrchestratorError> {
        if cancel.is_cancelled() {
            Err(OrchestratorError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Looks up an active game's runtime, distinguishing "never existed"
    /// from "exists but hasn't started yet" so callers can surface
    /// `NotActive` rather than a misleading `SessionNotFound`.
    fn entry(&self, id: SessionId) -> Result<Arc<Mutex<Runtime>>, OrchestratorError> {
        if let Some(handle) = self.games.read().get(&id).cloned() {
            return Ok(handle);
        }
        if self.pending.read().contains_key(&id) {
            return Err(OrchestratorError::NotActive(id));
        }
        Err(OrchestratorError::SessionNotFound(id))
    }

    /// `CreateGame`: schedules a new session and inserts its lock into the
    /// pending map. No engine exists yet — that is built only once the
    /// session starts.
    pub async fn create_game(
        &self,
        mode: Mode,
        max_players: u32,
        max_rounds: u32,
        now: UtcDateTime,
        cancel: &CancellationToken,
    ) -> Result<SessionId, OrchestratorError> {
        Self::check_canceled(cancel)?;
        if mode != Mode::Tower {
            return Err(OrchestratorError::UnsupportedMode(mode));
        }
        if max_players < self.limits.min_players || max_players > self.limits.max_players {
            return Err(OrchestratorError::RosterSizeOutOfBounds {
                requested: max_players,
                min: self.limits.min_players,
                max: self.limits.max_players,
            });
        }
        if max_rounds < self.limits.min_rounds || max_rounds > self.limits.max_rounds {
            return Err(OrchestratorError::RoundCountOutOfBounds {
                requested: max_rounds,
                min: self.limits.min_rounds,
                max: self.limits.max_rounds,
            });
        }

        let session = Session::schedule(mode, max_players, max_rounds, now);
        let id = session.id;
        self.collab.sessions.add(&session).await?;

        self.pending
            .write()
            .insert(id, Arc::new(Mutex::new(session)));
        debug!("created session {id} (mode={mode}, max_players={max_players})");
        Self::check_canceled(cancel)?;
        Ok(id)
    }

    /// `JoinGame`: adds a participant to a still-scheduled session, held in
    /// the pending map. A join against an already-active session is
    /// rejected the same way a second `Session::add_participant` call
    /// would be: `AlreadyStarted`.
    pub async fn join_game(
        &self,
        session_id: SessionId,
        player: PlayerId,
        now: UtcDateTime,
        cancel: &CancellationToken,
    ) -> Result<Player, OrchestratorError> {
        Self::check_canceled(cancel)?;
        let profile = self.collab.players.get_by_id(player).await?;

        if let Some(handle) = self.pending.read().get(&session_id).cloned() {
            Self::check_canceled(cancel)?;
            let mut session = handle.lock().await;
            session.add_participant(player, now)?;
            self.collab.sessions.update(&session).await?;
            debug!("player {player} joined session {session_id}");
            Self::check_canceled(cancel)?;
            return Ok(profile);
        }

        if self.games.read().contains_key(&session_id) {
            return Err(OrchestratorError::Session(SessionError::AlreadyStarted));
        }

        Err(OrchestratorError::SessionNotFound(session_id))
    }

    /// `StartGame`: moves a pending session into the active map, building
    /// its engine and dealing the first round only once the transition and
    /// the deal both succeed. Refuses a session that is already active.
    pub async fn start_game(
        &self,
        session_id: SessionId,
        now: UtcDateTime,
        cancel: &CancellationToken,
    ) -> Result<GameEvent, OrchestratorError> {
        Self::check_canceled(cancel)?;
        if self.games.read().contains_key(&session_id) {
            return Err(OrchestratorError::Session(SessionError::AlreadyStarted));
        }

        let handle = self
            .pending
            .read()
            .get(&session_id)
            .cloned()
            .ok_or(OrchestratorError::SessionNotFound(session_id))?;
        Self::check_canceled(cancel)?;
        let mut session = handle.lock().await;

        session.start(now)?;
        let participants = session.participants.clone();
        let max_rounds = session.max_rounds;
        let mut engine = Tower::new(
            self.deck.clone(),
            participants,
            max_rounds,
            self.limits.shuffle_deck,
            self.limits.random_seed,
        );
        engine.initialize()?;
        let round_start = engine.start_next_round(now)?;
        self.collab.sessions.update(&session).await?;

        let runtime = Runtime {
            session: session.clone(),
            engine,
        };
        drop(session);
        self.pending.write().remove(&session_id);
        self.games
            .write()
            .insert(session_id, Arc::new(Mutex::new(runtime)));

        debug!(
            "session {session_id} started round {}",
            round_start.round_number
        );
        Self::check_canceled(cancel)?;
        Ok(GameEvent::RoundStart {
            session_id,
            round_number: round_start.round_number,
            shared_card_index: round_start.shared_card_index,
            player_card_indexes: round_start.player_card_indexes,
            started_at: round_start.started_at,
        })
    }

    /// `ClickSymbol`: registers a participant's guess. At most one caller
    /// can resolve a given round because the session lock serializes every
    /// call — the engine itself makes no promise beyond "first resolved
    /// wins".
    pub async fn click_symbol(
        &self,
        session_id: SessionId,
        player: PlayerId,
        symbol_id: u32,
        now: UtcDateTime,
        cancel: &CancellationToken,
    ) -> Result<ClickOutcome, OrchestratorError> {
        Self::check_canceled(cancel)?;
        let handle = self.entry(session_id)?;
        Self::check_canceled(cancel)?;
        let mut runtime = handle.lock().await;

        let resolution = runtime.engine.register_attempt(player, symbol_id, now)?;

        let round_result = self.round_result_event(session_id, &runtime, &resolution, now);

        if !resolution.round_resolved {
            Self::check_canceled(cancel)?;
            return Ok(ClickOutcome {
                reply: round_result.clone(),
                broadcast: vec![round_result],
            });
        }

        self.log_round(&mut runtime, &resolution, now).await?;
        let mut broadcast = vec![round_result.clone()];

        if resolution.game_completed {
            let final_scores = self.finalize(&mut runtime, now).await?;
            broadcast.push(GameEvent::GameOver {
                session_id,
                final_scores,
                completed_at: now,
            });
        } else {
            let round_start = runtime.engine.start_next_round(now)?;
            self.collab.sessions.update(&runtime.session).await?;
            broadcast.push(GameEvent::RoundStart {
                session_id,
                round_number: round_start.round_number,
                shared_card_index: round_start.shared_card_index,
                player_card_indexes: round_start.player_card_indexes,
                started_at: round_start.started_at,
            });
        }

        Self::check_canceled(cancel)?;
        Ok(ClickOutcome {
            reply: round_result,
            broadcast,
        })
    }

    fn round_result_event(
        &self,
        session_id: SessionId,
        runtime: &Runtime,
        resolution: &RoundResolution,
        now: UtcDateTime,
    ) -> GameEvent {
        GameEvent::RoundResult {
            session_id,
            round_number: resolution.round_number,
            attempt_accepted: resolution.attempt_accepted,
            round_resolved: resolution.round_resolved,
            resolving_player: resolution.resolving_player,
            resolving_player_card_index: resolution.resolving_player_card_index,
            matching_symbol_id: resolution.matching_symbol_id,
            processed_at: now,
            resolution_duration_ms: resolution.resolution_duration_ms,
            scores: resolution
                .round_resolved
                .then(|| runtime.engine.score_snapshot(now)),
            game_completed: resolution.game_completed,
        }
    }

    async fn log_round(
        &self,
        runtime: &mut Runtime,
        resolution: &RoundResolution,
        now: UtcDateTime,
    ) -> Result<(), OrchestratorError> {
        let log = RoundLog {
            session_id: runtime.session.id,
            round_number: resolution.round_number,
            shared_card_index: runtime.engine.active_shared_card_index().unwrap_or(0),
            winner: resolution
                .resolving_player
                .expect("a resolved round always names its resolving player"),
            winner_card_index: resolution
                .resolving_player_card_index
                .expect("a resolved round always names the resolving card index"),
            winning_symbol: resolution
                .matching_symbol_id
                .expect("a resolved round always names the matching symbol"),
            resolved_at: now,
        };
        runtime.session.register_round(log.clone())?;
        self.collab.round_logs.add(log).await?;
        Ok(())
    }

    /// `Finalize`: completes the session if it has not already been, pays
    /// out every participant's leaderboard entry and per-player stats
    /// (a `GamesPlayed` increment and `+finalScore` points for everyone, a
    /// `GamesWon` increment only for the winner set), persists the
    /// completed session, and removes the runtime from the active map.
    async fn finalize(
        &self,
        runtime: &mut Runtime,
        now: UtcDateTime,
    ) -> Result<ScoreSnapshot, OrchestratorError> {
        if runtime.session.phase != SessionPhase::Completed {
            runtime.session.complete(now)?;
        }

        let snapshot = runtime.engine.score_snapshot(now);
        let max_score = snapshot.scores.iter().map(|s| s.wins).max().unwrap_or(0);

        for score in &snapshot.scores {
            // Winner set is everyone at the max score, per the literal
            // definition — a session force-finalized before any round
            // resolves (e.g. on graceful shutdown) has every participant
            // tied at zero, and every one of them is in the winner set.
            let won = score.wins == max_score;

            let mut profile = self.collab.players.get_by_id(score.player).await?;
            profile.register_game_result(won, now);
            self.collab.players.update(profile).await?;

            let mut entry = self
                .collab
                .leaderboard
                .get_by_player_id(score.player)
                .await?
                .unwrap_or(LeaderboardEntry {
                    player: score.player,
                    total_points: 0,
                    games_played: 0,
                    games_won: 0,
                    last_updated_at: now,
                });
            entry.total_points += score.wins;
            entry.games_played += 1;
            if won {
                entry.games_won += 1;
            }
            entry.last_updated_at = now;
            self.collab.leaderboard.upsert(entry).await?;
        }

        self.collab.sessions.update(&runtime.session).await?;
        let id = runtime.session.id;
        self.games.write().remove(&id);
        debug!("session {id} finalized and removed from the active map");
        Ok(snapshot)
    }

    /// `GetScoresSnapshot`: a read-only peek at the current standings,
    /// still serialized through the session lock since the engine is
    /// mutable state.
    pub async fn get_scores_snapshot(
        &self,
        session_id: SessionId,
        now: UtcDateTime,
        cancel: &CancellationToken,
    ) -> Result<ScoreSnapshot, OrchestratorError> {
        Self::check_canceled(cancel)?;
        let handle = self.entry(session_id)?;
        Self::check_canceled(cancel)?;
        let runtime = handle.lock().await;
        Self::check_canceled(cancel)?;
        Ok(runtime.engine.score_snapshot(now))
    }

    /// Finalizes every session still tracked in the active map, as if each
    /// had received `PersistEndGame`. Called once, from the graceful
    /// shutdown path; errors are logged rather than propagated since the
    /// process is already on its way out. Also fires the shutdown
    /// cancellation token, so any caller still waiting on a session lock
    /// when this runs gets `Canceled` instead of blocking indefinitely.
    pub async fn finalize_all_active_sessions(&self, now: UtcDateTime) {
        self.shutdown.cancel();
        let ids: Vec<SessionId> = self.games.read().keys().copied().collect();
        for id in ids {
            let Some(handle) = self.games.read().get(&id).cloned() else {
                continue;
            };
            let mut runtime = handle.lock().await;
            if let Err(err) = self.finalize(&mut runtime, now).await {
                error!("failed to finalize session {id} during shutdown: {err}");
            }
        }
    }

    pub fn active_session_count(&self) -> usize {
        self.games.read().len()
    }

    pub fn deck_stats(&self) -> crate::deck::DeckStats {
        self.deck.stats()
    }

    /// The auth token validator, exposed so the dispatcher can
    /// authenticate a connection before issuing any orchestrator operation
    /// on its behalf.
    pub fn auth(&self) -> &Arc<dyn AuthTokenValidator> {
        &self.collab.auth
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::collab::memory::{
        InMemoryAuthTokenValidator, InMemoryLeaderboardStore, InMemoryPlayerStore,
        InMemoryRoundLogStore, InMemorySessionStore,
    };
    use chrono::Utc;

    fn test_limits() -> RegistryLimits {
        RegistryLimits {
            min_players: 1,
            max_players: 8,
            min_rounds: 1,
            max_rounds: 30,
            shuffle_deck: false,
            random_seed: None,
        }
    }

    fn build_registry(order: u32) -> (Registry, Arc<InMemoryPlayerStore>) {
        let deck = Arc::new(DeckDesign::create(order).unwrap());
        let players = Arc::new(InMemoryPlayerStore::new());
        let collab = Collaborators {
            players: players.clone(),
            sessions: Arc::new(InMemorySessionStore::new()),
            round_logs: Arc::new(InMemoryRoundLogStore::new()),
            leaderboard: Arc::new(InMemoryLeaderboardStore::new()),
            auth: Arc::new(InMemoryAuthTokenValidator::new()),
        };
        (Registry::new(deck, collab, test_limits()), players)
    }

    async fn seed_player(players: &InMemoryPlayerStore, id: PlayerId, name: &str) {
        players.insert(crate::collab::Player::new(id, name, Utc::now()));
    }

    #[tokio::test]
    async fn create_join_start_round_trip() {
        let (registry, players) = build_registry(3);
        let now = Utc::now();
        let cancel = CancellationToken::new();

        let session_id = registry.create_game(Mode::Tower, 2, 3, now, &cancel).await.unwrap();

        let p1 = PlayerId(uuid::Uuid::new_v4());
        seed_player(&players, p1, "alice").await;
        registry.join_game(session_id, p1, now, &cancel).await.unwrap();

        let event = registry.start_game(session_id, now, &cancel).await.unwrap();
        assert!(matches!(
            event,
            GameEvent::RoundStart {
                round_number: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn create_game_rejects_out_of_bounds_roster_size() {
        let (registry, _players) = build_registry(3);
        let now = Utc::now();
        let cancel = CancellationToken::new();
        let result = registry.create_game(Mode::Tower, 99, 3, now, &cancel).await;
        assert!(matches!(
            result,
            Err(OrchestratorError::RosterSizeOutOfBounds {
                requested: 99,
                min: 1,
                max: 8
            })
        ));
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let (registry, _players) = build_registry(3);
        let bogus = SessionId::new();
        let cancel = CancellationToken::new();
        let result = registry.get_scores_snapshot(bogus, Utc::now(), &cancel).await;
        assert!(matches!(result, Err(OrchestratorError::SessionNotFound(_))));
    }

    /// A token canceled before the call starts aborts with no side
    /// effects: the session is never scheduled at all.
    #[tokio::test]
    async fn create_game_aborts_with_no_side_effects_if_already_canceled() {
        let (registry, _players) = build_registry(3);
        let now = Utc::now();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = registry
            .create_game(Mode::Tower, 2, 3, now, &cancel)
            .await;
        assert!(matches!(result, Err(OrchestratorError::Canceled)));
    }

    /// A token canceled before `JoinGame` is called aborts with no side
    /// effects: the roster is untouched and a later join with a fresh
    /// token still succeeds.
    #[tokio::test]
    async fn join_game_aborts_with_no_side_effects_if_already_canceled() {
        let (registry, players) = build_registry(3);
        let now = Utc::now();
        let live = CancellationToken::new();
        let session_id = registry
            .create_game(Mode::Tower, 2, 3, now, &live)
            .await
            .unwrap();
        let p1 = PlayerId(uuid::Uuid::new_v4());
        seed_player(&players, p1, "alice").await;

        let canceled = CancellationToken::new();
        canceled.cancel();
        let result = registry.join_game(session_id, p1, now, &canceled).await;
        assert!(matches!(result, Err(OrchestratorError::Canceled)));

        registry.join_game(session_id, p1, now, &live).await.unwrap();
    }

    /// The registry's own shutdown token, exposed via `cancellation()`, is
    /// fired by `finalize_all_active_sessions` — any caller still holding
    /// a clone observes the cancellation after teardown begins.
    #[tokio::test]
    async fn finalize_all_active_sessions_fires_the_shutdown_token() {
        let (registry, _players) = build_registry(3);
        let now = Utc::now();
        let cancel = registry.cancellation();
        assert!(!cancel.is_cancelled());

        registry.finalize_all_active_sessions(now).await;
        assert!(cancel.is_cancelled());
    }

    /// A session that has been created but not yet started has no engine
    /// runtime; reads against it must fail `NotActive`, not succeed with an
    /// empty snapshot.
    #[tokio::test]
    async fn scores_snapshot_on_a_not_yet_started_session_is_not_active() {
        let (registry, _players) = build_registry(3);
        let now = Utc::now();
        let cancel = CancellationToken::new();
        let session_id = registry.create_game(Mode::Tower, 2, 3, now, &cancel).await.unwrap();

        let result = registry.get_scores_snapshot(session_id, now, &cancel).await;
        assert!(matches!(result, Err(OrchestratorError::NotActive(id)) if id == session_id));
    }

    /// E4: starting a session before it has any participants fails with
    /// `NotEnoughPlayers`-equivalent `EmptyRoster`, and the session remains
    /// joinable afterwards.
    #[tokio::test]
    async fn starting_an_empty_session_fails_and_stays_joinable() {
        let (registry, players) = build_registry(3);
        let now = Utc::now();
        let cancel = CancellationToken::new();
        let session_id = registry.create_game(Mode::Tower, 2, 3, now, &cancel).await.unwrap();

        let result = registry.start_game(session_id, now, &cancel).await;
        assert!(matches!(
            result,
            Err(OrchestratorError::Session(SessionError::EmptyRoster))
        ));

        let p1 = PlayerId(uuid::Uuid::new_v4());
        seed_player(&players, p1, "alice").await;
        registry.join_game(session_id, p1, now, &cancel).await.unwrap();
    }

    /// E5: a third join past `MaxPlayers` is rejected with `Capacity`, and
    /// the roster remains exactly the first two joiners.
    #[tokio::test]
    async fn join_past_capacity_is_rejected() {
        let (registry, players) = build_registry(3);
        let now = Utc::now();
        let cancel = CancellationToken::new();
        let session_id = registry.create_game(Mode::Tower, 2, 3, now, &cancel).await.unwrap();

        let p1 = PlayerId(uuid::Uuid::new_v4());
        let p2 = PlayerId(uuid::Uuid::new_v4());
        let p3 = PlayerId(uuid::Uuid::new_v4());
        for (id, name) in [(p1, "p1"), (p2, "p2"), (p3, "p3")] {
            seed_player(&players, id, name).await;
        }

        registry.join_game(session_id, p1, now, &cancel).await.unwrap();
        registry.join_game(session_id, p2, now, &cancel).await.unwrap();
        let result = registry.join_game(session_id, p3, now, &cancel).await;
        assert!(matches!(
            result,
            Err(OrchestratorError::Session(SessionError::Capacity { max_players: 2 }))
        ));
    }

    /// E3: a click from someone who never joined is rejected as
    /// `NotParticipant`, with no score movement.
    #[tokio::test]
    async fn click_from_a_non_participant_is_rejected() {
        let (registry, players) = build_registry(3);
        let now = Utc::now();
        let cancel = CancellationToken::new();
        let session_id = registry.create_game(Mode::Tower, 2, 1, now, &cancel).await.unwrap();
        let p1 = PlayerId(uuid::Uuid::new_v4());
        let stranger = PlayerId(uuid::Uuid::new_v4());
        seed_player(&players, p1, "alice").await;
        registry.join_game(session_id, p1, now, &cancel).await.unwrap();
        registry.start_game(session_id, now, &cancel).await.unwrap();

        let result = registry.click_symbol(session_id, stranger, 0, now, &cancel).await;
        assert!(matches!(
            result,
            Err(OrchestratorError::Engine(EngineError::NotParticipant(_)))
        ));

        let scores = registry.get_scores_snapshot(session_id, now, &cancel).await.unwrap();
        assert!(scores.scores.iter().all(|s| s.wins == 0));
    }

    /// E1/E6 in miniature: a single participant resolves the only round of
    /// a one-round game; the reply and the broadcast both carry a
    /// `RoundResult` for the same round, followed by `GameOver`, and the
    /// session is removed from the active map.
    #[tokio::test]
    async fn full_game_reaches_game_over_and_finalizes() {
        let (registry, players) = build_registry(3);
        let now = Utc::now();
        let deck = DeckDesign::create(3).unwrap();
        let cancel = CancellationToken::new();

        let session_id = registry.create_game(Mode::Tower, 1, 1, now, &cancel).await.unwrap();
        let p1 = PlayerId(uuid::Uuid::new_v4());
        seed_player(&players, p1, "alice").await;
        registry.join_game(session_id, p1, now, &cancel).await.unwrap();

        let start_event = registry.start_game(session_id, now, &cancel).await.unwrap();
        let (shared_card_index, player_cards) = match start_event {
            GameEvent::RoundStart {
                shared_card_index,
                player_card_indexes,
                ..
            } => (shared_card_index, player_card_indexes),
            _ => panic!("expected RoundStart"),
        };
        let &card_index = player_cards.get(&p1).unwrap();
        let winning_symbol = deck.find_common_symbol(card_index, shared_card_index).unwrap();

        let outcome = registry
            .click_symbol(session_id, p1, winning_symbol, now, &cancel)
            .await
            .unwrap();
        assert!(matches!(
            outcome.reply,
            GameEvent::RoundResult {
                round_resolved: true,
                game_completed: true,
                ..
            }
        ));
        assert_eq!(outcome.broadcast.len(), 2);
        assert!(matches!(outcome.broadcast[0], GameEvent::RoundResult { .. }));
        assert!(matches!(outcome.broadcast[1], GameEvent::GameOver { .. }));
        assert_eq!(registry.active_session_count(), 0);
    }

    /// Universal property 3: under concurrent `ClickSymbol` calls for the
    /// same round, at most one resolves.
    #[tokio::test]
    async fn at_most_one_winner_under_concurrent_clicks() {
        let (registry, players) = build_registry(5);
        let now = Utc::now();
        let deck = DeckDesign::create(5).unwrap();
        let registry = Arc::new(registry);
        let cancel = CancellationToken::new();

        let session_id = registry.create_game(Mode::Tower, 2, 1, now, &cancel).await.unwrap();
        let p1 = PlayerId(uuid::Uuid::new_v4());
        let p2 = PlayerId(uuid::Uuid::new_v4());
        seed_player(&players, p1, "p1").await;
        seed_player(&players, p2, "p2").await;
        registry.join_game(session_id, p1, now, &cancel).await.unwrap();
        registry.join_game(session_id, p2, now, &cancel).await.unwrap();

        let start_event = registry.start_game(session_id, now, &cancel).await.unwrap();
        let (shared_card_index, player_cards) = match start_event {
            GameEvent::RoundStart {
                shared_card_index,
                player_card_indexes,
                ..
            } => (shared_card_index, player_card_indexes),
            _ => panic!("expected RoundStart"),
        };
        let symbol_for = |player: PlayerId| {
            let card = *player_cards.get(&player).unwrap();
            deck.find_common_symbol(card, shared_card_index).unwrap()
        };
        let (s1, s2) = (symbol_for(p1), symbol_for(p2));

        let r1 = Arc::clone(&registry);
        let r2 = Arc::clone(&registry);
        let cancel1 = cancel.clone();
        let cancel2 = cancel.clone();
        let (a, b) = tokio::join!(
            tokio::spawn(async move { r1.click_symbol(session_id, p1, s1, now, &cancel1).await }),
            tokio::spawn(async move { r2.click_symbol(session_id, p2, s2, now, &cancel2).await }),
        );
        let resolved_count = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter(|result| {
                matches!(
                    result,
                    Ok(ClickOutcome {
                        reply: GameEvent::RoundResult {
                            round_resolved: true,
                            ..
                        },
                        ..
                    })
                )
            })
            .count();
        assert_eq!(resolved_count, 1);
    }
}
