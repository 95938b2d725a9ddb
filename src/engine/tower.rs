//! The `Tower` game mode: each round deals one card to every participant
//! plus a single shared "tower" card; the first participant to name the
//! symbol their card shares with the tower card wins the round.
//!
//! Grounded on `core/src/game/game.rs`'s `GameData` (round/player bookkeeping
//! behind a single owning struct) and on `services/game/store.rs`'s
//! `AtomicU32`-cursor style for the deck cursor (kept as a plain `u32` here
//! since the runtime itself is already behind the registry's per-session
//! lock, so no additional atomicity is needed).

use super::{EngineError, GameMode, PlayerScore, RoundResolution, RoundStart, ScoreSnapshot};
use crate::deck::DeckDesign;
use crate::types::{PlayerId, UtcDateTime};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;

/// The active round's dealt cards: the shared card every participant sees,
/// and each participant's own card, keyed by player.
#[derive(Debug, Clone)]
pub struct RoundState {
    pub round_number: u32,
    pub shared_card_index: u32,
    pub player_cards: HashMap<PlayerId, u32>,
    pub started_at: UtcDateTime,
    pub resolved: bool,
}

/// The `Tower` engine's full runtime. Owns a per-instance deck order
/// permutation, built once in `initialize`: `ShuffleDeck`/`RandomSeed`
/// govern how that permutation is derived, but the underlying `DeckDesign`
/// itself is never mutated — it is shared, immutable, and may back many
/// concurrent runtimes at different orders in the permutation.
pub struct Tower {
    deck: Arc<DeckDesign>,
    participants: Vec<PlayerId>,
    max_rounds: u32,
    shuffle: bool,
    seed: Option<u64>,
    deck_order: Vec<u32>,
    cursor: u32,
    round_number: u32,
    current_round: Option<RoundState>,
    wins: HashMap<PlayerId, u32>,
    game_over: bool,
}

impl Tower {
    pub fn new(
        deck: Arc<DeckDesign>,
        participants: Vec<PlayerId>,
        max_rounds: u32,
        shuffle: bool,
        seed: Option<u64>,
    ) -> Self {
        let wins = participants.iter().map(|p| (*p, 0u32)).collect();
        let deck_order: Vec<u32> = (0..deck.card_count()).collect();
        Self {
            deck,
            participants,
            max_rounds,
            shuffle,
            seed,
            deck_order,
            cursor: 0,
            round_number: 0,
            current_round: None,
            wins,
            game_over: false,
        }
    }

    /// The active round's shared card, if a round is underway. Not part of
    /// `GameMode` since it is `Tower`-specific wire state the dispatcher
    /// needs for `RoundStart` events.
    pub fn active_shared_card_index(&self) -> Option<u32> {
        self.current_round.as_ref().map(|round| round.shared_card_index)
    }

    /// Deals a contiguous, non-repeating slice of `participants + 1`
    /// physical card indices, read through the deck order permutation
    /// starting at the cursor and wrapping around the deck's card count.
    fn deal_slice(&mut self) -> Vec<u32> {
        let slots = self.participants.len() as u32 + 1;
        let card_count = self.deck_order.len() as u32;
        let slice: Vec<u32> = (0..slots)
            .map(|offset| self.deck_order[((self.cursor + offset) % card_count) as usize])
            .collect();
        self.cursor = (self.cursor + slots) % card_count;
        slice
    }
}

impl GameMode for Tower {
    fn initialize(&mut self) -> Result<(), EngineError> {
        if self.current_round.is_some() || self.round_number != 0 {
            return Err(EngineError::PreviousUnresolved);
        }
        let mut order: Vec<u32> = (0..self.deck.card_count()).collect();
        if self.shuffle {
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            order.shuffle(&mut rng);
        }
        self.deck_order = order;
        Ok(())
    }

    fn start_next_round(&mut self, now: UtcDateTime) -> Result<RoundStart, EngineError> {
        if self.game_over {
            return Err(EngineError::GameOverAlready);
        }
        if let Some(round) = &self.current_round {
            if !round.resolved {
                return Err(EngineError::PreviousUnresolved);
            }
        }

        let slice = self.deal_slice();
        let (shared_card_index, rest) = slice.split_first().expect("slice always non-empty");
        let player_cards: HashMap<PlayerId, u32> = self
            .participants
            .iter()
            .zip(rest.iter())
            .map(|(player, card)| (*player, *card))
            .collect();

        self.round_number += 1;
        self.current_round = Some(RoundState {
            round_number: self.round_number,
            shared_card_index: *shared_card_index,
            player_cards: player_cards.clone(),
            started_at: now,
            resolved: false,
        });

        Ok(RoundStart {
            round_number: self.round_number,
            shared_card_index: *shared_card_index,
            player_card_indexes: player_cards,
            started_at: now,
        })
    }

    fn register_attempt(
        &mut self,
        player: PlayerId,
        symbol_id: u32,
        now: UtcDateTime,
    ) -> Result<RoundResolution, EngineError> {
        if self.game_over {
            return Err(EngineError::NoActiveRound);
        }

        let round = self
            .current_round
            .as_mut()
            .ok_or(EngineError::NoActiveRound)?;
        if round.resolved {
            return Err(EngineError::NoActiveRound);
        }

        let player_card = *round
            .player_cards
            .get(&player)
            .ok_or(EngineError::NotParticipant(player))?;

        let card = self
            .deck
            .get_card(player_card)
            .map_err(|_| EngineError::NoActiveRound)?;
        let attempt_accepted = card.contains(&symbol_id);

        let matching_symbol = self
            .deck
            .find_common_symbol(player_card, round.shared_card_index)
            .map_err(|_| EngineError::NoActiveRound)?;

        let round_number = round.round_number;

        if !attempt_accepted || symbol_id != matching_symbol {
            return Ok(RoundResolution {
                round_number,
                attempt_accepted,
                round_resolved: false,
                resolving_player: None,
                resolving_player_card_index: None,
                matching_symbol_id: None,
                resolution_duration_ms: None,
                game_completed: false,
            });
        }

        round.resolved = true;
        let duration_ms = (now - round.started_at).num_milliseconds();
        *self.wins.entry(player).or_insert(0) += 1;

        let game_completed = round_number >= self.max_rounds;
        if game_completed {
            self.game_over = true;
        }

        Ok(RoundResolution {
            round_number,
            attempt_accepted: true,
            round_resolved: true,
            resolving_player: Some(player),
            resolving_player_card_index: Some(player_card),
            matching_symbol_id: Some(matching_symbol),
            resolution_duration_ms: Some(duration_ms),
            game_completed,
        })
    }

    fn score_snapshot(&self, now: UtcDateTime) -> ScoreSnapshot {
        let scores = self
            .participants
            .iter()
            .map(|p| PlayerScore {
                player: *p,
                wins: *self.wins.get(p).unwrap_or(&0),
            })
            .collect();
        ScoreSnapshot {
            scores,
            captured_at: now,
        }
    }

    fn is_game_over(&self) -> bool {
        self.game_over
    }
}

/// Reserved stub for a second mode variant. Not wired into the registry;
/// exists so `GameMode` is demonstrably more than a one-impl trait.
pub struct Well;

impl GameMode for Well {
    fn initialize(&mut self) -> Result<(), EngineError> {
        Err(EngineError::Unimplemented)
    }

    fn start_next_round(&mut self, _now: UtcDateTime) -> Result<RoundStart, EngineError> {
        Err(EngineError::Unimplemented)
    }

    fn register_attempt(
        &mut self,
        _player: PlayerId,
        _symbol_id: u32,
        _now: UtcDateTime,
    ) -> Result<RoundResolution, EngineError> {
        Err(EngineError::Unimplemented)
    }

    fn score_snapshot(&self, now: UtcDateTime) -> ScoreSnapshot {
        ScoreSnapshot {
            scores: Vec::new(),
            captured_at: now,
        }
    }

    fn is_game_over(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::deck::DeckDesign;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> UtcDateTime {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn players(n: usize) -> Vec<PlayerId> {
        (0..n).map(|_| PlayerId(uuid::Uuid::new_v4())).collect()
    }

    #[test]
    fn full_game_plays_to_completion() {
        let deck = Arc::new(DeckDesign::create(3).unwrap());
        let participants = players(3);
        let mut tower = Tower::new(deck.clone(), participants.clone(), 2, false, None);
        tower.initialize().unwrap();

        for expected_round in 1..=2u32 {
            let round_start = tower.start_next_round(at(expected_round as i64)).unwrap();
            assert_eq!(round_start.round_number, expected_round);
            assert_eq!(round_start.player_card_indexes.len(), 3);

            let (&winner, &card) = round_start.player_card_indexes.iter().next().unwrap();
            let symbol = deck
                .find_common_symbol(card, round_start.shared_card_index)
                .unwrap();

            let resolution = tower
                .register_attempt(winner, symbol, at(expected_round as i64 + 1))
                .unwrap();
            assert!(resolution.attempt_accepted);
            assert!(resolution.round_resolved);
            assert_eq!(resolution.resolving_player, Some(winner));
            assert_eq!(resolution.matching_symbol_id, Some(symbol));
            assert_eq!(resolution.game_completed, expected_round == 2);
        }

        assert!(tower.is_game_over());
        let snapshot = tower.score_snapshot(at(100));
        assert_eq!(snapshot.scores.len(), 3);
    }

    #[test]
    fn accepted_but_non_matching_guess_does_not_resolve_round() {
        let deck = Arc::new(DeckDesign::create(3).unwrap());
        let participants = players(2);
        let mut tower = Tower::new(deck, participants.clone(), 3, false, None);
        tower.initialize().unwrap();
        let round_start = tower.start_next_round(at(0)).unwrap();

        let (&player, &card) = round_start.player_card_indexes.iter().next().unwrap();
        let card_symbols = tower.deck.get_card(card).unwrap().to_vec();
        let matching = tower
            .deck
            .find_common_symbol(card, round_start.shared_card_index)
            .unwrap();
        let other_symbol_on_card = *card_symbols.iter().find(|&&s| s != matching).unwrap();

        let resolution = tower
            .register_attempt(player, other_symbol_on_card, at(1))
            .unwrap();
        assert!(resolution.attempt_accepted);
        assert!(!resolution.round_resolved);
        assert!(!tower.current_round.as_ref().unwrap().resolved);
    }

    #[test]
    fn symbol_not_on_own_card_is_not_accepted() {
        let deck = Arc::new(DeckDesign::create(3).unwrap());
        let participants = players(2);
        let mut tower = Tower::new(deck, participants.clone(), 3, false, None);
        tower.initialize().unwrap();
        let round_start = tower.start_next_round(at(0)).unwrap();

        let (&player, &card) = round_start.player_card_indexes.iter().next().unwrap();
        let foreign_symbol = tower.deck.card_count() * 99;
        let _ = card;

        let resolution = tower
            .register_attempt(player, foreign_symbol, at(1))
            .unwrap();
        assert!(!resolution.attempt_accepted);
        assert!(!resolution.round_resolved);
    }

    #[test]
    fn cannot_start_next_round_before_resolving_current() {
        let deck = Arc::new(DeckDesign::create(3).unwrap());
        let participants = players(2);
        let mut tower = Tower::new(deck, participants, 3, false, None);
        tower.initialize().unwrap();
        tower.start_next_round(at(0)).unwrap();

        assert_eq!(
            tower.start_next_round(at(1)),
            Err(EngineError::PreviousUnresolved)
        );
    }

    #[test]
    fn non_participant_cannot_register_attempt() {
        let deck = Arc::new(DeckDesign::create(3).unwrap());
        let participants = players(2);
        let mut tower = Tower::new(deck, participants, 3, false, None);
        tower.initialize().unwrap();
        tower.start_next_round(at(0)).unwrap();

        let stranger = PlayerId(uuid::Uuid::new_v4());
        assert_eq!(
            tower.register_attempt(stranger, 0, at(1)),
            Err(EngineError::NotParticipant(stranger))
        );
    }

    #[test]
    fn deck_cursor_wraps_around() {
        let deck = Arc::new(DeckDesign::create(2).unwrap());
        let card_count = deck.card_count();
        let participants = players(2);
        let mut tower = Tower::new(deck, participants, card_count + 5, false, None);
        tower.initialize().unwrap();

        for _ in 0..card_count + 2 {
            let slice = tower.deal_slice();
            assert_eq!(slice.len(), 3);
            assert!(slice.iter().all(|&c| c < card_count));
        }
    }

    #[test]
    fn seeded_shuffle_is_deterministic() {
        let deck = Arc::new(DeckDesign::create(5).unwrap());
        let mut a = Tower::new(deck.clone(), players(2), 3, true, Some(7));
        let mut b = Tower::new(deck, players(2), 3, true, Some(7));
        a.initialize().unwrap();
        b.initialize().unwrap();
        assert_eq!(a.deck_order, b.deck_order);
    }
}
