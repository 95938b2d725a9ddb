//! Deck Design — the finite-projective-plane construction that every
//! session's rounds are dealt from.
//!
//! Grounded on `core/src/game/manager.rs`'s `Games` registry shape for the
//! "build once, share immutably" pattern, and on the plain pairwise-check
//! style of `services/game/rules.rs`'s tests for `Validate`.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while building or querying a [`DeckDesign`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeckError {
    #[error("order must be a prime >= 2, got {0}")]
    InvalidOrder(u32),
    #[error("card index {index} out of range [0, {card_count})")]
    OutOfRange { index: u32, card_count: u32 },
    #[error("cannot find a common symbol of a card with itself")]
    SameCard,
    #[error("cards {0} and {1} do not share exactly one symbol")]
    IntegrityViolation(u32, u32),
}

/// Immutable incidence structure: `card_count` cards, each a sorted set of
/// `symbols_per_card` distinct symbol ids, such that any two cards share
/// exactly one symbol (invariant P1) and every symbol appears on exactly
/// `order + 1` cards (invariant P2).
#[derive(Debug)]
pub struct DeckDesign {
    order: u32,
    symbols_per_card: u32,
    cards: Vec<Vec<u32>>,
}

/// Summary statistics for a [`DeckDesign`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeckStats {
    pub order: u32,
    pub card_count: u32,
    pub symbol_count: u32,
    pub symbols_per_card: u32,
}

impl DeckDesign {
    /// Builds a new deck design over `GF(order)`. Fails if `order` is not a
    /// prime `>= 2`.
    pub fn create(order: u32) -> Result<Self, DeckError> {
        if order < 2 || !is_prime(order) {
            return Err(DeckError::InvalidOrder(order));
        }

        let n = order;
        let affine_point = |x: u32, y: u32| x * n + y;
        let slope_at_infinity = |m: u32| n * n + m;
        let vertical_at_infinity = n * n + n;

        let mut cards: Vec<Vec<u32>> = Vec::with_capacity((n * n + n + 1) as usize);

        // n^2 affine lines: for each slope m and intercept b.
        for m in 0..n {
            for b in 0..n {
                let mut card: Vec<u32> = (0..n)
                    .map(|x| affine_point(x, (m * x + b) % n))
                    .collect();
                card.push(slope_at_infinity(m));
                card.sort_unstable();
                cards.push(card);
            }
        }

        // n vertical lines: for each x = a.
        for a in 0..n {
            let mut card: Vec<u32> = (0..n).map(|y| affine_point(a, y)).collect();
            card.push(vertical_at_infinity);
            card.sort_unstable();
            cards.push(card);
        }

        // The single line at infinity.
        let mut infinity_card: Vec<u32> = (0..n).map(slope_at_infinity).collect();
        infinity_card.push(vertical_at_infinity);
        infinity_card.sort_unstable();
        cards.push(infinity_card);

        Ok(Self {
            order: n,
            symbols_per_card: n + 1,
            cards,
        })
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn card_count(&self) -> u32 {
        self.cards.len() as u32
    }

    pub fn symbol_count(&self) -> u32 {
        self.card_count()
    }

    pub fn symbols_per_card(&self) -> u32 {
        self.symbols_per_card
    }

    /// Looks up a card by index.
    pub fn get_card(&self, index: u32) -> Result<&[u32], DeckError> {
        self.cards
            .get(index as usize)
            .map(|card| card.as_slice())
            .ok_or(DeckError::OutOfRange {
                index,
                card_count: self.card_count(),
            })
    }

    /// Finds the unique symbol shared by two distinct cards.
    pub fn find_common_symbol(&self, i: u32, j: u32) -> Result<u32, DeckError> {
        if i == j {
            return Err(DeckError::SameCard);
        }
        let card_i = self.get_card(i)?;
        let card_j = self.get_card(j)?;

        let mut common = card_i.iter().filter(|s| card_j.contains(s));
        let first = common.next().ok_or(DeckError::IntegrityViolation(i, j))?;
        if common.next().is_some() {
            return Err(DeckError::IntegrityViolation(i, j));
        }
        Ok(*first)
    }

    /// Verifies invariant P1 (every pair of cards shares exactly one symbol)
    /// by brute-force pairwise intersection.
    pub fn validate(&self) -> (bool, String) {
        let count = self.card_count();
        for i in 0..count {
            for j in (i + 1)..count {
                match self.find_common_symbol(i, j) {
                    Ok(_) => {}
                    Err(err) => return (false, format!("cards {i} and {j}: {err}")),
                }
            }
        }
        (true, "ok".to_string())
    }

    pub fn stats(&self) -> DeckStats {
        DeckStats {
            order: self.order,
            card_count: self.card_count(),
            symbol_count: self.symbol_count(),
            symbols_per_card: self.symbols_per_card,
        }
    }
}

/// Trial division is sufficient for the practical orders this system uses.
fn is_prime(n: u32) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}
