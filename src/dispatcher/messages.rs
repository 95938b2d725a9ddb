//! Wire payloads for the real-time dispatcher. Every inbound frame is one
//! JSON object tagged by `"type"`; every outbound frame mirrors it on the
//! way out.

use crate::engine::ScoreSnapshot;
use crate::types::{Mode, PlayerId, SessionId, UtcDateTime};
use serde::{Deserialize, Serialize};

/// Inbound invocations a connected client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateGame {
        mode: Mode,
        max_players: u32,
        max_rounds: u32,
    },
    JoinGame {
        session_id: SessionId,
    },
    StartGame {
        session_id: SessionId,
    },
    ClickSymbol {
        session_id: SessionId,
        symbol_id: u32,
    },
}

/// A single participant's score in wire form.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerScoreWire {
    pub player: PlayerId,
    pub wins: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreSnapshotWire {
    pub scores: Vec<PlayerScoreWire>,
    pub captured_at: UtcDateTime,
}

impl From<&ScoreSnapshot> for ScoreSnapshotWire {
    fn from(snapshot: &ScoreSnapshot) -> Self {
        Self {
            scores: snapshot
                .scores
                .iter()
                .map(|s| PlayerScoreWire {
                    player: s.player,
                    wins: s.wins,
                })
                .collect(),
            captured_at: snapshot.captured_at,
        }
    }
}

/// Outbound events and replies. `RoundStart` is built once per recipient —
/// `your_card_index` is filled in from the sender's own entry in the
/// engine's `player_card_indexes` map so a client only ever learns its own
/// dealt card, never another participant's.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    GameCreated {
        session_id: SessionId,
        mode: Mode,
        max_players: u32,
        max_rounds: u32,
    },
    Joined {
        session_id: SessionId,
        display_name: String,
    },
    RoundStart {
        session_id: SessionId,
        round_number: u32,
        shared_card_index: u32,
        your_card_index: u32,
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
        scores: Option<ScoreSnapshotWire>,
        game_completed: bool,
    },
    GameOver {
        session_id: SessionId,
        final_scores: ScoreSnapshotWire,
        completed_at: UtcDateTime,
    },
    Error {
        reason: String,
    },
}
