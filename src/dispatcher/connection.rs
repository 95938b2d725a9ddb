//! Real-time Dispatcher — WebSocket connection admission, message-size
//! enforcement, method routing, and group broadcast.
//!
//! Grounded on `other_examples`' `Spyabo-Zobbo/backend/src/main.rs`
//! websocket handler: split the socket into a sink/stream pair, forward an
//! `mpsc` channel to the sink from its own task, and read inbound frames on
//! the main task. Group membership is grounded on `core/src/game/game.rs`'s
//! `write_all`/`notify_all` broadcast helpers, generalized from a `Vec` of
//! session handles to a `tokio::sync::broadcast` channel per session since
//! dispatcher connections, unlike that teacher's TCP sessions, are
//! JSON/WebSocket and short-lived per browser tab.

use super::error::ProtocolError;
use super::messages::{ClientMessage, ScoreSnapshotWire, ServerMessage};
use crate::registry::{GameEvent, Registry};
use crate::types::{PlayerId, SessionId};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Bundles everything a connection needs: the orchestrator, the inbound
/// message size cap, and the group broadcast registry for fanning out
/// round events.
pub struct AppState {
    pub registry: Arc<Registry>,
    pub max_inbound_message_bytes: usize,
    groups: RwLock<HashMap<SessionId, broadcast::Sender<GameEvent>>>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>, max_inbound_message_bytes: usize) -> Self {
        Self {
            registry,
            max_inbound_message_bytes,
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the broadcast sender for a session's group, creating one on
    /// first use. Every connection in the group gets its own `Receiver`.
    fn group(&self, session_id: SessionId) -> broadcast::Sender<GameEvent> {
        if let Some(tx) = self.groups.read().get(&session_id) {
            return tx.clone();
        }
        let mut groups = self.groups.write();
        groups
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    /// Broadcasts every materialized event to its session's group, in the
    /// order the registry produced them, after the session lock has
    /// already been released. Each subscriber renders its own wire message
    /// from the event, so a `RoundStart` only ever discloses the
    /// recipient's own dealt card.
    fn broadcast_events(&self, events: Vec<GameEvent>) {
        for event in events {
            let session_id = session_id_of(&event);
            // No receivers yet (e.g. a solo test harness) is not an error.
            let _ = self.group(session_id).send(event);
        }
    }
}

fn session_id_of(event: &GameEvent) -> SessionId {
    match event {
        GameEvent::RoundStart { session_id, .. } => *session_id,
        GameEvent::RoundResult { session_id, .. } => *session_id,
        GameEvent::GameOver { session_id, .. } => *session_id,
    }
}

/// Renders a [`GameEvent`] into the wire message a specific connection
/// should see. `RoundStart` is the only variant that differs per
/// recipient — everything else is broadcast verbatim.
fn to_server_message(event: &GameEvent, recipient: PlayerId) -> ServerMessage {
    match event {
        GameEvent::RoundStart {
            session_id,
            round_number,
            shared_card_index,
            player_card_indexes,
            started_at,
        } => ServerMessage::RoundStart {
            session_id: *session_id,
            round_number: *round_number,
            shared_card_index: *shared_card_index,
            your_card_index: player_card_indexes
                .get(&recipient)
                .copied()
                .unwrap_or_default(),
            started_at: *started_at,
        },
        GameEvent::RoundResult {
            session_id,
            round_number,
            attempt_accepted,
            round_resolved,
            resolving_player,
            resolving_player_card_index,
            matching_symbol_id,
            processed_at,
            resolution_duration_ms,
            scores,
            game_completed,
        } => ServerMessage::RoundResult {
            session_id: *session_id,
            round_number: *round_number,
            attempt_accepted: *attempt_accepted,
            round_resolved: *round_resolved,
            resolving_player: *resolving_player,
            resolving_player_card_index: *resolving_player_card_index,
            matching_symbol_id: *matching_symbol_id,
            processed_at: *processed_at,
            resolution_duration_ms: *resolution_duration_ms,
            scores: scores.as_ref().map(ScoreSnapshotWire::from),
            game_completed: *game_completed,
        },
        GameEvent::GameOver {
            session_id,
            final_scores,
            completed_at,
        } => ServerMessage::GameOver {
            session_id: *session_id,
            final_scores: ScoreSnapshotWire::from(final_scores),
            completed_at: *completed_at,
        },
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    token: String,
}

/// Admission handler: validates the bearer token before upgrading.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    match state.registry.auth().validate(&query.token).await {
        Ok(player) => {
            info!("connection admitted for player {player}");
            ws.on_upgrade(move |socket| handle_socket(socket, state, player))
        }
        Err(err) => {
            warn!("connection rejected: {err}");
            ws.on_upgrade(reject_socket)
        }
    }
}

async fn reject_socket(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Text(
            serde_json::to_string(&ServerMessage::Error {
                reason: "unauthorized".to_string(),
            })
            .expect("ServerMessage always serializes"),
        ))
        .await;
    let _ = socket.close().await;
}

/// Connection-local state: which session groups this connection's
/// forwarding task has already subscribed to, so a later `ClickSymbol` on
/// an already-joined session does not spawn a duplicate relay.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, player: PlayerId) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let forward_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(err) => {
                    warn!("failed to encode outbound message: {err}");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut joined_groups: HashSet<SessionId> = HashSet::new();

    while let Some(frame) = ws_rx.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!("websocket error for player {player}: {err}");
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                if text.len() > state.max_inbound_message_bytes {
                    let _ = out_tx.send(ServerMessage::Error {
                        reason: ProtocolError::PayloadTooLarge.to_string(),
                    });
                    break;
                }
                let reply = dispatch(&state, player, &text, &mut joined_groups, &out_tx).await;
                if let Some(reply) = reply {
                    let _ = out_tx.send(reply);
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }

    forward_task.abort();
    info!("connection closed for player {player}");
}

/// Parses one inbound frame and routes it to the orchestrator, joining the
/// connection to its session's broadcast group on the first reference to
/// that session so later round events reach it. `ClickSymbol` always
/// produces a direct reply in addition to whatever it broadcasts, even
/// when the attempt does not resolve the round.
async fn dispatch(
    state: &Arc<AppState>,
    player: PlayerId,
    text: &str,
    joined_groups: &mut HashSet<SessionId>,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
) -> Option<ServerMessage> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            return Some(ServerMessage::Error {
                reason: format!("invalid message: {err}"),
            })
        }
    };

    let now = chrono::Utc::now();
    let result: Result<Option<ServerMessage>, ProtocolError> = async {
        match message {
            ClientMessage::CreateGame {
                mode,
                max_players,
                max_rounds,
            } => {
                let cancel = state.registry.cancellation();
                let session_id = state
                    .registry
                    .create_game(mode, max_players, max_rounds, now, &cancel)
                    .await?;
                join_group(state, joined_groups, session_id, player, out_tx);
                Ok(Some(ServerMessage::GameCreated {
                    session_id,
                    mode,
                    max_players,
                    max_rounds,
                }))
            }
            ClientMessage::JoinGame { session_id } => {
                let cancel = state.registry.cancellation();
                let profile = state
                    .registry
                    .join_game(session_id, player, now, &cancel)
                    .await?;
                join_group(state, joined_groups, session_id, player, out_tx);
                Ok(Some(ServerMessage::Joined {
                    session_id,
                    display_name: profile.display_name,
                }))
            }
            ClientMessage::StartGame { session_id } => {
                let cancel = state.registry.cancellation();
                let event = state.registry.start_game(session_id, now, &cancel).await?;
                join_group(state, joined_groups, session_id, player, out_tx);
                state.broadcast_events(vec![event]);
                Ok(None)
            }
            ClientMessage::ClickSymbol { session_id, symbol_id } => {
                let cancel = state.registry.cancellation();
                let outcome = state
                    .registry
                    .click_symbol(session_id, player, symbol_id, now, &cancel)
                    .await?;
                let reply = to_server_message(&outcome.reply, player);
                state.broadcast_events(outcome.broadcast);
                Ok(Some(reply))
            }
        }
    }
    .await;

    match result {
        Ok(reply) => reply,
        Err(err) => Some(ServerMessage::Error {
            reason: err.to_string(),
        }),
    }
}

/// Spawns a relay task from the session's broadcast group to this
/// connection's outbound channel, once per session per connection.
/// Rendering happens in the relay task, not at broadcast time, so each
/// connection sees its own card index in a `RoundStart`.
fn join_group(
    state: &Arc<AppState>,
    joined_groups: &mut HashSet<SessionId>,
    session_id: SessionId,
    player: PlayerId,
    out_tx: &mpsc::UnboundedSender<ServerMessage>,
) {
    if !joined_groups.insert(session_id) {
        return;
    }
    let mut rx = state.group(session_id).subscribe();
    let out_tx = out_tx.clone();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if out_tx.send(to_server_message(&event, player)).is_err() {
                break;
            }
        }
    });
}
