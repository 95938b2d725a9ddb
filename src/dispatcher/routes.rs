//! The two side-effect-free HTTP routes the binary needs to be a runnable
//! server at all. Grounded on the teacher's thin-handler shape in
//! `core/src/game/manager.rs`'s snapshot helpers (`create_snapshot`) wired
//! to an axum handler.

use super::connection::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct DesignStatsResponse {
    pub order: u32,
    pub card_count: u32,
    pub symbol_count: u32,
    pub symbols_per_card: u32,
    pub active_sessions: usize,
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn design_stats(State(state): State<Arc<AppState>>) -> Json<DesignStatsResponse> {
    let stats = state.registry.deck_stats();
    Json(DesignStatsResponse {
        order: stats.order,
        card_count: stats.card_count,
        symbol_count: stats.symbol_count,
        symbols_per_card: stats.symbols_per_card,
        active_sessions: state.registry.active_session_count(),
    })
}
