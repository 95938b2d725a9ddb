#![warn(unused_crate_dependencies)]

use axum::routing::get;
use axum::Router;
use collab::memory::{
    InMemoryAuthTokenValidator, InMemoryLeaderboardStore, InMemoryPlayerStore,
    InMemoryRoundLogStore, InMemorySessionStore,
};
use config::{load_config, VERSION};
use deck::DeckDesign;
use dispatcher::connection::{ws_handler, AppState};
use dispatcher::routes::{design_stats, health};
use log::{error, info};
use registry::{Collaborators, Registry, RegistryLimits};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};

mod collab;
mod config;
mod deck;
mod dispatcher;
mod engine;
mod logging;
mod registry;
mod session;
mod types;

#[tokio::main]
async fn main() {
    let config = load_config();
    logging::setup(&config.logging);
    log_panics::init();

    if let Err(err) = config.validate() {
        error!("invalid configuration: {err}");
        return;
    }

    let deck = match DeckDesign::create(config.design_order) {
        Ok(deck) => deck,
        Err(err) => {
            error!("failed to build deck design: {err}");
            return;
        }
    };
    let deck = Arc::new(deck);
    let (valid, message) = deck.validate();
    if !valid {
        error!("deck design failed self-validation: {message}");
        return;
    }

    let collaborators = Collaborators {
        players: Arc::new(InMemoryPlayerStore::new()),
        sessions: Arc::new(InMemorySessionStore::new()),
        round_logs: Arc::new(InMemoryRoundLogStore::new()),
        leaderboard: Arc::new(InMemoryLeaderboardStore::new()),
        auth: Arc::new(InMemoryAuthTokenValidator::new()),
    };

    let registry = Arc::new(Registry::new(
        deck,
        collaborators,
        RegistryLimits {
            min_players: config.min_players,
            max_players: config.max_players,
            min_rounds: config.min_rounds,
            max_rounds: config.max_rounds,
            shuffle_deck: config.shuffle_deck,
            random_seed: config.random_seed,
        },
    ));
    let state = Arc::new(AppState::new(
        registry.clone(),
        config.max_inbound_message_bytes,
    ));

    let router = Router::new()
        .route("/health", get(health))
        .route("/api/design/stats", get(design_stats))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!("invalid host/port configuration: {err}");
            return;
        }
    };

    info!("starting spotit-relay v{VERSION} on {addr}");

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            return;
        }
    };

    if let Err(err) = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = signal::ctrl_c().await;
            info!("shutdown signal received, finalizing active sessions");
            registry.finalize_all_active_sessions(chrono::Utc::now()).await;
        })
        .await
    {
        error!("error within HTTP server: {err}");
    }
}
