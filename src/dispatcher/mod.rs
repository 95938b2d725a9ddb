//! Real-time Dispatcher — the WebSocket transport layer and its minimal
//! HTTP scaffolding.

pub mod connection;
pub mod error;
pub mod messages;
pub mod routes;

pub use connection::AppState;
