//! `ProtocolError` — the outward-facing error shape every domain error is
//! translated into before it reaches a client. Storage causes are logged,
//! never serialized.

use crate::collab::CollabError;
use crate::deck::DeckError;
use crate::engine::EngineError;
use crate::registry::OrchestratorError;
use crate::session::SessionError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{0}")]
    Input(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    DomainState(String),
    #[error("not found")]
    NotFound,
    #[error("internal storage error")]
    Store,
    #[error("payload too large")]
    PayloadTooLarge,
}

impl From<OrchestratorError> for ProtocolError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::SessionNotFound(_) => ProtocolError::NotFound,
            err @ OrchestratorError::NotActive(_) => ProtocolError::DomainState(err.to_string()),
            OrchestratorError::Session(e) => ProtocolError::DomainState(e.to_string()),
            OrchestratorError::Engine(e) => ProtocolError::DomainState(e.to_string()),
            OrchestratorError::Collab(e) => {
                log::error!("collaborator error: {e}");
                match e {
                    CollabError::InvalidToken => ProtocolError::Unauthorized,
                    CollabError::PlayerNotFound(_) | CollabError::SessionNotFound(_) => {
                        ProtocolError::NotFound
                    }
                    CollabError::Backend(_) => ProtocolError::Store,
                }
            }
            OrchestratorError::UnsupportedMode(mode) => {
                ProtocolError::Input(format!("unsupported game mode: {mode}"))
            }
            err @ OrchestratorError::RosterSizeOutOfBounds { .. } => {
                ProtocolError::Input(err.to_string())
            }
            err @ OrchestratorError::RoundCountOutOfBounds { .. } => {
                ProtocolError::Input(err.to_string())
            }
        }
    }
}

impl From<DeckError> for ProtocolError {
    fn from(err: DeckError) -> Self {
        ProtocolError::Input(err.to_string())
    }
}

impl From<SessionError> for ProtocolError {
    fn from(err: SessionError) -> Self {
        ProtocolError::DomainState(err.to_string())
    }
}

impl From<EngineError> for ProtocolError {
    fn from(err: EngineError) -> Self {
        ProtocolError::DomainState(err.to_string())
    }
}
