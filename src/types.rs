//! Shared identifier and timestamp aliases used across every module.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque 128-bit session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic group address for the real-time dispatcher.
    pub fn group_name(&self) -> String {
        format!("game:{}", self.0.as_simple())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Opaque player identifier, issued by the external `PlayerStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// UTC timestamp used for every lifecycle field in the data model.
pub type UtcDateTime = chrono::DateTime<chrono::Utc>;

/// The two game mode variants. Only `Tower` runs; `Well` is a reserved
/// stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Tower,
    Well,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Tower => f.write_str("tower"),
            Mode::Well => f.write_str("well"),
        }
    }
}
