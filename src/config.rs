//! Configuration: env var -> file -> default, mirroring the teacher's
//! `load_config` exactly, just renamed and re-fielded for this crate's
//! settings.

use log::LevelFilter;
use serde::Deserialize;
use std::{env, fs::read_to_string, path::Path};
use thiserror::Error;

/// The crate version extracted from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable key to load the config from.
const CONFIG_ENV_KEY: &str = "SPOTIT_CONFIG_JSON";

/// Loads configuration from `SPOTIT_CONFIG_JSON`, then `config.json`, then
/// falls back to [`Config::default`]. Parse failures are logged, never a
/// hard error at this stage.
pub fn load_config() -> Config {
    if let Ok(env) = env::var(CONFIG_ENV_KEY) {
        return match serde_json::from_str(&env) {
            Ok(value) => value,
            Err(err) => {
                eprintln!("failed to parse {CONFIG_ENV_KEY} (using defaults): {err:?}");
                Config::default()
            }
        };
    }

    let file = Path::new("config.json");
    if !file.exists() {
        return Config::default();
    }

    let data = match read_to_string(file) {
        Ok(value) => value,
        Err(err) => {
            eprintln!("failed to read config.json (using defaults): {err:?}");
            return Config::default();
        }
    };

    match serde_json::from_str(&data) {
        Ok(value) => value,
        Err(err) => {
            eprintln!("failed to parse config.json (using defaults): {err:?}");
            Config::default()
        }
    }
}

/// Startup-time configuration validation failures — an invalid value
/// means the process fails to start rather than misbehaving at runtime.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("design_order must be a prime >= 2, got {0}")]
    InvalidDesignOrder(u32),
    #[error("default_max_players must be >= 2, got {0}")]
    InvalidDefaultMaxPlayers(u32),
    #[error("default_max_rounds must be >= 1, got {0}")]
    InvalidDefaultMaxRounds(u32),
    #[error("min_players ({min}) must be <= max_players ({max})")]
    MinExceedsMaxPlayers { min: u32, max: u32 },
    #[error("min_rounds ({min}) must be <= max_rounds ({max})")]
    MinExceedsMaxRounds { min: u32, max: u32 },
    #[error("default_max_rounds ({default}) must fall within [min_rounds, max_rounds] = [{min}, {max}]")]
    DefaultMaxRoundsOutOfBounds { default: u32, min: u32, max: u32 },
    #[error("max_inbound_message_bytes must be > 0")]
    InvalidMaxInboundMessageBytes,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Order of the finite projective plane the deck is built from.
    pub design_order: u32,
    /// Default roster cap for newly created sessions.
    pub default_max_players: u32,
    /// Default round cap for newly created sessions.
    pub default_max_rounds: u32,
    /// Smallest roster size the registry will accept for `CreateGame`.
    pub min_players: u32,
    /// Largest roster size the registry will accept for `CreateGame`.
    pub max_players: u32,
    /// Smallest round count the registry will accept for `CreateGame`.
    pub min_rounds: u32,
    /// Largest round count the registry will accept for `CreateGame`.
    pub max_rounds: u32,
    /// Whether each session's deck order is shuffled before use. Must be
    /// seeded deterministically via `random_seed` when reproducibility
    /// (e.g. tests) matters.
    pub shuffle_deck: bool,
    /// Seed for `shuffle_deck`, when enabled. `None` falls back to
    /// entropy-seeded randomness.
    pub random_seed: Option<u64>,
    /// Largest inbound WebSocket text frame the dispatcher accepts, in
    /// bytes.
    pub max_inbound_message_bytes: usize,
    pub host: String,
    pub port: u16,
    pub logging: LoggingConfig,
}

impl Config {
    /// Rejects configuration values that would leave the server unable to
    /// run correctly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.design_order < 2 || !is_probably_prime(self.design_order) {
            return Err(ConfigError::InvalidDesignOrder(self.design_order));
        }
        if self.default_max_players < 2 {
            return Err(ConfigError::InvalidDefaultMaxPlayers(
                self.default_max_players,
            ));
        }
        if self.default_max_rounds < 1 {
            return Err(ConfigError::InvalidDefaultMaxRounds(
                self.default_max_rounds,
            ));
        }
        if self.min_players > self.max_players {
            return Err(ConfigError::MinExceedsMaxPlayers {
                min: self.min_players,
                max: self.max_players,
            });
        }
        if self.min_rounds > self.max_rounds {
            return Err(ConfigError::MinExceedsMaxRounds {
                min: self.min_rounds,
                max: self.max_rounds,
            });
        }
        if self.default_max_rounds < self.min_rounds || self.default_max_rounds > self.max_rounds {
            return Err(ConfigError::DefaultMaxRoundsOutOfBounds {
                default: self.default_max_rounds,
                min: self.min_rounds,
                max: self.max_rounds,
            });
        }
        if self.max_inbound_message_bytes == 0 {
            return Err(ConfigError::InvalidMaxInboundMessageBytes);
        }
        Ok(())
    }
}

fn is_probably_prime(n: u32) -> bool {
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

impl Default for Config {
    fn default() -> Self {
        Self {
            design_order: 7,
            default_max_players: 4,
            default_max_rounds: 10,
            min_players: 2,
            max_players: 8,
            min_rounds: 1,
            max_rounds: 30,
            shuffle_deck: true,
            random_seed: None,
            max_inbound_message_bytes: 32 * 1024,
            host: "0.0.0.0".to_string(),
            port: 8080,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LevelFilter,
    pub dir: String,
    pub compression: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            dir: "log".to_string(),
            compression: false,
        }
    }
}
