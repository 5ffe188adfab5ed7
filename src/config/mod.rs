//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// How accuracy values are handed out before the first round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyMode {
    /// Everyone spins independently for a random entry of the shared pool
    Roulette,
    /// Turn-based pick of unclaimed pool entries, in join order
    Draft,
}

impl FromStr for AccuracyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "roulette" => Ok(Self::Roulette),
            "draft" => Ok(Self::Draft),
            _ => Err(ConfigError::Invalid("ACCURACY_MODE")),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// External room identifier reported to matchmaking
    pub room_id: String,
    /// Matchmaking callback URL for phase reports (disabled when unset)
    pub matchmaking_callback_url: Option<String>,

    /// Rounds per match
    pub max_rounds: u32,
    /// Accuracy assignment variant
    pub accuracy_mode: AccuracyMode,
    /// Seconds between betting deductions during a round
    pub bet_interval_secs: u64,
    /// Read admin commands from stdin
    pub admin_console: bool,
    /// Fixed RNG seed (random when unset)
    pub game_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Container runtimes hand out PORT; fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            room_id: env::var("ROOM_ID").unwrap_or_else(|_| "local".to_string()),
            matchmaking_callback_url: env::var("MATCHMAKING_CALLBACK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),

            max_rounds: parse_or("MAX_ROUNDS", 5)?,
            accuracy_mode: match env::var("ACCURACY_MODE") {
                Ok(value) => value.parse()?,
                Err(_) => AccuracyMode::Draft,
            },
            bet_interval_secs: parse_or("BET_INTERVAL_SECS", 5)?,
            admin_console: parse_or("ADMIN_CONSOLE", true)?,
            game_seed: match env::var("GAME_SEED") {
                Ok(value) => Some(value.parse().map_err(|_| ConfigError::Invalid("GAME_SEED"))?),
                Err(_) => None,
            },
        })
    }

    /// Game tuning derived from this configuration
    pub fn rules(&self) -> GameRules {
        GameRules {
            max_rounds: self.max_rounds.max(1),
            accuracy_mode: self.accuracy_mode,
            ..GameRules::default()
        }
    }

    pub fn bet_interval(&self) -> Duration {
        Duration::from_secs(self.bet_interval_secs.max(1))
    }
}

/// Match tuning handed to the session
#[derive(Clone, Debug)]
pub struct GameRules {
    pub max_rounds: u32,
    pub accuracy_mode: AccuracyMode,
    pub max_participants: usize,
    pub starting_balance: u64,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            accuracy_mode: AccuracyMode::Draft,
            max_participants: 8,
            starting_balance: 200,
        }
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_mode_parses_case_insensitively() {
        assert_eq!("Roulette".parse::<AccuracyMode>().unwrap(), AccuracyMode::Roulette);
        assert_eq!(" draft ".parse::<AccuracyMode>().unwrap(), AccuracyMode::Draft);
        assert!("lottery".parse::<AccuracyMode>().is_err());
    }

    #[test]
    fn rules_never_allow_zero_rounds() {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".into(),
            room_id: "r".into(),
            matchmaking_callback_url: None,
            max_rounds: 0,
            accuracy_mode: AccuracyMode::Roulette,
            bet_interval_secs: 0,
            admin_console: false,
            game_seed: None,
        };
        let rules = config.rules();
        assert_eq!(rules.max_rounds, 1);
        assert_eq!(rules.accuracy_mode, AccuracyMode::Roulette);
        assert_eq!(config.bet_interval(), Duration::from_secs(1));
    }
}
