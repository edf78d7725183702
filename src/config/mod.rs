//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Game listener binding address (line protocol over TCP)
    pub server_addr: SocketAddr,
    /// Status endpoint binding address
    pub http_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Maximum simultaneous connections
    pub max_players: usize,
    /// Seed for the match RNG, random when unset
    pub match_seed: Option<u64>,
    /// Phase and scheduled task durations
    pub timings: MatchTimings,
}

/// Durations that drive the match state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchTimings {
    /// HIDING length, also the seeker freeze
    pub hide_duration: Duration,
    /// Period of the automatic disguise rotation and the manual change gate
    pub disguise_interval: Duration,
    /// PLAYING length before hiders win on time
    pub round_time_limit: Duration,
    /// Period of the remaining-seconds broadcast
    pub countdown_tick: Duration,
    /// ENDED length before the reset to WAITING
    pub end_cooldown: Duration,
    /// Delay between theme consensus and the match start
    pub preroll_delay: Duration,
}

impl Default for MatchTimings {
    fn default() -> Self {
        Self {
            hide_duration: Duration::from_millis(20_000),
            disguise_interval: Duration::from_millis(10_000),
            round_time_limit: Duration::from_millis(60_000),
            countdown_tick: Duration::from_millis(1_000),
            end_cooldown: Duration::from_millis(5_000),
            preroll_delay: Duration::from_millis(5_000),
        }
    }
}

impl MatchTimings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            hide_duration: millis_or("HIDE_TIME_MS", defaults.hide_duration)?,
            disguise_interval: millis_or("DISGUISE_INTERVAL_MS", defaults.disguise_interval)?,
            round_time_limit: millis_or("ROUND_TIME_LIMIT_MS", defaults.round_time_limit)?,
            countdown_tick: millis_or("COUNTDOWN_TICK_MS", defaults.countdown_tick)?,
            end_cooldown: millis_or("END_COOLDOWN_MS", defaults.end_cooldown)?,
            preroll_delay: millis_or("PREROLL_MS", defaults.preroll_delay)?,
        })
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:12345".to_string());
        let http_addr = env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let max_players = parse_or("MAX_PLAYERS", 10usize)?;
        if max_players == 0 {
            return Err(ConfigError::Invalid("MAX_PLAYERS"));
        }

        let match_seed = match env::var("MATCH_SEED") {
            Ok(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("MATCH_SEED"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("SERVER_ADDR"))?,
            http_addr: http_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("HTTP_ADDR"))?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            max_players,
            match_seed,
            timings: MatchTimings::from_env()?,
        })
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn millis_or(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let ms = parse_or(name, default.as_millis() as u64)?;
    if ms == 0 {
        return Err(ConfigError::Invalid(name));
    }
    Ok(Duration::from_millis(ms))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid address format in {0}")]
    InvalidAddress(&'static str),
}
