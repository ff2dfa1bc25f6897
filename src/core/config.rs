//! Network configuration.
//!
//! Embedders configure the protocol once at startup with a
//! [`NetworkConfig`], either through the builder methods or from JSON.
//! Missing JSON fields fall back to defaults.
//!
//! ```
//! use card_sync::core::NetworkConfig;
//!
//! let config = NetworkConfig::from_json_str(r#"{ "max_players": 4 }"#).unwrap();
//! assert_eq!(config.max_players, 4);
//! assert_eq!(config.min_players_to_start, 2);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::room::TIMEOUT_FLOOR_SECS;

/// Errors from loading or validating a [`NetworkConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JSON document could not be parsed.
    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the protocol cannot run with.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Default room options applied by the host when a room is opened.
///
/// The random seed is not configurable here: every room draws its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomDefaults {
    /// Shuffle decks before the initial draw.
    pub shuffle: bool,
    /// Seconds each player has to replace the initial hand.
    pub init_replace_timeout: u32,
    /// Seconds per turn.
    pub turn_timeout: u32,
}

impl Default for RoomDefaults {
    fn default() -> Self {
        Self {
            shuffle: true,
            init_replace_timeout: 15,
            turn_timeout: 60,
        }
    }
}

/// Protocol configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Port rooms are discovered on.
    pub discovery_port: u16,

    /// Period of discovery broadcasts, in milliseconds.
    pub discovery_interval_ms: u64,

    /// Period of refresh requests for already discovered rooms.
    pub refresh_interval_ms: u64,

    /// How long a join may stay unanswered before it fails.
    pub join_timeout_ms: u64,

    /// Seats per room. Joins beyond this are rejected.
    pub max_players: usize,

    /// Players required before the host may start.
    pub min_players_to_start: usize,

    /// Out-of-order witness frames buffered before the stream is
    /// considered desynchronized.
    pub reorder_window: usize,

    /// Whether the host applies option-change requests sent by guests.
    pub accept_guest_option_requests: bool,

    /// Options for newly opened rooms.
    pub room_defaults: RoomDefaults,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: 32810,
            discovery_interval_ms: 1000,
            refresh_interval_ms: 1000,
            join_timeout_ms: 5000,
            max_players: 8,
            min_players_to_start: 2,
            reorder_window: 256,
            accept_guest_option_requests: false,
            room_defaults: RoomDefaults::default(),
        }
    }
}

impl NetworkConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the discovery port.
    #[must_use]
    pub fn with_discovery_port(mut self, port: u16) -> Self {
        self.discovery_port = port;
        self
    }

    /// Set the discovery period.
    #[must_use]
    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the refresh period.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the join timeout.
    #[must_use]
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the seat limit.
    #[must_use]
    pub fn with_max_players(mut self, max: usize) -> Self {
        self.max_players = max;
        self
    }

    /// Set the witness reorder window.
    #[must_use]
    pub fn with_reorder_window(mut self, window: usize) -> Self {
        self.reorder_window = window;
        self
    }

    /// Let the host apply option requests from guests.
    #[must_use]
    pub fn accepting_guest_option_requests(mut self) -> Self {
        self.accept_guest_option_requests = true;
        self
    }

    /// Set the default room options.
    #[must_use]
    pub fn with_room_defaults(mut self, defaults: RoomDefaults) -> Self {
        self.room_defaults = defaults;
        self
    }

    /// Discovery period as a `Duration`.
    #[must_use]
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    /// Refresh period as a `Duration`.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Join timeout as a `Duration`.
    #[must_use]
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };

        if self.discovery_interval_ms == 0 {
            return Err(invalid("discovery_interval_ms", "must be positive"));
        }
        if self.refresh_interval_ms == 0 {
            return Err(invalid("refresh_interval_ms", "must be positive"));
        }
        if self.join_timeout_ms == 0 {
            return Err(invalid("join_timeout_ms", "must be positive"));
        }
        if self.min_players_to_start < 2 {
            return Err(invalid("min_players_to_start", "a game needs at least 2 players"));
        }
        if self.max_players < self.min_players_to_start {
            return Err(invalid("max_players", "must be at least min_players_to_start"));
        }
        if self.reorder_window == 0 {
            return Err(invalid("reorder_window", "must be positive"));
        }
        if self.room_defaults.init_replace_timeout <= TIMEOUT_FLOOR_SECS {
            return Err(invalid("room_defaults.init_replace_timeout", "at or below the timeout floor"));
        }
        if self.room_defaults.turn_timeout <= TIMEOUT_FLOOR_SECS {
            return Err(invalid("room_defaults.turn_timeout", "at or below the timeout floor"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NetworkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.discovery_interval(), Duration::from_secs(1));
        assert!(!config.accept_guest_option_requests);
    }

    #[test]
    fn test_builder() {
        let config = NetworkConfig::new()
            .with_discovery_port(4000)
            .with_refresh_interval(Duration::from_millis(250))
            .with_max_players(3)
            .accepting_guest_option_requests();

        assert_eq!(config.discovery_port, 4000);
        assert_eq!(config.refresh_interval_ms, 250);
        assert_eq!(config.max_players, 3);
        assert!(config.accept_guest_option_requests);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = NetworkConfig::from_json_str(
            r#"{ "discovery_port": 5000, "room_defaults": { "turn_timeout": 90 } }"#,
        )
        .unwrap();

        assert_eq!(config.discovery_port, 5000);
        assert_eq!(config.room_defaults.turn_timeout, 90);
        assert_eq!(config.room_defaults.init_replace_timeout, 15);
        assert_eq!(config.reorder_window, 256);
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = NetworkConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_single_player_games() {
        let mut config = NetworkConfig::default();
        config.min_players_to_start = 1;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "min_players_to_start", .. }));
    }

    #[test]
    fn test_rejects_timeouts_at_floor() {
        let config = NetworkConfig::default().with_room_defaults(RoomDefaults {
            turn_timeout: TIMEOUT_FLOOR_SECS,
            ..RoomDefaults::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_seat_limit_below_start_minimum() {
        let config = NetworkConfig::default().with_max_players(1);
        assert!(config.validate().is_err());
    }
}
