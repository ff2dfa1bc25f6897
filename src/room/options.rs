//! Negotiated room options.

use serde::{Deserialize, Serialize};

use crate::core::{PlayerId, RoomDefaults};

/// Timeouts must be strictly greater than this many seconds.
pub const TIMEOUT_FLOOR_SECS: u32 = 5;

/// Errors from editing room options.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionError {
    /// A timeout at or below [`TIMEOUT_FLOOR_SECS`].
    #[error("{option} of {seconds}s is too short (must exceed {}s)", TIMEOUT_FLOOR_SECS)]
    TimeoutTooShort {
        /// Which timeout.
        option: &'static str,
        /// Rejected value.
        seconds: u32,
    },

    /// An explicit player order that is not a permutation of the roster.
    #[error("invalid player order: {reason}")]
    InvalidPlayerOrder {
        /// What is wrong with it.
        reason: String,
    },
}

/// Options the host negotiates for a room before the game starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomOptions {
    /// Seed for the game's deterministic simulation.
    pub random_seed: i32,
    /// Shuffle decks before the initial draw.
    pub shuffle: bool,
    /// Seconds to replace the initial hand.
    pub init_replace_timeout: u32,
    /// Seconds per turn.
    pub turn_timeout: u32,
    /// Explicit seating order. `None` seats players in join order.
    pub player_order: Option<Vec<PlayerId>>,
}

impl RoomOptions {
    /// Options for a new room with the given seed.
    #[must_use]
    pub fn new(random_seed: i32, defaults: &RoomDefaults) -> Self {
        Self {
            random_seed,
            shuffle: defaults.shuffle,
            init_replace_timeout: defaults.init_replace_timeout,
            turn_timeout: defaults.turn_timeout,
            player_order: None,
        }
    }
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self::new(0, &RoomDefaults::default())
    }
}

/// A single option edit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionChange {
    /// Set the game seed.
    RandomSeed(i32),
    /// Toggle deck shuffling.
    Shuffle(bool),
    /// Set the initial-hand replacement timeout, in seconds.
    InitReplaceTimeout(u32),
    /// Set the turn timeout, in seconds.
    TurnTimeout(u32),
    /// Set or clear the explicit seating order.
    PlayerOrder(Option<Vec<PlayerId>>),
}

impl OptionChange {
    /// Check the parts of the change that do not depend on the roster.
    pub fn check(&self) -> Result<(), OptionError> {
        match *self {
            OptionChange::InitReplaceTimeout(seconds) => check_timeout("init_replace_timeout", seconds),
            OptionChange::TurnTimeout(seconds) => check_timeout("turn_timeout", seconds),
            _ => Ok(()),
        }
    }
}

fn check_timeout(option: &'static str, seconds: u32) -> Result<(), OptionError> {
    if seconds <= TIMEOUT_FLOOR_SECS {
        return Err(OptionError::TimeoutTooShort { option, seconds });
    }
    Ok(())
}
