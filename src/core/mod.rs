//! Core types shared by every subsystem: identifiers, randomness, timers,
//! configuration.

pub mod ids;
pub mod rng;
pub mod timer;
pub mod config;

pub use ids::{PeerId, PlayerId, RequestId, RequestIdAllocator, RoomId};
pub use rng::{SessionRng, SessionRngState};
pub use timer::Timer;
pub use config::{ConfigError, NetworkConfig, RoomDefaults};
