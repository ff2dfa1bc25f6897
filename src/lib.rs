//! # card-sync
//!
//! Synchronization core for networked multiplayer card games.
//!
//! ## Design Principles
//!
//! 1. **Witnesses, Not Snapshots**: The authoritative simulation emits a
//!    typed record for every resolved action. Peers replay the same records
//!    in the same order instead of receiving state.
//!
//! 2. **Ordering Is the Contract**: Witness `n + 1` never starts before
//!    witness `n` finished, including work a handler deferred. Slow
//!    presentation delays the stream but never drops from it.
//!
//! 3. **One Writer per Room**: The host owns the authoritative `RoomInfo`.
//!    Guests mirror it and ask for changes.
//!
//! 4. **Sans-IO**: Directory and session take messages and elapsed time in,
//!    return messages and events out. Sockets belong to the embedder.
//!
//! ## Architecture
//!
//! - **Tick-Driven**: A single logical thread calls `tick` and delivers
//!   inbound messages; no two handlers ever run concurrently.
//!
//! - **Persistent Room Snapshots**: Rosters are `im` vectors, so pushing a
//!   room copy to every guest clones in O(1).
//!
//! ## Modules
//!
//! - `core`: Identifiers, session RNG, timers, configuration
//! - `witness`: Witness records, handler registry, ordered dispatcher
//! - `room`: Room options and roster, discovery directory, session state machine
//! - `transport`: Destinations, protocol messages, transport trait, codec
//! - `coordinator`: Routing between the components, the transport and the game
//! - `error`: Crate-level error type

pub mod core;
pub mod witness;
pub mod room;
pub mod transport;
pub mod coordinator;
pub mod error;

// Re-export commonly used types
pub use crate::core::{
    PeerId, PlayerId, RoomId, RequestId,
    SessionRng, Timer,
    NetworkConfig, RoomDefaults, ConfigError,
};

pub use crate::witness::{
    WitnessValue, WitnessKind, WitnessRecord, WitnessFrame, WitnessError,
    WitnessHandler, FnHandler, Handled, CompletionTicket, HandlerError,
    WitnessHandlerRegistry, RegistryError,
    WitnessDispatcher, DispatchReport, DesyncError, Ingest,
    UseCard, UseTarget,
};

pub use crate::room::{
    RoomOptions, OptionChange, OptionError,
    RoomInfo, RoomPlayerInfo,
    RoomDirectory, DirectoryEvent, RemovalReason,
    RoomSession, SessionState, SessionAction, SessionEvent, SessionError,
    Role, JoinRejection, QuitReason,
};

pub use crate::transport::{Destination, Message, Procedure, Transport, TransportError};

pub use crate::coordinator::{NetworkCoordinator, Presentation};

pub use crate::error::{Error, Result};
