//! Room session protocol: discovery, negotiation, join/quit, start.
//!
//! ## Key Types
//!
//! - `RoomInfo`: A room as advertised by its host (options + roster)
//! - `RoomOptions` / `OptionChange`: Negotiated options and edits to them
//! - `RoomDirectory`: LAN discovery and refresh of joinable rooms
//! - `RoomSession`: Host- and guest-side lifecycle state machine
//!
//! Both `RoomDirectory` and `RoomSession` are Sans-IO. They consume
//! messages and elapsed time and return what to send and what to surface;
//! `NetworkCoordinator` performs the sends.

pub mod options;
pub mod info;
pub mod directory;
pub mod session;

pub use options::{OptionChange, OptionError, RoomOptions, TIMEOUT_FLOOR_SECS};
pub use info::{RoomInfo, RoomPlayerInfo};
pub use directory::{DirectoryEvent, DirectoryOutput, RemovalReason, RoomDirectory};
pub use session::{
    JoinRejection, QuitReason, Role, RoomSession, SessionAction, SessionError, SessionEvent, SessionState,
};
