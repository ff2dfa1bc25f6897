//! Transport abstraction and wire protocol.
//!
//! The protocol assumes a reliable point-to-point channel with at-least-once
//! delivery per connection, plus a LAN broadcast used for discovery. Sockets
//! are the embedder's business: the protocol hands [`Outbound`] messages to
//! a [`Transport`] and the embedding loop feeds inbound messages back
//! through `NetworkCoordinator::handle_message`.
//!
//! ## Key Types
//!
//! - `Destination`: Host address, connected peer, or broadcast port
//! - `Message`: Every message the protocol exchanges
//! - `Transport`: Outbound send capability
//! - `codec`: bincode framing for byte transports

pub mod protocol;
pub mod codec;

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::core::PeerId;

pub use codec::{decode, encode, CodecError};
pub use protocol::{Message, Procedure};

/// Where a message goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    /// A room host, by address. Used before a connection exists (join,
    /// refresh) and by guests talking to their host.
    Host(SocketAddr),
    /// An already connected peer.
    Peer(PeerId),
    /// Every listener on the LAN port.
    Broadcast {
        /// Discovery port.
        port: u16,
    },
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Host(addr) => write!(f, "Host({addr})"),
            Destination::Peer(peer) => write!(f, "{peer}"),
            Destination::Broadcast { port } => write!(f, "Broadcast(:{port})"),
        }
    }
}

/// A message paired with its destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    /// Recipient.
    pub to: Destination,
    /// Payload.
    pub message: Message,
}

impl Outbound {
    /// Create an outbound message.
    #[must_use]
    pub fn new(to: Destination, message: Message) -> Self {
        Self { to, message }
    }
}

/// Errors reported by a [`Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The destination cannot be reached.
    #[error("{0} is unreachable")]
    Unreachable(Destination),

    /// The connection was closed.
    #[error("connection to {0} closed")]
    Closed(PeerId),

    /// Encoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outbound half of the network.
///
/// Implementations must not call back into the protocol from `send`;
/// replies are delivered later through the coordinator on the same logical
/// thread.
pub trait Transport {
    /// Send `message` to `to`.
    fn send(&mut self, to: Destination, message: Message) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, to: Destination, message: Message) -> Result<(), TransportError> {
        (**self).send(to, message)
    }
}
