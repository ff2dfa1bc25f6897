//! Crate-level error type.
//!
//! Each module reports its own error enum; [`Error`] gathers them for
//! callers that drive the whole stack through `NetworkCoordinator`.

use crate::core::ConfigError;
use crate::room::{OptionError, SessionError};
use crate::transport::{CodecError, TransportError};
use crate::witness::{DesyncError, RegistryError, WitnessError};

/// Any error the crate reports.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Handler registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A witness could not be built or decoded.
    #[error(transparent)]
    Witness(#[from] WitnessError),

    /// The witness stream desynchronized; the session was torn down.
    #[error(transparent)]
    Desync(#[from] DesyncError),

    /// A session operation was refused.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room option edit was rejected.
    #[error(transparent)]
    Option(#[from] OptionError),

    /// Sending failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Result alias using the crate [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
