//! bincode framing for byte-oriented transports.
//!
//! ```
//! use card_sync::transport::{decode, encode, Message};
//!
//! let bytes = encode(&Message::DiscoverRequest).unwrap();
//! assert_eq!(decode(&bytes).unwrap(), Message::DiscoverRequest);
//! ```

use super::protocol::Message;

/// Largest message accepted by [`decode`], in bytes.
pub const MAX_MESSAGE_SIZE: u64 = 1 << 20;

/// Errors from encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// bincode failed.
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),

    /// Bytes left over after a complete message.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}

fn options() -> impl bincode::Options {
    use bincode::Options;

    bincode::DefaultOptions::new()
        .with_limit(MAX_MESSAGE_SIZE)
        .with_little_endian()
        .with_varint_encoding()
}

/// Encode a message.
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    use bincode::Options;

    Ok(options().serialize(message)?)
}

/// Decode exactly one message from `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    use bincode::Options;

    let mut reader = bytes;
    let message = options().deserialize_from(&mut reader)?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes(reader.len()));
    }
    Ok(message)
}
