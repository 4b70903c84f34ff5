use thiserror::Error;

/// Failure reading from a [`crate::buffer::ByteCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("truncated read: wanted {wanted} bytes, {available} available")]
    TruncatedRead { wanted: usize, available: usize },
}

/// Conditions that terminate a connection.
///
/// Recoverable situations (unknown opcode, not enough bytes buffered yet,
/// wrong password) never surface as a `ProtocolError`; they are handled in
/// place by the session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("opcode 0x{opcode:02x} not accepted in state {state}")]
    StateViolation { opcode: u8, state: String },

    #[error("opcode 0x{opcode:02x} exceeded its per-read quota of {limit}")]
    QuotaExceeded { opcode: u8, limit: u16 },

    #[error("client public ephemeral is a multiple of N")]
    DegenerateKey,

    #[error("message of {len} bytes exceeds bound of {max}")]
    OversizedMessage { len: usize, max: usize },

    #[error("reconnect proof digest mismatch")]
    ReconnectMismatch,

    #[error("no session key available for reconnect")]
    MissingSessionKey,

    #[error("connection closed while a store operation was outstanding")]
    PeerGone,

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Failure reported by the persistence boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store conflict: {0}")]
    Conflict(String),
}
