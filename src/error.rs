#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0} timeout")]
    Timeout(&'static str),

    #[error("Not connected")]
    NotConnected,

    #[error("Not enough bytes")]
    NotEnoughData { actual: usize, minimum: usize },

    #[error("Value does not fit in {bit_size} bit field")]
    Overflow { bit_size: u32 },

    #[error("Invalid field parameters: {0}")]
    FieldParams(String),

    #[error("No field named {0}")]
    UnknownField(String),

    #[error("Invalid hex string: {0}")]
    HexPattern(String),

    /// Length field decoded to a value past the configured ceiling. Fatal:
    /// either the link is corrupted or the protocol config is wrong.
    #[error("Length value received larger than max_length: {length} > {max_length}")]
    LengthExceedsMax { length: u64, max_length: u64 },

    /// Outgoing payload already contains the write termination sequence.
    #[error("Write data contains termination sequence")]
    TerminationConflict,

    #[error("Unexpected response: {0}")]
    ResponseMismatch(String),

    #[error("Response packet definition not found: {0}")]
    UnknownResponsePacket(String),
}

pub type Result<T> = std::result::Result<T, Error>;
