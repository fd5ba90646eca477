// Crate-wide error type.
//
// `EndOfData` is the only recoverable variant: it means "feed me more
// bytes" and is consumed by the streaming decoder at suspension points.
// Every other variant ends the session that produced it.

use crate::vcdiff::varint::VarIntError;

/// Errors produced by the VCDIFF encoder and decoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Not enough input yet; retry once more bytes are available.
    #[error("end of data: more input is required")]
    EndOfData,

    /// Malformed or semantically invalid delta encoding.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A declared window or cumulative target size exceeds a configured limit.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// Programmer misuse of the API.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub(crate) fn resource_limit(msg: impl Into<String>) -> Self {
        Self::ResourceLimit(msg.into())
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Whether this error only signals that more input is needed.
    #[inline]
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::EndOfData)
    }
}

impl From<VarIntError> for Error {
    fn from(e: VarIntError) -> Self {
        match e {
            VarIntError::EndOfBuffer => Error::EndOfData,
            VarIntError::Parse => Error::protocol("invalid variable-length integer"),
            VarIntError::Negative => Error::invalid_argument("cannot encode a negative integer"),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
