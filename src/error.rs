//! definition of the frame decode error type

use thiserror::Error;

use crate::data::PackingError;

/**
    error raised when a received buffer cannot be decoded as an ethercat frame, or when a
    frame cannot be written to the given buffer

    These are recoverable wire-validation failures, as opposed to the construction
    preconditions (empty or oversized PDU set, payload over budget) which are caller bugs and
    panic. Each kind is distinct so the transport can decide what to do, typically dropping
    the frame and retrying the cycle.

    Decoding never rolls back: slots decoded before the failing one keep their content and
    the caller discards the whole batch.
*/
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameError {
    /// the ethertype field does not carry the ethercat discriminant
    #[error("not an ethercat frame")]
    NotEthercat,
    /// the received buffer is shorter than the minimal ethernet frame
    #[error("frame too small")]
    TooSmall,
    /// the ethercat header declares a type or a length the frame cannot hold
    #[error("invalid header")]
    InvalidHeader,
    /// a PDU header disagrees with the expected slot, or the frame ends in the middle of a PDU
    #[error("corrupted frame")]
    Corrupted,
    /// a PDU carries a command code outside of the specified set
    #[error("unknown command {0:#04x}")]
    UnknownCommand(u8),
    /// the destination buffer cannot hold the serialized frame
    #[error("destination buffer too small")]
    Insufficient,
}

impl From<PackingError> for FrameError {
    fn from(src: PackingError) -> Self {
        match src {
            PackingError::BadSize(..) => FrameError::Insufficient,
            PackingError::InvalidValue(_) => FrameError::Corrupted,
        }
    }
}
