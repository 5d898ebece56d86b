//! Library error type.

use std::io;

use thiserror::Error;

use crate::frame::ExceptionCode;

/// A specialized [`Result`](std::result::Result) type for Modbus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Modbus errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A request parameter is invalid before anything is put on the wire,
    /// e.g. a read request addressed to the broadcast station.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The request or response does not fit the frame size limits of the
    /// active protocol.
    #[error("frame size limit exceeded")]
    InvalidSize,

    /// No response was received within the configured read timeout.
    #[error("operation timed out")]
    Timeout,

    /// RTU CRC mismatch.
    #[error("invalid CRC: expected = 0x{expected:0>4X}, actual = 0x{actual:0>4X}")]
    InvalidCrc { expected: u16, actual: u16 },

    /// ASCII LRC mismatch.
    #[error("invalid LRC: frame sums to 0x{sum:0>2X}")]
    InvalidChecksum { sum: u8 },

    /// A structurally broken frame or an echo that does not match the
    /// request: wrong station, wrong function code, wrong write echo,
    /// bad MBAP protocol identifier, impossible length field.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The function code is not known at this layer. Extensions may still
    /// handle it by installing an RTU PDU length hint.
    #[error("unsupported function code: 0x{0:0>2X}")]
    Unsupported(u8),

    /// The server answered with a Modbus exception frame.
    #[error("modbus exception: {0}")]
    Exception(ExceptionCode),

    /// General I/O error raised by the transport.
    #[error(transparent)]
    Transport(#[from] io::Error),
}

impl Error {
    /// The exception code carried by an exception frame, if any.
    #[must_use]
    pub fn exception(&self) -> Option<ExceptionCode> {
        match self {
            Self::Exception(code) => Some(*code),
            _ => None,
        }
    }

    /// Whether the error indicates a broken transport rather than a
    /// recoverable protocol condition.
    #[cfg(all(feature = "server", any(feature = "rtu", feature = "ascii")))]
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
