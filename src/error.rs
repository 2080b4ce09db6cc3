// src/error.rs
//! Error types for stream and pool operations with conversion support

use std::fmt;

/// Errors that can occur during stream operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Operation on a closed stream
    Closed,
    /// Offset or count outside the valid range
    PositionOutOfBounds,
    /// Capacity arithmetic overflowed or exceeded the system maximum
    CapacityOverflow,
    /// Seek produced a negative position
    NegativeSeek,
    /// Write or set_len would grow a fixed stream beyond its wrapped span
    FixedCapacity,
    /// The stream has no single contiguous backing buffer
    NoContiguousBuffer,
    /// Backing allocation failed
    OutOfMemory,
    /// I/O error (for compatibility)
    Io(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Stream is closed"),
            Self::PositionOutOfBounds => write!(f, "Position out of bounds"),
            Self::CapacityOverflow => write!(f, "Capacity overflow"),
            Self::NegativeSeek => write!(f, "Seek to a negative position"),
            Self::FixedCapacity => write!(f, "Fixed stream cannot grow beyond its wrapped span"),
            Self::NoContiguousBuffer => write!(f, "Stream storage is not contiguous"),
            Self::OutOfMemory => write!(f, "Out of memory"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

// ============================================================================
// ERROR CONVERSION - lets the std::io trait impls surface typed failures
// ============================================================================

/// Convert StreamError to std::io::Error
impl From<StreamError> for std::io::Error {
    fn from(err: StreamError) -> Self {
        use std::io::ErrorKind;
        match err {
            StreamError::NegativeSeek
            | StreamError::PositionOutOfBounds
            | StreamError::CapacityOverflow => std::io::Error::new(ErrorKind::InvalidInput, err),
            StreamError::FixedCapacity | StreamError::NoContiguousBuffer => {
                std::io::Error::new(ErrorKind::Unsupported, err)
            }
            StreamError::OutOfMemory => std::io::Error::new(ErrorKind::OutOfMemory, err),
            StreamError::Io(msg) => std::io::Error::other(msg),
            _ => std::io::Error::other(err),
        }
    }
}

/// Convert std::io::Error to StreamError
impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Io(err.to_string())
    }
}

/// Convert StreamError to anyhow::Error
#[cfg(feature = "anyhow")]
impl From<StreamError> for anyhow::Error {
    fn from(err: StreamError) -> Self {
        anyhow::anyhow!("{}", err)
    }
}

// ============================================================================
// RESULT TYPE ALIASES
// ============================================================================

/// Result type alias for stream operations
///
/// Note: When using with other Result types (like anyhow::Result),
/// either qualify the type (`segbuf::Result<T>`) or use the conversion traits.
pub type Result<T> = std::result::Result<T, StreamError>;

// ============================================================================
// EXTENSION TRAIT FOR EASY CONVERSION
// ============================================================================

/// Extension trait for converting Results between different error types
pub trait ResultExt<T> {
    /// Convert to anyhow::Result
    #[cfg(feature = "anyhow")]
    fn into_anyhow(self) -> anyhow::Result<T>;

    /// Convert to io::Result
    fn into_io(self) -> std::io::Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    #[cfg(feature = "anyhow")]
    fn into_anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| e.into())
    }

    fn into_io(self) -> std::io::Result<T> {
        self.map_err(|e| e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_io() {
        let err = StreamError::NegativeSeek;
        let io_err: std::io::Error = err.into();
        assert_eq!(io_err.kind(), std::io::ErrorKind::InvalidInput);

        let err = StreamError::FixedCapacity;
        let io_err: std::io::Error = err.into();
        assert_eq!(io_err.kind(), std::io::ErrorKind::Unsupported);

        let err = StreamError::OutOfMemory;
        let io_err: std::io::Error = err.into();
        assert_eq!(io_err.kind(), std::io::ErrorKind::OutOfMemory);
    }

    #[test]
    fn test_result_ext() {
        let result: Result<u32> = Ok(42);
        let io_result = result.into_io();
        assert_eq!(io_result.unwrap(), 42);
    }

    #[cfg(feature = "anyhow")]
    #[test]
    fn test_anyhow_conversion() {
        let err = StreamError::Closed;
        let anyhow_err: anyhow::Error = err.into();
        assert!(anyhow_err.to_string().contains("closed"));
    }
}
