#![forbid(unsafe_code)]
//! Shared error type and layout constants.

/// Width in bytes of one offset-array slot and of a key length prefix.
pub const OFFSET_WIDTH: usize = core::mem::size_of::<u16>();

/// Largest node buffer addressable by a 16-bit offset.
pub const MAX_NODE_SIZE: usize = u16::MAX as usize;

/// Reserved key length marking the infinite key.
pub const INFINITE_KEY_LEN: u16 = u16::MAX;

/// Errors raised when a caller breaks a layout precondition.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StrKvError {
    /// An argument was out of range or of the wrong shape.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// The node buffer is too small for the requested mutation.
    #[error("node overflow: need {required} bytes, buffer holds {capacity}")]
    NodeOverflow {
        /// Occupied size the mutation would produce.
        required: usize,
        /// Length of the supplied buffer.
        capacity: usize,
    },
    /// The mutation would produce offsets past the 16-bit range.
    #[error("offset overflow: {required} bytes exceeds the node size limit")]
    OffsetOverflow {
        /// Occupied size the mutation would produce.
        required: usize,
    },
    /// A node failed layout verification.
    #[error("corruption: {0}")]
    Corruption(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StrKvError>;
