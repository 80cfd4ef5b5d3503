//! Low-level primitives for the node layout.

/// Byte-level utilities and encoding/decoding.
///
/// Fixed-endianness integer codecs and overlap-aware splice helpers.
pub mod bytes;
