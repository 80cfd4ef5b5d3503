//! Node layout for B+ trees keyed by variable-length byte strings.
//!
//! A node is a caller-owned byte buffer holding a big-endian offset array
//! followed by packed `key || value` entries. [`StrKvOps`] reads and edits
//! nodes in place; [`VarKey`] is the detached key handle exchanged with the
//! tree.

#![warn(missing_docs)]

pub mod primitives;
pub mod storage;
pub mod types;

pub use storage::btree::{
    compare_keys, nth_idx, KvOps, KvStats, KvStatsSnapshot, Node, StrKvOps, StrKvOptions, VarKey,
};
pub use types::{Result, StrKvError};
