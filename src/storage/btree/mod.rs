#![forbid(unsafe_code)]

//! Node-level building blocks for a B+ tree with variable-length string keys.

/// Node buffer view and offset array.
pub mod page;

mod cmp;
mod key;
mod kv;
mod stats;

pub use cmp::{compare_encoded, compare_keys};
pub use key::VarKey;
pub use kv::{nth_idx, KvOps, StrKvOps, StrKvOptions};
pub use page::{EntryRef, Node, OffsetArray, OffsetIter};
pub use stats::{KvStats, KvStatsSnapshot};
