//! Storage layer: node layouts for the on-page B+ tree.

/// Variable-length key node layout.
pub mod btree;
