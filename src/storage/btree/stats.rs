use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Snapshot of node mutation statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct KvStatsSnapshot {
    /// Entries appended past the last index
    pub appends: u64,
    /// Entries inserted at an arbitrary index
    pub inserts: u64,
    /// Entries removed
    pub removes: u64,
    /// Entries overwritten in place
    pub overwrites: u64,
    /// Range copies into a distinct destination node
    pub range_copies: u64,
    /// Range copies that staged through a temporary buffer
    pub staged_copies: u64,
    /// Bytes shifted or copied inside node buffers
    pub bytes_moved: u64,
}

/// Thread-safe counters for node layout mutations.
#[derive(Default, Debug)]
pub struct KvStats {
    appends: AtomicU64,
    inserts: AtomicU64,
    removes: AtomicU64,
    overwrites: AtomicU64,
    range_copies: AtomicU64,
    staged_copies: AtomicU64,
    bytes_moved: AtomicU64,
}

impl KvStats {
    /// Returns the number of appends.
    pub fn appends(&self) -> u64 {
        self.appends.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of indexed inserts.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of removals.
    pub fn removes(&self) -> u64 {
        self.removes.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of in-place overwrites.
    pub fn overwrites(&self) -> u64 {
        self.overwrites.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of range copies between distinct nodes.
    pub fn range_copies(&self) -> u64 {
        self.range_copies.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of self-copies that used a staging buffer.
    pub fn staged_copies(&self) -> u64 {
        self.staged_copies.load(AtomicOrdering::Relaxed)
    }

    /// Returns the total number of bytes moved.
    pub fn bytes_moved(&self) -> u64 {
        self.bytes_moved.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_appends(&self) {
        self.appends.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_inserts(&self) {
        self.inserts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_removes(&self) {
        self.removes.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_overwrites(&self) {
        self.overwrites.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_range_copies(&self) {
        self.range_copies.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_staged_copies(&self) {
        self.staged_copies.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn add_bytes_moved(&self, bytes: usize) {
        self.bytes_moved
            .fetch_add(bytes as u64, AtomicOrdering::Relaxed);
    }

    /// Creates a snapshot of all current statistics.
    pub fn snapshot(&self) -> KvStatsSnapshot {
        KvStatsSnapshot {
            appends: self.appends(),
            inserts: self.inserts(),
            removes: self.removes(),
            overwrites: self.overwrites(),
            range_copies: self.range_copies(),
            staged_copies: self.staged_copies(),
            bytes_moved: self.bytes_moved(),
        }
    }

    /// Emits current statistics to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "strkv::stats",
            appends = snapshot.appends,
            inserts = snapshot.inserts,
            removes = snapshot.removes,
            overwrites = snapshot.overwrites,
            range_copies = snapshot.range_copies,
            staged_copies = snapshot.staged_copies,
            bytes_moved = snapshot.bytes_moved,
            "node layout stats snapshot"
        );
    }
}
