use std::cmp::Ordering;
use std::sync::Arc;

use crate::primitives::bytes::splice;
use crate::types::{Result, StrKvError, MAX_NODE_SIZE, OFFSET_WIDTH};

use super::cmp::compare_keys;
use super::key::VarKey;
use super::page::{read_offset, write_offset, Node};
use super::stats::KvStats;

/// Key/value layout strategy for one tree instance.
///
/// A tree picks its implementation once at construction time and calls
/// through it for every node-level read, write and size question. The
/// caller owns index selection and sort order; implementations own the byte
/// layout.
pub trait KvOps {
    /// Detached key representation handed to and from the tree.
    type Key;

    /// Fixed size in bytes of every value.
    fn value_size(&self) -> usize;

    /// Three-way order over keys.
    fn compare(&self, a: &Self::Key, b: &Self::Key) -> Ordering;

    /// Loads entry `idx` into `key` and, when given, `value`.
    fn get_kv<B: AsRef<[u8]>>(
        &self,
        node: &Node<B>,
        idx: usize,
        key: &mut Self::Key,
        value: Option<&mut [u8]>,
    ) -> Result<()>;

    /// Overwrites entry `idx`, or appends when `idx == nentry`.
    fn set_kv<B: AsRef<[u8]> + AsMut<[u8]>>(
        &self,
        node: &mut Node<B>,
        idx: usize,
        key: &Self::Key,
        value: &[u8],
    ) -> Result<()>;

    /// Inserts `entry` before index `idx`, or removes entry `idx` when `entry` is `None`.
    fn ins_kv<B: AsRef<[u8]> + AsMut<[u8]>>(
        &self,
        node: &mut Node<B>,
        idx: usize,
        entry: Option<(&Self::Key, &[u8])>,
    ) -> Result<()>;

    /// Fills `dst` with `len` entries of `src` starting at `src_idx`.
    ///
    /// Only `dst_idx == 0` is supported.
    fn copy_kv<D, S>(
        &self,
        dst: &mut Node<D>,
        src: &Node<S>,
        dst_idx: usize,
        src_idx: usize,
        len: usize,
    ) -> Result<()>
    where
        D: AsRef<[u8]> + AsMut<[u8]>,
        S: AsRef<[u8]>;

    /// Compacts `node` down to `len` of its own entries starting at `src_idx`.
    fn copy_kv_within<B: AsRef<[u8]> + AsMut<[u8]>>(
        &self,
        node: &mut Node<B>,
        src_idx: usize,
        len: usize,
    ) -> Result<()>;

    /// Buffer size needed after replacing the first key and adding `candidates`.
    fn data_size<B: AsRef<[u8]>>(
        &self,
        node: &Node<B>,
        new_min_key: Option<&Self::Key>,
        candidates: &[Self::Key],
    ) -> Result<usize>;

    /// Marginal size of one key and, optionally, one value.
    fn kv_size(&self, key: Option<&Self::Key>, with_value: bool) -> usize;

    /// Start index of group `num` when `nentry` entries are split into `den` groups.
    fn nth_idx(&self, nentry: usize, num: usize, den: usize) -> usize {
        nth_idx(nentry, num, den)
    }

    /// Loads the separator promoted for `node`: its first key.
    fn nth_splitter<B: AsRef<[u8]>>(&self, node: &Node<B>, key: &mut Self::Key) -> Result<()> {
        self.get_kv(node, 0, key, None)
    }

    /// Deep-copies `src` into `dst`.
    fn set_key(&self, dst: &mut Self::Key, src: &Self::Key);

    /// Copies one value.
    fn set_value(&self, dst: &mut [u8], src: &[u8]) -> Result<()> {
        let vsize = self.value_size();
        if dst.len() != vsize || src.len() != vsize {
            return Err(StrKvError::Invalid("value length does not match value size"));
        }
        dst.copy_from_slice(src);
        Ok(())
    }
}

/// Start index of group `num` when `nentry` entries are split into `den`
/// groups whose sizes differ by at most one; the first `nentry % den` groups
/// get the extra entry. `num == den` yields `nentry`.
pub fn nth_idx(nentry: usize, num: usize, den: usize) -> usize {
    assert!(den > 0, "split denominator must be non-zero");
    assert!(num <= den, "split group {num} beyond denominator {den}");
    let base = nentry / den;
    let rem = nentry % den;
    base * num + num.min(rem)
}

/// Configuration knobs for [`StrKvOps`].
#[derive(Clone, Debug)]
pub struct StrKvOptions {
    /// Size in bytes of every value
    pub value_size: usize,
    /// Largest occupied size a mutation may produce (at most 65535)
    pub max_node_size: usize,
    /// Whether to re-verify the offset array after every mutation
    pub verify_after_write: bool,
}

impl Default for StrKvOptions {
    fn default() -> Self {
        Self {
            value_size: 8,
            max_node_size: MAX_NODE_SIZE,
            verify_after_write: false,
        }
    }
}

/// Variable-length string key layout.
#[derive(Clone, Debug)]
pub struct StrKvOps {
    vsize: usize,
    max_node_size: usize,
    verify_after_write: bool,
    stats: Arc<KvStats>,
}

#[derive(Clone, Copy, Debug)]
struct CopyPlan {
    src_idx: usize,
    len: usize,
    src_start: usize,
    src_end: usize,
    dst_base: usize,
}

impl CopyPlan {
    fn required(&self) -> usize {
        self.dst_base + (self.src_end - self.src_start)
    }
}

impl StrKvOps {
    /// Creates the layout with private statistics.
    pub fn new(options: StrKvOptions) -> Result<Self> {
        Self::with_stats(options, Arc::new(KvStats::default()))
    }

    /// Creates the layout reporting into a shared statistics sink.
    pub fn with_stats(options: StrKvOptions, stats: Arc<KvStats>) -> Result<Self> {
        if options.value_size == 0 {
            return Err(StrKvError::Invalid("value size must be non-zero"));
        }
        if options.max_node_size > MAX_NODE_SIZE {
            return Err(StrKvError::Invalid("max node size exceeds 16-bit offsets"));
        }
        if options.max_node_size < 2 * OFFSET_WIDTH + options.value_size {
            return Err(StrKvError::Invalid("max node size cannot hold a single entry"));
        }
        Ok(Self {
            vsize: options.value_size,
            max_node_size: options.max_node_size,
            verify_after_write: options.verify_after_write,
            stats,
        })
    }

    /// Statistics sink shared by this layout.
    pub fn stats(&self) -> &Arc<KvStats> {
        &self.stats
    }

    /// Verifies the offset array and that keys ascend strictly.
    pub fn check_node<B: AsRef<[u8]>>(&self, node: &Node<B>) -> Result<()> {
        node.verify(self.vsize)?;
        let mut prev = VarKey::null();
        let mut cur = VarKey::null();
        for idx in 0..node.nentry() {
            self.get_kv(node, idx, &mut cur, None)?;
            if idx > 0 && compare_keys(&prev, &cur) != Ordering::Less {
                return Err(StrKvError::Corruption("node keys out of order"));
            }
            std::mem::swap(&mut prev, &mut cur);
        }
        Ok(())
    }

    fn entry_len(&self, key_len: usize) -> usize {
        key_len + self.vsize
    }

    fn finite_key(key: &VarKey) -> Result<&[u8]> {
        if key.is_null() {
            return Err(StrKvError::Invalid("null key cannot be stored"));
        }
        if key.is_infinite() {
            return Err(StrKvError::Invalid("infinite key cannot be stored"));
        }
        Ok(key.key_bytes())
    }

    fn check_value(&self, value: &[u8]) -> Result<()> {
        if value.len() != self.vsize {
            return Err(StrKvError::Invalid("value length does not match value size"));
        }
        Ok(())
    }

    fn ensure_fits(&self, capacity: usize, required: usize) -> Result<()> {
        if required > MAX_NODE_SIZE {
            return Err(StrKvError::OffsetOverflow { required });
        }
        let limit = capacity.min(self.max_node_size);
        if required > limit {
            return Err(StrKvError::NodeOverflow {
                required,
                capacity: limit,
            });
        }
        Ok(())
    }

    /// Start of the entry region and occupied length of a non-empty node.
    fn layout_span<B: AsRef<[u8]>>(node: &Node<B>) -> Result<(usize, usize)> {
        let begin = node.offset(0);
        let used = node.data_size();
        if begin != node.array_len() {
            return Err(StrKvError::Corruption(
                "first offset does not follow the offset array",
            ));
        }
        if used < begin || used > node.capacity() {
            return Err(StrKvError::Corruption("occupied size outside node buffer"));
        }
        Ok((begin, used))
    }

    fn write_entry(buf: &mut [u8], at: usize, key: &[u8], value: &[u8]) {
        let value_at = at + key.len();
        buf[at..value_at].copy_from_slice(key);
        buf[value_at..value_at + value.len()].copy_from_slice(value);
    }

    fn after_write<B: AsRef<[u8]>>(&self, node: &Node<B>, op: &'static str) -> Result<()> {
        if !self.verify_after_write {
            return Ok(());
        }
        if let Err(err) = node.verify(self.vsize) {
            tracing::warn!(
                target: "strkv::verify",
                op,
                nentry = node.nentry(),
                error = %err,
                "node failed verification after write"
            );
            return Err(err);
        }
        Ok(())
    }

    fn record_moved(&self, moved: usize) {
        if moved > 0 {
            self.stats.add_bytes_moved(moved);
        }
    }

    fn overwrite<B: AsRef<[u8]> + AsMut<[u8]>>(
        &self,
        node: &mut Node<B>,
        idx: usize,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let n = node.nentry();
        let (_, used) = Self::layout_span(node)?;
        let bounds = node.entry_bounds(idx, self.vsize)?;
        let old_len = bounds.key_len();
        let new_len = key.len();
        let required = used - old_len + new_len;
        self.ensure_fits(node.capacity(), required)?;

        let buf = node.bytes_mut();
        let mut moved = 0;
        if new_len != old_len {
            let tail = bounds.end..used;
            moved = if new_len > old_len {
                splice::shift_right(buf, tail, new_len - old_len)?
            } else {
                splice::shift_left(buf, tail, old_len - new_len)?
            };
            for slot in idx + 1..=n {
                let off = read_offset(buf, slot);
                write_offset(buf, slot, off + new_len - old_len)?;
            }
        }
        Self::write_entry(buf, bounds.start, key, value);

        self.stats.inc_overwrites();
        self.record_moved(moved);
        tracing::trace!(
            target: "strkv::mutate",
            op = "overwrite",
            idx,
            nentry = n,
            old_key_len = old_len,
            new_key_len = new_len,
            bytes_moved = moved,
            "overwrote entry"
        );
        self.after_write(node, "overwrite")
    }

    fn append<B: AsRef<[u8]> + AsMut<[u8]>>(
        &self,
        node: &mut Node<B>,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let n = node.nentry();
        let entry_len = self.entry_len(key.len());
        let mut moved = 0;
        if n == 0 {
            let start = 2 * OFFSET_WIDTH;
            let required = start + entry_len;
            self.ensure_fits(node.capacity(), required)?;
            let buf = node.bytes_mut();
            write_offset(buf, 0, start)?;
            write_offset(buf, 1, required)?;
            Self::write_entry(buf, start, key, value);
        } else {
            let (begin, used) = Self::layout_span(node)?;
            let required = used + OFFSET_WIDTH + entry_len;
            self.ensure_fits(node.capacity(), required)?;
            let buf = node.bytes_mut();
            // Open one offset slot in front of the entry region.
            moved = splice::shift_right(buf, begin..used, OFFSET_WIDTH)?;
            for slot in 0..=n {
                let off = read_offset(buf, slot);
                write_offset(buf, slot, off + OFFSET_WIDTH)?;
            }
            let start = used + OFFSET_WIDTH;
            write_offset(buf, n + 1, required)?;
            Self::write_entry(buf, start, key, value);
        }
        node.set_nentry(n + 1);

        self.stats.inc_appends();
        self.record_moved(moved);
        tracing::trace!(
            target: "strkv::mutate",
            op = "append",
            idx = n,
            nentry = n + 1,
            bytes_moved = moved,
            "appended entry"
        );
        self.after_write(node, "append")
    }

    fn insert<B: AsRef<[u8]> + AsMut<[u8]>>(
        &self,
        node: &mut Node<B>,
        idx: usize,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let n = node.nentry();
        let (begin, used) = Self::layout_span(node)?;
        let at = node.offset(idx);
        if at < begin || at > used {
            return Err(StrKvError::Corruption("entry offset outside occupied range"));
        }
        let entry_len = self.entry_len(key.len());
        let required = used + OFFSET_WIDTH + entry_len;
        self.ensure_fits(node.capacity(), required)?;

        let buf = node.bytes_mut();
        // Entries from `idx` on make room for the new entry and its slot.
        let mut moved = splice::shift_right(buf, at..used, OFFSET_WIDTH + entry_len)?;
        // Entries before `idx` make room for the new slot only.
        moved += splice::shift_right(buf, begin..at, OFFSET_WIDTH)?;
        // Slots idx..=n move up by one; slot idx keeps its old value.
        moved += splice::shift_right(buf, idx * OFFSET_WIDTH..(n + 1) * OFFSET_WIDTH, OFFSET_WIDTH)?;
        Self::write_entry(buf, at + OFFSET_WIDTH, key, value);
        for slot in 0..=n + 1 {
            let off = read_offset(buf, slot);
            let shifted = if slot <= idx {
                off + OFFSET_WIDTH
            } else {
                off + OFFSET_WIDTH + entry_len
            };
            write_offset(buf, slot, shifted)?;
        }
        node.set_nentry(n + 1);

        self.stats.inc_inserts();
        self.record_moved(moved);
        tracing::trace!(
            target: "strkv::mutate",
            op = "insert",
            idx,
            nentry = n + 1,
            bytes_moved = moved,
            "inserted entry"
        );
        self.after_write(node, "insert")
    }

    fn remove<B: AsRef<[u8]> + AsMut<[u8]>>(&self, node: &mut Node<B>, idx: usize) -> Result<()> {
        let n = node.nentry();
        let (begin, used) = Self::layout_span(node)?;
        let bounds = node.entry_bounds(idx, self.vsize)?;
        if bounds.end > used {
            return Err(StrKvError::Corruption("entry offset outside occupied range"));
        }
        let removed = bounds.len();

        let buf = node.bytes_mut();
        // Slots idx+1..=n move down over slot idx.
        let mut moved = splice::shift_left(
            buf,
            (idx + 1) * OFFSET_WIDTH..(n + 1) * OFFSET_WIDTH,
            OFFSET_WIDTH,
        )?;
        // Entries before `idx` close the gap left by the dropped slot.
        moved += splice::shift_left(buf, begin..bounds.start, OFFSET_WIDTH)?;
        // Entries after `idx` close both gaps.
        moved += splice::move_range(buf, bounds.end..used, bounds.start - OFFSET_WIDTH)?;
        for slot in 0..n {
            let off = read_offset(buf, slot);
            let shifted = if slot < idx {
                off - OFFSET_WIDTH
            } else {
                off - OFFSET_WIDTH - removed
            };
            write_offset(buf, slot, shifted)?;
        }
        node.set_nentry(n - 1);

        self.stats.inc_removes();
        self.record_moved(moved);
        tracing::trace!(
            target: "strkv::mutate",
            op = "remove",
            idx,
            nentry = n - 1,
            removed_len = removed,
            bytes_moved = moved,
            "removed entry"
        );
        self.after_write(node, "remove")
    }

    fn copy_plan<S: AsRef<[u8]>>(&self, src: &Node<S>, src_idx: usize, len: usize) -> Result<CopyPlan> {
        let last = src_idx
            .checked_add(len)
            .filter(|last| *last <= src.nentry())
            .ok_or(StrKvError::Invalid("copy range beyond source entries"))?;
        Self::layout_span(src)?;
        for idx in src_idx..last {
            src.entry_bounds(idx, self.vsize)?;
        }
        Ok(CopyPlan {
            src_idx,
            len,
            src_start: src.offset(src_idx),
            src_end: src.offset(last),
            dst_base: OFFSET_WIDTH * (len + 1),
        })
    }

    /// Writes the copied offsets and entries described by `plan` into `out`.
    fn write_range(src: &[u8], plan: &CopyPlan, out: &mut [u8]) -> Result<()> {
        out[plan.dst_base..plan.required()].copy_from_slice(&src[plan.src_start..plan.src_end]);
        for i in 0..=plan.len {
            let off = read_offset(src, plan.src_idx + i);
            write_offset(out, i, off - plan.src_start + plan.dst_base)?;
        }
        Ok(())
    }
}

impl KvOps for StrKvOps {
    type Key = VarKey;

    fn value_size(&self) -> usize {
        self.vsize
    }

    fn compare(&self, a: &VarKey, b: &VarKey) -> Ordering {
        compare_keys(a, b)
    }

    fn get_kv<B: AsRef<[u8]>>(
        &self,
        node: &Node<B>,
        idx: usize,
        key: &mut VarKey,
        value: Option<&mut [u8]>,
    ) -> Result<()> {
        let bounds = node.entry_bounds(idx, self.vsize)?;
        if let Some(value) = &value {
            self.check_value(value)?;
        }
        let data = node.as_bytes();
        key.set_bytes(&data[bounds.start..bounds.value])?;
        if let Some(value) = value {
            value.copy_from_slice(&data[bounds.value..bounds.end]);
        }
        Ok(())
    }

    fn set_kv<B: AsRef<[u8]> + AsMut<[u8]>>(
        &self,
        node: &mut Node<B>,
        idx: usize,
        key: &VarKey,
        value: &[u8],
    ) -> Result<()> {
        let key = Self::finite_key(key)?;
        self.check_value(value)?;
        match idx.cmp(&node.nentry()) {
            Ordering::Less => self.overwrite(node, idx, key, value),
            Ordering::Equal => self.append(node, key, value),
            Ordering::Greater => Err(StrKvError::Invalid("set index past the last entry")),
        }
    }

    fn ins_kv<B: AsRef<[u8]> + AsMut<[u8]>>(
        &self,
        node: &mut Node<B>,
        idx: usize,
        entry: Option<(&VarKey, &[u8])>,
    ) -> Result<()> {
        match entry {
            Some((key, value)) => {
                let key = Self::finite_key(key)?;
                self.check_value(value)?;
                if idx > node.nentry() {
                    return Err(StrKvError::Invalid("insert index past the last entry"));
                }
                if node.is_empty() {
                    self.append(node, key, value)
                } else {
                    self.insert(node, idx, key, value)
                }
            }
            None => {
                if idx >= node.nentry() {
                    return Err(StrKvError::Invalid("remove index out of range"));
                }
                self.remove(node, idx)
            }
        }
    }

    fn copy_kv<D, S>(
        &self,
        dst: &mut Node<D>,
        src: &Node<S>,
        dst_idx: usize,
        src_idx: usize,
        len: usize,
    ) -> Result<()>
    where
        D: AsRef<[u8]> + AsMut<[u8]>,
        S: AsRef<[u8]>,
    {
        if dst_idx != 0 {
            return Err(StrKvError::Invalid("range copy must start at destination index 0"));
        }
        if len == 0 {
            if src_idx > src.nentry() {
                return Err(StrKvError::Invalid("copy range beyond source entries"));
            }
            dst.set_nentry(0);
            return Ok(());
        }
        let plan = self.copy_plan(src, src_idx, len)?;
        let required = plan.required();
        self.ensure_fits(dst.capacity(), required)?;
        Self::write_range(src.as_bytes(), &plan, &mut dst.bytes_mut()[..required])?;
        dst.set_nentry(len);

        self.stats.inc_range_copies();
        self.record_moved(required);
        tracing::trace!(
            target: "strkv::copy",
            src_idx,
            len,
            bytes = required,
            staged = false,
            "copied entry range"
        );
        self.after_write(dst, "copy")
    }

    fn copy_kv_within<B: AsRef<[u8]> + AsMut<[u8]>>(
        &self,
        node: &mut Node<B>,
        src_idx: usize,
        len: usize,
    ) -> Result<()> {
        if len == 0 {
            if src_idx > node.nentry() {
                return Err(StrKvError::Invalid("copy range beyond source entries"));
            }
            node.set_nentry(0);
            return Ok(());
        }
        let plan = self.copy_plan(node, src_idx, len)?;
        let required = plan.required();
        self.ensure_fits(node.capacity(), required)?;
        splice::copy_staged(node.bytes_mut(), required, |src, out| {
            Self::write_range(src, &plan, out)
        })?;
        node.set_nentry(len);

        self.stats.inc_staged_copies();
        self.record_moved(required);
        tracing::trace!(
            target: "strkv::copy",
            src_idx,
            len,
            bytes = required,
            staged = true,
            "copied entry range within node"
        );
        self.after_write(node, "copy_within")
    }

    fn data_size<B: AsRef<[u8]>>(
        &self,
        node: &Node<B>,
        new_min_key: Option<&VarKey>,
        candidates: &[VarKey],
    ) -> Result<usize> {
        let mut size = node.data_size();
        if let Some(min_key) = new_min_key {
            if !node.is_empty() {
                let first = node.entry_bounds(0, self.vsize)?;
                let key = Self::finite_key(min_key)?;
                size = size - first.len() + self.entry_len(key.len());
            }
        }
        for candidate in candidates {
            let key = Self::finite_key(candidate)?;
            size += OFFSET_WIDTH + self.entry_len(key.len());
        }
        Ok(size)
    }

    fn kv_size(&self, key: Option<&VarKey>, with_value: bool) -> usize {
        let key_size = key.map_or(0, |key| OFFSET_WIDTH + key.key_len());
        let value_size = if with_value { self.vsize } else { 0 };
        key_size + value_size
    }

    fn set_key(&self, dst: &mut VarKey, src: &VarKey) {
        dst.assign(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VSIZE: usize = 4;

    fn ops() -> StrKvOps {
        StrKvOps::new(StrKvOptions {
            value_size: VSIZE,
            verify_after_write: true,
            ..StrKvOptions::default()
        })
        .expect("valid options")
    }

    fn key(bytes: &[u8]) -> VarKey {
        VarKey::from_bytes(bytes).expect("test key fits")
    }

    fn read_all<B: AsRef<[u8]>>(ops: &StrKvOps, node: &Node<B>) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        let mut k = VarKey::null();
        let mut v = [0u8; VSIZE];
        for idx in 0..node.nentry() {
            ops.get_kv(node, idx, &mut k, Some(&mut v))?;
            out.push((k.key_bytes().to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    #[test]
    fn options_are_validated() {
        let zero = StrKvOptions {
            value_size: 0,
            ..StrKvOptions::default()
        };
        assert!(StrKvOps::new(zero).is_err());
        let too_big = StrKvOptions {
            max_node_size: 70_000,
            ..StrKvOptions::default()
        };
        assert!(StrKvOps::new(too_big).is_err());
        let too_small = StrKvOptions {
            value_size: 8,
            max_node_size: 11,
            ..StrKvOptions::default()
        };
        assert!(StrKvOps::new(too_small).is_err());
        assert_eq!(StrKvOps::new(StrKvOptions::default()).map(|o| o.value_size()), Ok(8));
    }

    #[test]
    fn append_into_empty_node_initializes_offsets() -> Result<()> {
        let ops = ops();
        let mut node = Node::new(vec![0u8; 64]);
        ops.set_kv(&mut node, 0, &key(b"b"), &[1, 2, 3, 4])?;
        assert_eq!(node.nentry(), 1);
        assert_eq!(&node.as_bytes()[..9], &[0, 4, 0, 9, b'b', 1, 2, 3, 4]);
        ops.set_kv(&mut node, 1, &key(b"cc"), &[5, 6, 7, 8])?;
        assert_eq!(node.offsets().iter().collect::<Vec<_>>(), vec![6, 11, 17]);
        assert_eq!(
            read_all(&ops, &node)?,
            vec![
                (b"b".to_vec(), vec![1, 2, 3, 4]),
                (b"cc".to_vec(), vec![5, 6, 7, 8])
            ]
        );
        Ok(())
    }

    #[test]
    fn overwrite_shrinks_and_grows_key() -> Result<()> {
        let ops = ops();
        let mut node = Node::new(vec![0u8; 64]);
        for (i, k) in [&b"a"[..], b"mm", b"zzz"].iter().enumerate() {
            ops.set_kv(&mut node, i, &key(k), &[i as u8; VSIZE])?;
        }
        ops.set_kv(&mut node, 1, &key(b"mmmmm"), &[9; VSIZE])?;
        assert_eq!(node.data_size(), 8 + (1 + 5 + 3) + 3 * VSIZE);
        ops.set_kv(&mut node, 1, &key(b""), &[7; VSIZE])?;
        assert_eq!(
            read_all(&ops, &node)?,
            vec![
                (b"a".to_vec(), vec![0; VSIZE]),
                (Vec::new(), vec![7; VSIZE]),
                (b"zzz".to_vec(), vec![2; VSIZE])
            ]
        );
        Ok(())
    }

    #[test]
    fn insert_at_front_middle_and_end() -> Result<()> {
        let ops = ops();
        let mut node = Node::new(vec![0u8; 128]);
        ops.ins_kv(&mut node, 0, Some((&key(b"m"), &[1; VSIZE])))?;
        ops.ins_kv(&mut node, 0, Some((&key(b"c"), &[2; VSIZE])))?;
        ops.ins_kv(&mut node, 2, Some((&key(b"x"), &[3; VSIZE])))?;
        ops.ins_kv(&mut node, 1, Some((&key(b"gg"), &[4; VSIZE])))?;
        let keys: Vec<Vec<u8>> = read_all(&ops, &node)?.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"c".to_vec(), b"gg".to_vec(), b"m".to_vec(), b"x".to_vec()]);
        ops.check_node(&node)?;
        Ok(())
    }

    #[test]
    fn remove_last_entry_empties_node() -> Result<()> {
        let ops = ops();
        let mut node = Node::new(vec![0u8; 32]);
        ops.ins_kv(&mut node, 0, Some((&key(b"k"), &[1; VSIZE])))?;
        ops.ins_kv(&mut node, 0, None)?;
        assert!(node.is_empty());
        assert_eq!(node.data_size(), 0);
        Ok(())
    }

    #[test]
    fn failed_insert_leaves_node_untouched() -> Result<()> {
        let ops = ops();
        let mut node = Node::new(vec![0u8; 20]);
        ops.ins_kv(&mut node, 0, Some((&key(b"abc"), &[1; VSIZE])))?;
        let before = node.as_bytes().to_vec();
        let err = ops
            .ins_kv(&mut node, 0, Some((&key(b"long key"), &[2; VSIZE])))
            .unwrap_err();
        assert_eq!(
            err,
            StrKvError::NodeOverflow {
                required: 11 + 2 + 8 + VSIZE,
                capacity: 20
            }
        );
        assert_eq!(node.as_bytes(), &before[..]);
        assert_eq!(node.nentry(), 1);
        Ok(())
    }

    #[test]
    fn bad_arguments_are_rejected() -> Result<()> {
        let ops = ops();
        let mut node = Node::new(vec![0u8; 64]);
        let v = [0u8; VSIZE];
        assert!(matches!(
            ops.set_kv(&mut node, 1, &key(b"a"), &v),
            Err(StrKvError::Invalid(_))
        ));
        assert!(matches!(
            ops.set_kv(&mut node, 0, &VarKey::infinite(), &v),
            Err(StrKvError::Invalid(_))
        ));
        assert!(matches!(
            ops.ins_kv(&mut node, 0, Some((&VarKey::null(), &v[..]))),
            Err(StrKvError::Invalid(_))
        ));
        assert!(matches!(
            ops.set_kv(&mut node, 0, &key(b"a"), &v[..2]),
            Err(StrKvError::Invalid(_))
        ));
        assert!(matches!(ops.ins_kv(&mut node, 0, None), Err(StrKvError::Invalid(_))));
        let mut k = VarKey::null();
        assert!(matches!(
            ops.get_kv(&node, 0, &mut k, None),
            Err(StrKvError::Invalid(_))
        ));
        assert!(matches!(
            ops.nth_splitter(&node, &mut k),
            Err(StrKvError::Invalid(_))
        ));
        Ok(())
    }

    #[test]
    fn offset_ceiling_is_enforced() -> Result<()> {
        let ops = ops();
        let mut node = Node::new(vec![0u8; 70_000]);
        let big = key(&vec![b'x'; 40_000]);
        ops.ins_kv(&mut node, 0, Some((&big, &[0; VSIZE])))?;
        let err = ops
            .ins_kv(&mut node, 1, Some((&big, &[0; VSIZE])))
            .unwrap_err();
        assert!(matches!(err, StrKvError::OffsetOverflow { .. }));
        assert_eq!(node.nentry(), 1);
        Ok(())
    }

    #[test]
    fn max_node_size_limits_growth() -> Result<()> {
        let ops = StrKvOps::new(StrKvOptions {
            value_size: VSIZE,
            max_node_size: 16,
            verify_after_write: false,
        })?;
        let mut node = Node::new(vec![0u8; 256]);
        ops.ins_kv(&mut node, 0, Some((&key(b"ab"), &[0; VSIZE])))?;
        let err = ops
            .ins_kv(&mut node, 1, Some((&key(b"cd"), &[0; VSIZE])))
            .unwrap_err();
        assert_eq!(
            err,
            StrKvError::NodeOverflow {
                required: 18,
                capacity: 16
            }
        );
        Ok(())
    }

    #[test]
    fn copy_rejects_nonzero_destination_index() -> Result<()> {
        let ops = ops();
        let mut src = Node::new(vec![0u8; 64]);
        ops.ins_kv(&mut src, 0, Some((&key(b"a"), &[0; VSIZE])))?;
        let mut dst = Node::new(vec![0u8; 64]);
        assert!(matches!(
            ops.copy_kv(&mut dst, &src, 1, 0, 1),
            Err(StrKvError::Invalid(_))
        ));
        assert!(matches!(
            ops.copy_kv(&mut dst, &src, 0, 0, 2),
            Err(StrKvError::Invalid(_))
        ));
        Ok(())
    }

    #[test]
    fn copy_within_keeps_tail_entries() -> Result<()> {
        let ops = ops();
        let mut node = Node::new(vec![0u8; 128]);
        for (i, k) in [&b"a"[..], b"bb", b"ccc", b"dddd"].iter().enumerate() {
            ops.set_kv(&mut node, i, &key(k), &[i as u8; VSIZE])?;
        }
        ops.copy_kv_within(&mut node, 2, 2)?;
        assert_eq!(node.nentry(), 2);
        assert_eq!(node.offset(0), 6);
        assert_eq!(
            read_all(&ops, &node)?,
            vec![
                (b"ccc".to_vec(), vec![2; VSIZE]),
                (b"dddd".to_vec(), vec![3; VSIZE])
            ]
        );
        assert_eq!(ops.stats().staged_copies(), 1);
        Ok(())
    }

    #[test]
    fn data_size_with_replacement_min_key() -> Result<()> {
        let ops = ops();
        let mut node = Node::new(vec![0u8; 64]);
        ops.set_kv(&mut node, 0, &key(b"abc"), &[0; VSIZE])?;
        ops.set_kv(&mut node, 1, &key(b"d"), &[0; VSIZE])?;
        let base = node.data_size();
        assert_eq!(ops.data_size(&node, None, &[])?, base);
        assert_eq!(ops.data_size(&node, Some(&key(b"a")), &[])?, base - 2);
        assert_eq!(
            ops.data_size(&node, Some(&key(b"abcde")), &[key(b"xy")])?,
            base + 2 + (2 + 2 + VSIZE)
        );
        let empty = Node::new(vec![0u8; 8]);
        assert_eq!(ops.data_size(&empty, Some(&key(b"zz")), &[])?, 0);
        assert!(ops.data_size(&empty, None, &[VarKey::infinite()]).is_err());
        Ok(())
    }

    #[test]
    fn kv_size_counts_prefix_and_value() -> Result<()> {
        let ops = ops();
        assert_eq!(ops.kv_size(Some(&key(b"abc")), true), 2 + 3 + VSIZE);
        assert_eq!(ops.kv_size(Some(&key(b"abc")), false), 5);
        assert_eq!(ops.kv_size(None, true), VSIZE);
        assert_eq!(ops.kv_size(None, false), 0);
        assert_eq!(ops.kv_size(Some(&VarKey::infinite()), false), 2);
        Ok(())
    }

    #[test]
    fn nth_idx_partitions_fairly() {
        assert_eq!(nth_idx(10, 1, 3), 4);
        assert_eq!(nth_idx(10, 2, 3), 7);
        assert_eq!(nth_idx(10, 3, 3), 10);
        assert_eq!(nth_idx(7, 1, 2), 4);
        assert_eq!(nth_idx(0, 1, 2), 0);
    }

    #[test]
    #[should_panic(expected = "split denominator must be non-zero")]
    fn nth_idx_rejects_zero_denominator() {
        nth_idx(4, 0, 0);
    }

    #[test]
    fn set_key_and_value_copy_through_trait() -> Result<()> {
        let ops = ops();
        let mut dst = VarKey::null();
        ops.set_key(&mut dst, &key(b"copy"));
        assert_eq!(dst.key_bytes(), b"copy");
        let mut value = [0u8; VSIZE];
        ops.set_value(&mut value, &[9, 8, 7, 6])?;
        assert_eq!(value, [9, 8, 7, 6]);
        assert!(ops.set_value(&mut value, &[1]).is_err());
        Ok(())
    }

    #[test]
    fn check_node_detects_unsorted_keys() -> Result<()> {
        let ops = ops();
        let mut node = Node::new(vec![0u8; 64]);
        ops.set_kv(&mut node, 0, &key(b"b"), &[0; VSIZE])?;
        ops.set_kv(&mut node, 1, &key(b"a"), &[0; VSIZE])?;
        assert_eq!(
            ops.check_node(&node),
            Err(StrKvError::Corruption("node keys out of order"))
        );
        ops.set_kv(&mut node, 1, &key(b"b"), &[0; VSIZE])?;
        assert!(ops.check_node(&node).is_err());
        ops.set_kv(&mut node, 1, &key(b"ba"), &[0; VSIZE])?;
        ops.check_node(&node)?;
        Ok(())
    }

    #[test]
    fn post_write_check_rejects_broken_layout() -> Result<()> {
        let ops = ops();
        let mut node = Node::new(vec![0u8; 64]);
        ops.set_kv(&mut node, 0, &key(b"a"), &[1; VSIZE])?;
        ops.set_kv(&mut node, 1, &key(b"b"), &[2; VSIZE])?;
        ops.after_write(&node, "overwrite")?;

        let mut buf = node.into_inner();
        write_offset(&mut buf, 0, 8)?;
        let broken = Node::from_parts(buf, 2)?;
        assert_eq!(
            ops.after_write(&broken, "overwrite"),
            Err(StrKvError::Corruption(
                "first offset does not follow the offset array"
            ))
        );

        let unchecked = StrKvOps::new(StrKvOptions {
            value_size: VSIZE,
            ..StrKvOptions::default()
        })?;
        assert_eq!(unchecked.after_write(&broken, "overwrite"), Ok(()));
        Ok(())
    }
}
