use crate::primitives::bytes::ord;
use crate::types::{Result, StrKvError, OFFSET_WIDTH};

/// A node buffer together with its entry count.
///
/// Layout of the buffer:
///
/// ```text
/// [off 0][off 1] ... [off n]   n + 1 big-endian u16 offsets
/// [key 0][value 0]             bytes off[0]..off[1]
/// ...
/// [key n-1][value n-1]         bytes off[n-1]..off[n]
/// ```
///
/// `off[0]` always points just past the offset array and `off[n]` is the
/// occupied length. The buffer itself belongs to the caller; mutations never
/// grow or shrink it. An empty node has no offset array at all, so the entry
/// count travels with the buffer rather than being derived from it.
#[derive(Debug, Clone)]
pub struct Node<B> {
    data: B,
    nentry: usize,
}

/// Borrowed view of one entry inside a node buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryRef<'a> {
    /// Key bytes stored for the entry.
    pub key: &'a [u8],
    /// Fixed-size value bytes following the key.
    pub value: &'a [u8],
}

/// Byte positions of one entry: key start, value start, entry end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct EntryBounds {
    pub(crate) start: usize,
    pub(crate) value: usize,
    pub(crate) end: usize,
}

impl EntryBounds {
    pub(crate) fn key_len(&self) -> usize {
        self.value - self.start
    }

    pub(crate) fn len(&self) -> usize {
        self.end - self.start
    }
}

impl<B: AsRef<[u8]>> Node<B> {
    /// Wraps a buffer holding no entries.
    pub fn new(data: B) -> Self {
        Self { data, nentry: 0 }
    }

    /// Wraps a buffer that already holds `nentry` entries.
    pub fn from_parts(data: B, nentry: usize) -> Result<Self> {
        let node = Self { data, nentry };
        if nentry > 0 && node.array_len() > node.capacity() {
            return Err(StrKvError::Corruption("offset array exceeds node buffer"));
        }
        Ok(node)
    }

    /// Number of entries stored.
    pub fn nentry(&self) -> usize {
        self.nentry
    }

    /// Returns true when the node holds no entries.
    pub fn is_empty(&self) -> bool {
        self.nentry == 0
    }

    /// Length of the underlying buffer.
    pub fn capacity(&self) -> usize {
        self.data.as_ref().len()
    }

    /// The whole underlying buffer.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// The occupied prefix of the buffer (`off[n]` bytes).
    pub fn occupied(&self) -> &[u8] {
        let len = self.data_size().min(self.capacity());
        &self.as_bytes()[..len]
    }

    /// Releases the buffer.
    pub fn into_inner(self) -> B {
        self.data
    }

    /// Bytes occupied by the offset array and all entries.
    pub fn data_size(&self) -> usize {
        if self.nentry == 0 {
            0
        } else {
            self.offset(self.nentry)
        }
    }

    /// View over the offset array.
    pub fn offsets(&self) -> OffsetArray<'_> {
        let slots = if self.nentry == 0 {
            &[][..]
        } else {
            &self.as_bytes()[..self.array_len()]
        };
        OffsetArray { slots }
    }

    /// Borrowed key and value of entry `idx`.
    pub fn entry(&self, idx: usize, vsize: usize) -> Result<EntryRef<'_>> {
        let bounds = self.entry_bounds(idx, vsize)?;
        let data = self.as_bytes();
        Ok(EntryRef {
            key: &data[bounds.start..bounds.value],
            value: &data[bounds.value..bounds.end],
        })
    }

    /// Iterates over all entries in index order.
    pub fn entries(&self, vsize: usize) -> impl Iterator<Item = Result<EntryRef<'_>>> + '_ {
        (0..self.nentry).map(move |idx| self.entry(idx, vsize))
    }

    /// Checks the structural invariants of the offset array.
    pub fn verify(&self, vsize: usize) -> Result<()> {
        if self.nentry == 0 {
            return Ok(());
        }
        if self.array_len() > self.capacity() {
            return Err(StrKvError::Corruption("offset array exceeds node buffer"));
        }
        if self.offset(0) != self.array_len() {
            return Err(StrKvError::Corruption(
                "first offset does not follow the offset array",
            ));
        }
        for idx in 0..self.nentry {
            self.entry_bounds(idx, vsize)?;
        }
        Ok(())
    }

    /// Size of the offset array for the current entry count.
    pub(crate) fn array_len(&self) -> usize {
        OFFSET_WIDTH * (self.nentry + 1)
    }

    /// Decoded offset stored in `slot`.
    pub(crate) fn offset(&self, slot: usize) -> usize {
        let pos = slot * OFFSET_WIDTH;
        ord::get_u16_be(&self.as_bytes()[pos..]) as usize
    }

    pub(crate) fn entry_bounds(&self, idx: usize, vsize: usize) -> Result<EntryBounds> {
        if idx >= self.nentry {
            return Err(StrKvError::Invalid("entry index out of range"));
        }
        let start = self.offset(idx);
        let end = self.offset(idx + 1);
        if start < self.array_len() {
            return Err(StrKvError::Corruption("entry overlaps offset array"));
        }
        if end > self.capacity() {
            return Err(StrKvError::Corruption("entry extends beyond node buffer"));
        }
        let len = end
            .checked_sub(start)
            .ok_or(StrKvError::Corruption("offsets out of order"))?;
        if len < vsize {
            return Err(StrKvError::Corruption("entry shorter than value size"));
        }
        Ok(EntryBounds {
            start,
            value: end - vsize,
            end,
        })
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Node<B> {
    /// Mutable access to the whole underlying buffer.
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    pub(crate) fn set_nentry(&mut self, nentry: usize) {
        self.nentry = nentry;
    }
}

/// Encodes `value` into offset slot `slot` of `buf`.
pub(crate) fn write_offset(buf: &mut [u8], slot: usize, value: usize) -> Result<()> {
    let encoded =
        u16::try_from(value).map_err(|_| StrKvError::OffsetOverflow { required: value })?;
    let pos = slot * OFFSET_WIDTH;
    ord::put_u16_be(&mut buf[pos..], encoded);
    Ok(())
}

/// Decodes offset slot `slot` of `buf`.
pub(crate) fn read_offset(buf: &[u8], slot: usize) -> usize {
    ord::get_u16_be(&buf[slot * OFFSET_WIDTH..]) as usize
}

/// Read-only view over a node's offset array.
pub struct OffsetArray<'a> {
    slots: &'a [u8],
}

impl<'a> OffsetArray<'a> {
    /// Number of offsets (`nentry + 1`, or zero for an empty node).
    pub fn len(&self) -> usize {
        self.slots.len() / OFFSET_WIDTH
    }

    /// Returns true for an empty node.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Offset stored at `idx`.
    pub fn get(&self, idx: usize) -> Result<u16> {
        if idx >= self.len() {
            return Err(StrKvError::Invalid("offset index out of range"));
        }
        Ok(ord::get_u16_be(&self.slots[idx * OFFSET_WIDTH..]))
    }

    /// Iterates over the decoded offsets.
    pub fn iter(&self) -> OffsetIter<'a> {
        OffsetIter {
            slots: self.slots,
            pos: 0,
        }
    }
}

/// Iterator over decoded offsets.
pub struct OffsetIter<'a> {
    slots: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for OffsetIter<'a> {
    type Item = u16;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.slots.len() {
            return None;
        }
        let value = ord::get_u16_be(&self.slots[self.pos..]);
        self.pos += OFFSET_WIDTH;
        Some(value)
    }
}
