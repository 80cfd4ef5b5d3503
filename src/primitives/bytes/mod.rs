#![forbid(unsafe_code)]
//! Fixed-endianness codecs and byte splicing shared by the node layout.

pub mod ord {
    //! Big-endian codec for the 16-bit offset and key-length fields.

    const U16_LEN: usize = core::mem::size_of::<u16>();

    /// Writes `v` big-endian into the first two bytes of `dst`.
    pub fn put_u16_be(dst: &mut [u8], v: u16) {
        assert!(dst.len() >= U16_LEN, "destination too small");
        dst[..U16_LEN].copy_from_slice(&v.to_be_bytes());
    }

    /// Reads a big-endian u16 from the first two bytes of `src`.
    pub fn get_u16_be(src: &[u8]) -> u16 {
        let head = src
            .get(..U16_LEN)
            .unwrap_or_else(|| panic!("u16 source shorter than 2 bytes (have {})", src.len()));
        u16::from_be_bytes([head[0], head[1]])
    }
}

pub mod splice {
    //! Overlap-aware moves inside one buffer.
    //!
    //! Every helper validates its ranges against the buffer before touching
    //! it, so a rejected call leaves the bytes as they were.

    use core::ops::Range;

    use smallvec::SmallVec;

    use crate::types::{Result, StrKvError};

    const INLINE_STAGING: usize = 512;

    /// Moves `range` so that it starts `by` bytes further right.
    pub fn shift_right(buf: &mut [u8], range: Range<usize>, by: usize) -> Result<usize> {
        let dst = range
            .start
            .checked_add(by)
            .ok_or(StrKvError::Invalid("splice destination overflow"))?;
        move_range(buf, range, dst)
    }

    /// Moves `range` so that it starts `by` bytes further left.
    pub fn shift_left(buf: &mut [u8], range: Range<usize>, by: usize) -> Result<usize> {
        let dst = range
            .start
            .checked_sub(by)
            .ok_or(StrKvError::Invalid("splice destination before buffer start"))?;
        move_range(buf, range, dst)
    }

    /// Moves the bytes in `range` to start at `dst`, returning the count moved.
    pub fn move_range(buf: &mut [u8], range: Range<usize>, dst: usize) -> Result<usize> {
        if range.start > range.end || range.end > buf.len() {
            return Err(StrKvError::Invalid("splice source out of bounds"));
        }
        let len = range.end - range.start;
        let dst_end = dst
            .checked_add(len)
            .ok_or(StrKvError::Invalid("splice destination overflow"))?;
        if dst_end > buf.len() {
            return Err(StrKvError::Invalid("splice destination out of bounds"));
        }
        if len > 0 && dst != range.start {
            buf.copy_within(range, dst);
        }
        Ok(len)
    }

    /// Rebuilds the first `len` bytes of `buf` from its own contents.
    ///
    /// `fill` reads the untouched buffer and writes the new image into a
    /// staging area, which is then copied back in one pass. Use this when the
    /// rebuilt region overlaps the bytes it is built from.
    pub fn copy_staged<F>(buf: &mut [u8], len: usize, fill: F) -> Result<()>
    where
        F: FnOnce(&[u8], &mut [u8]) -> Result<()>,
    {
        if len > buf.len() {
            return Err(StrKvError::Invalid("staged copy longer than buffer"));
        }
        let mut staging: SmallVec<[u8; INLINE_STAGING]> = SmallVec::from_elem(0, len);
        fill(&*buf, &mut staging[..])?;
        buf[..len].copy_from_slice(&staging);
        Ok(())
    }
}
