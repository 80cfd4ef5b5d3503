use std::fmt;

use crate::primitives::bytes::ord;
use crate::types::{Result, StrKvError, INFINITE_KEY_LEN, OFFSET_WIDTH};

/// Owned, length-prefixed key detached from any node buffer.
///
/// The backing buffer holds the external form `[len:u16 BE][key bytes]`.
/// A handle is in one of three states:
///
/// * null: no allocation, orders below everything;
/// * infinite: only the `0xFFFF` length prefix, orders above every real key;
/// * finite: a length below `0xFFFF` followed by that many bytes.
///
/// Handles are meant to be reused as scratch slots: refilling one through
/// [`VarKey::set_bytes`], [`VarKey::assign`] or an entry accessor keeps the
/// existing allocation whenever it is large enough.
#[derive(Clone, Default)]
pub struct VarKey {
    buf: Option<Vec<u8>>,
}

impl VarKey {
    /// Returns a null handle with no allocation.
    pub const fn null() -> Self {
        Self { buf: None }
    }

    /// Builds a finite key from raw bytes.
    pub fn from_bytes(key: &[u8]) -> Result<Self> {
        let mut handle = Self::null();
        handle.set_bytes(key)?;
        Ok(handle)
    }

    /// Builds the infinite sentinel key.
    pub fn infinite() -> Self {
        let mut buf = vec![0u8; OFFSET_WIDTH];
        ord::put_u16_be(&mut buf, INFINITE_KEY_LEN);
        Self { buf: Some(buf) }
    }

    /// Parses a key from its external form.
    ///
    /// An empty slice yields a null handle.
    pub fn from_encoded(encoded: &[u8]) -> Result<Self> {
        if encoded.is_empty() {
            return Ok(Self::null());
        }
        if encoded.len() < OFFSET_WIDTH {
            return Err(StrKvError::Invalid("encoded key shorter than length prefix"));
        }
        let len = ord::get_u16_be(encoded);
        let expected = if len == INFINITE_KEY_LEN {
            OFFSET_WIDTH
        } else {
            OFFSET_WIDTH + len as usize
        };
        if encoded.len() != expected {
            return Err(StrKvError::Invalid("encoded key length mismatch"));
        }
        Ok(Self {
            buf: Some(encoded.to_vec()),
        })
    }

    /// Returns true when the handle owns no allocation.
    pub fn is_null(&self) -> bool {
        self.buf.is_none()
    }

    /// Returns true for the infinite sentinel.
    pub fn is_infinite(&self) -> bool {
        match &self.buf {
            Some(buf) => ord::get_u16_be(buf) == INFINITE_KEY_LEN,
            None => false,
        }
    }

    /// Decoded key bytes and length.
    ///
    /// The infinite key reports `0xFFFF` with no bytes; a null handle reports
    /// an empty key of length zero.
    pub fn extract(&self) -> (&[u8], u16) {
        match &self.buf {
            Some(buf) => {
                let len = ord::get_u16_be(buf);
                if len == INFINITE_KEY_LEN {
                    (&[], len)
                } else {
                    (&buf[OFFSET_WIDTH..], len)
                }
            }
            None => (&[], 0),
        }
    }

    /// Key bytes without the prefix (empty for null and infinite keys).
    pub fn key_bytes(&self) -> &[u8] {
        self.extract().0
    }

    /// Number of key bytes this handle stores in a node.
    pub fn key_len(&self) -> usize {
        self.key_bytes().len()
    }

    /// External form, or an empty slice for a null handle.
    pub fn as_encoded(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }

    /// Length of the external form.
    pub fn encoded_len(&self) -> usize {
        self.as_encoded().len()
    }

    /// Replaces the contents with `key`, reusing the current allocation.
    pub fn set_bytes(&mut self, key: &[u8]) -> Result<()> {
        let len = u16::try_from(key.len())
            .ok()
            .filter(|len| *len != INFINITE_KEY_LEN)
            .ok_or(StrKvError::Invalid("key longer than 65534 bytes"))?;
        let buf = self.buf.get_or_insert_with(Vec::new);
        buf.clear();
        buf.reserve(OFFSET_WIDTH + key.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(key);
        Ok(())
    }

    /// Deep-copies `src` into this handle, reusing the current allocation.
    ///
    /// Assigning a null source releases this handle.
    pub fn assign(&mut self, src: &VarKey) {
        match &src.buf {
            Some(src_buf) => {
                let buf = self.buf.get_or_insert_with(Vec::new);
                buf.clear();
                buf.extend_from_slice(src_buf);
            }
            None => self.release(),
        }
    }

    /// Frees the allocation and resets the handle to null.
    pub fn release(&mut self) {
        self.buf = None;
    }
}

impl fmt::Debug for VarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("VarKey::Null");
        }
        if self.is_infinite() {
            return f.write_str("VarKey::Infinite");
        }
        write!(f, "VarKey({:?})", self.key_bytes().escape_ascii().to_string())
    }
}
