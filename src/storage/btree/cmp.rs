//! Total order over variable-length keys.

use std::cmp::Ordering;

use crate::primitives::bytes::ord;
use crate::types::{INFINITE_KEY_LEN, OFFSET_WIDTH};

use super::key::VarKey;

/// Compares two key handles.
///
/// Null sorts first, the infinite key sorts last, and finite keys compare
/// bytewise with the shorter key first on a shared prefix.
pub fn compare_keys(a: &VarKey, b: &VarKey) -> Ordering {
    compare_encoded(a.as_encoded(), b.as_encoded())
}

/// Compares two keys in external form; an empty slice stands for null.
///
/// # Panics
///
/// Panics if a non-empty input is shorter than the two-byte length prefix.
/// Inputs must come from [`VarKey::as_encoded`] or be valid for
/// [`VarKey::from_encoded`].
pub fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    let a_inf = ord::get_u16_be(a) == INFINITE_KEY_LEN;
    let b_inf = ord::get_u16_be(b) == INFINITE_KEY_LEN;
    match (a_inf, b_inf) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        // Slice order is lexicographic with the shorter prefix first.
        (false, false) => a[OFFSET_WIDTH..].cmp(&b[OFFSET_WIDTH..]),
    }
}

impl PartialEq for VarKey {
    fn eq(&self, other: &Self) -> bool {
        compare_keys(self, other) == Ordering::Equal
    }
}

impl Eq for VarKey {}

impl PartialOrd for VarKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VarKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(self, other)
    }
}
