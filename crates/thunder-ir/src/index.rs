//! Atom indices and index remapping.

use std::collections::HashMap;
use std::fmt;

/// Position of an atom inside its [`Buffer`](crate::Buffer).
///
/// Indices are plain integers; `-1` ([`Index::NULL`]) marks an absent
/// operand.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Index(i32);

impl Index {
    /// The absent operand.
    pub const NULL: Self = Self(-1);

    /// Creates an index from a zero-based position.
    pub fn new(position: usize) -> Self {
        Self(position as i32)
    }

    /// Creates an index from its raw encoding. Any negative value is null.
    pub fn from_raw(raw: i32) -> Self {
        if raw < 0 { Self::NULL } else { Self(raw) }
    }

    /// Raw encoding, `-1` for null.
    pub fn raw(self) -> i32 {
        self.0
    }

    /// Zero-based position, or `None` for null.
    pub fn get(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }

    pub fn is_null(self) -> bool {
        self.0 < 0
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("null")
        } else {
            write!(f, "%{}", self.0)
        }
    }
}

impl From<usize> for Index {
    fn from(position: usize) -> Self {
        Self::new(position)
    }
}

/// Old-index to new-index map applied by [`Buffer::reindex`](crate::Buffer::reindex).
///
/// Entries that are absent keep their index; entries mapped to
/// [`Index::NULL`] are dropped atoms, and any surviving reference to them
/// is a structural error.
#[derive(Clone, Debug, Default)]
pub struct Reindex {
    map: HashMap<Index, Index>,
}

impl Reindex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `from` to `to`.
    pub fn set(&mut self, from: Index, to: Index) {
        self.map.insert(from, to);
    }

    /// Marks `from` as removed.
    pub fn remove(&mut self, from: Index) {
        self.map.insert(from, Index::NULL);
    }

    /// Resolves `index` through the map. `Err` means the atom was removed.
    pub fn get(&self, index: Index) -> Result<Index, Index> {
        if index.is_null() {
            return Ok(index);
        }
        match self.map.get(&index) {
            Some(&to) if to.is_null() => Err(index),
            Some(&to) => Ok(to),
            None => Ok(index),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}
