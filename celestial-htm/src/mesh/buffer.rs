//! Reusable, capacity-bounded trixel lists for query results.

use std::fmt;

/// Dense zero-based trixel id as seen by callers of the mesh.
pub type Trixel = u64;

/// Handle to one of the mesh's result buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferId(usize);

impl BufferId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer {}", self.0)
    }
}

/// Result list of one region query.
///
/// Holds at most `capacity` trixels; anything beyond is counted in
/// [`overflow`](Self::overflow) instead of stored. A query resets the buffer
/// before filling it, so each buffer reflects only the latest query sent to it.
#[derive(Debug, Clone)]
pub struct ResultBuffer {
    trixels: Vec<Trixel>,
    capacity: usize,
    overflow: usize,
}

impl ResultBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            trixels: Vec::with_capacity(capacity.min(4096)),
            capacity,
            overflow: 0,
        }
    }

    pub fn reset(&mut self) {
        self.trixels.clear();
        self.overflow = 0;
    }

    /// Appends `trixel`, returning false (and counting it) once the buffer is full.
    pub fn push(&mut self, trixel: Trixel) -> bool {
        if self.trixels.len() >= self.capacity {
            self.overflow += 1;
            return false;
        }
        self.trixels.push(trixel);
        true
    }

    pub fn len(&self) -> usize {
        self.trixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trixels.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Trixels dropped by the last query because the buffer was full.
    pub fn overflow(&self) -> usize {
        self.overflow
    }

    pub fn as_slice(&self) -> &[Trixel] {
        &self.trixels
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trixel> {
        self.trixels.iter()
    }
}

impl<'a> IntoIterator for &'a ResultBuffer {
    type Item = &'a Trixel;
    type IntoIter = std::slice::Iter<'a, Trixel>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
