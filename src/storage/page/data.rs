//! Owned page-sized byte buffer.

use std::ops::{Deref, DerefMut};

use super::PAGE_SIZE;

/// A fixed-length, heap-allocated block of exactly `PAGE_SIZE` bytes.
///
/// Used both as the in-pool frame buffer and as the unit a storage backend
/// keeps per page. The memory is zero-initialized on allocation.
#[derive(Clone)]
pub struct PageData {
    bytes: Box<[u8; PAGE_SIZE]>,
}

impl Default for PageData {
    fn default() -> Self {
        Self::new()
    }
}

impl PageData {
    /// Creates a zero-filled page.
    pub fn new() -> Self {
        Self {
            bytes: Box::new([0u8; PAGE_SIZE]),
        }
    }

    /// Returns a slice to the underlying memory.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..]
    }

    /// Returns a mutable slice to the underlying memory.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes[..]
    }

    /// Resets every byte to zero.
    pub fn zero(&mut self) {
        self.bytes.fill(0);
    }
}

impl std::fmt::Debug for PageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageData")
            .field("len", &PAGE_SIZE)
            .finish_non_exhaustive()
    }
}

impl Deref for PageData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl DerefMut for PageData {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}
