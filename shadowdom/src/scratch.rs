//! Reusable scratch buffers for the document thread.
//!
//! Each pool keeps at most one spare. Update cycles never nest, so one is all
//! they ever need.

use crate::provider::AttributeList;
use std::collections::VecDeque;
use std::hash::{BuildHasher, Hash};

/// A buffer that can be emptied for reuse while keeping its allocation.
pub trait Recycle {
    fn recycle(&mut self);
}

impl<T> Recycle for Vec<T> {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl<T> Recycle for VecDeque<T> {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl<T: Eq + Hash, S: BuildHasher> Recycle for std::collections::HashSet<T, S> {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl Recycle for AttributeList {
    fn recycle(&mut self) {
        self.clear();
    }
}

/// Single-slot pool of `T`.
#[derive(Debug)]
pub struct ScratchPool<T> {
    spare: Option<T>,
}

impl<T> Default for ScratchPool<T> {
    fn default() -> Self {
        Self { spare: None }
    }
}

impl<T: Default + Recycle> ScratchPool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the spare if there is one, otherwise a fresh empty buffer.
    pub fn acquire(&mut self) -> T {
        self.spare.take().unwrap_or_default()
    }

    /// Hand a buffer back. It is emptied first; if a spare is already cached
    /// the buffer is simply dropped.
    pub fn release(&mut self, mut buffer: T) {
        if self.spare.is_none() {
            buffer.recycle();
            self.spare = Some(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    #[test]
    fn test_released_buffer_comes_back_empty() {
        let mut pool: ScratchPool<Vec<u32>> = ScratchPool::new();
        let mut buffer = pool.acquire();
        buffer.extend([1, 2, 3]);
        let capacity = buffer.capacity();
        pool.release(buffer);

        let again = pool.acquire();
        assert!(again.is_empty());
        assert_eq!(again.capacity(), capacity);
    }

    #[test]
    fn test_only_one_spare_is_kept() {
        let mut pool: ScratchPool<VecDeque<u32>> = ScratchPool::new();
        let a = VecDeque::with_capacity(64);
        let b = VecDeque::with_capacity(4);
        pool.release(a);
        pool.release(b);
        assert!(pool.acquire().capacity() >= 64);
        assert_eq!(pool.acquire().capacity(), 0);
    }
}
