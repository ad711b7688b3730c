//! Bidirectional mapping between externally owned objects and small integer ids.
//!
//! Ids start at 1 and grow monotonically. An id is never handed out twice by
//! the same map, so a stale id can only ever miss, never alias another object.

use crate::{debug, trace};
use core::fmt;
use core::hash::Hash;
use rapidhash::RapidHashMap as HashMap;

/// Outcome of [`IdMap::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Put {
    /// The key was not mapped before and received this fresh id.
    Inserted(u32),
    /// The key was already mapped to this id.
    Existing(u32),
}

impl Put {
    /// The id the key is mapped to, fresh or not.
    #[inline]
    pub fn id(self) -> u32 {
        match self {
            Put::Inserted(id) | Put::Existing(id) => id,
        }
    }

    /// Whether this call created the mapping.
    #[inline]
    pub fn is_inserted(self) -> bool {
        matches!(self, Put::Inserted(_))
    }
}

/// A bijection between keys and ids.
pub struct IdMap<K> {
    key_to_id: HashMap<K, u32>,
    id_to_key: HashMap<u32, K>,
    next_id: u32,
}

impl<K> Default for IdMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for IdMap<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdMap")
            .field("len", &self.id_to_key.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl<K> IdMap<K> {
    /// Create an empty map. The first id handed out is 1.
    pub fn new() -> Self {
        Self {
            key_to_id: HashMap::default(),
            id_to_key: HashMap::default(),
            next_id: 1,
        }
    }

    /// Number of mapped keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.id_to_key.len()
    }

    /// Whether nothing is mapped.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.id_to_key.is_empty()
    }
}

impl<K: Copy + Eq + Hash> IdMap<K> {
    /// Map `key` if it isn't mapped yet.
    pub fn put(&mut self, key: K) -> Put {
        if let Some(&id) = self.key_to_id.get(&key) {
            return Put::Existing(id);
        }

        let id = self.next_id;
        self.next_id = self
            .next_id
            .checked_add(1)
            .expect("IdMap exhausted the u32 id space");
        self.key_to_id.insert(key, id);
        self.id_to_key.insert(id, key);
        trace!(id, "mapped");
        Put::Inserted(id)
    }

    /// Unmap `key`, returning the id it had.
    pub fn remove(&mut self, key: K) -> Option<u32> {
        let id = self.key_to_id.remove(&key)?;
        let removed = self.id_to_key.remove(&id);
        debug_assert!(removed.is_some(), "IdMap lost the reverse entry for id {id}");
        trace!(id, "unmapped");
        Some(id)
    }

    /// The id `key` is mapped to.
    #[inline]
    pub fn id_for(&self, key: K) -> Option<u32> {
        self.key_to_id.get(&key).copied()
    }

    /// The key mapped to `id`.
    #[inline]
    pub fn key_for(&self, id: u32) -> Option<K> {
        self.id_to_key.get(&id).copied()
    }

    /// Whether `key` is mapped.
    #[inline]
    pub fn contains(&self, key: K) -> bool {
        self.key_to_id.contains_key(&key)
    }

    /// Iterate over all `(key, id)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (K, u32)> + '_ {
        self.key_to_id.iter().map(|(&key, &id)| (key, id))
    }

    /// Unmap everything, returning the pairs that were mapped.
    ///
    /// The id counter keeps running, so ids from before the drain stay dead.
    pub fn drain(&mut self) -> Vec<(K, u32)> {
        debug!(count = self.id_to_key.len(), "draining id map");
        self.id_to_key.clear();
        self.key_to_id.drain().collect()
    }
}
