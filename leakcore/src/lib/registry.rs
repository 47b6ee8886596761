//! Address-keyed table of live records.
//!
//! Chained hashing, but the chains are threaded through a single slot
//! vector by index instead of by pointer: unlinking never frees anything,
//! vacated slots go on a free list and get recycled by the next insert.
//! All storage is reserved with `try_reserve`, so running out of memory
//! shows up as an error instead of an abort inside `malloc`.

use std::hash::{BuildHasher, BuildHasherDefault};
use ahash::AHasher;
use crate::error::LeakError;

/// Fixed keys, no runtime randomness: building one never allocates.
pub type AddressHasher = BuildHasherDefault<AHasher>;

/// Bucket count used by [`Registry::new`].
pub const DEFAULT_BUCKETS: usize = 1 << 16;

const NIL: u32 = u32::MAX;

struct Slot<V> {
    key:    usize,
    next:   u32,
    // `None` while the slot sits on the free list.
    value:  Option<V>,
}

pub struct Registry<V, S = AddressHasher> {
    // Chain heads. Empty until the first insert.
    heads:          Vec<u32>,
    bucket_count:   usize,
    slots:          Vec<Slot<V>>,
    vacant:         u32,
    len:            usize,
    hasher:         S,
}

impl<V> Registry<V> {
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    pub fn with_buckets(buckets: usize) -> Self {
        Self::with_buckets_and_hasher(buckets, AddressHasher::default())
    }
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S: BuildHasher> Registry<V, S> {
    /// `buckets` is rounded up to a power of two. Nothing is allocated
    /// here; the bucket array is reserved on first insert.
    pub fn with_buckets_and_hasher(buckets: usize, hasher: S) -> Self {
        Self {
            heads:          Vec::new(),
            bucket_count:   buckets.max(1).next_power_of_two(),
            slots:          Vec::new(),
            vacant:         NIL,
            len:            0,
            hasher,
        }
    }

    #[inline(always)]
    pub fn bucket_of(&self, key: usize) -> usize {
        (self.hasher.hash_one(key) as usize) & (self.bucket_count - 1)
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn find(&self, key: usize) -> Option<u32> {
        let mut cursor = *self.heads.get(self.bucket_of(key))?;
        while cursor != NIL {
            let slot = &self.slots[cursor as usize];
            if slot.key == key {
                return Some(cursor);
            }
            cursor = slot.next;
        }

        None
    }

    pub fn get(&self, key: usize) -> Option<&V> {
        self.find(key)
            .and_then(|idx| self.slots[idx as usize].value.as_ref())
    }

    pub fn contains(&self, key: usize) -> bool {
        self.find(key).is_some()
    }

    /// Adds `value` under `key`, at the head of its chain. Returns
    /// `Ok(false)` and keeps the existing record if `key` is already
    /// present; a second registration of a live address is tolerated.
    pub fn insert(&mut self, key: usize, value: V) -> Result<bool, LeakError> {
        if self.heads.is_empty() {
            self.heads.try_reserve_exact(self.bucket_count)?;
            self.heads.resize(self.bucket_count, NIL);
        }
        if self.find(key).is_some() {
            return Ok(false);
        }

        let bucket = self.bucket_of(key);
        let next = self.heads[bucket];
        let idx = if self.vacant != NIL {
            let idx = self.vacant;
            let slot = &mut self.slots[idx as usize];
            self.vacant = slot.next;
            *slot = Slot { key, next, value: Some(value) };
            idx
        } else {
            if self.slots.len() >= NIL as usize {
                return Err(LeakError::Capacity(self.slots.len()));
            }
            self.slots.try_reserve(1)?;
            self.slots.push(Slot { key, next, value: Some(value) });
            (self.slots.len() - 1) as u32
        };
        self.heads[bucket] = idx;
        self.len += 1;

        Ok(true)
    }

    /// Unlinks the record for `key`, if any, and hands it back.
    pub fn remove(&mut self, key: usize) -> Option<V> {
        let bucket = self.bucket_of(key);
        let mut prev = NIL;
        let mut cursor = *self.heads.get(bucket)?;
        while cursor != NIL {
            let slot = &self.slots[cursor as usize];
            if slot.key == key {
                let next = slot.next;
                if prev == NIL {
                    self.heads[bucket] = next;
                } else {
                    self.slots[prev as usize].next = next;
                }
                let slot = &mut self.slots[cursor as usize];
                slot.next = self.vacant;
                self.vacant = cursor;
                self.len -= 1;
                return slot.value.take();
            }
            prev = cursor;
            cursor = slot.next;
        }

        None
    }

    /// Visits every live record, bucket by bucket.
    pub fn iter(&self) -> Iter<'_, V, S> {
        Iter { registry: self, bucket: 0, cursor: NIL }
    }

    pub fn for_each(&self, mut visitor: impl FnMut(usize, &V)) {
        for (key, value) in self.iter() {
            visitor(key, value);
        }
    }
}

pub struct Iter<'a, V, S> {
    registry:   &'a Registry<V, S>,
    bucket:     usize,
    cursor:     u32,
}

impl<'a, V, S> Iterator for Iter<'a, V, S> {
    type Item = (usize, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cursor != NIL {
                let slot = &self.registry.slots[self.cursor as usize];
                self.cursor = slot.next;
                if let Some(v) = slot.value.as_ref() {
                    return Some((slot.key, v));
                }
                continue;
            }
            let head = *self.registry.heads.get(self.bucket)?;
            self.bucket += 1;
            self.cursor = head;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_insert_keeps_first() {
        let mut reg: Registry<&str> = Registry::with_buckets(8);
        assert!(reg.insert(0x1000, "first").unwrap());
        assert!(!reg.insert(0x1000, "second").unwrap());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(0x1000), Some(&"first"));
    }

    #[test]
    fn slots_are_recycled() {
        let mut reg: Registry<usize> = Registry::with_buckets(4);
        for k in 0..32 {
            reg.insert(k * 16, k).unwrap();
        }
        for k in 0..32 {
            assert_eq!(reg.remove(k * 16), Some(k));
        }
        assert!(reg.is_empty());
        assert_eq!(reg.remove(0), None);
        for k in 0..32 {
            reg.insert(k * 16 + 8, k).unwrap();
        }
        assert_eq!(reg.slots.len(), 32);
        assert_eq!(reg.iter().count(), 32);
    }

    #[test]
    fn bucket_count_is_power_of_two() {
        assert_eq!(Registry::<()>::with_buckets(0).bucket_count(), 1);
        assert_eq!(Registry::<()>::with_buckets(1000).bucket_count(), 1024);
        let reg = Registry::<()>::new();
        assert_eq!(reg.bucket_count(), DEFAULT_BUCKETS);
        assert!(!reg.contains(0));
        assert_eq!(reg.iter().count(), 0);
    }
}
