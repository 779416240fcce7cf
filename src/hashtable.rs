//! Collision-splitting Hash Table: a power-of-two bucket table over a
//! [`FixedArray`], sentinel-based occupancy, that grows by adding
//! hash-prefix bits one at a time only when a collision forces it.

use crate::array::FixedArray;
use crate::error::{precondition_fail, Result, StoreError};
use crate::store::SharedStore;

const MAX_H: u32 = 64;

/// Extracts the hash digest a bucket's occupant is keyed by.
pub type KeyFn = Box<dyn Fn(&[u8]) -> Vec<u8>>;

pub struct HashTable {
    array: FixedArray,
    sentinel: Vec<u8>,
    h: u32,
    key_of: KeyFn,
}

impl HashTable {
    pub fn new(store: SharedStore, item_size: usize, key_of: KeyFn) -> Self {
        HashTable {
            array: FixedArray::new(store, item_size),
            sentinel: vec![0u8; item_size],
            h: 0,
            key_of,
        }
    }

    pub fn item_size(&self) -> usize {
        self.array.item_size()
    }

    pub fn capacity(&self) -> u64 {
        if self.h == 0 {
            0
        } else {
            1u64 << self.h
        }
    }

    pub fn h(&self) -> u32 {
        self.h
    }

    pub fn bucket_of(&self, hash: &[u8]) -> u64 {
        bucket_index(hash, self.h)
    }

    fn key_of(&self, item: &[u8]) -> Vec<u8> {
        (self.key_of)(item)
    }

    pub fn get(&self, hash: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.capacity() == 0 {
            return Ok(None);
        }
        let b = self.bucket_of(hash);
        let item = self.array.get(b as usize)?;
        if item == self.sentinel {
            Ok(None)
        } else {
            Ok(Some(item))
        }
    }

    /// Inserts `item`, keyed by `hash`. `key_of(item)` must equal `hash` and
    /// `item` must not be the sentinel.
    pub fn set(&mut self, hash: &[u8], item: &[u8]) -> Result<()> {
        if item == self.sentinel.as_slice() {
            return Err(StoreError::PreconditionViolated(
                "item equals the sentinel value",
            ));
        }
        if self.key_of(item) != hash {
            return Err(StoreError::PreconditionViolated(
                "key(item) does not match supplied hash",
            ));
        }

        if self.capacity() == 0 {
            self.grow_to(1)?;
        }

        let b = self.bucket_of(hash);
        let place = self.array.get(b as usize)?;
        if place == self.sentinel || self.key_of(&place) == hash {
            return self.array.set(b as usize, item);
        }

        let other_hash = self.key_of(&place);
        let mut new_h = self.h;
        loop {
            new_h += 1;
            if new_h > MAX_H {
                precondition_fail("hash prefix collision exceeds supported capacity bits");
            }
            if bucket_index(hash, new_h) != bucket_index(&other_hash, new_h) {
                break;
            }
        }
        self.grow_to(new_h)?;
        let b = self.bucket_of(hash);
        self.array.set(b as usize, item)
    }

    /// Rewrites the whole array at capacity `2^new_h`, preserving every
    /// existing occupant at its new bucket.
    fn grow_to(&mut self, new_h: u32) -> Result<()> {
        let old_capacity = self.capacity();
        let old_items = if old_capacity == 0 {
            Vec::new()
        } else {
            self.array.get_slice(0, old_capacity as usize)?
        };

        let new_capacity = 1u64 << new_h;
        let mut new_items = vec![self.sentinel.clone(); new_capacity as usize];
        for old_item in old_items {
            if old_item != self.sentinel {
                let h = self.key_of(&old_item);
                let nb = bucket_index(&h, new_h);
                new_items[nb as usize] = old_item;
            }
        }

        self.array.set_slice(0, old_capacity as usize, &new_items)?;
        self.h = new_h;
        Ok(())
    }

    pub fn delete(&mut self, hash: &[u8]) -> Result<()> {
        if self.capacity() == 0 {
            return Ok(());
        }
        let b = self.bucket_of(hash);
        let sentinel = self.sentinel.clone();
        self.array.set(b as usize, &sentinel)
    }

    /// Repeated incremental `set` per pair. Each call independently
    /// preserves the bucket law, no-collision law, capacity monotonicity,
    /// and idempotence invariants; this amortizes expansion into one
    /// rewrite per growth step rather than one rewrite for the whole batch.
    pub fn update(&mut self, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        for (hash, item) in pairs {
            self.set(hash, item)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> HashTableIter<'_> {
        HashTableIter { table: self, idx: 0 }
    }
}

/// `b = (int.from_bytes(k[:ceil(H/8)], big) >> (ceil(H/8)*8 - H))`.
pub fn bucket_index(hash: &[u8], h: u32) -> u64 {
    if h == 0 {
        return 0;
    }
    let nbytes = ((h as usize) + 7) / 8;
    let mut val: u64 = 0;
    for i in 0..nbytes {
        val = (val << 8) | *hash.get(i).unwrap_or(&0) as u64;
    }
    let shift = (nbytes as u32) * 8 - h;
    val >> shift
}

/// Yields `(key(item), item)` for every non-sentinel bucket, in index order.
pub struct HashTableIter<'a> {
    table: &'a HashTable,
    idx: u64,
}

impl<'a> Iterator for HashTableIter<'a> {
    type Item = Result<(u64, Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.idx < self.table.capacity() {
            let i = self.idx;
            self.idx += 1;
            match self.table.array.get(i as usize) {
                Ok(item) => {
                    if item != self.table.sentinel {
                        let h = self.table.key_of(&item);
                        return Some(Ok((i, h, item)));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}
