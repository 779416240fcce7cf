//! Keyed Dictionary: a hash table storing `key_id ∥ value_id` pairs,
//! keyed by `hash(key)`, mapping byte-string keys to byte-string values.

use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};
use crate::hashtable::HashTable;
use crate::id::Id;
use crate::rep::Rep;
use crate::store::SharedStore;

fn hash_bytes(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

pub struct Dict {
    store: SharedStore,
    table: HashTable,
    idsize: usize,
}

impl Dict {
    pub fn new(store: SharedStore) -> Self {
        let idsize = store.borrow().idsize();
        let item_size = idsize * 2;
        let key_store = store.clone();
        let key_of = move |item: &[u8]| -> Vec<u8> {
            let key_id = Id(item[..idsize].to_vec());
            let key_bytes = Rep::fetch(&*key_store.borrow(), &key_id)
                .expect("corrupted dictionary: stored key_id could not be fetched");
            hash_bytes(&key_bytes)
        };
        let table = HashTable::new(store.clone(), item_size, Box::new(key_of));
        Dict { store, table, idsize }
    }

    fn split_item(&self, item: &[u8]) -> (Id, Id) {
        (
            Id(item[..self.idsize].to_vec()),
            Id(item[self.idsize..].to_vec()),
        )
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let h = hash_bytes(key);
        let item = match self.table.get(&h)? {
            Some(item) => item,
            None => return Err(StoreError::KeyNotFound),
        };
        let (key_id, value_id) = self.split_item(&item);
        let stored_key = Rep::fetch(&*self.store.borrow(), &key_id)?;
        if stored_key != key {
            return Err(StoreError::KeyNotFound);
        }
        Rep::fetch(&*self.store.borrow(), &value_id)
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let h = hash_bytes(key);
        let existing = self.table.get(&h)?;

        let key_id = match existing {
            Some(ref item) => {
                let (candidate_key_id, _) = self.split_item(item);
                let stored_key = Rep::fetch(&*self.store.borrow(), &candidate_key_id)?;
                if stored_key == key {
                    Some(candidate_key_id)
                } else {
                    None
                }
            }
            None => None,
        };

        let key_id = match key_id {
            Some(id) => id,
            None => {
                let mut store = self.store.borrow_mut();
                Rep::alloc(&mut *store, key)?
            }
        };
        let value_id = {
            let mut store = self.store.borrow_mut();
            Rep::alloc(&mut *store, value)?
        };

        let mut item = Vec::with_capacity(self.idsize * 2);
        item.extend_from_slice(key_id.as_bytes());
        item.extend_from_slice(value_id.as_bytes());
        self.table.set(&h, &item)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let h = hash_bytes(key);
        let item = match self.table.get(&h)? {
            Some(item) => item,
            None => return Err(StoreError::KeyNotFound),
        };
        let (key_id, _) = self.split_item(&item);
        let stored_key = Rep::fetch(&*self.store.borrow(), &key_id)?;
        if stored_key != key {
            return Err(StoreError::KeyNotFound);
        }
        self.table.delete(&h)
    }

    /// Batched insert/update. Equivalent in observable effect to
    /// calling `set` for every pair in order.
    pub fn update(&mut self, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        for (key, value) in pairs {
            self.set(key, value)?;
        }
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        self.items().map(|items| items.into_iter().map(|(k, _)| k).collect())
    }

    /// Streams occupied buckets, re-verifying each bucket index equals
    /// `bucket(hash(stored_key))`.
    pub fn items(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for entry in self.table.iter() {
            let (bucket, hash, item) = entry?;
            if self.table.bucket_of(&hash) != bucket {
                crate::error::fsck_fail("dictionary bucket does not match stored key's hash");
            }
            let (key_id, value_id) = self.split_item(&item);
            let key = Rep::fetch(&*self.store.borrow(), &key_id)?;
            let value = Rep::fetch(&*self.store.borrow(), &value_id)?;
            out.push((key, value));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::LocalStore;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use tempfile::tempdir;

    fn shared_store(dir: &tempfile::TempDir) -> SharedStore {
        let store = LocalStore::create(dir.path().join("s"), StoreConfig::small(64)).unwrap();
        Rc::new(RefCell::new(store))
    }

    #[test]
    fn grows_from_empty_and_all_inserted_keys_readable() {
        let dir = tempdir().unwrap();
        let mut dict = Dict::new(shared_store(&dir));
        let mut reference = HashMap::new();
        for i in 0..257u32 {
            let k = i.to_string().into_bytes();
            dict.set(&k, &k).unwrap();
            reference.insert(k.clone(), k);
            if i == 0 {
                assert_eq!(dict.table.capacity(), 2);
            }
        }
        let items = dict.items().unwrap();
        assert_eq!(items.len(), reference.len());
        for (k, v) in items {
            assert_eq!(reference.get(&k), Some(&v));
        }
    }

    #[test]
    fn value_update_preserves_key_id() {
        let dir = tempdir().unwrap();
        let mut dict = Dict::new(shared_store(&dir));
        dict.set(b"k", b"v1").unwrap();
        let h = hash_bytes(b"k");
        let item1 = dict.table.get(&h).unwrap().unwrap();
        let (key_id1, _) = dict.split_item(&item1);

        dict.set(b"k", b"v2").unwrap();
        let item2 = dict.table.get(&h).unwrap().unwrap();
        let (key_id2, _) = dict.split_item(&item2);

        assert_eq!(key_id1, key_id2);
        assert_eq!(dict.get(b"k").unwrap(), b"v2");
    }

    #[test]
    fn batched_update_with_colliding_prefixes_grows_and_keeps_both() {
        let dir = tempdir().unwrap();
        let mut dict = Dict::new(shared_store(&dir));
        let pairs = vec![
            (b"alpha".to_vec(), b"1".to_vec()),
            (b"beta".to_vec(), b"2".to_vec()),
        ];
        dict.update(&pairs).unwrap();
        assert!(dict.table.capacity() >= 2);
        assert_eq!(dict.get(b"alpha").unwrap(), b"1");
        assert_eq!(dict.get(b"beta").unwrap(), b"2");
    }

    #[test]
    fn missing_key_errors() {
        let dir = tempdir().unwrap();
        let dict = Dict::new(shared_store(&dir));
        assert!(matches!(dict.get(b"nope"), Err(StoreError::KeyNotFound)));
    }

    #[test]
    fn delete_removes_key() {
        let dir = tempdir().unwrap();
        let mut dict = Dict::new(shared_store(&dir));
        dict.set(b"k", b"v").unwrap();
        dict.delete(b"k").unwrap();
        assert!(matches!(dict.get(b"k"), Err(StoreError::KeyNotFound)));
    }
}
