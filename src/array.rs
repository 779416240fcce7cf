//! Fixed Array: a Document viewed as a sequence of fixed-width
//! items, with positional read/write/insert/delete and streaming iteration.

use crate::document::{Document, DocumentChunks};
use crate::error::{Result, StoreError};
use crate::stream::ItemSource;
use crate::store::SharedStore;

pub struct FixedArray {
    doc: Document,
    item_size: usize,
}

impl FixedArray {
    pub fn new(store: SharedStore, item_size: usize) -> Self {
        assert!(item_size > 0, "item size must be nonzero");
        FixedArray {
            doc: Document::new(store),
            item_size,
        }
    }

    pub fn len(&self) -> usize {
        self.doc.len() / self.item_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn get(&self, i: usize) -> Result<Vec<u8>> {
        let n = self.len();
        if i >= n {
            return Err(StoreError::OutOfRange { index: i, len: n });
        }
        self.doc.read_range(i * self.item_size, (i + 1) * self.item_size)
    }

    pub fn set(&mut self, i: usize, item: &[u8]) -> Result<()> {
        let n = self.len();
        if i >= n {
            return Err(StoreError::OutOfRange { index: i, len: n });
        }
        self.check_item_size(item)?;
        self.doc.write_range(i * self.item_size, (i + 1) * self.item_size, item)
    }

    pub fn get_slice(&self, lo: usize, hi: usize) -> Result<Vec<Vec<u8>>> {
        let bytes = self.doc.read_range(lo * self.item_size, hi * self.item_size)?;
        Ok(bytes.chunks(self.item_size).map(|c| c.to_vec()).collect())
    }

    pub fn set_slice(&mut self, lo: usize, hi: usize, items: &[Vec<u8>]) -> Result<()> {
        for item in items {
            self.check_item_size(item)?;
        }
        let mut data = Vec::with_capacity(items.len() * self.item_size);
        for item in items {
            data.extend_from_slice(item);
        }
        self.doc.write_range(lo * self.item_size, hi * self.item_size, &data)
    }

    /// Streaming variant: pulls items lazily from `source` instead of
    /// requiring the whole replacement materialized up front.
    pub fn set_slice_streaming(&mut self, lo: usize, hi: usize, source: &mut dyn ItemSource) -> Result<()> {
        if source.item_size() != self.item_size {
            return Err(StoreError::PreconditionViolated(
                "stream item size does not match array item size",
            ));
        }
        let mut data = Vec::with_capacity(source.total_bytes());
        while let Some(item) = source.next_item() {
            data.extend_from_slice(&item);
        }
        self.doc.write_range(lo * self.item_size, hi * self.item_size, &data)
    }

    pub fn insert(&mut self, at: usize, items: &[Vec<u8>]) -> Result<()> {
        self.set_slice(at, at, items)
    }

    pub fn delete(&mut self, lo: usize, hi: usize) -> Result<()> {
        self.set_slice(lo, hi, &[])
    }

    pub fn append(&mut self, item: &[u8]) -> Result<()> {
        self.check_item_size(item)?;
        let n = self.len();
        self.set_slice(n, n, std::slice::from_ref(&item.to_vec()))
    }

    /// Applies `f(index, item) -> new_item` across every item, in a single
    /// whole-array rewrite.
    pub fn mutate_all(&mut self, mut f: impl FnMut(usize, &[u8]) -> Vec<u8>) -> Result<()> {
        let n = self.len();
        let mut items = Vec::with_capacity(n);
        for i in 0..n {
            let item = self.get(i)?;
            items.push(f(i, &item));
        }
        self.set_slice(0, n, &items)
    }

    pub fn iter(&self) -> FixedArrayIter<'_> {
        FixedArrayIter {
            chunks: self.doc.iter_chunks(),
            item_size: self.item_size,
            rollover: Vec::new(),
        }
    }

    fn check_item_size(&self, item: &[u8]) -> Result<()> {
        if item.len() != self.item_size {
            return Err(StoreError::PreconditionViolated(
                "item length does not match array item size",
            ));
        }
        Ok(())
    }

    pub fn fsck(&self) {
        self.doc.fsck();
        if self.doc.len() % self.item_size != 0 {
            crate::error::fsck_fail("document length is not a multiple of the array item size");
        }
    }
}

/// Streams fixed-size items out of the underlying chunk sequence, keeping a
/// rollover buffer of up to `item_size - 1` bytes across chunk boundaries.
pub struct FixedArrayIter<'a> {
    chunks: DocumentChunks<'a>,
    item_size: usize,
    rollover: Vec<u8>,
}

impl<'a> Iterator for FixedArrayIter<'a> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.rollover.len() >= self.item_size {
                let item = self.rollover[..self.item_size].to_vec();
                self.rollover.drain(..self.item_size);
                return Some(Ok(item));
            }
            match self.chunks.next() {
                Some(Ok(chunk)) => self.rollover.extend_from_slice(&chunk),
                Some(Err(e)) => return Some(Err(e)),
                None => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::LocalStore;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    fn shared_store(dir: &tempfile::TempDir) -> SharedStore {
        let store = LocalStore::create(dir.path().join("s"), StoreConfig::small(64)).unwrap();
        Rc::new(RefCell::new(store))
    }

    #[test]
    fn slice_insertion_matches_scenario() {
        let dir = tempdir().unwrap();
        let mut arr = FixedArray::new(shared_store(&dir), 3);
        arr.append(b"foo").unwrap();
        arr.append(b"bar").unwrap();
        arr.set_slice(1, 1, &[b"baz".to_vec(), b"qux".to_vec()]).unwrap();
        assert_eq!(
            arr.get_slice(0, 4).unwrap(),
            vec![b"foo".to_vec(), b"baz".to_vec(), b"qux".to_vec(), b"bar".to_vec()]
        );
    }

    #[test]
    fn iteration_matches_full_slice() {
        let dir = tempdir().unwrap();
        let mut arr = FixedArray::new(shared_store(&dir), 4);
        for i in 0..50u32 {
            arr.append(&i.to_le_bytes()).unwrap();
        }
        let sliced = arr.get_slice(0, arr.len()).unwrap();
        let iterated: Vec<Vec<u8>> = arr.iter().map(|r| r.unwrap()).collect();
        assert_eq!(sliced, iterated);
    }

    #[test]
    fn rejects_wrong_item_size() {
        let dir = tempdir().unwrap();
        let mut arr = FixedArray::new(shared_store(&dir), 3);
        let err = arr.append(b"ab").unwrap_err();
        assert!(matches!(err, StoreError::PreconditionViolated(_)));
    }
}
