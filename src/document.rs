//! Resizeable Document: an ordered sequence of store ids forming a
//! logical byte string, with random-access range read and arbitrary-range
//! replace that re-chunks automatically.

use crate::error::{Result, StoreError};
use crate::id::Id;
use crate::store::SharedStore;

/// An ordered sequence of store-sized chunks forming a logical byte string.
pub struct Document {
    store: SharedStore,
    ids: Vec<Id>,
    sizes: Vec<usize>,
    offs: Vec<usize>,
}

impl Document {
    pub fn new(store: SharedStore) -> Self {
        Document {
            store,
            ids: Vec::new(),
            sizes: Vec::new(),
            offs: vec![0],
        }
    }

    pub fn len(&self) -> usize {
        *self.offs.last().unwrap()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_chunks(&self) -> usize {
        self.ids.len()
    }

    fn allocsize(&self) -> usize {
        self.store.borrow().allocsize()
    }

    /// Locate the chunk containing byte position `p`: `(idx, off)` with
    /// `off = p - offs[idx]`. For `p == len()`, returns `(num_chunks(), 0)`.
    fn bisect(&self, p: usize) -> (usize, usize) {
        let idx = self.offs.partition_point(|&o| o <= p).saturating_sub(1);
        (idx, p - self.offs[idx])
    }

    pub fn read_range(&self, lo: usize, hi: usize) -> Result<Vec<u8>> {
        let len = self.len();
        if lo > hi || hi > len {
            return Err(StoreError::OutOfRange { index: hi, len });
        }
        if lo == hi {
            return Ok(Vec::new());
        }
        let (start_idx, start_off) = self.bisect(lo);
        let (stop_idx, stop_off) = self.bisect(hi);
        let end_idx = if stop_off > 0 { stop_idx } else { stop_idx - 1 };

        let store = self.store.borrow();
        let mut buf = Vec::with_capacity(hi - lo);
        for idx in start_idx..=end_idx {
            buf.extend_from_slice(&store.fetch(&self.ids[idx])?);
        }
        let want = hi - lo;
        Ok(buf[start_off..start_off + want].to_vec())
    }

    pub fn read_all(&self) -> Result<Vec<u8>> {
        self.read_range(0, self.len())
    }

    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        let n = self.len();
        self.write_range(n, n, data)
    }

    /// Replace bytes `[lo, hi)` with `data`, re-chunking as needed.
    pub fn write_range(&mut self, lo: usize, hi: usize, data: &[u8]) -> Result<()> {
        let len = self.len();
        if lo > hi || hi > len {
            return Err(StoreError::OutOfRange { index: hi, len });
        }
        let allocsize = self.allocsize();
        let (start_idx, start_off) = self.bisect(lo);
        let (stop_idx, stop_off) = self.bisect(hi);
        let replace_end = if stop_off > 0 { stop_idx + 1 } else { stop_idx };

        let prefix = if start_off > 0 {
            self.store.borrow().fetch(&self.ids[start_idx])?[..start_off].to_vec()
        } else {
            Vec::new()
        };
        let suffix = if stop_off > 0 {
            self.store.borrow().fetch(&self.ids[stop_idx])?[stop_off..].to_vec()
        } else {
            Vec::new()
        };

        let new_chunks = build_replacement_chunks(&prefix, data, &suffix, allocsize);

        let old_ids: Vec<Id> = self.ids[start_idx..replace_end].to_vec();
        let mut new_ids = Vec::with_capacity(new_chunks.len());
        {
            let mut store = self.store.borrow_mut();
            for chunk in &new_chunks {
                new_ids.push(store.alloc_with_hint(chunk, &old_ids)?);
            }
        }
        let new_sizes: Vec<usize> = new_chunks.iter().map(|c| c.len()).collect();

        self.ids.splice(start_idx..replace_end, new_ids);
        self.sizes.splice(start_idx..replace_end, new_sizes);
        self.recompute_offs();

        let mut store = self.store.borrow_mut();
        for id in &old_ids {
            store.dealloc(id)?;
        }
        Ok(())
    }

    fn recompute_offs(&mut self) {
        self.offs.truncate(1);
        self.offs.reserve(self.sizes.len());
        let mut running = 0;
        for &s in &self.sizes {
            running += s;
            self.offs.push(running);
        }
    }

    pub fn iter_chunks(&self) -> DocumentChunks<'_> {
        DocumentChunks { doc: self, idx: 0 }
    }

    /// Verify the structural invariants: no zero-length chunk, every
    /// chunk within `ALLOCSIZE`, and `offs` the exact prefix sum of `sizes`.
    pub fn fsck(&self) {
        let allocsize = self.allocsize();
        if self.sizes.iter().any(|&s| s == 0) {
            crate::error::fsck_fail("document has a zero-length chunk");
        }
        if self.sizes.iter().any(|&s| s > allocsize) {
            crate::error::fsck_fail("document chunk exceeds ALLOCSIZE");
        }
        let mut running = 0usize;
        if self.offs[0] != 0 {
            crate::error::fsck_fail("document offsets do not start at zero");
        }
        for (i, &s) in self.sizes.iter().enumerate() {
            running += s;
            if self.offs[i + 1] != running {
                crate::error::fsck_fail("document offsets are not the prefix sum of sizes");
            }
        }
    }
}

fn build_replacement_chunks(prefix: &[u8], data: &[u8], suffix: &[u8], allocsize: usize) -> Vec<Vec<u8>> {
    let p = prefix.len();
    let d = data.len();
    let mut chunks = Vec::new();

    if p + d < allocsize {
        let slack = allocsize - p - d;
        let take = suffix.len().min(slack);
        let mut first = Vec::with_capacity(p + d + take);
        first.extend_from_slice(prefix);
        first.extend_from_slice(data);
        first.extend_from_slice(&suffix[..take]);
        if !first.is_empty() {
            chunks.push(first);
        }
        if suffix.len() > take {
            chunks.push(suffix[take..].to_vec());
        }
        return chunks;
    }

    let first_take = allocsize - p;
    let mut first = Vec::with_capacity(allocsize);
    first.extend_from_slice(prefix);
    first.extend_from_slice(&data[..first_take]);
    chunks.push(first);

    let mut remaining = &data[first_take..];
    loop {
        if remaining.len() <= allocsize {
            let slack = allocsize - remaining.len();
            let take = suffix.len().min(slack);
            let mut tail = Vec::with_capacity(remaining.len() + take);
            tail.extend_from_slice(remaining);
            tail.extend_from_slice(&suffix[..take]);
            if !tail.is_empty() {
                chunks.push(tail);
            }
            if suffix.len() > take {
                chunks.push(suffix[take..].to_vec());
            }
            break;
        }
        let (chunk, rest) = remaining.split_at(allocsize);
        chunks.push(chunk.to_vec());
        remaining = rest;
    }
    chunks
}

/// Lazily fetches chunk payloads in order, enabling streaming consumers.
pub struct DocumentChunks<'a> {
    doc: &'a Document,
    idx: usize,
}

impl<'a> Iterator for DocumentChunks<'a> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.doc.ids.len() {
            return None;
        }
        let store = self.doc.store.borrow();
        let result = store.fetch(&self.doc.ids[self.idx]);
        self.idx += 1;
        Some(result)
    }
}

/// A non-mutating view over a document: the read-only sibling used where
/// a chunk sequence is constructed once and never range-written again.
pub struct ReadOnlyDocument(Document);

impl ReadOnlyDocument {
    pub fn new(doc: Document) -> Self {
        ReadOnlyDocument(doc)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn read_range(&self, lo: usize, hi: usize) -> Result<Vec<u8>> {
        self.0.read_range(lo, hi)
    }

    pub fn read_all(&self) -> Result<Vec<u8>> {
        self.0.read_all()
    }

    pub fn iter_chunks(&self) -> DocumentChunks<'_> {
        self.0.iter_chunks()
    }
}
