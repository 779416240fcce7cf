//! The local mmap-backed free-list allocator.
//!
//! File layout: an array of 8-byte words. Word 0 is the free-list head.
//! Every other word belongs to exactly one region (free or allocated); see
//! [`super::layout`] for the region encodings. The file is always grown in
//! whole pages and the free list always keeps exactly one region without a
//! successor: the tail, which anchors future growth.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use tracing::debug;

use super::layout::{
    self, allocsize_for_page, id_to_addr, read_word, write_word, HEADER_WORDS, IDSIZE,
    MIN_REGION_WORDS, WORD_SIZE,
};
use super::Store;
use crate::config::StoreConfig;
use crate::error::{fsck_fail, precondition_fail, Result, StoreError};
use crate::id::Id;

/// A local, mmap-backed, free-list slab allocator.
pub struct LocalStore {
    file: File,
    mmap: MmapMut,
    path: PathBuf,
    page_size: usize,
}

impl LocalStore {
    /// Create a new store file, truncating any existing contents, with a
    /// single page containing one free region spanning it.
    pub fn create<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(config.page_size as u64)?;

        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        mmap.fill(0);

        let total_words = (config.page_size / WORD_SIZE) as u64;
        write_word(&mut mmap, 0, HEADER_WORDS);
        write_word(&mut mmap, HEADER_WORDS, 0);
        write_word(&mut mmap, HEADER_WORDS + 1, total_words - HEADER_WORDS);
        mmap.flush()?;

        debug!(page_size = config.page_size, "store created");

        Ok(LocalStore {
            file,
            mmap,
            path: path.as_ref().to_path_buf(),
            page_size: config.page_size,
        })
    }

    /// Open an existing store file as-is; its page size is derived from the
    /// file length rounded down, recorded growth increments are whatever
    /// they were when last grown.
    pub fn open<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let store = LocalStore {
            file,
            mmap,
            path: path.as_ref().to_path_buf(),
            page_size: config.page_size,
        };
        store.fsck();
        Ok(store)
    }

    pub fn create_or_open<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, config)
        } else {
            Self::create(path, config)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn total_words(&self) -> u64 {
        (self.mmap.len() / WORD_SIZE) as u64
    }

    fn read_word(&self, w: u64) -> u64 {
        read_word(&self.mmap, w)
    }

    fn write_word(&mut self, w: u64, value: u64) {
        write_word(&mut self.mmap, w, value)
    }

    /// Verify the file decomposes into a non-cyclic free list whose regions,
    /// together with the implied allocated regions, tile `[HEADER_WORDS,
    /// total_words)` exactly. Fatal: panics rather than returning Err.
    pub fn fsck(&self) {
        let total_words = self.total_words();
        let mut free_regions: HashMap<u64, u64> = HashMap::new();
        let mut cur = self.read_word(0);
        let mut steps = 0u64;
        while cur != 0 {
            steps += 1;
            if steps > total_words || free_regions.contains_key(&cur) {
                fsck_fail("free list cycle detected");
            }
            if cur < HEADER_WORDS || cur >= total_words {
                fsck_fail("free region address out of file bounds");
            }
            let next = self.read_word(cur);
            let length = self.read_word(cur + 1);
            if length < MIN_REGION_WORDS {
                fsck_fail("free region smaller than minimum size");
            }
            if cur + length > total_words {
                fsck_fail("free region extends past end of file");
            }
            free_regions.insert(cur, length);
            cur = next;
        }

        let mut addr = HEADER_WORDS;
        while addr < total_words {
            let length = if let Some(&length) = free_regions.get(&addr) {
                length
            } else {
                let byte_len = self.read_word(addr);
                layout::words_for_payload(byte_len as usize)
            };
            if length < MIN_REGION_WORDS || addr + length > total_words {
                fsck_fail("region extends past end of file");
            }
            addr += length;
        }
        if addr != total_words {
            fsck_fail("region scan did not land exactly on end of file");
        }
    }

    fn set_link(&mut self, prev: Option<u64>, value: u64) {
        match prev {
            Some(addr) => self.write_word(addr, value),
            None => self.write_word(0, value),
        }
    }

    /// Find the first region satisfying the fit rule, walking the
    /// free list. Returns `(addr, length, next, predecessor)`.
    fn find_fit(&self, words: u64) -> Option<(u64, u64, u64, Option<u64>)> {
        let mut prev = None;
        let mut cur = self.read_word(0);
        while cur != 0 {
            let next = self.read_word(cur);
            let length = self.read_word(cur + 1);
            let is_tail = next == 0;
            let fits = (length == words && !is_tail) || length >= words + MIN_REGION_WORDS;
            if fits {
                return Some((cur, length, next, prev));
            }
            prev = Some(cur);
            cur = next;
        }
        None
    }

    fn tail(&self) -> (u64, u64, Option<u64>) {
        let mut prev = None;
        let mut cur = self.read_word(0);
        if cur == 0 {
            precondition_fail("free list has no tail region");
        }
        loop {
            let next = self.read_word(cur);
            if next == 0 {
                let length = self.read_word(cur + 1);
                return (cur, length, prev);
            }
            prev = Some(cur);
            cur = next;
        }
    }

    /// Grow the file so the tail region can satisfy `words` more words of
    /// payload plus its own header: double the file, at least
    /// enough to cover the shortfall, rounded up to a whole page.
    fn grow_tail(&mut self, words: u64) -> Result<()> {
        let (tail_addr, tail_length, tail_prev) = self.tail();
        let needed = (words + MIN_REGION_WORDS).saturating_sub(tail_length);
        let cur_words = self.total_words();
        let mut new_words = cur_words.saturating_mul(2).max(cur_words + needed);
        let page_words = (self.page_size / WORD_SIZE) as u64;
        new_words = ((new_words + page_words - 1) / page_words) * page_words;

        let new_bytes = new_words * WORD_SIZE as u64;
        self.file.set_len(new_bytes)?;
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };

        let added = new_words - cur_words;
        let new_tail_length = tail_length + added;
        self.write_word(tail_addr + 1, new_tail_length);
        let _ = tail_prev;

        debug!(
            old_words = cur_words,
            new_words, tail_addr, new_tail_length, "store grown"
        );
        Ok(())
    }

    fn alloc_inner(&mut self, data: &[u8]) -> Result<Id> {
        if data.len() > self.allocsize() {
            return Err(StoreError::PreconditionViolated(
                "payload exceeds ALLOCSIZE",
            ));
        }
        let words = layout::words_for_payload(data.len());

        loop {
            if let Some((addr, length, next, prev)) = self.find_fit(words) {
                if length == words && next != 0 {
                    // exact fit, not the tail: unlink entirely
                    self.set_link(prev, next);
                } else {
                    let new_addr = addr + words;
                    self.write_word(new_addr, next);
                    self.write_word(new_addr + 1, length - words);
                    self.set_link(prev, new_addr);
                }
                self.write_word(addr, data.len() as u64);
                let start = ((addr + 1) as usize) * WORD_SIZE;
                self.mmap[start..start + data.len()].copy_from_slice(data);
                self.fsck();
                return Ok(layout::addr_to_id(addr));
            }
            self.grow_tail(words)?;
        }
    }
}

impl Store for LocalStore {
    fn idsize(&self) -> usize {
        IDSIZE
    }

    fn allocsize(&self) -> usize {
        allocsize_for_page(self.page_size)
    }

    fn alloc_with_hint(&mut self, data: &[u8], _replacing: &[Id]) -> Result<Id> {
        // The hint is accepted for interface parity with the chunker's
        // `replacing` list but not acted on here: the caller is the
        // authoritative deallocator, and double-freeing a region the
        // store already reclaimed would corrupt the free list.
        self.alloc_inner(data)
    }

    fn fetch(&self, id: &Id) -> Result<Vec<u8>> {
        if id.len() != IDSIZE {
            return Err(StoreError::PreconditionViolated("id has wrong width"));
        }
        let addr = id_to_addr(id);
        let byte_len = self.read_word(addr) as usize;
        let start = ((addr + 1) as usize) * WORD_SIZE;
        Ok(self.mmap[start..start + byte_len].to_vec())
    }

    fn fetch_size(&self, id: &Id) -> Result<usize> {
        if id.len() != IDSIZE {
            return Err(StoreError::PreconditionViolated("id has wrong width"));
        }
        let addr = id_to_addr(id);
        Ok(self.read_word(addr) as usize)
    }

    fn dealloc(&mut self, id: &Id) -> Result<()> {
        if id.len() != IDSIZE {
            return Err(StoreError::PreconditionViolated("id has wrong width"));
        }
        let addr = id_to_addr(id);
        let byte_len = self.read_word(addr);
        let words = layout::words_for_payload(byte_len as usize);
        let old_head = self.read_word(0);
        self.write_word(addr, old_head);
        self.write_word(addr + 1, words);
        self.write_word(0, addr);
        self.fsck();
        Ok(())
    }

    /// Coalesce adjacent free regions and truncate the file so the (now
    /// coalesced) tail region occupies exactly two words. Free
    /// regions with no adjacent neighbor — internal fragmentation — are
    /// left in place; only contiguous runs collapse.
    fn shrink(&mut self) -> Result<()> {
        let mut regions: Vec<(u64, u64)> = Vec::new();
        let mut cur = self.read_word(0);
        while cur != 0 {
            let next = self.read_word(cur);
            let length = self.read_word(cur + 1);
            regions.push((cur, length));
            cur = next;
        }
        regions.sort_unstable_by_key(|&(addr, _)| addr);

        let mut merged: Vec<(u64, u64)> = Vec::new();
        for (addr, length) in regions {
            if let Some(last) = merged.last_mut() {
                if last.0 + last.1 == addr {
                    last.1 += length;
                    continue;
                }
            }
            merged.push((addr, length));
        }

        let total_words = self.total_words();
        let (tail_addr, tail_length) = *merged
            .last()
            .filter(|&&(addr, length)| addr + length == total_words)
            .unwrap_or_else(|| precondition_fail("free list has no tail region"));
        let _ = tail_length;

        // Rewrite the free list to reflect the merged regions, with the
        // tail trimmed to the minimum two words.
        let new_total_words = tail_addr + MIN_REGION_WORDS;
        let mut next_ptr = 0u64;
        for &(addr, length) in merged.iter().rev() {
            let (addr, length) = if addr == tail_addr {
                (addr, MIN_REGION_WORDS)
            } else {
                (addr, length)
            };
            self.write_word(addr, next_ptr);
            self.write_word(addr + 1, length);
            next_ptr = addr;
        }
        self.write_word(0, next_ptr);

        let new_bytes = new_total_words * WORD_SIZE as u64;
        self.file.set_len(new_bytes)?;
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        self.fsck();

        debug!(new_total_words, "store shrunk");
        Ok(())
    }
}

impl Drop for LocalStore {
    fn drop(&mut self) {
        let _ = self.mmap.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_config() -> StoreConfig {
        StoreConfig::small(64)
    }

    #[test]
    fn alloc_fetch_roundtrip() {
        let dir = tempdir().unwrap();
        let mut store = LocalStore::create(dir.path().join("s"), small_config()).unwrap();
        let id = store.alloc(b"hello").unwrap();
        assert_eq!(store.fetch(&id).unwrap(), b"hello");
        assert_eq!(store.fetch_size(&id).unwrap(), 5);
    }

    #[test]
    fn dealloc_allows_reuse() {
        let dir = tempdir().unwrap();
        let mut store = LocalStore::create(dir.path().join("s"), small_config()).unwrap();
        let a = store.alloc(b"aaaa").unwrap();
        store.dealloc(&a).unwrap();
        let b = store.alloc(b"bbbb").unwrap();
        assert_eq!(store.fetch(&b).unwrap(), b"bbbb");
    }

    #[test]
    fn grows_past_one_page() {
        let dir = tempdir().unwrap();
        let mut store = LocalStore::create(dir.path().join("s"), small_config()).unwrap();
        let mut ids = Vec::new();
        for i in 0..20u8 {
            ids.push(store.alloc(&[i; 20]).unwrap());
        }
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(store.fetch(id).unwrap(), vec![i as u8; 20]);
        }
    }

    #[test]
    fn shrink_reclaims_space() {
        let dir = tempdir().unwrap();
        let mut store = LocalStore::create(dir.path().join("s"), small_config()).unwrap();
        let mut ids = Vec::new();
        for i in 0..20u8 {
            ids.push(store.alloc(&[i; 20]).unwrap());
        }
        let before = store.mmap.len();
        for id in &ids {
            store.dealloc(id).unwrap();
        }
        store.shrink().unwrap();
        assert!(store.mmap.len() < before);
    }

    #[test]
    fn reopen_preserves_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s");
        let id = {
            let mut store = LocalStore::create(&path, small_config()).unwrap();
            store.alloc(b"persisted").unwrap()
        };
        let store = LocalStore::open(&path, small_config()).unwrap();
        assert_eq!(store.fetch(&id).unwrap(), b"persisted");
    }
}
