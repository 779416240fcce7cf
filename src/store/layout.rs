//! On-disk word layout for the local slab allocator.
//!
//! The file is an array of 8-byte words, native endianness. Word 0 holds the
//! free-list head (a word address, 0 = empty list). Every other word belongs
//! to exactly one region, free or allocated:
//!
//! * Free region at word `a`: `q[a]` = next free region (0 = tail), `q[a+1]`
//!   = length in words, including this header word.
//! * Allocated region at word `a`: `q[a]` = payload length in bytes, payload
//!   bytes follow starting at word `a+1`.
//!
//! Ids are the little-endian 8-byte encoding of a word address, independent
//! of the file's native word endianness.

use crate::id::Id;

pub const WORD_SIZE: usize = 8;
pub const IDSIZE: usize = WORD_SIZE;

/// Word 0 is reserved for the free-list head pointer.
pub const HEADER_WORDS: u64 = 1;

/// Every region, free or allocated, is at least this many words: one header
/// word plus one word of payload/length.
pub const MIN_REGION_WORDS: u64 = 2;

pub fn allocsize_for_page(page_size: usize) -> usize {
    page_size - WORD_SIZE
}

/// Read the word at word index `w` from a raw byte buffer.
pub fn read_word(bytes: &[u8], w: u64) -> u64 {
    let off = (w as usize) * WORD_SIZE;
    u64::from_ne_bytes(bytes[off..off + WORD_SIZE].try_into().unwrap())
}

/// Write the word at word index `w` into a raw byte buffer.
pub fn write_word(bytes: &mut [u8], w: u64, value: u64) {
    let off = (w as usize) * WORD_SIZE;
    bytes[off..off + WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
}

/// Encode a word address as an id: little-endian, `IDSIZE` bytes.
pub fn addr_to_id(addr: u64) -> Id {
    Id(addr.to_le_bytes().to_vec())
}

/// Decode an id back into a word address. Callers validate `id.len() ==
/// IDSIZE` before calling this (via fsck/precondition checks).
pub fn id_to_addr(id: &Id) -> u64 {
    let mut buf = [0u8; WORD_SIZE];
    buf.copy_from_slice(&id.0[..WORD_SIZE]);
    u64::from_le_bytes(buf)
}

/// Words needed to hold a `len`-byte payload, including its header word.
pub fn words_for_payload(len: usize) -> u64 {
    let data_words = (len + WORD_SIZE - 1) / WORD_SIZE;
    (data_words as u64 + 1).max(MIN_REGION_WORDS)
}
