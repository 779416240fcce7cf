//! Ambient configuration surface.
//!
//! Every constant the local store needs has to be overridable so tests can
//! exercise growth/shrink without megabyte-scale fixtures.

/// Tunables for [`crate::store::local::LocalStore`].
///
/// `Default` matches the on-disk format: a real OS page size, word size
/// fixed at 8 bytes.
#[derive(Clone, Copy, Debug)]
pub struct StoreConfig {
    /// Page size in bytes. Must be a multiple of the word size (8) and at
    /// least two words.
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            page_size: page_size::get(),
        }
    }
}

impl StoreConfig {
    /// A config with a small page size, for tests that want to exercise
    /// allocator growth, shrink, and coalescing without large fixtures.
    pub fn small(page_size: usize) -> Self {
        assert!(
            page_size % crate::store::layout::WORD_SIZE == 0
                && page_size >= crate::store::layout::WORD_SIZE * 2,
            "page_size must be a multiple of the word size and hold at least two words"
        );
        StoreConfig { page_size }
    }
}
