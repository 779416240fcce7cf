//! A content-addressed byte-storage stack with layered data structures: a
//! local free-list slab allocator at the bottom, a chunked resizeable
//! document above it, a fixed-stride array above that, and a
//! collision-splitting hash table backing a keyed dictionary on top.

pub mod array;
pub mod config;
pub mod dict;
pub mod document;
pub mod error;
pub mod hashtable;
pub mod id;
pub mod rep;
pub mod store;
pub mod stream;

pub use array::FixedArray;
pub use config::StoreConfig;
pub use dict::Dict;
pub use document::{Document, ReadOnlyDocument};
pub use error::{Result, StoreError};
pub use hashtable::HashTable;
pub use id::Id;
pub use rep::Rep;
pub use store::{LocalStore, RemoteStore, SharedStore, Store};
pub use stream::{ItemSource, IterItemSource};
