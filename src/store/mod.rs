//! The Store component: allocates opaque fixed-width ids for
//! byte payloads up to `ALLOCSIZE`, and fetches them back.

pub mod layout;
pub mod local;
pub mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;
use crate::id::Id;

/// A shared, non-owning handle to a backing store: Document, Array, and
/// Dict reference a Store via an indirection; they do not own it.
pub type SharedStore = Rc<RefCell<dyn Store>>;

/// A backing byte-payload allocator.
///
/// [`LocalStore`] is a local mmap-backed free-list allocator and the main
/// target of this crate. [`RemoteStore`] exposes the capability surface of
/// the alternate signed-bundle backend; it is out of scope beyond that
/// surface.
pub trait Store {
    /// Width, in bytes, of every id this store returns.
    fn idsize(&self) -> usize;

    /// Maximum payload bytes a single `alloc` call accepts.
    fn allocsize(&self) -> usize;

    fn alloc(&mut self, data: &[u8]) -> Result<Id> {
        self.alloc_with_hint(data, &[])
    }

    /// Allocate `data`. `replacing` names ids the caller no longer
    /// references as of this call (ownership of replaced chunks moves here).
    /// A store may use the hint to improve locality; it is never required
    /// to honor it, and the caller remains responsible for eventually
    /// deallocating `replacing` itself.
    fn alloc_with_hint(&mut self, data: &[u8], replacing: &[Id]) -> Result<Id>;

    fn fetch(&self, id: &Id) -> Result<Vec<u8>>;

    fn fetch_size(&self, id: &Id) -> Result<usize>;

    fn dealloc(&mut self, id: &Id) -> Result<()>;

    /// Coalesce free regions and truncate the backing file. A no-op
    /// by default; only stores that can reclaim space override it.
    fn shrink(&mut self) -> Result<()> {
        Ok(())
    }
}
