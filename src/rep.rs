//! Rep: a thin fan-out chunker over a [`Store`] for payloads that may
//! exceed `ALLOCSIZE`. Used for immutable blobs — dictionary keys and
//! values — that never need the document's range-write machinery.

use crate::error::Result;
use crate::id::Id;
use crate::store::Store;

pub struct Rep;

impl Rep {
    pub fn alloc<S: Store + ?Sized>(store: &mut S, data: &[u8]) -> Result<Id> {
        Self::alloc_with_hint(store, data, &[])
    }

    /// Splits `data` into successive `ALLOCSIZE`-byte pieces (the last
    /// possibly shorter), allocates each, and concatenates the returned
    /// ids. `replacing` is forwarded as a dealloc-eligible hint on the
    /// first piece only, mirroring the chunker's original `replacing`
    /// parameter.
    pub fn alloc_with_hint<S: Store + ?Sized>(
        store: &mut S,
        data: &[u8],
        replacing: &[Id],
    ) -> Result<Id> {
        let allocsize = store.allocsize().max(1);
        let mut concat = Vec::new();
        let mut pieces = data.chunks(allocsize).peekable();
        if pieces.peek().is_none() {
            return Ok(Id(concat));
        }
        for (i, piece) in pieces.enumerate() {
            let hint: &[Id] = if i == 0 { replacing } else { &[] };
            let id = store.alloc_with_hint(piece, hint)?;
            concat.extend_from_slice(id.as_bytes());
        }
        Ok(Id(concat))
    }

    /// Splits the concatenated id into `IDSIZE` pieces, fetches each, and
    /// concatenates the payloads.
    pub fn fetch<S: Store + ?Sized>(store: &S, id_concat: &Id) -> Result<Vec<u8>> {
        let idsize = store.idsize();
        let mut out = Vec::new();
        for piece in id_concat.as_bytes().chunks(idsize.max(1)) {
            let id = Id(piece.to_vec());
            out.extend_from_slice(&store.fetch(&id)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::LocalStore;
    use tempfile::tempdir;

    #[test]
    fn roundtrips_payload_spanning_multiple_chunks() {
        let dir = tempdir().unwrap();
        let mut store = LocalStore::create(dir.path().join("s"), StoreConfig::small(64)).unwrap();
        let data: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();
        let id = Rep::alloc(&mut store, &data).unwrap();
        assert_eq!(Rep::fetch(&store, &id).unwrap(), data);
    }

    #[test]
    fn roundtrips_empty_payload() {
        let dir = tempdir().unwrap();
        let mut store = LocalStore::create(dir.path().join("s"), StoreConfig::small(64)).unwrap();
        let id = Rep::alloc(&mut store, &[]).unwrap();
        assert_eq!(Rep::fetch(&store, &id).unwrap(), Vec::<u8>::new());
    }
}
