//! Capability surface of the alternate remote signed-bundle backend.
//!
//! The actual network behavior is out of scope here; only its shape as a
//! [`Store`] implementation is in scope, so callers can write `Rep`/
//! `Document` code generic over local or remote storage. This stub never
//! reaches the network: every mutating operation returns
//! [`StoreError::Unsupported`], except `dealloc`, which the core treats as a
//! no-op on backends like this one.

use super::Store;
use crate::error::{Result, StoreError};
use crate::id::Id;

/// Identifies a signed-bundle backend: an endpoint and signing identity, in
/// the shape `original_source/rep/r.py`'s bundle poster takes, without a
/// transport.
#[derive(Clone, Debug)]
pub struct RemoteStoreConfig {
    pub endpoint: String,
    pub idsize: usize,
    pub allocsize: usize,
}

pub struct RemoteStore {
    config: RemoteStoreConfig,
}

impl RemoteStore {
    pub fn new(config: RemoteStoreConfig) -> Self {
        RemoteStore { config }
    }
}

impl Store for RemoteStore {
    fn idsize(&self) -> usize {
        self.config.idsize
    }

    fn allocsize(&self) -> usize {
        self.config.allocsize
    }

    fn alloc_with_hint(&mut self, _data: &[u8], _replacing: &[Id]) -> Result<Id> {
        Err(StoreError::Unsupported("remote store alloc"))
    }

    fn fetch(&self, _id: &Id) -> Result<Vec<u8>> {
        Err(StoreError::Unsupported("remote store fetch"))
    }

    fn fetch_size(&self, _id: &Id) -> Result<usize> {
        Err(StoreError::Unsupported("remote store fetch_size"))
    }

    fn dealloc(&mut self, _id: &Id) -> Result<()> {
        Ok(())
    }
}
