//! Content store contract and the in-memory implementation.
//!
//! A store persists chunk-sized blocks keyed by `(content id, block
//! index)`. It owns durability: the core treats a successful `put_block`
//! as a durability commit.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Failure taxonomy of the content store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("content not found")]
    NotFound,
    #[error("content store I/O failure: {0}")]
    Io(String),
}

/// Flat, content-addressed block storage.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Durably stores one block, replacing any previous version.
    async fn put_block(
        &self,
        content_id: &str,
        block_index: u64,
        bytes: Vec<u8>,
    ) -> Result<(), StoreError>;

    /// Reads `[offset, offset + len)` of a block; short when the block
    /// ends earlier. `NotFound` when the block was never stored.
    async fn get_block(
        &self,
        content_id: &str,
        block_index: u64,
        offset: u32,
        len: u32,
    ) -> Result<Vec<u8>, StoreError>;

    /// Drops every block of a content id.
    async fn delete_content(&self, content_id: &str) -> Result<(), StoreError>;

    /// Stored size in bytes of a content id.
    async fn stat(&self, content_id: &str) -> Result<u64, StoreError>;
}

/// Heap-backed store used by tests and RAM-only shares.
pub struct MemoryStore {
    block_size: u64,
    blocks: Mutex<HashMap<(String, u64), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new(block_size: u64) -> Self {
        MemoryStore { block_size, blocks: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, u64), Vec<u8>>> {
        self.blocks.lock().expect("content store lock poisoned")
    }

    /// Number of blocks currently stored, across all content ids.
    pub fn block_count(&self) -> usize {
        self.lock().len()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put_block(
        &self,
        content_id: &str,
        block_index: u64,
        bytes: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.lock().insert((content_id.to_string(), block_index), bytes);
        Ok(())
    }

    async fn get_block(
        &self,
        content_id: &str,
        block_index: u64,
        offset: u32,
        len: u32,
    ) -> Result<Vec<u8>, StoreError> {
        let blocks = self.lock();
        let block = blocks
            .get(&(content_id.to_string(), block_index))
            .ok_or(StoreError::NotFound)?;
        let start = (offset as usize).min(block.len());
        let end = (offset as usize + len as usize).min(block.len());
        Ok(block[start..end].to_vec())
    }

    async fn delete_content(&self, content_id: &str) -> Result<(), StoreError> {
        self.lock().retain(|(id, _), _| id != content_id);
        Ok(())
    }

    async fn stat(&self, content_id: &str) -> Result<u64, StoreError> {
        let blocks = self.lock();
        let mut found = false;
        let mut size = 0;
        for ((id, index), bytes) in blocks.iter() {
            if id == content_id {
                found = true;
                size = size.max(index * self.block_size + bytes.len() as u64);
            }
        }
        if found {
            Ok(size)
        } else {
            Err(StoreError::NotFound)
        }
    }
}
