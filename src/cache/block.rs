//! Block service: the logical-I/O layer over the slice cache.
//!
//! Handlers speak file handles and byte ranges; this layer resolves the
//! handle to a content id, splits ranges at chunk boundaries, applies the
//! sparse-read policy on residual misses and drives the transfer manager
//! for read-through backfill and flushes.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

use crate::config::SparseReadFill;
use crate::meta::{ContentId, FileHandle, MetaError, MetadataRepository};
use crate::shutdown::{CancelToken, Cancelled};
use crate::xdr::nfs3;

use super::store::StoreError;
use super::transfer::{TransferManager, UploadJob};
use super::SliceCache;

/// Failure taxonomy of the data path below the handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error(transparent)]
    Meta(#[from] MetaError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("operation cancelled")]
    Cancelled,
}

impl From<Cancelled> for BlockError {
    fn from(_: Cancelled) -> Self {
        BlockError::Cancelled
    }
}

impl From<&BlockError> for nfs3::nfsstat3 {
    fn from(e: &BlockError) -> nfs3::nfsstat3 {
        match e {
            BlockError::Meta(m) => m.into(),
            BlockError::Store(_) | BlockError::Cancelled => nfs3::nfsstat3::NFS3ERR_IO,
        }
    }
}

impl From<BlockError> for nfs3::nfsstat3 {
    fn from(e: BlockError) -> nfs3::nfsstat3 {
        (&e).into()
    }
}

/// What a flush actually did.
#[derive(Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was dirty.
    Clean,
    /// Cache-only mode: dirty chunks were coalesced in place.
    Coalesced,
    /// This many blocks were queued for background upload.
    Enqueued(usize),
    /// Every dirty block in scope reached the content store.
    Durable,
}

/// The data-path facade the NFS handlers use for file content.
pub struct BlockService {
    repo: Arc<dyn MetadataRepository>,
    cache: Arc<SliceCache>,
    transfer: Option<Arc<TransferManager>>,
    sparse: SparseReadFill,
}

impl BlockService {
    pub fn new(
        repo: Arc<dyn MetadataRepository>,
        cache: Arc<SliceCache>,
        transfer: Option<Arc<TransferManager>>,
        sparse: SparseReadFill,
    ) -> Self {
        BlockService { repo, cache, transfer, sparse }
    }

    pub fn cache(&self) -> &Arc<SliceCache> {
        &self.cache
    }

    async fn content_id(&self, handle: &FileHandle) -> Result<ContentId, MetaError> {
        self.repo.content_id(handle).await
    }

    /// Writes `data` at `offset`, split into one slice per chunk touched.
    pub async fn write(
        &self,
        handle: &FileHandle,
        offset: u64,
        data: &[u8],
        cancel: &CancelToken,
    ) -> Result<(), BlockError> {
        cancel.check()?;
        if data.is_empty() {
            return Ok(());
        }
        let id = self.content_id(handle).await?;
        let chunk_size = self.cache.chunk_size();

        let mut written = 0_u64;
        while written < data.len() as u64 {
            let pos = offset + written;
            let chunk_index = pos / chunk_size;
            let offset_in_chunk = (pos % chunk_size) as u32;
            let take = (chunk_size - offset_in_chunk as u64).min(data.len() as u64 - written);
            self.cache.write_slice(
                &id,
                chunk_index,
                offset_in_chunk,
                data[written as usize..(written + take) as usize].to_vec(),
            );
            written += take;
        }
        Ok(())
    }

    /// Reads exactly `count` bytes at `offset`.
    ///
    /// The caller clamps the range against the file size; every residual
    /// miss below that boundary is filled per the sparse policy, so a
    /// successful result is always full-length.
    pub async fn read(
        &self,
        handle: &FileHandle,
        offset: u64,
        count: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, BlockError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let id = self.content_id(handle).await?;
        let chunk_size = self.cache.chunk_size();
        let end = offset + count as u64;

        let mut out = Vec::with_capacity(count as usize);
        let mut pos = offset;
        while pos < end {
            let chunk_index = pos / chunk_size;
            let offset_in_chunk = (pos % chunk_size) as u32;
            let take = ((chunk_size - offset_in_chunk as u64).min(end - pos)) as u32;

            match self.cache.read_slice(&id, chunk_index, offset_in_chunk, take) {
                Some(bytes) => out.extend_from_slice(&bytes),
                None => {
                    self.fill_chunk(&id, chunk_index, cancel).await?;
                    let bytes = self
                        .cache
                        .read_slice(&id, chunk_index, offset_in_chunk, take)
                        .expect("backfilled chunk must cover the window");
                    out.extend_from_slice(&bytes);
                }
            }
            pos += take as u64;
        }
        Ok(out)
    }

    /// Resolves a chunk-level miss by installing a base slice: the block
    /// from the content store when one exists, zeros otherwise (or an
    /// error under the `fail` policy).
    async fn fill_chunk(
        &self,
        id: &ContentId,
        chunk_index: u64,
        cancel: &CancelToken,
    ) -> Result<(), BlockError> {
        cancel.check()?;
        let chunk_size = self.cache.chunk_size();

        let fetched = match &self.transfer {
            Some(transfer) => {
                match transfer.fetch_block(id, chunk_index, 0, chunk_size as u32).await {
                    Ok(bytes) => {
                        debug!(content_id = %id, block = chunk_index, "cache miss filled from store");
                        Some(bytes)
                    }
                    Err(StoreError::NotFound) => None,
                    Err(e) => {
                        error!(content_id = %id, block = chunk_index, "block fetch failed: {e}");
                        if self.sparse == SparseReadFill::Fail {
                            return Err(e.into());
                        }
                        None
                    }
                }
            }
            None => None,
        };

        let mut base = match fetched {
            Some(bytes) => bytes,
            None if self.sparse == SparseReadFill::Fail => {
                return Err(StoreError::NotFound.into())
            }
            None => Vec::new(),
        };
        base.resize(chunk_size as usize, 0);
        self.cache.backfill(id, chunk_index, base);
        Ok(())
    }

    /// Non-blocking flush: coalesce in cache-only mode, queue dirty
    /// blocks for background upload otherwise. Backpressure from a full
    /// upload queue is the only wait.
    pub async fn flush(
        &self,
        handle: &FileHandle,
        cancel: &CancelToken,
    ) -> Result<FlushOutcome, BlockError> {
        let id = self.content_id(handle).await?;
        let Some(transfer) = &self.transfer else {
            if !self.cache.has_dirty(&id) {
                return Ok(FlushOutcome::Clean);
            }
            self.cache.coalesce_writes(&id);
            return Ok(FlushOutcome::Coalesced);
        };

        let blocks = self.cache.dirty_blocks(&id, 0, 0);
        if blocks.is_empty() {
            return Ok(FlushOutcome::Clean);
        }
        let queued = blocks.len();
        for block in blocks {
            transfer
                .enqueue(
                    UploadJob {
                        content_id: id.clone(),
                        block_index: block.chunk_index,
                        bytes: block.bytes,
                        snapshot_seq: block.snapshot_seq,
                    },
                    cancel,
                )
                .await?;
        }
        Ok(FlushOutcome::Enqueued(queued))
    }

    /// Blocking flush of `[offset, offset + count)` (`count == 0` means to
    /// end of file). On return with a transfer manager configured, every
    /// dirty block in the range is durable in the content store.
    pub async fn flush_range_durable(
        &self,
        handle: &FileHandle,
        offset: u64,
        count: u64,
        cancel: &CancelToken,
    ) -> Result<FlushOutcome, BlockError> {
        let id = self.content_id(handle).await?;
        let Some(transfer) = &self.transfer else {
            if !self.cache.has_dirty(&id) {
                return Ok(FlushOutcome::Clean);
            }
            self.cache.coalesce_writes(&id);
            return Ok(FlushOutcome::Coalesced);
        };

        // Settle background uploads first so a stale in-flight image can
        // never overwrite what is uploaded here.
        transfer.wait_idle(&id, cancel).await?;
        for block in self.cache.dirty_blocks(&id, offset, count) {
            cancel.check()?;
            transfer.upload_now(&id, block.chunk_index, block.bytes).await?;
            self.cache.mark_uploaded(&id, block.chunk_index, block.snapshot_seq);
        }
        Ok(FlushOutcome::Durable)
    }

    /// Blocking full flush used on close: awaits in-flight uploads, then
    /// uploads everything still dirty. Success is a durability guarantee.
    pub async fn flush_and_finalize(
        &self,
        handle: &FileHandle,
        cancel: &CancelToken,
    ) -> Result<FlushOutcome, BlockError> {
        self.flush_range_durable(handle, 0, 0, cancel).await
    }

    /// Applies a SETATTR size change to the cache.
    pub async fn truncate(&self, handle: &FileHandle, new_size: u64) -> Result<(), BlockError> {
        let id = self.content_id(handle).await?;
        self.cache.truncate(&id, new_size);
        Ok(())
    }

    /// Drops cache and store state of a deleted file's content.
    pub async fn delete_content(&self, id: &ContentId) {
        self.cache.delete(id);
        if let Some(transfer) = &self.transfer {
            if let Err(e) = transfer.delete_content(id).await {
                error!(content_id = %id, "content delete failed: {e}");
            }
        }
    }
}
