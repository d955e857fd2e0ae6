//! The chunk/slice/block cache sitting between the NFS handlers and the
//! content store.
//!
//! [`SliceCache`] absorbs random writes without read-modify-write against
//! the backend: each file's address space is partitioned into fixed-size
//! chunks, each chunk collects write [`Slice`]s resolved newest-wins on
//! read. The [`BlockService`] above it splits logical I/O at chunk
//! boundaries and drives the [`TransferManager`], which ships materialized
//! blocks to a [`ContentStore`].
//!
//! Locking discipline: file-map shard, then the per-file state lock, then a
//! per-chunk lock, never the reverse order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::meta::ContentId;

pub mod block;
pub mod slice;
pub mod store;
pub mod transfer;

pub use block::{BlockError, BlockService, FlushOutcome};
pub use slice::{ChunkCache, Slice, BACKFILL_SEQ};
pub use store::{ContentStore, MemoryStore, StoreError};
pub use transfer::TransferManager;

/// Per-file cache state: reported size plus the chunk map.
struct FileState {
    /// Reported file size; the supremum of all written extents unless
    /// truncated.
    size: u64,
    chunks: BTreeMap<u64, Arc<Mutex<ChunkCache>>>,
}

/// One cached file. The sequence counter is per-file and starts at 1;
/// [`BACKFILL_SEQ`] stays reserved for store backfills.
struct FileCache {
    seq: AtomicU64,
    state: Mutex<FileState>,
}

impl FileCache {
    fn new() -> Self {
        FileCache {
            seq: AtomicU64::new(1),
            state: Mutex::new(FileState { size: 0, chunks: BTreeMap::new() }),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// A dirty chunk snapshot handed to the uploader.
pub struct DirtyBlock {
    pub chunk_index: u64,
    /// Zero-filled projection of the chunk up to its in-file extent.
    pub bytes: Vec<u8>,
    /// Highest sequence at snapshot time; [`SliceCache::mark_uploaded`]
    /// only clears the dirty flag if nothing newer landed since.
    pub snapshot_seq: u64,
}

/// Content-id-keyed write-back cache over a chunked address space.
pub struct SliceCache {
    chunk_size: u64,
    files: DashMap<ContentId, Arc<FileCache>>,
}

impl SliceCache {
    pub fn new(chunk_size: u64) -> Self {
        assert!(chunk_size.is_power_of_two(), "chunk size must be a power of two");
        SliceCache { chunk_size, files: DashMap::new() }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    fn file(&self, id: &ContentId) -> Arc<FileCache> {
        let entry = self.files.entry(id.clone()).or_insert_with(|| Arc::new(FileCache::new()));
        Arc::clone(&entry)
    }

    fn existing_file(&self, id: &ContentId) -> Option<Arc<FileCache>> {
        self.files.get(id).map(|f| Arc::clone(&f))
    }

    /// Appends a write slice to `(chunk_index, offset_in_chunk)`, creating
    /// the chunk on demand, and grows the reported size.
    pub fn write_slice(
        &self,
        id: &ContentId,
        chunk_index: u64,
        offset_in_chunk: u32,
        bytes: Vec<u8>,
    ) {
        debug_assert!(offset_in_chunk as u64 + bytes.len() as u64 <= self.chunk_size);
        if bytes.is_empty() {
            return;
        }
        let file = self.file(id);
        let seq = file.next_seq();
        let end = chunk_index * self.chunk_size + offset_in_chunk as u64 + bytes.len() as u64;

        let chunk = {
            let mut state = file.state.lock().expect("file cache lock poisoned");
            state.size = state.size.max(end);
            state.chunks.entry(chunk_index).or_insert_with(Default::default).clone()
        };
        chunk
            .lock()
            .expect("chunk lock poisoned")
            .insert(Slice { start: offset_in_chunk, seq, bytes });
    }

    /// Newest-wins read of a window within one chunk. `None` when the file
    /// or chunk is absent or any byte of the window is uncovered.
    pub fn read_slice(
        &self,
        id: &ContentId,
        chunk_index: u64,
        offset_in_chunk: u32,
        len: u32,
    ) -> Option<Vec<u8>> {
        let file = self.existing_file(id)?;
        let chunk = {
            let state = file.state.lock().expect("file cache lock poisoned");
            state.chunks.get(&chunk_index)?.clone()
        };
        let chunk = chunk.lock().expect("chunk lock poisoned");
        chunk.read(offset_in_chunk, len)
    }

    /// Installs store content as a chunk's base slice (sequence 0), so a
    /// following [`read_slice`](Self::read_slice) of the same window hits.
    pub fn backfill(&self, id: &ContentId, chunk_index: u64, bytes: Vec<u8>) {
        let file = self.file(id);
        let chunk = {
            let mut state = file.state.lock().expect("file cache lock poisoned");
            state.chunks.entry(chunk_index).or_insert_with(Default::default).clone()
        };
        chunk.lock().expect("chunk lock poisoned").backfill(bytes);
    }

    /// Reported size, if the file has cache state at all.
    pub fn size(&self, id: &ContentId) -> Option<u64> {
        let file = self.existing_file(id)?;
        let state = file.state.lock().expect("file cache lock poisoned");
        Some(state.size)
    }

    /// Collapses every dirty chunk's slice list into its minimal disjoint
    /// form. Projections are unchanged; the operation is idempotent.
    pub fn coalesce_writes(&self, id: &ContentId) {
        let Some(file) = self.existing_file(id) else { return };
        let chunks: Vec<_> = {
            let state = file.state.lock().expect("file cache lock poisoned");
            state.chunks.values().cloned().collect()
        };
        for chunk in chunks {
            let mut chunk = chunk.lock().expect("chunk lock poisoned");
            if chunk.is_dirty() {
                chunk.coalesce(|| file.next_seq());
            }
        }
    }

    /// Cuts the cached file to `new_size`: drops chunks strictly above the
    /// boundary chunk, clips the boundary chunk, updates the size.
    pub fn truncate(&self, id: &ContentId, new_size: u64) {
        let file = self.file(id);
        let boundary = new_size / self.chunk_size;
        let clipped = {
            let mut state = file.state.lock().expect("file cache lock poisoned");
            state.size = new_size;
            if new_size == 0 {
                state.chunks.clear();
                None
            } else {
                state.chunks.retain(|&idx, _| idx <= boundary);
                state.chunks.get(&boundary).cloned()
            }
        };
        if let Some(chunk) = clipped {
            let limit = (new_size - boundary * self.chunk_size) as u32;
            chunk.lock().expect("chunk lock poisoned").truncate_to(limit);
        }
    }

    /// Snapshots every dirty chunk intersecting `[offset, offset + count)`
    /// as an uploadable block image; a zero `count` means to end of file.
    /// Chunks are coalesced as a side effect.
    pub fn dirty_blocks(&self, id: &ContentId, offset: u64, count: u64) -> Vec<DirtyBlock> {
        let Some(file) = self.existing_file(id) else { return Vec::new() };
        let first = offset / self.chunk_size;
        let last = if count == 0 {
            u64::MAX
        } else {
            (offset + count - 1) / self.chunk_size
        };
        let (size, chunks): (u64, Vec<_>) = {
            let state = file.state.lock().expect("file cache lock poisoned");
            (
                state.size,
                state
                    .chunks
                    .range(first..=last)
                    .map(|(idx, c)| (*idx, c.clone()))
                    .collect(),
            )
        };
        let mut out = Vec::new();
        for (chunk_index, chunk) in chunks {
            let mut chunk = chunk.lock().expect("chunk lock poisoned");
            if !chunk.is_dirty() {
                continue;
            }
            chunk.coalesce(|| file.next_seq());
            let chunk_start = chunk_index * self.chunk_size;
            let in_file = size.saturating_sub(chunk_start).min(self.chunk_size) as u32;
            if in_file == 0 {
                continue;
            }
            out.push(DirtyBlock {
                chunk_index,
                bytes: chunk.materialize(in_file),
                snapshot_seq: chunk.max_seq(),
            });
        }
        out
    }

    /// Whether any chunk of the file still carries unflushed writes.
    pub fn has_dirty(&self, id: &ContentId) -> bool {
        let Some(file) = self.existing_file(id) else { return false };
        let chunks: Vec<_> = {
            let state = file.state.lock().expect("file cache lock poisoned");
            state.chunks.values().cloned().collect()
        };
        chunks
            .iter()
            .any(|c| c.lock().expect("chunk lock poisoned").is_dirty())
    }

    /// Clears a chunk's dirty flag after a completed upload, unless a
    /// newer slice landed since the snapshot was taken.
    pub fn mark_uploaded(&self, id: &ContentId, chunk_index: u64, snapshot_seq: u64) {
        let Some(file) = self.existing_file(id) else { return };
        let chunk = {
            let state = file.state.lock().expect("file cache lock poisoned");
            match state.chunks.get(&chunk_index) {
                Some(c) => c.clone(),
                None => return,
            }
        };
        let mut chunk = chunk.lock().expect("chunk lock poisoned");
        if chunk.max_seq() <= snapshot_seq {
            chunk.set_dirty(false);
        }
    }

    /// Drops all cache state of a file.
    pub fn delete(&self, id: &ContentId) {
        self.files.remove(id);
    }
}
