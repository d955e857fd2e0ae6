//! Slice cache and block service properties: newest-wins projection,
//! coalesce idempotence, size monotonicity, truncation, chunk-boundary
//! splitting, sparse fill and store backfill.

use std::sync::Arc;

use dittofs::cache::{
    BlockService, ContentStore, MemoryStore, SliceCache, TransferManager,
};
use dittofs::config::SparseReadFill;
use dittofs::meta::{CreatePayload, FileHandle, MemoryRepository, MetadataRepository};
use dittofs::shutdown::CancelToken;
use dittofs::xdr::nfs3;

const CHUNK: u64 = 4096;

fn content_id() -> String {
    "test-content".to_string()
}

/// Reference model: apply the same writes to a flat zero buffer.
fn reference_apply(image: &mut Vec<u8>, offset: usize, bytes: &[u8]) {
    if image.len() < offset + bytes.len() {
        image.resize(offset + bytes.len(), 0);
    }
    image[offset..offset + bytes.len()].copy_from_slice(bytes);
}

#[test]
fn projection_matches_reference_model() {
    let cache = SliceCache::new(CHUNK);
    let id = content_id();
    let mut reference = Vec::new();

    let writes: &[(u32, Vec<u8>)] = &[
        (0, vec![b'a'; 100]),
        (50, vec![b'b'; 100]),
        (400, vec![b'c'; 32]),
        (10, vec![b'd'; 10]),
        (140, vec![b'e'; 300]),
    ];
    for (offset, bytes) in writes {
        cache.write_slice(&id, 0, *offset, bytes.clone());
        reference_apply(&mut reference, *offset as usize, bytes);
    }

    let projected = cache
        .read_slice(&id, 0, 0, reference.len() as u32)
        .expect("window fully covered");
    assert_eq!(projected, reference);
}

#[test]
fn overlapping_writes_newest_wins() {
    let cache = SliceCache::new(1 << 22);
    let id = content_id();
    cache.write_slice(&id, 0, 0, vec![b'A'; 1024]);
    cache.write_slice(&id, 0, 512, vec![b'B'; 1024]);

    let bytes = cache.read_slice(&id, 0, 0, 1536).expect("covered");
    assert_eq!(&bytes[..512], &[b'A'; 512][..]);
    assert_eq!(&bytes[512..], &[b'B'; 1024][..]);
}

#[test]
fn partial_coverage_is_a_miss() {
    let cache = SliceCache::new(CHUNK);
    let id = content_id();
    cache.write_slice(&id, 0, 100, vec![1; 50]);

    assert!(cache.read_slice(&id, 0, 0, 200).is_none());
    assert!(cache.read_slice(&id, 0, 100, 50).is_some());
    assert!(cache.read_slice(&id, 1, 0, 1).is_none(), "absent chunk is a miss");
    assert!(cache.read_slice(&"other".to_string(), 0, 0, 1).is_none(), "absent file is a miss");
}

#[test]
fn coalesce_is_idempotent_and_preserves_reads() {
    let cache = SliceCache::new(CHUNK);
    let id = content_id();
    cache.write_slice(&id, 0, 0, vec![1; 128]);
    cache.write_slice(&id, 0, 64, vec![2; 128]);
    cache.write_slice(&id, 0, 512, vec![3; 64]);

    let before = cache.read_slice(&id, 0, 0, 192).expect("covered before");
    cache.coalesce_writes(&id);
    let after = cache.read_slice(&id, 0, 0, 192).expect("covered after");
    assert_eq!(before, after);
    // the gap stays a miss after coalescing
    assert!(cache.read_slice(&id, 0, 0, 576).is_none());

    cache.coalesce_writes(&id);
    let again = cache.read_slice(&id, 0, 0, 192).expect("covered twice coalesced");
    assert_eq!(before, again);
}

#[test]
fn size_grows_monotonically_under_writes() {
    let cache = SliceCache::new(CHUNK);
    let id = content_id();
    let mut last = 0;
    for (chunk, offset, len) in [(0u64, 0u32, 10usize), (0, 500, 100), (2, 0, 1), (1, 8, 8)] {
        cache.write_slice(&id, chunk, offset, vec![0xab; len]);
        let size = cache.size(&id).expect("size tracked");
        assert!(size >= last, "size shrank from {last} to {size}");
        assert!(size >= chunk * CHUNK + offset as u64 + len as u64);
        last = size;
    }
}

#[test]
fn truncate_drops_and_clips() {
    let cache = SliceCache::new(CHUNK);
    let id = content_id();
    cache.write_slice(&id, 0, 0, vec![1; 100]);
    cache.write_slice(&id, 1, 0, vec![2; 100]);
    cache.write_slice(&id, 2, 0, vec![3; 100]);
    assert_eq!(cache.size(&id), Some(2 * CHUNK + 100));

    // Boundary inside chunk 1: chunk 2 dropped entirely, chunk 1 clipped.
    cache.truncate(&id, CHUNK + 50);
    assert_eq!(cache.size(&id), Some(CHUNK + 50));
    assert_eq!(cache.read_slice(&id, 1, 0, 50).expect("clipped head"), vec![2; 50]);
    assert!(cache.read_slice(&id, 1, 0, 100).is_none());
    assert!(cache.read_slice(&id, 2, 0, 1).is_none());

    // Truncate to zero clears everything.
    cache.truncate(&id, 0);
    assert_eq!(cache.size(&id), Some(0));
    assert!(cache.read_slice(&id, 0, 0, 1).is_none());
}

#[test]
fn dirty_block_snapshot_and_upload_acknowledgement() {
    let cache = SliceCache::new(CHUNK);
    let id = content_id();
    cache.write_slice(&id, 0, 0, vec![9; 64]);
    assert!(cache.has_dirty(&id));

    let blocks = cache.dirty_blocks(&id, 0, 0);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].chunk_index, 0);
    assert_eq!(&blocks[0].bytes[..64], &[9; 64][..]);

    // A write that lands after the snapshot keeps the chunk dirty.
    cache.write_slice(&id, 0, 0, vec![8; 8]);
    cache.mark_uploaded(&id, 0, blocks[0].snapshot_seq);
    assert!(cache.has_dirty(&id), "newer slice must survive the acknowledgement");

    let blocks = cache.dirty_blocks(&id, 0, 0);
    cache.mark_uploaded(&id, 0, blocks[0].snapshot_seq);
    assert!(!cache.has_dirty(&id));
}

async fn file_service(
    store: Option<Arc<MemoryStore>>,
    sparse: SparseReadFill,
) -> (BlockService, FileHandle, Arc<SliceCache>) {
    let repo = Arc::new(MemoryRepository::new());
    let (handle, _) = repo
        .add_file_to_directory(
            &repo.root(),
            &"blob".into(),
            nfs3::sattr3::default(),
            CreatePayload::Regular,
        )
        .await
        .expect("create file");
    let cache = Arc::new(SliceCache::new(CHUNK));
    let transfer = store.map(|s| {
        let s: Arc<dyn ContentStore> = s;
        TransferManager::new(s, cache.clone(), 2, 8, CancelToken::detached())
    });
    let repo: Arc<dyn MetadataRepository> = repo;
    let service = BlockService::new(repo, cache.clone(), transfer, sparse);
    (service, handle, cache)
}

#[tokio::test]
async fn write_splits_at_chunk_boundaries() {
    let (service, handle, cache) = file_service(None, SparseReadFill::Zero).await;
    let cancel = CancelToken::detached();

    // 300 bytes straddling the first chunk boundary.
    let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
    let offset = CHUNK - 100;
    service.write(&handle, offset, &data, &cancel).await.expect("write");

    let id = "mem-2".to_string(); // first created file in a fresh repository
    assert_eq!(
        cache.read_slice(&id, 0, (CHUNK - 100) as u32, 100).expect("tail of chunk 0"),
        &data[..100]
    );
    assert_eq!(cache.read_slice(&id, 1, 0, 200).expect("head of chunk 1"), &data[100..]);

    let read = service.read(&handle, offset, 300, &cancel).await.expect("read back");
    assert_eq!(read, data);
}

#[tokio::test]
async fn residual_miss_zero_fills_in_cache_only_mode() {
    let (service, handle, _cache) = file_service(None, SparseReadFill::Zero).await;
    let cancel = CancelToken::detached();

    service.write(&handle, 100, &[7; 50], &cancel).await.expect("write");
    let read = service.read(&handle, 0, 200, &cancel).await.expect("read");
    assert_eq!(&read[..100], &[0; 100][..], "hole before the write is zero");
    assert_eq!(&read[100..150], &[7; 50][..]);
    assert_eq!(&read[150..], &[0; 50][..], "hole after the write is zero");
}

#[tokio::test]
async fn residual_miss_fails_under_fail_policy() {
    let store = Arc::new(MemoryStore::new(CHUNK));
    let (service, handle, _cache) = file_service(Some(store), SparseReadFill::Fail).await;
    let cancel = CancelToken::detached();

    let err = service.read(&handle, 0, 10, &cancel).await.expect_err("no block anywhere");
    let status: nfs3::nfsstat3 = err.into();
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_IO);
}

#[tokio::test]
async fn cache_miss_backfills_from_store_and_keeps_writes() {
    let store = Arc::new(MemoryStore::new(CHUNK));
    store
        .put_block("mem-2", 0, vec![b'S'; CHUNK as usize])
        .await
        .expect("seed store");
    let (service, handle, _cache) = file_service(Some(store), SparseReadFill::Zero).await;
    let cancel = CancelToken::detached();

    // A cached write overlays the store content even though the store
    // block arrives later via backfill.
    service.write(&handle, 10, &[b'W'; 20], &cancel).await.expect("write");
    let read = service.read(&handle, 0, 64, &cancel).await.expect("read");
    assert_eq!(&read[..10], &[b'S'; 10][..]);
    assert_eq!(&read[10..30], &[b'W'; 20][..]);
    assert_eq!(&read[30..], &[b'S'; 34][..]);
}

#[tokio::test]
async fn background_flush_enqueues_and_eventually_uploads() {
    use dittofs::cache::FlushOutcome;

    let store = Arc::new(MemoryStore::new(CHUNK));
    let (service, handle, _cache) = file_service(Some(store.clone()), SparseReadFill::Zero).await;
    let cancel = CancelToken::detached();

    service.write(&handle, 0, &[b'q'; 32], &cancel).await.expect("write");
    let outcome = service.flush(&handle, &cancel).await.expect("flush");
    assert_eq!(outcome, FlushOutcome::Enqueued(1));

    // The upload happens on a background worker; poll briefly.
    for _ in 0..100 {
        if store.block_count() == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(store.block_count(), 1);
}

#[tokio::test]
async fn cache_only_flush_coalesces() {
    use dittofs::cache::FlushOutcome;

    let (service, handle, _cache) = file_service(None, SparseReadFill::Zero).await;
    let cancel = CancelToken::detached();

    assert_eq!(service.flush(&handle, &cancel).await.expect("flush"), FlushOutcome::Clean);
    service.write(&handle, 0, &[1; 16], &cancel).await.expect("write");
    assert_eq!(service.flush(&handle, &cancel).await.expect("flush"), FlushOutcome::Coalesced);
}

#[tokio::test]
async fn finalize_makes_dirty_blocks_durable() {
    let store = Arc::new(MemoryStore::new(CHUNK));
    let (service, handle, cache) = file_service(Some(store.clone()), SparseReadFill::Zero).await;
    let cancel = CancelToken::detached();

    service.write(&handle, 0, &[b'x'; 128], &cancel).await.expect("write");
    assert_eq!(store.block_count(), 0);

    service.flush_and_finalize(&handle, &cancel).await.expect("finalize");
    assert_eq!(store.block_count(), 1);
    assert!(!cache.has_dirty(&"mem-2".to_string()));

    let stored = store.get_block("mem-2", 0, 0, 128).await.expect("block stored");
    assert_eq!(stored, vec![b'x'; 128]);
}
