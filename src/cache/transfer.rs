//! Asynchronous block uploader between the slice cache and a content
//! store.
//!
//! Uploads flow through a bounded multi-consumer queue drained by a fixed
//! worker pool; a full queue blocks the enqueuing flush, which is where
//! fast clients observe flow control. Per-content-id in-flight counts let
//! a blocking finalize wait for everything queued before it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::{debug, error};

use crate::meta::ContentId;
use crate::shutdown::{CancelToken, Cancelled};

use super::store::{ContentStore, StoreError};
use super::SliceCache;

/// One block upload: a materialized chunk image plus the sequence
/// snapshot guarding the dirty-flag clear.
pub struct UploadJob {
    pub content_id: ContentId,
    pub block_index: u64,
    pub bytes: Vec<u8>,
    pub snapshot_seq: u64,
}

#[derive(Default)]
struct Inflight {
    counts: Mutex<HashMap<ContentId, usize>>,
    drained: Notify,
}

impl Inflight {
    fn inc(&self, id: &ContentId) {
        *self.counts.lock().expect("inflight lock poisoned").entry(id.clone()).or_insert(0) += 1;
    }

    fn dec(&self, id: &ContentId) {
        let mut counts = self.counts.lock().expect("inflight lock poisoned");
        if let Some(n) = counts.get_mut(id) {
            *n -= 1;
            if *n == 0 {
                counts.remove(id);
            }
        }
        drop(counts);
        self.drained.notify_waiters();
    }

    fn is_idle(&self, id: &ContentId) -> bool {
        !self.counts.lock().expect("inflight lock poisoned").contains_key(id)
    }
}

/// Owns the upload queue, its workers and the read-through path to the
/// content store.
pub struct TransferManager {
    store: Arc<dyn ContentStore>,
    queue: async_channel::Sender<UploadJob>,
    inflight: Arc<Inflight>,
}

impl TransferManager {
    /// Spawns `workers` upload workers over a queue bounded at
    /// `queue_depth`. Workers exit when the token fires or the manager is
    /// dropped.
    pub fn new(
        store: Arc<dyn ContentStore>,
        cache: Arc<SliceCache>,
        workers: usize,
        queue_depth: usize,
        cancel: CancelToken,
    ) -> Arc<Self> {
        let (tx, rx) = async_channel::bounded::<UploadJob>(queue_depth);
        let inflight = Arc::new(Inflight::default());

        for worker in 0..workers {
            let rx = rx.clone();
            let store = store.clone();
            let cache = cache.clone();
            let inflight = inflight.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let job = tokio::select! {
                        job = rx.recv() => match job {
                            Ok(job) => job,
                            Err(_) => break,
                        },
                        _ = cancel.cancelled() => break,
                    };
                    let outcome = store
                        .put_block(&job.content_id, job.block_index, job.bytes)
                        .await;
                    match outcome {
                        Ok(()) => {
                            cache.mark_uploaded(
                                &job.content_id,
                                job.block_index,
                                job.snapshot_seq,
                            );
                            debug!(
                                content_id = %job.content_id,
                                block = job.block_index,
                                "block uploaded"
                            );
                        }
                        Err(e) => {
                            // Chunk stays dirty; the next flush retries it.
                            error!(
                                content_id = %job.content_id,
                                block = job.block_index,
                                "block upload failed: {e}"
                            );
                        }
                    }
                    inflight.dec(&job.content_id);
                }
                debug!(worker, "upload worker stopped");
            });
        }

        Arc::new(TransferManager { store, queue: tx, inflight })
    }

    /// Queues a block for background upload. Blocks when the queue is
    /// full; errors only if the workers are gone or cancellation fired.
    pub async fn enqueue(&self, job: UploadJob, cancel: &CancelToken) -> Result<(), Cancelled> {
        cancel.check()?;
        self.inflight.inc(&job.content_id);
        let content_id = job.content_id.clone();
        tokio::select! {
            sent = self.queue.send(job) => {
                if sent.is_err() {
                    self.inflight.dec(&content_id);
                    return Err(Cancelled);
                }
                Ok(())
            }
            _ = cancel.cancelled() => {
                self.inflight.dec(&content_id);
                Err(Cancelled)
            }
        }
    }

    /// Waits until no queued or running upload remains for `content_id`.
    pub async fn wait_idle(&self, content_id: &ContentId, cancel: &CancelToken) -> Result<(), Cancelled> {
        loop {
            cancel.check()?;
            if self.inflight.is_idle(content_id) {
                return Ok(());
            }
            let notified = self.inflight.drained.notified();
            if self.inflight.is_idle(content_id) {
                return Ok(());
            }
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return Err(Cancelled),
            }
        }
    }

    /// Uploads one block inline, bypassing the queue. Used by the
    /// blocking finalize path where the reply must guarantee durability.
    pub async fn upload_now(
        &self,
        content_id: &ContentId,
        block_index: u64,
        bytes: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.store.put_block(content_id, block_index, bytes).await
    }

    /// Fetches a block range from the store for cache backfill.
    pub async fn fetch_block(
        &self,
        content_id: &ContentId,
        block_index: u64,
        offset: u32,
        len: u32,
    ) -> Result<Vec<u8>, StoreError> {
        self.store.get_block(content_id, block_index, offset, len).await
    }

    /// Removes every stored block of a content id.
    pub async fn delete_content(&self, content_id: &ContentId) -> Result<(), StoreError> {
        self.store.delete_content(content_id).await
    }
}
