//! Shared harness: builds a request context over the in-memory metadata
//! repository and (optionally) the in-memory content store, and provides
//! helpers for driving procedures through serialized argument buffers.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use dittofs::cache::{BlockService, ContentStore, MemoryStore, SliceCache, TransferManager};
use dittofs::config::{CoreConfig, SparseReadFill};
use dittofs::meta::{CreatePayload, FileHandle, MemoryRepository, MetadataRepository};
use dittofs::protocol::nfs::v3::handle_nfs;
use dittofs::protocol::rpc::{Context, TransactionTracker};
use dittofs::shutdown::CancelToken;
use dittofs::xdr::{self, deserialize, nfs3, Serialize};

/// Deterministic write verifier used throughout the tests.
pub const TEST_VERIFIER_SEED: u64 = 0x5eed_0123_4567_89ab;

pub struct TestGateway {
    pub context: Context,
    pub repo: Arc<MemoryRepository>,
    pub cache: Arc<SliceCache>,
    pub store: Option<Arc<MemoryStore>>,
}

impl TestGateway {
    /// Gateway with no content store: flushes coalesce, misses zero-fill.
    pub fn cache_only() -> Self {
        build(None, SparseReadFill::Zero, TEST_VERIFIER_SEED)
    }

    /// Gateway backed by an in-memory content store.
    pub fn with_store() -> Self {
        let config = CoreConfig::default();
        let store = Arc::new(MemoryStore::new(config.chunk_size));
        build(Some(store), SparseReadFill::Zero, TEST_VERIFIER_SEED)
    }

    /// Like [`TestGateway::cache_only`] but with a different verifier,
    /// standing in for a restarted server process.
    pub fn restarted() -> Self {
        build(None, SparseReadFill::Zero, TEST_VERIFIER_SEED ^ 0xffff)
    }

    pub fn root(&self) -> FileHandle {
        self.repo.root()
    }

    /// Creates a regular file under the root.
    pub async fn add_file(&self, name: &str) -> FileHandle {
        let (handle, _) = self
            .repo
            .add_file_to_directory(
                &self.repo.root(),
                &name.into(),
                nfs3::sattr3::default(),
                CreatePayload::Regular,
            )
            .await
            .expect("create test file");
        handle
    }

    /// Creates a directory under the root.
    pub async fn add_dir(&self, name: &str) -> FileHandle {
        let (handle, _) = self
            .repo
            .add_file_to_directory(
                &self.repo.root(),
                &name.into(),
                nfs3::sattr3::default(),
                CreatePayload::Directory,
            )
            .await
            .expect("create test directory");
        handle
    }

    /// Runs one NFSv3 procedure and returns the raw reply bytes.
    pub async fn call(&self, proc: u32, args: &impl Serialize) -> Vec<u8> {
        let mut args_buf = Vec::new();
        args.serialize(&mut args_buf).expect("serialize args");
        self.call_raw(proc, args_buf).await
    }

    pub async fn call_raw(&self, proc: u32, args: Vec<u8>) -> Vec<u8> {
        let call = xdr::rpc::call_body {
            rpcvers: 2,
            prog: nfs3::PROGRAM,
            vers: nfs3::VERSION,
            proc,
            cred: xdr::rpc::opaque_auth::default(),
            verf: xdr::rpc::opaque_auth::default(),
        };
        let mut input = Cursor::new(args);
        let mut output = Cursor::new(Vec::new());
        handle_nfs(7, call, &mut input, &mut output, &self.context)
            .await
            .expect("handle_nfs");
        output.into_inner()
    }
}

/// Installs a log subscriber once so failing tests can be rerun with
/// `RUST_LOG=dittofs=trace` for wire-level detail.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

fn build(
    store: Option<Arc<MemoryStore>>,
    sparse: SparseReadFill,
    verifier_seed: u64,
) -> TestGateway {
    init_tracing();
    let config = Arc::new(CoreConfig {
        write_verifier_seed: Some(verifier_seed),
        sparse_read_fill: sparse,
        ..CoreConfig::default()
    });
    let repo = Arc::new(MemoryRepository::new());
    let cache = Arc::new(SliceCache::new(config.chunk_size));
    let transfer = store.clone().map(|s| {
        let s: Arc<dyn ContentStore> = s;
        TransferManager::new(
            s,
            cache.clone(),
            config.upload_workers,
            config.upload_queue_depth,
            CancelToken::detached(),
        )
    });
    let repo_dyn: Arc<dyn MetadataRepository> = repo.clone();
    let blocks = Arc::new(BlockService::new(repo_dyn, cache.clone(), transfer, sparse));
    let context = Context {
        local_port: 0,
        client_addr: "127.0.0.1:1234".to_string(),
        auth: dittofs::meta::AuthContext::anonymous(),
        repo: repo.clone(),
        blocks,
        write_verifier: verifier_seed.to_be_bytes(),
        export_name: Arc::new("/".to_string()),
        mount_signal: None,
        transaction_tracker: Arc::new(TransactionTracker::new(Duration::from_secs(60))),
        cancel: CancelToken::detached(),
        config,
    };
    TestGateway { context, repo, cache, store }
}

/// Splits a reply into (status, remaining argument cursor), skipping the
/// RPC acceptance envelope.
pub fn parse_reply(reply: &[u8]) -> (nfs3::nfsstat3, Cursor<Vec<u8>>) {
    use num_traits::FromPrimitive;

    let mut cursor = Cursor::new(reply.to_vec());
    let _msg = deserialize::<xdr::rpc::rpc_msg, _>(&mut cursor).expect("rpc reply envelope");
    let raw = deserialize::<u32, _>(&mut cursor).expect("status word");
    let status = nfs3::nfsstat3::from_u32(raw).expect("valid nfsstat3");
    (status, cursor)
}

/// Convenience wrapper asserting a successful status.
pub fn expect_ok(reply: &[u8]) -> Cursor<Vec<u8>> {
    let (status, cursor) = parse_reply(reply);
    assert_eq!(status, nfs3::nfsstat3::NFS3_OK, "unexpected status");
    cursor
}
