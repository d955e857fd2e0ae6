//! Per-request execution context handed to every protocol handler.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cache::BlockService;
use crate::config::CoreConfig;
use crate::meta::{AuthContext, MetadataRepository};
use crate::shutdown::CancelToken;
use crate::xdr::nfs3;

/// Everything a handler needs: caller identity, the metadata repository,
/// the data path, and the process-wide write verifier.
///
/// Each connection gets its own clone; the engine replaces `auth` per
/// call from the decoded credential.
#[derive(Clone)]
pub struct Context {
    /// Port the server is listening on.
    pub local_port: u16,

    /// Client address, used for logging and retransmission tracking.
    pub client_addr: String,

    /// Caller identity decoded from the RPC credential.
    pub auth: AuthContext,

    /// Metadata repository backing the exported tree.
    pub repo: Arc<dyn MetadataRepository>,

    /// Data path for file content (slice cache + optional uploader).
    pub blocks: Arc<BlockService>,

    /// Process-wide verifier returned by WRITE and COMMIT; a change
    /// tells clients the server restarted and UNSTABLE data may be gone.
    pub write_verifier: nfs3::writeverf3,

    /// Export path clients mount.
    pub export_name: Arc<String>,

    /// Mount/unmount event channel, when anyone listens.
    pub mount_signal: Option<mpsc::Sender<bool>>,

    /// Duplicate-call suppression.
    pub transaction_tracker: Arc<super::TransactionTracker>,

    /// Cancellation signal for this connection.
    pub cancel: CancelToken,

    /// Data-path tunables (record caps, chunk size).
    pub config: Arc<CoreConfig>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("rpc::Context")
            .field("local_port", &self.local_port)
            .field("client_addr", &self.client_addr)
            .field("auth", &self.auth)
            .finish()
    }
}
