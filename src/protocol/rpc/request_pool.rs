//! Bounded concurrent execution of decoded RPC records.
//!
//! One reader task per connection feeds complete records into the pool;
//! each record runs as its own task gated by a server-wide semaphore, so
//! handlers for a connection may complete out of order. Clients match
//! replies by xid. The connection's writer drains the result channel and
//! emits each response's fragments contiguously, which keeps the write
//! side serialized per connection.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error};

use crate::protocol::rpc;

/// Default size of the server-wide handler pool.
pub const DEFAULT_HANDLER_CONCURRENCY: usize = 64;

/// Response bytes accumulated by a handler before framing.
pub struct ResponseBuffer {
    buffer: Vec<u8>,
    has_content: bool,
}

impl ResponseBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buffer: Vec::with_capacity(capacity), has_content: false }
    }

    pub fn get_mut_buffer(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }

    pub fn mark_has_content(&mut self) {
        self.has_content = true;
    }

    pub fn has_content(&self) -> bool {
        self.has_content
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

/// Result of one processed record: a response to send, nothing (dropped
/// retransmission), or a processing error that tears the connection down.
pub type PoolResult = Result<Option<ResponseBuffer>, anyhow::Error>;

/// Initial response buffer allocation.
const DEFAULT_RESPONSE_BUFFER_CAPACITY: usize = 8192;

/// Submission handle for one connection into the shared handler pool.
#[derive(Clone)]
pub struct RequestPool {
    permits: Arc<Semaphore>,
    result_sender: mpsc::UnboundedSender<PoolResult>,
}

impl RequestPool {
    /// Creates a submission handle that reports results on `result_sender`.
    /// `permits` bounds handler concurrency across all connections.
    pub fn new(permits: Arc<Semaphore>, result_sender: mpsc::UnboundedSender<PoolResult>) -> Self {
        RequestPool { permits, result_sender }
    }

    /// Schedules one complete RPC record for execution.
    ///
    /// Returns immediately; the handler runs once a permit is available
    /// and its result is delivered through the connection's channel.
    pub fn submit(&self, record: Vec<u8>, context: rpc::Context) {
        let permits = self.permits.clone();
        let results = self.result_sender.clone();
        let record_len = record.len();

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // pool closed during shutdown
            };
            debug!(record_len, "running handler");

            let mut output = ResponseBuffer::with_capacity(DEFAULT_RESPONSE_BUFFER_CAPACITY);
            let mut input = std::io::Cursor::new(record);
            let result = {
                let mut cursor = std::io::Cursor::new(output.get_mut_buffer());
                rpc::wire::handle_rpc(&mut input, &mut cursor, record_len, context).await
            };

            let outcome = match result {
                Ok(true) => {
                    output.mark_has_content();
                    Ok(Some(output))
                }
                Ok(false) => Ok(None),
                Err(e) => Err(e),
            };
            if results.send(outcome).is_err() {
                error!("connection closed before handler result could be delivered");
            }
        });
    }
}
