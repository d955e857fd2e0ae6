//! ONC RPC v2 engine (RFC 5531): record framing over TCP, call parsing,
//! credential handling, retransmission suppression and a bounded pool for
//! concurrent handler execution.
//!
//! Within one connection, responses may complete in any order (clients
//! match them by xid); each response's fragments are written contiguously
//! by the serialized connection writer.

mod context;
mod request_pool;
mod transaction_tracker;
pub(crate) mod wire;

pub use context::Context;
pub use request_pool::{RequestPool, ResponseBuffer, DEFAULT_HANDLER_CONCURRENCY};
pub use transaction_tracker::TransactionTracker;
pub use wire::{handle_rpc, write_fragment, SocketMessageHandler};
