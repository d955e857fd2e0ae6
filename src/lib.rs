//! DittoFS: a userspace NFSv3 gateway over pluggable backends.
//!
//! One side speaks file-sharing wire protocols (NFSv3 per RFC 1813, plus
//! the MOUNT companion program); the other persists file content to a
//! pluggable content store while metadata lives in a pluggable metadata
//! repository. In between sits a chunk/slice/block cache that absorbs
//! random writes without read-modify-write against the backend and feeds
//! an asynchronous block uploader.
//!
//! ## Components
//!
//! - [`protocol::xdr`]: XDR codecs for every RPC/NFS/MOUNT record.
//! - [`protocol::rpc`]: record framing over TCP, call parsing,
//!   authentication context extraction, retransmission suppression, and
//!   a bounded pool for handler execution.
//! - [`meta`]: the metadata repository contract (handles, attributes,
//!   directory children, access checks) plus an in-memory
//!   implementation.
//! - [`cache`]: the slice cache, the block service above it, the content
//!   store contract and the background uploader.
//! - [`tcp`] / [`server`]: the TCP front-end and the assembly builder.
//!
//! ## Standards
//!
//! - RFC 1813: NFS version 3 protocol (procedures 0–21, MOUNT appendix)
//! - RFC 5531: ONC RPC version 2
//! - RFC 1832: XDR encoding

pub mod cache;
pub mod config;
pub mod meta;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod tcp;
pub mod write_counter;

pub use protocol::xdr;
