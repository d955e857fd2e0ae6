//! Protocol front-ends served by the RPC engine.
//!
//! - `v3`: the 22 NFSv3 procedures (RFC 1813), dispatched through a flat
//!   table indexed by procedure number.
//! - `mount`: the MOUNT companion program (RFC 1813 Appendix I) that hands
//!   out the root file handle.

pub mod mount;
pub mod v3;
