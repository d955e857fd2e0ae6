//! Argument and result records for the file-content procedures:
//! READ (6), WRITE (7), LINK (15) and COMMIT (21), per RFC 1813.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::*;

/// READ arguments (RFC 1813 section 3.3.6).
#[derive(Debug, Default)]
pub struct READ3args {
    pub file: nfs_fh3,
    /// Position within the file to begin reading.
    pub offset: offset3,
    /// Number of bytes of data to read.
    pub count: count3,
}
DeserializeStruct!(READ3args, file, offset, count);
SerializeStruct!(READ3args, file, offset, count);

/// Successful READ result.
#[derive(Debug, Default)]
pub struct READ3resok {
    pub file_attributes: post_op_attr,
    /// Number of bytes actually read.
    pub count: count3,
    /// True if the read reached the end of file.
    pub eof: bool,
    pub data: Vec<u8>,
}
DeserializeStruct!(READ3resok, file_attributes, count, eof, data);
SerializeStruct!(READ3resok, file_attributes, count, eof, data);

/// Stability level requested by a WRITE (RFC 1813 section 3.3.7).
///
/// UNSTABLE data may sit in the server's cache until COMMIT; the two sync
/// levels demand durability before the reply.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum stable_how {
    #[default]
    UNSTABLE = 0,
    DATA_SYNC = 1,
    FILE_SYNC = 2,
}
SerializeEnum!(stable_how);
DeserializeEnum!(stable_how);

/// WRITE arguments (RFC 1813 section 3.3.7).
#[derive(Debug, Default)]
pub struct WRITE3args {
    pub file: nfs_fh3,
    /// Position within the file to begin writing.
    pub offset: offset3,
    /// Number of bytes of data; must equal `data.len()`.
    pub count: count3,
    pub stable: stable_how,
    pub data: Vec<u8>,
}
DeserializeStruct!(WRITE3args, file, offset, count, stable, data);
SerializeStruct!(WRITE3args, file, offset, count, stable, data);

/// Successful WRITE result.
#[derive(Debug, Default)]
pub struct WRITE3resok {
    pub file_wcc: wcc_data,
    /// Number of bytes actually written.
    pub count: count3,
    /// Stability actually achieved; may be stronger than requested.
    pub committed: stable_how,
    /// Per-server-lifetime verifier for restart detection.
    pub verf: writeverf3,
}
DeserializeStruct!(WRITE3resok, file_wcc, count, committed, verf);
SerializeStruct!(WRITE3resok, file_wcc, count, committed, verf);

/// COMMIT arguments (RFC 1813 section 3.3.21). A zero count means
/// "everything from `offset` to the end of file".
#[derive(Debug, Default)]
pub struct COMMIT3args {
    pub file: nfs_fh3,
    pub offset: offset3,
    pub count: count3,
}
DeserializeStruct!(COMMIT3args, file, offset, count);
SerializeStruct!(COMMIT3args, file, offset, count);

/// Successful COMMIT result.
#[derive(Debug, Default)]
pub struct COMMIT3resok {
    pub file_wcc: wcc_data,
    /// Same verifier WRITE returned; a change signals a server restart.
    pub verf: writeverf3,
}
DeserializeStruct!(COMMIT3resok, file_wcc, verf);
SerializeStruct!(COMMIT3resok, file_wcc, verf);

/// LINK arguments (RFC 1813 section 3.3.15).
#[derive(Debug, Default)]
pub struct LINK3args {
    /// Existing file to link to.
    pub file: nfs_fh3,
    /// Directory and name for the new link.
    pub link: diropargs3,
}
DeserializeStruct!(LINK3args, file, link);
SerializeStruct!(LINK3args, file, link);
