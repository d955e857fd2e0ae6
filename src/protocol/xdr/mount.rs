//! MOUNT protocol records (RFC 1813 Appendix I).
//!
//! MOUNT bootstraps an NFS session: MNT translates an export path into the
//! root file handle and reports the credential flavors the server accepts.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::*;

/// RPC program number of the MOUNT service.
pub const PROGRAM: u32 = 100005;
/// MOUNT protocol version served.
pub const VERSION: u32 = 3;

/// Maximum bytes in a mount path.
pub const MNTPATHLEN: u32 = 1024;
/// Maximum bytes in a name.
pub const MNTNAMLEN: u32 = 255;
/// Maximum bytes in a version 3 file handle.
pub const FHSIZE3: u32 = 64;

/// Opaque root file handle returned by MNT.
pub type fhandle3 = Vec<u8>;
/// Server-side directory path.
pub type dirpath = Vec<u8>;

// Procedure numbers (RFC 1813 Appendix I).
pub const MOUNTPROC3_NULL: u32 = 0;
pub const MOUNTPROC3_MNT: u32 = 1;
pub const MOUNTPROC3_DUMP: u32 = 2;
pub const MOUNTPROC3_UMNT: u32 = 3;
pub const MOUNTPROC3_UMNTALL: u32 = 4;
pub const MOUNTPROC3_EXPORT: u32 = 5;

/// Status codes for MOUNT operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum mountstat3 {
    MNT3_OK = 0,
    /// Not owner
    MNT3ERR_PERM = 1,
    /// No such file or directory
    MNT3ERR_NOENT = 2,
    /// I/O error
    MNT3ERR_IO = 5,
    /// Permission denied
    MNT3ERR_ACCES = 13,
    /// Not a directory
    MNT3ERR_NOTDIR = 20,
    /// Invalid argument
    MNT3ERR_INVAL = 22,
    /// Filename too long
    MNT3ERR_NAMETOOLONG = 63,
    /// Operation not supported
    MNT3ERR_NOTSUPP = 10004,
    /// A failure on the server
    MNT3ERR_SERVERFAULT = 10006,
}
SerializeEnum!(mountstat3);
DeserializeEnum!(mountstat3);

/// Successful MNT result: the root handle plus acceptable auth flavors.
#[derive(Clone, Debug, Default)]
pub struct mountres3_ok {
    pub fhandle: fhandle3,
    pub auth_flavors: Vec<u32>,
}
DeserializeStruct!(mountres3_ok, fhandle, auth_flavors);
SerializeStruct!(mountres3_ok, fhandle, auth_flavors);
