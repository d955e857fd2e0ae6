//! XDR data types and constants for NFS version 3 (RFC 1813).
//!
//! The basic types here (file handles, attributes, weak-cache-consistency
//! records, settable attributes) are shared by every procedure; the
//! operation-specific argument/result records live in the [`file`], [`dir`]
//! and [`fs`] submodules.
//!
//! Optional XDR unions discriminated by a boolean (`post_op_attr`,
//! `pre_op_attr`, `post_op_fh3`, `sattrguard3`, the `set_*` attribute
//! fields) are expressed as `Option` type aliases; the generic `Option`
//! codec in the parent module produces the RFC wire form.

// Preserve the RFC 1813 naming conventions for wire types
#![allow(non_camel_case_types)]

use std::fmt;
use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::{deserialize, invalid_data, Deserialize, Serialize};
use crate::{DeserializeEnum, DeserializeStruct, SerializeEnum, SerializeStruct};

pub mod dir;
pub mod file;
pub mod fs;

/// RPC program number of the NFS service.
pub const PROGRAM: u32 = 100003;
/// Protocol version implemented by this crate.
pub const VERSION: u32 = 3;

/// Maximum size in bytes of an opaque file handle (RFC 1813 section 2.4).
pub const NFS3_FHSIZE: u32 = 64;
/// Size in bytes of the READDIR/READDIRPLUS cookie verifier.
pub const NFS3_COOKIEVERFSIZE: u32 = 8;
/// Size in bytes of the exclusive-CREATE verifier.
pub const NFS3_CREATEVERFSIZE: u32 = 8;
/// Size in bytes of the asynchronous-WRITE verifier.
pub const NFS3_WRITEVERFSIZE: u32 = 8;

/// Maximum length in bytes of a single pathname component.
pub const NFS3_MAXNAMLEN: usize = 255;

// Procedure numbers (RFC 1813 section 3.3). These index the flat dispatch
// table in `protocol::nfs::v3`.
pub const NFSPROC3_NULL: u32 = 0;
pub const NFSPROC3_GETATTR: u32 = 1;
pub const NFSPROC3_SETATTR: u32 = 2;
pub const NFSPROC3_LOOKUP: u32 = 3;
pub const NFSPROC3_ACCESS: u32 = 4;
pub const NFSPROC3_READLINK: u32 = 5;
pub const NFSPROC3_READ: u32 = 6;
pub const NFSPROC3_WRITE: u32 = 7;
pub const NFSPROC3_CREATE: u32 = 8;
pub const NFSPROC3_MKDIR: u32 = 9;
pub const NFSPROC3_SYMLINK: u32 = 10;
pub const NFSPROC3_MKNOD: u32 = 11;
pub const NFSPROC3_REMOVE: u32 = 12;
pub const NFSPROC3_RMDIR: u32 = 13;
pub const NFSPROC3_RENAME: u32 = 14;
pub const NFSPROC3_LINK: u32 = 15;
pub const NFSPROC3_READDIR: u32 = 16;
pub const NFSPROC3_READDIRPLUS: u32 = 17;
pub const NFSPROC3_FSSTAT: u32 = 18;
pub const NFSPROC3_FSINFO: u32 = 19;
pub const NFSPROC3_PATHCONF: u32 = 20;
pub const NFSPROC3_COMMIT: u32 = 21;

/// Byte string used for filenames and paths.
///
/// Not required to be UTF-8 on the wire; [`fmt::Debug`] renders it lossily
/// for logging.
#[derive(Default, Clone, PartialEq, Eq, Hash)]
pub struct nfsstring(pub Vec<u8>);

impl nfsstring {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for nfsstring {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for nfsstring {
    fn from(value: &[u8]) -> Self {
        Self(value.into())
    }
}

impl From<&str> for nfsstring {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().into())
    }
}

impl AsRef<[u8]> for nfsstring {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::Deref for nfsstring {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for nfsstring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for nfsstring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for nfsstring {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.0.serialize(dest)
    }
}

impl Deserialize for nfsstring {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.0.deserialize(src)
    }
}

/// A component of a pathname (RFC 1813 section 2.5).
pub type filename3 = nfsstring;
/// A pathname or symbolic link target.
pub type nfspath3 = nfsstring;
/// Unique file identifier within a filesystem, the inode-number analogue.
pub type fileid3 = u64;
/// Directory position cookie for READDIR / READDIRPLUS.
pub type cookie3 = u64;
/// Cookie verifier: detects directory modification between READDIR calls.
pub type cookieverf3 = [u8; NFS3_COOKIEVERFSIZE as usize];
/// Verifier for exclusive CREATE idempotency.
pub type createverf3 = [u8; NFS3_CREATEVERFSIZE as usize];
/// Verifier detecting server restarts between UNSTABLE WRITE and COMMIT.
pub type writeverf3 = [u8; NFS3_WRITEVERFSIZE as usize];
pub type uid3 = u32;
pub type gid3 = u32;
pub type size3 = u64;
pub type offset3 = u64;
pub type mode3 = u32;
pub type count3 = u32;

/// Status codes returned by NFS version 3 operations (RFC 1813 section 2.6).
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum nfsstat3 {
    /// The call completed successfully.
    NFS3_OK = 0,
    /// Not owner: the caller is neither privileged nor the owner of the
    /// target of the operation.
    NFS3ERR_PERM = 1,
    /// No such file or directory.
    NFS3ERR_NOENT = 2,
    /// A hard I/O error occurred while processing the operation.
    NFS3ERR_IO = 5,
    /// No such device or address.
    NFS3ERR_NXIO = 6,
    /// Permission denied: the caller lacks the permission bits required for
    /// the operation (contrast with NFS3ERR_PERM).
    NFS3ERR_ACCES = 13,
    /// The file specified already exists.
    NFS3ERR_EXIST = 17,
    /// Attempt at a cross-device hard link.
    NFS3ERR_XDEV = 18,
    /// No such device.
    NFS3ERR_NODEV = 19,
    /// A non-directory was named in a directory operation.
    NFS3ERR_NOTDIR = 20,
    /// A directory was named in a non-directory operation.
    NFS3ERR_ISDIR = 21,
    /// Invalid or unsupported argument.
    NFS3ERR_INVAL = 22,
    /// Operation would grow a file beyond the server's limit.
    NFS3ERR_FBIG = 27,
    /// No space left on device.
    NFS3ERR_NOSPC = 28,
    /// Modifying operation attempted on a read-only file system.
    NFS3ERR_ROFS = 30,
    /// Too many hard links.
    NFS3ERR_MLINK = 31,
    /// Filename too long.
    NFS3ERR_NAMETOOLONG = 63,
    /// Directory not empty.
    NFS3ERR_NOTEMPTY = 66,
    /// Resource (quota) hard limit exceeded.
    NFS3ERR_DQUOT = 69,
    /// Stale file handle: the object no longer exists or access to it has
    /// been revoked.
    NFS3ERR_STALE = 70,
    /// Too many levels of remote in path.
    NFS3ERR_REMOTE = 71,
    /// The file handle failed internal consistency checks.
    NFS3ERR_BADHANDLE = 10001,
    /// SETATTR guard mismatch.
    NFS3ERR_NOT_SYNC = 10002,
    /// Stale READDIR / READDIRPLUS cookie.
    NFS3ERR_BAD_COOKIE = 10003,
    /// Operation not supported.
    NFS3ERR_NOTSUPP = 10004,
    /// Buffer or request too small.
    NFS3ERR_TOOSMALL = 10005,
    /// Server-side error with no protocol mapping; clients usually
    /// translate this to EIO.
    NFS3ERR_SERVERFAULT = 10006,
    /// Attempt to create an object of an unsupported type.
    NFS3ERR_BADTYPE = 10007,
    /// Transient server condition; the client should retry with a new
    /// transaction id.
    NFS3ERR_JUKEBOX = 10008,
}
SerializeEnum!(nfsstat3);
DeserializeEnum!(nfsstat3);

/// Type of a file system object (RFC 1813 section 2.3.5).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ftype3 {
    /// Regular file
    #[default]
    NF3REG = 1,
    /// Directory
    NF3DIR = 2,
    /// Block special device
    NF3BLK = 3,
    /// Character special device
    NF3CHR = 4,
    /// Symbolic link
    NF3LNK = 5,
    /// Socket
    NF3SOCK = 6,
    /// Named pipe
    NF3FIFO = 7,
}
SerializeEnum!(ftype3);
DeserializeEnum!(ftype3);

/// Major/minor numbers for character and block special devices.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct specdata3 {
    pub specdata1: u32,
    pub specdata2: u32,
}
DeserializeStruct!(specdata3, specdata1, specdata2);
SerializeStruct!(specdata3, specdata1, specdata2);

/// Opaque NFS file handle, 1 to [`NFS3_FHSIZE`] bytes.
///
/// The decoder rejects handles longer than the protocol maximum; emptiness
/// and the 8-byte file-id prefix are checked by the handler layer, which
/// owns the error taxonomy for bad handles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct nfs_fh3 {
    pub data: Vec<u8>,
}

impl Serialize for nfs_fh3 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.data.serialize(dest)
    }
}

impl Deserialize for nfs_fh3 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.data.deserialize(src)?;
        if self.data.len() > NFS3_FHSIZE as usize {
            return Err(invalid_data(format!(
                "file handle length {} exceeds NFS3_FHSIZE",
                self.data.len()
            )));
        }
        Ok(())
    }
}

/// File timestamp: seconds and nanoseconds since the Unix epoch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct nfstime3 {
    pub seconds: u32,
    pub nseconds: u32,
}
DeserializeStruct!(nfstime3, seconds, nseconds);
SerializeStruct!(nfstime3, seconds, nseconds);

/// Complete file attributes (RFC 1813 section 2.3.5).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct fattr3 {
    /// Object type (regular, directory, symlink, ...).
    pub ftype: ftype3,
    /// Permission bits plus setuid/setgid/sticky.
    pub mode: mode3,
    /// Number of directory entries referencing this object.
    pub nlink: u32,
    pub uid: uid3,
    pub gid: gid3,
    /// Data size in bytes; directories report a nominal block count.
    pub size: size3,
    /// Bytes actually allocated to the object.
    pub used: size3,
    /// Device numbers, meaningful for NF3BLK/NF3CHR.
    pub rdev: specdata3,
    /// Identifier of the file system containing the object.
    pub fsid: u64,
    /// File id; always equals the big-endian prefix of the handle.
    pub fileid: fileid3,
    pub atime: nfstime3,
    pub mtime: nfstime3,
    pub ctime: nfstime3,
}
DeserializeStruct!(
    fattr3, ftype, mode, nlink, uid, gid, size, used, rdev, fsid, fileid, atime, mtime, ctime
);
SerializeStruct!(
    fattr3, ftype, mode, nlink, uid, gid, size, used, rdev, fsid, fileid, atime, mtime, ctime
);

/// Subset of attributes captured before a mutation for weak cache
/// consistency (RFC 1813 section 2.3.8).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct wcc_attr {
    pub size: size3,
    pub mtime: nfstime3,
    pub ctime: nfstime3,
}
DeserializeStruct!(wcc_attr, size, mtime, ctime);
SerializeStruct!(wcc_attr, size, mtime, ctime);

/// Optional pre-operation attributes.
pub type pre_op_attr = Option<wcc_attr>;
/// Optional full post-operation attributes.
pub type post_op_attr = Option<fattr3>;
/// Optional file handle in CREATE-family results.
pub type post_op_fh3 = Option<nfs_fh3>;

/// Before/after attribute pair returned by every mutating operation.
#[derive(Copy, Clone, Debug, Default)]
pub struct wcc_data {
    pub before: pre_op_attr,
    pub after: post_op_attr,
}
DeserializeStruct!(wcc_data, before, after);
SerializeStruct!(wcc_data, before, after);

impl From<fattr3> for wcc_attr {
    fn from(v: fattr3) -> Self {
        wcc_attr { size: v.size, mtime: v.mtime, ctime: v.ctime }
    }
}

pub type set_mode3 = Option<mode3>;
pub type set_uid3 = Option<uid3>;
pub type set_gid3 = Option<gid3>;
pub type set_size3 = Option<size3>;

/// How SETATTR should treat the access time (RFC 1813 `time_how`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum set_atime {
    #[default]
    DONT_CHANGE,
    SET_TO_SERVER_TIME,
    SET_TO_CLIENT_TIME(nfstime3),
}

impl Serialize for set_atime {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            set_atime::DONT_CHANGE => 0_u32.serialize(dest),
            set_atime::SET_TO_SERVER_TIME => 1_u32.serialize(dest),
            set_atime::SET_TO_CLIENT_TIME(v) => {
                2_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for set_atime {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32, R>(src)? {
            0 => *self = set_atime::DONT_CHANGE,
            1 => *self = set_atime::SET_TO_SERVER_TIME,
            2 => *self = set_atime::SET_TO_CLIENT_TIME(deserialize(src)?),
            c => return Err(invalid_data(format!("invalid set_atime value: {c}"))),
        }
        Ok(())
    }
}

/// How SETATTR should treat the modification time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum set_mtime {
    #[default]
    DONT_CHANGE,
    SET_TO_SERVER_TIME,
    SET_TO_CLIENT_TIME(nfstime3),
}

impl Serialize for set_mtime {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            set_mtime::DONT_CHANGE => 0_u32.serialize(dest),
            set_mtime::SET_TO_SERVER_TIME => 1_u32.serialize(dest),
            set_mtime::SET_TO_CLIENT_TIME(v) => {
                2_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for set_mtime {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32, R>(src)? {
            0 => *self = set_mtime::DONT_CHANGE,
            1 => *self = set_mtime::SET_TO_SERVER_TIME,
            2 => *self = set_mtime::SET_TO_CLIENT_TIME(deserialize(src)?),
            c => return Err(invalid_data(format!("invalid set_mtime value: {c}"))),
        }
        Ok(())
    }
}

/// Attributes a client may set (RFC 1813 section 2.3.7).
#[derive(Copy, Clone, Debug, Default)]
pub struct sattr3 {
    pub mode: set_mode3,
    pub uid: set_uid3,
    pub gid: set_gid3,
    pub size: set_size3,
    pub atime: set_atime,
    pub mtime: set_mtime,
}
DeserializeStruct!(sattr3, mode, uid, gid, size, atime, mtime);
SerializeStruct!(sattr3, mode, uid, gid, size, atime, mtime);

/// Directory handle plus component name, the argument of every by-name
/// operation.
#[derive(Clone, Debug, Default)]
pub struct diropargs3 {
    pub dir: nfs_fh3,
    pub name: filename3,
}
DeserializeStruct!(diropargs3, dir, name);
SerializeStruct!(diropargs3, dir, name);

/// Target path and initial attributes of a new symbolic link.
#[derive(Debug, Default)]
pub struct symlinkdata3 {
    pub symlink_attributes: sattr3,
    pub symlink_data: nfspath3,
}
DeserializeStruct!(symlinkdata3, symlink_attributes, symlink_data);
SerializeStruct!(symlinkdata3, symlink_attributes, symlink_data);

// ACCESS permission bits (RFC 1813 section 3.3.4).

/// Read file data or read a directory.
pub const ACCESS3_READ: u32 = 0x0001;
/// Look up a name in a directory.
pub const ACCESS3_LOOKUP: u32 = 0x0002;
/// Rewrite existing file data or modify existing directory entries.
pub const ACCESS3_MODIFY: u32 = 0x0004;
/// Write new data or add directory entries.
pub const ACCESS3_EXTEND: u32 = 0x0008;
/// Delete an existing directory entry.
pub const ACCESS3_DELETE: u32 = 0x0010;
/// Execute a file or traverse a directory.
pub const ACCESS3_EXECUTE: u32 = 0x0020;

/// File creation disposition for CREATE (RFC 1813 section 3.3.8).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum createmode3 {
    /// Create or truncate; never fails on existence.
    #[default]
    UNCHECKED = 0,
    /// Fail with NFS3ERR_EXIST if the name exists.
    GUARDED = 1,
    /// Idempotent creation keyed by an 8-byte client verifier.
    EXCLUSIVE = 2,
}
SerializeEnum!(createmode3);
DeserializeEnum!(createmode3);

/// Optional ctime guard for SETATTR.
pub type sattrguard3 = Option<nfstime3>;

/// Arguments of the SETATTR procedure.
#[derive(Clone, Debug, Default)]
pub struct SETATTR3args {
    pub object: nfs_fh3,
    pub new_attributes: sattr3,
    pub guard: sattrguard3,
}
DeserializeStruct!(SETATTR3args, object, new_attributes, guard);
SerializeStruct!(SETATTR3args, object, new_attributes, guard);
