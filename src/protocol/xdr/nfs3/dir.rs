//! Argument and result records for the directory procedures:
//! MKDIR (9), SYMLINK (10), MKNOD (11), READDIR (16) and READDIRPLUS (17),
//! per RFC 1813.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use super::*;

/// MKDIR arguments (RFC 1813 section 3.3.9).
#[derive(Debug, Default)]
pub struct MKDIR3args {
    pub dirops: diropargs3,
    pub attributes: sattr3,
}
DeserializeStruct!(MKDIR3args, dirops, attributes);
SerializeStruct!(MKDIR3args, dirops, attributes);

/// SYMLINK arguments (RFC 1813 section 3.3.10).
#[derive(Debug, Default)]
pub struct SYMLINK3args {
    pub dirops: diropargs3,
    pub symlink: symlinkdata3,
}
DeserializeStruct!(SYMLINK3args, dirops, symlink);
SerializeStruct!(SYMLINK3args, dirops, symlink);

/// Single READDIR entry (RFC 1813 section 3.3.16).
#[derive(Debug, Default)]
pub struct entry3 {
    pub fileid: fileid3,
    pub name: filename3,
    /// Position cookie for resuming after this entry.
    pub cookie: cookie3,
}
DeserializeStruct!(entry3, fileid, name, cookie);
SerializeStruct!(entry3, fileid, name, cookie);

/// READDIR arguments. A zero cookie starts from the beginning.
#[derive(Debug, Default)]
pub struct READDIR3args {
    pub dir: nfs_fh3,
    pub cookie: cookie3,
    pub cookieverf: cookieverf3,
    /// Byte budget for the encoded entry list.
    pub dircount: count3,
}
DeserializeStruct!(READDIR3args, dir, cookie, cookieverf, dircount);
SerializeStruct!(READDIR3args, dir, cookie, cookieverf, dircount);

/// Single READDIRPLUS entry: name plus attributes and handle.
#[derive(Debug, Default)]
pub struct entryplus3 {
    pub fileid: fileid3,
    pub name: filename3,
    pub cookie: cookie3,
    pub name_attributes: post_op_attr,
    pub name_handle: post_op_fh3,
}
DeserializeStruct!(entryplus3, fileid, name, cookie, name_attributes, name_handle);
SerializeStruct!(entryplus3, fileid, name, cookie, name_attributes, name_handle);

/// READDIRPLUS arguments (RFC 1813 section 3.3.17).
#[derive(Debug, Default)]
pub struct READDIRPLUS3args {
    pub dir: nfs_fh3,
    pub cookie: cookie3,
    pub cookieverf: cookieverf3,
    /// Byte budget for just the name/id/cookie portion of the entries.
    pub dircount: count3,
    /// Byte budget for the full reply.
    pub maxcount: count3,
}
DeserializeStruct!(READDIRPLUS3args, dir, cookie, cookieverf, dircount, maxcount);
SerializeStruct!(READDIRPLUS3args, dir, cookie, cookieverf, dircount, maxcount);

/// Device type and numbers for MKNOD.
#[derive(Debug, Default)]
pub struct devicedata3 {
    pub dev_attributes: sattr3,
    pub spec: specdata3,
}
DeserializeStruct!(devicedata3, dev_attributes, spec);
SerializeStruct!(devicedata3, dev_attributes, spec);

/// MKNOD arguments (RFC 1813 section 3.3.11).
///
/// The `what` union is decoded by the handler because its shape depends on
/// the leading [`ftype3`] discriminant: NF3CHR/NF3BLK carry device data,
/// NF3SOCK/NF3FIFO carry only attributes.
#[derive(Debug, Default)]
pub struct MKNOD3args {
    pub where_dir: diropargs3,
}
DeserializeStruct!(MKNOD3args, where_dir);
SerializeStruct!(MKNOD3args, where_dir);
