//! Result records for the file-system information procedures:
//! FSSTAT (18), FSINFO (19) and PATHCONF (20), per RFC 1813.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use super::*;

// FSINFO `properties` bits (RFC 1813 section 3.3.19).

/// The file system supports hard links.
pub const FSF_LINK: u32 = 0x0001;
/// The file system supports symbolic links.
pub const FSF_SYMLINK: u32 = 0x0002;
/// PATHCONF results are identical for every object in the file system.
pub const FSF_HOMOGENEOUS: u32 = 0x0008;
/// SETATTR can set object times.
pub const FSF_CANSETTIME: u32 = 0x0010;

/// Static file system information returned by FSINFO.
#[derive(Debug, Default)]
pub struct fsinfo3 {
    pub obj_attributes: post_op_attr,
    /// Maximum supported READ request in bytes.
    pub rtmax: u32,
    /// Preferred READ request size.
    pub rtpref: u32,
    /// Suggested READ request multiple.
    pub rtmult: u32,
    /// Maximum supported WRITE request in bytes.
    pub wtmax: u32,
    /// Preferred WRITE request size.
    pub wtpref: u32,
    /// Suggested WRITE request multiple.
    pub wtmult: u32,
    /// Preferred READDIR request size.
    pub dtpref: u32,
    pub maxfilesize: size3,
    /// Granularity of the server's file time stamps.
    pub time_delta: nfstime3,
    /// FSF_* property bit mask.
    pub properties: u32,
}
DeserializeStruct!(
    fsinfo3,
    obj_attributes,
    rtmax,
    rtpref,
    rtmult,
    wtmax,
    wtpref,
    wtmult,
    dtpref,
    maxfilesize,
    time_delta,
    properties
);
SerializeStruct!(
    fsinfo3,
    obj_attributes,
    rtmax,
    rtpref,
    rtmult,
    wtmax,
    wtpref,
    wtmult,
    dtpref,
    maxfilesize,
    time_delta,
    properties
);

/// Volatile file system statistics returned by FSSTAT.
#[derive(Debug, Default)]
pub struct FSSTAT3resok {
    pub obj_attributes: post_op_attr,
    /// Total bytes in the file system.
    pub tbytes: size3,
    /// Free bytes.
    pub fbytes: size3,
    /// Free bytes available to the caller.
    pub abytes: size3,
    /// Total file slots.
    pub tfiles: size3,
    /// Free file slots.
    pub ffiles: size3,
    /// Free file slots available to the caller.
    pub afiles: size3,
    /// Seconds for which this information is valid; zero means volatile.
    pub invarsec: u32,
}
DeserializeStruct!(
    FSSTAT3resok,
    obj_attributes,
    tbytes,
    fbytes,
    abytes,
    tfiles,
    ffiles,
    afiles,
    invarsec
);
SerializeStruct!(
    FSSTAT3resok,
    obj_attributes,
    tbytes,
    fbytes,
    abytes,
    tfiles,
    ffiles,
    afiles,
    invarsec
);

/// POSIX path limits returned by PATHCONF.
#[derive(Debug, Default)]
pub struct PATHCONF3resok {
    pub obj_attributes: post_op_attr,
    /// Maximum hard link count.
    pub linkmax: u32,
    /// Maximum filename length.
    pub name_max: u32,
    /// Overlong names are rejected rather than truncated.
    pub no_trunc: bool,
    /// Ownership changes require privilege.
    pub chown_restricted: bool,
    pub case_insensitive: bool,
    pub case_preserving: bool,
}
DeserializeStruct!(
    PATHCONF3resok,
    obj_attributes,
    linkmax,
    name_max,
    no_trunc,
    chown_restricted,
    case_insensitive,
    case_preserving
);
SerializeStruct!(
    PATHCONF3resok,
    obj_attributes,
    linkmax,
    name_max,
    no_trunc,
    chown_restricted,
    case_insensitive,
    case_preserving
);
