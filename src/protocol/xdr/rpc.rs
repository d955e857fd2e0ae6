//! ONC RPC v2 message records (RFC 5531) and canned reply builders.
//!
//! Only the shapes the server needs are modelled: incoming CALL bodies,
//! outgoing accepted/denied replies, and the AUTH_UNIX credential body the
//! engine turns into an authentication context.

#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::cast::FromPrimitive;

use super::*;

/// RPC protocol version accepted by this server.
pub const RPC_VERSION: u32 = 2;

/// Maximum machine-name length in an AUTH_UNIX body.
pub const MAX_MACHINENAME_LEN: usize = 255;
/// Maximum supplementary gids carried by an AUTH_UNIX body.
pub const MAX_AUTH_GIDS: usize = 16;

/// Why a credential was rejected (RFC 5531 `auth_stat`).
#[derive(Copy, Clone, Debug, Default, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum auth_stat {
    /// Bad credential (seal broken).
    #[default]
    AUTH_BADCRED = 1,
    /// Client must begin a new session.
    AUTH_REJECTEDCRED = 2,
    /// Bad verifier.
    AUTH_BADVERF = 3,
    /// Verifier expired or replayed.
    AUTH_REJECTEDVERF = 4,
    /// Rejected for security reasons.
    AUTH_TOOWEAK = 5,
}
SerializeEnum!(auth_stat);
DeserializeEnum!(auth_stat);

/// Credential flavor identifiers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum auth_flavor {
    /// No authentication material at all.
    #[default]
    AUTH_NONE = 0,
    /// Unix-style uid/gid in the clear.
    AUTH_UNIX = 1,
    AUTH_SHORT = 2,
    AUTH_DES = 3,
    /// RPCSEC_GSS; accepted on the wire, identity injection is the
    /// engine's concern.
    RPCSEC_GSS = 6,
}
SerializeEnum!(auth_flavor);
DeserializeEnum!(auth_flavor);

/// AUTH_UNIX credential body (RFC 5531 appendix A).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct auth_unix {
    /// Arbitrary client-chosen stamp.
    pub stamp: u32,
    pub machinename: Vec<u8>,
    pub uid: u32,
    pub gid: u32,
    /// Up to [`MAX_AUTH_GIDS`] supplementary group ids.
    pub gids: Vec<u32>,
}

impl Serialize for auth_unix {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.stamp.serialize(dest)?;
        self.machinename.serialize(dest)?;
        self.uid.serialize(dest)?;
        self.gid.serialize(dest)?;
        self.gids.serialize(dest)
    }
}

impl Deserialize for auth_unix {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.stamp.deserialize(src)?;
        self.machinename.deserialize(src)?;
        if self.machinename.len() > MAX_MACHINENAME_LEN {
            return Err(invalid_data("AUTH_UNIX machinename too long"));
        }
        self.uid.deserialize(src)?;
        self.gid.deserialize(src)?;
        self.gids.deserialize(src)?;
        if self.gids.len() > MAX_AUTH_GIDS {
            return Err(invalid_data("AUTH_UNIX gid list too long"));
        }
        Ok(())
    }
}

/// Flavor-tagged opaque credential or verifier.
#[derive(Clone, Debug)]
pub struct opaque_auth {
    pub flavor: auth_flavor,
    pub body: Vec<u8>,
}
DeserializeStruct!(opaque_auth, flavor, body);
SerializeStruct!(opaque_auth, flavor, body);

impl Default for opaque_auth {
    fn default() -> opaque_auth {
        opaque_auth { flavor: auth_flavor::AUTH_NONE, body: Vec::new() }
    }
}

/// Top-level RPC message: a transaction id plus a CALL or REPLY body.
///
/// The xid only matches replies to calls and detects retransmissions; it is
/// not a sequence number.
#[derive(Clone, Debug, Default)]
pub struct rpc_msg {
    pub xid: u32,
    pub body: rpc_body,
}
DeserializeStruct!(rpc_msg, xid, body);
SerializeStruct!(rpc_msg, xid, body);

/// CALL (0) or REPLY (1) discriminated union.
#[derive(Clone, Debug)]
#[allow(clippy::upper_case_acronyms)]
#[repr(u32)]
pub enum rpc_body {
    CALL(call_body),
    REPLY(reply_body),
}

impl Default for rpc_body {
    fn default() -> rpc_body {
        rpc_body::CALL(call_body::default())
    }
}

impl Serialize for rpc_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            rpc_body::CALL(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            rpc_body::REPLY(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for rpc_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32, R>(src)? {
            0 => *self = rpc_body::CALL(deserialize(src)?),
            1 => *self = rpc_body::REPLY(deserialize(src)?),
            msg_type => {
                return Err(invalid_data(format!("invalid message type in rpc_body: {msg_type}")))
            }
        }
        Ok(())
    }
}

/// Everything a caller supplies: versions, target procedure, credentials.
#[derive(Clone, Debug, Default)]
pub struct call_body {
    /// Must be [`RPC_VERSION`].
    pub rpcvers: u32,
    pub prog: u32,
    pub vers: u32,
    pub proc: u32,
    pub cred: opaque_auth,
    pub verf: opaque_auth,
    // procedure-specific parameters follow in the stream
}
DeserializeStruct!(call_body, rpcvers, prog, vers, proc, cred, verf);
SerializeStruct!(call_body, rpcvers, prog, vers, proc, cred, verf);

/// Accepted or denied reply union.
#[derive(Clone, Debug)]
pub enum reply_body {
    MSG_ACCEPTED(accepted_reply),
    MSG_DENIED(rejected_reply),
}

impl Default for reply_body {
    fn default() -> reply_body {
        reply_body::MSG_ACCEPTED(accepted_reply::default())
    }
}

impl Serialize for reply_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            reply_body::MSG_ACCEPTED(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            reply_body::MSG_DENIED(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for reply_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32, R>(src)? {
            0 => *self = reply_body::MSG_ACCEPTED(deserialize(src)?),
            1 => *self = reply_body::MSG_DENIED(deserialize(src)?),
            stat => return Err(invalid_data(format!("invalid reply status: {stat}"))),
        }
        Ok(())
    }
}

/// Supported version range reported on mismatches.
#[derive(Clone, Debug, Default)]
pub struct mismatch_info {
    pub low: u32,
    pub high: u32,
}
DeserializeStruct!(mismatch_info, low, high);
SerializeStruct!(mismatch_info, low, high);

/// Reply to a call the server accepted; processing may still have failed,
/// which `reply_data` records.
#[derive(Clone, Debug, Default)]
pub struct accepted_reply {
    pub verf: opaque_auth,
    pub reply_data: accept_body,
}
DeserializeStruct!(accepted_reply, verf, reply_data);
SerializeStruct!(accepted_reply, verf, reply_data);

/// Outcome of an accepted call (RFC 5531 `accept_stat`).
#[derive(Clone, Debug, Default)]
#[allow(clippy::upper_case_acronyms)]
#[repr(u32)]
pub enum accept_body {
    /// Procedure-specific results follow in the stream.
    #[default]
    SUCCESS,
    /// Program not served here.
    PROG_UNAVAIL,
    /// Program version outside the supported range.
    PROG_MISMATCH(mismatch_info),
    /// No such procedure in this program.
    PROC_UNAVAIL,
    /// Arguments could not be decoded.
    GARBAGE_ARGS,
}

impl Serialize for accept_body {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            accept_body::SUCCESS => 0_u32.serialize(dest),
            accept_body::PROG_UNAVAIL => 1_u32.serialize(dest),
            accept_body::PROG_MISMATCH(v) => {
                2_u32.serialize(dest)?;
                v.serialize(dest)
            }
            accept_body::PROC_UNAVAIL => 3_u32.serialize(dest),
            accept_body::GARBAGE_ARGS => 4_u32.serialize(dest),
        }
    }
}

impl Deserialize for accept_body {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32, R>(src)? {
            0 => *self = accept_body::SUCCESS,
            1 => *self = accept_body::PROG_UNAVAIL,
            2 => *self = accept_body::PROG_MISMATCH(deserialize(src)?),
            3 => *self = accept_body::PROC_UNAVAIL,
            4 => *self = accept_body::GARBAGE_ARGS,
            stat => return Err(invalid_data(format!("invalid accept stat: {stat}"))),
        }
        Ok(())
    }
}

/// Reply to a call the server refused outright: protocol version mismatch
/// or an authentication failure.
#[derive(Clone, Debug)]
pub enum rejected_reply {
    RPC_MISMATCH(mismatch_info),
    AUTH_ERROR(auth_stat),
}

impl Default for rejected_reply {
    fn default() -> rejected_reply {
        rejected_reply::AUTH_ERROR(auth_stat::default())
    }
}

impl Serialize for rejected_reply {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            rejected_reply::RPC_MISMATCH(v) => {
                0_u32.serialize(dest)?;
                v.serialize(dest)
            }
            rejected_reply::AUTH_ERROR(v) => {
                1_u32.serialize(dest)?;
                v.serialize(dest)
            }
        }
    }
}

impl Deserialize for rejected_reply {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        match deserialize::<u32, R>(src)? {
            0 => *self = rejected_reply::RPC_MISMATCH(deserialize(src)?),
            1 => *self = rejected_reply::AUTH_ERROR(deserialize(src)?),
            stat => return Err(invalid_data(format!("invalid reject stat: {stat}"))),
        }
        Ok(())
    }
}

/// Accepted reply carrying `SUCCESS`; procedure results follow it.
pub fn make_success_reply(xid: u32) -> rpc_msg {
    accepted(xid, accept_body::SUCCESS)
}

/// Accepted reply reporting an unknown procedure number.
pub fn proc_unavail_reply_message(xid: u32) -> rpc_msg {
    accepted(xid, accept_body::PROC_UNAVAIL)
}

/// Accepted reply reporting an unknown program number.
pub fn prog_unavail_reply_message(xid: u32) -> rpc_msg {
    accepted(xid, accept_body::PROG_UNAVAIL)
}

/// Accepted reply reporting an unsupported program version.
pub fn prog_mismatch_reply_message(xid: u32, accepted_ver: u32) -> rpc_msg {
    accepted(
        xid,
        accept_body::PROG_MISMATCH(mismatch_info { low: accepted_ver, high: accepted_ver }),
    )
}

/// Accepted reply reporting undecodable arguments.
pub fn garbage_args_reply_message(xid: u32) -> rpc_msg {
    accepted(xid, accept_body::GARBAGE_ARGS)
}

/// Denied reply for an RPC protocol version other than 2.
pub fn rpc_vers_mismatch(xid: u32) -> rpc_msg {
    let reply = reply_body::MSG_DENIED(rejected_reply::RPC_MISMATCH(mismatch_info {
        low: RPC_VERSION,
        high: RPC_VERSION,
    }));
    rpc_msg { xid, body: rpc_body::REPLY(reply) }
}

/// Denied reply for a credential the engine could not accept.
pub fn auth_error_reply_message(xid: u32, stat: auth_stat) -> rpc_msg {
    let reply = reply_body::MSG_DENIED(rejected_reply::AUTH_ERROR(stat));
    rpc_msg { xid, body: rpc_body::REPLY(reply) }
}

fn accepted(xid: u32, reply_data: accept_body) -> rpc_msg {
    let reply =
        reply_body::MSG_ACCEPTED(accepted_reply { verf: opaque_auth::default(), reply_data });
    rpc_msg { xid, body: rpc_body::REPLY(reply) }
}
