//! NFSv3 procedure handlers and dispatch (RFC 1813).
//!
//! Every procedure follows one template: decode arguments, resolve the
//! handle(s), snapshot `pre_op_attr` on any directory about to change,
//! check access, perform the operation against the metadata repository
//! and the block service, snapshot `post_op_attr`, and assemble a
//! status-first reply. Weak-cache-consistency data is emitted best-effort
//! even on failure; it is only omitted when the parent handle itself
//! cannot be resolved.
//!
//! Dispatch is a flat table indexed by procedure number carrying
//! `{name, auth_required, handler}`; procedure numbers outside the table
//! produce `PROC_UNAVAIL`.

use std::io::{Read, Write};

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::meta::{FileHandle, MetaError};
use crate::protocol::rpc;
use crate::protocol::xdr::{self, nfs3, Serialize};

mod access;
mod commit;
mod create;
mod fsinfo;
mod fsstat;
mod getattr;
mod link;
mod lookup;
mod mkdir;
mod mknod;
mod null;
mod pathconf;
mod read;
mod readdir;
mod readdirplus;
mod readlink;
mod remove;
mod rename;
mod rmdir;
mod setattr;
mod symlink;
mod write;

/// One dispatch-table row.
pub struct ProcEntry<R, W> {
    pub name: &'static str,
    /// Whether the procedure mutates state and therefore expects caller
    /// identity. Enforcement lives in the handlers' access checks (each
    /// failure reply has its own shape); the flag feeds logging and the
    /// MOUNT auth-flavor list.
    pub auth_required: bool,
    run: for<'a> fn(
        u32,
        &'a mut R,
        &'a mut W,
        &'a rpc::Context,
    ) -> BoxFuture<'a, Result<(), anyhow::Error>>,
}

/// The flat NFSv3 dispatch table, indexed by procedure number.
pub fn procedures<R: Read + Send, W: Write + Send>() -> [ProcEntry<R, W>; 22] {
    macro_rules! entry {
        ($name:literal, $auth:literal, $handler:path) => {{
            fn run<'a, R2: Read + Send, W2: Write + Send>(
                xid: u32,
                input: &'a mut R2,
                output: &'a mut W2,
                ctx: &'a rpc::Context,
            ) -> BoxFuture<'a, Result<(), anyhow::Error>> {
                Box::pin($handler(xid, input, output, ctx))
            }
            ProcEntry { name: $name, auth_required: $auth, run: run::<R, W> }
        }};
    }
    [
        entry!("NULL", false, null::nfsproc3_null),
        entry!("GETATTR", false, getattr::nfsproc3_getattr),
        entry!("SETATTR", true, setattr::nfsproc3_setattr),
        entry!("LOOKUP", false, lookup::nfsproc3_lookup),
        entry!("ACCESS", false, access::nfsproc3_access),
        entry!("READLINK", false, readlink::nfsproc3_readlink),
        entry!("READ", false, read::nfsproc3_read),
        entry!("WRITE", true, write::nfsproc3_write),
        entry!("CREATE", true, create::nfsproc3_create),
        entry!("MKDIR", true, mkdir::nfsproc3_mkdir),
        entry!("SYMLINK", true, symlink::nfsproc3_symlink),
        entry!("MKNOD", true, mknod::nfsproc3_mknod),
        entry!("REMOVE", true, remove::nfsproc3_remove),
        entry!("RMDIR", true, rmdir::nfsproc3_rmdir),
        entry!("RENAME", true, rename::nfsproc3_rename),
        entry!("LINK", true, link::nfsproc3_link),
        entry!("READDIR", false, readdir::nfsproc3_readdir),
        entry!("READDIRPLUS", false, readdirplus::nfsproc3_readdirplus),
        entry!("FSSTAT", false, fsstat::nfsproc3_fsstat),
        entry!("FSINFO", false, fsinfo::nfsproc3_fsinfo),
        entry!("PATHCONF", false, pathconf::nfsproc3_pathconf),
        entry!("COMMIT", true, commit::nfsproc3_commit),
    ]
}

/// Routes one NFSv3 call to its handler.
pub async fn handle_nfs<R: Read + Send, W: Write + Send>(
    xid: u32,
    call: xdr::rpc::call_body,
    input: &mut R,
    output: &mut W,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    if call.vers != nfs3::VERSION {
        warn!("invalid NFS version {} != {}", call.vers, nfs3::VERSION);
        xdr::rpc::prog_mismatch_reply_message(xid, nfs3::VERSION).serialize(output)?;
        return Ok(());
    }
    let table = procedures::<R, W>();
    match table.get(call.proc as usize) {
        Some(entry) => {
            debug!(xid, proc = entry.name, auth_required = entry.auth_required, "dispatch");
            (entry.run)(xid, input, output, context).await
        }
        None => {
            warn!("unknown NFSv3 procedure {}", call.proc);
            xdr::rpc::proc_unavail_reply_message(xid).serialize(output)?;
            Ok(())
        }
    }
}

/// Validates a wire handle, additionally requiring the 8-byte file-id
/// prefix the data model mandates.
pub(crate) fn resolve_handle(fh: &nfs3::nfs_fh3) -> Result<FileHandle, nfs3::nfsstat3> {
    FileHandle::from_wire(fh)
}

/// Best-effort pre-operation snapshot of a directory or file about to be
/// mutated.
pub(crate) async fn wcc_before(
    context: &rpc::Context,
    handle: &FileHandle,
) -> nfs3::pre_op_attr {
    context.repo.get_file(handle).await.ok().map(nfs3::wcc_attr::from)
}

/// Best-effort post-operation attribute snapshot.
pub(crate) async fn post_attr(context: &rpc::Context, handle: &FileHandle) -> nfs3::post_op_attr {
    context.repo.get_file(handle).await.ok()
}

/// Checks that every requested ACCESS3_* bit is granted to the caller.
pub(crate) async fn ensure_access(
    context: &rpc::Context,
    handle: &FileHandle,
    bits: u32,
) -> Result<(), nfs3::nfsstat3> {
    let granted = context
        .repo
        .check_access(handle, &context.auth, bits)
        .await
        .map_err(nfs3::nfsstat3::from)?;
    if granted & bits == bits {
        Ok(())
    } else {
        Err(nfs3::nfsstat3::NFS3ERR_ACCES)
    }
}

/// Maps a repository error, logging client errors at warn and server
/// errors at error per the logging policy.
pub(crate) fn meta_status(op: &str, xid: u32, e: &MetaError) -> nfs3::nfsstat3 {
    let status = nfs3::nfsstat3::from(e);
    match e {
        MetaError::Io(_) | MetaError::NoSpace => {
            tracing::error!(xid, op, "server-side failure: {e} -> {status:?}")
        }
        _ => warn!(xid, op, "client-visible failure: {e} -> {status:?}"),
    }
    status
}
