//! REMOVE (procedure 12): unlink a non-directory object.
//!
//! Directories are rejected with `NFS3ERR_ISDIR` (RMDIR is their
//! procedure). When the last link goes, the object record and its cached
//! and stored content are destroyed. WCC is captured on the parent.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{ensure_access, meta_status, post_attr, resolve_handle, wcc_before};

pub(super) async fn nfsproc3_remove(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let dirops = deserialize::<nfs3::diropargs3, _>(input)?;
    debug!("nfsproc3_remove({xid}, {dirops:?})");

    let dir = match resolve_handle(&dirops.dir) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let before = wcc_before(context, &dir).await;

    let removed = unlink(context, xid, &dir, &dirops.name, false).await;

    let wcc = nfs3::wcc_data { before, after: post_attr(context, &dir).await };
    match removed {
        Ok(()) => {
            debug!("remove {xid} {:?} done", dirops.name);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            wcc.serialize(output)?;
        }
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            wcc.serialize(output)?;
        }
    }
    Ok(())
}

/// Shared unlink path for REMOVE and RMDIR.
///
/// Checks the type expectation, requires delete permission on the parent,
/// unlinks the name, and destroys the object plus its content once no
/// link remains.
pub(super) async fn unlink(
    context: &rpc::Context,
    xid: u32,
    dir: &crate::meta::FileHandle,
    name: &nfs3::filename3,
    expect_dir: bool,
) -> Result<(), nfs3::nfsstat3> {
    let target = context.repo.get_child(dir, name).await.map_err(|e| meta_status("unlink", xid, &e))?;
    let attrs = context.repo.get_file(&target).await.map_err(|e| meta_status("unlink", xid, &e))?;

    match (attrs.ftype == nfs3::ftype3::NF3DIR, expect_dir) {
        (true, false) => return Err(nfs3::nfsstat3::NFS3ERR_ISDIR),
        (false, true) => return Err(nfs3::nfsstat3::NFS3ERR_NOTDIR),
        _ => {}
    }
    ensure_access(context, dir, nfs3::ACCESS3_DELETE).await?;

    // Grab the content key before the metadata disappears.
    let content = if attrs.ftype == nfs3::ftype3::NF3REG {
        context.repo.content_id(&target).await.ok()
    } else {
        None
    };

    context.repo.delete_child(dir, name).await.map_err(|e| meta_status("unlink", xid, &e))?;

    if attrs.nlink <= 1 {
        context
            .repo
            .delete_file(&target)
            .await
            .map_err(|e| meta_status("unlink", xid, &e))?;
        if let Some(id) = content {
            context.blocks.delete_content(&id).await;
        }
    }
    Ok(())
}
