//! RENAME (procedure 14): move a name, possibly across directories.
//!
//! Two parents, two WCC pairs. The repository performs the move
//! atomically with respect to name resolution; an existing destination
//! is replaced, and a destination directory must be empty. Content of a
//! replaced file is dropped once its last link is gone.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{ensure_access, meta_status, post_attr, resolve_handle, wcc_before};

pub(super) async fn nfsproc3_rename(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let from = deserialize::<nfs3::diropargs3, _>(input)?;
    let to = deserialize::<nfs3::diropargs3, _>(input)?;
    debug!("nfsproc3_rename({xid}, {from:?} -> {to:?})");

    let (from_dir, to_dir) = match (resolve_handle(&from.dir), resolve_handle(&to.dir)) {
        (Ok(f), Ok(t)) => (f, t),
        (Err(stat), _) | (_, Err(stat)) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let from_before = wcc_before(context, &from_dir).await;
    let to_before = wcc_before(context, &to_dir).await;

    let moved = rename_inner(context, xid, &from_dir, &from.name, &to_dir, &to.name).await;

    let from_wcc =
        nfs3::wcc_data { before: from_before, after: post_attr(context, &from_dir).await };
    let to_wcc = nfs3::wcc_data { before: to_before, after: post_attr(context, &to_dir).await };

    match moved {
        Ok(()) => {
            debug!("rename {xid} done");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
        }
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
        }
    }
    from_wcc.serialize(output)?;
    to_wcc.serialize(output)?;
    Ok(())
}

async fn rename_inner(
    context: &rpc::Context,
    xid: u32,
    from_dir: &crate::meta::FileHandle,
    from_name: &nfs3::filename3,
    to_dir: &crate::meta::FileHandle,
    to_name: &nfs3::filename3,
) -> Result<(), nfs3::nfsstat3> {
    ensure_access(context, from_dir, nfs3::ACCESS3_DELETE).await?;
    ensure_access(context, to_dir, nfs3::ACCESS3_MODIFY | nfs3::ACCESS3_EXTEND).await?;

    // A replaced regular file loses its content once the rename drops its
    // last link; capture the key first.
    let replaced_content = match context.repo.get_child(to_dir, to_name).await {
        Ok(victim) => match context.repo.get_file(&victim).await {
            Ok(attrs) if attrs.ftype == nfs3::ftype3::NF3REG && attrs.nlink <= 1 => {
                context.repo.content_id(&victim).await.ok()
            }
            _ => None,
        },
        Err(_) => None,
    };

    context
        .repo
        .rename(from_dir, from_name, to_dir, to_name)
        .await
        .map_err(|e| meta_status("rename", xid, &e))?;

    if let Some(id) = replaced_content {
        context.blocks.delete_content(&id).await;
    }
    Ok(())
}
