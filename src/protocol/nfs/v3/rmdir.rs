//! RMDIR (procedure 13): remove an empty directory.
//!
//! Non-directories are rejected with `NFS3ERR_NOTDIR`, non-empty
//! directories with `NFS3ERR_NOTEMPTY`; in both cases the parent's WCC
//! pair shows no change.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::remove::unlink;
use super::{post_attr, resolve_handle, wcc_before};

pub(super) async fn nfsproc3_rmdir(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let dirops = deserialize::<nfs3::diropargs3, _>(input)?;
    debug!("nfsproc3_rmdir({xid}, {dirops:?})");

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

    let removed = unlink(context, xid, &dir, &dirops.name, true).await;

    let wcc = nfs3::wcc_data { before, after: post_attr(context, &dir).await };
    match removed {
        Ok(()) => {
            debug!("rmdir {xid} {:?} done", dirops.name);
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
