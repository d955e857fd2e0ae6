//! READLINK (procedure 5): read the target of a symbolic link.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{meta_status, post_attr, resolve_handle};

pub(super) async fn nfsproc3_readlink(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let fh = deserialize::<nfs3::nfs_fh3, _>(input)?;
    debug!("nfsproc3_readlink({xid}, {fh:?})");

    let handle = match resolve_handle(&fh) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };
    let obj_attr = post_attr(context, &handle).await;

    match context.repo.read_symlink(&handle).await {
        Ok(target) => {
            debug!("readlink {xid} -> {target:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            obj_attr.serialize(output)?;
            target.serialize(output)?;
        }
        Err(e) => {
            let stat = meta_status("readlink", xid, &e);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            obj_attr.serialize(output)?;
        }
    }
    Ok(())
}
