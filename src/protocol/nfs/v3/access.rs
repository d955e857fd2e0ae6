//! ACCESS (procedure 4): evaluate the caller's rights on an object.
//!
//! The requested ACCESS3_* bitmap is checked against the caller's
//! `{uid, gid, gids}` by the metadata repository; the granted subset is
//! returned. A permission mismatch is not an error here; the client
//! inspects the bitmap.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{meta_status, post_attr, resolve_handle};

pub(super) async fn nfsproc3_access(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let fh = deserialize::<nfs3::nfs_fh3, _>(input)?;
    let requested = deserialize::<u32, _>(input)?;
    debug!("nfsproc3_access({xid}, {fh:?}, {requested:#x})");

    let handle = match resolve_handle(&fh) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };

    match context.repo.check_access(&handle, &context.auth, requested).await {
        Ok(granted) => {
            let obj_attr = post_attr(context, &handle).await;
            debug!("access {xid} -> granted {granted:#x}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            obj_attr.serialize(output)?;
            granted.serialize(output)?;
        }
        Err(e) => {
            let stat = meta_status("access", xid, &e);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
        }
    }
    Ok(())
}
