//! GETATTR (procedure 1): read the attributes of an object.
//!
//! Read-only; never touches timestamps. A handle that does not resolve
//! produces `NFS3ERR_STALE`, a malformed one `NFS3ERR_BADHANDLE`.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{meta_status, resolve_handle};

pub(super) async fn nfsproc3_getattr(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let fh = deserialize::<nfs3::nfs_fh3, _>(input)?;
    debug!("nfsproc3_getattr({xid}, {fh:?})");

    let handle = match resolve_handle(&fh) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            return Ok(());
        }
    };
    match context.repo.get_file(&handle).await {
        Ok(attrs) => {
            debug!("getattr {xid} -> {attrs:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            attrs.serialize(output)?;
        }
        Err(e) => {
            let stat = meta_status("getattr", xid, &e);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
        }
    }
    Ok(())
}
