//! FSINFO (procedure 19): static file system limits and preferences.
//!
//! Transfer maxima follow the configured RPC record caps so clients
//! never build requests the transport would reject.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{post_attr, resolve_handle};

/// Headroom for the RPC/NFS reply envelope around READ data.
const RECORD_OVERHEAD: u32 = 512;

pub(super) async fn nfsproc3_fsinfo(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let fh = deserialize::<nfs3::nfs_fh3, _>(input)?;
    debug!("nfsproc3_fsinfo({xid}, {fh:?})");

    let handle = match resolve_handle(&fh) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };

    let rt = context.config.max_record_size_read as u32 - RECORD_OVERHEAD;
    let wt = context.config.max_record_size_write as u32 - RECORD_OVERHEAD;
    let res = nfs3::fs::fsinfo3 {
        obj_attributes: post_attr(context, &handle).await,
        rtmax: rt,
        rtpref: rt,
        rtmult: 4096,
        wtmax: wt,
        wtpref: wt.min(1024 * 1024),
        wtmult: 4096,
        dtpref: 65536,
        maxfilesize: 128 * 1024 * 1024 * 1024,
        time_delta: nfs3::nfstime3 { seconds: 0, nseconds: 1_000_000 },
        properties: nfs3::fs::FSF_LINK
            | nfs3::fs::FSF_SYMLINK
            | nfs3::fs::FSF_HOMOGENEOUS
            | nfs3::fs::FSF_CANSETTIME,
    };
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    nfs3::nfsstat3::NFS3_OK.serialize(output)?;
    res.serialize(output)?;
    Ok(())
}
