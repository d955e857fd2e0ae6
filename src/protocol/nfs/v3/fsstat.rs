//! FSSTAT (procedure 18): volatile file system statistics.
//!
//! The gateway has no real device behind it; generous static totals keep
//! clients' free-space checks satisfied.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{post_attr, resolve_handle};

const TOTAL_BYTES: u64 = 1 << 40;
const TOTAL_FILES: u64 = 1 << 20;

pub(super) async fn nfsproc3_fsstat(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let fh = deserialize::<nfs3::nfs_fh3, _>(input)?;
    debug!("nfsproc3_fsstat({xid}, {fh:?})");

    let handle = match resolve_handle(&fh) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };

    let res = nfs3::fs::FSSTAT3resok {
        obj_attributes: post_attr(context, &handle).await,
        tbytes: TOTAL_BYTES,
        fbytes: TOTAL_BYTES,
        abytes: TOTAL_BYTES,
        tfiles: TOTAL_FILES,
        ffiles: TOTAL_FILES,
        afiles: TOTAL_FILES,
        invarsec: 0,
    };
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    nfs3::nfsstat3::NFS3_OK.serialize(output)?;
    res.serialize(output)?;
    Ok(())
}
