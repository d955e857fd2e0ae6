//! PATHCONF (procedure 20): POSIX pathname limits.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{post_attr, resolve_handle};

pub(super) async fn nfsproc3_pathconf(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let fh = deserialize::<nfs3::nfs_fh3, _>(input)?;
    debug!("nfsproc3_pathconf({xid}, {fh:?})");

    let handle = match resolve_handle(&fh) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };

    let res = nfs3::fs::PATHCONF3resok {
        obj_attributes: post_attr(context, &handle).await,
        linkmax: u32::MAX,
        name_max: nfs3::NFS3_MAXNAMLEN as u32,
        no_trunc: true,
        chown_restricted: true,
        case_insensitive: false,
        case_preserving: true,
    };
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    nfs3::nfsstat3::NFS3_OK.serialize(output)?;
    res.serialize(output)?;
    Ok(())
}
