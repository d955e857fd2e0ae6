//! LINK (procedure 15): add a hard link to an existing file.
//!
//! Directories cannot be linked. The reply carries the file's post-op
//! attributes (its link count changed) plus WCC for the target parent.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{ensure_access, meta_status, post_attr, resolve_handle, wcc_before};

pub(super) async fn nfsproc3_link(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::file::LINK3args, _>(input)?;
    debug!("nfsproc3_link({xid}, {args:?})");

    let (file, dir) = match (resolve_handle(&args.file), resolve_handle(&args.link.dir)) {
        (Ok(f), Ok(d)) => (f, d),
        (Err(stat), _) | (_, Err(stat)) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let before = wcc_before(context, &dir).await;

    let linked = match ensure_access(context, &dir, nfs3::ACCESS3_MODIFY | nfs3::ACCESS3_EXTEND)
        .await
    {
        Ok(()) => context
            .repo
            .link(&file, &dir, &args.link.name)
            .await
            .map_err(|e| meta_status("link", xid, &e)),
        Err(stat) => Err(stat),
    };

    let wcc = nfs3::wcc_data { before, after: post_attr(context, &dir).await };
    match linked {
        Ok(attrs) => {
            debug!("link {xid} -> nlink {}", attrs.nlink);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::post_op_attr::Some(attrs).serialize(output)?;
            wcc.serialize(output)?;
        }
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            wcc.serialize(output)?;
        }
    }
    Ok(())
}
