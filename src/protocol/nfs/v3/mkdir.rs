//! MKDIR (procedure 9): create a directory.

use std::io::{Read, Write};

use tracing::debug;

use crate::meta::CreatePayload;
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{ensure_access, meta_status, post_attr, resolve_handle, wcc_before};

pub(super) async fn nfsproc3_mkdir(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::dir::MKDIR3args, _>(input)?;
    debug!("nfsproc3_mkdir({xid}, {args:?})");

    let dir = match resolve_handle(&args.dirops.dir) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let before = wcc_before(context, &dir).await;

    let created = match ensure_access(context, &dir, nfs3::ACCESS3_MODIFY | nfs3::ACCESS3_EXTEND)
        .await
    {
        Ok(()) => {
            context
                .repo
                .add_file_to_directory(
                    &dir,
                    &args.dirops.name,
                    args.attributes,
                    CreatePayload::Directory,
                )
                .await
                .map_err(|e| meta_status("mkdir", xid, &e))
        }
        Err(stat) => Err(stat),
    };

    let wcc = nfs3::wcc_data { before, after: post_attr(context, &dir).await };
    match created {
        Ok((handle, attrs)) => {
            debug!("mkdir {xid} -> {handle:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::post_op_fh3::Some(handle.to_wire()).serialize(output)?;
            nfs3::post_op_attr::Some(attrs).serialize(output)?;
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
