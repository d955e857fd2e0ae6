//! LOOKUP (procedure 3): translate a name within a directory into a file
//! handle.
//!
//! `"."` resolves to the directory itself and `".."` to its parent (the
//! root is its own parent); both are synthesized here, never stored as
//! directory children. Post-operation attributes are returned for the
//! object and for the directory.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{meta_status, post_attr, resolve_handle};

pub(super) async fn nfsproc3_lookup(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let dirops = deserialize::<nfs3::diropargs3, _>(input)?;
    debug!("nfsproc3_lookup({xid}, {dirops:?})");

    let dir = match resolve_handle(&dirops.dir) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };
    let dir_attr = post_attr(context, &dir).await;

    let found = match dirops.name.as_ref() {
        b"." => Ok(dir.clone()),
        b".." => context.repo.get_parent(&dir).await,
        _ => context.repo.get_child(&dir, &dirops.name).await,
    };

    match found {
        Ok(obj) => {
            let obj_attr = post_attr(context, &obj).await;
            debug!("lookup {xid} {:?} -> {obj:?}", dirops.name);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            obj.to_wire().serialize(output)?;
            obj_attr.serialize(output)?;
            dir_attr.serialize(output)?;
        }
        Err(e) => {
            let stat = meta_status("lookup", xid, &e);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            dir_attr.serialize(output)?;
        }
    }
    Ok(())
}
