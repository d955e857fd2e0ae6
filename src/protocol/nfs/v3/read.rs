//! READ (procedure 6): read file content through the slice cache.
//!
//! The requested `(offset, count)` is clamped against the file size from
//! the repository; a request at or past EOF succeeds with zero bytes and
//! `eof = true`. Bytes come from the cache; chunk misses are filled from
//! the content store via the transfer manager, or per the sparse policy
//! when no store is wired.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{ensure_access, meta_status, resolve_handle};

pub(super) async fn nfsproc3_read(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::file::READ3args, _>(input)?;
    debug!("nfsproc3_read({xid}, {args:?})");

    let handle = match resolve_handle(&args.file) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };

    let attrs = match context.repo.get_file(&handle).await {
        Ok(attrs) => attrs,
        Err(e) => {
            let stat = meta_status("read", xid, &e);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };
    let obj_attr = nfs3::post_op_attr::Some(attrs);

    let early = match attrs.ftype {
        nfs3::ftype3::NF3REG => ensure_access(context, &handle, nfs3::ACCESS3_READ).await.err(),
        nfs3::ftype3::NF3DIR => Some(nfs3::nfsstat3::NFS3ERR_ISDIR),
        _ => Some(nfs3::nfsstat3::NFS3ERR_INVAL),
    };
    if let Some(stat) = early {
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        stat.serialize(output)?;
        obj_attr.serialize(output)?;
        return Ok(());
    }

    // Clamp against the reported size; past-EOF reads return no bytes.
    let count = if args.offset >= attrs.size {
        0
    } else {
        (attrs.size - args.offset).min(args.count as u64) as u32
    };

    match context.blocks.read(&handle, args.offset, count, &context.cancel).await {
        Ok(data) => {
            let eof = args.offset + data.len() as u64 >= attrs.size;
            debug!("read {xid} -> {} bytes, eof {eof}", data.len());
            let res = nfs3::file::READ3resok {
                file_attributes: obj_attr,
                count: data.len() as u32,
                eof,
                data,
            };
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            res.serialize(output)?;
        }
        Err(e) => {
            error!("read {xid} data path failed: {e}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::from(&e).serialize(output)?;
            obj_attr.serialize(output)?;
        }
    }
    Ok(())
}
