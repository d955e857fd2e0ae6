//! WRITE (procedure 7): write file content into the slice cache.
//!
//! UNSTABLE writes land in the cache and return the process-wide write
//! verifier; clients compare it across WRITE/COMMIT pairs to detect a
//! server restart. DATA_SYNC and FILE_SYNC additionally run a blocking
//! flush of the affected range before replying. Size and mtime
//! bookkeeping goes through the repository so attributes stay the single
//! source of truth.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{ensure_access, meta_status, resolve_handle};

pub(super) async fn nfsproc3_write(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::file::WRITE3args, _>(input)?;
    debug!("nfsproc3_write({xid}, {:?} offset {} count {})", args.file, args.offset, args.count);

    if args.data.len() != args.count as usize {
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        return Ok(());
    }

    let handle = match resolve_handle(&args.file) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };

    let pre_attrs = match context.repo.get_file(&handle).await {
        Ok(attrs) => attrs,
        Err(e) => {
            let stat = meta_status("write", xid, &e);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let before = nfs3::pre_op_attr::Some(nfs3::wcc_attr::from(pre_attrs));

    let early = match pre_attrs.ftype {
        nfs3::ftype3::NF3REG => {
            ensure_access(context, &handle, nfs3::ACCESS3_MODIFY | nfs3::ACCESS3_EXTEND)
                .await
                .err()
        }
        nfs3::ftype3::NF3DIR => Some(nfs3::nfsstat3::NFS3ERR_ISDIR),
        _ => Some(nfs3::nfsstat3::NFS3ERR_INVAL),
    };
    if let Some(stat) = early {
        let wcc = nfs3::wcc_data { before, after: nfs3::post_op_attr::Some(pre_attrs) };
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        stat.serialize(output)?;
        wcc.serialize(output)?;
        return Ok(());
    }

    if let Err(e) = context.blocks.write(&handle, args.offset, &args.data, &context.cancel).await
    {
        error!("write {xid} data path failed: {e}");
        let wcc = nfs3::wcc_data { before, after: nfs3::post_op_attr::Some(pre_attrs) };
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        nfs3::nfsstat3::from(&e).serialize(output)?;
        wcc.serialize(output)?;
        return Ok(());
    }

    // Grow the reported size when the write extended the file; always
    // advance mtime.
    let end = args.offset + args.data.len() as u64;
    let bookkeeping = nfs3::sattr3 {
        size: (end > pre_attrs.size).then_some(end),
        mtime: nfs3::set_mtime::SET_TO_SERVER_TIME,
        ..Default::default()
    };
    let post_attrs = match context.repo.set_attrs(&handle, bookkeeping).await {
        Ok(attrs) => attrs,
        Err(e) => {
            let stat = meta_status("write", xid, &e);
            let wcc = nfs3::wcc_data { before, after: nfs3::post_op_attr::None };
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            wcc.serialize(output)?;
            return Ok(());
        }
    };

    // Sync writes must not reply before the range is durable.
    let committed = match args.stable {
        nfs3::file::stable_how::UNSTABLE => nfs3::file::stable_how::UNSTABLE,
        requested => {
            match context
                .blocks
                .flush_range_durable(&handle, args.offset, args.count as u64, &context.cancel)
                .await
            {
                Ok(_) => requested,
                Err(e) => {
                    error!("write {xid} sync flush failed: {e}");
                    let wcc =
                        nfs3::wcc_data { before, after: nfs3::post_op_attr::Some(post_attrs) };
                    xdr::rpc::make_success_reply(xid).serialize(output)?;
                    nfs3::nfsstat3::from(&e).serialize(output)?;
                    wcc.serialize(output)?;
                    return Ok(());
                }
            }
        }
    };

    debug!("write {xid} -> {} bytes, {committed:?}", args.count);
    let res = nfs3::file::WRITE3resok {
        file_wcc: nfs3::wcc_data { before, after: nfs3::post_op_attr::Some(post_attrs) },
        count: args.count,
        committed,
        verf: context.write_verifier,
    };
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    nfs3::nfsstat3::NFS3_OK.serialize(output)?;
    res.serialize(output)?;
    Ok(())
}
