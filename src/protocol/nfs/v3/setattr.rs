//! SETATTR (procedure 2): change object attributes.
//!
//! The optional guard compares the object's current ctime; a mismatch
//! aborts with `NFS3ERR_NOT_SYNC` so racing clients detect each other.
//! A size change flows into the cache as a truncate (shrink) or
//! zero-extension bookkeeping (grow). Setting explicit timestamps is an
//! owner-or-root privilege (`NFS3ERR_PERM`).

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{ensure_access, meta_status, post_attr, resolve_handle};

pub(super) async fn nfsproc3_setattr(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::SETATTR3args, _>(input)?;
    debug!("nfsproc3_setattr({xid}, {args:?})");

    let handle = match resolve_handle(&args.object) {
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
            let stat = meta_status("setattr", xid, &e);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let before = nfs3::pre_op_attr::Some(nfs3::wcc_attr::from(pre_attrs));

    let failure = validate(context, &handle, &args, &pre_attrs).await;
    if let Some(stat) = failure {
        let wcc = nfs3::wcc_data { before, after: post_attr(context, &handle).await };
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        stat.serialize(output)?;
        wcc.serialize(output)?;
        return Ok(());
    }

    // A size change must reach the cache as well: shrink clips slices,
    // grow records the zero-extended tail.
    if let Some(size) = args.new_attributes.size {
        if pre_attrs.ftype == nfs3::ftype3::NF3REG && size != pre_attrs.size {
            if let Err(e) = context.blocks.truncate(&handle, size).await {
                warn!("setattr {xid} cache truncate failed: {e}");
            }
        }
    }

    match context.repo.set_attrs(&handle, args.new_attributes).await {
        Ok(attrs) => {
            debug!("setattr {xid} -> {attrs:?}");
            let wcc = nfs3::wcc_data { before, after: nfs3::post_op_attr::Some(attrs) };
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            wcc.serialize(output)?;
        }
        Err(e) => {
            let stat = meta_status("setattr", xid, &e);
            let wcc = nfs3::wcc_data { before, after: post_attr(context, &handle).await };
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            wcc.serialize(output)?;
        }
    }
    Ok(())
}

/// Guard and privilege checks preceding the mutation.
async fn validate(
    context: &rpc::Context,
    handle: &crate::meta::FileHandle,
    args: &nfs3::SETATTR3args,
    pre_attrs: &nfs3::fattr3,
) -> Option<nfs3::nfsstat3> {
    if let Some(guard_ctime) = args.guard {
        if guard_ctime != pre_attrs.ctime {
            return Some(nfs3::nfsstat3::NFS3ERR_NOT_SYNC);
        }
    }

    let is_owner = context.auth.is_root() || context.auth.uid == Some(pre_attrs.uid);
    let sets_explicit_time = matches!(args.new_attributes.atime, nfs3::set_atime::SET_TO_CLIENT_TIME(_))
        || matches!(args.new_attributes.mtime, nfs3::set_mtime::SET_TO_CLIENT_TIME(_));
    if sets_explicit_time && !is_owner {
        return Some(nfs3::nfsstat3::NFS3ERR_PERM);
    }
    let sets_identity = args.new_attributes.mode.is_some()
        || args.new_attributes.uid.is_some()
        || args.new_attributes.gid.is_some();
    if sets_identity && !is_owner && context.auth.is_authenticated() {
        return Some(nfs3::nfsstat3::NFS3ERR_PERM);
    }

    if args.new_attributes.size.is_some() {
        if let Err(stat) = ensure_access(context, handle, nfs3::ACCESS3_MODIFY).await {
            return Some(stat);
        }
    }
    None
}
