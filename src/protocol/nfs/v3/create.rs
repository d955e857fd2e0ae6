//! CREATE (procedure 8): create a regular file.
//!
//! Three dispositions: UNCHECKED applies the supplied attributes to an
//! existing file instead of failing; GUARDED fails with `NFS3ERR_EXIST`;
//! EXCLUSIVE is idempotent on an 8-byte client verifier stored with the
//! object, so a retried create of the same file succeeds with the same
//! handle while a different verifier reports `NFS3ERR_EXIST`.

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::meta::CreatePayload;
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Deserialize, Serialize};

use super::{ensure_access, meta_status, post_attr, resolve_handle, wcc_before};

pub(super) async fn nfsproc3_create(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let dirops = deserialize::<nfs3::diropargs3, _>(input)?;
    let createhow = deserialize::<nfs3::createmode3, _>(input)?;
    debug!("nfsproc3_create({xid}, {dirops:?}, {createhow:?})");

    let dir = match resolve_handle(&dirops.dir) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let before = wcc_before(context, &dir).await;

    // Arguments after the mode depend on the discriminant.
    let mut target_attributes = nfs3::sattr3::default();
    let mut verifier = nfs3::createverf3::default();
    match createhow {
        nfs3::createmode3::UNCHECKED | nfs3::createmode3::GUARDED => {
            target_attributes.deserialize(input)?;
        }
        nfs3::createmode3::EXCLUSIVE => {
            verifier.deserialize(input)?;
        }
    }

    if let Err(stat) =
        ensure_access(context, &dir, nfs3::ACCESS3_MODIFY | nfs3::ACCESS3_EXTEND).await
    {
        warn!("create {xid} access denied on parent");
        let wcc = nfs3::wcc_data { before, after: post_attr(context, &dir).await };
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        stat.serialize(output)?;
        wcc.serialize(output)?;
        return Ok(());
    }

    let created = match createhow {
        nfs3::createmode3::EXCLUSIVE => {
            context.repo.create_exclusive(&dir, &dirops.name, verifier).await
        }
        nfs3::createmode3::GUARDED => {
            context
                .repo
                .add_file_to_directory(&dir, &dirops.name, target_attributes, CreatePayload::Regular)
                .await
        }
        nfs3::createmode3::UNCHECKED => {
            match context.repo.get_child(&dir, &dirops.name).await {
                // Unchecked create over an existing file applies the
                // requested attributes (typically a truncate to zero).
                Ok(existing) => {
                    if let Some(size) = target_attributes.size {
                        let _ = context.blocks.truncate(&existing, size).await;
                    }
                    context
                        .repo
                        .set_attrs(&existing, target_attributes)
                        .await
                        .map(|attrs| (existing, attrs))
                }
                Err(_) => {
                    context
                        .repo
                        .add_file_to_directory(
                            &dir,
                            &dirops.name,
                            target_attributes,
                            CreatePayload::Regular,
                        )
                        .await
                }
            }
        }
    };

    let wcc = nfs3::wcc_data { before, after: post_attr(context, &dir).await };
    match created {
        Ok((handle, attrs)) => {
            debug!("create {xid} -> {handle:?}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            nfs3::post_op_fh3::Some(handle.to_wire()).serialize(output)?;
            nfs3::post_op_attr::Some(attrs).serialize(output)?;
            wcc.serialize(output)?;
        }
        Err(e) => {
            let stat = meta_status("create", xid, &e);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            wcc.serialize(output)?;
        }
    }
    Ok(())
}
