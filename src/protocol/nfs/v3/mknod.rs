//! MKNOD (procedure 11): create a special file (device, socket, FIFO).
//!
//! The `what` union's shape depends on its leading file-type
//! discriminant: character and block devices carry attributes plus
//! major/minor numbers, sockets and FIFOs only attributes. Regular
//! files, directories and symlinks have their own procedures and are
//! rejected with `NFS3ERR_BADTYPE`.

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::meta::CreatePayload;
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{ensure_access, meta_status, post_attr, resolve_handle, wcc_before};

pub(super) async fn nfsproc3_mknod(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::dir::MKNOD3args, _>(input)?;
    let ftype = deserialize::<nfs3::ftype3, _>(input)?;
    debug!("nfsproc3_mknod({xid}, {args:?}, {ftype:?})");

    let dir = match resolve_handle(&args.where_dir.dir) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let before = wcc_before(context, &dir).await;

    let parsed = match ftype {
        nfs3::ftype3::NF3CHR | nfs3::ftype3::NF3BLK => {
            let device = deserialize::<nfs3::dir::devicedata3, _>(input)?;
            Some((device.dev_attributes, device.spec))
        }
        nfs3::ftype3::NF3SOCK | nfs3::ftype3::NF3FIFO => {
            let attrs = deserialize::<nfs3::sattr3, _>(input)?;
            Some((attrs, nfs3::specdata3::default()))
        }
        _ => None,
    };

    let created = match parsed {
        None => {
            warn!("mknod {xid} unsupported type {ftype:?}");
            Err(nfs3::nfsstat3::NFS3ERR_BADTYPE)
        }
        Some((attrs, spec)) => {
            match ensure_access(context, &dir, nfs3::ACCESS3_MODIFY | nfs3::ACCESS3_EXTEND).await
            {
                Ok(()) => {
                    context
                        .repo
                        .add_file_to_directory(
                            &dir,
                            &args.where_dir.name,
                            attrs,
                            CreatePayload::Special(ftype, spec),
                        )
                        .await
                        .map_err(|e| meta_status("mknod", xid, &e))
                }
                Err(stat) => Err(stat),
            }
        }
    };

    let wcc = nfs3::wcc_data { before, after: post_attr(context, &dir).await };
    match created {
        Ok((handle, attrs)) => {
            debug!("mknod {xid} -> {handle:?}");
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
