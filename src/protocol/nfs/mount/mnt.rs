//! MOUNT MNT (procedure 1): translate an export path into the root file
//! handle.
//!
//! The requested path must match the configured export name; a suffix
//! below it is resolved component by component through the metadata
//! repository. The reply names the credential flavors the server
//! accepts (AUTH_NONE and AUTH_UNIX).

use std::io::{Read, Write};

use num_traits::cast::ToPrimitive;
use tracing::debug;

use crate::meta::FileHandle;
use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, mount, nfs3, Serialize};

pub(super) async fn mountproc3_mnt(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let path = deserialize::<mount::dirpath, _>(input)?;
    let utf8path = std::str::from_utf8(&path).unwrap_or_default();
    debug!("mountproc3_mnt({xid}, {utf8path:?})");

    let Some(subpath) = utf8path.strip_prefix(context.export_name.as_str()) else {
        debug!("mnt {xid} -> no matching export");
        xdr::rpc::make_success_reply(xid).serialize(output)?;
        mount::mountstat3::MNT3ERR_NOENT.serialize(output)?;
        return Ok(());
    };

    match walk(context, subpath).await {
        Ok(handle) => {
            let response = mount::mountres3_ok {
                fhandle: handle.as_bytes().to_vec(),
                auth_flavors: vec![
                    xdr::rpc::auth_flavor::AUTH_NONE.to_u32().unwrap(),
                    xdr::rpc::auth_flavor::AUTH_UNIX.to_u32().unwrap(),
                ],
            };
            debug!("mnt {xid} -> {response:?}");
            if let Some(ref chan) = context.mount_signal {
                let _ = chan.send(true).await;
            }
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            mount::mountstat3::MNT3_OK.serialize(output)?;
            response.serialize(output)?;
        }
        Err(()) => {
            debug!("mnt {xid} -> MNT3ERR_NOENT");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            mount::mountstat3::MNT3ERR_NOENT.serialize(output)?;
        }
    }
    Ok(())
}

/// Resolves a path below the export root, one component at a time.
async fn walk(context: &rpc::Context, subpath: &str) -> Result<FileHandle, ()> {
    let mut handle = context.repo.root();
    for component in subpath.split('/') {
        if component.is_empty() {
            continue;
        }
        let name: nfs3::filename3 = component.as_bytes().into();
        handle = context.repo.get_child(&handle, &name).await.map_err(|_| ())?;
    }
    Ok(handle)
}
