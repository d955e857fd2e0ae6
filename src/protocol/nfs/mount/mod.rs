//! MOUNT protocol (RFC 1813 Appendix I): the companion program clients
//! use to obtain the root file handle before any NFS traffic.
//!
//! Like the NFS side, dispatch is a flat table indexed by procedure
//! number; procedures 0–5 are served (NULL, MNT, DUMP, UMNT, UMNTALL,
//! EXPORT).

use std::io::{Read, Write};

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, Serialize};

mod export;
mod mnt;
mod null;
mod umnt;
mod umnt_all;

/// One MOUNT dispatch-table row.
pub struct ProcEntry<R, W> {
    pub name: &'static str,
    pub auth_required: bool,
    run: for<'a> fn(
        u32,
        &'a mut R,
        &'a mut W,
        &'a rpc::Context,
    ) -> BoxFuture<'a, Result<(), anyhow::Error>>,
}

/// The flat MOUNT dispatch table, indexed by procedure number.
pub fn procedures<R: Read + Send, W: Write + Send>() -> [ProcEntry<R, W>; 6] {
    macro_rules! entry {
        ($name:literal, $auth:literal, $handler:path) => {{
            fn run<'a, R2: Read + Send, W2: Write + Send>(
                xid: u32,
                input: &'a mut R2,
                output: &'a mut W2,
                ctx: &'a rpc::Context,
            ) -> BoxFuture<'a, Result<(), anyhow::Error>> {
                Box::pin($handler(xid, input, output, ctx))
            }
            ProcEntry { name: $name, auth_required: $auth, run: run::<R, W> }
        }};
    }
    [
        entry!("NULL", false, null::mountproc3_null),
        entry!("MNT", false, mnt::mountproc3_mnt),
        entry!("DUMP", false, export::mountproc3_dump),
        entry!("UMNT", false, umnt::mountproc3_umnt),
        entry!("UMNTALL", false, umnt_all::mountproc3_umnt_all),
        entry!("EXPORT", false, export::mountproc3_export),
    ]
}

/// Routes one MOUNT call to its handler.
pub async fn handle_mount<R: Read + Send, W: Write + Send>(
    xid: u32,
    call: xdr::rpc::call_body,
    input: &mut R,
    output: &mut W,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let table = procedures::<R, W>();
    match table.get(call.proc as usize) {
        Some(entry) => {
            debug!(xid, proc = entry.name, "mount dispatch");
            (entry.run)(xid, input, output, context).await
        }
        None => {
            warn!("unknown MOUNT procedure {}", call.proc);
            xdr::rpc::proc_unavail_reply_message(xid).serialize(output)?;
            Ok(())
        }
    }
}
