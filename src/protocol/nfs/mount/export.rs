//! MOUNT EXPORT (procedure 5) and DUMP (procedure 2).
//!
//! EXPORT lists the exported trees; this gateway exports exactly one.
//! DUMP would list which clients mounted what; mounts are not tracked
//! per client, so the list is empty.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, Serialize};

pub(super) async fn mountproc3_export(
    xid: u32,
    _input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    debug!("mountproc3_export({xid})");
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    // exports: one list entry, no group restrictions
    true.serialize(output)?;
    context.export_name.as_bytes().to_vec().serialize(output)?;
    false.serialize(output)?; // no groups
    false.serialize(output)?; // end of exports
    Ok(())
}

pub(super) async fn mountproc3_dump(
    xid: u32,
    _input: &mut impl Read,
    output: &mut impl Write,
    _context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    debug!("mountproc3_dump({xid})");
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    // empty mount list
    false.serialize(output)?;
    Ok(())
}
