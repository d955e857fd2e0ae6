//! COMMIT (procedure 21): force UNSTABLE writes to stable storage.
//!
//! Flushes the `(offset, count)` range (zero count means to end of file)
//! through the blocking path and returns the same write verifier WRITE
//! handed out; a verifier change tells the client the server restarted
//! and its uncommitted writes must be resent.

use std::io::{Read, Write};

use tracing::{debug, error};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};

use super::{post_attr, resolve_handle, wcc_before};

pub(super) async fn nfsproc3_commit(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::file::COMMIT3args, _>(input)?;
    debug!("nfsproc3_commit({xid}, {args:?})");

    let handle = match resolve_handle(&args.file) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::wcc_data::default().serialize(output)?;
            return Ok(());
        }
    };
    let before = wcc_before(context, &handle).await;

    let flushed = context
        .blocks
        .flush_range_durable(&handle, args.offset, args.count as u64, &context.cancel)
        .await;
    let after = post_attr(context, &handle).await;
    let wcc = nfs3::wcc_data { before, after };

    match flushed {
        Ok(outcome) => {
            debug!("commit {xid} -> {outcome:?}");
            let res = nfs3::file::COMMIT3resok { file_wcc: wcc, verf: context.write_verifier };
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(output)?;
            res.serialize(output)?;
        }
        Err(e) => {
            error!("commit {xid} flush failed: {e}");
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            nfs3::nfsstat3::from(&e).serialize(output)?;
            wcc.serialize(output)?;
        }
    }
    Ok(())
}
