//! READDIRPLUS (procedure 17): list directory entries with attributes
//! and handles.
//!
//! Same pagination scheme as READDIR, with two byte budgets: `dircount`
//! covers just the name/id/cookie portion, `maxcount` the full encoded
//! reply. Each entry additionally carries the child's `fattr3` and
//! handle, saving the client a LOOKUP per name.

use std::io::{Read, Write};

use tracing::{debug, trace};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::write_counter::WriteCounter;

use super::readdir::cookie_verifier;
use super::{meta_status, resolve_handle};

const TRAILER_RESERVE: usize = 128;

pub(super) async fn nfsproc3_readdirplus(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::dir::READDIRPLUS3args, _>(input)?;
    debug!("nfsproc3_readdirplus({xid}, {args:?})");

    let dir = match resolve_handle(&args.dir) {
        Ok(handle) => handle,
        Err(stat) => {
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            nfs3::post_op_attr::None.serialize(output)?;
            return Ok(());
        }
    };
    let dir_attr = context.repo.get_file(&dir).await.ok();
    let verifier = dir_attr.as_ref().map(cookie_verifier).unwrap_or_default();

    match context.repo.get_children(&dir).await {
        Ok(children) => {
            let max_bytes = (args.maxcount as usize).saturating_sub(TRAILER_RESERVE);
            let mut name_budget = args.dircount as usize;
            let mut counting_output = WriteCounter::new(output);
            let mut all_written = true;
            let mut emitted = 0_usize;

            xdr::rpc::make_success_reply(xid).serialize(&mut counting_output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(&mut counting_output)?;
            dir_attr.serialize(&mut counting_output)?;
            verifier.serialize(&mut counting_output)?;

            let start = args.cookie as usize;
            for (index, child) in children.iter().enumerate().skip(start) {
                let entry = nfs3::dir::entryplus3 {
                    fileid: child.attrs.fileid,
                    name: child.name.clone(),
                    cookie: index as u64 + 1,
                    name_attributes: nfs3::post_op_attr::Some(child.attrs),
                    name_handle: nfs3::post_op_fh3::Some(child.handle.to_wire()),
                };
                let name_cost = std::mem::size_of::<nfs3::fileid3>()
                    + std::mem::size_of::<u32>()
                    + entry.name.len()
                    + std::mem::size_of::<nfs3::cookie3>();
                let mut staged: Vec<u8> = Vec::new();
                true.serialize(&mut staged)?;
                entry.serialize(&mut staged)?;
                if counting_output.bytes_written() + staged.len() >= max_bytes
                    || name_cost > name_budget
                {
                    trace!("readdirplus {xid} budget exhausted, truncating");
                    all_written = false;
                    break;
                }
                name_budget -= name_cost;
                counting_output.write_all(&staged)?;
                emitted += 1;
            }

            false.serialize(&mut counting_output)?;
            let eof = all_written;
            eof.serialize(&mut counting_output)?;
            debug!("readdirplus {xid} cookie {} -> {emitted} entries, eof {eof}", args.cookie);
        }
        Err(e) => {
            let stat = meta_status("readdirplus", xid, &e);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            dir_attr.serialize(output)?;
        }
    }
    Ok(())
}
