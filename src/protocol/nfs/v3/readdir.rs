//! READDIR (procedure 16): list directory entries.
//!
//! Entries come back in insertion order; the cookie is the 1-based index
//! of the last entry returned, so a client resumes by passing it back.
//! The cookie verifier derives from the directory mtime and changes only
//! when the directory is modified; clients use it to notice concurrent
//! modification. Output is truncated to the client's `dircount` byte
//! budget with a counting writer; `eof` is set only when the final entry
//! was emitted.

use std::io::{Read, Write};

use tracing::{debug, trace};

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, nfs3, Serialize};
use crate::write_counter::WriteCounter;

use super::{meta_status, resolve_handle};

/// Reply framing overhead reserved out of the byte budget: the final
/// false-entry marker and the eof flag.
const TRAILER_RESERVE: usize = 128;

/// Verifier derived from the directory's modification time.
pub(super) fn cookie_verifier(attrs: &nfs3::fattr3) -> nfs3::cookieverf3 {
    let version = ((attrs.mtime.seconds as u64) << 32) | attrs.mtime.nseconds as u64;
    version.to_be_bytes()
}

pub(super) async fn nfsproc3_readdir(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let args = deserialize::<nfs3::dir::READDIR3args, _>(input)?;
    debug!("nfsproc3_readdir({xid}, {args:?})");

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
            let max_bytes = (args.dircount as usize).saturating_sub(TRAILER_RESERVE);
            let mut counting_output = WriteCounter::new(output);
            let mut all_written = true;
            let mut emitted = 0_usize;

            xdr::rpc::make_success_reply(xid).serialize(&mut counting_output)?;
            nfs3::nfsstat3::NFS3_OK.serialize(&mut counting_output)?;
            dir_attr.serialize(&mut counting_output)?;
            verifier.serialize(&mut counting_output)?;

            let start = args.cookie as usize;
            for (index, child) in children.iter().enumerate().skip(start) {
                let entry = nfs3::dir::entry3 {
                    fileid: child.attrs.fileid,
                    name: child.name.clone(),
                    cookie: index as u64 + 1,
                };
                let mut staged: Vec<u8> = Vec::new();
                true.serialize(&mut staged)?;
                entry.serialize(&mut staged)?;
                if counting_output.bytes_written() + staged.len() >= max_bytes {
                    trace!("readdir {xid} budget exhausted, truncating");
                    all_written = false;
                    break;
                }
                counting_output.write_all(&staged)?;
                emitted += 1;
            }

            // terminate the entry list
            false.serialize(&mut counting_output)?;
            let eof = all_written;
            eof.serialize(&mut counting_output)?;
            debug!("readdir {xid} cookie {} -> {emitted} entries, eof {eof}", args.cookie);
        }
        Err(e) => {
            let stat = meta_status("readdir", xid, &e);
            xdr::rpc::make_success_reply(xid).serialize(output)?;
            stat.serialize(output)?;
            dir_attr.serialize(output)?;
        }
    }
    Ok(())
}
