//! ONC RPC record marking and call dispatch (RFC 5531).
//!
//! TCP is a byte stream, so each RPC record travels as one or more
//! fragments, each prefixed by a 32-bit header: high bit = last fragment,
//! low 31 bits = fragment length. This module reassembles records under
//! the configured caps, decodes the call envelope, derives the caller's
//! authentication context, and routes the call to the NFS or MOUNT
//! program.

use std::io::Cursor;
use std::io::{Read, Write};

use anyhow::anyhow;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::meta::AuthContext;
use crate::protocol::rpc::request_pool::{PoolResult, RequestPool};
use crate::protocol::xdr::{self, deserialize, mount, nfs3, Serialize};
use crate::protocol::{nfs, rpc};

/// Decodes the caller identity from the call credential.
///
/// AUTH_UNIX bodies are parsed for uid/gid/gids; a malformed body is
/// logged and degrades to an id-less context rather than failing the
/// call. Every other flavor is accepted as id-less: downstream access
/// checks treat all flavors uniformly.
fn auth_context(call: &xdr::rpc::call_body, client_addr: &str) -> AuthContext {
    match call.cred.flavor {
        xdr::rpc::auth_flavor::AUTH_UNIX => {
            match deserialize::<xdr::rpc::auth_unix, _>(&mut Cursor::new(&call.cred.body)) {
                Ok(cred) => AuthContext::from_unix(&cred),
                Err(e) => {
                    warn!(client_addr, "malformed AUTH_UNIX credential, treating as id-less: {e}");
                    AuthContext {
                        flavor: xdr::rpc::auth_flavor::AUTH_UNIX,
                        ..AuthContext::default()
                    }
                }
            }
        }
        flavor => AuthContext { flavor, ..AuthContext::default() },
    }
}

/// Processes a single reassembled RPC record.
///
/// Validates the envelope, suppresses retransmissions, enforces the
/// non-WRITE record cap, and dispatches to the program handler. Returns
/// whether a response was produced.
pub async fn handle_rpc(
    input: &mut (impl Read + Send),
    output: &mut (impl Write + Send),
    record_len: usize,
    mut context: rpc::Context,
) -> Result<bool, anyhow::Error> {
    let recv = deserialize::<xdr::rpc::rpc_msg, _>(input)?;
    let xid = recv.xid;
    let xdr::rpc::rpc_body::CALL(call) = recv.body else {
        error!("received a REPLY where only CALLs are valid");
        return Err(anyhow!("bad RPC call format"));
    };

    if call.rpcvers != xdr::rpc::RPC_VERSION {
        warn!("invalid RPC version {} != {}", call.rpcvers, xdr::rpc::RPC_VERSION);
        xdr::rpc::rpc_vers_mismatch(xid).serialize(output)?;
        return Ok(true);
    }

    context.auth = auth_context(&call, &context.client_addr);

    if context.transaction_tracker.is_retransmission(xid, &context.client_addr) {
        debug!(xid, client_addr = %context.client_addr, "retransmission dropped");
        return Ok(false);
    }

    // The transport reassembles under the WRITE cap; everything else is
    // held to the tighter read cap once the procedure is known.
    let is_write = call.prog == nfs3::PROGRAM && call.proc == nfs3::NFSPROC3_WRITE;
    if !is_write && record_len > context.config.max_record_size_read {
        warn!(
            record_len,
            proc = call.proc,
            "record exceeds the non-WRITE cap, rejecting"
        );
        xdr::rpc::garbage_args_reply_message(xid).serialize(output)?;
        context.transaction_tracker.mark_processed(xid, &context.client_addr);
        return Ok(true);
    }

    let res = match call.prog {
        nfs3::PROGRAM => match call.vers {
            nfs3::VERSION => nfs::v3::handle_nfs(xid, call, input, output, &context).await,
            _ => {
                warn!("unsupported NFS version {} (supported {})", call.vers, nfs3::VERSION);
                xdr::rpc::prog_mismatch_reply_message(xid, nfs3::VERSION).serialize(output)?;
                Ok(())
            }
        },
        mount::PROGRAM => match call.vers {
            mount::VERSION => nfs::mount::handle_mount(xid, call, input, output, &context).await,
            _ => {
                warn!("unsupported MOUNT version {} (supported {})", call.vers, mount::VERSION);
                xdr::rpc::prog_mismatch_reply_message(xid, mount::VERSION).serialize(output)?;
                Ok(())
            }
        },
        unknown => {
            trace!("unknown RPC program {unknown}");
            xdr::rpc::prog_unavail_reply_message(xid).serialize(output)?;
            Ok(())
        }
    }
    .map(|_| true);
    context.transaction_tracker.mark_processed(xid, &context.client_addr);
    res
}

/// Reads one fragment into `append_to`, returning whether it was the
/// record's last. Rejects records growing past `max_record_len`.
async fn read_fragment(
    socket: &mut DuplexStream,
    append_to: &mut Vec<u8>,
    max_record_len: usize,
) -> Result<bool, anyhow::Error> {
    let mut header_buf = [0_u8; 4];
    socket.read_exact(&mut header_buf).await?;
    let fragment_header = u32::from_be_bytes(header_buf);
    let is_last = (fragment_header & (1 << 31)) > 0;
    let length = (fragment_header & ((1 << 31) - 1)) as usize;
    trace!(length, is_last, "reading fragment");
    if append_to.len().saturating_add(length) > max_record_len {
        return Err(anyhow!("RPC record length {} exceeds max {}", length, max_record_len));
    }
    let start_offset = append_to.len();
    append_to.resize(append_to.len() + length, 0);
    socket.read_exact(&mut append_to[start_offset..]).await?;
    Ok(is_last)
}

/// Writes `buf` as record-marked fragments. The fragments of one response
/// are emitted back to back; the caller serializes responses per
/// connection.
pub async fn write_fragment(
    socket: &mut tokio::net::TcpStream,
    buf: &[u8],
) -> Result<(), anyhow::Error> {
    const MAX_FRAGMENT_SIZE: usize = (1 << 31) - 1;

    let mut offset = 0;
    while offset < buf.len() {
        let remaining = buf.len() - offset;
        let fragment_size = std::cmp::min(remaining, MAX_FRAGMENT_SIZE);
        let is_last = offset + fragment_size >= buf.len();
        let fragment_header =
            if is_last { fragment_size as u32 + (1 << 31) } else { fragment_size as u32 };

        socket.write_all(&u32::to_be_bytes(fragment_header)).await?;
        trace!(fragment_size, is_last, "writing fragment");
        socket.write_all(&buf[offset..offset + fragment_size]).await?;

        offset += fragment_size;
    }

    Ok(())
}

pub type SocketMessageType = Result<Vec<u8>, anyhow::Error>;

/// Reassembles records from a connection's byte stream and feeds them to
/// the handler pool.
pub struct SocketMessageHandler {
    cur_fragment: Vec<u8>,
    socket_receive_channel: DuplexStream,
    context: rpc::Context,
    pool: RequestPool,
}

impl SocketMessageHandler {
    /// Wires up one connection: returns the handler, the write half the
    /// socket pump copies received bytes into, and the channel carrying
    /// finished responses.
    pub fn new(
        context: &rpc::Context,
        permits: std::sync::Arc<tokio::sync::Semaphore>,
    ) -> (Self, DuplexStream, mpsc::UnboundedReceiver<SocketMessageType>) {
        let (socksend, sockrecv) = tokio::io::duplex(256_000);
        let (msgsend, msgrecv) = mpsc::unbounded_channel();
        let (result_sender, mut result_receiver) = mpsc::unbounded_channel::<PoolResult>();

        let pool = RequestPool::new(permits, result_sender);

        // Forward completed responses to the connection writer.
        tokio::spawn(async move {
            while let Some(result) = result_receiver.recv().await {
                match result {
                    Ok(Some(response)) if response.has_content() => {
                        let _ = msgsend.send(Ok(response.into_inner()));
                    }
                    Ok(_) => {
                        // Retransmission or empty response: nothing to send.
                    }
                    Err(e) => {
                        error!("RPC error: {:?}", e);
                        let _ = msgsend.send(Err(e));
                    }
                }
            }
            debug!("response forwarder finished");
        });

        (
            Self {
                cur_fragment: Vec::new(),
                socket_receive_channel: sockrecv,
                context: context.clone(),
                pool,
            },
            socksend,
            msgrecv,
        )
    }

    /// Reads one fragment; when it completes a record, submits the record
    /// to the pool. Call in a loop.
    pub async fn read(&mut self) -> Result<(), anyhow::Error> {
        let is_last = read_fragment(
            &mut self.socket_receive_channel,
            &mut self.cur_fragment,
            self.context.config.max_record_size_write,
        )
        .await?;
        if is_last {
            let record = std::mem::take(&mut self.cur_fragment);
            self.pool.submit(record, self.context.clone());
        }
        Ok(())
    }
}
