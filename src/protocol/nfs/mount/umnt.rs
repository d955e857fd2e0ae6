//! MOUNT UMNT (procedure 3): a client announces it no longer uses the
//! export. The reply is void; the interesting side effect is the mount
//! signal.

use std::io::{Read, Write};

use tracing::debug;

use crate::protocol::rpc;
use crate::protocol::xdr::{self, deserialize, mount, Serialize};

pub(super) async fn mountproc3_umnt(
    xid: u32,
    input: &mut impl Read,
    output: &mut impl Write,
    context: &rpc::Context,
) -> Result<(), anyhow::Error> {
    let path = deserialize::<mount::dirpath, _>(input)?;
    debug!("mountproc3_umnt({xid}, {:?})", String::from_utf8_lossy(&path));
    if let Some(ref chan) = context.mount_signal {
        let _ = chan.send(false).await;
    }
    xdr::rpc::make_success_reply(xid).serialize(output)?;
    Ok(())
}
