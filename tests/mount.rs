//! MOUNT program: MNT path resolution, auth-flavor advertisement, and
//! the mount/unmount signal.

mod support;

use std::io::Cursor;

use tokio::sync::mpsc;

use dittofs::protocol::nfs::mount::handle_mount;
use dittofs::xdr::{self, deserialize, mount, nfs3, Serialize};

use support::TestGateway;

async fn call_mount(gateway: &TestGateway, proc: u32, args: Vec<u8>) -> Vec<u8> {
    let call = xdr::rpc::call_body {
        rpcvers: 2,
        prog: mount::PROGRAM,
        vers: mount::VERSION,
        proc,
        cred: xdr::rpc::opaque_auth::default(),
        verf: xdr::rpc::opaque_auth::default(),
    };
    let mut input = Cursor::new(args);
    let mut output = Cursor::new(Vec::new());
    handle_mount(9, call, &mut input, &mut output, &gateway.context)
        .await
        .expect("handle_mount");
    output.into_inner()
}

fn skip_envelope(reply: &[u8]) -> Cursor<Vec<u8>> {
    let mut cursor = Cursor::new(reply.to_vec());
    let _msg = deserialize::<xdr::rpc::rpc_msg, _>(&mut cursor).expect("reply envelope");
    cursor
}

#[tokio::test]
async fn mnt_returns_root_handle_and_flavors() {
    let mut gateway = TestGateway::cache_only();
    let (tx, mut rx) = mpsc::channel(4);
    gateway.context.mount_signal = Some(tx);

    let mut args = Vec::new();
    b"/".to_vec().serialize(&mut args).expect("dirpath");
    let reply = call_mount(&gateway, mount::MOUNTPROC3_MNT, args).await;

    let mut cursor = skip_envelope(&reply);
    let status = deserialize::<u32, _>(&mut cursor).expect("mount status");
    assert_eq!(status, 0, "MNT3_OK expected");
    let res = deserialize::<mount::mountres3_ok, _>(&mut cursor).expect("mountres3_ok");
    assert_eq!(res.fhandle, gateway.root().as_bytes());
    assert_eq!(res.auth_flavors, vec![0, 1], "AUTH_NONE and AUTH_UNIX");

    assert_eq!(rx.recv().await, Some(true), "mount event signalled");
}

#[tokio::test]
async fn mnt_resolves_a_subdirectory_of_the_export() {
    let gateway = TestGateway::cache_only();
    let dir = gateway.add_dir("exports").await;

    let mut args = Vec::new();
    b"/exports".to_vec().serialize(&mut args).expect("dirpath");
    let reply = call_mount(&gateway, mount::MOUNTPROC3_MNT, args).await;

    let mut cursor = skip_envelope(&reply);
    let status = deserialize::<u32, _>(&mut cursor).expect("mount status");
    assert_eq!(status, 0);
    let res = deserialize::<mount::mountres3_ok, _>(&mut cursor).expect("mountres3_ok");
    assert_eq!(res.fhandle, dir.as_bytes());
}

#[tokio::test]
async fn mnt_unknown_path_is_noent() {
    let gateway = TestGateway::cache_only();

    let mut args = Vec::new();
    b"/missing".to_vec().serialize(&mut args).expect("dirpath");
    let reply = call_mount(&gateway, mount::MOUNTPROC3_MNT, args).await;

    let mut cursor = skip_envelope(&reply);
    let status = deserialize::<u32, _>(&mut cursor).expect("mount status");
    assert_eq!(status, mount::mountstat3::MNT3ERR_NOENT as u32);
}

#[tokio::test]
async fn umnt_signals_unmount() {
    let mut gateway = TestGateway::cache_only();
    let (tx, mut rx) = mpsc::channel(4);
    gateway.context.mount_signal = Some(tx);

    let mut args = Vec::new();
    b"/".to_vec().serialize(&mut args).expect("dirpath");
    let _reply = call_mount(&gateway, mount::MOUNTPROC3_UMNT, args).await;
    assert_eq!(rx.recv().await, Some(false));
}

#[tokio::test]
async fn export_lists_the_single_export() {
    let gateway = TestGateway::cache_only();
    let reply = call_mount(&gateway, mount::MOUNTPROC3_EXPORT, Vec::new()).await;

    let mut cursor = skip_envelope(&reply);
    assert!(deserialize::<bool, _>(&mut cursor).expect("has entry"));
    let path = deserialize::<Vec<u8>, _>(&mut cursor).expect("export path");
    assert_eq!(path, b"/");
    assert!(!deserialize::<bool, _>(&mut cursor).expect("no groups"));
    assert!(!deserialize::<bool, _>(&mut cursor).expect("end of list"));
}

#[tokio::test]
async fn unknown_mount_procedure_is_proc_unavail() {
    let gateway = TestGateway::cache_only();
    let reply = call_mount(&gateway, 42, Vec::new()).await;

    let msg = deserialize::<xdr::rpc::rpc_msg, _>(&mut &reply[..]).expect("reply envelope");
    match msg.body {
        xdr::rpc::rpc_body::REPLY(xdr::rpc::reply_body::MSG_ACCEPTED(acc)) => {
            assert!(matches!(acc.reply_data, xdr::rpc::accept_body::PROC_UNAVAIL))
        }
        other => panic!("expected PROC_UNAVAIL, got {other:?}"),
    }
}

#[tokio::test]
async fn null_procedures_succeed() {
    let gateway = TestGateway::cache_only();
    let reply = call_mount(&gateway, mount::MOUNTPROC3_NULL, Vec::new()).await;
    assert!(!reply.is_empty());

    // The NFS-side NULL as well, for liveness probing parity.
    let reply = gateway.call_raw(nfs3::NFSPROC3_NULL, Vec::new()).await;
    assert!(!reply.is_empty());
}
