//! RPC engine behavior: record caps, envelope validation, credential
//! handling and retransmission suppression.

mod support;

use std::io::Cursor;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use dittofs::protocol::rpc::{handle_rpc, SocketMessageHandler};
use dittofs::xdr::{self, deserialize, nfs3, Serialize};

use support::TestGateway;

fn call_message(xid: u32, rpcvers: u32, prog: u32, vers: u32, proc: u32) -> Vec<u8> {
    let msg = xdr::rpc::rpc_msg {
        xid,
        body: xdr::rpc::rpc_body::CALL(xdr::rpc::call_body {
            rpcvers,
            prog,
            vers,
            proc,
            cred: xdr::rpc::opaque_auth::default(),
            verf: xdr::rpc::opaque_auth::default(),
        }),
    };
    let mut buf = Vec::new();
    msg.serialize(&mut buf).expect("serialize call");
    buf
}

async fn run_rpc(gateway: &TestGateway, record: Vec<u8>) -> (bool, Vec<u8>) {
    let record_len = record.len();
    let mut input = Cursor::new(record);
    let mut output = Cursor::new(Vec::new());
    let responded = handle_rpc(&mut input, &mut output, record_len, gateway.context.clone())
        .await
        .expect("handle_rpc");
    (responded, output.into_inner())
}

fn reply_body(reply: &[u8]) -> xdr::rpc::reply_body {
    let msg = deserialize::<xdr::rpc::rpc_msg, _>(&mut &reply[..]).expect("reply envelope");
    match msg.body {
        xdr::rpc::rpc_body::REPLY(body) => body,
        other => panic!("expected REPLY, got {other:?}"),
    }
}

#[tokio::test]
async fn rejects_oversized_rpc_fragment() {
    let gateway = TestGateway::cache_only();
    let permits = Arc::new(Semaphore::new(4));
    let (mut handler, mut socksend, _msgrecv) =
        SocketMessageHandler::new(&gateway.context, permits);

    let oversized = gateway.context.config.max_record_size_write + 1;
    let fragment_header = (1_u32 << 31) | (oversized as u32);
    socksend
        .write_all(&fragment_header.to_be_bytes())
        .await
        .expect("write fragment header");

    let err = handler.read().await.expect_err("expected oversize error");
    assert!(err.to_string().contains("exceeds max"), "unexpected error: {err:?}");
}

#[tokio::test]
async fn oversized_non_write_record_is_garbage_args() {
    let gateway = TestGateway::cache_only();
    let record = call_message(31, 2, nfs3::PROGRAM, nfs3::VERSION, nfs3::NFSPROC3_READ);
    let record_len = gateway.context.config.max_record_size_read + 1;

    let mut input = Cursor::new(record);
    let mut output = Cursor::new(Vec::new());
    let responded = handle_rpc(&mut input, &mut output, record_len, gateway.context.clone())
        .await
        .expect("handle_rpc");
    assert!(responded);

    match reply_body(&output.into_inner()) {
        xdr::rpc::reply_body::MSG_ACCEPTED(acc) => {
            assert!(matches!(acc.reply_data, xdr::rpc::accept_body::GARBAGE_ARGS))
        }
        other => panic!("expected accepted GARBAGE_ARGS, got {other:?}"),
    }
}

#[tokio::test]
async fn rpc_version_mismatch_is_denied() {
    let gateway = TestGateway::cache_only();
    let record = call_message(32, 3, nfs3::PROGRAM, nfs3::VERSION, nfs3::NFSPROC3_NULL);
    let (responded, reply) = run_rpc(&gateway, record).await;
    assert!(responded);

    match reply_body(&reply) {
        xdr::rpc::reply_body::MSG_DENIED(xdr::rpc::rejected_reply::RPC_MISMATCH(info)) => {
            assert_eq!(info.low, 2);
            assert_eq!(info.high, 2);
        }
        other => panic!("expected RPC_MISMATCH, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_program_is_prog_unavail() {
    let gateway = TestGateway::cache_only();
    let record = call_message(33, 2, 100099, 1, 0);
    let (_, reply) = run_rpc(&gateway, record).await;

    match reply_body(&reply) {
        xdr::rpc::reply_body::MSG_ACCEPTED(acc) => {
            assert!(matches!(acc.reply_data, xdr::rpc::accept_body::PROG_UNAVAIL))
        }
        other => panic!("expected PROG_UNAVAIL, got {other:?}"),
    }
}

#[tokio::test]
async fn unsupported_nfs_version_is_prog_mismatch() {
    let gateway = TestGateway::cache_only();
    let record = call_message(34, 2, nfs3::PROGRAM, nfs3::VERSION + 1, nfs3::NFSPROC3_NULL);
    let (_, reply) = run_rpc(&gateway, record).await;

    match reply_body(&reply) {
        xdr::rpc::reply_body::MSG_ACCEPTED(acc) => match acc.reply_data {
            xdr::rpc::accept_body::PROG_MISMATCH(info) => {
                assert_eq!(info.low, nfs3::VERSION);
                assert_eq!(info.high, nfs3::VERSION);
            }
            other => panic!("expected PROG_MISMATCH, got {other:?}"),
        },
        other => panic!("expected accepted reply, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_procedure_is_proc_unavail() {
    let gateway = TestGateway::cache_only();
    let record = call_message(35, 2, nfs3::PROGRAM, nfs3::VERSION, 22);
    let (_, reply) = run_rpc(&gateway, record).await;

    match reply_body(&reply) {
        xdr::rpc::reply_body::MSG_ACCEPTED(acc) => {
            assert!(matches!(acc.reply_data, xdr::rpc::accept_body::PROC_UNAVAIL))
        }
        other => panic!("expected PROC_UNAVAIL, got {other:?}"),
    }
}

#[tokio::test]
async fn retransmission_is_dropped_without_reply() {
    let gateway = TestGateway::cache_only();
    let record = call_message(36, 2, nfs3::PROGRAM, nfs3::VERSION, nfs3::NFSPROC3_NULL);

    let (first, reply) = run_rpc(&gateway, record.clone()).await;
    assert!(first);
    assert!(!reply.is_empty());

    let (second, reply) = run_rpc(&gateway, record).await;
    assert!(!second, "duplicate xid from the same client must be dropped");
    assert!(reply.is_empty());
}

#[tokio::test]
async fn malformed_auth_unix_degrades_to_anonymous() {
    let gateway = TestGateway::cache_only();

    // A credential body that is far too short to parse.
    let msg = xdr::rpc::rpc_msg {
        xid: 37,
        body: xdr::rpc::rpc_body::CALL(xdr::rpc::call_body {
            rpcvers: 2,
            prog: nfs3::PROGRAM,
            vers: nfs3::VERSION,
            proc: nfs3::NFSPROC3_GETATTR,
            cred: xdr::rpc::opaque_auth {
                flavor: xdr::rpc::auth_flavor::AUTH_UNIX,
                body: vec![1, 2, 3],
            },
            verf: xdr::rpc::opaque_auth::default(),
        }),
    };
    let mut record = Vec::new();
    msg.serialize(&mut record).expect("serialize call");
    gateway.root().to_wire().serialize(&mut record).expect("append args");

    let (responded, reply) = run_rpc(&gateway, record).await;
    assert!(responded, "the call must proceed with an id-less context");
    let cursor = support::expect_ok(&reply);
    drop(cursor);
}

#[tokio::test]
async fn well_formed_auth_unix_is_accepted() {
    let gateway = TestGateway::cache_only();

    let cred = xdr::rpc::auth_unix {
        stamp: 7,
        machinename: b"client".to_vec(),
        uid: 1000,
        gid: 100,
        gids: vec![10, 20],
    };
    let mut cred_body = Vec::new();
    cred.serialize(&mut cred_body).expect("serialize cred");

    let msg = xdr::rpc::rpc_msg {
        xid: 38,
        body: xdr::rpc::rpc_body::CALL(xdr::rpc::call_body {
            rpcvers: 2,
            prog: nfs3::PROGRAM,
            vers: nfs3::VERSION,
            proc: nfs3::NFSPROC3_GETATTR,
            cred: xdr::rpc::opaque_auth {
                flavor: xdr::rpc::auth_flavor::AUTH_UNIX,
                body: cred_body,
            },
            verf: xdr::rpc::opaque_auth::default(),
        }),
    };
    let mut record = Vec::new();
    msg.serialize(&mut record).expect("serialize call");
    gateway.root().to_wire().serialize(&mut record).expect("append args");

    let (responded, reply) = run_rpc(&gateway, record).await;
    assert!(responded);
    support::expect_ok(&reply);
}
