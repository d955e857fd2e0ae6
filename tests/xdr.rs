//! XDR codec properties: encode/decode bijection for primitives and
//! compound records, padding alignment, and the protocol boundary
//! behaviors (handle and credential limits).

use std::fmt::Debug;

use dittofs::xdr::{self, deserialize, nfs3, Deserialize, Serialize};

#[derive(Default)]
struct Context {
    buf: Vec<u8>,
}

trait TestValue: Deserialize + Serialize + Eq + Default + Debug + Clone {}
impl<T: Deserialize + Serialize + Eq + Default + Debug + Clone> TestValue for T {}

impl Context {
    /// Serializes the value at several buffer offsets and asserts the
    /// round trip reproduces it, with everything 4-byte aligned.
    fn check<T: TestValue>(&mut self, src_value: &T) {
        for capacity in 0..32 {
            for existing in 0..capacity {
                self.buf = Vec::with_capacity(capacity);
                self.buf.resize(existing, Default::default());

                src_value.serialize(&mut self.buf).expect("cannot serialize");
                assert_eq!((self.buf.len() - existing) % 4, 0);

                let result_value =
                    deserialize::<T, _>(&mut &self.buf[existing..]).expect("cannot deserialize");

                assert_eq!(src_value, &result_value);
            }
        }
    }

    fn check_multi<T: TestValue>(&mut self, src_values: &[T]) {
        src_values.iter().for_each(|i| self.check(i));
    }
}

#[test]
fn scalar_bijection() {
    let mut ctx = Context::default();

    ctx.check_multi(&[true, false]);

    ctx.check_multi(&[i32::MIN, -1i32, 0i32, 1i32, i32::MAX]);
    ctx.check_multi(&[i64::MIN, -1i64, 0i64, 1i64, i64::MAX]);

    ctx.check_multi(&[u32::MIN, 1u32, 2u32, u32::MAX]);
    ctx.check_multi(&[u64::MIN, 1u64, 2u64, u64::MAX]);
}

#[test]
fn opaque_bijection() {
    let mut ctx = Context::default();

    ctx.check(&[1u8]);
    ctx.check(&[1u8, 2u8, 3u8]);
    ctx.check(&[1u8, 2u8, 3u8, 4u8, 5u8, 6u8]);

    ctx.check_multi(&[
        Vec::<u8>::new(),
        vec![1u8],
        vec![1u8, 2u8, 3u8],
        vec![1u8, 2u8, 3u8, 4u8],
        vec![0u8; 255],
    ]);
    ctx.check_multi(&[Vec::<u32>::new(), vec![1u32], vec![1u32, 2u32, 3u32]]);
}

#[test]
fn string_bijection() {
    let mut ctx = Context::default();
    ctx.check_multi(&[
        String::new(),
        String::from("abc1234+-"),
        String::from("abc"),
    ]);
}

#[test]
fn option_union_bijection() {
    let mut ctx = Context::default();
    ctx.check_multi(&[None, Some(7u64)]);
    ctx.check_multi(&[None, Some(nfs3::nfstime3 { seconds: 12, nseconds: 34 })]);
}

#[test]
fn compound_records_round_trip() {
    let attrs = nfs3::fattr3 {
        ftype: nfs3::ftype3::NF3REG,
        mode: 0o644,
        nlink: 2,
        uid: 1000,
        gid: 100,
        size: 4096,
        used: 4096,
        rdev: nfs3::specdata3 { specdata1: 3, specdata2: 9 },
        fsid: 77,
        fileid: 42,
        atime: nfs3::nfstime3 { seconds: 1, nseconds: 2 },
        mtime: nfs3::nfstime3 { seconds: 3, nseconds: 4 },
        ctime: nfs3::nfstime3 { seconds: 5, nseconds: 6 },
    };
    let mut buf = Vec::new();
    attrs.serialize(&mut buf).expect("serialize fattr3");
    assert_eq!(buf.len() % 4, 0);
    let decoded = deserialize::<nfs3::fattr3, _>(&mut &buf[..]).expect("decode fattr3");
    assert_eq!(attrs, decoded);

    let wcc = nfs3::wcc_data {
        before: Some(nfs3::wcc_attr::from(attrs)),
        after: Some(attrs),
    };
    let mut buf = Vec::new();
    wcc.serialize(&mut buf).expect("serialize wcc_data");
    let decoded = deserialize::<nfs3::wcc_data, _>(&mut &buf[..]).expect("decode wcc_data");
    assert_eq!(decoded.before.expect("before present").size, attrs.size);
    assert_eq!(decoded.after.expect("after present").fileid, attrs.fileid);
}

#[test]
fn write_args_round_trip() {
    let args = nfs3::file::WRITE3args {
        file: nfs3::nfs_fh3 { data: vec![0, 0, 0, 0, 0, 0, 0, 9] },
        offset: 1 << 20,
        count: 4,
        stable: nfs3::file::stable_how::DATA_SYNC,
        data: b"data".to_vec(),
    };
    let mut buf = Vec::new();
    args.serialize(&mut buf).expect("serialize WRITE3args");
    let decoded =
        deserialize::<nfs3::file::WRITE3args, _>(&mut &buf[..]).expect("decode WRITE3args");
    assert_eq!(decoded.file.data, args.file.data);
    assert_eq!(decoded.offset, args.offset);
    assert_eq!(decoded.count, args.count);
    assert_eq!(decoded.stable, args.stable);
    assert_eq!(decoded.data, args.data);
}

#[test]
fn rpc_call_round_trip() {
    let msg = xdr::rpc::rpc_msg {
        xid: 99,
        body: xdr::rpc::rpc_body::CALL(xdr::rpc::call_body {
            rpcvers: 2,
            prog: nfs3::PROGRAM,
            vers: nfs3::VERSION,
            proc: nfs3::NFSPROC3_READ,
            cred: xdr::rpc::opaque_auth::default(),
            verf: xdr::rpc::opaque_auth::default(),
        }),
    };
    let mut buf = Vec::new();
    msg.serialize(&mut buf).expect("serialize rpc_msg");
    let decoded = deserialize::<xdr::rpc::rpc_msg, _>(&mut &buf[..]).expect("decode rpc_msg");
    assert_eq!(decoded.xid, 99);
    match decoded.body {
        xdr::rpc::rpc_body::CALL(call) => {
            assert_eq!(call.prog, nfs3::PROGRAM);
            assert_eq!(call.proc, nfs3::NFSPROC3_READ);
        }
        other => panic!("expected CALL, got {other:?}"),
    }
}

#[test]
fn file_handle_length_limits() {
    // 64 bytes is the protocol maximum and decodes fine.
    let max = nfs3::nfs_fh3 { data: vec![7; 64] };
    let mut buf = Vec::new();
    max.serialize(&mut buf).expect("serialize handle");
    let decoded = deserialize::<nfs3::nfs_fh3, _>(&mut &buf[..]).expect("decode max handle");
    assert_eq!(decoded.data.len(), 64);

    // 65 bytes must fail at the decode layer.
    let mut buf = Vec::new();
    vec![7u8; 65].serialize(&mut buf).expect("serialize oversized opaque");
    let err = deserialize::<nfs3::nfs_fh3, _>(&mut &buf[..]).expect_err("oversized handle");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn auth_unix_gid_cap() {
    let good = xdr::rpc::auth_unix {
        stamp: 1,
        machinename: b"client".to_vec(),
        uid: 1000,
        gid: 100,
        gids: (0..16).collect(),
    };
    let mut buf = Vec::new();
    good.serialize(&mut buf).expect("serialize auth_unix");
    let decoded = deserialize::<xdr::rpc::auth_unix, _>(&mut &buf[..]).expect("decode auth_unix");
    assert_eq!(decoded, good);

    let overflowing = xdr::rpc::auth_unix { gids: (0..17).collect(), ..good };
    let mut buf = Vec::new();
    overflowing.serialize(&mut buf).expect("serialize");
    deserialize::<xdr::rpc::auth_unix, _>(&mut &buf[..]).expect_err("17 gids must be rejected");
}

#[test]
fn enum_rejects_unknown_discriminant() {
    let mut buf = Vec::new();
    1234u32.serialize(&mut buf).expect("serialize discriminant");
    deserialize::<nfs3::ftype3, _>(&mut &buf[..]).expect_err("bogus ftype3");
    deserialize::<nfs3::createmode3, _>(&mut &buf[..]).expect_err("bogus createmode3");
}
