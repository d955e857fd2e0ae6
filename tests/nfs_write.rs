//! WRITE / COMMIT / READ flows through the full handler stack: verifier
//! semantics, stability levels, newest-wins overlap, EOF clamping.

mod support;

use dittofs::xdr::{deserialize, nfs3};

use support::{expect_ok, parse_reply, TestGateway, TEST_VERIFIER_SEED};

fn write_args(
    handle: &dittofs::meta::FileHandle,
    offset: u64,
    data: Vec<u8>,
    stable: nfs3::file::stable_how,
) -> nfs3::file::WRITE3args {
    nfs3::file::WRITE3args {
        file: handle.to_wire(),
        offset,
        count: data.len() as u32,
        stable,
        data,
    }
}

fn read_args(handle: &dittofs::meta::FileHandle, offset: u64, count: u32) -> nfs3::file::READ3args {
    nfs3::file::READ3args { file: handle.to_wire(), offset, count }
}

#[tokio::test]
async fn unstable_write_then_commit_round_trip() {
    let gateway = TestGateway::cache_only();
    let file = gateway.add_file("payload").await;

    // 8192 bytes of 0x5A at offset 1 MiB.
    let data = vec![0x5a; 8192];
    let reply = gateway
        .call(
            nfs3::NFSPROC3_WRITE,
            &write_args(&file, 1 << 20, data.clone(), nfs3::file::stable_how::UNSTABLE),
        )
        .await;
    let mut cursor = expect_ok(&reply);
    let res = deserialize::<nfs3::file::WRITE3resok, _>(&mut cursor).expect("WRITE3resok");
    assert_eq!(res.count, 8192);
    assert_eq!(res.committed, nfs3::file::stable_how::UNSTABLE);
    assert_eq!(res.verf, TEST_VERIFIER_SEED.to_be_bytes());

    // COMMIT over (0, 0) returns the same verifier.
    let commit = nfs3::file::COMMIT3args { file: file.to_wire(), offset: 0, count: 0 };
    let reply = gateway.call(nfs3::NFSPROC3_COMMIT, &commit).await;
    let mut cursor = expect_ok(&reply);
    let res = deserialize::<nfs3::file::COMMIT3resok, _>(&mut cursor).expect("COMMIT3resok");
    assert_eq!(res.verf, TEST_VERIFIER_SEED.to_be_bytes());

    // Reading the range back returns exactly the written bytes.
    let reply = gateway.call(nfs3::NFSPROC3_READ, &read_args(&file, 1 << 20, 8192)).await;
    let mut cursor = expect_ok(&reply);
    let res = deserialize::<nfs3::file::READ3resok, _>(&mut cursor).expect("READ3resok");
    assert_eq!(res.count, 8192);
    assert_eq!(res.data, data);
    assert!(res.eof);
}

#[tokio::test]
async fn overlapping_writes_read_newest_wins() {
    let gateway = TestGateway::cache_only();
    let file = gateway.add_file("overlap").await;

    let reply = gateway
        .call(
            nfs3::NFSPROC3_WRITE,
            &write_args(&file, 0, vec![b'A'; 1024], nfs3::file::stable_how::UNSTABLE),
        )
        .await;
    expect_ok(&reply);
    let reply = gateway
        .call(
            nfs3::NFSPROC3_WRITE,
            &write_args(&file, 512, vec![b'B'; 1024], nfs3::file::stable_how::UNSTABLE),
        )
        .await;
    expect_ok(&reply);

    let reply = gateway.call(nfs3::NFSPROC3_READ, &read_args(&file, 0, 1536)).await;
    let mut cursor = expect_ok(&reply);
    let res = deserialize::<nfs3::file::READ3resok, _>(&mut cursor).expect("READ3resok");
    assert_eq!(res.count, 1536);
    assert_eq!(&res.data[..512], &[b'A'; 512][..]);
    assert_eq!(&res.data[512..], &[b'B'; 1024][..]);
}

#[tokio::test]
async fn read_at_eof_returns_zero_bytes_and_eof() {
    let gateway = TestGateway::cache_only();
    let file = gateway.add_file("eof").await;

    let reply = gateway
        .call(
            nfs3::NFSPROC3_WRITE,
            &write_args(&file, 0, vec![1; 100], nfs3::file::stable_how::UNSTABLE),
        )
        .await;
    expect_ok(&reply);

    let reply = gateway.call(nfs3::NFSPROC3_READ, &read_args(&file, 100, 50)).await;
    let mut cursor = expect_ok(&reply);
    let res = deserialize::<nfs3::file::READ3resok, _>(&mut cursor).expect("READ3resok");
    assert_eq!(res.count, 0);
    assert!(res.data.is_empty());
    assert!(res.eof);

    // A read straddling EOF is clamped.
    let reply = gateway.call(nfs3::NFSPROC3_READ, &read_args(&file, 80, 50)).await;
    let mut cursor = expect_ok(&reply);
    let res = deserialize::<nfs3::file::READ3resok, _>(&mut cursor).expect("READ3resok");
    assert_eq!(res.count, 20);
    assert!(res.eof);
}

#[tokio::test]
async fn sync_write_reaches_the_content_store() {
    let gateway = TestGateway::with_store();
    let file = gateway.add_file("durable").await;
    let store = gateway.store.as_ref().expect("store-backed gateway");
    assert_eq!(store.block_count(), 0);

    let reply = gateway
        .call(
            nfs3::NFSPROC3_WRITE,
            &write_args(&file, 0, vec![6; 256], nfs3::file::stable_how::DATA_SYNC),
        )
        .await;
    let mut cursor = expect_ok(&reply);
    let res = deserialize::<nfs3::file::WRITE3resok, _>(&mut cursor).expect("WRITE3resok");
    assert_eq!(res.committed, nfs3::file::stable_how::DATA_SYNC);
    assert!(store.block_count() > 0, "sync write must be durable before the reply");
}

#[tokio::test]
async fn commit_after_unstable_write_is_durable() {
    let gateway = TestGateway::with_store();
    let file = gateway.add_file("commit-durable").await;
    let store = gateway.store.as_ref().expect("store-backed gateway");

    let reply = gateway
        .call(
            nfs3::NFSPROC3_WRITE,
            &write_args(&file, 0, vec![9; 512], nfs3::file::stable_how::UNSTABLE),
        )
        .await;
    expect_ok(&reply);

    let commit = nfs3::file::COMMIT3args { file: file.to_wire(), offset: 0, count: 0 };
    let reply = gateway.call(nfs3::NFSPROC3_COMMIT, &commit).await;
    expect_ok(&reply);
    assert!(store.block_count() > 0);
}

#[tokio::test]
async fn restart_changes_the_verifier() {
    let gateway = TestGateway::cache_only();
    let file = gateway.add_file("restartable").await;

    let reply = gateway
        .call(
            nfs3::NFSPROC3_WRITE,
            &write_args(&file, 0, vec![4; 16], nfs3::file::stable_how::UNSTABLE),
        )
        .await;
    let mut cursor = expect_ok(&reply);
    let res = deserialize::<nfs3::file::WRITE3resok, _>(&mut cursor).expect("WRITE3resok");
    let old_verifier = res.verf;

    // A restarted server derives a different verifier; a COMMIT there
    // reveals the mismatch to the client.
    let restarted = TestGateway::restarted();
    let file = restarted.add_file("restartable").await;
    let commit = nfs3::file::COMMIT3args { file: file.to_wire(), offset: 0, count: 0 };
    let reply = restarted.call(nfs3::NFSPROC3_COMMIT, &commit).await;
    let mut cursor = expect_ok(&reply);
    let res = deserialize::<nfs3::file::COMMIT3resok, _>(&mut cursor).expect("COMMIT3resok");
    assert_ne!(res.verf, old_verifier, "client must observe the restart");
}

#[tokio::test]
async fn write_to_directory_is_isdir() {
    let gateway = TestGateway::cache_only();
    let dir = gateway.add_dir("subdir").await;

    let reply = gateway
        .call(
            nfs3::NFSPROC3_WRITE,
            &write_args(&dir, 0, vec![1; 4], nfs3::file::stable_how::UNSTABLE),
        )
        .await;
    let (status, _) = parse_reply(&reply);
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_ISDIR);
}

#[tokio::test]
async fn stale_handle_is_reported() {
    let gateway = TestGateway::cache_only();
    let ghost = dittofs::meta::FileHandle::from_file_id(0xdead);

    let reply = gateway.call(nfs3::NFSPROC3_READ, &read_args(&ghost, 0, 1)).await;
    let (status, _) = parse_reply(&reply);
    assert_eq!(status, nfs3::nfsstat3::NFS3ERR_STALE);
}
