//! Configuration parsing and validation.

use std::time::Duration;

use dittofs::config::{CoreConfig, SparseReadFill};

#[test]
fn defaults_are_sane() {
    let config = CoreConfig::default();
    assert_eq!(config.chunk_size, 4 * 1024 * 1024);
    assert_eq!(config.max_record_size_read, 1024 * 1024);
    assert_eq!(config.max_record_size_write, 16 * 1024 * 1024);
    assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    assert_eq!(config.sparse_read_fill, SparseReadFill::Zero);
    assert!(config.write_verifier_seed.is_none());
    config.validate().expect("defaults validate");
}

#[test]
fn parses_from_toml_with_partial_overrides() {
    let config: CoreConfig = toml::from_str(
        r#"
        chunk_size = 1048576
        upload_workers = 8
        sparse_read_fill = "fail"
        write_verifier_seed = 42
        shutdown_timeout = 3
        "#,
    )
    .expect("parse config");

    assert_eq!(config.chunk_size, 1 << 20);
    assert_eq!(config.upload_workers, 8);
    assert_eq!(config.sparse_read_fill, SparseReadFill::Fail);
    assert_eq!(config.write_verifier_seed, Some(42));
    assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
    // untouched fields keep their defaults
    assert_eq!(config.upload_queue_depth, 64);
    config.validate().expect("overrides validate");
}

#[test]
fn unknown_keys_are_rejected() {
    toml::from_str::<CoreConfig>("not_an_option = true").expect_err("unknown key");
}

#[test]
fn validation_catches_bad_values() {
    let config = CoreConfig { chunk_size: 3000, ..CoreConfig::default() };
    config.validate().expect_err("non power-of-two chunk size");

    let config = CoreConfig {
        max_record_size_read: 32 * 1024 * 1024,
        ..CoreConfig::default()
    };
    config.validate().expect_err("read cap above write cap");

    let config = CoreConfig { upload_workers: 0, ..CoreConfig::default() };
    config.validate().expect_err("zero workers");
}
