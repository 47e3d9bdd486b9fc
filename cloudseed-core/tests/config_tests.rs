//! Config load/save error-message and atomic-write tests.

use cloudseed_core::{config, CoreError, SyncConfig, ZoneId};
use std::fs;

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = home.path().join("cloudseed.yaml");
    fs::write(&path, b": : corrupt : yaml : !!!\n  - broken: [unclosed").expect("write");

    let err = config::load_at(&path).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("cloudseed.yaml"));
}

#[test]
fn load_wrong_type_yaml_returns_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = home.path().join("cloudseed.yaml");
    fs::write(&path, b"- this is a list, not a mapping\n").expect("write");

    let err = config::load_at(&path).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }), "got: {err}");
}

#[test]
fn save_then_load_roundtrip_and_no_tmp_left() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = home.path().join("nested").join("cloudseed.yaml");
    let config = SyncConfig {
        default_zone: ZoneId::from("Journal"),
        max_conflict_rounds: 3,
        query_limit: 200,
        sweep_interval_secs: 45,
        document_dir: Some(home.path().join("docs")),
    };

    config::save_at(&path, &config).expect("save");
    assert!(!path.with_extension("yaml.tmp").exists(), ".tmp must be removed");

    let loaded = config::load_at(&path).expect("load");
    assert_eq!(loaded, config);
}
