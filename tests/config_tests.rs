//! Integration tests for configuration loading

use std::io::Write;

use entiql::config::EngineConfig;

#[test]
fn test_defaults_are_unlimited() {
    let config = EngineConfig::default();
    let exec = config.execution();
    assert_eq!(exec.timeout, None);
    assert_eq!(exec.limits.max_results, None);
    assert_eq!(exec.limits.max_intermediate, None);
    assert_eq!(exec.limits.max_depth, None);
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("entiql.toml");
    let mut file = std::fs::File::create(&path).expect("create");
    writeln!(
        file,
        "[evaluation]\nmax_results = 500\ntimeout_ms = 1500\n\n[logging]\nlevel = \"debug\"\n"
    )
    .expect("write");

    let config = EngineConfig::from_file(path.to_str().expect("utf8 path")).expect("load");
    assert_eq!(config.evaluation.max_results, Some(500));
    assert_eq!(config.evaluation.timeout_ms, Some(1500));
    assert_eq!(config.logging.level, "debug");

    let exec = config.execution();
    assert_eq!(exec.limits.max_results, Some(500));
    assert_eq!(exec.timeout, Some(std::time::Duration::from_millis(1500)));
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("entiql.toml");
    std::fs::write(&path, "[evaluation]\nmax_depth = 32\n").expect("write");

    let config = EngineConfig::from_file(path.to_str().expect("utf8 path")).expect("load");
    assert_eq!(config.evaluation.max_depth, Some(32));
    assert_eq!(config.evaluation.max_results, None);
    assert_eq!(config.logging.level, "info");
}
