use std::fs;

use membrane_core::KindId;
use membrane_runtime::config::{CONFIG_FILE, ConfigError};
use membrane_runtime::{Host, HostError};
use tempfile::TempDir;

fn write_config(content: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE), content).unwrap();
    dir
}

#[test]
fn host_from_config_file() {
    let dir = write_config(
        r#"
[heap]
max_objects = 1000

[logging]
filter = "membrane_runtime=debug"

[modules]
enabled = ["errors", "simple"]
"#,
    );

    let host = Host::from_config_path(&dir.path().join(CONFIG_FILE)).unwrap();
    assert_eq!(host.module_names().collect::<Vec<_>>(), vec!["errors", "simple"]);
    assert_eq!(host.config().heap.max_objects, Some(1000));
    assert_eq!(host.config().logging.filter, "membrane_runtime=debug");

    let err = host.call("errors", "raise_value_error", vec![]).unwrap_err();
    assert_eq!(err.exception().unwrap().kind(), KindId::VALUE_ERROR);
}

#[test]
fn empty_file_loads_every_builtin() {
    let dir = write_config("");
    let host = Host::from_config_path(&dir.path().join(CONFIG_FILE)).unwrap();
    assert_eq!(
        host.module_names().collect::<Vec<_>>(),
        vec!["simple", "args", "errors", "threads", "types_demo"]
    );
}

#[test]
fn missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE);
    let err = Host::from_config_path(&path).err().unwrap();
    match err {
        HostError::Config(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected an io error, got {other}"),
    }
}

#[test]
fn invalid_files_are_rejected() {
    for content in [
        "[modules]\nenabled = [\"sockets\"]",
        "[modules]\nenabled = [\"simple\", \"simple\"]",
        "[heap]\nmax_objects = 0",
        "[heap]\nmax_bytes = 10",
        "[modules\n",
    ] {
        let dir = write_config(content);
        let err = Host::from_config_path(&dir.path().join(CONFIG_FILE)).err().unwrap();
        assert!(matches!(err, HostError::Config(_)), "{content:?} gave {err}");
    }
}
