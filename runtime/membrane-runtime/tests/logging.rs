//! Logging installed by `Host::new`. Kept in its own test binary because the
//! subscriber is process-wide.

use membrane_runtime::{Host, HostConfig};
use tracing::level_filters::LevelFilter;

#[test]
fn host_applies_logging_section() {
    let quiet = HostConfig::from_toml_str("[logging]\ninstall = false\n[modules]\nenabled = []").unwrap();
    let _host = Host::new(quiet).unwrap();
    assert!(!tracing::dispatcher::has_been_set());

    let verbose = HostConfig::from_toml_str(
        "[logging]\nfilter = \"membrane_runtime=debug\"\n[modules]\nenabled = [\"simple\"]",
    )
    .unwrap();
    let _host = Host::new(verbose).unwrap();
    assert!(tracing::dispatcher::has_been_set());
    if std::env::var_os(membrane_runtime::logging::LOG_ENV).is_none() {
        assert_eq!(LevelFilter::current(), LevelFilter::DEBUG);
    }
}
