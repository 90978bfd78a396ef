//! Config file round trip through the public API.

use std::time::Duration;

use taskdispatch::util::config::{load_config, save_config_file};
use taskdispatch::{run_counter, DispatcherConfig};

#[test]
fn test_saved_config_drives_dispatcher() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskdispatch.toml");
    let config = DispatcherConfig::new(2, 4)
        .with_thread_name("it-worker")
        .with_submit_timeout(Duration::from_secs(5));
    save_config_file(&path, &config).unwrap();

    let loaded = load_config(Some(&path)).unwrap();
    assert_eq!(loaded, config);

    let report = run_counter(loaded, 64).unwrap();
    assert_eq!(report.counter, 64);
    assert_eq!(report.capacity, 4);
}
