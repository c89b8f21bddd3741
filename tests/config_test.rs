//! Integration tests for configuration loading

use ics_gateway::domain::{PathId, ZoneId};
use ics_gateway::infra::Config;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "test-site"

[api]
url = "http://test-api/taskOrder/addTask"
success_code = 1000
max_retries = 5
retry_backoff_ms = 500
max_inflight = 2
counter_file = "test_counter"

[correlation]
poll_interval_ms = 50
confirm_threshold_secs = 8
sent_timeout_secs = 120
stuck_timer_secs = 240

[ingest]
enabled = false
port = 26000

[metrics]
interval_secs = 15

[[zones]]
id = 4
starts = ["10000565"]
ends = ["10000557", "10000558"]

[[zones]]
id = 5
starts = ["10000452", "10000455"]
ends = ["10000556"]

[end_owners]
10000556 = 4
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "test-site");
    assert_eq!(config.api_url(), "http://test-api/taskOrder/addTask");
    assert_eq!(config.api_success_code(), 1000);
    assert_eq!(config.max_retries(), 5);
    assert_eq!(config.retry_backoff(), Duration::from_millis(500));
    assert_eq!(config.max_inflight(), 2);
    assert_eq!(config.counter_file(), "test_counter");
    assert_eq!(config.poll_interval(), Duration::from_millis(50));
    assert_eq!(config.confirm_threshold(), Duration::from_secs(8));
    assert_eq!(config.sent_timeout(), Duration::from_secs(120));
    assert_eq!(config.stuck_timer(), Duration::from_secs(240));
    assert!(!config.ingest_enabled());
    assert_eq!(config.ingest_port(), 26000);
    assert_eq!(config.metrics_interval_secs(), 15);

    assert_eq!(config.zones().len(), 2);
    assert_eq!(config.zones()[0].id, ZoneId(4));
    assert_eq!(config.zones()[0].starts, vec![PathId::from("10000565")]);
    assert_eq!(config.zones()[1].ends, vec![PathId::from("10000556")]);

    // Mapped end path reads from its owning zone, unmapped ones fall back
    assert_eq!(config.end_owner(&PathId::from("10000556"), ZoneId(5)), ZoneId(4));
    assert_eq!(config.end_owner(&PathId::from("10000557"), ZoneId(4)), ZoneId(4));
}

#[test]
fn test_defaults_fill_omitted_sections() {
    let mut temp_file = NamedTempFile::new().unwrap();

    // Only the mandatory pieces: endpoint and pairing tables
    let config_content = r#"
[api]
url = "http://test-api/taskOrder/addTask"

[[zones]]
id = 1
starts = ["S1"]
ends = ["E1"]
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.api_success_code(), 1000);
    assert_eq!(config.order_prefix(), "ics");
    assert_eq!(config.from_system(), "ICS");
    assert_eq!(config.model_process_code(), "checking_camera_work");
    assert_eq!(config.max_retries(), 3);
    assert_eq!(config.poll_interval(), Duration::from_millis(100));
    assert_eq!(config.confirm_threshold(), Duration::from_secs(10));
    assert_eq!(config.sent_timeout(), Duration::from_secs(300));
    assert!(config.ingest_enabled());
    assert_eq!(config.ingest_port(), 25901);
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Config::from_file("/nonexistent/config.toml").is_err());
}

#[test]
fn test_invalid_pairing_table_is_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();

    // "S1" is claimed by both zones
    let config_content = r#"
[api]
url = "http://test-api/taskOrder/addTask"

[[zones]]
id = 1
starts = ["S1"]
ends = ["E1"]

[[zones]]
id = 2
starts = ["S1"]
ends = ["E2"]
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_unknown_end_owner_is_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[api]
url = "http://test-api/taskOrder/addTask"

[[zones]]
id = 1
starts = ["S1"]
ends = ["E1"]

[end_owners]
E1 = 99
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}
