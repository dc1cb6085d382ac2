#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use orchestrator::config::load_config;
use orchestrator::{OrchestratorError, SchedulerSettings};
use std::time::Duration;
use tempfile::NamedTempFile;

fn config_file(content: &str) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), content).unwrap();
    file
}

#[tokio::test]
async fn settings_follow_the_config_file() {
    let file = config_file(
        r#"framework_name = "riak-east"
framework_role = "riak-east"
principal = "riak-east"
zookeepers = "zk1:2181,zk2:2181"
node_cpus = 2
node_mem = 4096
node_ports = 4
compatibility_mode = true
reconcile_interval_ms = 250
join_max_retries = 7
join_backoff_ms = 20
refuse_seconds = 0.5
"#,
    );

    let config = load_config(Some(file.path().to_path_buf())).await.unwrap();
    config.validate().unwrap();
    let settings = SchedulerSettings::from_config(&config);

    assert_eq!(settings.template.framework_name, "riak-east");
    assert_eq!(settings.template.role, "riak-east");
    assert_eq!(settings.template.ports, 4);
    assert!((settings.template.cpus - 2.0).abs() < f64::EPSILON);
    assert_eq!(settings.launch.zookeepers, vec!["zk1:2181", "zk2:2181"]);
    assert!(settings.launch.compatibility_mode);
    assert_eq!(settings.reconcile_interval, Duration::from_millis(250));
    assert_eq!(settings.membership.max_retries, 7);
    assert_eq!(settings.membership.backoff, Duration::from_millis(20));
    assert!((settings.refuse_seconds - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn env_placeholders_fall_back_to_their_defaults() {
    let file = config_file(
        "scheduler_uri = \"${ORCHESTRATOR_TEST_UNSET_URI:-http://localhost:9090}\"\n",
    );

    let config = load_config(Some(file.path().to_path_buf())).await.unwrap();

    assert_eq!(config.scheduler_uri, "http://localhost:9090");
}

#[tokio::test]
async fn malformed_database_url_fails_validation() {
    let file = config_file("database_url = \"not a url\"\n");

    let config = load_config(Some(file.path().to_path_buf())).await.unwrap();

    assert!(matches!(
        config.validate(),
        Err(OrchestratorError::ConfigError(_))
    ));
}
