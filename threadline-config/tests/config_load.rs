use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;
use threadline_common::observability::LogFormat;
use threadline_config::{ConfigError, ThreadlineConfig, ThreadlineConfigLoader};

/// Helper to write a YAML file in a temp dir and return its path.
fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

const FILE_YAML: &str = r#"
server:
  port: 5000
mongodb:
  uri: "mongodb://${WORKSHOP_MONGO_USER}@mongo:27017"
  database: workshop
amqp:
  job_queue: "staging:hashtag:job"
social:
  base_url: "http://social.local/"
  api_token: "${WORKSHOP_SOCIAL_TOKEN}"
worker:
  concurrency: 4
logging:
  format: json
  emit_stderr: false
"#;

#[test]
#[serial]
fn file_values_override_defaults() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "threadline.yaml", FILE_YAML);

    temp_env::with_vars(
        [
            ("WORKSHOP_MONGO_USER", Some("reader")),
            ("WORKSHOP_SOCIAL_TOKEN", Some("tok-123")),
        ],
        || {
            let config = ThreadlineConfigLoader::new()
                .with_file(&p)
                .load()
                .expect("load config");

            assert_eq!(config.server.port, 5000);
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.mongodb.uri, "mongodb://reader@mongo:27017");
            assert_eq!(config.mongodb.database, "workshop");
            assert_eq!(config.mongodb.users_collection, "users");
            assert_eq!(config.amqp.job_queue, "staging:hashtag:job");
            assert_eq!(config.amqp.result_queue, "local:workshop:hashtag:result");
            assert_eq!(config.social.api_token.as_deref(), Some("tok-123"));
            assert_eq!(config.worker.concurrency, 4);
            assert_eq!(config.logging.format, LogFormat::Json);
            assert!(!config.logging.emit_stderr);
        },
    );
}

#[test]
#[serial]
fn environment_wins_over_files() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "threadline.yaml", FILE_YAML);

    temp_env::with_vars(
        [
            ("THREADLINE__SERVER__PORT", Some("9000")),
            ("THREADLINE__AMQP__JOB_QUEUE", Some("prod:hashtag:job")),
            ("THREADLINE__WORKER__JOB_TIMEOUT_SECS", Some("0")),
        ],
        || {
            let config = ThreadlineConfigLoader::new()
                .with_file(&p)
                .load()
                .expect("load config");

            assert_eq!(config.server.port, 9000);
            assert_eq!(config.amqp.job_queue, "prod:hashtag:job");
            assert_eq!(config.worker.job_timeout(), None);
            assert_eq!(config.worker.concurrency, 4);
        },
    );
}

#[test]
#[serial]
fn empty_sources_yield_defaults() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("absent.yaml");

    let config = ThreadlineConfigLoader::new()
        .with_env_prefix("THREADLINE_TEST_UNSET")
        .with_optional_file(&missing)
        .load()
        .expect("defaults are valid");

    assert_eq!(config, ThreadlineConfig::default());
}

#[test]
#[serial]
fn missing_required_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let err = ThreadlineConfigLoader::new()
        .with_file(tmp.path().join("absent.yaml"))
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Source(_)));
}

#[test]
#[serial]
fn wrong_types_and_bad_values_are_reported() {
    let err = ThreadlineConfigLoader::new()
        .with_yaml_str("worker:\n  concurrency: many")
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Schema(_)), "{err}");

    let err = ThreadlineConfigLoader::new()
        .with_yaml_str("worker:\n  concurrency: 0")
        .load()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
}
