use course_seed::load_config::{load_config, read_static_config, HandoffMode, CONFIG_PATH_VAR};
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

const OVERRIDABLE: [&str; 20] = [
    CONFIG_PATH_VAR,
    "BASE_URL",
    "CLIENT_ID",
    "GRANT_TYPE",
    "CHANNEL_ID",
    "CREATED_BY",
    "ORGANISATION",
    "FRAMEWORK",
    "MIME_TYPE",
    "CREATOR",
    "LEARNER_COURSE_CSV_PATH",
    "USER_LEARNER_CSV_PATH",
    "QUESTION_CSV_PATH",
    "CSV_PATH",
    "REPORTS_DIR",
    "ENV_FILE",
    "QUESTION_MAPPING_PATH",
    "HANDOFF_MODE",
    "HANDOFF_PATH",
    "WAIT_INTERVAL",
];

/// Required secrets and ids set; every optional override cleared.
fn reset_env() {
    for key in OVERRIDABLE {
        env::remove_var(key);
    }
    env::set_var("API_KEY", "Bearer key");
    env::set_var("USERNAME", "creator@example.com");
    env::set_var("PASSWORD", "pw");
    env::set_var("CLIENT_SECRET", "secret");
    env::set_var("CHANNEL_ID", "0142");
    env::set_var("CREATED_BY", "creator-id");
}

#[test]
#[serial]
fn test_defaults_apply_without_config_file() {
    reset_env();

    let config = load_config().expect("Config should load");

    assert_eq!(config.api.base_url, "https://dev-fmps.sunbirded.org");
    assert_eq!(config.api.client_id, "direct-grant");
    assert_eq!(config.api.grant_type, "password");
    assert_eq!(config.api.api_key, "Bearer key");
    assert_eq!(config.content.framework, "FMPS");
    assert_eq!(config.content.organisation, vec!["FMPS Org".to_string()]);
    assert_eq!(
        config.paths.learner_course_csv,
        PathBuf::from("./data/learner-profile-course.csv")
    );
    assert_eq!(config.paths.quiz_csv, PathBuf::from("./data/assessment_create.csv"));
    assert_eq!(
        config.paths.report("quiz_report.csv"),
        PathBuf::from("./reports/quiz_report.csv")
    );
    assert_eq!(config.handoff_mode, HandoffMode::Env);
    assert_eq!(config.wait_interval, Duration::from_millis(1000));
}

#[test]
#[serial]
fn test_env_overrides_static_file() {
    reset_env();
    let config_yaml = r#"
base_url: https://staging.example.org/
framework: FROM_FILE
reports_dir: ./file-reports
handoff_mode: json
wait_interval: 250
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();
    env::set_var(CONFIG_PATH_VAR, config_file.path());
    env::set_var("FRAMEWORK", "FROM_ENV");
    env::set_var("WAIT_INTERVAL", "0");

    let config = load_config().expect("Config should load");

    assert_eq!(config.api.base_url, "https://staging.example.org");
    assert_eq!(config.content.framework, "FROM_ENV");
    assert_eq!(config.paths.reports_dir, PathBuf::from("./file-reports"));
    assert_eq!(config.handoff_mode, HandoffMode::Json);
    assert_eq!(config.wait_interval, Duration::ZERO);
}

#[test]
#[serial]
fn test_missing_secret_is_reported_by_name() {
    reset_env();
    env::remove_var("CLIENT_SECRET");

    let err = load_config().unwrap_err();
    assert!(
        err.to_string().contains("CLIENT_SECRET"),
        "unexpected error: {err}"
    );
}

#[test]
#[serial]
fn test_invalid_numbers_and_modes_are_rejected() {
    reset_env();
    env::set_var("WAIT_INTERVAL", "soon");
    let err = load_config().unwrap_err();
    assert!(format!("{err:#}").contains("WAIT_INTERVAL"), "unexpected error: {err:#}");

    reset_env();
    env::set_var("HANDOFF_MODE", "redis");
    let err = load_config().unwrap_err();
    assert!(format!("{err:#}").contains("redis"), "unexpected error: {err:#}");
}

#[test]
#[serial]
fn test_invalid_yaml_is_a_parse_error() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), b"not-yaml: [:::").unwrap();

    let err = read_static_config(config_file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
#[serial]
fn test_empty_yaml_file_is_accepted() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), b"").unwrap();

    let file = read_static_config(config_file.path()).expect("empty file is valid");
    assert!(file.base_url.is_none());
}
