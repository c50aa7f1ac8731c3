/// `load_config` module: builds the runtime [`SeedConfig`] from defaults, an optional static
/// YAML file and environment variables.
///
/// Layering, lowest to highest precedence:
/// 1. built-in defaults
/// 2. the YAML file named by `COURSE_SEED_CONFIG` (no secrets; every key optional)
/// 3. environment variables (`BASE_URL`, `CHANNEL_ID`, `WAIT_INTERVAL`, ...)
///
/// Secrets (`API_KEY`, `USERNAME`, `PASSWORD`, `CLIENT_SECRET`) are read from the
/// environment only and are required.
///
/// # Errors
/// All errors use `anyhow::Error` with context naming the offending file or variable, and
/// are surfaced at the CLI boundary.
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};

pub const CONFIG_PATH_VAR: &str = "COURSE_SEED_CONFIG";

pub const DEFAULT_BASE_URL: &str = "https://dev-fmps.sunbirded.org";
pub const DEFAULT_WAIT_INTERVAL_MS: u64 = 1000;

/// Where the learner profile phase leaves its course mappings for the enrolment phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
    /// `KEY='json'` lines in the env file.
    Env,
    /// A standalone JSON file.
    Json,
}

impl FromStr for HandoffMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "env" => Ok(HandoffMode::Env),
            "json" => Ok(HandoffMode::Json),
            other => Err(anyhow!("unknown handoff mode '{other}', expected 'env' or 'json'")),
        }
    }
}

/// Static YAML file contents. Every key is optional and overridden by its env variable.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticConfig {
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    pub grant_type: Option<String>,
    pub channel_id: Option<String>,
    pub created_by: Option<String>,
    pub organisation: Option<String>,
    pub framework: Option<String>,
    pub mime_type: Option<String>,
    pub creator: Option<String>,
    pub learner_course_csv_path: Option<PathBuf>,
    pub user_learner_csv_path: Option<PathBuf>,
    pub question_csv_path: Option<PathBuf>,
    pub csv_path: Option<PathBuf>,
    pub reports_dir: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub question_mapping_path: Option<PathBuf>,
    pub handoff_mode: Option<HandoffMode>,
    pub handoff_path: Option<PathBuf>,
    pub wait_interval: Option<u64>,
}

/// Connection and credentials for the remote platform.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    /// Sent verbatim as the `Authorization` header.
    pub api_key: String,
    pub channel_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub grant_type: String,
    pub username: String,
    pub password: String,
}

/// Metadata stamped onto every created content node.
#[derive(Debug, Clone)]
pub struct ContentDefaults {
    pub channel_id: String,
    pub created_by: String,
    pub organisation: Vec<String>,
    pub framework: String,
    pub mime_type: String,
    pub creator: String,
}

#[derive(Debug, Clone)]
pub struct SeedPaths {
    pub learner_course_csv: PathBuf,
    pub user_learner_csv: PathBuf,
    pub question_csv: PathBuf,
    pub quiz_csv: PathBuf,
    pub reports_dir: PathBuf,
    pub env_file: PathBuf,
    pub question_mapping: PathBuf,
    pub handoff: PathBuf,
}

impl SeedPaths {
    pub fn report(&self, file_name: &str) -> PathBuf {
        self.reports_dir.join(file_name)
    }
}

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub api: ApiSettings,
    pub content: ContentDefaults,
    pub paths: SeedPaths,
    pub handoff_mode: HandoffMode,
    pub wait_interval: Duration,
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required_secret(key: &str) -> Result<String> {
    env_value(key).ok_or_else(|| {
        error!(variable = key, "Required secret missing from environment");
        anyhow!("missing required environment variable {key}")
    })
}

fn text(key: &str, file: Option<String>, default: &str) -> String {
    env_value(key)
        .or(file)
        .unwrap_or_else(|| default.to_string())
}

fn required_text(key: &str, file: Option<String>) -> Result<String> {
    env_value(key)
        .or(file)
        .ok_or_else(|| anyhow!("missing required setting {key} (environment or config file)"))
}

fn path(key: &str, file: Option<PathBuf>, default: &str) -> PathBuf {
    env_value(key)
        .map(PathBuf::from)
        .or(file)
        .unwrap_or_else(|| PathBuf::from(default))
}

/// Reads a static YAML config file.
pub fn read_static_config<P: AsRef<Path>>(path: P) -> Result<StaticConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref)
        .with_context(|| format!("failed to read config file {}", path_ref.display()))?;
    if content.trim().is_empty() {
        info!(config_path = ?path_ref, "Config file is empty, using defaults");
        return Ok(StaticConfig::default());
    }

    match serde_yaml::from_str::<Option<StaticConfig>>(&content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf.unwrap_or_default())
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow!("failed to parse config YAML {}: {e}", path_ref.display()))
        }
    }
}

/// Loads the configuration, taking the YAML path from `COURSE_SEED_CONFIG` when set.
pub fn load_config() -> Result<SeedConfig> {
    let file = match env_value(CONFIG_PATH_VAR) {
        Some(path) => read_static_config(path)?,
        None => StaticConfig::default(),
    };
    build_config(file)
}

/// Applies environment overrides and secrets on top of a static config.
pub fn build_config(file: StaticConfig) -> Result<SeedConfig> {
    let channel_id = required_text("CHANNEL_ID", file.channel_id)?;

    let api = ApiSettings {
        base_url: text("BASE_URL", file.base_url, DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string(),
        api_key: required_secret("API_KEY")?,
        channel_id: channel_id.clone(),
        client_id: text("CLIENT_ID", file.client_id, "direct-grant"),
        client_secret: required_secret("CLIENT_SECRET")?,
        grant_type: text("GRANT_TYPE", file.grant_type, "password"),
        username: required_secret("USERNAME")?,
        password: required_secret("PASSWORD")?,
    };

    let content = ContentDefaults {
        channel_id,
        created_by: required_text("CREATED_BY", file.created_by)?,
        organisation: vec![text("ORGANISATION", file.organisation, "FMPS Org")],
        framework: text("FRAMEWORK", file.framework, "FMPS"),
        mime_type: text(
            "MIME_TYPE",
            file.mime_type,
            "application/vnd.ekstep.ecml-archive",
        ),
        creator: text("CREATOR", file.creator, "Content Creator FMPS"),
    };

    let paths = SeedPaths {
        learner_course_csv: path(
            "LEARNER_COURSE_CSV_PATH",
            file.learner_course_csv_path,
            "./data/learner-profile-course.csv",
        ),
        user_learner_csv: path(
            "USER_LEARNER_CSV_PATH",
            file.user_learner_csv_path,
            "./data/user-learner-profile.csv",
        ),
        question_csv: path("QUESTION_CSV_PATH", file.question_csv_path, "./data/questions.csv"),
        quiz_csv: path("CSV_PATH", file.csv_path, "./data/assessment_create.csv"),
        reports_dir: path("REPORTS_DIR", file.reports_dir, "./reports"),
        env_file: path("ENV_FILE", file.env_file, ".env"),
        question_mapping: path(
            "QUESTION_MAPPING_PATH",
            file.question_mapping_path,
            "./data/question_mapping.json",
        ),
        handoff: path(
            "HANDOFF_PATH",
            file.handoff_path,
            "./reports/course-mappings.json",
        ),
    };

    let handoff_mode = match env_value("HANDOFF_MODE") {
        Some(raw) => raw
            .parse::<HandoffMode>()
            .context("invalid HANDOFF_MODE")?,
        None => file.handoff_mode.unwrap_or(HandoffMode::Env),
    };

    let wait_ms = match env_value("WAIT_INTERVAL") {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid WAIT_INTERVAL '{raw}', expected milliseconds"))?,
        None => file.wait_interval.unwrap_or(DEFAULT_WAIT_INTERVAL_MS),
    };
    if api.base_url.is_empty() {
        bail!("BASE_URL must not be empty");
    }

    info!(
        base_url = %api.base_url,
        channel_id = %api.channel_id,
        handoff_mode = ?handoff_mode,
        wait_interval_ms = wait_ms,
        reports_dir = %paths.reports_dir.display(),
        "Configuration loaded"
    );

    Ok(SeedConfig {
        api,
        content,
        paths,
        handoff_mode,
        wait_interval: Duration::from_millis(wait_ms),
    })
}
