//! # handoff: carrying course mappings from profile creation to enrolment
//!
//! Profile creation and enrolment run as separate invocations. The mappings computed by
//! the first (which courses and batches belong to which learner profile) are persisted
//! through a [`HandoffStore`] and read back by the second.
//!
//! Two stores exist:
//! - [`EnvFileStore`] writes three quoted `KEY='<json>'` lines into a dotenv file,
//!   replacing earlier lines with the same keys, and reads them back from the process
//!   environment.
//! - [`JsonFileStore`] writes the same structure as one JSON document.
//!
//! Loading is all-or-nothing: all three mappings must be present and parseable, or the
//! prerequisite counts as unmet.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const COURSE_MAPPING_KEY: &str = "COURSE_MAPPING";
pub const BATCH_MAPPING_KEY: &str = "BATCH_MAPPING";
pub const NODE_TO_CODE_KEY: &str = "NODEID_TO_CODE_MAPPING";

pub const HANDOFF_KEYS: [&str; 3] = [COURSE_MAPPING_KEY, BATCH_MAPPING_KEY, NODE_TO_CODE_KEY];

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("required mappings are not set: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("mapping {key} is not valid JSON: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Course id to course name, per learner profile code.
pub type CourseMapping = IndexMap<String, IndexMap<String, String>>;
/// Course id to open batch id (or none), per learner profile code.
pub type BatchMapping = IndexMap<String, IndexMap<String, Option<String>>>;
/// Course id to course code.
pub type NodeToCodeMapping = IndexMap<String, String>;

/// Everything enrolment needs from profile creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseHandoff {
    pub course_mapping: CourseMapping,
    pub batch_mapping: BatchMapping,
    pub node_to_code: NodeToCodeMapping,
}

impl CourseHandoff {
    pub fn is_empty(&self) -> bool {
        self.course_mapping.is_empty()
    }

    /// Courses of a learner profile as `(course id, course code)` pairs. A course id
    /// without a recorded code stands in for its own code.
    pub fn courses_of(&self, profile_code: &str) -> Vec<(String, String)> {
        self.course_mapping
            .get(profile_code)
            .map(|courses| {
                courses
                    .keys()
                    .map(|id| {
                        let code = self.node_to_code.get(id).cloned().unwrap_or_else(|| {
                            warn!(profile = profile_code, course = %id, "No course code recorded for course id");
                            id.clone()
                        });
                        (id.clone(), code)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Batch recorded for a course of a profile, if one was found at creation time.
    pub fn batch_of(&self, profile_code: &str, course_id: &str) -> Option<&str> {
        self.batch_mapping
            .get(profile_code)
            .and_then(|batches| batches.get(course_id))
            .and_then(|b| b.as_deref())
    }
}

/// Persistence for a [`CourseHandoff`].
pub trait HandoffStore {
    fn save(&self, handoff: &CourseHandoff) -> Result<(), HandoffError>;
    fn load(&self) -> Result<CourseHandoff, HandoffError>;
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Dotenv-file store. Saving rewrites the file; loading reads the process environment
/// (or a supplied lookup), which is where a dotenv loader puts the saved lines.
pub struct EnvFileStore {
    path: PathBuf,
    lookup: Lookup,
}

impl EnvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_lookup(path, |key| std::env::var(key).ok())
    }

    pub fn with_lookup<F>(path: impl Into<PathBuf>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            lookup: Box::new(lookup),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Serialize a value for a single-quoted dotenv line. Apostrophes can only occur inside
/// JSON strings, where `'` decodes back to the same character.
fn env_value<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(serde_json::to_string(value)?.replace('\'', "\\u0027"))
}

fn parse_key<T: for<'de> Deserialize<'de>>(key: &str, raw: &str) -> Result<T, HandoffError> {
    serde_json::from_str(raw).map_err(|source| HandoffError::Malformed {
        key: key.to_string(),
        source,
    })
}

impl HandoffStore for EnvFileStore {
    fn save(&self, handoff: &CourseHandoff) -> Result<(), HandoffError> {
        let malformed = |key: &str| {
            let key = key.to_string();
            move |source| HandoffError::Malformed { key, source }
        };
        let lines = [
            (
                COURSE_MAPPING_KEY,
                env_value(&handoff.course_mapping).map_err(malformed(COURSE_MAPPING_KEY))?,
            ),
            (
                BATCH_MAPPING_KEY,
                env_value(&handoff.batch_mapping).map_err(malformed(BATCH_MAPPING_KEY))?,
            ),
            (
                NODE_TO_CODE_KEY,
                env_value(&handoff.node_to_code).map_err(malformed(NODE_TO_CODE_KEY))?,
            ),
        ];

        let existing = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(HandoffError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut content: Vec<String> = existing
            .lines()
            .filter(|line| {
                !HANDOFF_KEYS
                    .iter()
                    .any(|key| line.trim_start().starts_with(&format!("{key}=")))
            })
            .map(str::to_string)
            .collect();
        while content.last().is_some_and(|l| l.trim().is_empty()) {
            content.pop();
        }
        for (key, value) in lines {
            content.push(format!("{key}='{value}'"));
        }

        fs::write(&self.path, content.join("\n") + "\n").map_err(|source| HandoffError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), profiles = handoff.course_mapping.len(), "Saved course mappings to env file");
        Ok(())
    }

    fn load(&self) -> Result<CourseHandoff, HandoffError> {
        let values: Vec<(&str, Option<String>)> = HANDOFF_KEYS
            .iter()
            .map(|key| (*key, (self.lookup)(key).filter(|v| !v.trim().is_empty())))
            .collect();
        let missing: Vec<String> = values
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k.to_string())
            .collect();
        if !missing.is_empty() {
            warn!(missing = ?missing, "Course mappings missing from environment");
            return Err(HandoffError::Missing(missing));
        }

        let raw = |key: &str| {
            values
                .iter()
                .find(|(k, _)| *k == key)
                .and_then(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        let handoff = CourseHandoff {
            course_mapping: parse_key(COURSE_MAPPING_KEY, &raw(COURSE_MAPPING_KEY))?,
            batch_mapping: parse_key(BATCH_MAPPING_KEY, &raw(BATCH_MAPPING_KEY))?,
            node_to_code: parse_key(NODE_TO_CODE_KEY, &raw(NODE_TO_CODE_KEY))?,
        };
        info!(profiles = handoff.course_mapping.len(), "Loaded course mappings from environment");
        Ok(handoff)
    }
}

/// JSON document store.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HandoffStore for JsonFileStore {
    fn save(&self, handoff: &CourseHandoff) -> Result<(), HandoffError> {
        let json = serde_json::to_string_pretty(handoff).map_err(|source| HandoffError::Malformed {
            key: self.path.display().to_string(),
            source,
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| HandoffError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, json).map_err(|source| HandoffError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "Saved course mappings to JSON file");
        Ok(())
    }

    fn load(&self) -> Result<CourseHandoff, HandoffError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HandoffError::Missing(
                    HANDOFF_KEYS.iter().map(|k| k.to_string()).collect(),
                ))
            }
            Err(source) => {
                return Err(HandoffError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        parse_key(&self.path.display().to_string(), &raw)
    }
}
