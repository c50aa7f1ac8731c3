//! Learner profile phase: one collection per learner profile code, its children being
//! the courses listed against that code across all input rows.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::contract::{
    ApiError, AuthSession, ContentApi, CourseRef, LearnerProfileUpdate, NewLearnerProfile,
};
use crate::grouping::{EntityGroup, GroupingSpec};
use crate::handoff::CourseHandoff;
use crate::input::InputTable;
use crate::outcome::Tally;
use crate::pipeline::{run_batch, BatchOutcome, EntityWorkflow, PreCheck, StepError};
use crate::report::{ReportError, StatusReporter};

pub const REPORT_FILE: &str = "learner-profile-status.csv";

/// Column names of the learner profile / course CSV.
#[derive(Debug, Clone)]
pub struct ProfileColumns {
    pub code: String,
    pub name: String,
    pub courses: String,
    pub expiry_date: String,
}

impl Default for ProfileColumns {
    fn default() -> Self {
        Self {
            code: "learner_profile_code".into(),
            name: "learner_profile".into(),
            courses: "course_code".into(),
            expiry_date: "expiry_date".into(),
        }
    }
}

/// A course code resolved to its remote course and, when it has one, its open batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCourse {
    pub course: CourseRef,
    pub batch_id: Option<String>,
}

pub struct LearnerProfileWorkflow<'a, A: ContentApi> {
    api: &'a A,
    session: &'a AuthSession,
    columns: ProfileColumns,
}

impl<'a, A: ContentApi> LearnerProfileWorkflow<'a, A> {
    pub fn new(api: &'a A, session: &'a AuthSession, columns: ProfileColumns) -> Self {
        Self {
            api,
            session,
            columns,
        }
    }
}

#[async_trait]
impl<'a, A: ContentApi> EntityWorkflow for LearnerProfileWorkflow<'a, A> {
    type Resolved = ResolvedCourse;
    type Created = String;

    fn entity_name(&self) -> &'static str {
        "learner profile"
    }

    fn grouping(&self) -> GroupingSpec {
        GroupingSpec::new(&self.columns.code)
            .with_dependencies(&self.columns.courses, true)
            .missing_key_reason("Learner profile code input is missing")
            .missing_dependencies_reason("No course codes found for the given learner code")
    }

    async fn pre_check(&self, key: &str) -> Result<PreCheck<String>, StepError> {
        match self.api.search_content(self.session, key).await {
            Ok(Some(_)) => Ok(PreCheck::Exists {
                reason: format!("Content with the code {key} already exists"),
                existing: None,
            }),
            Ok(None) => Ok(PreCheck::Absent),
            Err(e) => Err(StepError::Remote {
                step: "search",
                source: e,
            }),
        }
    }

    async fn resolve(&self, code: &str) -> Result<ResolvedCourse, ApiError> {
        info!(code, "Searching for course");
        let course = self
            .api
            .search_course(self.session, code)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Course not found for code: {code}")))?;

        let batch_id = match self.api.open_batch(self.session, &course.identifier).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(course = %course.identifier, error = %e, "Batch lookup failed, recording none");
                None
            }
        };
        Ok(ResolvedCourse { course, batch_id })
    }

    async fn create(
        &self,
        key: &str,
        group: &EntityGroup,
        resolved: &IndexMap<String, ResolvedCourse>,
    ) -> Result<String, StepError> {
        let first = group
            .first()
            .ok_or_else(|| StepError::Input(format!("No rows found for learner profile: {key}")))?;
        let name = first.get(&self.columns.name).trim().to_string();

        let profile = NewLearnerProfile {
            code: key.to_string(),
            name: name.clone(),
            expiry_date: first.get(&self.columns.expiry_date).trim().to_string(),
            children: resolved
                .values()
                .map(|c| c.course.identifier.clone())
                .collect(),
        };
        let created = self
            .api
            .create_learner_profile(self.session, &profile)
            .await
            .map_err(StepError::remote("create"))?;

        let update = LearnerProfileUpdate {
            identifier: created.identifier.clone(),
            code: key.to_string(),
            name,
            courses: resolved.values().map(|c| c.course.clone()).collect(),
        };
        self.api
            .update_learner_profile(self.session, &update)
            .await
            .map_err(StepError::remote("update"))?;

        self.api
            .publish_content(self.session, &created.identifier)
            .await
            .map_err(StepError::remote("publish"))?;

        info!(code = key, identifier = %created.identifier, "Published learner profile");
        Ok(created.identifier)
    }
}

/// Result of the learner profile phase.
#[derive(Debug, Clone)]
pub struct ProfilePhaseOutcome {
    pub handoff: CourseHandoff,
    pub tally: Tally,
}

/// Mappings of the profiles created in this run.
pub fn handoff_from(batch: &BatchOutcome<String, ResolvedCourse>) -> CourseHandoff {
    let mut handoff = CourseHandoff::default();
    for key in &batch.created {
        let Some(entry) = batch.mapping.get(key) else {
            continue;
        };
        let courses = handoff.course_mapping.entry(key.clone()).or_default();
        for resolved in entry.dependencies.values() {
            courses.insert(
                resolved.course.identifier.clone(),
                resolved.course.name.clone(),
            );
        }
        let batches = handoff.batch_mapping.entry(key.clone()).or_default();
        for (code, resolved) in &entry.dependencies {
            batches.insert(resolved.course.identifier.clone(), resolved.batch_id.clone());
            handoff
                .node_to_code
                .insert(resolved.course.identifier.clone(), code.clone());
        }
    }
    handoff
}

/// Create every learner profile of `table`, writing the status report to `report_path`.
pub async fn run_profile_phase<A: ContentApi>(
    api: &A,
    session: &AuthSession,
    table: &InputTable,
    columns: ProfileColumns,
    report_path: &Path,
    pacing: Duration,
) -> Result<ProfilePhaseOutcome, ReportError> {
    let workflow = LearnerProfileWorkflow::new(api, session, columns);
    let mut reporter = StatusReporter::for_input(report_path, &table.headers, "status", "reason");
    let batch = run_batch(&workflow, &table.records, &mut reporter, pacing).await?;
    Ok(ProfilePhaseOutcome {
        handoff: handoff_from(&batch),
        tally: batch.tally,
    })
}
