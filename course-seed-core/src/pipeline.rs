//! # pipeline: resumable row-processing with partial-failure reporting
//!
//! Orchestrates one phase of a seeding run:
//!   - rejects rows with input errors before any remote call
//!   - groups the remaining rows by entity key ([`group_by_entity`])
//!   - drives each entity through its [`EntityWorkflow`] exactly once
//!     (pre-check → resolve dependencies → create/update/review/publish)
//!   - fans the entity's result out to every row that named it
//!   - flushes the [`StatusReporter`] after every entity and pauses before the next one
//!
//! Per-entity errors never escape: they become `Failure` outcomes. Only report IO
//! failures end the batch early. Remote side effects of steps that succeeded before a
//! failure are left in place.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::contract::ApiError;
use crate::grouping::{group_by_entity, EntityGroup, GroupingSpec};
use crate::input::InputRecord;
use crate::outcome::{Outcome, Status, Tally};
use crate::report::{ReportError, StatusReporter};

pub const NO_RESOLVED_DEPENDENCIES: &str = "no dependency codes could be resolved";

/// Result of the existence pre-check for an entity key.
#[derive(Debug, Clone, PartialEq)]
pub enum PreCheck<C> {
    /// Nothing with this key exists remotely; go ahead and create it.
    Absent,
    /// The entity already exists. Its rows are reported as skipped with `reason`.
    /// `existing` carries what is known about it, so later phases can still use it.
    Exists { reason: String, existing: Option<C> },
}

/// Why an entity's workflow stopped.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The entity's own input is unusable.
    #[error("{0}")]
    Input(String),
    /// A dependency code could not be resolved to a remote identifier.
    #[error("failed processing dependency {code}: {source}")]
    Dependency {
        code: String,
        #[source]
        source: ApiError,
    },
    /// A remote workflow step failed.
    #[error("{step} failed: {source}")]
    Remote {
        step: &'static str,
        #[source]
        source: ApiError,
    },
}

impl StepError {
    pub fn remote(step: &'static str) -> impl FnOnce(ApiError) -> StepError {
        move |source| StepError::Remote { step, source }
    }

    /// Text written to the report's reason column.
    pub fn reason(&self) -> String {
        match self {
            StepError::Input(reason) => reason.clone(),
            StepError::Dependency { code, source } => {
                format!("failed processing dependency {code}: {}", source.user_message())
            }
            StepError::Remote { source, .. } => source.user_message(),
        }
    }
}

/// The remote workflow of one kind of entity.
#[async_trait]
pub trait EntityWorkflow: Send + Sync {
    /// What a dependency code resolves to.
    type Resolved: Clone + Send + Sync;
    /// What a created (or pre-existing) entity is recorded as.
    type Created: Clone + Send + Sync;

    /// Used in log lines ("learner profile", "quiz", ...).
    fn entity_name(&self) -> &'static str;

    /// Key and dependency columns of the input.
    fn grouping(&self) -> GroupingSpec;

    /// Row-level input checks run before any remote call. `Err` holds the reason.
    fn validate(&self, _record: &InputRecord) -> Result<(), String> {
        Ok(())
    }

    async fn pre_check(&self, key: &str) -> Result<PreCheck<Self::Created>, StepError>;

    async fn resolve(&self, code: &str) -> Result<Self::Resolved, ApiError>;

    /// Run the mutating steps in order. Stops at the first failing step.
    async fn create(
        &self,
        key: &str,
        group: &EntityGroup,
        resolved: &IndexMap<String, Self::Resolved>,
    ) -> Result<Self::Created, StepError>;
}

/// Mapping entry for one entity key.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMapping<C, R> {
    pub created: C,
    /// Dependency code to resolved value, in dependency order.
    pub dependencies: IndexMap<String, R>,
}

/// What [`process_entity`] produced for one key.
#[derive(Debug, Clone)]
pub struct EntityResult<C, R> {
    pub status: Status,
    pub reason: String,
    pub outcomes: Vec<Outcome>,
    /// Present on success, and on skip when the pre-check knew the existing entity.
    pub mapping: Option<EntityMapping<C, R>>,
}

impl<C, R> EntityResult<C, R> {
    fn fan_out(group: &EntityGroup, status: Status, reason: String) -> Self {
        let outcomes = group
            .records
            .iter()
            .map(|r| Outcome::new(r.row, r.values().to_vec(), status, reason.clone()))
            .collect();
        Self {
            status,
            reason,
            outcomes,
            mapping: None,
        }
    }
}

/// Drive one entity key through its workflow. Always returns one outcome per row
/// of the group.
pub async fn process_entity<W: EntityWorkflow>(
    workflow: &W,
    key: &str,
    group: &EntityGroup,
) -> EntityResult<W::Created, W::Resolved> {
    let entity = workflow.entity_name();

    match workflow.pre_check(key).await {
        Ok(PreCheck::Absent) => {}
        Ok(PreCheck::Exists { reason, existing }) => {
            info!(entity, key, "Already exists, skipping");
            let mut result = EntityResult::fan_out(group, Status::Skipped, reason);
            result.mapping = existing.map(|created| EntityMapping {
                created,
                dependencies: IndexMap::new(),
            });
            return result;
        }
        Err(e) => {
            error!(entity, key, error = %e, "Existence check failed");
            return EntityResult::fan_out(group, Status::Failure, e.reason());
        }
    }

    let mut resolved = IndexMap::with_capacity(group.dependencies.len());
    for code in &group.dependencies {
        match workflow.resolve(code).await {
            Ok(value) => {
                resolved.insert(code.clone(), value);
            }
            Err(source) => {
                let e = StepError::Dependency {
                    code: code.clone(),
                    source,
                };
                warn!(entity, key, code = %code, error = %e, "Dependency resolution failed");
                return EntityResult::fan_out(group, Status::Failure, e.reason());
            }
        }
    }

    if workflow.grouping().dependencies_required && resolved.is_empty() {
        return EntityResult::fan_out(group, Status::Failure, NO_RESOLVED_DEPENDENCIES.into());
    }

    match workflow.create(key, group, &resolved).await {
        Ok(created) => {
            info!(entity, key, dependencies = resolved.len(), "Created");
            let mut result =
                EntityResult::fan_out(group, Status::Success, crate::outcome::NO_REASON.into());
            result.mapping = Some(EntityMapping {
                created,
                dependencies: resolved,
            });
            result
        }
        Err(e) => {
            error!(entity, key, error = %e, "Workflow failed");
            EntityResult::fan_out(group, Status::Failure, e.reason())
        }
    }
}

/// Summary of a finished batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome<C, R> {
    /// Successfully created entities, plus pre-existing ones the pre-check identified.
    pub mapping: IndexMap<String, EntityMapping<C, R>>,
    /// Keys that were created in this run.
    pub created: Vec<String>,
    pub tally: Tally,
}

/// Process every row of one input file.
///
/// The reporter is flushed once after input rejections, after every entity key and
/// once more at the end. `pacing` is slept after every entity key, whatever its result.
pub async fn run_batch<W: EntityWorkflow>(
    workflow: &W,
    records: &[InputRecord],
    reporter: &mut StatusReporter,
    pacing: Duration,
) -> Result<BatchOutcome<W::Created, W::Resolved>, ReportError> {
    let spec = workflow.grouping();
    let entity = workflow.entity_name();

    let mut accepted = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for record in records {
        if record.non_blank(&spec.key_column).is_some() {
            if let Err(reason) = workflow.validate(record) {
                warn!(entity, row = record.row, reason = %reason, "Input row rejected");
                rejected.push(Outcome::failure(record.row, record.values().to_vec(), reason));
                continue;
            }
        }
        accepted.push(record.clone());
    }

    let grouping = group_by_entity(&accepted, &spec);
    rejected.extend(grouping.rejected);
    rejected.sort_by_key(|o| o.row);

    let mut tally = Tally::default();
    if !rejected.is_empty() {
        for outcome in &rejected {
            tally.add(outcome.status);
        }
        reporter.extend(rejected);
        reporter.flush()?;
    }

    info!(
        entity,
        keys = grouping.groups.len(),
        rows = records.len(),
        "Starting batch"
    );

    let mut mapping = IndexMap::new();
    let mut created = Vec::new();
    let total = grouping.groups.len();
    for (index, (key, group)) in grouping.groups.iter().enumerate() {
        info!(
            entity,
            key = %key,
            position = index + 1,
            total,
            dependencies = group.dependencies.len(),
            "Processing"
        );

        let result = process_entity(workflow, key, group).await;
        info!(entity, key = %key, status = %result.status, reason = %result.reason, "Processed");

        if result.status == Status::Success {
            created.push(key.clone());
        }
        if let Some(entry) = result.mapping {
            mapping.insert(key.clone(), entry);
        }
        for outcome in &result.outcomes {
            tally.add(outcome.status);
        }
        reporter.extend(result.outcomes);
        reporter.flush()?;

        if !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
    }

    reporter.flush()?;
    info!(
        entity,
        success = tally.success,
        failure = tally.failure,
        skipped = tally.skipped,
        report = %reporter.path().display(),
        "Batch finished"
    );

    Ok(BatchOutcome {
        mapping,
        created,
        tally,
    })
}
