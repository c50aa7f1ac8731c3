//! Grouping of input rows by the remote entity they describe.
//!
//! Several rows can name the same entity key (one learner profile listed once per
//! course block, for instance). Grouping unions their dependency codes so the entity is
//! created once, and keeps every row so each still gets its own report line.

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::codes::parse_codes;
use crate::input::InputRecord;
use crate::outcome::Outcome;

pub const MISSING_KEY_REASON: &str = "required identifier missing";
pub const MISSING_DEPENDENCIES_REASON: &str = "required dependency codes missing";

/// Which columns carry the entity key and its dependency list.
#[derive(Debug, Clone)]
pub struct GroupingSpec {
    pub key_column: String,
    /// Column holding a comma-separated dependency list, if the entity has one.
    pub dependency_column: Option<String>,
    /// Reject rows whose dependency list is empty.
    pub dependencies_required: bool,
    pub missing_key_reason: String,
    pub missing_dependencies_reason: String,
}

impl GroupingSpec {
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            dependency_column: None,
            dependencies_required: false,
            missing_key_reason: MISSING_KEY_REASON.to_string(),
            missing_dependencies_reason: MISSING_DEPENDENCIES_REASON.to_string(),
        }
    }

    pub fn with_dependencies(mut self, column: impl Into<String>, required: bool) -> Self {
        self.dependency_column = Some(column.into());
        self.dependencies_required = required;
        self
    }

    pub fn missing_key_reason(mut self, reason: impl Into<String>) -> Self {
        self.missing_key_reason = reason.into();
        self
    }

    pub fn missing_dependencies_reason(mut self, reason: impl Into<String>) -> Self {
        self.missing_dependencies_reason = reason.into();
        self
    }
}

/// All rows sharing one entity key.
#[derive(Debug, Clone, Default)]
pub struct EntityGroup {
    /// Union of the rows' dependency codes, in first-seen order.
    pub dependencies: IndexSet<String>,
    pub records: Vec<InputRecord>,
}

impl EntityGroup {
    /// The first row naming this entity; it supplies per-entity attributes.
    pub fn first(&self) -> Option<&InputRecord> {
        self.records.first()
    }
}

/// Result of [`group_by_entity`].
#[derive(Debug, Default)]
pub struct Grouping {
    /// Entity groups in first-encounter order of their keys.
    pub groups: IndexMap<String, EntityGroup>,
    /// Failure outcomes for rows rejected before grouping.
    pub rejected: Vec<Outcome>,
}

impl Grouping {
    /// Number of input rows accounted for, grouped or rejected.
    pub fn row_count(&self) -> usize {
        self.rejected.len() + self.groups.values().map(|g| g.records.len()).sum::<usize>()
    }
}

/// Group rows by entity key, rejecting rows with a blank key or a missing required
/// dependency list.
pub fn group_by_entity(records: &[InputRecord], spec: &GroupingSpec) -> Grouping {
    let mut grouping = Grouping::default();

    for record in records {
        let Some(key) = record.non_blank(&spec.key_column) else {
            warn!(row = record.row, column = %spec.key_column, "Row has no entity key");
            grouping.rejected.push(Outcome::failure(
                record.row,
                record.values().to_vec(),
                spec.missing_key_reason.clone(),
            ));
            continue;
        };

        let codes = spec
            .dependency_column
            .as_deref()
            .map(|column| parse_codes(record.get(column)))
            .unwrap_or_default();

        if spec.dependencies_required && codes.is_empty() {
            warn!(row = record.row, key, "Row has no dependency codes");
            grouping.rejected.push(Outcome::failure(
                record.row,
                record.values().to_vec(),
                spec.missing_dependencies_reason.clone(),
            ));
            continue;
        }

        let group = grouping.groups.entry(key.to_string()).or_default();
        for code in codes {
            if group.dependencies.contains(&code) {
                debug!(key, code = %code, "Skipped duplicate dependency code");
            } else {
                debug!(key, code = %code, "Added dependency code");
                group.dependencies.insert(code);
            }
        }
        group.records.push(record.clone());
    }

    grouping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(n: usize, key: &str, deps: &str) -> InputRecord {
        InputRecord::from_pairs(n, &[("code", key), ("deps", deps)])
    }

    #[test]
    fn rows_sharing_a_key_union_their_dependencies() {
        let records = vec![row(1, "P1", "C1,C2"), row(2, "P2", "C9"), row(3, "P1", "\"C2, C3\"")];
        let spec = GroupingSpec::new("code").with_dependencies("deps", true);
        let grouping = group_by_entity(&records, &spec);

        let keys: Vec<&str> = grouping.groups.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["P1", "P2"]);
        let p1 = &grouping.groups["P1"];
        let deps: Vec<&str> = p1.dependencies.iter().map(String::as_str).collect();
        assert_eq!(deps, vec!["C1", "C2", "C3"]);
        assert_eq!(p1.records.len(), 2);
        assert!(grouping.rejected.is_empty());
        assert_eq!(grouping.row_count(), 3);
    }

    #[test]
    fn blank_keys_and_missing_required_dependencies_are_rejected() {
        let records = vec![row(1, "  ", "C1"), row(2, "P1", " , "), row(3, "P2", "C1")];
        let spec = GroupingSpec::new("code")
            .with_dependencies("deps", true)
            .missing_dependencies_reason("no courses");
        let grouping = group_by_entity(&records, &spec);

        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.rejected.len(), 2);
        assert_eq!(grouping.rejected[0].reason, MISSING_KEY_REASON);
        assert_eq!(grouping.rejected[1].reason, "no courses");
        assert_eq!(grouping.row_count(), 3);
    }

    #[test]
    fn optional_dependencies_allow_empty_lists() {
        let records = vec![row(1, "Q1", "")];
        let grouping = group_by_entity(&records, &GroupingSpec::new("code"));
        assert!(grouping.groups["Q1"].dependencies.is_empty());
    }
}
