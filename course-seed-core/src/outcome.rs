use std::fmt;

/// Result classification of one report row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Failure,
    Skipped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "Success",
            Status::Failure => "Failure",
            Status::Skipped => "Skipped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason recorded for successful rows.
pub const NO_REASON: &str = "none";

/// One row of a status report: the echoed source fields plus status and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Data row number of the input the outcome belongs to.
    pub row: usize,
    pub fields: Vec<String>,
    pub status: Status,
    pub reason: String,
}

impl Outcome {
    pub fn new(row: usize, fields: Vec<String>, status: Status, reason: impl Into<String>) -> Self {
        Self {
            row,
            fields,
            status,
            reason: reason.into(),
        }
    }

    pub fn success(row: usize, fields: Vec<String>) -> Self {
        Self::new(row, fields, Status::Success, NO_REASON)
    }

    pub fn failure(row: usize, fields: Vec<String>, reason: impl Into<String>) -> Self {
        Self::new(row, fields, Status::Failure, reason)
    }

    pub fn skipped(row: usize, fields: Vec<String>, reason: impl Into<String>) -> Self {
        Self::new(row, fields, Status::Skipped, reason)
    }

    /// Cells written to the report: fields, then status, then reason.
    pub fn cells(&self) -> Vec<&str> {
        self.fields
            .iter()
            .map(String::as_str)
            .chain([self.status.as_str(), self.reason.as_str()])
            .collect()
    }
}

/// Per-status counts of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub success: usize,
    pub failure: usize,
    pub skipped: usize,
}

impl Tally {
    pub fn add(&mut self, status: Status) {
        match status {
            Status::Success => self.success += 1,
            Status::Failure => self.failure += 1,
            Status::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.failure + self.skipped
    }
}
