//! # report: incremental CSV status reports
//!
//! A [`StatusReporter`] accumulates [`Outcome`]s in the order they are recorded and
//! rewrites the whole report file on every [`StatusReporter::flush`]. The file on disk
//! therefore always holds one header row plus every outcome recorded up to the last
//! flush, so a run that dies half-way still leaves a readable audit trail.
//!
//! Fields containing a comma or a double quote (or a line break) are wrapped in quotes
//! with inner quotes doubled.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::outcome::{Outcome, Status, Tally};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode report {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

pub struct StatusReporter {
    path: PathBuf,
    header: Vec<String>,
    outcomes: Vec<Outcome>,
}

impl StatusReporter {
    /// `header` is the full header row, including the status and reason columns.
    pub fn new(path: impl Into<PathBuf>, header: Vec<String>) -> Self {
        Self {
            path: path.into(),
            header,
            outcomes: Vec::new(),
        }
    }

    /// Reporter whose header is the input header followed by `status` and `reason`.
    pub fn for_input(
        path: impl Into<PathBuf>,
        input_headers: &[String],
        status_column: &str,
        reason_column: &str,
    ) -> Self {
        let header = input_headers
            .iter()
            .cloned()
            .chain([status_column.to_string(), reason_column.to_string()])
            .collect();
        Self::new(path, header)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Append one outcome. Nothing is deduplicated or reordered.
    pub fn record(&mut self, outcome: Outcome) {
        debug!(
            row = outcome.row,
            status = %outcome.status,
            reason = %outcome.reason,
            "Recorded outcome"
        );
        self.outcomes.push(outcome);
    }

    pub fn extend<I: IntoIterator<Item = Outcome>>(&mut self, outcomes: I) {
        for outcome in outcomes {
            self.record(outcome);
        }
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for outcome in &self.outcomes {
            tally.add(outcome.status);
        }
        tally
    }

    pub fn count(&self, status: Status) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Overwrite the report file with the header and every outcome recorded so far.
    pub fn flush(&self) -> Result<(), ReportError> {
        write_rows(
            &self.path,
            self.header.iter().map(String::as_str),
            self.outcomes.iter().map(Outcome::cells),
        )?;
        debug!(path = %self.path.display(), rows = self.outcomes.len(), "Flushed status report");
        Ok(())
    }
}

/// Encode a header and rows as CSV text. Fields holding a delimiter, quote or line
/// break are quoted, inner quotes doubled. Rows wider than the header are written
/// as they are.
pub fn encode_rows<'a, H, R, C>(header: H, rows: R) -> Result<Vec<u8>, csv::Error>
where
    H: IntoIterator<Item = &'a str>,
    R: IntoIterator<Item = C>,
    C: IntoIterator<Item = &'a str>,
{
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.into_inner()
        .map_err(|e| csv::Error::from(std::io::Error::other(e.to_string())))
}

/// Overwrite `path` with a CSV report, creating the parent directory on first use.
pub fn write_rows<'a, H, R, C>(path: &Path, header: H, rows: R) -> Result<(), ReportError>
where
    H: IntoIterator<Item = &'a str>,
    R: IntoIterator<Item = C>,
    C: IntoIterator<Item = &'a str>,
{
    let body = encode_rows(header, rows).map_err(|source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ReportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, body).map_err(|source| {
        error!(path = %path.display(), error = ?source, "Failed to write status report");
        ReportError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Read back a report written by [`StatusReporter::flush`].
pub fn read_report(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), ReportError> {
    let csv_err = |source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    let header = rdr
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for record in rdr.records() {
        rows.push(record.map_err(csv_err)?.iter().map(str::to_string).collect());
    }
    Ok((header, rows))
}
