//! Enrolment phase: enrol each listed user into every course of their learner profiles.
//!
//! Runs after the learner profile phase and depends on two of its artefacts: the
//! profile status report (only profiles reported as `Success` are used) and the
//! course handoff. The report has one row per user, profile and course.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::codes::parse_codes;
use crate::contract::{AuthProvider, AuthSession, ContentApi, Enrolment};
use crate::handoff::CourseHandoff;
use crate::input::{InputRecord, InputTable};
use crate::outcome::{Outcome, Status, Tally, NO_REASON};
use crate::report::{read_report, ReportError, StatusReporter};

pub const REPORT_FILE: &str = "enrollment-status.csv";
pub const REPORT_HEADER: [&str; 5] = [
    "userId",
    "learnerProfile",
    "courseCode",
    "enrollmentStatus",
    "reason",
];

pub const PROFILE_NOT_CREATED: &str = "Learner profile does not exist";
pub const NO_COURSES: &str = "No course codes found for the given learner code";
pub const ALREADY_ENROLLED: &str = "User has already enrolled to this course";
pub const NO_BATCH: &str = "No batch found for course";

/// Column names of the user / learner profile CSV.
#[derive(Debug, Clone)]
pub struct EnrolmentColumns {
    pub email: String,
    pub profiles: String,
}

impl Default for EnrolmentColumns {
    fn default() -> Self {
        Self {
            email: "email".into(),
            profiles: "learner_profile_code".into(),
        }
    }
}

/// Learner profile codes reported as `Success` in a profile status report.
pub fn successful_profiles(
    report_path: &Path,
    code_column: &str,
) -> Result<HashSet<String>, ReportError> {
    let (header, rows) = read_report(report_path)?;
    let code_idx = header.iter().position(|h| h == code_column).unwrap_or(0);
    let status_idx = header
        .iter()
        .position(|h| h == "status")
        .unwrap_or(header.len().saturating_sub(2));

    Ok(rows
        .iter()
        .filter(|row| row.get(status_idx).map(String::as_str) == Some(Status::Success.as_str()))
        .filter_map(|row| row.get(code_idx).cloned())
        .collect())
}

fn enrolment_row(
    record: &InputRecord,
    user: &str,
    profile: &str,
    course: &str,
    status: Status,
    reason: &str,
) -> Outcome {
    Outcome::new(
        record.row,
        vec![user.to_string(), profile.to_string(), course.to_string()],
        status,
        reason,
    )
}

/// Everything the enrolment phase reads.
pub struct EnrolmentContext<'a, A: ContentApi, P: AuthProvider> {
    pub api: &'a A,
    pub auth: &'a P,
    /// Creator session, used for batch lookups.
    pub session: &'a AuthSession,
    pub created_profiles: &'a HashSet<String>,
    pub handoff: &'a CourseHandoff,
    pub columns: EnrolmentColumns,
}

impl<'a, A: ContentApi, P: AuthProvider> EnrolmentContext<'a, A, P> {
    async fn enrol_user(
        &self,
        record: &InputRecord,
        enrolled: &mut HashMap<String, HashSet<String>>,
    ) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        let profiles = parse_codes(record.get(&self.columns.profiles));

        let Some(email) = record.non_blank(&self.columns.email) else {
            let profiles = profiles.join(",");
            let reason = "User email input is missing";
            outcomes.push(enrolment_row(record, "", &profiles, "none", Status::Failure, reason));
            return outcomes;
        };
        let row = |profile: &str, course: &str, status: Status, reason: &str| {
            enrolment_row(record, email, profile, course, status, reason)
        };
        if profiles.is_empty() {
            let reason = "Learner profile codes input are missing";
            outcomes.push(row("none", "none", Status::Failure, reason));
            return outcomes;
        }
        info!(user = email, profiles = %profiles.join(", "), "Processing enrolments");

        let user_session = match self.auth.user_session(email).await {
            Ok(session) if session.user_id.is_some() => session,
            Ok(_) => {
                for profile in &profiles {
                    let reason = "Could not determine user id for the user";
                    outcomes.push(row(profile, "none", Status::Failure, reason));
                }
                return outcomes;
            }
            Err(e) => {
                warn!(user = email, error = %e, "User session could not be obtained");
                let reason = e.user_message();
                for profile in &profiles {
                    outcomes.push(row(profile, "none", Status::Failure, &reason));
                }
                return outcomes;
            }
        };
        let user_id = user_session.user_id.clone().unwrap_or_default();
        let user_courses = enrolled.entry(email.to_string()).or_default();

        for profile in &profiles {
            if !self.created_profiles.contains(profile) {
                info!(user = email, profile = %profile, "Learner profile was not created, skipping");
                outcomes.push(row(profile, "none", Status::Skipped, PROFILE_NOT_CREATED));
                continue;
            }

            let courses = self.handoff.courses_of(profile);
            if courses.is_empty() {
                outcomes.push(row(profile, "none", Status::Failure, NO_COURSES));
                continue;
            }

            for (course_id, course_code) in courses {
                if user_courses.contains(&course_id) {
                    outcomes.push(row(profile, &course_code, Status::Skipped, ALREADY_ENROLLED));
                    continue;
                }

                let batch_id = match self.handoff.batch_of(profile, &course_id) {
                    Some(batch) => Some(batch.to_string()),
                    None => match self.api.open_batch(self.session, &course_id).await {
                        Ok(batch) => batch,
                        Err(e) => {
                            warn!(course = %course_id, error = %e, "Batch lookup failed");
                            None
                        }
                    },
                };
                let Some(batch_id) = batch_id else {
                    outcomes.push(row(profile, &course_code, Status::Failure, NO_BATCH));
                    continue;
                };

                let enrolment = Enrolment {
                    course_id: course_id.clone(),
                    batch_id,
                    user_id: user_id.clone(),
                };
                match self.api.enrol(&user_session, &enrolment).await {
                    Ok(()) => {
                        info!(user = email, course = %course_code, batch = %enrolment.batch_id, "Enrolled");
                        user_courses.insert(course_id);
                        outcomes.push(row(profile, &course_code, Status::Success, NO_REASON));
                    }
                    Err(e) => {
                        let message = e.user_message();
                        let already = message.to_lowercase().contains("user has already enrolled");
                        let status = if already { Status::Skipped } else { Status::Failure };
                        warn!(user = email, course = %course_code, error = %message, "Enrolment failed");
                        outcomes.push(row(profile, &course_code, status, &message));
                    }
                }
            }
        }
        outcomes
    }
}

/// Enrol every user of `users`, flushing the report after each user row.
pub async fn run_enrolment_phase<A: ContentApi, P: AuthProvider>(
    ctx: &EnrolmentContext<'_, A, P>,
    users: &InputTable,
    report_path: &Path,
    pacing: Duration,
) -> Result<Tally, ReportError> {
    let mut reporter = StatusReporter::new(
        report_path,
        REPORT_HEADER.iter().map(|h| h.to_string()).collect(),
    );
    let mut enrolled: HashMap<String, HashSet<String>> = HashMap::new();

    for record in &users.records {
        let outcomes = ctx.enrol_user(record, &mut enrolled).await;
        reporter.extend(outcomes);
        reporter.flush()?;
        if !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
    }

    reporter.flush()?;
    let tally = reporter.tally();
    info!(
        success = tally.success,
        failure = tally.failure,
        skipped = tally.skipped,
        report = %report_path.display(),
        "Enrolment finished"
    );
    Ok(tally)
}
