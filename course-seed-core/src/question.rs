//! Question phase: multiple-choice assessment items, one per question code.
//!
//! Produces the question bank (code → identifier and score) that quizzes resolve their
//! question codes against, a JSON copy of it for auditing, and the quiz/question
//! attachment report.

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::codes::parse_codes;
use crate::contract::{AnswerOption, ApiError, AuthSession, ContentApi, NewQuestion, QuestionRef};
use crate::grouping::{EntityGroup, GroupingSpec};
use crate::input::{InputRecord, InputTable};
use crate::outcome::Tally;
use crate::pipeline::{run_batch, EntityWorkflow, PreCheck, StepError};
use crate::report::{write_rows, ReportError, StatusReporter};

pub const REPORT_FILE: &str = "questions_status.csv";
pub const QUIZ_QUESTION_REPORT_FILE: &str = "quiz_question_status.csv";

/// Question code to created (or adopted) question.
pub type QuestionBank = IndexMap<String, QuestionRef>;

#[derive(Debug, Clone)]
pub struct QuestionColumns {
    pub code: String,
    pub title: String,
    pub score: String,
}

impl Default for QuestionColumns {
    fn default() -> Self {
        Self {
            code: "code".into(),
            title: "question_text".into(),
            score: "score".into(),
        }
    }
}

/// `(option text column, is-correct column)` pairs present in a header, in column order.
pub fn option_columns(headers: &[String]) -> Vec<(String, String)> {
    let Ok(pattern) = Regex::new(r"^option_(\d+)$") else {
        return Vec::new();
    };
    headers
        .iter()
        .filter_map(|h| {
            let n = pattern.captures(h)?.get(1)?.as_str().to_string();
            let correct = format!("option_{n}_is_correct");
            headers
                .iter()
                .any(|c| *c == correct)
                .then(|| (h.clone(), correct))
        })
        .collect()
}

/// Positive integer score, or `None`.
fn parse_score(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|s| *s > 0)
}

pub struct QuestionWorkflow<'a, A: ContentApi> {
    api: &'a A,
    session: &'a AuthSession,
    columns: QuestionColumns,
    options: Vec<(String, String)>,
}

impl<'a, A: ContentApi> QuestionWorkflow<'a, A> {
    pub fn new(
        api: &'a A,
        session: &'a AuthSession,
        columns: QuestionColumns,
        headers: &[String],
    ) -> Self {
        Self {
            api,
            session,
            columns,
            options: option_columns(headers),
        }
    }

    fn answer_options(&self, record: &InputRecord) -> Vec<AnswerOption> {
        self.options
            .iter()
            .map(|(text, correct)| AnswerOption {
                text: record.get(text).to_string(),
                is_correct: record.get(correct).trim().eq_ignore_ascii_case("true"),
            })
            .collect()
    }
}

#[async_trait]
impl<'a, A: ContentApi> EntityWorkflow for QuestionWorkflow<'a, A> {
    type Resolved = ();
    type Created = QuestionRef;

    fn entity_name(&self) -> &'static str {
        "question"
    }

    fn grouping(&self) -> GroupingSpec {
        GroupingSpec::new(&self.columns.code).missing_key_reason("Question Code input is missing")
    }

    fn validate(&self, record: &InputRecord) -> Result<(), String> {
        if record.non_blank(&self.columns.title).is_none() {
            return Err("Question name input is missing".into());
        }
        if parse_score(record.get(&self.columns.score)).is_none() {
            return Err("Question Max score input is invalid".into());
        }
        Ok(())
    }

    async fn pre_check(&self, key: &str) -> Result<PreCheck<QuestionRef>, StepError> {
        let found = self
            .api
            .search_content(self.session, key)
            .await
            .map_err(StepError::remote("search"))?;
        Ok(match found {
            None => PreCheck::Absent,
            Some(summary) if summary.is_mcq_question() => PreCheck::Exists {
                reason: format!("Question with code {key} already exists"),
                existing: Some(QuestionRef {
                    identifier: summary.identifier,
                    score: summary.max_score.unwrap_or(0),
                }),
            },
            Some(_) => PreCheck::Exists {
                reason: format!("Content with code {key} already exists"),
                existing: None,
            },
        })
    }

    async fn resolve(&self, _code: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn create(
        &self,
        key: &str,
        group: &EntityGroup,
        _resolved: &IndexMap<String, ()>,
    ) -> Result<QuestionRef, StepError> {
        let record = group
            .first()
            .ok_or_else(|| StepError::Input(format!("No rows found for question: {key}")))?;
        let max_score = parse_score(record.get(&self.columns.score))
            .ok_or_else(|| StepError::Input("Question Max score input is invalid".into()))?;

        let question = NewQuestion {
            code: key.to_string(),
            title: record.get(&self.columns.title).trim().to_string(),
            options: self.answer_options(record),
            max_score,
        };
        let identifier = self
            .api
            .create_question(self.session, &question)
            .await
            .map_err(StepError::remote("create question"))?;

        info!(code = key, identifier = %identifier, score = max_score, "Mapped question code");
        Ok(QuestionRef {
            identifier,
            score: max_score,
        })
    }
}

#[derive(Debug, Clone)]
pub struct QuestionPhaseOutcome {
    pub bank: QuestionBank,
    pub tally: Tally,
}

/// Create every question of `table`. Questions that already exist are adopted into
/// the bank.
pub async fn run_question_phase<A: ContentApi>(
    api: &A,
    session: &AuthSession,
    table: &InputTable,
    columns: QuestionColumns,
    report_path: &Path,
    pacing: Duration,
) -> Result<QuestionPhaseOutcome, ReportError> {
    let workflow = QuestionWorkflow::new(api, session, columns, &table.headers);
    let mut reporter = StatusReporter::for_input(report_path, &table.headers, "status", "reason");
    let batch = run_batch(&workflow, &table.records, &mut reporter, pacing).await?;
    let bank = batch
        .mapping
        .into_iter()
        .map(|(code, entry)| (code, entry.created))
        .collect();
    Ok(QuestionPhaseOutcome {
        bank,
        tally: batch.tally,
    })
}

/// Write the bank as a JSON object of question code to identifier.
pub fn save_question_mapping(path: &Path, bank: &QuestionBank) -> Result<(), ReportError> {
    let ids: IndexMap<&str, &str> = bank
        .iter()
        .map(|(code, q)| (code.as_str(), q.identifier.as_str()))
        .collect();
    let io_err = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_string_pretty(&ids).map_err(|e| io_err(e.into()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, json).map_err(io_err)?;
    info!(path = %path.display(), questions = bank.len(), "Question mapping saved");
    Ok(())
}

/// One row per quiz and listed question, saying whether the question is available.
pub fn write_quiz_question_status(
    path: &Path,
    quizzes: &InputTable,
    code_column: &str,
    questions_column: &str,
    bank: &QuestionBank,
) -> Result<(), ReportError> {
    let mut rows: Vec<[String; 5]> = Vec::new();
    for record in &quizzes.records {
        let quiz = record.get(code_column).trim();
        for question in parse_codes(record.get(questions_column)) {
            let row = if bank.contains_key(&question) {
                [quiz.into(), question, "TRUE".into(), "TRUE".into(), "none".into()]
            } else {
                let message = format!("[\"QUESTION {question} NOT FOUND\"]");
                [quiz.into(), question, "FALSE".into(), "FALSE".into(), message]
            };
            rows.push(row);
        }
    }

    write_rows(
        path,
        [
            "quiz_code",
            "question_code",
            "question_creation_status",
            "question_attachment_status",
            "error_message",
        ],
        rows.iter().map(|r| r.iter().map(String::as_str)),
    )?;
    info!(path = %path.display(), rows = rows.len(), "Quiz-question status report saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_pairs_need_both_columns() {
        let headers: Vec<String> = [
            "code",
            "option_1",
            "option_1_is_correct",
            "option_2",
            "option_3",
            "option_3_is_correct",
            "option_x",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(
            option_columns(&headers),
            vec![
                ("option_1".to_string(), "option_1_is_correct".to_string()),
                ("option_3".to_string(), "option_3_is_correct".to_string()),
            ]
        );
    }

    #[test]
    fn scores_must_be_positive_integers() {
        assert_eq!(parse_score(" 5 "), Some(5));
        assert_eq!(parse_score("0"), None);
        assert_eq!(parse_score("abc"), None);
        assert_eq!(parse_score(""), None);
    }
}
