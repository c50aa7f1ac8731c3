//! Quiz phase: assessment content built from previously created questions.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::contract::{ApiError, AuthSession, ContentApi, NewQuiz, QuestionRef, QuizUpdate};
use crate::grouping::{EntityGroup, GroupingSpec};
use crate::input::{InputRecord, InputTable};
use crate::outcome::Tally;
use crate::pipeline::{run_batch, EntityWorkflow, PreCheck, StepError};
use crate::question::QuestionBank;
use crate::report::{ReportError, StatusReporter};

pub const REPORT_FILE: &str = "quiz_report.csv";
pub const DEFAULT_LANGUAGE: &str = "English";

#[derive(Debug, Clone)]
pub struct QuizColumns {
    pub code: String,
    pub name: String,
    pub max_attempts: String,
    pub language: String,
    pub content_type: String,
    pub questions: String,
}

impl Default for QuizColumns {
    fn default() -> Self {
        Self {
            code: "code".into(),
            name: "quiz_name".into(),
            max_attempts: "max_attempts".into(),
            language: "language".into(),
            content_type: "quiz_type".into(),
            questions: "questions".into(),
        }
    }
}

pub struct QuizWorkflow<'a, A: ContentApi> {
    api: &'a A,
    session: &'a AuthSession,
    bank: &'a QuestionBank,
    columns: QuizColumns,
}

impl<'a, A: ContentApi> QuizWorkflow<'a, A> {
    pub fn new(
        api: &'a A,
        session: &'a AuthSession,
        bank: &'a QuestionBank,
        columns: QuizColumns,
    ) -> Self {
        Self {
            api,
            session,
            bank,
            columns,
        }
    }

    fn max_attempts(&self, record: &InputRecord) -> Result<u32, String> {
        let raw = record
            .non_blank(&self.columns.max_attempts)
            .ok_or_else(|| "Quiz max attempts input is missing".to_string())?;
        raw.parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| "Quiz max attempts input is invalid".to_string())
    }

    fn new_quiz(&self, key: &str, record: &InputRecord) -> Result<NewQuiz, String> {
        Ok(NewQuiz {
            code: key.to_string(),
            name: record.get(&self.columns.name).trim().to_string(),
            max_attempts: self.max_attempts(record)?,
            content_type: record.get(&self.columns.content_type).trim().to_string(),
            language: record
                .non_blank(&self.columns.language)
                .unwrap_or(DEFAULT_LANGUAGE)
                .to_string(),
        })
    }

    /// Read each question back. Unreadable items are left out of the body.
    async fn read_items(&self, questions: &[QuestionRef]) -> Vec<serde_json::Value> {
        let mut items = Vec::with_capacity(questions.len());
        for question in questions {
            match self.api.read_question(self.session, &question.identifier).await {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!(identifier = %question.identifier, error = %e, "Could not read question, leaving it out of the body")
                }
            }
        }
        items
    }
}

#[async_trait]
impl<'a, A: ContentApi> EntityWorkflow for QuizWorkflow<'a, A> {
    type Resolved = QuestionRef;
    type Created = String;

    fn entity_name(&self) -> &'static str {
        "quiz"
    }

    fn grouping(&self) -> GroupingSpec {
        GroupingSpec::new(&self.columns.code)
            .with_dependencies(&self.columns.questions, true)
            .missing_key_reason("Quiz code input is missing")
            .missing_dependencies_reason("Question codes input are missing")
    }

    fn validate(&self, record: &InputRecord) -> Result<(), String> {
        if record.non_blank(&self.columns.name).is_none() {
            return Err("Quiz name is missing".into());
        }
        self.max_attempts(record)?;
        if record.non_blank(&self.columns.content_type).is_none() {
            return Err("Quiz content type input is missing".into());
        }
        Ok(())
    }

    async fn pre_check(&self, key: &str) -> Result<PreCheck<String>, StepError> {
        let found = self
            .api
            .search_content(self.session, key)
            .await
            .map_err(StepError::remote("search"))?;
        Ok(match found {
            Some(summary) => PreCheck::Exists {
                reason: format!("Content with code {key} already exists"),
                existing: Some(summary.identifier),
            },
            None => PreCheck::Absent,
        })
    }

    async fn resolve(&self, code: &str) -> Result<QuestionRef, ApiError> {
        self.bank
            .get(code)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("question with code {code} does not exist.")))
    }

    async fn create(
        &self,
        key: &str,
        group: &EntityGroup,
        resolved: &IndexMap<String, QuestionRef>,
    ) -> Result<String, StepError> {
        let record = group
            .first()
            .ok_or_else(|| StepError::Input(format!("No rows found for quiz: {key}")))?;
        let quiz = self.new_quiz(key, record).map_err(StepError::Input)?;

        let created = self
            .api
            .create_quiz(self.session, &quiz)
            .await
            .map_err(StepError::remote("create"))?;
        info!(code = key, identifier = %created.identifier, "Created quiz");

        let questions: Vec<QuestionRef> = resolved.values().cloned().collect();
        let items = self.read_items(&questions).await;
        let update = QuizUpdate {
            identifier: created.identifier.clone(),
            name: quiz.name.clone(),
            version_key: created.version_key.clone(),
            total_score: questions.iter().map(|q| q.score).sum(),
            questions,
            items,
        };
        self.api
            .update_quiz(self.session, &update)
            .await
            .map_err(StepError::remote("update"))?;

        self.api
            .review_content(self.session, &created.identifier)
            .await
            .map_err(StepError::remote("review"))?;
        self.api
            .publish_content(self.session, &created.identifier)
            .await
            .map_err(StepError::remote("publish"))?;

        info!(
            code = key,
            identifier = %created.identifier,
            questions = update.questions.len(),
            total_score = update.total_score,
            "Published quiz"
        );
        Ok(created.identifier)
    }
}

/// Create every quiz of `table` from the questions in `bank`.
pub async fn run_quiz_phase<A: ContentApi>(
    api: &A,
    session: &AuthSession,
    bank: &QuestionBank,
    table: &InputTable,
    columns: QuizColumns,
    report_path: &Path,
    pacing: Duration,
) -> Result<Tally, ReportError> {
    let workflow = QuizWorkflow::new(api, session, bank, columns);
    let mut reporter = StatusReporter::for_input(report_path, &table.headers, "status", "reason");
    let batch = run_batch(&workflow, &table.records, &mut reporter, pacing).await?;
    Ok(batch.tally)
}
