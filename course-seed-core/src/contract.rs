//! # contract: interface to the remote learning platform
//!
//! This module defines the two traits the pipelines talk to, [`ContentApi`] and
//! [`AuthProvider`], plus the plain request/response types that cross them.
//!
//! ## Interface & Extensibility
//! - Implement [`ContentApi`] to point the pipelines at a concrete CMS (the CLI crate
//!   ships a reqwest client).
//! - Every call is a single blocking request/response from the caller's point of view;
//!   the pipelines never issue two calls at once.
//! - Every content call receives the creator's [`AuthSession`] by reference. Sessions
//!   are obtained once per phase and are not refreshed mid-run.
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`, so tests can script the remote side and
//!   count mutating calls.
//!
//! ## Errors
//! - All remote failures are an [`ApiError`]. When the platform returns a structured
//!   message (`params.errmsg`) it is kept and preferred by [`ApiError::user_message`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Bearer session obtained from the platform's token exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    /// User id decoded from the token's `sub` claim, when known.
    pub user_id: Option<String>,
}

/// Failure of a single remote call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// The platform answered with a non-success status.
    #[error("request failed with status {status}: {message}")]
    Remote {
        status: u16,
        message: String,
        /// Structured `params.errmsg` from the response body, if any.
        errmsg: Option<String>,
    },
    /// A lookup returned no match.
    #[error("{0}")]
    NotFound(String),
    /// The request never produced a response (connection, DNS, TLS, ...).
    #[error("transport error: {0}")]
    Transport(String),
    /// The response did not have the expected shape.
    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Message shown in status reports. The platform's structured message wins over
    /// the generic error text.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Remote {
                errmsg: Some(errmsg),
                ..
            } if !errmsg.trim().is_empty() => errmsg.clone(),
            other => other.to_string(),
        }
    }

    pub fn has_structured_message(&self) -> bool {
        matches!(self, ApiError::Remote { errmsg: Some(m), .. } if !m.trim().is_empty())
    }
}

/// An existing content node returned by a search.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentSummary {
    pub identifier: String,
    /// Question type (`mcq`, ...) for assessment items.
    pub kind: Option<String>,
    /// `UNIT` for standalone assessment items.
    pub item_type: Option<String>,
    pub max_score: Option<u32>,
}

impl ContentSummary {
    pub fn is_mcq_question(&self) -> bool {
        self.kind.as_deref() == Some("mcq") && self.item_type.as_deref() == Some("UNIT")
    }
}

/// A course found by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRef {
    pub identifier: String,
    pub name: String,
}

/// Identifier and version returned when a content node is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedContent {
    pub identifier: String,
    pub version_key: Option<String>,
}

/// A learner profile collection to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLearnerProfile {
    pub code: String,
    pub name: String,
    pub expiry_date: String,
    /// Course identifiers, in the order they should appear as children.
    pub children: Vec<String>,
}

/// Hierarchy update attaching courses to a created learner profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnerProfileUpdate {
    pub identifier: String,
    pub code: String,
    pub name: String,
    pub courses: Vec<CourseRef>,
}

/// A quiz (assessment content) to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuiz {
    pub code: String,
    pub name: String,
    pub max_attempts: u32,
    pub content_type: String,
    pub language: String,
}

/// A question attached to a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRef {
    pub identifier: String,
    pub score: u32,
}

/// Content update attaching questions to a created quiz.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizUpdate {
    pub identifier: String,
    /// Quiz title, repeated in the question set configuration.
    pub name: String,
    pub version_key: Option<String>,
    pub questions: Vec<QuestionRef>,
    pub total_score: u32,
    /// Assessment items as read back from the platform, used to build the body.
    pub items: Vec<serde_json::Value>,
}

/// One answer option of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    pub text: String,
    pub is_correct: bool,
}

/// A multiple-choice question to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    pub code: String,
    pub title: String,
    pub options: Vec<AnswerOption>,
    pub max_score: u32,
}

/// Enrolment of one user in one course batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrolment {
    pub course_id: String,
    pub batch_id: String,
    pub user_id: String,
}

/// Remote content operations used by the pipelines.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Look up any content node with this code. `Ok(None)` when nothing matches.
    async fn search_content(
        &self,
        session: &AuthSession,
        code: &str,
    ) -> Result<Option<ContentSummary>, ApiError>;

    /// Look up a course by its code.
    async fn search_course(
        &self,
        session: &AuthSession,
        code: &str,
    ) -> Result<Option<CourseRef>, ApiError>;

    /// Newest open batch of a course, if any.
    async fn open_batch(
        &self,
        session: &AuthSession,
        course_id: &str,
    ) -> Result<Option<String>, ApiError>;

    async fn create_learner_profile(
        &self,
        session: &AuthSession,
        profile: &NewLearnerProfile,
    ) -> Result<CreatedContent, ApiError>;

    async fn update_learner_profile(
        &self,
        session: &AuthSession,
        update: &LearnerProfileUpdate,
    ) -> Result<(), ApiError>;

    async fn create_quiz(
        &self,
        session: &AuthSession,
        quiz: &NewQuiz,
    ) -> Result<CreatedContent, ApiError>;

    async fn update_quiz(&self, session: &AuthSession, update: &QuizUpdate)
        -> Result<(), ApiError>;

    /// Create an assessment item, returning its identifier.
    async fn create_question(
        &self,
        session: &AuthSession,
        question: &NewQuestion,
    ) -> Result<String, ApiError>;

    /// Read an assessment item back as raw JSON.
    async fn read_question(
        &self,
        session: &AuthSession,
        identifier: &str,
    ) -> Result<serde_json::Value, ApiError>;

    async fn review_content(&self, session: &AuthSession, identifier: &str)
        -> Result<(), ApiError>;

    async fn publish_content(
        &self,
        session: &AuthSession,
        identifier: &str,
    ) -> Result<(), ApiError>;

    /// Enrol a user; `session` is the learner's own session.
    async fn enrol(&self, session: &AuthSession, enrolment: &Enrolment) -> Result<(), ApiError>;
}

/// Token exchange against the platform's identity service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Session for the configured content creator.
    async fn login(&self) -> Result<AuthSession, ApiError>;

    /// Session for a learner, identified by e-mail.
    async fn user_session(&self, username: &str) -> Result<AuthSession, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_message_wins_over_generic_text() {
        let err = ApiError::Remote {
            status: 400,
            message: "Bad Request".into(),
            errmsg: Some("Content with code Q1 already exists".into()),
        };
        assert_eq!(err.user_message(), "Content with code Q1 already exists");
        assert!(err.has_structured_message());
    }

    #[test]
    fn blank_structured_message_falls_back() {
        let err = ApiError::Remote {
            status: 500,
            message: "Internal Server Error".into(),
            errmsg: Some("  ".into()),
        };
        assert_eq!(
            err.user_message(),
            "request failed with status 500: Internal Server Error"
        );
        assert!(!ApiError::Transport("reset".into()).has_structured_message());
    }
}
