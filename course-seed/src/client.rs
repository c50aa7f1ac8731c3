#![doc = "HTTP client for the learning platform: implements the core `ContentApi` and `AuthProvider` traits over reqwest."]
//
//! # Platform client (CLI <-> Core)
//!
//! [`SunbirdClient`] is the only networked piece of course-seed. The pipelines in
//! `course-seed-core` talk to it through [`ContentApi`] and [`AuthProvider`], so
//! everything here is transport: routes, headers, request bodies (see [`crate::payloads`])
//! and response decoding.
//!
//! ## Headers
//! Every call sends `Authorization: <API_KEY>` and `X-Channel-Id`. Calls made on behalf of
//! a session add `x-authenticated-user-token`.
//!
//! ## Errors
//! Non-success responses become [`ApiError::Remote`], keeping the platform's structured
//! `params.errmsg` when the body has one.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use tracing::{debug, error, info};

use course_seed_core::contract::{
    ApiError, AuthProvider, AuthSession, ContentApi, ContentSummary, CourseRef, CreatedContent,
    Enrolment, LearnerProfileUpdate, NewLearnerProfile, NewQuestion, NewQuiz, QuizUpdate,
};

use crate::load_config::{ApiSettings, ContentDefaults, SeedConfig};
use crate::payloads;

pub mod routes {
    pub const SEARCH: &str = "/api/composite/v1/search";
    pub const BATCH_LIST: &str = "/api/course/v1/batch/list";
    pub const COLLECTION_CREATE: &str = "/api/collection/v1/create";
    pub const HIERARCHY_UPDATE: &str = "/api/collection/v1/hierarchy/update";
    pub const CONTENT_CREATE: &str = "/api/content/v1/create";
    pub const CONTENT_UPDATE: &str = "/content/v3/update";
    pub const CONTENT_REVIEW: &str = "/content/v3/review";
    pub const CONTENT_PUBLISH: &str = "/content/v3/publish";
    pub const QUESTION_CREATE: &str = "/learning-service/assessment/v3/items/create";
    pub const QUESTION_READ: &str = "/api/assessment/v1/items/read";
    pub const ENROL: &str = "/api/course/v1/enrol";
    pub const TOKEN: &str = "/auth/realms/sunbird/protocol/openid-connect/token";
    pub const REFRESH_TOKEN: &str = "/auth/v1/refresh/token";
}

/// Builds an [`ApiError`] from a non-success response body, keeping `params.errmsg`.
pub fn error_from_response(status: u16, body: &str) -> ApiError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let errmsg = parsed
        .as_ref()
        .and_then(|v| v.pointer("/params/errmsg"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let message = parsed
        .as_ref()
        .and_then(|v| v.pointer("/params/err"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect());
    ApiError::Remote {
        status,
        message,
        errmsg,
    }
}

/// User id carried by an access token: the last `:` segment of the JWT `sub` claim.
pub fn user_id_from_token(token: &str) -> Result<String, ApiError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| ApiError::Malformed("access token is not a JWT".into()))?;
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ApiError::Malformed(format!("token payload is not base64url: {e}")))?;
    let claims: Value = serde_json::from_slice(&decoded)
        .map_err(|e| ApiError::Malformed(format!("token payload is not JSON: {e}")))?;
    claims
        .get("sub")
        .and_then(Value::as_str)
        .and_then(|sub| sub.rsplit(':').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Malformed("token has no sub claim".into()))
}

fn text_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

fn first_hit(response: &Value) -> Option<&Value> {
    ["/result/content/0", "/result/items/0", "/result/Question/0"]
        .iter()
        .find_map(|p| response.pointer(p))
}

/// Reads a numeric field that the platform sometimes serialises as a string.
fn number_at(value: &Value, key: &str) -> Option<u32> {
    match value.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn identifier_of(response: &Value) -> Result<String, ApiError> {
    ["/result/identifier", "/result/content_id", "/result/node_id"]
        .iter()
        .find_map(|p| text_at(response, p))
        .ok_or_else(|| ApiError::Malformed("create response carries no identifier".into()))
}

pub struct SunbirdClient {
    http: reqwest::Client,
    api: ApiSettings,
    content: ContentDefaults,
}

impl SunbirdClient {
    pub fn new(config: &SeedConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("course-seed/", env!("CARGO_PKG_VERSION")))
            .build()?;
        info!(
            base_url = %config.api.base_url,
            api_key_set = !config.api.api_key.is_empty(),
            "Initialised platform client"
        );
        Ok(Self {
            http,
            api: config.api.clone(),
            content: config.content.clone(),
        })
    }

    fn request(&self, method: Method, path: &str, session: Option<&AuthSession>) -> RequestBuilder {
        let url = format!("{}{}", self.api.base_url, path);
        let builder = self
            .http
            .request(method, url)
            .header("Authorization", &self.api.api_key)
            .header("X-Channel-Id", &self.api.channel_id);
        match session {
            Some(session) => builder.header("x-authenticated-user-token", &session.access_token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, route: &str) -> Result<Value, ApiError> {
        let response = builder.send().await.map_err(|e| {
            error!(route, error = %e, "Request failed before a response");
            ApiError::Transport(e.to_string())
        })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            let err = error_from_response(status.as_u16(), &body);
            error!(route, status = status.as_u16(), error = %err.user_message(), "Platform returned an error");
            return Err(err);
        }
        debug!(route, status = status.as_u16(), "Platform call succeeded");
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| ApiError::Malformed(format!("{route}: response is not JSON: {e}")))
    }

    async fn post_json(
        &self,
        route: &str,
        session: Option<&AuthSession>,
        body: &Value,
    ) -> Result<Value, ApiError> {
        self.send(self.request(Method::POST, route, session).json(body), route)
            .await
    }

    /// Password (or passwordless user) grant, then refresh to a platform access token.
    async fn exchange_token(&self, username: &str, password: Option<&str>) -> Result<AuthSession, ApiError> {
        let mut form = vec![
            ("client_id", self.api.client_id.as_str()),
            ("client_secret", self.api.client_secret.as_str()),
            ("grant_type", self.api.grant_type.as_str()),
            ("username", username),
        ];
        if let Some(password) = password {
            form.push(("password", password));
        }

        let grant = self
            .send(
                self.request(Method::POST, routes::TOKEN, None).form(&form),
                routes::TOKEN,
            )
            .await?;
        let refresh_token = text_at(&grant, "/refresh_token")
            .ok_or_else(|| ApiError::Malformed("token response has no refresh_token".into()))?;

        let refreshed = self
            .send(
                self.request(Method::POST, routes::REFRESH_TOKEN, None)
                    .form(&[("refresh_token", refresh_token.as_str())]),
                routes::REFRESH_TOKEN,
            )
            .await?;
        let access_token = text_at(&refreshed, "/result/access_token")
            .ok_or_else(|| ApiError::Malformed("refresh response has no access_token".into()))?;

        let user_id = user_id_from_token(&access_token).ok();
        Ok(AuthSession {
            access_token,
            user_id,
        })
    }
}

#[async_trait]
impl AuthProvider for SunbirdClient {
    async fn login(&self) -> Result<AuthSession, ApiError> {
        info!(username = %self.api.username, "Requesting creator token");
        let session = self
            .exchange_token(&self.api.username, Some(&self.api.password))
            .await?;
        info!(user_id = ?session.user_id, "Creator authenticated");
        Ok(session)
    }

    async fn user_session(&self, username: &str) -> Result<AuthSession, ApiError> {
        self.exchange_token(username, None).await.map_err(|e| {
            error!(username, error = %e, "Invalid user credentials for course enrolment");
            e
        })
    }
}

#[async_trait]
impl ContentApi for SunbirdClient {
    async fn search_content(
        &self,
        session: &AuthSession,
        code: &str,
    ) -> Result<Option<ContentSummary>, ApiError> {
        let body = payloads::content_search(code, &self.content.created_by);
        let response = self.post_json(routes::SEARCH, Some(session), &body).await?;
        let count = response
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let Some(hit) = first_hit(&response).filter(|_| count > 0) else {
            return Ok(None);
        };
        Ok(Some(ContentSummary {
            identifier: text_at(hit, "/identifier").unwrap_or_default(),
            kind: text_at(hit, "/type"),
            item_type: text_at(hit, "/itemType"),
            max_score: number_at(hit, "max_score"),
        }))
    }

    async fn search_course(
        &self,
        session: &AuthSession,
        code: &str,
    ) -> Result<Option<CourseRef>, ApiError> {
        let body = payloads::course_search(code, &self.content.created_by);
        let response = self.post_json(routes::SEARCH, Some(session), &body).await?;
        Ok(response
            .pointer("/result/content/0")
            .and_then(|hit| {
                let identifier = text_at(hit, "/identifier")?;
                let name = text_at(hit, "/name").unwrap_or_else(|| code.to_string());
                Some(CourseRef { identifier, name })
            }))
    }

    async fn open_batch(
        &self,
        session: &AuthSession,
        course_id: &str,
    ) -> Result<Option<String>, ApiError> {
        let body = payloads::batch_list(course_id);
        let response = self
            .post_json(routes::BATCH_LIST, Some(session), &body)
            .await?;
        Ok(text_at(&response, "/result/response/content/0/id"))
    }

    async fn create_learner_profile(
        &self,
        session: &AuthSession,
        profile: &NewLearnerProfile,
    ) -> Result<CreatedContent, ApiError> {
        let body = payloads::learner_profile_create(&self.content, profile);
        let response = self
            .post_json(routes::COLLECTION_CREATE, Some(session), &body)
            .await?;
        let identifier = identifier_of(&response)?;
        info!(code = %profile.code, identifier = %identifier, "Created learner profile");
        Ok(CreatedContent {
            identifier,
            version_key: text_at(&response, "/result/versionKey"),
        })
    }

    async fn update_learner_profile(
        &self,
        session: &AuthSession,
        update: &LearnerProfileUpdate,
    ) -> Result<(), ApiError> {
        let body = payloads::learner_profile_hierarchy(update);
        self.send(
            self.request(Method::PATCH, routes::HIERARCHY_UPDATE, Some(session))
                .json(&body),
            routes::HIERARCHY_UPDATE,
        )
        .await?;
        Ok(())
    }

    async fn create_quiz(
        &self,
        session: &AuthSession,
        quiz: &NewQuiz,
    ) -> Result<CreatedContent, ApiError> {
        let body = payloads::quiz_create(&self.content, quiz);
        let response = self
            .post_json(routes::CONTENT_CREATE, Some(session), &body)
            .await?;
        Ok(CreatedContent {
            identifier: identifier_of(&response)?,
            version_key: text_at(&response, "/result/versionKey"),
        })
    }

    async fn update_quiz(&self, session: &AuthSession, update: &QuizUpdate) -> Result<(), ApiError> {
        let body = payloads::quiz_update(&self.content, update);
        let route = format!("{}/{}", routes::CONTENT_UPDATE, update.identifier);
        self.send(
            self.request(Method::PATCH, &route, Some(session)).json(&body),
            routes::CONTENT_UPDATE,
        )
        .await?;
        Ok(())
    }

    async fn create_question(
        &self,
        session: &AuthSession,
        question: &NewQuestion,
    ) -> Result<String, ApiError> {
        let body = payloads::question_create(&self.content, question);
        let response = self
            .post_json(routes::QUESTION_CREATE, Some(session), &body)
            .await?;
        identifier_of(&response)
    }

    async fn read_question(
        &self,
        session: &AuthSession,
        identifier: &str,
    ) -> Result<Value, ApiError> {
        let route = format!("{}/{}", routes::QUESTION_READ, identifier);
        let response = self
            .send(
                self.request(Method::GET, &route, Some(session)),
                routes::QUESTION_READ,
            )
            .await?;
        response
            .pointer("/result/assessment_item")
            .cloned()
            .ok_or_else(|| ApiError::Malformed(format!("no assessment item in read of {identifier}")))
    }

    async fn review_content(&self, session: &AuthSession, identifier: &str) -> Result<(), ApiError> {
        let route = format!("{}/{}", routes::CONTENT_REVIEW, identifier);
        self.post_json(&route, Some(session), &payloads::review())
            .await?;
        Ok(())
    }

    async fn publish_content(
        &self,
        session: &AuthSession,
        identifier: &str,
    ) -> Result<(), ApiError> {
        let route = format!("{}/{}", routes::CONTENT_PUBLISH, identifier);
        self.post_json(&route, Some(session), &payloads::publish(&self.content))
            .await?;
        Ok(())
    }

    async fn enrol(&self, session: &AuthSession, enrolment: &Enrolment) -> Result<(), ApiError> {
        self.post_json(routes::ENROL, Some(session), &payloads::enrol(enrolment))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_errmsg_is_kept() {
        let body = r#"{"params":{"err":"USER_ALREADY_ENROLLED_COURSE","errmsg":"User has already enrolled to this course"}}"#;
        let err = error_from_response(400, body);
        assert!(err.has_structured_message());
        assert_eq!(err.user_message(), "User has already enrolled to this course");
    }

    #[test]
    fn plain_error_body_falls_back_to_status_text() {
        let err = error_from_response(502, "Bad Gateway");
        assert!(!err.has_structured_message());
        assert_eq!(
            err.user_message(),
            "request failed with status 502: Bad Gateway"
        );
    }

    #[test]
    fn user_id_is_last_segment_of_sub() {
        let claims = URL_SAFE_NO_PAD.encode(r#"{"sub":"f:realm-id:user-123"}"#);
        let token = format!("header.{claims}.signature");
        assert_eq!(user_id_from_token(&token).unwrap(), "user-123");
        assert!(user_id_from_token("not-a-jwt").is_err());
    }

    #[test]
    fn search_hits_read_string_scores() {
        let response: Value = serde_json::json!({
            "result": { "count": 1, "items": [{ "identifier": "do_1", "type": "mcq", "itemType": "UNIT", "max_score": "4" }] }
        });
        let hit = first_hit(&response).unwrap();
        assert_eq!(number_at(hit, "max_score"), Some(4));
    }
}
