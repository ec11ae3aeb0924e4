//! HTTP client for the grading service.
//!
//! [`GradingBoundary`] is the seam the submission controller talks through.
//! It reports every HTTP response as an [`HttpReply`], whatever its status,
//! and reserves [`TransportError`] for requests that got no response at all.
//! [`GradingClient`] is the `reqwest` implementation and also carries the
//! related history, detail and mark-final endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::{FailureCategory, GradingError, Result};
use crate::payload::{coerce_score, parse_body};
use crate::session::TokenStore;

const SUBMIT_PATH: &str = "/api/code-submissions/submit";
const HISTORY_PATH: &str = "/api/code-submissions/history";
const SUBMISSIONS_PATH: &str = "/api/code-submissions";

/// Body of a submission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    /// Enrollment the submission is recorded against.
    pub enrollment_id: i64,
    /// Assignment being answered.
    pub assignment_id: i64,
    /// Source text.
    pub code: String,
    /// Language tag, e.g. `javascript`.
    pub language: String,
}

/// A response from the service, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// Reason phrase, e.g. `Internal Server Error`.
    pub reason: Option<String>,
    /// Parsed JSON body. `None` when the body was empty or not JSON.
    pub body: Option<Value>,
}

impl HttpReply {
    /// Creates a reply with the canonical reason phrase for `status`.
    #[must_use]
    pub fn new(status: u16, body: Option<Value>) -> Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .map(str::to_string);
        Self {
            status,
            reason,
            body,
        }
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Status line such as `500 Internal Server Error`.
    #[must_use]
    pub fn status_line(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{} {reason}", self.status),
            None => self.status.to_string(),
        }
    }

    /// The body's non-empty `message` field, or the status line.
    #[must_use]
    pub fn message(&self) -> String {
        self.body
            .as_ref()
            .and_then(|body| body.get("message"))
            .and_then(Value::as_str)
            .filter(|message| !message.trim().is_empty())
            .map_or_else(|| self.status_line(), str::to_string)
    }

    /// Converts a failing reply into a [`GradingError::Request`].
    fn into_error(self) -> GradingError {
        GradingError::request(FailureCategory::from_status(self.status), self.message())
    }
}

/// A request that produced no response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no response from {url}: {reason}")]
pub struct TransportError {
    /// Where the request was sent.
    pub url: String,
    /// What the transport reported.
    pub reason: String,
}

/// The remote grading service, as the submission workflow sees it.
#[async_trait]
pub trait GradingBoundary: Send + Sync {
    /// Sends one submission and returns whatever the service answered.
    async fn submit(
        &self,
        request: &SubmissionRequest,
    ) -> std::result::Result<HttpReply, TransportError>;
}

/// A submission as stored by the grading service.
///
/// Fields the client does not know about are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    /// Submission id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Assignment id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<i64>,
    /// Enrollment id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_id: Option<i64>,
    /// Language tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Submitted source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Score, coerced the same way as a fresh grading result.
    #[serde(
        default,
        deserialize_with = "lenient_score",
        skip_serializing_if = "Option::is_none"
    )]
    pub score: Option<f64>,
    /// Narrative feedback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_feedback: Option<String>,
    /// Suggestions in service order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    /// Whether this submission counts as the final one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,
    /// Submission time as sent by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    /// Everything else.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl SubmissionRecord {
    /// Parses `submitted_at`, accepting RFC 3339 or a local timestamp
    /// without offset.
    #[must_use]
    pub fn submitted_at(&self) -> Option<NaiveDateTime> {
        let raw = self.submitted_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.naive_utc())
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()
    }
}

fn lenient_score<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(|value| coerce_score(Some(&value))))
}

/// `reqwest` client for the grading service.
#[derive(Debug, Clone)]
pub struct GradingClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl GradingClient {
    /// Creates a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`GradingError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GradingError::HttpClient`] if the HTTP client cannot be built.
    pub fn from_config(config: &Config, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        Self::new(config.base_url.clone(), tokens)
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        url: String,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<HttpReply, TransportError> {
        let transport = |e: reqwest::Error| TransportError {
            url: url.clone(),
            reason: e.to_string(),
        };

        let response = self.authorize(request).send().await.map_err(transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport)?;
        let body = parse_body(&bytes);
        debug!(%url, status = status.as_u16(), has_body = body.is_some(), "Grading service replied");

        Ok(HttpReply {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            body,
        })
    }

    /// Sends a request and returns the JSON body of a 2xx reply.
    async fn call(&self, url: String, request: reqwest::RequestBuilder) -> Result<Option<Value>> {
        let reply = self.send(url, request).await.map_err(|e| {
            warn!(error = %e, "Grading service unreachable");
            GradingError::network()
        })?;
        if reply.is_success() {
            Ok(reply.body)
        } else {
            Err(reply.into_error())
        }
    }

    /// Lists earlier submissions for an assignment.
    ///
    /// # Errors
    ///
    /// Returns [`GradingError::Request`] if the service cannot be reached,
    /// answers with a failing status, or sends something other than a list.
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        enrollment_id: i64,
        assignment_id: i64,
    ) -> Result<Vec<SubmissionRecord>> {
        let url = self.url(HISTORY_PATH);
        let request = self.http.get(&url).query(&[
            ("enrollmentId", enrollment_id),
            ("assignmentId", assignment_id),
        ]);
        match self.call(url, request).await? {
            None => Ok(Vec::new()),
            Some(body) => serde_json::from_value(body).map_err(unexpected_response),
        }
    }

    /// Fetches one submission.
    ///
    /// # Errors
    ///
    /// Returns [`GradingError::Request`] if the service cannot be reached,
    /// answers with a failing status, or sends no submission.
    #[instrument(skip(self))]
    pub async fn detail(&self, submission_id: i64) -> Result<SubmissionRecord> {
        let url = self.url(&format!("{SUBMISSIONS_PATH}/{submission_id}"));
        let request = self.http.get(&url);
        match self.call(url, request).await? {
            None => Err(GradingError::request(
                FailureCategory::ServerError,
                "unexpected grading response: empty body",
            )),
            Some(body) => serde_json::from_value(body).map_err(unexpected_response),
        }
    }

    /// Marks a submission as the final one for its assignment.
    ///
    /// Returns the updated submission when the service sends it back.
    ///
    /// # Errors
    ///
    /// Returns [`GradingError::Request`] if the service cannot be reached or
    /// answers with a failing status.
    #[instrument(skip(self))]
    pub async fn mark_final(&self, submission_id: i64) -> Result<Option<SubmissionRecord>> {
        let url = self.url(&format!("{SUBMISSIONS_PATH}/{submission_id}/mark-final"));
        let request = self.http.put(&url);
        match self.call(url, request).await? {
            Some(body @ Value::Object(_)) => serde_json::from_value(body)
                .map(Some)
                .map_err(unexpected_response),
            _ => Ok(None),
        }
    }
}

fn unexpected_response(e: serde_json::Error) -> GradingError {
    GradingError::request(
        FailureCategory::ServerError,
        format!("unexpected grading response: {e}"),
    )
}

#[async_trait]
impl GradingBoundary for GradingClient {
    async fn submit(
        &self,
        request: &SubmissionRequest,
    ) -> std::result::Result<HttpReply, TransportError> {
        let url = self.url(SUBMIT_PATH);
        let builder = self.http.post(&url).json(request);
        self.send(url, builder).await
    }
}
