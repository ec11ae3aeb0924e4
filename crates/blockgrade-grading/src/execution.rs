//! Running code against the execution service.
//!
//! This is the "run" action of the text surface. It has nothing to do with
//! grading and shares only the HTTP stack and error type.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{FailureCategory, GradingError, Result};

/// Languages the execution service accepts, with the runtime version used.
pub const LANGUAGE_VERSIONS: &[(&str, &str)] = &[
    ("javascript", "18.15.0"),
    ("typescript", "5.0.3"),
    ("python", "3.10.0"),
    ("java", "15.0.2"),
    ("csharp", "6.12.0"),
    ("php", "8.2.3"),
];

/// Runtime version for `language`, if supported.
#[must_use]
pub fn language_version(language: &str) -> Option<&'static str> {
    LANGUAGE_VERSIONS
        .iter()
        .find(|(name, _)| *name == language)
        .map(|(_, version)| *version)
}

/// Output of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionOutput {
    /// Combined output split on newlines.
    pub lines: Vec<String>,
    /// `true` when the program wrote to stderr.
    pub is_error: bool,
}

/// Something that can run source text.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs `source` as `language`. Empty source is a no-op.
    async fn execute(&self, language: &str, source: &str) -> Result<ExecutionOutput>;
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    language: &'a str,
    version: &'a str,
    files: [SourceFile<'a>; 1],
}

#[derive(Serialize)]
struct SourceFile<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct ExecuteResponse {
    run: RunResult,
}

#[derive(Deserialize)]
struct RunResult {
    #[serde(default)]
    output: String,
    #[serde(default)]
    stderr: Option<String>,
}

/// Client for a Piston-compatible execution API.
#[derive(Debug, Clone)]
pub struct PistonExecutor {
    http: reqwest::Client,
    base_url: String,
}

impl PistonExecutor {
    /// Creates an executor for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`GradingError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Executor for PistonExecutor {
    #[instrument(skip(self, source), fields(bytes = source.len()))]
    async fn execute(&self, language: &str, source: &str) -> Result<ExecutionOutput> {
        if source.is_empty() {
            return Ok(ExecutionOutput::default());
        }

        let Some(version) = language_version(language) else {
            let supported: Vec<&str> = LANGUAGE_VERSIONS.iter().map(|(name, _)| *name).collect();
            return Err(GradingError::execution(
                format!("unsupported language '{language}'"),
                &supported,
            ));
        };

        let url = format!("{}/execute", self.base_url);
        let body = ExecuteRequest {
            language,
            version,
            files: [SourceFile { content: source }],
        };

        let response = self.http.post(&url).json(&body).send().await.map_err(|e| {
            warn!(%url, error = %e, "Execution service unreachable");
            GradingError::request(FailureCategory::Network, e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| body.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| status.to_string());
            return Err(GradingError::request(
                FailureCategory::from_status(status.as_u16()),
                message,
            ));
        }

        let parsed: ExecuteResponse = response.json().await.map_err(|e| {
            GradingError::request(
                FailureCategory::ServerError,
                format!("unexpected execution response: {e}"),
            )
        })?;

        let is_error = parsed.run.stderr.is_some_and(|stderr| !stderr.is_empty());
        let lines = parsed.run.output.split('\n').map(str::to_string).collect();
        debug!(is_error, "Execution finished");
        Ok(ExecutionOutput { lines, is_error })
    }
}
