//! Configuration for talking to the grading and execution services.
//!
//! Configuration lives in an optional `blockgrade.json` file with camelCase
//! keys. Every field has a default, so a missing file is the same as an
//! empty object.

use std::path::{Path, PathBuf};
use std::time::Duration;

use blockgrade_workspace::{ResyncSchedule, DEFAULT_RESYNC_DELAYS_MS};
use serde::{Deserialize, Serialize};

use crate::error::{GradingError, Result};
use crate::session::DEFAULT_ENROLLMENT_ID;

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "blockgrade.json";

/// Environment variable that overrides `baseUrl`.
pub const API_URL_ENV: &str = "BLOCKGRADE_API_URL";

/// Upper bound for a single resync delay.
const MAX_RESYNC_DELAY_MS: u64 = 10_000;

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

const fn default_enrollment_id() -> i64 {
    DEFAULT_ENROLLMENT_ID
}

fn default_language() -> String {
    "javascript".to_string()
}

const fn default_timeout_seconds() -> u64 {
    30
}

fn default_executor_url() -> String {
    "https://emkc.org/api/v2/piston".to_string()
}

fn default_resync_delays_ms() -> Vec<u64> {
    DEFAULT_RESYNC_DELAYS_MS.to_vec()
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the grading service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Enrollment used when no session supplies one.
    #[serde(default = "default_enrollment_id")]
    pub enrollment_id: i64,

    /// Language tag sent with text submissions.
    #[serde(default = "default_language")]
    pub language: String,

    /// Client-side timeout for one grading request, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// File holding a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,

    /// Base URL of the Piston-compatible execution service.
    #[serde(default = "default_executor_url")]
    pub executor_url: String,

    /// Delays after workspace creation at which the rendered size is resynced.
    #[serde(default = "default_resync_delays_ms")]
    pub resync_delays_ms: Vec<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            enrollment_id: default_enrollment_id(),
            language: default_language(),
            timeout_seconds: default_timeout_seconds(),
            token_file: None,
            executor_url: default_executor_url(),
            resync_delays_ms: default_resync_delays_ms(),
        }
    }
}

impl Config {
    /// Loads `blockgrade.json` from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed or validated.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            GradingError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `blockgrade.json` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed or validated.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GradingError::ConfigParseError`] if the file cannot be read or
    /// is not valid JSON, and [`GradingError::ConfigValidationError`] if a
    /// value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(GradingError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| GradingError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`GradingError::ConfigValidationError`] if an override is invalid.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_base_url_override(std::env::var(API_URL_ENV).ok())
    }

    /// Replaces `baseUrl` when `base_url` is set and non-blank.
    ///
    /// # Errors
    ///
    /// Returns [`GradingError::ConfigValidationError`] if the new URL is invalid.
    pub fn with_base_url_override(mut self, base_url: Option<String>) -> Result<Self> {
        if let Some(url) = base_url.filter(|url| !url.trim().is_empty()) {
            self.base_url = url.trim().to_string();
            self.validate()?;
        }
        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`GradingError::ConfigValidationError`] if any check fails.
    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.base_url) {
            return Err(GradingError::config_validation(
                format!("baseUrl must be an http(s) URL, got '{}'", self.base_url),
                "Set baseUrl to something like http://localhost:8080 in your blockgrade.json",
            ));
        }

        if !is_http_url(&self.executor_url) {
            return Err(GradingError::config_validation(
                format!(
                    "executorUrl must be an http(s) URL, got '{}'",
                    self.executor_url
                ),
                "Set executorUrl to a Piston API base such as https://emkc.org/api/v2/piston",
            ));
        }

        if self.enrollment_id <= 0 {
            return Err(GradingError::config_validation(
                "enrollmentId must be greater than 0",
                "Set enrollmentId to your enrollment number in your blockgrade.json",
            ));
        }

        if self.language.trim().is_empty() {
            return Err(GradingError::config_validation(
                "language must not be empty",
                "Set language to a tag such as \"javascript\" in your blockgrade.json",
            ));
        }

        if self.timeout_seconds == 0 {
            return Err(GradingError::config_validation(
                "timeoutSeconds must be greater than 0",
                "Set timeoutSeconds to at least 1 in your blockgrade.json",
            ));
        }

        if self.resync_delays_ms.is_empty() {
            return Err(GradingError::config_validation(
                "resyncDelaysMs must not be empty",
                "Remove resyncDelaysMs to use the default schedule",
            ));
        }

        if let Some(delay) = self
            .resync_delays_ms
            .iter()
            .find(|delay| **delay > MAX_RESYNC_DELAY_MS)
        {
            return Err(GradingError::config_validation(
                format!("resyncDelaysMs entry {delay} exceeds {MAX_RESYNC_DELAY_MS}ms"),
                "Keep every resync delay at or below 10000",
            ));
        }

        Ok(())
    }

    /// Client-side timeout for one grading request.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Resize schedule for managed workspaces.
    #[must_use]
    pub fn resync_schedule(&self) -> ResyncSchedule {
        ResyncSchedule::from_millis(&self.resync_delays_ms)
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    rest.is_some_and(|host| !host.is_empty())
}
