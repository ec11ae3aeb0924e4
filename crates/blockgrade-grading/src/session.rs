//! Session context: bearer tokens and enrollment resolution.

use std::fmt;
use std::path::PathBuf;

use tracing::debug;

/// Environment variable read by [`EnvToken::standard`].
pub const TOKEN_ENV: &str = "BLOCKGRADE_TOKEN";

/// Enrollment used when nothing more specific is known.
pub const DEFAULT_ENROLLMENT_ID: i64 = 1;

/// Source of the bearer token attached to grading requests.
///
/// Returning `None` is not an error: the request goes out without an
/// `Authorization` header and the service decides.
pub trait TokenStore: Send + Sync + fmt::Debug {
    /// The current token, if any.
    fn token(&self) -> Option<String>;
}

fn non_blank(token: String) -> Option<String> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// No session at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

impl TokenStore for NoToken {
    fn token(&self) -> Option<String> {
        None
    }
}

/// A fixed token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

impl TokenStore for StaticToken {
    fn token(&self) -> Option<String> {
        non_blank(self.0.clone())
    }
}

/// Reads the token from an environment variable on every request.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    /// Reads from `var`.
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    /// Reads from `BLOCKGRADE_TOKEN`.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(TOKEN_ENV)
    }
}

impl TokenStore for EnvToken {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var).ok().and_then(non_blank)
    }
}

/// Reads the token from a file on every request.
#[derive(Debug, Clone)]
pub struct FileToken {
    path: PathBuf,
}

impl FileToken {
    /// Reads from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileToken {
    fn token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => non_blank(contents),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "No token file");
                None
            }
        }
    }
}

/// Tries each store in order and returns the first token found.
#[derive(Debug, Default)]
pub struct ChainedTokens {
    stores: Vec<Box<dyn TokenStore>>,
}

impl ChainedTokens {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a store to the chain.
    #[must_use]
    pub fn with(mut self, store: impl TokenStore + 'static) -> Self {
        self.stores.push(Box::new(store));
        self
    }
}

impl TokenStore for ChainedTokens {
    fn token(&self) -> Option<String> {
        self.stores.iter().find_map(|store| store.token())
    }
}

/// Resolves which enrollment a submission belongs to.
pub trait EnrollmentResolver: Send + Sync + fmt::Debug {
    /// Enrollment id for a submission to `assignment_id`.
    fn enrollment_id(&self, assignment_id: i64) -> i64;
}

/// Uses the same enrollment for every assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedEnrollment(pub i64);

impl Default for FixedEnrollment {
    fn default() -> Self {
        Self(DEFAULT_ENROLLMENT_ID)
    }
}

impl EnrollmentResolver for FixedEnrollment {
    fn enrollment_id(&self, _assignment_id: i64) -> i64 {
        self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn static_token_trims_and_hides_value() {
        assert_eq!(StaticToken::new(" abc \n").token(), Some("abc".to_string()));
        assert_eq!(StaticToken::new("   ").token(), None);
        assert_eq!(format!("{:?}", StaticToken::new("secret")), "StaticToken(<redacted>)");
    }

    #[test]
    fn env_token_reads_variable() {
        let var = "BLOCKGRADE_TEST_TOKEN_ENV_READ";
        std::env::set_var(var, "from-env");
        assert_eq!(EnvToken::new(var).token(), Some("from-env".to_string()));
        std::env::remove_var(var);
        assert_eq!(EnvToken::new(var).token(), None);
    }

    #[test]
    fn file_token_reads_file() {
        let path = std::env::temp_dir().join("test_blockgrade_token");
        std::fs::write(&path, "from-file\n").unwrap();
        assert_eq!(FileToken::new(&path).token(), Some("from-file".to_string()));
        std::fs::remove_file(&path).ok();

        assert_eq!(FileToken::new("/nonexistent/blockgrade/token").token(), None);
    }

    #[test]
    fn chain_returns_first_token() {
        let chain = ChainedTokens::new()
            .with(NoToken)
            .with(StaticToken::new("second"))
            .with(StaticToken::new("third"));
        assert_eq!(chain.token(), Some("second".to_string()));
        assert_eq!(ChainedTokens::new().token(), None);
    }

    #[test]
    fn fixed_enrollment_defaults_to_one() {
        assert_eq!(FixedEnrollment::default().enrollment_id(42), 1);
        assert_eq!(FixedEnrollment(9).enrollment_id(42), 9);
    }
}
