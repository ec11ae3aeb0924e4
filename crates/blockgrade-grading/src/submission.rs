//! The submission workflow.
//!
//! One [`SubmissionController`] drives every attempt to turn the current
//! program into a graded outcome, whichever surface it came from. An attempt
//! goes `Validating -> Submitting -> {Succeeded, Failed}`; a validation
//! failure skips `Submitting` and never touches the network. Every failure is
//! folded into the returned [`SubmissionOutcome`]: `submit` itself cannot fail.
//!
//! Attempts are numbered. For each assignment only the newest attempt may
//! publish its outcome; an older attempt that resolves later is handed back
//! to its caller marked stale and otherwise ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use blockgrade_report::GradingResult;
use blockgrade_workspace::{BlockCompiler, BlockSource, CodeGenerator, GeneratorError};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::client::{GradingBoundary, HttpReply, SubmissionRequest};
use crate::config::Config;
use crate::error::FailureCategory;
use crate::payload::parse_grading_payload;
use crate::session::{EnrollmentResolver, FixedEnrollment};

/// Client-side timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Message for an empty text submission.
pub const EMPTY_CODE_MESSAGE: &str = "Please write some code before submitting.";

/// Message for an empty block submission.
pub const EMPTY_BLOCKS_MESSAGE: &str = "Please create some blocks before submitting.";

const UNEXPECTED_RESPONSE_MESSAGE: &str = "unexpected grading response";

const INVALID_BLOCKS_TITLE: &str = "Invalid Blocks";

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Where an attempt is in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// No attempt yet, or reset.
    #[default]
    Idle,
    /// Reading and checking the source text.
    Validating,
    /// Waiting for the grading service.
    Submitting,
    /// Graded.
    Succeeded,
    /// Not graded.
    Failed,
}

impl SubmissionStatus {
    /// Returns `true` once an attempt has resolved.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Validating => write!(f, "validating"),
            Self::Submitting => write!(f, "submitting"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why an attempt was not graded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionFailure {
    /// Failure class.
    pub category: FailureCategory,
    /// User-facing message.
    pub message: String,
    /// Notification title, when it differs from the category's.
    #[serde(skip)]
    title: Option<&'static str>,
}

impl SubmissionFailure {
    /// Creates a failure.
    #[must_use]
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            title: None,
        }
    }

    /// Nothing to submit.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Validation, message)
    }

    /// The blocks could not be turned into source text.
    #[must_use]
    pub fn invalid_program(reason: impl std::fmt::Display) -> Self {
        Self {
            title: Some(INVALID_BLOCKS_TITLE),
            ..Self::validation(format!("Your blocks could not be turned into code: {reason}"))
        }
    }

    /// No response reached the client.
    #[must_use]
    pub fn network() -> Self {
        Self::new(
            FailureCategory::Network,
            FailureCategory::Network.default_message(),
        )
    }

    /// A 2xx body that could not be read as a grading result.
    #[must_use]
    pub fn unexpected_response() -> Self {
        Self::new(FailureCategory::ServerError, UNEXPECTED_RESPONSE_MESSAGE)
    }

    /// Classifies a failing reply by status.
    ///
    /// 401 and 429 get fixed messages; anything else uses the body's
    /// `message` or the status line.
    #[must_use]
    pub fn from_reply(reply: &HttpReply) -> Self {
        let category = FailureCategory::from_status(reply.status);
        match category {
            FailureCategory::Unauthorized | FailureCategory::RateLimited => {
                Self::new(category, category.default_message())
            }
            _ => Self::new(category, reply.message()),
        }
    }

    /// Notification title.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self.title {
            Some(title) => title,
            None => self.category.title(),
        }
    }
}

impl std::fmt::Display for SubmissionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title(), self.message)
    }
}

/// The result of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// The service graded the program.
    Succeeded(GradingResult),
    /// It did not.
    Failed(SubmissionFailure),
}

impl SubmissionOutcome {
    /// Returns `true` for [`SubmissionOutcome::Succeeded`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// The grading result, if graded.
    #[must_use]
    pub const fn grading_result(&self) -> Option<&GradingResult> {
        match self {
            Self::Succeeded(result) => Some(result),
            Self::Failed(_) => None,
        }
    }

    /// The failure, if not graded.
    #[must_use]
    pub const fn failure(&self) -> Option<&SubmissionFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            Self::Succeeded(_) => None,
        }
    }

    /// Terminal status matching this outcome.
    #[must_use]
    pub const fn status(&self) -> SubmissionStatus {
        match self {
            Self::Succeeded(_) => SubmissionStatus::Succeeded,
            Self::Failed(_) => SubmissionStatus::Failed,
        }
    }
}

/// A resolved attempt as handed back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionAttempt {
    /// Controller-wide attempt number, starting at 1.
    pub sequence: u64,
    /// Assignment the attempt was for.
    pub assignment_id: i64,
    /// What happened.
    pub outcome: SubmissionOutcome,
    /// `true` if a newer attempt for the same assignment had started before
    /// this one resolved. Stale outcomes are not published.
    pub stale: bool,
}

/// A status change published to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionEvent {
    /// Attempt number.
    pub sequence: u64,
    /// Assignment the attempt is for.
    pub assignment_id: i64,
    /// New status.
    pub status: SubmissionStatus,
}

/// Yields the source text to submit.
///
/// Abstracts over reading an editor buffer and compiling a workspace.
pub trait SourceProvider: Send + Sync {
    /// The current source text.
    fn source_text(&self) -> Result<String, GeneratorError>;

    /// Message used when the source text is blank.
    fn empty_message(&self) -> &'static str {
        EMPTY_CODE_MESSAGE
    }
}

/// Source typed into the text editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSource(String);

impl TextSource {
    /// Wraps the editor buffer.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

impl SourceProvider for TextSource {
    fn source_text(&self) -> Result<String, GeneratorError> {
        Ok(self.0.clone())
    }
}

/// Compiles a block source at the moment the attempt reads it.
pub struct CompiledBlocks<'a, S, G = blockgrade_workspace::JavaScriptGenerator> {
    source: &'a S,
    compiler: BlockCompiler<G>,
}

impl<'a, S: BlockSource + Sync> CompiledBlocks<'a, S> {
    /// Compiles `source` to JavaScript.
    #[must_use]
    pub const fn javascript(source: &'a S) -> Self {
        Self {
            source,
            compiler: BlockCompiler::javascript(),
        }
    }
}

impl<'a, S: BlockSource + Sync, G: CodeGenerator> CompiledBlocks<'a, S, G> {
    /// Compiles `source` with `compiler`.
    #[must_use]
    pub const fn new(source: &'a S, compiler: BlockCompiler<G>) -> Self {
        Self { source, compiler }
    }

    /// Language tag of the generated code.
    pub fn language_tag(&self) -> &'static str {
        self.compiler.language_tag()
    }
}

impl<S: BlockSource + Sync, G: CodeGenerator> SourceProvider for CompiledBlocks<'_, S, G> {
    fn source_text(&self) -> Result<String, GeneratorError> {
        self.compiler.compile(self.source)
    }

    fn empty_message(&self) -> &'static str {
        EMPTY_BLOCKS_MESSAGE
    }
}

#[derive(Debug, Clone)]
struct Slot {
    sequence: u64,
    status: SubmissionStatus,
    outcome: Option<SubmissionOutcome>,
}

/// Drives submissions against a [`GradingBoundary`].
pub struct SubmissionController {
    boundary: Arc<dyn GradingBoundary>,
    enrollment: Arc<dyn EnrollmentResolver>,
    timeout: Duration,
    sequence: AtomicU64,
    slots: Mutex<HashMap<i64, Slot>>,
    events: broadcast::Sender<SubmissionEvent>,
}

impl std::fmt::Debug for SubmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionController")
            .field("enrollment", &self.enrollment)
            .field("timeout", &self.timeout)
            .field("attempts", &self.sequence.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SubmissionController {
    /// Creates a controller with the default enrollment and timeout.
    #[must_use]
    pub fn new(boundary: Arc<dyn GradingBoundary>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            boundary,
            enrollment: Arc::new(FixedEnrollment::default()),
            timeout: DEFAULT_TIMEOUT,
            sequence: AtomicU64::new(0),
            slots: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Creates a controller using the configured enrollment and timeout.
    #[must_use]
    pub fn from_config(boundary: Arc<dyn GradingBoundary>, config: &Config) -> Self {
        Self::new(boundary)
            .with_enrollment(Arc::new(FixedEnrollment(config.enrollment_id)))
            .with_timeout(config.timeout())
    }

    /// Sets the enrollment resolver.
    #[must_use]
    pub fn with_enrollment(mut self, enrollment: Arc<dyn EnrollmentResolver>) -> Self {
        self.enrollment = enrollment;
        self
    }

    /// Sets the client-side timeout for one grading request.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SubmissionEvent> {
        self.events.subscribe()
    }

    /// Status of the newest attempt for `assignment_id`.
    #[must_use]
    pub fn status(&self, assignment_id: i64) -> SubmissionStatus {
        self.slots
            .lock()
            .get(&assignment_id)
            .map_or(SubmissionStatus::Idle, |slot| slot.status)
    }

    /// Published outcome for `assignment_id`, if its newest attempt resolved.
    #[must_use]
    pub fn latest_outcome(&self, assignment_id: i64) -> Option<SubmissionOutcome> {
        self.slots
            .lock()
            .get(&assignment_id)
            .and_then(|slot| slot.outcome.clone())
    }

    /// Dismisses the published outcome and returns to `Idle`.
    ///
    /// An attempt still in flight for the assignment becomes stale.
    pub fn reset(&self, assignment_id: i64) {
        self.slots.lock().remove(&assignment_id);
        self.emit(0, assignment_id, SubmissionStatus::Idle);
    }

    /// Submits whatever `source` yields now.
    pub async fn submit(
        &self,
        assignment_id: i64,
        source: &dyn SourceProvider,
        language: &str,
    ) -> SubmissionAttempt {
        self.submit_with_cancel(assignment_id, source, language, &CancellationToken::new())
            .await
    }

    /// Like [`SubmissionController::submit`], but gives up with a `Network`
    /// failure as soon as `cancel` fires.
    #[instrument(skip(self, source, cancel), fields(sequence = tracing::field::Empty))]
    pub async fn submit_with_cancel(
        &self,
        assignment_id: i64,
        source: &dyn SourceProvider,
        language: &str,
        cancel: &CancellationToken,
    ) -> SubmissionAttempt {
        let sequence = self.begin(assignment_id);
        tracing::Span::current().record("sequence", sequence);

        let text = match source.source_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Cannot generate source");
                let failure = SubmissionFailure::invalid_program(e);
                return self.finish(assignment_id, sequence, SubmissionOutcome::Failed(failure));
            }
        };

        if text
            .trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
            .is_empty()
        {
            info!("Nothing to submit");
            let failure = SubmissionFailure::validation(source.empty_message());
            return self.finish(assignment_id, sequence, SubmissionOutcome::Failed(failure));
        }

        self.advance(assignment_id, sequence, SubmissionStatus::Submitting);
        let request = SubmissionRequest {
            enrollment_id: self.enrollment.enrollment_id(assignment_id),
            assignment_id,
            code: text,
            language: language.to_string(),
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!("Submission cancelled");
                SubmissionOutcome::Failed(SubmissionFailure::network())
            }
            reply = tokio::time::timeout(self.timeout, self.boundary.submit(&request)) => {
                match reply {
                    Err(_) => {
                        warn!(timeout = ?self.timeout, "Submission timed out");
                        SubmissionOutcome::Failed(SubmissionFailure::network())
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "Grading service unreachable");
                        SubmissionOutcome::Failed(SubmissionFailure::network())
                    }
                    Ok(Ok(reply)) => interpret(&reply),
                }
            }
        };

        self.finish(assignment_id, sequence, outcome)
    }

    fn begin(&self, assignment_id: i64) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.slots.lock().insert(
            assignment_id,
            Slot {
                sequence,
                status: SubmissionStatus::Validating,
                outcome: None,
            },
        );
        self.emit(sequence, assignment_id, SubmissionStatus::Validating);
        sequence
    }

    fn advance(&self, assignment_id: i64, sequence: u64, status: SubmissionStatus) {
        let current = {
            let mut slots = self.slots.lock();
            match slots.get_mut(&assignment_id) {
                Some(slot) if slot.sequence == sequence => {
                    slot.status = status;
                    true
                }
                _ => false,
            }
        };
        if current {
            self.emit(sequence, assignment_id, status);
        }
    }

    fn finish(
        &self,
        assignment_id: i64,
        sequence: u64,
        outcome: SubmissionOutcome,
    ) -> SubmissionAttempt {
        let status = outcome.status();
        let published = {
            let mut slots = self.slots.lock();
            match slots.get_mut(&assignment_id) {
                Some(slot) if slot.sequence == sequence => {
                    slot.status = status;
                    slot.outcome = Some(outcome.clone());
                    true
                }
                _ => false,
            }
        };

        if published {
            self.emit(sequence, assignment_id, status);
            match &outcome {
                SubmissionOutcome::Succeeded(result) => info!(score = result.score, "Submission graded"),
                SubmissionOutcome::Failed(failure) => {
                    info!(category = %failure.category, message = %failure.message, "Submission failed");
                }
            }
        } else {
            info!(%status, "Discarding stale submission outcome");
        }

        SubmissionAttempt {
            sequence,
            assignment_id,
            outcome,
            stale: !published,
        }
    }

    fn emit(&self, sequence: u64, assignment_id: i64, status: SubmissionStatus) {
        // No listeners is fine.
        let _ = self.events.send(SubmissionEvent {
            sequence,
            assignment_id,
            status,
        });
    }
}

fn interpret(reply: &HttpReply) -> SubmissionOutcome {
    if !reply.is_success() {
        return SubmissionOutcome::Failed(SubmissionFailure::from_reply(reply));
    }
    match parse_grading_payload(reply.body.as_ref()) {
        Ok(result) => SubmissionOutcome::Succeeded(result),
        Err(reason) => {
            warn!(%reason, "Unexpected grading response");
            SubmissionOutcome::Failed(SubmissionFailure::unexpected_response())
        }
    }
}
