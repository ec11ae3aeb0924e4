//! Blockgrade submission workflow
//!
//! This crate turns a program, typed as text or assembled from blocks, into
//! a graded outcome from the remote grading service.
//!
//! # Modules
//!
//! - [`submission`] - The [`SubmissionController`] state machine and source providers
//! - [`client`] - The grading service boundary and its `reqwest` client
//! - [`execution`] - The unrelated "run code" boundary
//! - [`session`] - Bearer tokens and enrollment resolution
//! - [`config`] - `blockgrade.json` loading and validation
//! - [`error`] - [`FailureCategory`] and [`GradingError`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use blockgrade_grading::{GradingClient, NoToken, SubmissionController, TextSource};
//!
//! # async fn example() -> blockgrade_grading::Result<()> {
//! let client = GradingClient::new("http://localhost:8080", Arc::new(NoToken))?;
//! let controller = SubmissionController::new(Arc::new(client));
//!
//! let attempt = controller
//!     .submit(1, &TextSource::new("console.log('hi')"), "javascript")
//!     .await;
//! println!("{:?}", attempt.outcome);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod execution;
mod payload;
pub mod session;
pub mod submission;

pub use client::{
    GradingBoundary, GradingClient, HttpReply, SubmissionRecord, SubmissionRequest,
    TransportError,
};
pub use config::Config;
pub use error::{FailureCategory, GradingError, Result};
pub use execution::{ExecutionOutput, Executor, PistonExecutor};
pub use payload::coerce_score;
pub use session::{
    ChainedTokens, EnrollmentResolver, EnvToken, FileToken, FixedEnrollment, NoToken,
    StaticToken, TokenStore,
};
pub use submission::{
    CompiledBlocks, SourceProvider, SubmissionAttempt, SubmissionController, SubmissionEvent,
    SubmissionFailure, SubmissionOutcome, SubmissionStatus, TextSource,
};
