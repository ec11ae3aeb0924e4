//! Blockgrade Block Workspace
//!
//! Lifecycle management for the embedded visual-programming surface and
//! deterministic conversion of its block graph into source text.
//!
//! The visual widget is treated as an external resource. The rest of the
//! system only sees it through a handful of narrow seams:
//!
//! - [`Container`] - the host element a workspace is bound to
//! - [`WorkspaceManager`] - create, resize-synchronize and dispose workspaces
//! - [`BlockSource`] - read-only snapshots of the current block graph
//! - [`BlockCompiler`] - turn a snapshot into linear source text

pub mod block;
pub mod compiler;
pub mod container;
pub mod generator;
mod manager;
pub mod options;
pub mod toolbox;
pub mod workspace;

pub use block::{BlockState, InputState, NextState, TopBlocks, VariableState, WorkspaceState};
pub use compiler::BlockCompiler;
pub use container::{Container, HeadlessContainer, Viewport};
pub use generator::{CodeGenerator, GeneratorError, JavaScriptGenerator};
pub use manager::{ManagedWorkspace, ResyncSchedule, WorkspaceManager, DEFAULT_RESYNC_DELAYS_MS};
pub use options::{GridOptions, ViewOptions, ZoomOptions};
pub use toolbox::{CategoryContents, ToolboxCategory, ToolboxItem, ToolboxSpec};
pub use workspace::{BlockSource, Workspace};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while managing a workspace.
///
/// These are environment or programming defects and are surfaced immediately
/// rather than folded into a soft outcome.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The container could not host a workspace.
    #[error("failed to initialize workspace in container '{container}': {reason}")]
    Initialization {
        /// Identifier of the container.
        container: String,
        /// Why initialization failed.
        reason: String,
    },

    /// Another workspace is still bound to the container.
    #[error("container '{0}' already hosts a workspace; dispose it before creating another")]
    ContainerInUse(String),

    /// The workspace has already been disposed.
    #[error("workspace has been disposed")]
    Disposed,

    /// A serialized block program could not be parsed.
    #[error("invalid block program: {0}")]
    InvalidProgram(#[from] serde_json::Error),
}

impl WorkspaceError {
    /// Creates a new `Initialization` error.
    #[must_use]
    pub fn initialization(container: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Initialization {
            container: container.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for workspace operations.
pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Lifecycle state of a managed workspace.
///
/// `Uninitialized -> Ready -> Disposed`, where `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No workspace has been created yet.
    #[default]
    Uninitialized,
    /// The workspace is attached and usable.
    Ready,
    /// The workspace has been torn down.
    Disposed,
}

impl LifecycleState {
    /// Returns `true` for the terminal `Disposed` state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Disposed)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Ready => write!(f, "ready"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

/// Pixel dimensions of a container or rendered viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Creates a new size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
