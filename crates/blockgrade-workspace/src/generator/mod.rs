//! Block graph to source text generators.
//!
//! A [`CodeGenerator`] turns a [`WorkspaceState`] into linear source text in
//! one target language. Generators are stateless between calls: everything
//! a run needs (name tables, hoisted definitions) lives for one call only,
//! so two calls on the same state always produce the same text.

mod javascript;
mod names;

pub use javascript::JavaScriptGenerator;

use thiserror::Error;

use crate::block::WorkspaceState;

/// Translates a block graph into source text.
pub trait CodeGenerator: Send + Sync {
    /// Language tag sent along with generated code, e.g. `javascript`.
    fn language_tag(&self) -> &'static str;

    /// Generates source for every top-level block stack in `state`.
    ///
    /// An empty workspace yields an empty string.
    fn workspace_to_code(&self, state: &WorkspaceState) -> Result<String, GeneratorError>;
}

/// A block graph the generator cannot translate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    /// No generator exists for the block type.
    #[error("no code generator for block type '{block_type}' (block '{id}')\n\nSuggestion: Only use blocks offered by the toolbox")]
    UnsupportedBlock {
        /// The unknown block type.
        block_type: String,
        /// Id of the offending block.
        id: String,
    },

    /// A required field is missing.
    #[error("block '{id}' ({block_type}) is missing field '{field}'")]
    MissingField {
        /// Type of the offending block.
        block_type: String,
        /// Id of the offending block.
        id: String,
        /// Name of the missing field.
        field: String,
    },

    /// The block is present but its contents make no sense.
    #[error("block '{id}' ({block_type}) is malformed: {reason}")]
    MalformedBlock {
        /// Type of the offending block.
        block_type: String,
        /// Id of the offending block.
        id: String,
        /// What is wrong with it.
        reason: String,
    },
}
