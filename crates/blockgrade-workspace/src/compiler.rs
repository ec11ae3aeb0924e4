//! Block-to-source compilation.

use tracing::{debug, instrument};

use crate::generator::{CodeGenerator, GeneratorError, JavaScriptGenerator};
use crate::workspace::BlockSource;

/// Compiles the current block graph of a workspace into source text.
///
/// The compiler never caches: every call snapshots the source it is given
/// and hands the generator's output back unmodified.
///
/// ```
/// use blockgrade_workspace::{BlockCompiler, WorkspaceState};
///
/// let compiler = BlockCompiler::javascript();
/// assert_eq!(compiler.compile(&WorkspaceState::default()).unwrap(), "");
/// assert_eq!(compiler.language_tag(), "javascript");
/// ```
#[derive(Debug, Clone, Default)]
pub struct BlockCompiler<G = JavaScriptGenerator> {
    generator: G,
}

impl BlockCompiler {
    /// Creates a compiler targeting JavaScript.
    #[must_use]
    pub const fn javascript() -> Self {
        Self::new(JavaScriptGenerator::new())
    }
}

impl<G: CodeGenerator> BlockCompiler<G> {
    /// Creates a compiler backed by `generator`.
    pub const fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Language tag of the generated code.
    pub fn language_tag(&self) -> &'static str {
        self.generator.language_tag()
    }

    /// Generates source text for the current state of `source`.
    ///
    /// # Errors
    ///
    /// Returns a [`GeneratorError`] if the block graph contains a block the
    /// generator does not know or a block that is malformed.
    #[instrument(skip_all, fields(language = self.generator.language_tag()))]
    pub fn compile(&self, source: &dyn BlockSource) -> Result<String, GeneratorError> {
        let state = source.snapshot();
        let code = self.generator.workspace_to_code(&state)?;
        debug!(blocks = state.block_count(), bytes = code.len(), "Compiled workspace");
        Ok(code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::block::{BlockState, WorkspaceState};
    use parking_lot::Mutex;

    fn print_hi() -> BlockState {
        BlockState::new("text_print")
            .with_input("TEXT", BlockState::new("text").with_field("TEXT", "hi"))
    }

    /// A source whose state can change between compiles.
    struct Live(Mutex<WorkspaceState>);

    impl BlockSource for Live {
        fn snapshot(&self) -> WorkspaceState {
            self.0.lock().clone()
        }
    }

    #[test]
    fn empty_workspace_compiles_to_empty_string() {
        let compiler = BlockCompiler::javascript();
        assert_eq!(compiler.compile(&WorkspaceState::default()).unwrap(), "");
    }

    #[test]
    fn compile_is_idempotent() {
        let mut state = WorkspaceState::default();
        state.push(print_hi());
        let compiler = BlockCompiler::javascript();

        let first = compiler.compile(&state).unwrap();
        let second = compiler.compile(&state).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("window.alert('hi')"));
    }

    #[test]
    fn compile_reads_current_state() {
        let live = Live(Mutex::new(WorkspaceState::default()));
        let compiler = BlockCompiler::javascript();
        assert_eq!(compiler.compile(&live).unwrap(), "");

        live.0.lock().push(print_hi());
        assert_eq!(compiler.compile(&live).unwrap(), "window.alert('hi');\n");
    }

    #[test]
    fn custom_generator_output_is_returned_unmodified() {
        struct Fixed;
        impl CodeGenerator for Fixed {
            fn language_tag(&self) -> &'static str {
                "python"
            }
            fn workspace_to_code(&self, _: &WorkspaceState) -> Result<String, GeneratorError> {
                Ok("  print('raw')  \n\n".to_string())
            }
        }

        let compiler = BlockCompiler::new(Fixed);
        assert_eq!(compiler.language_tag(), "python");
        assert_eq!(
            compiler.compile(&WorkspaceState::default()).unwrap(),
            "  print('raw')  \n\n"
        );
    }
}
