//! Plain text rendering for terminals.

use std::fmt::Write;

use crate::{DisplayModel, Section, MAX_SCORE};

const INDENT: &str = "  ";

/// Renders a [`DisplayModel`] as indented plain text.
///
/// ```rust
/// use blockgrade_report::{present, GradingResult, TextRenderer};
///
/// let model = present(&GradingResult::new(55.0).with_suggestion("Test the loop bounds"));
/// let text = TextRenderer::new(&model).generate();
///
/// assert!(text.starts_with("Grading Result: 55.0 / 100 (Low)\n"));
/// assert!(text.contains("  1. Test the loop bounds\n"));
/// ```
pub struct TextRenderer<'a> {
    model: &'a DisplayModel,
}

impl<'a> TextRenderer<'a> {
    /// Creates a renderer for the given model.
    #[must_use]
    pub const fn new(model: &'a DisplayModel) -> Self {
        Self { model }
    }

    /// Renders the complete text.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "Grading Result: {} / {MAX_SCORE:.0} ({})",
            self.model.score_text, self.model.tier
        );

        for section in &self.model.sections {
            let _ = writeln!(output);
            match section {
                Section::Feedback { heading, body } => {
                    let _ = writeln!(output, "{heading}");
                    for line in body.lines() {
                        let _ = writeln!(output, "{INDENT}{line}");
                    }
                }
                Section::Suggestions { heading, items } => {
                    let _ = writeln!(output, "{heading}");
                    for item in items {
                        let _ = writeln!(output, "{INDENT}{}. {}", item.number, item.text);
                    }
                }
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{present, GradingResult};

    #[test]
    fn renders_every_section() {
        let model = present(
            &GradingResult::new(80.0)
                .with_feedback("Works.\nTidy.")
                .with_suggestion("Extract a function"),
        );

        assert_eq!(
            TextRenderer::new(&model).generate(),
            "Grading Result: 80.0 / 100 (High)\n\
             \n\
             AI Feedback\n\
             \x20 Works.\n\
             \x20 Tidy.\n\
             \n\
             Suggestions for Improvement\n\
             \x20 1. Extract a function\n"
        );
    }

    #[test]
    fn score_only() {
        let model = present(&GradingResult::new(0.0));
        assert_eq!(
            TextRenderer::new(&model).generate(),
            "Grading Result: 0.0 / 100 (Low)\n"
        );
    }
}
