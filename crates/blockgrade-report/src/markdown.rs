//! Markdown rendering of grading results.
//!
//! The output has a title line carrying the score, a tier line, then one
//! `##` section per entry of [`DisplayModel::sections`].
//!
//! # Example
//!
//! ```rust
//! use blockgrade_report::{present, GradingResult, MarkdownRenderer};
//!
//! let model = present(&GradingResult::new(72.0).with_feedback("Good start."));
//! let markdown = MarkdownRenderer::new(&model).generate();
//!
//! assert!(markdown.starts_with("# Grading Result: 72.0 / 100\n"));
//! assert!(markdown.contains("## AI Feedback\n"));
//! ```

use std::fmt::Write;

use crate::{DisplayModel, NumberedItem, Section, MAX_SCORE};

/// Renders a [`DisplayModel`] as Markdown.
pub struct MarkdownRenderer<'a> {
    model: &'a DisplayModel,
}

impl<'a> MarkdownRenderer<'a> {
    /// Creates a renderer for the given model.
    #[must_use]
    pub const fn new(model: &'a DisplayModel) -> Self {
        Self { model }
    }

    /// Renders the complete document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        for section in &self.model.sections {
            match section {
                Section::Feedback { heading, body } => {
                    Self::write_feedback(&mut output, heading, body);
                }
                Section::Suggestions { heading, items } => {
                    Self::write_suggestions(&mut output, heading, items);
                }
            }
        }

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Grading Result: {} / {MAX_SCORE:.0}\n",
            self.model.score_text
        );
        let _ = writeln!(
            output,
            "**Tier**: {} ({})\n",
            self.model.tier, self.model.colour
        );
    }

    /// Feedback is quoted line by line so its own line breaks survive.
    fn write_feedback(output: &mut String, heading: &str, body: &str) {
        let _ = writeln!(output, "## {heading}\n");
        for line in body.lines() {
            if line.is_empty() {
                let _ = writeln!(output, ">");
            } else {
                let _ = writeln!(output, "> {}", escape_markdown(line));
            }
        }
        let _ = writeln!(output);
    }

    fn write_suggestions(output: &mut String, heading: &str, items: &[NumberedItem]) {
        let _ = writeln!(output, "## {heading}\n");
        for item in items {
            let _ = writeln!(output, "{}. {}", item.number, escape_markdown(&item.text));
        }
        let _ = writeln!(output);
    }
}

/// Escapes characters with Markdown meaning. Newlines become `<br>` so an
/// entry stays on one list line.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            '\r' => {}
            _ => result.push(ch),
        }
    }

    result
}
