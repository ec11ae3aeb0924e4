//! Blockgrade result presentation
//!
//! This crate turns a [`GradingResult`] received from the grading service into
//! a [`DisplayModel`]: a formatted score, a [`ScoreTier`] used for emphasis, and
//! the ordered sections a user interface shows below the score. Everything
//! here is a pure function of its input.
//!
//! # Types
//!
//! - [`GradingResult`] - Score, narrative feedback and suggestions from the grader
//! - [`ScoreTier`] - Presentation-only classification of a score
//! - [`DisplayModel`] - What a surface renders for one result
//! - [`Section`] - A feedback or suggestions block inside the display model
//!
//! # Renderers
//!
//! - [`MarkdownRenderer`] - Markdown for files and chat surfaces
//! - [`TextRenderer`] - Plain text for terminals
//! - [`json::JsonGenerator`] - JSON with compact or pretty formatting
//!
//! # Example
//!
//! ```rust
//! use blockgrade_report::{present, GradingResult, ScoreTier};
//!
//! let result = GradingResult::new(92.5).with_suggestion("Use better variable names");
//! let model = present(&result);
//!
//! assert_eq!(model.score_text, "92.5");
//! assert_eq!(model.tier, ScoreTier::High);
//! assert_eq!(model.suggestions()[0].number, 1);
//! ```

pub mod json;
mod markdown;
mod text;

pub use markdown::MarkdownRenderer;
pub use text::TextRenderer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scores at or above this are [`ScoreTier::High`].
pub const HIGH_THRESHOLD: f64 = 80.0;

/// Scores at or above this (and below [`HIGH_THRESHOLD`]) are [`ScoreTier::Medium`].
pub const MEDIUM_THRESHOLD: f64 = 60.0;

/// Upper bound of the score scale, shown next to every score.
pub const MAX_SCORE: f64 = 100.0;

/// Heading of the narrative feedback section.
pub const FEEDBACK_HEADING: &str = "AI Feedback";

/// Heading of the suggestions section.
pub const SUGGESTIONS_HEADING: &str = "Suggestions for Improvement";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while writing a rendered result.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the display model to JSON.
    #[error("failed to serialize grading result: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to write the rendered output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Grading Result
// ============================================================================

/// A successful grading outcome.
///
/// The score has already been coerced to a number by the submission layer;
/// this crate never sees the raw payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    /// Score on a 0 to 100 scale.
    pub score: f64,

    /// Narrative feedback written by the grader, if any.
    #[serde(
        rename = "aiFeedback",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub narrative_feedback: Option<String>,

    /// Improvement suggestions in the order the grader gave them.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl GradingResult {
    /// Creates a result with only a score.
    #[must_use]
    pub const fn new(score: f64) -> Self {
        Self {
            score,
            narrative_feedback: None,
            suggestions: Vec::new(),
        }
    }

    /// Sets the narrative feedback.
    #[must_use]
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.narrative_feedback = Some(feedback.into());
        self
    }

    /// Appends a suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Tier of this result's score.
    #[must_use]
    pub fn tier(&self) -> ScoreTier {
        classify(self.score)
    }
}

// ============================================================================
// Score Tier
// ============================================================================

/// Presentation-only classification of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTier {
    /// 80 and above.
    High,
    /// 60 up to, but not including, 80.
    Medium,
    /// Below 60.
    Low,
}

impl ScoreTier {
    /// Colour used to emphasise scores of this tier.
    #[must_use]
    pub const fn colour(&self) -> &'static str {
        match self {
            Self::High => "green",
            Self::Medium => "yellow",
            Self::Low => "red",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl std::fmt::Display for ScoreTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Classifies a score into its tier.
///
/// A score that is not a number falls into [`ScoreTier::Low`].
///
/// ```rust
/// use blockgrade_report::{classify, ScoreTier};
///
/// assert_eq!(classify(59.999), ScoreTier::Low);
/// assert_eq!(classify(60.0), ScoreTier::Medium);
/// assert_eq!(classify(80.0), ScoreTier::High);
/// ```
#[must_use]
pub fn classify(score: f64) -> ScoreTier {
    if score >= HIGH_THRESHOLD {
        ScoreTier::High
    } else if score >= MEDIUM_THRESHOLD {
        ScoreTier::Medium
    } else {
        ScoreTier::Low
    }
}

/// Formats a score with one decimal place, e.g. `92.5`.
#[must_use]
pub fn format_score(score: f64) -> String {
    format!("{score:.1}")
}

// ============================================================================
// Display Model
// ============================================================================

/// One numbered entry of the suggestions list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberedItem {
    /// 1-based position.
    pub number: usize,
    /// The suggestion text.
    pub text: String,
}

/// A block shown under the score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Section {
    /// Narrative feedback, shown verbatim.
    Feedback {
        /// Section heading.
        heading: String,
        /// Feedback text, line breaks preserved.
        body: String,
    },
    /// Ordered suggestions.
    Suggestions {
        /// Section heading.
        heading: String,
        /// Suggestions numbered from 1 in source order.
        items: Vec<NumberedItem>,
    },
}

/// Everything a surface needs to show one grading result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayModel {
    /// Raw score.
    pub score: f64,
    /// Score formatted with one decimal place.
    pub score_text: String,
    /// Tier used for emphasis.
    pub tier: ScoreTier,
    /// Colour of the tier.
    pub colour: String,
    /// Sections in display order. Empty feedback or suggestions are omitted.
    pub sections: Vec<Section>,
}

impl DisplayModel {
    /// Short notification text, e.g. `Your score: 92.5/100`.
    #[must_use]
    pub fn headline(&self) -> String {
        format!("Your score: {}/100", self.score_text)
    }

    /// The feedback text, if the model has a feedback section.
    #[must_use]
    pub fn feedback(&self) -> Option<&str> {
        self.sections.iter().find_map(|section| match section {
            Section::Feedback { body, .. } => Some(body.as_str()),
            Section::Suggestions { .. } => None,
        })
    }

    /// The numbered suggestions, empty if there are none.
    #[must_use]
    pub fn suggestions(&self) -> &[NumberedItem] {
        self.sections
            .iter()
            .find_map(|section| match section {
                Section::Suggestions { items, .. } => Some(items.as_slice()),
                Section::Feedback { .. } => None,
            })
            .unwrap_or_default()
    }
}

/// Builds the display model for a grading result.
///
/// Feedback comes first, then suggestions. Sections with nothing to show
/// are left out.
#[must_use]
pub fn present(result: &GradingResult) -> DisplayModel {
    let tier = classify(result.score);
    let mut sections = Vec::with_capacity(2);

    if let Some(feedback) = result.narrative_feedback.as_deref() {
        if !feedback.is_empty() {
            sections.push(Section::Feedback {
                heading: FEEDBACK_HEADING.to_string(),
                body: feedback.to_string(),
            });
        }
    }

    if !result.suggestions.is_empty() {
        let items = result
            .suggestions
            .iter()
            .enumerate()
            .map(|(index, text)| NumberedItem {
                number: index + 1,
                text: text.clone(),
            })
            .collect();
        sections.push(Section::Suggestions {
            heading: SUGGESTIONS_HEADING.to_string(),
            items,
        });
    }

    DisplayModel {
        score: result.score,
        score_text: format_score(result.score),
        tier,
        colour: tier.colour().to_string(),
        sections,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn classify_boundaries() {
        assert_eq!(classify(59.999), ScoreTier::Low);
        assert_eq!(classify(60.0), ScoreTier::Medium);
        assert_eq!(classify(79.999), ScoreTier::Medium);
        assert_eq!(classify(80.0), ScoreTier::High);
        assert_eq!(classify(100.0), ScoreTier::High);
        assert_eq!(classify(0.0), ScoreTier::Low);
        assert_eq!(classify(f64::NAN), ScoreTier::Low);
    }

    #[test]
    fn tier_colours() {
        assert_eq!(ScoreTier::High.colour(), "green");
        assert_eq!(ScoreTier::Medium.colour(), "yellow");
        assert_eq!(ScoreTier::Low.colour(), "red");
        assert_eq!(ScoreTier::Medium.to_string(), "Medium");
    }

    #[test]
    fn score_is_formatted_with_one_decimal() {
        assert_eq!(format_score(92.5), "92.5");
        assert_eq!(format_score(85.0), "85.0");
        assert_eq!(format_score(0.0), "0.0");
        assert_eq!(format_score(66.66), "66.7");
    }

    #[test]
    fn present_numbers_suggestions_in_order() {
        let result = GradingResult::new(92.5)
            .with_suggestion("Use better variable names")
            .with_suggestion("Add comments");
        let model = present(&result);

        assert_eq!(model.tier, ScoreTier::High);
        assert_eq!(model.colour, "green");
        assert_eq!(model.feedback(), None);
        assert_eq!(
            model.suggestions(),
            &[
                NumberedItem {
                    number: 1,
                    text: "Use better variable names".to_string()
                },
                NumberedItem {
                    number: 2,
                    text: "Add comments".to_string()
                },
            ]
        );
    }

    #[test]
    fn present_omits_empty_sections() {
        let model = present(&GradingResult::new(40.0).with_feedback(""));
        assert!(model.sections.is_empty());
        assert!(model.suggestions().is_empty());
        assert_eq!(model.tier, ScoreTier::Low);
    }

    #[test]
    fn feedback_comes_before_suggestions() {
        let result = GradingResult::new(70.0)
            .with_suggestion("Handle the empty case")
            .with_feedback("Mostly correct.\nWatch the edge cases.");
        let model = present(&result);

        assert!(matches!(model.sections[0], Section::Feedback { .. }));
        assert!(matches!(model.sections[1], Section::Suggestions { .. }));
        assert_eq!(
            model.feedback(),
            Some("Mostly correct.\nWatch the edge cases.")
        );
    }

    #[test]
    fn headline_matches_notification_text() {
        assert_eq!(
            present(&GradingResult::new(92.5)).headline(),
            "Your score: 92.5/100"
        );
    }

    #[test]
    fn grading_result_uses_wire_field_names() {
        let result: GradingResult = serde_json::from_str(
            r#"{"score": 88, "aiFeedback": "Nice", "suggestions": ["a"]}"#,
        )
        .unwrap();
        assert_eq!(
            result,
            GradingResult::new(88.0).with_feedback("Nice").with_suggestion("a")
        );

        let minimal: GradingResult = serde_json::from_str(r#"{"score": 1.5}"#).unwrap();
        assert_eq!(minimal, GradingResult::new(1.5));
    }
}
