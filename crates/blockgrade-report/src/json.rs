//! JSON rendering of grading results.
//!
//! Serializes a [`DisplayModel`] for programmatic consumers, compact or
//! pretty-printed.
//!
//! # Example
//!
//! ```rust
//! use blockgrade_report::{present, GradingResult};
//! use blockgrade_report::json::JsonGenerator;
//!
//! let model = present(&GradingResult::new(92.5));
//! let generator = JsonGenerator::new(&model);
//!
//! let compact = generator.generate().unwrap();
//! assert!(compact.contains(r#""tier":"high""#));
//! ```

use std::io::Write;

use crate::{DisplayModel, ReportError, Result};

/// JSON generator for a display model.
pub struct JsonGenerator<'a> {
    model: &'a DisplayModel,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a generator for the given model.
    #[must_use]
    pub const fn new(model: &'a DisplayModel) -> Self {
        Self { model }
    }

    /// Generates compact JSON on a single line.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.model).map_err(ReportError::from)
    }

    /// Generates JSON with two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.model).map_err(ReportError::from)
    }

    /// Writes the JSON followed by a newline to `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if serialization fails and
    /// [`ReportError::Io`] if writing fails.
    pub fn write_to(&self, mut writer: impl Write, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}
