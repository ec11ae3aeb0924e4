//! Parsing of grading service success bodies.

use blockgrade_report::GradingResult;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Leading decimal number of a string, the way a lenient float parser reads it.
static FLOAT_PREFIX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").ok());

/// Turns whatever the service sent as a score into a number.
///
/// Numbers are used as-is. Strings are read up to the first character that
/// cannot continue a decimal number, so `"92.5"` and `"92.5 points"` both give
/// `92.5`. Anything else, and anything that is not finite, gives `0`. This
/// never fails.
///
/// ```
/// use blockgrade_grading::coerce_score;
/// use serde_json::json;
///
/// assert_eq!(coerce_score(Some(&json!(85))), 85.0);
/// assert_eq!(coerce_score(Some(&json!("85"))), 85.0);
/// assert_eq!(coerce_score(Some(&json!("abc"))), 0.0);
/// assert_eq!(coerce_score(Some(&json!(null))), 0.0);
/// assert_eq!(coerce_score(None), 0.0);
/// ```
#[must_use]
pub fn coerce_score(value: Option<&Value>) -> f64 {
    let score = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => parse_float_prefix(text),
        _ => None,
    };
    score.filter(|score| score.is_finite()).unwrap_or(0.0)
}

fn parse_float_prefix(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let pattern: &Option<Regex> = &FLOAT_PREFIX;
    match pattern {
        Some(re) => re.find(text).and_then(|m| m.as_str().parse().ok()),
        None => text.trim_end().parse().ok(),
    }
}

/// Parses a response body as JSON.
///
/// Number literals too large for an `f64` read as `null` instead of failing
/// the whole body, so a wild score still coerces to `0`. Empty or non-JSON
/// bodies give `None`.
pub(crate) fn parse_body(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(_) => {
            let text = std::str::from_utf8(bytes).ok()?;
            let cleaned = null_out_of_range_numbers(text)?;
            serde_json::from_str(&cleaned).ok()
        }
    }
}

/// Rewrites number literals outside string values that overflow an `f64`
/// to `null`. Returns `None` when there was nothing to rewrite.
fn null_out_of_range_numbers(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut replaced = false;
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }
        if c == '-' || c.is_ascii_digit() {
            let mut end = start + c.len_utf8();
            while let Some(&(index, next)) = chars.peek() {
                if next.is_ascii_digit() || matches!(next, '.' | 'e' | 'E' | '+' | '-') {
                    end = index + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let literal = &text[start..end];
            if literal.parse::<f64>().is_ok_and(|n| n.is_infinite()) {
                out.push_str("null");
                replaced = true;
            } else {
                out.push_str(literal);
            }
            continue;
        }
        out.push(c);
    }

    replaced.then_some(out)
}

/// Reads a 2xx body into a [`GradingResult`].
///
/// The body must be a JSON object. `aiFeedback`, when present and not null,
/// must be a string; `suggestions`, when present and not null, must be an
/// array of strings. The score is coerced with [`coerce_score`].
pub(crate) fn parse_grading_payload(body: Option<&Value>) -> Result<GradingResult, String> {
    let Some(Value::Object(fields)) = body else {
        return Err("body is not a JSON object".to_string());
    };

    let narrative_feedback = match fields.get("aiFeedback") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => return Err(format!("aiFeedback is not a string: {other}")),
    };

    let suggestions = match fields.get("suggestions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => Ok(text.clone()),
                other => Err(format!("suggestion is not a string: {other}")),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => return Err(format!("suggestions is not an array: {other}")),
    };

    Ok(GradingResult {
        score: coerce_score(fields.get("score")),
        narrative_feedback,
        suggestions,
    })
}
