//! Mapping from user-facing names to safe, distinct identifiers.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

/// Identifiers that must never be produced for user names.
static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // keywords
        "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
        "do", "else", "export", "extends", "finally", "for", "function", "if", "import", "in",
        "instanceof", "new", "return", "super", "switch", "this", "throw", "try", "typeof", "var",
        "void", "while", "with", "yield", "enum", "implements", "interface", "let", "package",
        "private", "protected", "public", "static", "await", "null", "true", "false",
        // globals
        "arguments", "Array", "Boolean", "Date", "Error", "eval", "Function", "Infinity", "JSON",
        "Math", "NaN", "Number", "Object", "RegExp", "String", "undefined", "window", "alert",
        "document", "console", "parseInt", "parseFloat", "isNaN", "isFinite",
    ]
    .into_iter()
    .collect()
});

static NON_WORD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").ok());

/// Characters `encodeURI` leaves alone.
const URI_SAFE: &str = ";,/?:@&=+$-_.!~*'()#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum NameKind {
    Variable,
    Procedure,
}

/// Per-run name table.
///
/// The same user name (compared case-insensitively) always maps to the same
/// identifier within a kind, and no two entries ever share an identifier.
#[derive(Debug, Default)]
pub(crate) struct NameDb {
    assigned: HashMap<(NameKind, String), String>,
    taken: HashSet<String>,
}

impl NameDb {
    pub(crate) fn get(&mut self, name: &str, kind: NameKind) -> String {
        let key = (kind, name.to_lowercase());
        if let Some(existing) = self.assigned.get(&key) {
            return existing.clone();
        }
        let identifier = self.distinct(name);
        self.assigned.insert(key, identifier.clone());
        identifier
    }

    /// Returns a fresh identifier based on `name` that collides with nothing.
    pub(crate) fn distinct(&mut self, name: &str) -> String {
        let base = safe_name(name);
        let mut candidate = base.clone();
        let mut suffix = 1;
        while self.taken.contains(&candidate) || RESERVED.contains(candidate.as_str()) {
            suffix += 1;
            candidate = format!("{base}{suffix}");
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// Turns an arbitrary name into a valid identifier.
pub(crate) fn safe_name(name: &str) -> String {
    if name.is_empty() {
        return "unnamed".to_string();
    }

    let mut encoded = String::with_capacity(name.len());
    for c in name.chars() {
        if c == ' ' {
            encoded.push('_');
        } else if c.is_ascii_alphanumeric() || URI_SAFE.contains(c) {
            encoded.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
    }

    let non_word: &Option<Regex> = &NON_WORD;
    let mut safe = match non_word {
        Some(re) => re.replace_all(&encoded, "_").into_owned(),
        None => encoded
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect(),
    };

    if safe.starts_with(|c: char| c.is_ascii_digit()) {
        safe.insert_str(0, "my_");
    }
    safe
}
