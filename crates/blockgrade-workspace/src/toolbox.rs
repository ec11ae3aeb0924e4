//! Toolbox specification for the visual block editor.
//!
//! The toolbox is the static catalog of block categories offered to the user.
//! It serializes to the exact JSON shape the visual widget expects, so it must
//! be handed over unchanged.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static STANDARD: Lazy<ToolboxSpec> = Lazy::new(|| {
    ToolboxSpec::new(vec![
        ToolboxCategory::blocks(
            "Logic",
            "210",
            &[
                "controls_if",
                "logic_compare",
                "logic_operation",
                "logic_negate",
                "logic_boolean",
            ],
        ),
        ToolboxCategory::blocks(
            "Loops",
            "120",
            &[
                "controls_repeat_ext",
                "controls_whileUntil",
                "controls_for",
                "controls_forEach",
            ],
        ),
        ToolboxCategory::blocks(
            "Math",
            "230",
            &[
                "math_number",
                "math_arithmetic",
                "math_single",
                "math_trig",
                "math_constant",
            ],
        ),
        ToolboxCategory::blocks(
            "Text",
            "160",
            &["text", "text_print", "text_join", "text_length"],
        ),
        ToolboxCategory::dynamic("Variables", "330", "VARIABLE"),
        ToolboxCategory::dynamic("Functions", "290", "PROCEDURE"),
    ])
});

/// A hierarchical catalog of block categories.
///
/// Serializes as `{"kind": "categoryToolbox", "contents": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolboxSpec {
    /// Toolbox flavour; only category toolboxes are supported.
    #[serde(default)]
    pub kind: ToolboxKind,
    /// Categories in display order.
    pub contents: Vec<ToolboxCategory>,
}

impl ToolboxSpec {
    /// Creates a toolbox from the given categories.
    #[must_use]
    pub fn new(contents: Vec<ToolboxCategory>) -> Self {
        Self {
            kind: ToolboxKind::CategoryToolbox,
            contents,
        }
    }

    /// Returns the standard toolbox: logic, loops, math, text, variables and functions.
    #[must_use]
    pub fn standard() -> &'static Self {
        &STANDARD
    }

    /// Looks up a category by display name.
    #[must_use]
    pub fn category(&self, name: &str) -> Option<&ToolboxCategory> {
        self.contents.iter().find(|c| c.name == name)
    }

    /// Returns every block type listed explicitly in the toolbox, in order.
    pub fn block_types(&self) -> impl Iterator<Item = &str> {
        self.contents
            .iter()
            .flat_map(|c| match &c.contents {
                CategoryContents::Blocks(items) => items.as_slice(),
                CategoryContents::Dynamic(_) => &[],
            })
            .map(|item| item.block_type.as_str())
    }

    /// Returns `true` if `block_type` is offered by a fixed category.
    #[must_use]
    pub fn offers(&self, block_type: &str) -> bool {
        self.block_types().any(|t| t == block_type)
    }
}

/// Wire tag of a toolbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolboxKind {
    /// A toolbox organised into named categories.
    #[default]
    #[serde(rename = "categoryToolbox")]
    CategoryToolbox,
}

/// One category in the toolbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CategoryWire", into = "CategoryWire")]
pub struct ToolboxCategory {
    /// Display name.
    pub name: String,
    /// Hue used by the widget to colour the category, as a string.
    pub colour: String,
    /// Either a fixed block list or a widget-populated dynamic category.
    pub contents: CategoryContents,
}

impl ToolboxCategory {
    /// Creates a category with a fixed list of block types.
    #[must_use]
    pub fn blocks(name: impl Into<String>, colour: impl Into<String>, types: &[&str]) -> Self {
        Self {
            name: name.into(),
            colour: colour.into(),
            contents: CategoryContents::Blocks(types.iter().map(|t| ToolboxItem::new(*t)).collect()),
        }
    }

    /// Creates a category populated dynamically by the widget (`VARIABLE`, `PROCEDURE`).
    #[must_use]
    pub fn dynamic(
        name: impl Into<String>,
        colour: impl Into<String>,
        custom: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            colour: colour.into(),
            contents: CategoryContents::Dynamic(custom.into()),
        }
    }
}

/// What a category contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryContents {
    /// A fixed list of blocks in display order.
    Blocks(Vec<ToolboxItem>),
    /// A category the widget fills in itself, keyed by its custom name.
    Dynamic(String),
}

/// Wire tag of a category entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum CategoryKind {
    #[serde(rename = "category")]
    Category,
}

#[derive(Serialize, Deserialize)]
struct CategoryWire {
    kind: CategoryKind,
    name: String,
    colour: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contents: Option<Vec<ToolboxItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom: Option<String>,
}

impl TryFrom<CategoryWire> for ToolboxCategory {
    type Error = String;

    fn try_from(wire: CategoryWire) -> Result<Self, Self::Error> {
        let contents = match (wire.contents, wire.custom) {
            (Some(items), None) => CategoryContents::Blocks(items),
            (None, Some(custom)) => CategoryContents::Dynamic(custom),
            (Some(_), Some(_)) => {
                return Err(format!(
                    "category '{}' cannot have both 'contents' and 'custom'",
                    wire.name
                ))
            }
            (None, None) => {
                return Err(format!(
                    "category '{}' needs either 'contents' or 'custom'",
                    wire.name
                ))
            }
        };
        Ok(Self {
            name: wire.name,
            colour: wire.colour,
            contents,
        })
    }
}

impl From<ToolboxCategory> for CategoryWire {
    fn from(category: ToolboxCategory) -> Self {
        let (contents, custom) = match category.contents {
            CategoryContents::Blocks(items) => (Some(items), None),
            CategoryContents::Dynamic(custom) => (None, Some(custom)),
        };
        Self {
            kind: CategoryKind::Category,
            name: category.name,
            colour: category.colour,
            contents,
            custom,
        }
    }
}

/// Wire tag of a block entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    /// A single block.
    #[default]
    #[serde(rename = "block")]
    Block,
}

/// A single block entry in a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolboxItem {
    /// Entry flavour; always a block.
    #[serde(default)]
    pub kind: ItemKind,
    /// Block type identifier understood by the widget.
    #[serde(rename = "type")]
    pub block_type: String,
}

impl ToolboxItem {
    /// Creates a block entry.
    #[must_use]
    pub fn new(block_type: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Block,
            block_type: block_type.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn standard_toolbox_has_six_categories_in_order() {
        let names: Vec<_> = ToolboxSpec::standard()
            .contents
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["Logic", "Loops", "Math", "Text", "Variables", "Functions"]
        );
    }

    #[test]
    fn standard_toolbox_offers_text_print() {
        let toolbox = ToolboxSpec::standard();
        assert!(toolbox.offers("text_print"));
        assert!(toolbox.offers("controls_whileUntil"));
        assert!(!toolbox.offers("variables_get"));
    }

    #[test]
    fn standard_toolbox_serializes_to_widget_shape() {
        let json = serde_json::to_value(ToolboxSpec::standard()).unwrap();

        assert_eq!(json["kind"], "categoryToolbox");
        assert_eq!(json["contents"][0]["kind"], "category");
        assert_eq!(json["contents"][0]["name"], "Logic");
        assert_eq!(json["contents"][0]["colour"], "210");
        assert_eq!(json["contents"][0]["contents"][0]["kind"], "block");
        assert_eq!(json["contents"][0]["contents"][0]["type"], "controls_if");
        assert_eq!(json["contents"][4]["custom"], "VARIABLE");
        assert!(json["contents"][4].get("contents").is_none());
        assert_eq!(json["contents"][5]["custom"], "PROCEDURE");
    }

    #[test]
    fn toolbox_deserializes_from_widget_shape() {
        let json = r#"{
            "kind": "categoryToolbox",
            "contents": [
                {"kind": "category", "name": "Text", "colour": "160",
                 "contents": [{"kind": "block", "type": "text_print"}]},
                {"kind": "category", "name": "Variables", "colour": "330", "custom": "VARIABLE"}
            ]
        }"#;
        let toolbox: ToolboxSpec = serde_json::from_str(json).unwrap();

        assert_eq!(toolbox.contents.len(), 2);
        assert!(toolbox.offers("text_print"));
        assert_eq!(
            toolbox.category("Variables").unwrap().contents,
            CategoryContents::Dynamic("VARIABLE".to_string())
        );
    }

    #[test]
    fn category_with_neither_contents_nor_custom_is_rejected() {
        let json = r#"{"kind": "categoryToolbox", "contents": [
            {"kind": "category", "name": "Empty", "colour": "0"}
        ]}"#;
        let result: Result<ToolboxSpec, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn block_types_lists_fixed_blocks_only() {
        let count = ToolboxSpec::standard().block_types().count();
        assert_eq!(count, 18);
    }
}
