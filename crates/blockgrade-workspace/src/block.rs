//! Block graph model.
//!
//! These types mirror the visual widget's JSON serialization so a block
//! program saved by the widget can be loaded as-is, and a headless workspace
//! can hand the same shape back to it.
//!
//! ```json
//! {
//!   "blocks": {
//!     "languageVersion": 0,
//!     "blocks": [
//!       {"type": "text_print", "id": "p1",
//!        "inputs": {"TEXT": {"block": {"type": "text", "id": "t1", "fields": {"TEXT": "hi"}}}}}
//!     ]
//!   },
//!   "variables": []
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn generate_id() -> String {
    format!("blk-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Full serialized state of a workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceState {
    /// Top-level block stacks.
    #[serde(default, skip_serializing_if = "TopBlocks::is_empty")]
    pub blocks: TopBlocks,
    /// Variables declared in the workspace.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableState>,
}

impl WorkspaceState {
    /// Parses a serialized block program.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serializes the state in the widget's JSON form.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Returns `true` if there are no top-level blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Top-level blocks in workspace order.
    #[must_use]
    pub fn top_blocks(&self) -> &[BlockState] {
        &self.blocks.blocks
    }

    /// Counts every non-shadow block in the graph, nested ones included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.blocks.iter().map(BlockState::count).sum()
    }

    /// Resolves a variable id to its display name.
    #[must_use]
    pub fn variable_name(&self, id: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|v| v.id == id)
            .map(|v| v.name.as_str())
    }

    /// Appends a top-level block stack.
    pub fn push(&mut self, block: BlockState) {
        self.blocks.blocks.push(block);
    }

    /// Declares a variable if no variable with the same name exists, returning its id.
    pub fn declare_variable(&mut self, name: impl Into<String>) -> String {
        let name = name.into();
        if let Some(existing) = self.variables.iter().find(|v| v.name == name) {
            return existing.id.clone();
        }
        let variable = VariableState::new(name);
        let id = variable.id.clone();
        self.variables.push(variable);
        id
    }
}

/// The `blocks` section of a workspace state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopBlocks {
    /// Serialization format version.
    #[serde(default)]
    pub language_version: u32,
    /// Top-level block stacks.
    #[serde(default)]
    pub blocks: Vec<BlockState>,
}

impl TopBlocks {
    /// Returns `true` if there are no top-level blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// One block and everything attached below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockState {
    /// Block type identifier, e.g. `text_print`.
    #[serde(rename = "type")]
    pub block_type: String,
    /// Unique block id.
    #[serde(default = "generate_id")]
    pub id: String,
    /// Horizontal position of a top-level block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// Vertical position of a top-level block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// Field values keyed by field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
    /// Value and statement inputs keyed by input name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputState>,
    /// The block connected below this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NextState>,
    /// Mutator state, e.g. `elseIfCount` or procedure parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_state: Option<Value>,
    /// Any other keys the widget writes (`collapsed`, `inline`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BlockState {
    /// Creates a block of the given type with a fresh id.
    #[must_use]
    pub fn new(block_type: impl Into<String>) -> Self {
        Self {
            block_type: block_type.into(),
            id: generate_id(),
            x: None,
            y: None,
            fields: BTreeMap::new(),
            inputs: BTreeMap::new(),
            next: None,
            extra_state: None,
            extra: Map::new(),
        }
    }

    /// Places a top-level block.
    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    /// Sets a field value.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Connects a block to the named input.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, block: Self) -> Self {
        self.inputs.insert(name.into(), InputState::block(block));
        self
    }

    /// Connects a block below this one.
    #[must_use]
    pub fn with_next(mut self, block: Self) -> Self {
        self.next = Some(NextState {
            block: Some(Box::new(block)),
        });
        self
    }

    /// Sets the mutator state.
    #[must_use]
    pub fn with_extra_state(mut self, state: Value) -> Self {
        self.extra_state = Some(state);
        self
    }

    /// Returns a field value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns a field value as a string, if it is one.
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Returns the block plugged into an input, falling back to its shadow.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&Self> {
        self.inputs.get(name).and_then(InputState::effective)
    }

    /// Returns the block connected below this one.
    #[must_use]
    pub fn next_block(&self) -> Option<&Self> {
        self.next.as_ref().and_then(|n| n.block.as_deref())
    }

    /// Returns the disabled flag written by the widget.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.extra.get("disabled").and_then(Value::as_bool) == Some(true)
            || self.extra.get("enabled").and_then(Value::as_bool) == Some(false)
    }

    fn count(&self) -> usize {
        let nested: usize = self
            .inputs
            .values()
            .filter_map(|input| input.block.as_deref())
            .map(Self::count)
            .sum();
        let below = self.next_block().map_or(0, Self::count);
        1 + nested + below
    }
}

/// A value or statement input connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    /// Block plugged into the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Box<BlockState>>,
    /// Shadow block used when nothing is plugged in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Box<BlockState>>,
}

impl InputState {
    /// Creates an input holding a real block.
    #[must_use]
    pub fn block(block: BlockState) -> Self {
        Self {
            block: Some(Box::new(block)),
            shadow: None,
        }
    }

    /// Creates an input holding only a shadow block.
    #[must_use]
    pub fn shadow(block: BlockState) -> Self {
        Self {
            block: None,
            shadow: Some(Box::new(block)),
        }
    }

    /// The block that actually supplies this input.
    #[must_use]
    pub fn effective(&self) -> Option<&BlockState> {
        self.block.as_deref().or(self.shadow.as_deref())
    }
}

/// The `next` connection of a statement block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NextState {
    /// Block connected below.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Box<BlockState>>,
}

/// A declared workspace variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableState {
    /// Display name.
    pub name: String,
    /// Unique id referenced from `VAR` fields.
    pub id: String,
    /// Optional variable type; untyped variables omit it.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub var_type: Option<String>,
}

impl VariableState {
    /// Creates an untyped variable with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: generate_id(),
            var_type: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const PRINT_HI: &str = r#"{
        "blocks": {
            "languageVersion": 0,
            "blocks": [
                {"type": "text_print", "id": "p1", "x": 10, "y": 20,
                 "inputs": {"TEXT": {"shadow": {"type": "text", "id": "s1", "fields": {"TEXT": "abc"}},
                                     "block": {"type": "text", "id": "t1", "fields": {"TEXT": "hi"}}}}}
            ]
        }
    }"#;

    #[test]
    fn parses_widget_serialization() {
        let state = WorkspaceState::from_json(PRINT_HI).unwrap();

        assert_eq!(state.top_blocks().len(), 1);
        let print = &state.top_blocks()[0];
        assert_eq!(print.block_type, "text_print");
        assert_eq!(print.x, Some(10.0));
        assert_eq!(print.input("TEXT").unwrap().field_str("TEXT"), Some("hi"));
    }

    #[test]
    fn input_falls_back_to_shadow() {
        let block = BlockState::new("text_print").with_field("X", 1);
        let mut with_shadow = block.clone();
        with_shadow.inputs.insert(
            "TEXT".to_string(),
            InputState::shadow(BlockState::new("text").with_field("TEXT", "default")),
        );

        assert!(block.input("TEXT").is_none());
        assert_eq!(
            with_shadow.input("TEXT").unwrap().field_str("TEXT"),
            Some("default")
        );
    }

    #[test]
    fn block_count_includes_nested_and_following_blocks() {
        let state = WorkspaceState::from_json(PRINT_HI).unwrap();
        assert_eq!(state.block_count(), 2);

        let mut state = WorkspaceState::default();
        state.push(
            BlockState::new("text_print")
                .with_input("TEXT", BlockState::new("text").with_field("TEXT", "a"))
                .with_next(BlockState::new("text_print")),
        );
        assert_eq!(state.block_count(), 3);
    }

    #[test]
    fn empty_state_serializes_to_empty_object() {
        let json = serde_json::to_value(WorkspaceState::default()).unwrap();
        assert_eq!(json, json!({}));
        assert!(WorkspaceState::from_json("{}").unwrap().is_empty());
    }

    #[test]
    fn unknown_block_keys_are_preserved() {
        let json = r#"{"type": "text", "id": "a", "collapsed": true, "fields": {"TEXT": "x"}}"#;
        let block: BlockState = serde_json::from_str(json).unwrap();

        assert_eq!(block.extra.get("collapsed"), Some(&json!(true)));
        let back = serde_json::to_value(&block).unwrap();
        assert_eq!(back["collapsed"], true);
    }

    #[test]
    fn missing_ids_are_generated() {
        let block: BlockState = serde_json::from_str(r#"{"type": "logic_boolean"}"#).unwrap();
        assert!(block.id.starts_with("blk-"));
    }

    #[test]
    fn declare_variable_reuses_existing_name() {
        let mut state = WorkspaceState::default();
        let first = state.declare_variable("count");
        let second = state.declare_variable("count");

        assert_eq!(first, second);
        assert_eq!(state.variables.len(), 1);
        assert_eq!(state.variable_name(&first), Some("count"));
    }

    #[test]
    fn disabled_blocks_are_detected() {
        let legacy: BlockState =
            serde_json::from_str(r#"{"type": "text", "disabled": true}"#).unwrap();
        let modern: BlockState =
            serde_json::from_str(r#"{"type": "text", "enabled": false}"#).unwrap();
        let plain = BlockState::new("text");

        assert!(legacy.is_disabled());
        assert!(modern.is_disabled());
        assert!(!plain.is_disabled());
    }
}
