//! JavaScript generator for the standard block set.
//!
//! Output follows the visual toolkit's own JavaScript generator so that code
//! generated here reads the same as code generated in the browser: two-space
//! indentation, single-quoted strings, minimal parentheses, workspace
//! variables hoisted into one `var` statement and function definitions
//! emitted ahead of the main program.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::names::{NameDb, NameKind};
use super::{CodeGenerator, GeneratorError};
use crate::block::{BlockState, WorkspaceState};

const INDENT: &str = "  ";

static NUMBER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\s*-?\d+(\.\d+)?\s*$").ok());
static WORD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").ok());
static QUOTED: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\s*'([^']|\\')*'\s*$").ok());
static LEADING_BLANK: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\s+\n").ok());
static TRAILING_BLANK: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\n\s+$").ok());
static TRAILING_SPACE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[ \t]+\n").ok());

fn matches(pattern: &Lazy<Option<Regex>>, text: &str) -> bool {
    let pattern: &Option<Regex> = pattern;
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

fn replace(pattern: &Lazy<Option<Regex>>, text: &str, with: &str) -> String {
    let pattern: &Option<Regex> = pattern;
    match pattern.as_ref() {
        Some(re) => re.replace_all(text, with).into_owned(),
        None => text.to_string(),
    }
}

/// Operator precedence, scaled by ten so sub-levels stay integral.
///
/// Lower binds tighter. An inner expression is wrapped when its order is
/// not strictly lower than the order its context asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Order(u16);

impl Order {
    const ATOMIC: Self = Self(0);
    const MEMBER: Self = Self(12);
    const FUNCTION_CALL: Self = Self(20);
    const UNARY_NEGATION: Self = Self(43);
    const LOGICAL_NOT: Self = Self(44);
    const MULTIPLICATION: Self = Self(51);
    const DIVISION: Self = Self(52);
    const MODULUS: Self = Self(53);
    const SUBTRACTION: Self = Self(61);
    const ADDITION: Self = Self(62);
    const RELATIONAL: Self = Self(80);
    const EQUALITY: Self = Self(90);
    const LOGICAL_AND: Self = Self(130);
    const LOGICAL_OR: Self = Self(140);
    const CONDITIONAL: Self = Self(150);
    const ASSIGNMENT: Self = Self(160);
    const COMMA: Self = Self(180);
    const NONE: Self = Self(990);

    /// Pairs (outer, inner) that are associative and never need parentheses.
    const OVERRIDES: [(Self, Self); 9] = [
        (Self::FUNCTION_CALL, Self::MEMBER),
        (Self::FUNCTION_CALL, Self::FUNCTION_CALL),
        (Self::MEMBER, Self::MEMBER),
        (Self::MEMBER, Self::FUNCTION_CALL),
        (Self::LOGICAL_NOT, Self::LOGICAL_NOT),
        (Self::MULTIPLICATION, Self::MULTIPLICATION),
        (Self::ADDITION, Self::ADDITION),
        (Self::LOGICAL_AND, Self::LOGICAL_AND),
        (Self::LOGICAL_OR, Self::LOGICAL_OR),
    ];

    fn needs_parens(outer: Self, inner: Self) -> bool {
        if outer.0 > inner.0 {
            return false;
        }
        if outer == inner && (outer == Self::ATOMIC || outer == Self::NONE) {
            return false;
        }
        !Self::OVERRIDES.contains(&(outer, inner))
    }
}

/// What a block generates.
enum Code {
    /// Statement text, newline-terminated.
    Statement(String),
    /// An expression and the precedence of its outermost operator.
    Value(String, Order),
    /// Nothing inline; the block registered a hoisted definition.
    Definition,
}

/// Generates JavaScript from the standard toolbox blocks.
///
/// ```
/// use blockgrade_workspace::{BlockState, CodeGenerator, JavaScriptGenerator, WorkspaceState};
///
/// let mut state = WorkspaceState::default();
/// state.push(
///     BlockState::new("text_print")
///         .with_input("TEXT", BlockState::new("text").with_field("TEXT", "hi")),
/// );
///
/// let code = JavaScriptGenerator::new().workspace_to_code(&state).unwrap();
/// assert_eq!(code, "window.alert('hi');\n");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaScriptGenerator;

impl JavaScriptGenerator {
    /// Creates the generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CodeGenerator for JavaScriptGenerator {
    fn language_tag(&self) -> &'static str {
        "javascript"
    }

    fn workspace_to_code(&self, state: &WorkspaceState) -> Result<String, GeneratorError> {
        Run::new(state).generate()
    }
}

/// State for one `workspace_to_code` call.
struct Run<'a> {
    state: &'a WorkspaceState,
    names: NameDb,
    definitions: Vec<(String, String)>,
}

impl<'a> Run<'a> {
    fn new(state: &'a WorkspaceState) -> Self {
        Self {
            state,
            names: NameDb::default(),
            definitions: Vec::new(),
        }
    }

    fn generate(mut self) -> Result<String, GeneratorError> {
        self.declare_variables()?;

        let state = self.state;
        let mut top: Vec<&BlockState> = state.top_blocks().iter().collect();
        let tilt = 3.0_f64.to_radians().sin();
        top.sort_by(|a, b| {
            let key = |block: &BlockState| {
                block.y.unwrap_or_default() + tilt * block.x.unwrap_or_default()
            };
            key(a).total_cmp(&key(b))
        });

        let mut chunks = Vec::new();
        for block in top {
            let line = match self.block(block)? {
                Code::Statement(code) => code,
                Code::Value(code, _) => format!("{code};\n"),
                Code::Definition => String::new(),
            };
            if !line.is_empty() {
                chunks.push(line);
            }
        }

        let definitions: Vec<&str> = self.definitions.iter().map(|(_, c)| c.as_str()).collect();
        let code = format!("{}\n\n\n{}", definitions.join("\n\n"), chunks.join("\n"));

        let code = replace(&LEADING_BLANK, &code, "");
        let code = replace(&TRAILING_BLANK, &code, "\n");
        Ok(replace(&TRAILING_SPACE, &code, "\n"))
    }

    /// Registers every name up front and hoists the variables blocks use.
    fn declare_variables(&mut self) -> Result<(), GeneratorError> {
        let state = self.state;
        for variable in &state.variables {
            self.names.get(&variable.name, NameKind::Variable);
        }
        for block in state.top_blocks() {
            if block.block_type.starts_with("procedures_def") {
                if let Some(name) = block.field_str("NAME") {
                    self.names.get(name, NameKind::Procedure);
                }
            }
        }

        let mut used = Vec::new();
        let mut seen = HashSet::new();
        for block in state.top_blocks() {
            self.collect_variables(block, &mut used, &mut seen)?;
        }
        if !used.is_empty() {
            self.define("variables", format!("var {};", used.join(", ")));
        }
        Ok(())
    }

    fn collect_variables(
        &mut self,
        block: &BlockState,
        used: &mut Vec<String>,
        seen: &mut HashSet<String>,
    ) -> Result<(), GeneratorError> {
        let mut names = Vec::new();
        if block.field("VAR").is_some() {
            names.push(self.variable_name(block, "VAR")?);
        }
        if block.block_type.starts_with("procedures_def") {
            names.extend(self.parameter_names(block));
        }
        for name in names {
            let identifier = self.names.get(&name, NameKind::Variable);
            if seen.insert(identifier.clone()) {
                used.push(identifier);
            }
        }

        for input in block.inputs.values() {
            if let Some(child) = input.effective() {
                self.collect_variables(child, used, seen)?;
            }
        }
        if let Some(next) = block.next_block() {
            self.collect_variables(next, used, seen)?;
        }
        Ok(())
    }

    fn define(&mut self, key: &str, code: String) {
        match self.definitions.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = code,
            None => self.definitions.push((key.to_string(), code)),
        }
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    fn block(&mut self, block: &BlockState) -> Result<Code, GeneratorError> {
        if block.is_disabled() {
            return Ok(Code::Statement(self.next(block)?));
        }

        let code = match block.block_type.as_str() {
            "controls_if" => self.controls_if(block)?,
            "controls_repeat_ext" | "controls_repeat" => self.controls_repeat(block)?,
            "controls_whileUntil" => self.controls_while_until(block)?,
            "controls_for" => self.controls_for(block)?,
            "controls_forEach" => self.controls_for_each(block)?,
            "controls_flow_statements" => Self::controls_flow(block)?,
            "logic_compare" => self.logic_compare(block)?,
            "logic_operation" => self.logic_operation(block)?,
            "logic_negate" => {
                let value = self.value_or(block, "BOOL", Order::LOGICAL_NOT, "true")?;
                Code::Value(format!("!{value}"), Order::LOGICAL_NOT)
            }
            "logic_boolean" => {
                let value = if block.field_str("BOOL") == Some("TRUE") {
                    "true"
                } else {
                    "false"
                };
                Code::Value(value.to_string(), Order::ATOMIC)
            }
            "logic_null" => Code::Value("null".to_string(), Order::ATOMIC),
            "logic_ternary" => {
                let condition = self.value_or(block, "IF", Order::CONDITIONAL, "false")?;
                let then = self.value_or(block, "THEN", Order::CONDITIONAL, "null")?;
                let otherwise = self.value_or(block, "ELSE", Order::CONDITIONAL, "null")?;
                Code::Value(
                    format!("{condition} ? {then} : {otherwise}"),
                    Order::CONDITIONAL,
                )
            }
            "math_number" => Self::math_number(block),
            "math_arithmetic" => self.math_arithmetic(block)?,
            "math_single" | "math_trig" | "math_round" => self.math_single(block)?,
            "math_constant" => Self::math_constant(block)?,
            "math_modulo" => {
                let dividend = self.value_or(block, "DIVIDEND", Order::MODULUS, "0")?;
                let divisor = self.value_or(block, "DIVISOR", Order::MODULUS, "0")?;
                Code::Value(format!("{dividend} % {divisor}"), Order::MODULUS)
            }
            "math_change" => {
                let name = self.variable(block)?;
                let delta = self.value_or(block, "DELTA", Order::ADDITION, "0")?;
                Code::Statement(format!(
                    "{name} = (typeof {name} === 'number' ? {name} : 0) + {delta};\n"
                ))
            }
            "text" => Code::Value(
                quote(block.field_str("TEXT").unwrap_or_default()),
                Order::ATOMIC,
            ),
            "text_print" => {
                let message = self.value_or(block, "TEXT", Order::NONE, "''")?;
                Code::Statement(format!("window.alert({message});\n"))
            }
            "text_join" => self.text_join(block)?,
            "text_length" => {
                let text = self.value_or(block, "VALUE", Order::MEMBER, "''")?;
                Code::Value(format!("{text}.length"), Order::MEMBER)
            }
            "variables_get" => Code::Value(self.variable(block)?, Order::ATOMIC),
            "variables_set" => {
                let name = self.variable(block)?;
                let value = self.value_or(block, "VALUE", Order::ASSIGNMENT, "0")?;
                Code::Statement(format!("{name} = {value};\n"))
            }
            "lists_create_empty" => Code::Value("[]".to_string(), Order::ATOMIC),
            "lists_create_with" => {
                let count = item_count(block, "ADD", 3);
                let mut items = Vec::with_capacity(count);
                for i in 0..count {
                    items.push(self.value_or(block, &format!("ADD{i}"), Order::COMMA, "null")?);
                }
                Code::Value(format!("[{}]", items.join(", ")), Order::ATOMIC)
            }
            "procedures_defnoreturn" | "procedures_defreturn" => {
                self.procedure_definition(block)?;
                Code::Definition
            }
            "procedures_callreturn" => {
                let (call, order) = self.procedure_call(block)?;
                Code::Value(call, order)
            }
            "procedures_callnoreturn" => {
                let (call, _) = self.procedure_call(block)?;
                Code::Statement(format!("{call};\n"))
            }
            "procedures_ifreturn" => self.procedure_if_return(block)?,
            other => {
                return Err(GeneratorError::UnsupportedBlock {
                    block_type: other.to_string(),
                    id: block.id.clone(),
                })
            }
        };

        Ok(match code {
            Code::Statement(code) => {
                Code::Statement(format!("{}{code}{}", comment(block), self.next(block)?))
            }
            other => other,
        })
    }

    fn next(&mut self, block: &BlockState) -> Result<String, GeneratorError> {
        match block.next_block() {
            Some(next) => match self.block(next)? {
                Code::Statement(code) => Ok(code),
                Code::Definition => Ok(String::new()),
                Code::Value(..) => Err(malformed(next, "a value block cannot follow a statement")),
            },
            None => Ok(String::new()),
        }
    }

    /// Generates the expression plugged into `input`, parenthesized for a
    /// context of precedence `outer`. Empty if nothing is plugged in.
    fn value(&mut self, block: &BlockState, input: &str, outer: Order) -> Result<String, GeneratorError> {
        let Some(target) = block.input(input) else {
            return Ok(String::new());
        };
        match self.block(target)? {
            Code::Value(code, inner) => {
                if code.is_empty() || !Order::needs_parens(outer, inner) {
                    Ok(code)
                } else {
                    Ok(format!("({code})"))
                }
            }
            Code::Statement(code) if code.is_empty() => Ok(code),
            _ => Err(malformed(
                block,
                &format!("input '{input}' expects a value block, found '{}'", target.block_type),
            )),
        }
    }

    fn value_or(
        &mut self,
        block: &BlockState,
        input: &str,
        outer: Order,
        fallback: &str,
    ) -> Result<String, GeneratorError> {
        let code = self.value(block, input, outer)?;
        Ok(if code.is_empty() {
            fallback.to_string()
        } else {
            code
        })
    }

    /// Generates the indented statement stack plugged into `input`.
    fn statements(&mut self, block: &BlockState, input: &str) -> Result<String, GeneratorError> {
        let Some(target) = block.input(input) else {
            return Ok(String::new());
        };
        match self.block(target)? {
            Code::Statement(code) if code.is_empty() => Ok(code),
            Code::Statement(code) => Ok(prefix_lines(&code, INDENT)),
            Code::Definition => Ok(String::new()),
            Code::Value(..) => Err(malformed(
                block,
                &format!("input '{input}' expects statements, found '{}'", target.block_type),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    fn variable_name(&self, block: &BlockState, field: &str) -> Result<String, GeneratorError> {
        let value = block
            .field(field)
            .ok_or_else(|| missing(block, field))?;
        let name = match value {
            Value::String(name) => Some(name.clone()),
            Value::Object(reference) => reference
                .get("id")
                .and_then(Value::as_str)
                .and_then(|id| self.state.variable_name(id))
                .or_else(|| reference.get("name").and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        };
        name.ok_or_else(|| malformed(block, &format!("field '{field}' does not name a variable")))
    }

    fn variable(&mut self, block: &BlockState) -> Result<String, GeneratorError> {
        let name = self.variable_name(block, "VAR")?;
        Ok(self.names.get(&name, NameKind::Variable))
    }

    fn parameter_names(&self, block: &BlockState) -> Vec<String> {
        let Some(params) = block
            .extra_state
            .as_ref()
            .and_then(|s| s.get("params"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };
        params
            .iter()
            .filter_map(|param| match param {
                Value::String(name) => Some(name.clone()),
                Value::Object(param) => param
                    .get("id")
                    .and_then(Value::as_str)
                    .and_then(|id| self.state.variable_name(id))
                    .or_else(|| param.get("name").and_then(Value::as_str))
                    .map(str::to_string),
                _ => None,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Control flow
    // ------------------------------------------------------------------

    fn controls_if(&mut self, block: &BlockState) -> Result<Code, GeneratorError> {
        let else_ifs = extra_usize(block, "elseIfCount").unwrap_or(0);
        let has_else = extra_bool(block, "hasElse").unwrap_or(false) || block.inputs.contains_key("ELSE");

        let mut code = String::new();
        let mut n = 0;
        loop {
            let condition = self.value_or(block, &format!("IF{n}"), Order::NONE, "false")?;
            let branch = self.statements(block, &format!("DO{n}"))?;
            if n > 0 {
                code.push_str(" else ");
            }
            code.push_str(&format!("if ({condition}) {{\n{branch}}}"));
            n += 1;
            let more = n <= else_ifs
                || block.inputs.contains_key(&format!("IF{n}"))
                || block.inputs.contains_key(&format!("DO{n}"));
            if !more {
                break;
            }
        }
        if has_else {
            let branch = self.statements(block, "ELSE")?;
            code.push_str(&format!(" else {{\n{branch}}}"));
        }
        code.push('\n');
        Ok(Code::Statement(code))
    }

    fn controls_repeat(&mut self, block: &BlockState) -> Result<Code, GeneratorError> {
        let repeats = if block.block_type == "controls_repeat" {
            js_number(field_number(block, "TIMES"))
        } else {
            self.value_or(block, "TIMES", Order::ASSIGNMENT, "0")?
        };
        let branch = self.statements(block, "DO")?;

        let mut code = String::new();
        let counter = self.names.distinct("count");
        let mut end = repeats.clone();
        if !matches(&WORD, &repeats) && !matches(&NUMBER, &repeats) {
            end = self.names.distinct("repeat_end");
            code.push_str(&format!("var {end} = {repeats};\n"));
        }
        code.push_str(&format!(
            "for (var {counter} = 0; {counter} < {end}; {counter}++) {{\n{branch}}}\n"
        ));
        Ok(Code::Statement(code))
    }

    fn controls_while_until(&mut self, block: &BlockState) -> Result<Code, GeneratorError> {
        let until = block.field_str("MODE") == Some("UNTIL");
        let outer = if until { Order::LOGICAL_NOT } else { Order::NONE };
        let mut condition = self.value_or(block, "BOOL", outer, "false")?;
        let branch = self.statements(block, "DO")?;
        if until {
            condition = format!("!{condition}");
        }
        Ok(Code::Statement(format!("while ({condition}) {{\n{branch}}}\n")))
    }

    fn controls_for(&mut self, block: &BlockState) -> Result<Code, GeneratorError> {
        let variable = self.variable(block)?;
        let from = self.value_or(block, "FROM", Order::ASSIGNMENT, "0")?;
        let to = self.value_or(block, "TO", Order::ASSIGNMENT, "0")?;
        let by = self.value_or(block, "BY", Order::ASSIGNMENT, "1")?;
        let branch = self.statements(block, "DO")?;

        if let (Some(start), Some(end), Some(step)) = (
            parse_literal(&from),
            parse_literal(&to),
            parse_literal(&by),
        ) {
            let up = start <= end;
            let step = step.abs();
            let compare = if up { "<=" } else { ">=" };
            let advance = if (step - 1.0).abs() < f64::EPSILON {
                if up { "++".to_string() } else { "--".to_string() }
            } else {
                format!("{} {}", if up { " +=" } else { " -=" }, js_number(step))
            };
            return Ok(Code::Statement(format!(
                "for ({variable} = {from}; {variable} {compare} {to}; {variable}{advance}) {{\n{branch}}}\n"
            )));
        }

        let mut code = String::new();
        let mut start = from.clone();
        if !matches(&WORD, &from) && !matches(&NUMBER, &from) {
            start = self.names.distinct(&format!("{variable}_start"));
            code.push_str(&format!("var {start} = {from};\n"));
        }
        let mut end = to.clone();
        if !matches(&WORD, &to) && !matches(&NUMBER, &to) {
            end = self.names.distinct(&format!("{variable}_end"));
            code.push_str(&format!("var {end} = {to};\n"));
        }
        let increment = self.names.distinct(&format!("{variable}_inc"));
        match parse_literal(&by) {
            Some(step) => code.push_str(&format!("var {increment} = {};\n", js_number(step.abs()))),
            None => code.push_str(&format!("var {increment} = Math.abs({by});\n")),
        }
        code.push_str(&format!("if ({start} > {end}) {{\n"));
        code.push_str(&format!("{INDENT}{increment} = -{increment};\n"));
        code.push_str("}\n");
        code.push_str(&format!(
            "for ({variable} = {start}; {increment} >= 0 ? {variable} <= {end} : {variable} >= {end}; {variable} += {increment}) {{\n{branch}}}\n"
        ));
        Ok(Code::Statement(code))
    }

    fn controls_for_each(&mut self, block: &BlockState) -> Result<Code, GeneratorError> {
        let variable = self.variable(block)?;
        let list = self.value_or(block, "LIST", Order::ASSIGNMENT, "[]")?;
        let branch = self.statements(block, "DO")?;

        let mut code = String::new();
        let mut list_var = list.clone();
        if !matches(&WORD, &list) {
            list_var = self.names.distinct(&format!("{variable}_list"));
            code.push_str(&format!("var {list_var} = {list};\n"));
        }
        let index = self.names.distinct(&format!("{variable}_index"));
        let branch = format!("{INDENT}{variable} = {list_var}[{index}];\n{branch}");
        code.push_str(&format!("for (var {index} in {list_var}) {{\n{branch}}}\n"));
        Ok(Code::Statement(code))
    }

    fn controls_flow(block: &BlockState) -> Result<Code, GeneratorError> {
        match block.field_str("FLOW") {
            Some("BREAK") => Ok(Code::Statement("break;\n".to_string())),
            Some("CONTINUE") => Ok(Code::Statement("continue;\n".to_string())),
            Some(other) => Err(malformed(block, &format!("unknown flow statement '{other}'"))),
            None => Err(missing(block, "FLOW")),
        }
    }

    // ------------------------------------------------------------------
    // Logic
    // ------------------------------------------------------------------

    fn logic_compare(&mut self, block: &BlockState) -> Result<Code, GeneratorError> {
        let operator = match block.field_str("OP").ok_or_else(|| missing(block, "OP"))? {
            "EQ" => "==",
            "NEQ" => "!=",
            "LT" => "<",
            "LTE" => "<=",
            "GT" => ">",
            "GTE" => ">=",
            other => return Err(malformed(block, &format!("unknown operator '{other}'"))),
        };
        let order = if matches!(operator, "==" | "!=") {
            Order::EQUALITY
        } else {
            Order::RELATIONAL
        };
        let a = self.value_or(block, "A", order, "0")?;
        let b = self.value_or(block, "B", order, "0")?;
        Ok(Code::Value(format!("{a} {operator} {b}"), order))
    }

    fn logic_operation(&mut self, block: &BlockState) -> Result<Code, GeneratorError> {
        let (operator, order) = match block.field_str("OP").ok_or_else(|| missing(block, "OP"))? {
            "AND" => ("&&", Order::LOGICAL_AND),
            "OR" => ("||", Order::LOGICAL_OR),
            other => return Err(malformed(block, &format!("unknown operator '{other}'"))),
        };
        let mut a = self.value(block, "A", order)?;
        let mut b = self.value(block, "B", order)?;
        if a.is_empty() && b.is_empty() {
            a = "false".to_string();
            b = "false".to_string();
        } else {
            let fallback = if operator == "&&" { "true" } else { "false" };
            if a.is_empty() {
                a = fallback.to_string();
            }
            if b.is_empty() {
                b = fallback.to_string();
            }
        }
        Ok(Code::Value(format!("{a} {operator} {b}"), order))
    }

    // ------------------------------------------------------------------
    // Math
    // ------------------------------------------------------------------

    fn math_number(block: &BlockState) -> Code {
        let number = field_number(block, "NUM");
        let order = if number >= 0.0 {
            Order::ATOMIC
        } else {
            Order::UNARY_NEGATION
        };
        Code::Value(js_number(number), order)
    }

    fn math_arithmetic(&mut self, block: &BlockState) -> Result<Code, GeneratorError> {
        let (operator, order) = match block.field_str("OP").ok_or_else(|| missing(block, "OP"))? {
            "ADD" => (" + ", Order::ADDITION),
            "MINUS" => (" - ", Order::SUBTRACTION),
            "MULTIPLY" => (" * ", Order::MULTIPLICATION),
            "DIVIDE" => (" / ", Order::DIVISION),
            "POWER" => {
                let base = self.value_or(block, "A", Order::COMMA, "0")?;
                let exponent = self.value_or(block, "B", Order::COMMA, "0")?;
                return Ok(Code::Value(
                    format!("Math.pow({base}, {exponent})"),
                    Order::FUNCTION_CALL,
                ));
            }
            other => return Err(malformed(block, &format!("unknown operator '{other}'"))),
        };
        let a = self.value_or(block, "A", order, "0")?;
        let b = self.value_or(block, "B", order, "0")?;
        Ok(Code::Value(format!("{a}{operator}{b}"), order))
    }

    fn math_single(&mut self, block: &BlockState) -> Result<Code, GeneratorError> {
        let operator = block.field_str("OP").ok_or_else(|| missing(block, "OP"))?;

        if operator == "NEG" {
            let mut arg = self.value_or(block, "NUM", Order::UNARY_NEGATION, "0")?;
            if arg.starts_with('-') {
                arg.insert(0, ' ');
            }
            return Ok(Code::Value(format!("-{arg}"), Order::UNARY_NEGATION));
        }

        let outer = if matches!(operator, "SIN" | "COS" | "TAN") {
            Order::DIVISION
        } else {
            Order::NONE
        };
        let arg = self.value_or(block, "NUM", outer, "0")?;

        let call = match operator {
            "ABS" => format!("Math.abs({arg})"),
            "ROOT" => format!("Math.sqrt({arg})"),
            "LN" => format!("Math.log({arg})"),
            "EXP" => format!("Math.exp({arg})"),
            "POW10" => format!("Math.pow(10,{arg})"),
            "ROUND" => format!("Math.round({arg})"),
            "ROUNDUP" => format!("Math.ceil({arg})"),
            "ROUNDDOWN" => format!("Math.floor({arg})"),
            "SIN" => format!("Math.sin({arg} / 180 * Math.PI)"),
            "COS" => format!("Math.cos({arg} / 180 * Math.PI)"),
            "TAN" => format!("Math.tan({arg} / 180 * Math.PI)"),
            "LOG10" => return Ok(Code::Value(format!("Math.log({arg}) / Math.log(10)"), Order::DIVISION)),
            "ASIN" => return Ok(Code::Value(format!("Math.asin({arg}) / Math.PI * 180"), Order::DIVISION)),
            "ACOS" => return Ok(Code::Value(format!("Math.acos({arg}) / Math.PI * 180"), Order::DIVISION)),
            "ATAN" => return Ok(Code::Value(format!("Math.atan({arg}) / Math.PI * 180"), Order::DIVISION)),
            other => return Err(malformed(block, &format!("unknown operator '{other}'"))),
        };
        Ok(Code::Value(call, Order::FUNCTION_CALL))
    }

    fn math_constant(block: &BlockState) -> Result<Code, GeneratorError> {
        let (code, order) = match block
            .field_str("CONSTANT")
            .ok_or_else(|| missing(block, "CONSTANT"))?
        {
            "PI" => ("Math.PI", Order::MEMBER),
            "E" => ("Math.E", Order::MEMBER),
            "GOLDEN_RATIO" => ("(1 + Math.sqrt(5)) / 2", Order::DIVISION),
            "SQRT2" => ("Math.SQRT2", Order::MEMBER),
            "SQRT1_2" => ("Math.SQRT1_2", Order::MEMBER),
            "INFINITY" => ("Infinity", Order::ATOMIC),
            other => return Err(malformed(block, &format!("unknown constant '{other}'"))),
        };
        Ok(Code::Value(code.to_string(), order))
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    fn text_join(&mut self, block: &BlockState) -> Result<Code, GeneratorError> {
        let count = item_count(block, "ADD", 2);
        match count {
            0 => Ok(Code::Value("''".to_string(), Order::ATOMIC)),
            1 => {
                let element = self.value_or(block, "ADD0", Order::NONE, "''")?;
                let (code, order) = force_string(element);
                Ok(Code::Value(code, order))
            }
            2 => {
                let first = self.value_or(block, "ADD0", Order::NONE, "''")?;
                let second = self.value_or(block, "ADD1", Order::NONE, "''")?;
                let code = format!("{} + {}", force_string(first).0, force_string(second).0);
                Ok(Code::Value(code, Order::ADDITION))
            }
            _ => {
                let mut elements = Vec::with_capacity(count);
                for i in 0..count {
                    elements.push(self.value_or(block, &format!("ADD{i}"), Order::NONE, "''")?);
                }
                Ok(Code::Value(
                    format!("[{}].join('')", elements.join(",")),
                    Order::FUNCTION_CALL,
                ))
            }
        }
    }

    // ------------------------------------------------------------------
    // Procedures
    // ------------------------------------------------------------------

    fn procedure_definition(&mut self, block: &BlockState) -> Result<(), GeneratorError> {
        let raw_name = block.field_str("NAME").ok_or_else(|| missing(block, "NAME"))?;
        let name = self.names.get(raw_name, NameKind::Procedure);
        let branch = self.statements(block, "STACK")?;
        let mut returns = self.value(block, "RETURN", Order::NONE)?;
        if !returns.is_empty() {
            returns = format!("{INDENT}return {returns};\n");
        }
        let args: Vec<String> = self
            .parameter_names(block)
            .iter()
            .map(|param| self.names.get(param, NameKind::Variable))
            .collect();
        let code = format!(
            "{}function {name}({}) {{\n{branch}{returns}}}",
            comment(block),
            args.join(", ")
        );
        self.define(&format!("%{name}"), code);
        Ok(())
    }

    fn procedure_call(&mut self, block: &BlockState) -> Result<(String, Order), GeneratorError> {
        let raw_name = block
            .extra_state
            .as_ref()
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .or_else(|| block.field_str("NAME"))
            .ok_or_else(|| missing(block, "NAME"))?
            .to_string();
        let name = self.names.get(&raw_name, NameKind::Procedure);
        let count = self.parameter_names(block).len().max(item_count(block, "ARG", 0));
        let mut args = Vec::with_capacity(count);
        for i in 0..count {
            args.push(self.value_or(block, &format!("ARG{i}"), Order::NONE, "null")?);
        }
        Ok((format!("{name}({})", args.join(", ")), Order::FUNCTION_CALL))
    }

    fn procedure_if_return(&mut self, block: &BlockState) -> Result<Code, GeneratorError> {
        let condition = self.value_or(block, "CONDITION", Order::NONE, "false")?;
        let has_value = extra_bool(block, "hasReturnValue")
            .unwrap_or_else(|| block.inputs.contains_key("VALUE"));
        let mut code = format!("if ({condition}) {{\n");
        if has_value {
            let value = self.value_or(block, "VALUE", Order::NONE, "null")?;
            code.push_str(&format!("{INDENT}return {value};\n"));
        } else {
            code.push_str(&format!("{INDENT}return;\n"));
        }
        code.push_str("}\n");
        Ok(Code::Statement(code))
    }
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn missing(block: &BlockState, field: &str) -> GeneratorError {
    GeneratorError::MissingField {
        block_type: block.block_type.clone(),
        id: block.id.clone(),
        field: field.to_string(),
    }
}

fn malformed(block: &BlockState, reason: &str) -> GeneratorError {
    GeneratorError::MalformedBlock {
        block_type: block.block_type.clone(),
        id: block.id.clone(),
        reason: reason.to_string(),
    }
}

fn extra_usize(block: &BlockState, key: &str) -> Option<usize> {
    block
        .extra_state
        .as_ref()
        .and_then(|s| s.get(key))
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

fn extra_bool(block: &BlockState, key: &str) -> Option<bool> {
    block
        .extra_state
        .as_ref()
        .and_then(|s| s.get(key))
        .and_then(Value::as_bool)
}

/// Number of numbered inputs (`ADD0`, `ADD1`, ...) a variadic block has.
fn item_count(block: &BlockState, prefix: &str, default: usize) -> usize {
    if let Some(count) = extra_usize(block, "itemCount") {
        return count;
    }
    block
        .inputs
        .keys()
        .filter_map(|key| key.strip_prefix(prefix)?.parse::<usize>().ok())
        .map(|i| i + 1)
        .max()
        .unwrap_or(default)
}

fn field_number(block: &BlockState, field: &str) -> f64 {
    match block.field(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) if s.trim().is_empty() => 0.0,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        _ => 0.0,
    }
}

/// Parses generated code that is a plain numeric literal.
fn parse_literal(code: &str) -> Option<f64> {
    if matches(&NUMBER, code) {
        code.trim().parse().ok()
    } else {
        None
    }
}

/// Formats a number the way JavaScript's `String(n)` does for the common range.
fn js_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

/// Quotes a string as a single-quoted JavaScript literal.
fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

/// Wraps a value in `String()` unless it already is a string literal.
fn force_string(code: String) -> (String, Order) {
    if matches(&QUOTED, &code) {
        (code, Order::ATOMIC)
    } else {
        (format!("String({code})"), Order::FUNCTION_CALL)
    }
}

/// Prefixes every line of `code` except after a final trailing newline.
fn prefix_lines(code: &str, prefix: &str) -> String {
    let body = code.strip_suffix('\n');
    let (body, trailing) = body.map_or((code, ""), |b| (b, "\n"));
    let mut out = String::with_capacity(code.len() + prefix.len() * 4);
    for (i, line) in body.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(prefix);
        out.push_str(line);
    }
    out.push_str(trailing);
    out
}

/// Renders a statement block's comment, if it has one, as `//` lines.
fn comment(block: &BlockState) -> String {
    let text = block
        .extra
        .get("icons")
        .and_then(|icons| icons.get("comment"))
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str);
    match text {
        Some(text) if !text.is_empty() => prefix_lines(&format!("{text}\n"), "// "),
        _ => String::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(value: &str) -> BlockState {
        BlockState::new("text").with_field("TEXT", value)
    }

    fn number(value: f64) -> BlockState {
        BlockState::new("math_number").with_field("NUM", value)
    }

    fn print(value: BlockState) -> BlockState {
        BlockState::new("text_print").with_input("TEXT", value)
    }

    fn arithmetic(op: &str, a: BlockState, b: BlockState) -> BlockState {
        BlockState::new("math_arithmetic")
            .with_field("OP", op)
            .with_input("A", a)
            .with_input("B", b)
    }

    fn generate(blocks: Vec<BlockState>) -> String {
        let mut state = WorkspaceState::default();
        for block in blocks {
            state.push(block);
        }
        JavaScriptGenerator::new().workspace_to_code(&state).unwrap()
    }

    #[test]
    fn empty_workspace_generates_nothing() {
        assert_eq!(generate(vec![]), "");
    }

    #[test]
    fn print_uses_window_alert() {
        assert_eq!(generate(vec![print(text("hi"))]), "window.alert('hi');\n");
    }

    #[test]
    fn print_without_input_prints_empty_string() {
        assert_eq!(
            generate(vec![BlockState::new("text_print")]),
            "window.alert('');\n"
        );
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(
            generate(vec![print(text("it's a \\ test"))]),
            "window.alert('it\\'s a \\\\ test');\n"
        );
    }

    #[test]
    fn precedence_adds_only_needed_parentheses() {
        let sum = arithmetic("ADD", number(1.0), number(2.0));
        let product = arithmetic("MULTIPLY", sum, number(3.0));
        assert_eq!(
            generate(vec![print(product)]),
            "window.alert((1 + 2) * 3);\n"
        );

        let product = arithmetic("MULTIPLY", number(2.0), number(3.0));
        let sum = arithmetic("ADD", number(1.0), product);
        assert_eq!(generate(vec![print(sum)]), "window.alert(1 + 2 * 3);\n");
    }

    #[test]
    fn associative_operators_skip_parentheses() {
        let inner = arithmetic("ADD", number(1.0), number(2.0));
        let outer = arithmetic("ADD", inner, number(3.0));
        assert_eq!(generate(vec![print(outer)]), "window.alert(1 + 2 + 3);\n");

        let inner = arithmetic("MINUS", number(1.0), number(2.0));
        let outer = arithmetic("MINUS", number(5.0), inner);
        assert_eq!(
            generate(vec![print(outer)]),
            "window.alert(5 - (1 - 2));\n"
        );
    }

    #[test]
    fn tighter_sub_levels_skip_parentheses() {
        let product = arithmetic("MULTIPLY", number(2.0), number(3.0));
        let quotient = arithmetic("DIVIDE", product, number(4.0));
        assert_eq!(generate(vec![print(quotient)]), "window.alert(2 * 3 / 4);\n");

        let difference = arithmetic("MINUS", number(2.0), number(3.0));
        let sum = arithmetic("ADD", difference, number(4.0));
        assert_eq!(generate(vec![print(sum)]), "window.alert(2 - 3 + 4);\n");

        let quotient = arithmetic("DIVIDE", number(2.0), number(3.0));
        let product = arithmetic("MULTIPLY", quotient, number(4.0));
        assert_eq!(
            generate(vec![print(product)]),
            "window.alert((2 / 3) * 4);\n"
        );

        let sum = arithmetic("ADD", number(2.0), number(3.0));
        let difference = arithmetic("MINUS", sum, number(4.0));
        assert_eq!(
            generate(vec![print(difference)]),
            "window.alert((2 + 3) - 4);\n"
        );
    }

    #[test]
    fn numbers_format_like_javascript() {
        assert_eq!(generate(vec![print(number(2.0))]), "window.alert(2);\n");
        assert_eq!(generate(vec![print(number(2.5))]), "window.alert(2.5);\n");
        let negated = BlockState::new("math_single")
            .with_field("OP", "NEG")
            .with_input("NUM", number(-3.0));
        assert_eq!(generate(vec![print(negated)]), "window.alert(-(-3));\n");
    }

    #[test]
    fn variables_are_hoisted_once() {
        let mut state = WorkspaceState::default();
        let id = state.declare_variable("score");
        state.push(
            BlockState::new("variables_set")
                .with_field("VAR", json!({ "id": id }))
                .with_input("VALUE", number(5.0))
                .with_next(print(
                    BlockState::new("variables_get").with_field("VAR", json!({ "id": id })),
                )),
        );

        let code = JavaScriptGenerator::new().workspace_to_code(&state).unwrap();
        assert_eq!(code, "var score;\n\n\nscore = 5;\nwindow.alert(score);\n");
    }

    #[test]
    fn unused_variables_are_not_declared() {
        let mut state = WorkspaceState::default();
        state.declare_variable("unused");
        state.push(print(text("x")));

        let code = JavaScriptGenerator::new().workspace_to_code(&state).unwrap();
        assert_eq!(code, "window.alert('x');\n");
    }

    #[test]
    fn if_else_chain() {
        let block = BlockState::new("controls_if")
            .with_extra_state(json!({ "elseIfCount": 1, "hasElse": true }))
            .with_input("IF0", BlockState::new("logic_boolean").with_field("BOOL", "TRUE"))
            .with_input("DO0", print(text("a")))
            .with_input("DO1", print(text("b")))
            .with_input("ELSE", print(text("c")));

        assert_eq!(
            generate(vec![block]),
            "if (true) {\n  window.alert('a');\n} else if (false) {\n  window.alert('b');\n} else {\n  window.alert('c');\n}\n"
        );
    }

    #[test]
    fn repeat_uses_distinct_counter() {
        let block = BlockState::new("controls_repeat_ext")
            .with_input("TIMES", number(3.0))
            .with_input("DO", print(text("hi")));

        assert_eq!(
            generate(vec![block]),
            "for (var count = 0; count < 3; count++) {\n  window.alert('hi');\n}\n"
        );
    }

    #[test]
    fn while_until_negates_condition() {
        let block = BlockState::new("controls_whileUntil")
            .with_field("MODE", "UNTIL")
            .with_input("BOOL", BlockState::new("logic_boolean").with_field("BOOL", "TRUE"));

        assert_eq!(generate(vec![block]), "while (!true) {\n}\n");
    }

    #[test]
    fn counting_loop_with_literal_bounds() {
        let block = BlockState::new("controls_for")
            .with_field("VAR", "i")
            .with_input("FROM", number(1.0))
            .with_input("TO", number(10.0))
            .with_input("BY", number(2.0));

        assert_eq!(
            generate(vec![block]),
            "var i;\n\n\nfor (i = 1; i <= 10; i += 2) {\n}\n"
        );
    }

    #[test]
    fn procedures_are_defined_before_main_code() {
        let definition = BlockState::new("procedures_defnoreturn")
            .with_field("NAME", "greet")
            .with_input("STACK", print(text("hi")));
        let call = BlockState::new("procedures_callnoreturn")
            .with_extra_state(json!({ "name": "greet" }))
            .at(0.0, 200.0);

        assert_eq!(
            generate(vec![call, definition]),
            "function greet() {\n  window.alert('hi');\n}\n\n\ngreet();\n"
        );
    }

    #[test]
    fn procedure_with_return_and_parameters() {
        let definition = BlockState::new("procedures_defreturn")
            .with_field("NAME", "double")
            .with_extra_state(json!({ "params": [{ "name": "x", "id": "vx" }] }))
            .with_input(
                "RETURN",
                arithmetic(
                    "MULTIPLY",
                    BlockState::new("variables_get").with_field("VAR", json!({ "name": "x" })),
                    number(2.0),
                ),
            );
        let call = print(
            BlockState::new("procedures_callreturn")
                .with_extra_state(json!({ "name": "double", "params": ["x"] }))
                .with_input("ARG0", number(4.0)),
        );

        assert_eq!(
            generate(vec![definition, call]),
            "var x;\n\nfunction double(x) {\n  return x * 2;\n}\n\n\nwindow.alert(double(4));\n"
        );
    }

    #[test]
    fn text_join_forces_strings() {
        let join = BlockState::new("text_join")
            .with_extra_state(json!({ "itemCount": 2 }))
            .with_input("ADD0", text("n = "))
            .with_input("ADD1", number(1.0));

        assert_eq!(
            generate(vec![print(join)]),
            "window.alert('n = ' + String(1));\n"
        );
    }

    #[test]
    fn text_length_is_member_access() {
        let length = BlockState::new("text_length").with_input("VALUE", text("abc"));
        assert_eq!(generate(vec![print(length)]), "window.alert('abc'.length);\n");
    }

    #[test]
    fn top_level_expression_becomes_statement() {
        assert_eq!(generate(vec![number(42.0)]), "42;\n");
    }

    #[test]
    fn disabled_blocks_are_skipped() {
        let mut disabled = print(text("skip"));
        disabled.extra.insert("enabled".to_string(), json!(false));
        let stack = disabled.with_next(print(text("keep")));

        assert_eq!(generate(vec![stack]), "window.alert('keep');\n");
    }

    #[test]
    fn unknown_block_is_an_error() {
        let mut state = WorkspaceState::default();
        state.push(BlockState::new("robot_move"));

        let err = JavaScriptGenerator::new()
            .workspace_to_code(&state)
            .unwrap_err();
        assert!(matches!(err, GeneratorError::UnsupportedBlock { block_type, .. } if block_type == "robot_move"));
    }

    #[test]
    fn statement_in_value_input_is_malformed() {
        let mut state = WorkspaceState::default();
        state.push(print(print(text("x"))));

        let err = JavaScriptGenerator::new()
            .workspace_to_code(&state)
            .unwrap_err();
        assert!(matches!(err, GeneratorError::MalformedBlock { .. }));
    }

    #[test]
    fn generation_is_deterministic() {
        let blocks = vec![
            print(arithmetic("ADD", number(1.0), number(2.0))),
            print(text("done")).at(0.0, 100.0),
        ];
        assert_eq!(generate(blocks.clone()), generate(blocks));
    }

    #[test]
    fn prefix_lines_keeps_trailing_newline_unprefixed() {
        assert_eq!(prefix_lines("a;\nb;\n", "  "), "  a;\n  b;\n");
        assert_eq!(prefix_lines("a", "// "), "// a");
    }
}
