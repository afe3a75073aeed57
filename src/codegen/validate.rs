//! Validation lowering: one straight-line validator per schema.
//!
//! Constraints are baked into the generated function as literals, so no
//! schema metadata is consulted at request time. The same checks are
//! available in-process through [`ValidatorPlan::apply`].

use std::fmt;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use super::writer::{js_number, js_string, js_string_array, CodeWriter};
use super::EmitError;
use crate::dsl::ast::{FieldDecl, SchemaDecl};

/// How a field's value is checked and stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
    Text,
    Integer,
    Number,
    Boolean,
    /// Unrecognised types (including references to other schemas) pass through.
    Passthrough,
}

impl ValueKind {
    pub fn from_type_name(type_name: &str) -> Self {
        match type_name.to_ascii_lowercase().as_str() {
            "string" | "text" | "password" | "date" | "datetime" | "enum" | "email" | "url" | "uuid" => {
                ValueKind::Text
            }
            "int" | "integer" => ValueKind::Integer,
            "number" | "float" | "decimal" | "double" => ValueKind::Number,
            "boolean" | "bool" => ValueKind::Boolean,
            _ => ValueKind::Passthrough,
        }
    }

    /// A field with an enum constraint is always text, whatever its type name.
    pub fn of(field: &FieldDecl) -> Self {
        if field.enum_values().is_some() {
            ValueKind::Text
        } else {
            Self::from_type_name(&field.type_name)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    Email,
    Url,
    Uuid,
}

impl TextFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "email" => Some(TextFormat::Email),
            "url" => Some(TextFormat::Url),
            "uuid" => Some(TextFormat::Uuid),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TextFormat::Email => "email",
            TextFormat::Url => "url",
            TextFormat::Uuid => "uuid",
        }
    }

    /// Written so it means the same thing to the `regex` crate and to JS `RegExp`.
    pub fn pattern(self) -> &'static str {
        match self {
            TextFormat::Email => r"^[^\s@]+@[^\s@]+\.[^\s@]+$",
            TextFormat::Url => r"^https?://[^\s/?#]+[^\s]*$",
            TextFormat::Uuid => r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        }
    }
}

impl fmt::Display for TextFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks for one field, in the order they run.
#[derive(Debug, Clone)]
pub struct FieldCheck {
    pub field: String,
    pub optional: bool,
    pub kind: ValueKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub allowed: Option<Vec<String>>,
    pub pattern: Option<TextPattern>,
    pub format: Option<(TextFormat, TextPattern)>,
}

/// A regular expression restricted to the syntax the build-time `regex`
/// engine and the generated `RegExp` read the same way. A leading flag group
/// such as `(?i)` becomes the `RegExp` flags argument.
#[derive(Debug, Clone)]
pub struct TextPattern {
    pub regex: Regex,
    /// Pattern text for `new RegExp`, without the leading flag group.
    pub js_source: String,
    pub js_flags: String,
}

impl TextPattern {
    pub fn new(pattern: &str) -> Result<Self, String> {
        let (js_flags, body) = split_leading_flags(pattern);
        check_portable(body)?;
        let regex = Regex::new(pattern).map_err(|e| e.to_string())?;
        Ok(Self {
            regex,
            js_source: body.to_string(),
            js_flags,
        })
    }

    /// `new RegExp("...")` or `new RegExp("...", "flags")`.
    pub fn js_constructor(&self) -> String {
        if self.js_flags.is_empty() {
            format!("new RegExp({})", js_string(&self.js_source))
        } else {
            format!("new RegExp({}, {})", js_string(&self.js_source), js_string(&self.js_flags))
        }
    }
}

/// `(?mi)^a` -> (`"im"`, `^a`). Anything other than a pure `i`/`m`/`s` group
/// is left in place for [`check_portable`] to judge.
fn split_leading_flags(pattern: &str) -> (String, &str) {
    let Some(rest) = pattern.strip_prefix("(?") else {
        return (String::new(), pattern);
    };
    let Some((flags, body)) = rest.split_once(')') else {
        return (String::new(), pattern);
    };
    if flags.is_empty() || !flags.chars().all(|c| matches!(c, 'i' | 'm' | 's')) {
        return (String::new(), pattern);
    }
    let mut flags: Vec<char> = flags.chars().collect();
    flags.sort_unstable();
    flags.dedup();
    (flags.into_iter().collect(), body)
}

/// Reject constructs one engine accepts and the other reads differently or
/// not at all.
fn check_portable(pattern: &str) -> Result<(), String> {
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped @ ('A' | 'z' | 'p' | 'P' | 'Q' | 'E')) = chars.next() {
                    return Err(format!("escape `\\{escaped}` is not supported in validator patterns"));
                }
            }
            '[' if in_class => {
                return Err(if chars.peek() == Some(&':') {
                    "POSIX classes such as `[[:alpha:]]` are not supported in validator patterns".to_string()
                } else {
                    "nested character classes are not supported in validator patterns".to_string()
                });
            }
            '[' => in_class = true,
            ']' if in_class => in_class = false,
            '&' | '-' | '~' if in_class && chars.peek() == Some(&c) => {
                return Err(format!("class set operation `{c}{c}` is not supported in validator patterns"));
            }
            '(' if !in_class && chars.peek() == Some(&'?') => {
                chars.next();
                match chars.next() {
                    Some(':') => {}
                    Some('<') if !matches!(chars.peek(), Some('=' | '!')) => {}
                    _ => {
                        return Err("only `(?:...)` and `(?<name>...)` groups are supported; \
                                    flags go at the very start, as in `(?i)`"
                            .to_string())
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ValidatorPlan {
    pub schema: String,
    pub function_name: String,
    pub checks: Vec<FieldCheck>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    NotAnObject,
    Missing,
    NotString,
    TooShort,
    TooLong,
    NotInEnum,
    PatternMismatch,
    InvalidFormat,
    NotNumber,
    NotInteger,
    BelowMin,
    AboveMax,
}

/// Client-facing validation failure. Always a 400.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ValidationFailure {
    pub status: u16,
    pub field: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

impl ValidationFailure {
    const STATUS: u16 = 400;

    fn new(field: Option<&str>, kind: FailureKind, message: String) -> Self {
        Self {
            status: Self::STATUS,
            field: field.map(str::to_string),
            kind,
            message,
        }
    }
}

pub fn validator_name(schema: &str) -> String {
    format!("validate{schema}")
}

/// Build the validator plan for one schema. Patterns and formats are checked
/// here so a bad regex fails the build rather than the first request.
pub fn lower_validation(schema: &SchemaDecl) -> Result<ValidatorPlan, EmitError> {
    let mut checks = Vec::with_capacity(schema.fields.len());

    for field in &schema.fields {
        let kind = ValueKind::of(field);
        let mut check = FieldCheck {
            field: field.name.clone(),
            optional: field.optional,
            kind,
            min: field.number_arg("min"),
            max: field.number_arg("max"),
            allowed: field.enum_values().map(<[String]>::to_vec),
            pattern: None,
            format: None,
        };

        if kind == ValueKind::Text {
            if let Some(pattern) = field.text_arg("pattern") {
                let pattern = TextPattern::new(&pattern).map_err(|message| EmitError::InvalidPattern {
                    schema: schema.name.clone(),
                    field: field.name.clone(),
                    message,
                })?;
                check.pattern = Some(pattern);
            }

            let format_name = field
                .text_arg("format")
                .or_else(|| TextFormat::from_name(&field.type_name).map(|f| f.as_str().to_string()));
            if let Some(name) = format_name {
                let format = TextFormat::from_name(&name).ok_or_else(|| EmitError::UnknownFormat {
                    schema: schema.name.clone(),
                    field: field.name.clone(),
                    format: name.clone(),
                })?;
                let pattern = TextPattern::new(format.pattern()).map_err(|message| EmitError::InvalidPattern {
                    schema: schema.name.clone(),
                    field: field.name.clone(),
                    message,
                })?;
                check.format = Some((format, pattern));
            }
        }

        checks.push(check);
    }

    Ok(ValidatorPlan {
        schema: schema.name.clone(),
        function_name: validator_name(&schema.name),
        checks,
    })
}

impl ValidatorPlan {
    /// Emit the validator as an exported JS function.
    pub fn render(&self, w: &mut CodeWriter) {
        w.open(format!("export function {}(input) {{", self.function_name));
        w.open("if (input === null || typeof input !== \"object\" || Array.isArray(input)) {")
            .line("throw new ValidationFailure(null, \"Request body must be an object\");")
            .close("}");
        w.line("const out = {};");
        for check in &self.checks {
            check.render(w);
        }
        w.line("return out;");
        w.close("}");
    }

    /// Run the same checks in-process. Returns the sanitized record or the
    /// first failure; the input is never modified.
    pub fn apply(&self, input: &Value) -> Result<Map<String, Value>, ValidationFailure> {
        let Some(object) = input.as_object() else {
            return Err(ValidationFailure::new(
                None,
                FailureKind::NotAnObject,
                "Request body must be an object".to_string(),
            ));
        };

        let mut out = Map::new();
        for check in &self.checks {
            let value = check.apply(object.get(&check.field))?;
            out.insert(check.field.clone(), value);
        }
        Ok(out)
    }
}

impl FieldCheck {
    fn render(&self, w: &mut CodeWriter) {
        let key = js_string(&self.field);
        let name = &self.field;
        let fail = |kind_message: String| format!("throw new ValidationFailure({key}, {});", js_string(&kind_message));

        w.open("{");
        w.line(format!("const value = input[{key}];"));
        w.open("if (value === undefined || value === null) {");
        if self.optional {
            w.line(format!("out[{key}] = null;"));
        } else {
            w.line(fail(format!("Missing required field: {name}")));
        }
        w.reopen("} else {");

        match self.kind {
            ValueKind::Text => {
                w.line(format!("if (typeof value !== \"string\") {}", fail(format!("{name} must be a string"))));
                if let Some(min) = self.min {
                    w.line(format!(
                        "if (value.length < {}) {}",
                        js_number(min),
                        fail(format!("{name} is too short (min {})", js_number(min)))
                    ));
                }
                if let Some(max) = self.max {
                    w.line(format!(
                        "if (value.length > {}) {}",
                        js_number(max),
                        fail(format!("{name} is too long (max {})", js_number(max)))
                    ));
                }
                if let Some(allowed) = &self.allowed {
                    w.line(format!(
                        "if (!{}.includes(value)) {}",
                        js_string_array(allowed.iter().map(String::as_str)),
                        fail(format!("{name} must be one of: {}", allowed.join(", ")))
                    ));
                }
                if let Some(pattern) = &self.pattern {
                    w.line(format!(
                        "if (!{}.test(value)) {}",
                        pattern.js_constructor(),
                        fail(format!("{name} does not match the required pattern"))
                    ));
                }
                if let Some((format, pattern)) = &self.format {
                    w.line(format!(
                        "if (!{}.test(value)) {}",
                        pattern.js_constructor(),
                        fail(format!("{name} must be a valid {format}"))
                    ));
                }
                w.line(format!("out[{key}] = value;"));
            }
            ValueKind::Integer | ValueKind::Number => {
                w.line("const n = Number(value);");
                w.line(format!("if (!Number.isFinite(n)) {}", fail(format!("{name} must be a number"))));
                if self.kind == ValueKind::Integer {
                    w.line(format!("if (!Number.isInteger(n)) {}", fail(format!("{name} must be an integer"))));
                }
                if let Some(min) = self.min {
                    w.line(format!(
                        "if (n < {}) {}",
                        js_number(min),
                        fail(format!("{name} must be at least {}", js_number(min)))
                    ));
                }
                if let Some(max) = self.max {
                    w.line(format!(
                        "if (n > {}) {}",
                        js_number(max),
                        fail(format!("{name} must be at most {}", js_number(max)))
                    ));
                }
                w.line(format!("out[{key}] = n;"));
            }
            ValueKind::Boolean => {
                w.line(format!("out[{key}] = Boolean(value);"));
            }
            ValueKind::Passthrough => {
                w.line(format!("out[{key}] = value;"));
            }
        }

        w.close("}");
        w.close("}");
    }

    fn fail(&self, kind: FailureKind, message: String) -> ValidationFailure {
        ValidationFailure::new(Some(&self.field), kind, message)
    }

    fn apply(&self, value: Option<&Value>) -> Result<Value, ValidationFailure> {
        let name = &self.field;
        let value = match value {
            None | Some(Value::Null) if self.optional => return Ok(Value::Null),
            None | Some(Value::Null) => {
                return Err(self.fail(FailureKind::Missing, format!("Missing required field: {name}")));
            }
            Some(value) => value,
        };

        match self.kind {
            ValueKind::Text => {
                let Value::String(text) = value else {
                    return Err(self.fail(FailureKind::NotString, format!("{name} must be a string")));
                };
                // JS string length counts UTF-16 code units.
                #[allow(clippy::cast_precision_loss)]
                let length = text.encode_utf16().count() as f64;
                if let Some(min) = self.min {
                    if length < min {
                        return Err(self.fail(
                            FailureKind::TooShort,
                            format!("{name} is too short (min {})", js_number(min)),
                        ));
                    }
                }
                if let Some(max) = self.max {
                    if length > max {
                        return Err(self.fail(
                            FailureKind::TooLong,
                            format!("{name} is too long (max {})", js_number(max)),
                        ));
                    }
                }
                if let Some(allowed) = &self.allowed {
                    if !allowed.iter().any(|a| a == text) {
                        return Err(self.fail(
                            FailureKind::NotInEnum,
                            format!("{name} must be one of: {}", allowed.join(", ")),
                        ));
                    }
                }
                if let Some(pattern) = &self.pattern {
                    if !pattern.regex.is_match(text) {
                        return Err(self.fail(
                            FailureKind::PatternMismatch,
                            format!("{name} does not match the required pattern"),
                        ));
                    }
                }
                if let Some((format, pattern)) = &self.format {
                    if !pattern.regex.is_match(text) {
                        return Err(self.fail(FailureKind::InvalidFormat, format!("{name} must be a valid {format}")));
                    }
                }
                Ok(value.clone())
            }
            ValueKind::Integer | ValueKind::Number => {
                let n = js_to_number(value);
                if !n.is_finite() {
                    return Err(self.fail(FailureKind::NotNumber, format!("{name} must be a number")));
                }
                if self.kind == ValueKind::Integer && n.fract() != 0.0 {
                    return Err(self.fail(FailureKind::NotInteger, format!("{name} must be an integer")));
                }
                if let Some(min) = self.min {
                    if n < min {
                        return Err(self.fail(FailureKind::BelowMin, format!("{name} must be at least {}", js_number(min))));
                    }
                }
                if let Some(max) = self.max {
                    if n > max {
                        return Err(self.fail(FailureKind::AboveMax, format!("{name} must be at most {}", js_number(max))));
                    }
                }
                if value.is_number() {
                    return Ok(value.clone());
                }
                Ok(number_value(n))
            }
            ValueKind::Boolean => Ok(Value::Bool(js_truthy(value))),
            ValueKind::Passthrough => Ok(value.clone()),
        }
    }
}

/// `Number(value)` semantics for JSON values.
fn js_to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Value::Null => 0.0,
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn js_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}
