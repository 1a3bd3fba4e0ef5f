//! Declarative payload schemas for the HTTP boundary.
//!
//! A `Schema` describes the shape and constraints of one request or response
//! body. `validate` walks a raw `serde_json::Value` against it and reports
//! every violation at once, each with a machine-readable reason code, so the
//! frontend can highlight all offending fields in a single round trip.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Reason codes carried by each violation. Serialized in kebab-case on the
/// wire (`"empty-value"` etc.).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    Missing,
    WrongType,
    OutOfRange,
    PatternMismatch,
    EmptyValue,
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReasonCode::Missing => "missing",
            ReasonCode::WrongType => "wrong-type",
            ReasonCode::OutOfRange => "out-of-range",
            ReasonCode::PatternMismatch => "pattern-mismatch",
            ReasonCode::EmptyValue => "empty-value",
        };
        f.write_str(s)
    }
}

/// One violating field. `field` is a dot path from the body root, e.g.
/// `items.2.item_code`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub code: ReasonCode,
    pub message: String,
}

#[derive(Debug, Error)]
#[error("schema validation failed with {} violation(s)", violations.len())]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn mentions(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

/// Proof of validation: only `validate` can construct one, so a function
/// taking `ValidatedValue` cannot be handed an unchecked payload.
#[derive(Clone, Debug)]
pub struct ValidatedValue {
    value: Value,
}

impl ValidatedValue {
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_inner(self) -> Value {
        self.value
    }

    /// Deserialize the validated payload into a typed input struct.
    /// The schema is expected to be at least as strict as the target type;
    /// a mismatch here is a programming error the caller must surface as an
    /// internal fault, not a caller error.
    pub fn deserialize_into<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value.clone())
    }
}

#[derive(Clone, Debug)]
pub enum Schema {
    String(StringSchema),
    Number(NumberSchema),
    Boolean,
    Object(ObjectSchema),
    Sequence(Box<Schema>),
}

impl Schema {
    fn type_name(&self) -> &'static str {
        match self {
            Schema::String(_) => "string",
            Schema::Number(n) if n.integer => "integer",
            Schema::Number(_) => "number",
            Schema::Boolean => "boolean",
            Schema::Object(_) => "object",
            Schema::Sequence(_) => "array",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StringSchema {
    non_empty: bool,
    min_len: Option<usize>,
    max_len: Option<usize>,
    pattern: Option<Regex>,
    one_of: Option<Vec<String>>,
}

impl StringSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }

    pub fn min_len(mut self, n: usize) -> Self {
        self.min_len = Some(n);
        self
    }

    pub fn max_len(mut self, n: usize) -> Self {
        self.max_len = Some(n);
        self
    }

    /// Compile `pattern` as a regex constraint (anchor it yourself if the
    /// whole value must match). Schemas are built once at startup, so a bad
    /// pattern surfaces there, never per request.
    pub fn pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.one_of = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Schema {
        Schema::String(self)
    }
}

#[derive(Clone, Debug, Default)]
pub struct NumberSchema {
    integer: bool,
    min: Option<f64>,
    max: Option<f64>,
}

impl NumberSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn integer(mut self) -> Self {
        self.integer = true;
        self
    }

    pub fn min(mut self, v: f64) -> Self {
        self.min = Some(v);
        self
    }

    pub fn max(mut self, v: f64) -> Self {
        self.max = Some(v);
        self
    }

    pub fn build(self) -> Schema {
        Schema::Number(self)
    }
}

#[derive(Clone, Debug)]
pub struct FieldSpec {
    name: String,
    required: bool,
    safe_to_log: bool,
    schema: Schema,
}

impl FieldSpec {
    pub fn required(name: &str, schema: Schema) -> Self {
        Self { name: name.to_string(), required: true, safe_to_log: false, schema }
    }

    pub fn optional(name: &str, schema: Schema) -> Self {
        Self { name: name.to_string(), required: false, safe_to_log: false, schema }
    }

    /// Mark this field as loggable by the dispatch layer. Off by default so
    /// payload data never reaches the logs by accident.
    pub fn safe_to_log(mut self) -> Self {
        self.safe_to_log = true;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct ObjectSchema {
    fields: Vec<FieldSpec>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Top-level field names marked safe for the dispatch log.
    pub fn loggable_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.safe_to_log)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Validate directly against this object schema without wrapping it in
    /// `Schema::Object` first. Same contract as [`validate`].
    pub fn validate(&self, raw: &Value) -> Result<ValidatedValue, ValidationError> {
        let mut violations = Vec::new();
        check_object(self, raw, "", &mut violations);
        if violations.is_empty() {
            Ok(ValidatedValue { value: raw.clone() })
        } else {
            Err(ValidationError { violations })
        }
    }

    pub fn build(self) -> Schema {
        Schema::Object(self)
    }
}

/// Validate `raw` against `schema`, collecting every violation. Pure and
/// total: terminates for any finite input and never fails outside of
/// `ValidationError`.
pub fn validate(schema: &Schema, raw: &Value) -> Result<ValidatedValue, ValidationError> {
    let mut violations = Vec::new();
    check(schema, raw, "", &mut violations);
    if violations.is_empty() {
        Ok(ValidatedValue { value: raw.clone() })
    } else {
        Err(ValidationError { violations })
    }
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

fn push(violations: &mut Vec<Violation>, path: &str, code: ReasonCode, message: String) {
    let field = if path.is_empty() { "(body)".to_string() } else { path.to_string() };
    violations.push(Violation { field, code, message });
}

fn check(schema: &Schema, value: &Value, path: &str, violations: &mut Vec<Violation>) {
    match schema {
        Schema::String(s) => check_string(s, value, path, violations),
        Schema::Number(n) => check_number(n, value, path, violations),
        Schema::Boolean => {
            if !value.is_boolean() {
                push(
                    violations,
                    path,
                    ReasonCode::WrongType,
                    format!("expected boolean, got {}", json_type(value)),
                );
            }
        }
        Schema::Object(o) => check_object(o, value, path, violations),
        Schema::Sequence(elem) => check_sequence(elem, value, path, violations),
    }
}

fn check_string(s: &StringSchema, value: &Value, path: &str, violations: &mut Vec<Violation>) {
    let Some(text) = value.as_str() else {
        push(
            violations,
            path,
            ReasonCode::WrongType,
            format!("expected string, got {}", json_type(value)),
        );
        return;
    };
    if s.non_empty && text.trim().is_empty() {
        push(violations, path, ReasonCode::EmptyValue, "value must not be empty".to_string());
        return;
    }
    if let Some(min) = s.min_len {
        if text.chars().count() < min {
            push(
                violations,
                path,
                ReasonCode::OutOfRange,
                format!("length must be >= {min}"),
            );
        }
    }
    if let Some(max) = s.max_len {
        if text.chars().count() > max {
            push(
                violations,
                path,
                ReasonCode::OutOfRange,
                format!("length must be <= {max}"),
            );
        }
    }
    if let Some(pattern) = &s.pattern {
        if !pattern.is_match(text) {
            push(
                violations,
                path,
                ReasonCode::PatternMismatch,
                format!("value does not match pattern {}", pattern.as_str()),
            );
        }
    }
    if let Some(allowed) = &s.one_of {
        if !allowed.iter().any(|a| a == text) {
            push(
                violations,
                path,
                ReasonCode::OutOfRange,
                format!("value must be one of: {}", allowed.join(", ")),
            );
        }
    }
}

fn check_number(n: &NumberSchema, value: &Value, path: &str, violations: &mut Vec<Violation>) {
    let Some(num) = value.as_f64() else {
        push(
            violations,
            path,
            ReasonCode::WrongType,
            format!("expected {}, got {}", if n.integer { "integer" } else { "number" }, json_type(value)),
        );
        return;
    };
    if n.integer && value.as_i64().is_none() && value.as_u64().is_none() {
        push(
            violations,
            path,
            ReasonCode::WrongType,
            "expected integer, got fractional number".to_string(),
        );
        return;
    }
    if let Some(min) = n.min {
        if num < min {
            push(violations, path, ReasonCode::OutOfRange, format!("value must be >= {min}"));
        }
    }
    if let Some(max) = n.max {
        if num > max {
            push(violations, path, ReasonCode::OutOfRange, format!("value must be <= {max}"));
        }
    }
}

fn check_object(o: &ObjectSchema, value: &Value, path: &str, violations: &mut Vec<Violation>) {
    let Some(map) = value.as_object() else {
        push(
            violations,
            path,
            ReasonCode::WrongType,
            format!("expected object, got {}", json_type(value)),
        );
        return;
    };
    // Unknown keys are ignored; only declared fields are checked.
    for spec in &o.fields {
        let field_path = join_path(path, &spec.name);
        match map.get(&spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    push(
                        violations,
                        &field_path,
                        ReasonCode::Missing,
                        "required field is missing".to_string(),
                    );
                }
            }
            Some(v) => check(&spec.schema, v, &field_path, violations),
        }
    }
}

fn check_sequence(elem: &Schema, value: &Value, path: &str, violations: &mut Vec<Violation>) {
    let Some(items) = value.as_array() else {
        push(
            violations,
            path,
            ReasonCode::WrongType,
            format!("expected array of {}, got {}", elem.type_name(), json_type(value)),
        );
        return;
    };
    for (i, item) in items.iter().enumerate() {
        let item_path = join_path(path, &i.to_string());
        check(elem, item, &item_path, violations);
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
