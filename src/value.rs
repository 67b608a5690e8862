//! Helpers over the `serde_json::Value` data tree.
//!
//! Schemas and instances share the same value model. Equality here is
//! numeric-representation independent (`1` equals `1.0`), which is what
//! `enum`, `const` and `uniqueItems` need and what `Value::eq` does not give.

use std::cmp::Ordering;
use std::fmt;

use serde_json::{Number, Value};

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The JSON Schema view of an instance's type, which adds `integer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaValueType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl SchemaValueType {
    /// Classify a value. Numbers with no fractional part are `Integer`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if is_integer(n) => Self::Integer,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Parse a `type` keyword entry.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "null" => Some(Self::Null),
            "boolean" => Some(Self::Boolean),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Whether `value` satisfies this declared type. `number` accepts integers.
    pub fn matches(&self, value: &Value) -> bool {
        let actual = Self::of(value);
        actual == *self || (*self == Self::Number && actual == Self::Integer)
    }
}

impl fmt::Display for SchemaValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a number has no fractional part (`1.0` counts).
pub fn is_integer(n: &Number) -> bool {
    if n.is_i64() || n.is_u64() {
        return true;
    }
    n.as_f64().map(|f| f.is_finite() && f.fract() == 0.0).unwrap_or(false)
}

/// Total-ish numeric comparison, exact when both sides are integers.
pub fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return Some(x.cmp(&y));
    }
    // one side is beyond i64::MAX, the other negative
    if let (Some(_), Some(y)) = (a.as_u64(), b.as_i64()) {
        if y < 0 {
            return Some(Ordering::Greater);
        }
    }
    if let (Some(x), Some(_)) = (a.as_i64(), b.as_u64()) {
        if x < 0 {
            return Some(Ordering::Less);
        }
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Whether `n` is an integral multiple of `divisor`.
///
/// Integer operands use exact remainder arithmetic; anything else falls back
/// to a relative tolerance on the quotient. A non-finite quotient is never a
/// multiple.
pub fn is_multiple_of(n: &Number, divisor: &Number) -> bool {
    let as_i128 = |x: &Number| {
        x.as_i64()
            .map(i128::from)
            .or_else(|| x.as_u64().map(i128::from))
    };
    if let (Some(a), Some(b)) = (as_i128(n), as_i128(divisor)) {
        return b != 0 && a % b == 0;
    }
    let (Some(a), Some(b)) = (n.as_f64(), divisor.as_f64()) else {
        return false;
    };
    if b == 0.0 {
        return false;
    }
    let quotient = a / b;
    if !quotient.is_finite() {
        return false;
    }
    let diff = (quotient - quotient.round()).abs();
    diff <= f64::EPSILON * quotient.abs().max(1.0) * 4.0
}

/// Deep equality with representation-independent numbers.
pub fn json_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| json_equals(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, l)| y.get(key).map(|r| json_equals(l, r)).unwrap_or(false))
        }
        _ => false,
    }
}

/// Truthiness: `null`, `false`, `0`, `""` and `[]` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Indices of the first pair of equal items, if any.
pub fn first_duplicate(items: &[Value]) -> Option<(usize, usize)> {
    for (i, left) in items.iter().enumerate() {
        for (j, right) in items.iter().enumerate().skip(i + 1) {
            if json_equals(left, right) {
                return Some((i, j));
            }
        }
    }
    None
}
