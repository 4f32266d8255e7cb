//! Value coercions used by the leaf operators.
//!
//! Equality-style operators compare normalized values (strings trimmed and
//! lowercased). Relational operators and regex tests work on raw values using
//! ECMAScript coercion rules, because dashboard configuration was authored
//! against those rules: `"10" < "9"` holds, `"10" < 9` does not.

use std::{borrow::Cow, cmp::Ordering};

use serde_json::Value;

/// A value in the form used by `equals`, `in`, `contains` and their negations.
#[derive(Debug, Clone)]
pub(crate) enum Normalized<'a> {
    Missing,
    Null,
    Bool(bool),
    Number(f64),
    Text(Cow<'a, str>),
    /// Arrays and objects. Never equal to anything, including themselves.
    Opaque,
}

impl Normalized<'_> {
    /// Strict equality on normalized values.
    pub(crate) fn strict_eq(&self, other: &Normalized<'_>) -> bool {
        match (self, other) {
            (Self::Missing, Normalized::Missing) | (Self::Null, Normalized::Null) => true,
            (Self::Bool(a), Normalized::Bool(b)) => a == b,
            (Self::Number(a), Normalized::Number(b)) => a == b,
            (Self::Text(a), Normalized::Text(b)) => a == b,
            _ => false,
        }
    }

    pub(crate) fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_ref()),
            _ => None,
        }
    }

    pub(crate) fn into_owned(self) -> Normalized<'static> {
        match self {
            Self::Missing => Normalized::Missing,
            Self::Null => Normalized::Null,
            Self::Bool(b) => Normalized::Bool(b),
            Self::Number(n) => Normalized::Number(n),
            Self::Text(text) => Normalized::Text(Cow::Owned(text.into_owned())),
            Self::Opaque => Normalized::Opaque,
        }
    }
}

pub(crate) fn normalize(value: Option<&Value>) -> Normalized<'_> {
    match value {
        None => Normalized::Missing,
        Some(Value::Null) => Normalized::Null,
        Some(Value::Bool(b)) => Normalized::Bool(*b),
        Some(Value::Number(n)) => n.as_f64().map_or(Normalized::Opaque, Normalized::Number),
        Some(Value::String(s)) => Normalized::Text(normalize_text(s)),
        Some(Value::Array(_) | Value::Object(_)) => Normalized::Opaque,
    }
}

fn normalize_text(s: &str) -> Cow<'_, str> {
    let trimmed = s.trim();
    if trimmed.chars().any(char::is_uppercase) {
        Cow::Owned(trimmed.to_lowercase())
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// The needle a `contains` operand searches for.
pub(crate) fn contains_needle(operand: &Value) -> String {
    match operand {
        Value::String(s) => normalize_text(s).into_owned(),
        other => to_js_string(Some(other)),
    }
}

/// ECMAScript `ToString`, with `None` standing for `undefined`.
pub(crate) fn to_js_string(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.as_f64().map_or_else(|| n.to_string(), format_number),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_js_string(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

/// ECMAScript `Number::toString` for finite values.
fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        // Rust prints `1e21`, ECMAScript prints `1e+21`
        let formatted = format!("{n:e}");
        match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{mantissa}e+{exponent}")
            }
            _ => formatted,
        }
    } else {
        format!("{n}")
    }
}

/// A raw value after ECMAScript `ToPrimitive`.
enum Primitive {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

fn to_primitive(value: Option<&Value>) -> Primitive {
    match value {
        None => Primitive::Undefined,
        Some(Value::Null) => Primitive::Null,
        Some(Value::Bool(b)) => Primitive::Bool(*b),
        Some(Value::Number(n)) => n.as_f64().map_or(Primitive::Undefined, Primitive::Number),
        Some(Value::String(s)) => Primitive::Text(s.clone()),
        Some(composite) => Primitive::Text(to_js_string(Some(composite))),
    }
}

fn to_number(primitive: &Primitive) -> f64 {
    match primitive {
        Primitive::Undefined => f64::NAN,
        Primitive::Null => 0.0,
        Primitive::Bool(b) => f64::from(u8::from(*b)),
        Primitive::Number(n) => *n,
        Primitive::Text(s) => string_to_number(s),
    }
}

/// ECMAScript `StringToNumber`: surrounding whitespace is ignored, the empty
/// string is zero, anything unparseable is NaN.
fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = s.strip_prefix(prefix) {
            return parse_radix(digits, radix);
        }
    }
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    if unsigned == "Infinity" {
        return if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    // Rust also accepts `inf` and `nan`; ECMAScript does not
    let decimal_literal = unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && unsigned
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !decimal_literal {
        return f64::NAN;
    }
    s.parse().unwrap_or(f64::NAN)
}

fn parse_radix(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    digits.chars().try_fold(0.0_f64, |acc, c| {
        c.to_digit(radix).map(|d| acc * f64::from(radix) + f64::from(d))
    })
    .unwrap_or(f64::NAN)
}

/// ECMAScript abstract relational comparison of two raw values.
///
/// Two strings compare by UTF-16 code units. Everything else compares
/// numerically; `None` is returned when either side is NaN, which makes
/// every relational operator false.
pub(crate) fn js_compare(left: Option<&Value>, right: &Value) -> Option<Ordering> {
    let left = to_primitive(left);
    let right = to_primitive(Some(right));
    if let (Primitive::Text(a), Primitive::Text(b)) = (&left, &right) {
        return Some(a.encode_utf16().cmp(b.encode_utf16()));
    }
    to_number(&left).partial_cmp(&to_number(&right))
}
