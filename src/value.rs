//! Typed scalar values of karaf configuration properties.
//!
//! The karaf client only speaks text, so every value read back from it goes
//! through [`convert`], which tries integer, float and boolean interpretations
//! before giving up and keeping the raw string.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Words accepted as booleans (compared case insensitively).
const BOOL_WORDS: [&str; 6] = ["true", "false", "yes", "no", "y", "n"];

/// Words mapped to `true`, all other [`BOOL_WORDS`] map to `false`.
const TRUE_WORDS: [&str; 3] = ["true", "yes", "y"];

/// Value of a single configuration property.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ScalarValue {
    /// `true`, `yes`, `y`, `false`, `no`, `n` in any case
    Bool(bool),
    /// Anything parsable as a signed 64 bits integer
    Int(i64),
    /// Integer beyond 64 bits, kept as its decimal digits
    #[serde(skip_deserializing)]
    BigInt(String),
    /// Anything parsable as a floating point number
    Float(f64),
    /// Fallback, the raw text
    String(String),
}

/// Convert `raw` into the first matching [`ScalarValue`] in the order
/// integer, float, boolean word, string. Never fails.
///
/// ```
/// use lib::value::{convert, ScalarValue};
/// assert_eq!(convert("42"), ScalarValue::Int(42));
/// assert_eq!(convert("3.14"), ScalarValue::Float(3.14));
/// assert_eq!(convert("No"), ScalarValue::Bool(false));
/// assert_eq!(convert("hello"), ScalarValue::String("hello".into()));
/// ```
pub fn convert(raw: &str) -> ScalarValue {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return ScalarValue::Int(i);
    }
    if let Some(digits) = big_integer(trimmed) {
        return ScalarValue::BigInt(digits);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return ScalarValue::Float(f);
    }
    if let Some(b) = check_bool(raw) {
        return ScalarValue::Bool(b);
    }
    ScalarValue::String(raw.to_owned())
}

/// Normalized digits of an integer too large for `i64`.
fn big_integer(text: &str) -> Option<String> {
    let (sign, digits) = match text.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{sign}{}", digits.trim_start_matches('0')))
}

/// Return the boolean meaning of `value` if it is one of the known boolean words.
fn check_bool(value: &str) -> Option<bool> {
    let v = value.to_lowercase();
    if !BOOL_WORDS.contains(&v.as_str()) {
        return None;
    }
    Some(TRUE_WORDS.contains(&v.as_str()))
}

impl PartialEq for ScalarValue {
    /// Integers and floats compare numerically, other variants only with themselves.
    fn eq(&self, other: &Self) -> bool {
        use ScalarValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (BigInt(a), BigInt(b)) => a == b,
            (String(a), String(b)) => a == b,
            _ => false,
        }
    }
}

/// Rendering used on the karaf client command line.
impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Int(i) => write!(f, "{i}"),
            ScalarValue::BigInt(digits) => write!(f, "{digits}"),
            // Debug keeps the fractional part (`3.0`, not `3`)
            ScalarValue::Float(x) => write!(f, "{x:?}"),
            ScalarValue::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        ScalarValue::Bool(b)
    }
}

impl From<i64> for ScalarValue {
    fn from(i: i64) -> Self {
        ScalarValue::Int(i)
    }
}

impl From<f64> for ScalarValue {
    fn from(x: f64) -> Self {
        ScalarValue::Float(x)
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::String(s.to_owned())
    }
}


#[cfg(test)]
mod scalar_value_should {
    use super::*;

    #[test]
    fn compare_integers_and_floats_numerically() {
        assert_eq!(ScalarValue::Int(3), ScalarValue::Float(3.0));
        assert_eq!(ScalarValue::Float(3.0), ScalarValue::Int(3));
        assert_ne!(ScalarValue::Int(3), ScalarValue::Float(3.5));
    }

    #[test]
    fn compare_large_integers_by_digits() {
        assert_eq!(convert("12345678901234567890"), convert("012345678901234567890"));
        assert_ne!(convert("12345678901234567890"), convert("12345678901234567891"));
        assert_ne!(
            convert("12345678901234567890"),
            ScalarValue::String("12345678901234567890".into())
        );
    }

    #[test]
    fn not_compare_across_other_variants() {
        assert_ne!(ScalarValue::Bool(true), ScalarValue::Int(1));
        assert_ne!(ScalarValue::String("1".into()), ScalarValue::Int(1));
        assert_ne!(ScalarValue::String("true".into()), ScalarValue::Bool(true));
    }

    #[test]
    fn render_for_the_command_line() {
        assert_eq!(ScalarValue::Bool(false).to_string(), "false");
        assert_eq!(ScalarValue::Int(-12).to_string(), "-12");
        assert_eq!(
            ScalarValue::BigInt("12345678901234567890".into()).to_string(),
            "12345678901234567890"
        );
        assert_eq!(ScalarValue::Float(3.0).to_string(), "3.0");
        assert_eq!(ScalarValue::Float(0.25).to_string(), "0.25");
        assert_eq!(ScalarValue::String("a b".into()).to_string(), "a b");
    }

    #[test]
    fn deserialize_typed_values() {
        let v: ScalarValue = serde_json::from_str("false").unwrap();
        assert_eq!(v, ScalarValue::Bool(false));
        let v: ScalarValue = serde_json::from_str("12").unwrap();
        assert!(matches!(v, ScalarValue::Int(12)));
        let v: ScalarValue = serde_json::from_str("1.5").unwrap();
        assert!(matches!(v, ScalarValue::Float(x) if x == 1.5));
        let v: ScalarValue = serde_json::from_str("\"true\"").unwrap();
        assert_eq!(v, ScalarValue::String("true".into()));
    }
}
