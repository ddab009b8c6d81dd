//! Formula value types

use crate::date;
use chrono::NaiveDateTime;
use std::fmt;

/// A raw operand or result of formula evaluation
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// No data (a blank cell)
    #[default]
    Empty,

    /// Boolean value
    Boolean(bool),

    /// Numeric value
    Number(f64),

    /// String value
    String(String),

    /// Date value (UTC)
    Date(NaiveDateTime),

    /// Error marker propagated from an inner evaluation
    Error(ErrorValue),
}

impl Value {
    /// Create a new string value
    pub fn string<S: Into<String>>(s: S) -> Self {
        Value::String(s.into())
    }

    /// Check if the value is empty (`Empty` or the empty string)
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Check if the value is a string made only of whitespace (and is not empty)
    pub fn is_blank_string(&self) -> bool {
        match self {
            Value::String(s) => !s.is_empty() && s.trim().is_empty(),
            _ => false,
        }
    }

    /// Check if the value is an error marker
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Get the error marker if this is one
    pub fn get_error(&self) -> Option<ErrorValue> {
        match self {
            Value::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Check if the value is the number NaN
    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    /// Interpret the value as a date: date values, and strings in a recognized date layout
    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            Value::String(s) => date::parse_date(s),
            _ => None,
        }
    }

    /// Numeric conversion with the host's loose rules.
    ///
    /// Empty values and whitespace-only strings convert to 0, booleans to 0/1, dates to their
    /// millisecond value. Unparseable strings and error markers convert to NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Empty => 0.0,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) if s.trim().is_empty() => 0.0,
            Value::String(s) => parse_number(s).unwrap_or(f64::NAN),
            Value::Date(d) => date::to_millis(d),
            Value::Error(_) => f64::NAN,
        }
    }

    /// Truthiness used by `!`, `&&`, `||` and conditionals
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Date(_) | Value::Error(_) => true,
        }
    }

    /// Strict equality: same kind and same content, with no coercion.
    ///
    /// Numbers follow IEEE comparison (`NaN` is not equal to itself, `0 == -0`).
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

/// Parse a numeric string the way the formula host does.
///
/// Surrounding whitespace is ignored. Accepts decimal and exponent notation, `0x` hexadecimal,
/// and `Infinity` with an optional sign. Returns `None` for empty or non-numeric text.
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match text {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }

    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).ok().map(|n| n as f64);
    }

    // Rust also accepts "inf" and "nan" spellings, the host does not
    if text
        .chars()
        .any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return None;
    }

    text.parse().ok()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", date::format_iso(d)),
            Value::Error(e) => write!(f, "{}", e),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        // -0 prints as 0
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::Date(d)
    }
}

impl From<ErrorValue> for Value {
    fn from(e: ErrorValue) -> Self {
        Value::Error(e)
    }
}

/// Error markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorValue {
    /// #NULL! - Missing intersection
    Null,
    /// #DIV/0! - Division by zero
    Div0,
    /// #VALUE! - Wrong type of argument or operand
    Value,
    /// #REF! - Invalid reference
    Ref,
    /// #NAME? - Unrecognized name
    Name,
    /// #NUM! - Invalid numeric value
    Num,
    /// #N/A - Value not available
    Na,
}

impl ErrorValue {
    /// Get the display string for this error
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorValue::Null => "#NULL!",
            ErrorValue::Div0 => "#DIV/0!",
            ErrorValue::Value => "#VALUE!",
            ErrorValue::Ref => "#REF!",
            ErrorValue::Name => "#NAME?",
            ErrorValue::Num => "#NUM!",
            ErrorValue::Na => "#N/A",
        }
    }

    /// Parse an error string (case insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "#NULL!" => Some(ErrorValue::Null),
            "#DIV/0!" => Some(ErrorValue::Div0),
            "#VALUE!" => Some(ErrorValue::Value),
            "#REF!" => Some(ErrorValue::Ref),
            "#NAME?" => Some(ErrorValue::Name),
            "#NUM!" => Some(ErrorValue::Num),
            "#N/A" => Some(ErrorValue::Na),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(42), Value::Number(42.0));
        assert_eq!(Value::from(3.5), Value::Number(3.5));
        assert_eq!(Value::from(true), Value::Boolean(true));
        assert_eq!(Value::from("hello"), Value::String("hello".into()));
        assert_eq!(Value::from(ErrorValue::Na), Value::Error(ErrorValue::Na));
    }

    #[test]
    fn test_emptiness() {
        assert!(Value::Empty.is_empty());
        assert!(Value::from("").is_empty());
        assert!(!Value::from(" ").is_empty());
        assert!(Value::from(" \t").is_blank_string());
        assert!(!Value::from("").is_blank_string());
        assert!(!Value::Number(0.0).is_empty());
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::Empty.to_number(), 0.0);
        assert_eq!(Value::from("   ").to_number(), 0.0);
        assert_eq!(Value::from(" 12.5 ").to_number(), 12.5);
        assert_eq!(Value::from(true).to_number(), 1.0);
        assert!(Value::from("abc").to_number().is_nan());
        assert!(Value::Error(ErrorValue::Value).to_number().is_nan());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number(".5"), Some(0.5));
        assert_eq!(parse_number("0x1F"), Some(31.0));
        assert_eq!(parse_number("-Infinity"), Some(f64::NEG_INFINITY));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("12px"), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Empty.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::Error(ErrorValue::Na).is_truthy());
    }

    #[test]
    fn test_strict_equals() {
        assert!(Value::from(1).strict_equals(&Value::from(1.0)));
        assert!(!Value::from(1).strict_equals(&Value::from("1")));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
        assert!(Value::Empty.strict_equals(&Value::Empty));
        assert!(!Value::Empty.strict_equals(&Value::from("")));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(-0.0).to_string(), "0");
        assert_eq!(Value::Number(0.25).to_string(), "0.25");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::Number(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(Value::Boolean(false).to_string(), "false");
        assert_eq!(Value::Empty.to_string(), "");

        let d = NaiveDate::from_ymd_opt(2020, 5, 17)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(Value::Date(d).to_string(), "2020-05-17T00:00:00.000Z");
    }

    #[test]
    fn test_as_date() {
        assert!(Value::from("2020-05-17").as_date().is_some());
        assert!(Value::from("17").as_date().is_none());
        assert!(Value::Number(0.0).as_date().is_none());
    }

    #[test]
    fn test_error_value_parse() {
        assert_eq!(ErrorValue::parse("#DIV/0!"), Some(ErrorValue::Div0));
        assert_eq!(ErrorValue::parse("#n/a"), Some(ErrorValue::Na));
        assert_eq!(ErrorValue::parse("invalid"), None);
        assert_eq!(ErrorValue::Value.to_string(), "#VALUE!");
    }
}
