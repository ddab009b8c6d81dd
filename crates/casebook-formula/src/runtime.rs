//! Type-coercion runtime
//!
//! Pure operator implementations shared by every evaluation strategy. The rules differ from
//! plain numeric arithmetic:
//!
//! - Error markers in either operand are returned unchanged.
//! - A `NaN` operand makes the result `NaN`.
//! - Empty operands propagate as the empty string when the other side is empty or numeric.
//! - Dates take part in `+`, `-` and comparisons through their millisecond value, and are rejected
//!   by `*`, `/`, `%` and `^`.
//! - Anything else falls back to string concatenation (`+`), lexical comparison (`<`, `<=`), or a
//!   type error (`-`, `*`, `/`, `%`, `^`).

use crate::ast::BinaryOperator;
use crate::error::{FormulaError, FormulaResult};
use casebook_core::{date, parse_number, Value};

/// Operator symbol reported by subtraction type errors (U+2212 MINUS SIGN)
pub const MINUS_SIGN: &str = "\u{2212}";

/// Per-call classification of one operand
#[derive(Debug, Clone, Copy)]
struct Operand {
    is_empty: bool,
    is_date: bool,
    /// `NaN` when the operand is not numeric-interpretable
    number: f64,
}

impl Operand {
    fn is_numeric(&self) -> bool {
        !self.is_empty && !self.number.is_nan()
    }
}

fn classify(value: &Value) -> Operand {
    if value.is_empty() {
        return Operand {
            is_empty: true,
            is_date: false,
            number: f64::NAN,
        };
    }
    // whitespace is neither a number nor a date here
    if value.is_blank_string() {
        return Operand {
            is_empty: false,
            is_date: false,
            number: f64::NAN,
        };
    }

    let as_date = value.as_date();
    let number = match value {
        Value::Number(n) => *n,
        Value::Boolean(b) => f64::from(u8::from(*b)),
        Value::Date(d) => date::to_millis(d),
        Value::String(s) => parse_number(s)
            .or_else(|| as_date.as_ref().map(date::to_millis))
            .unwrap_or(f64::NAN),
        Value::Empty | Value::Error(_) => f64::NAN,
    };

    Operand {
        is_empty: false,
        is_date: as_date.is_some(),
        number,
    }
}

enum Classified {
    /// The operation's result is already decided (error marker or NaN)
    Settled(Value),
    Operands(Operand, Operand),
}

fn arithmetic_starter(a: &Value, b: &Value) -> Classified {
    if a.is_error() {
        return Classified::Settled(a.clone());
    }
    if b.is_error() {
        return Classified::Settled(b.clone());
    }
    if a.is_nan() || b.is_nan() {
        return Classified::Settled(Value::Number(f64::NAN));
    }
    Classified::Operands(classify(a), classify(b))
}

/// Both empty, or one empty and the other numeric
fn empty_result(a: &Operand, b: &Operand) -> Option<Value> {
    let both_empty = a.is_empty && b.is_empty;
    let empty_and_numeric = (a.is_empty && b.is_numeric()) || (b.is_empty && a.is_numeric());
    if both_empty || empty_and_numeric {
        Some(Value::string(""))
    } else {
        None
    }
}

fn arithmetic_finisher(a: &Operand, b: &Operand, operator: &str) -> FormulaResult<Value> {
    empty_result(a, b).ok_or_else(|| FormulaError::type_error(operator))
}

fn string_finisher(
    a: &Value,
    b: &Value,
    left: &Operand,
    right: &Operand,
    compare: fn(&str, &str) -> bool,
) -> Value {
    empty_result(left, right)
        .unwrap_or_else(|| Value::Boolean(compare(&a.to_string(), &b.to_string())))
}

/// Date constructed from a millisecond value; `NaN` stands in for an invalid date
fn date_from_millis(millis: f64) -> Value {
    date::from_millis(millis)
        .map(Value::Date)
        .unwrap_or(Value::Number(f64::NAN))
}

/// `a + b`
pub fn add(a: &Value, b: &Value) -> Value {
    let (left, right) = match arithmetic_starter(a, b) {
        Classified::Settled(v) => return v,
        Classified::Operands(l, r) => (l, r),
    };

    if left.is_numeric() && right.is_numeric() {
        let sum = left.number + right.number;
        return if left.is_date != right.is_date {
            date_from_millis(sum)
        } else {
            Value::Number(sum)
        };
    }
    if let Some(v) = empty_result(&left, &right) {
        return v;
    }
    if left.is_empty {
        return Value::String(b.to_string());
    }
    if right.is_empty {
        return Value::String(a.to_string());
    }
    Value::String(format!("{}{}", a, b))
}

/// `a - b`
///
/// A date minus a number is a date; a number minus a date is a type error.
pub fn subtract(a: &Value, b: &Value) -> FormulaResult<Value> {
    let (left, right) = match arithmetic_starter(a, b) {
        Classified::Settled(v) => return Ok(v),
        Classified::Operands(l, r) => (l, r),
    };

    if left.is_numeric() && right.is_numeric() {
        let difference = left.number - right.number;
        return match (left.is_date, right.is_date) {
            (true, false) => Ok(date_from_millis(difference)),
            (false, true) => Err(FormulaError::type_error(MINUS_SIGN)),
            _ => Ok(Value::Number(difference)),
        };
    }
    arithmetic_finisher(&left, &right, MINUS_SIGN)
}

/// `a < b`
pub fn less_than(a: &Value, b: &Value) -> Value {
    compare(a, b, |l, r| l < r, |l, r| l < r)
}

/// `a <= b`
pub fn less_than_or_equal(a: &Value, b: &Value) -> Value {
    compare(a, b, |l, r| l <= r, |l, r| l <= r)
}

/// `a > b`, implemented as `b < a`
pub fn greater_than(a: &Value, b: &Value) -> Value {
    less_than(b, a)
}

/// `a >= b`, implemented as `b <= a`
pub fn greater_than_or_equal(a: &Value, b: &Value) -> Value {
    less_than_or_equal(b, a)
}

fn compare(
    a: &Value,
    b: &Value,
    numeric: fn(f64, f64) -> bool,
    lexical: fn(&str, &str) -> bool,
) -> Value {
    let (left, right) = match arithmetic_starter(a, b) {
        Classified::Settled(v) => return v,
        Classified::Operands(l, r) => (l, r),
    };

    if left.is_numeric() && right.is_numeric() {
        return Value::Boolean(numeric(left.number, right.number));
    }
    string_finisher(a, b, &left, &right, lexical)
}

/// Generic dispatcher for `*`, `/`, `%` and `^`.
///
/// Dates are rejected before any other check. This path coerces with the host's loose numeric
/// conversion, so whitespace-only strings count as 0 here.
pub fn binary_operator(symbol: &str, a: &Value, b: &Value) -> FormulaResult<Value> {
    let op = match BinaryOperator::from_symbol(symbol) {
        Some(
            op @ (BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Remainder
            | BinaryOperator::Power),
        ) => op,
        _ => return Err(FormulaError::unknown_operator(symbol)),
    };

    if a.as_date().is_some() || b.as_date().is_some() {
        return Err(FormulaError::type_error(symbol));
    }
    if a.is_error() {
        return Ok(a.clone());
    }
    if b.is_error() {
        return Ok(b.clone());
    }
    if a.is_nan() || b.is_nan() {
        return Ok(Value::Number(f64::NAN));
    }

    let left = loose_operand(a);
    let right = loose_operand(b);
    if left.is_numeric() && right.is_numeric() {
        let (l, r) = (left.number, right.number);
        let result = match op {
            BinaryOperator::Multiply => l * r,
            BinaryOperator::Divide => l / r,
            BinaryOperator::Remainder => l % r,
            _ => l.powf(r),
        };
        return Ok(Value::Number(result));
    }
    arithmetic_finisher(&left, &right, symbol)
}

fn loose_operand(value: &Value) -> Operand {
    let is_empty = value.is_empty();
    Operand {
        is_empty,
        is_date: false,
        number: if is_empty { f64::NAN } else { value.to_number() },
    }
}

/// `+a`
pub fn plus(a: &Value) -> Value {
    if a.is_error() {
        return a.clone();
    }
    Value::Number(a.to_number())
}

/// `-a`
pub fn negate(a: &Value) -> Value {
    if a.is_error() {
        return a.clone();
    }
    Value::Number(-a.to_number())
}

/// `!a`
pub fn not(a: &Value) -> Value {
    Value::Boolean(!a.is_truthy())
}

/// `a == b` / `a === b` (no coercion)
pub fn strict_equals(a: &Value, b: &Value) -> Value {
    Value::Boolean(a.strict_equals(b))
}

/// `a != b` / `a !== b`
pub fn strict_not_equals(a: &Value, b: &Value) -> Value {
    Value::Boolean(!a.strict_equals(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use casebook_core::ErrorValue;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn empty() -> Value {
        Value::string("")
    }

    fn day(y: i32, m: u32, d: u32) -> Value {
        Value::Date(
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    fn is_nan(v: &Value) -> bool {
        v.is_nan()
    }

    #[test]
    fn test_add_numbers_and_strings() {
        assert_eq!(add(&1.into(), &"2".into()), Value::Number(3.0));
        assert_eq!(add(&"a".into(), &"b".into()), Value::string("ab"));
        assert_eq!(add(&"".into(), &"x".into()), Value::string("x"));
        assert_eq!(add(&"x".into(), &Value::Empty), Value::string("x"));
        assert_eq!(add(&"".into(), &"".into()), empty());
        assert_eq!(add(&true.into(), &1.into()), Value::Number(2.0));
        assert_eq!(add(&"a".into(), &1.into()), Value::string("a1"));
    }

    #[test]
    fn test_whitespace_is_not_numeric() {
        assert_eq!(add(&"  ".into(), &1.into()), Value::string("  1"));
        assert_eq!(
            less_than(&" ".into(), &1.into()),
            Value::Boolean(" " < "1")
        );
    }

    #[test]
    fn test_empty_dominates_numbers() {
        for empty_value in [Value::Empty, empty()] {
            assert_eq!(add(&empty_value, &5.into()), empty());
            assert_eq!(add(&5.into(), &empty_value), empty());
            assert_eq!(subtract(&empty_value, &5.into()).unwrap(), empty());
            assert_eq!(less_than(&empty_value, &5.into()), empty());
            assert_eq!(less_than_or_equal(&5.into(), &empty_value), empty());
            assert_eq!(binary_operator("*", &empty_value, &5.into()).unwrap(), empty());
            assert_eq!(binary_operator("^", &5.into(), &empty_value).unwrap(), empty());
        }
    }

    #[test]
    fn test_both_empty_never_fails() {
        let pairs = [
            (Value::Empty, Value::Empty),
            (Value::Empty, empty()),
            (empty(), empty()),
        ];
        for (a, b) in pairs {
            assert_eq!(add(&a, &b), empty());
            assert_eq!(subtract(&a, &b).unwrap(), empty());
            assert_eq!(less_than(&a, &b), empty());
            assert_eq!(less_than_or_equal(&a, &b), empty());
            assert_eq!(binary_operator("/", &a, &b).unwrap(), empty());
        }
    }

    #[test]
    fn test_add_dates() {
        assert_eq!(add(&day(2024, 1, 1), &86_400_000.into()), day(2024, 1, 2));
        assert_eq!(add(&86_400_000.into(), &day(2024, 1, 1)), day(2024, 1, 2));
        assert_eq!(
            add(&"2024-01-01".into(), &86_400_000.into()),
            day(2024, 1, 2)
        );
        // two dates add as plain numbers
        assert!(matches!(
            add(&day(1970, 1, 2), &day(1970, 1, 2)),
            Value::Number(n) if n == 172_800_000.0
        ));
    }

    #[test]
    fn test_subtract() {
        assert_eq!(subtract(&10.into(), &"4".into()).unwrap(), Value::Number(6.0));
        assert_eq!(
            subtract(&day(1970, 1, 1), &5.into()).unwrap(),
            Value::Date(
                NaiveDate::from_ymd_opt(1969, 12, 31)
                    .unwrap()
                    .and_hms_milli_opt(23, 59, 59, 995)
                    .unwrap()
            )
        );
        assert_eq!(
            subtract(&day(2024, 1, 2), &day(2024, 1, 1)).unwrap(),
            Value::Number(86_400_000.0)
        );
    }

    #[test]
    fn test_subtract_type_errors() {
        assert_eq!(
            subtract(&5.into(), &day(2024, 1, 1)),
            Err(FormulaError::type_error(MINUS_SIGN))
        );
        assert_eq!(
            subtract(&"a".into(), &1.into()),
            Err(FormulaError::type_error("\u{2212}"))
        );
        assert_eq!(
            subtract(&"".into(), &"a".into()),
            Err(FormulaError::type_error(MINUS_SIGN))
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(less_than(&1.into(), &"2".into()), Value::Boolean(true));
        assert_eq!(less_than_or_equal(&2.into(), &2.into()), Value::Boolean(true));
        assert_eq!(less_than(&"apple".into(), &"banana".into()), Value::Boolean(true));
        // "10" and "9" are both numeric
        assert_eq!(less_than(&"10".into(), &"9".into()), Value::Boolean(false));
        assert_eq!(less_than(&"b".into(), &"a".into()), Value::Boolean(false));
        assert_eq!(greater_than(&2.into(), &1.into()), Value::Boolean(true));
        assert_eq!(greater_than_or_equal(&1.into(), &2.into()), Value::Boolean(false));
        assert_eq!(less_than(&day(2020, 1, 1), &day(2021, 1, 1)), Value::Boolean(true));
    }

    #[test]
    fn test_nan_propagates() {
        let nan = Value::Number(f64::NAN);
        assert!(is_nan(&less_than(&nan, &5.into())));
        assert!(is_nan(&add(&nan, &"x".into())));
        assert!(is_nan(&add(&Value::Empty, &nan)));
        assert!(is_nan(&subtract(&nan, &Value::Empty).unwrap()));
        assert!(is_nan(&binary_operator("*", &nan, &"x".into()).unwrap()));
    }

    #[test]
    fn test_error_markers_propagate() {
        let marker = Value::Error(ErrorValue::Na);
        assert_eq!(add(&marker, &1.into()), marker);
        assert_eq!(subtract(&1.into(), &marker).unwrap(), marker);
        assert_eq!(less_than(&marker, &Value::Number(f64::NAN)), marker);
        assert_eq!(binary_operator("%", &1.into(), &marker).unwrap(), marker);
    }

    #[test]
    fn test_binary_operator_arithmetic() {
        assert_eq!(binary_operator("*", &3.into(), &"4".into()).unwrap(), Value::Number(12.0));
        assert_eq!(binary_operator("/", &1.into(), &4.into()).unwrap(), Value::Number(0.25));
        assert_eq!(binary_operator("%", &7.into(), &3.into()).unwrap(), Value::Number(1.0));
        assert_eq!(binary_operator("^", &2.into(), &10.into()).unwrap(), Value::Number(1024.0));
        assert_eq!(
            binary_operator("/", &1.into(), &0.into()).unwrap(),
            Value::Number(f64::INFINITY)
        );
        // the loose coercion treats whitespace as zero
        assert_eq!(binary_operator("*", &"  ".into(), &2.into()).unwrap(), Value::Number(0.0));
    }

    #[test]
    fn test_binary_operator_rejects_dates() {
        assert_eq!(
            binary_operator("*", &day(2024, 1, 1), &2.into()),
            Err(FormulaError::type_error("*"))
        );
        assert_eq!(
            binary_operator("/", &2.into(), &"2024-01-01".into()),
            Err(FormulaError::type_error("/"))
        );
        // the date check comes before empty handling
        assert_eq!(
            binary_operator("^", &day(2024, 1, 1), &Value::Empty),
            Err(FormulaError::type_error("^"))
        );
    }

    #[test]
    fn test_binary_operator_type_errors() {
        assert_eq!(
            binary_operator("*", &"a".into(), &"b".into()),
            Err(FormulaError::type_error("*"))
        );
        assert_eq!(
            binary_operator("%", &Value::Empty, &"b".into()),
            Err(FormulaError::type_error("%"))
        );
    }

    #[test]
    fn test_binary_operator_unknown_symbol() {
        assert!(matches!(
            binary_operator("+", &1.into(), &2.into()),
            Err(FormulaError::Syntax(msg)) if msg.contains('+')
        ));
        assert!(matches!(
            binary_operator("**", &1.into(), &2.into()),
            Err(FormulaError::Syntax(_))
        ));
    }

    #[test]
    fn test_unary_helpers() {
        assert_eq!(plus(&"3".into()), Value::Number(3.0));
        assert_eq!(plus(&Value::Empty), Value::Number(0.0));
        assert_eq!(negate(&true.into()), Value::Number(-1.0));
        assert!(is_nan(&negate(&"x".into())));
        assert_eq!(not(&"".into()), Value::Boolean(true));
        assert_eq!(not(&1.into()), Value::Boolean(false));
        let marker = Value::Error(ErrorValue::Value);
        assert_eq!(negate(&marker), marker);
    }

    #[test]
    fn test_strict_equality() {
        assert_eq!(strict_equals(&1.into(), &"1".into()), Value::Boolean(false));
        assert_eq!(strict_equals(&"a".into(), &"a".into()), Value::Boolean(true));
        assert_eq!(strict_not_equals(&1.into(), &2.into()), Value::Boolean(true));
    }
}
