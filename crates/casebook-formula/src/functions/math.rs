//! Math functions

use super::{numeric_arg, unary_numeric};
use crate::error::FormulaResult;
use casebook_core::{ErrorValue, Value};

/// ABS function
pub fn fn_abs(args: &[Value]) -> FormulaResult<Value> {
    unary_numeric(args, f64::abs)
}

/// SQRT function
pub fn fn_sqrt(args: &[Value]) -> FormulaResult<Value> {
    unary_numeric(args, f64::sqrt)
}

/// ROUND function: half away from zero, optional number of decimal places
pub fn fn_round(args: &[Value]) -> FormulaResult<Value> {
    let digits = match args.get(1) {
        None => 0.0,
        Some(Value::Error(e)) => return Ok(Value::Error(*e)),
        Some(arg) => match numeric_arg(arg) {
            Some(d) => d.trunc(),
            None => return Ok(Value::Error(ErrorValue::Value)),
        },
    };

    let factor = 10f64.powf(digits);
    unary_numeric(args, |n| (n * factor).round() / factor)
}

/// MIN function
pub fn fn_min(args: &[Value]) -> FormulaResult<Value> {
    extreme(args, f64::min)
}

/// MAX function
pub fn fn_max(args: &[Value]) -> FormulaResult<Value> {
    extreme(args, f64::max)
}

fn extreme(args: &[Value], pick: fn(f64, f64) -> f64) -> FormulaResult<Value> {
    let mut best: Option<f64> = None;

    for arg in args {
        if let Some(e) = arg.get_error() {
            return Ok(Value::Error(e));
        }
        if let Some(n) = numeric_arg(arg) {
            best = Some(best.map_or(n, |b| pick(b, n)));
        }
    }

    Ok(best.map_or(Value::Empty, Value::Number))
}
