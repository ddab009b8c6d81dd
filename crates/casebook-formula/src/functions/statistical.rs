//! Aggregate functions
//!
//! Each call reduces its own argument list; errors short-circuit and non-numeric values are
//! skipped.

use super::numeric_arg;
use crate::error::FormulaResult;
use casebook_core::{ErrorValue, Value};

/// Numeric values among the arguments, or the first error marker
fn numbers(args: &[Value]) -> Result<Vec<f64>, ErrorValue> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        if let Some(e) = arg.get_error() {
            return Err(e);
        }
        if let Some(n) = numeric_arg(arg) {
            values.push(n);
        }
    }
    Ok(values)
}

/// SUM function
pub fn fn_sum(args: &[Value]) -> FormulaResult<Value> {
    Ok(match numbers(args) {
        Ok(values) => Value::Number(values.iter().sum()),
        Err(e) => Value::Error(e),
    })
}

/// MEAN function
pub fn fn_mean(args: &[Value]) -> FormulaResult<Value> {
    Ok(match numbers(args) {
        Ok(values) if values.is_empty() => Value::Empty,
        Ok(values) => Value::Number(values.iter().sum::<f64>() / values.len() as f64),
        Err(e) => Value::Error(e),
    })
}

/// COUNT function: number of non-empty arguments
pub fn fn_count(args: &[Value]) -> FormulaResult<Value> {
    let count = args.iter().filter(|arg| !arg.is_empty()).count();
    Ok(Value::Number(count as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sum() {
        let args = [Value::Number(1.0), Value::string("2"), Value::string("n/a"), Value::Empty];
        assert_eq!(fn_sum(&args).unwrap(), Value::Number(3.0));
        assert_eq!(
            fn_sum(&[Value::Number(1.0), Value::Error(ErrorValue::Div0)]).unwrap(),
            Value::Error(ErrorValue::Div0)
        );
    }

    #[test]
    fn test_mean() {
        let args = [Value::Number(1.0), Value::Number(2.0), Value::Number(6.0)];
        assert_eq!(fn_mean(&args).unwrap(), Value::Number(3.0));
        assert_eq!(fn_mean(&[Value::string("x")]).unwrap(), Value::Empty);
    }

    #[test]
    fn test_count() {
        let args = [Value::Number(1.0), Value::Empty, Value::string(""), Value::string("a")];
        assert_eq!(fn_count(&args).unwrap(), Value::Number(2.0));
        assert_eq!(fn_count(&[]).unwrap(), Value::Number(0.0));
    }
}
