//! Tree-walking evaluator
//!
//! Evaluates formula ASTs directly, without generating code.

use crate::ast::{BinaryOperator, FormulaExpr, UnaryOperator, MAX_DEPTH};
use crate::context::{EvalContext, FormulaContext};
use crate::error::{FormulaError, FormulaResult};
use crate::runtime;
use casebook_core::Value;

/// Evaluate a formula expression
///
/// Reaching a node deeper than [`MAX_DEPTH`] fails with a syntax error.
pub fn evaluate(
    expr: &FormulaExpr,
    ctx: &dyn FormulaContext,
    eval: &EvalContext,
) -> FormulaResult<Value> {
    evaluate_at(expr, 1, ctx, eval)
}

fn evaluate_at(
    expr: &FormulaExpr,
    depth: usize,
    ctx: &dyn FormulaContext,
    eval: &EvalContext,
) -> FormulaResult<Value> {
    if depth > MAX_DEPTH {
        return Err(FormulaError::too_deep());
    }
    let evaluate = |child: &FormulaExpr| evaluate_at(child, depth + 1, ctx, eval);

    match expr {
        // === Literals ===
        FormulaExpr::Boolean(b) => Ok(Value::Boolean(*b)),
        FormulaExpr::Number(n) => Ok(Value::Number(*n)),
        FormulaExpr::String(s) => Ok(Value::String(s.clone())),

        // === References ===
        FormulaExpr::Variable(name) => ctx.evaluate_variable(name, eval),

        // === Functions ===
        FormulaExpr::Function { name, args } => {
            let mut evaluated_args = Vec::with_capacity(args.len());
            for arg in args {
                evaluated_args.push(evaluate(arg)?);
            }
            ctx.evaluate_function(name, evaluated_args)
        }

        // === Operators ===
        FormulaExpr::UnaryOp { op, operand } => {
            let op = UnaryOperator::from_symbol(op)
                .ok_or_else(|| FormulaError::unknown_operator(op))?;
            let value = evaluate(operand)?;
            Ok(apply_unary(op, &value))
        }

        FormulaExpr::BinaryOp { op, left, right } => {
            let op = BinaryOperator::from_symbol(op)
                .ok_or_else(|| FormulaError::unknown_operator(op))?;
            evaluate_binary_op(op, left, right, evaluate)
        }

        FormulaExpr::Conditional {
            condition,
            if_true,
            if_false,
        } => {
            if evaluate(condition)?.is_truthy() {
                evaluate(if_true)
            } else {
                evaluate(if_false)
            }
        }
    }
}

/// Evaluate a binary operation; `&&` and `||` only evaluate the right side when needed
fn evaluate_binary_op(
    op: BinaryOperator,
    left: &FormulaExpr,
    right: &FormulaExpr,
    evaluate: impl Fn(&FormulaExpr) -> FormulaResult<Value>,
) -> FormulaResult<Value> {
    let left_val = evaluate(left)?;

    match op {
        BinaryOperator::And if !left_val.is_truthy() => Ok(left_val),
        BinaryOperator::Or if left_val.is_truthy() => Ok(left_val),
        BinaryOperator::And | BinaryOperator::Or => evaluate(right),
        _ => {
            let right_val = evaluate(right)?;
            apply_binary(op, &left_val, &right_val)
        }
    }
}

/// Apply a unary operator to an evaluated operand
pub(crate) fn apply_unary(op: UnaryOperator, value: &Value) -> Value {
    match op {
        UnaryOperator::Plus => runtime::plus(value),
        UnaryOperator::Negate => runtime::negate(value),
        UnaryOperator::Not => runtime::not(value),
    }
}

/// Apply a binary operator to two evaluated operands
pub(crate) fn apply_binary(op: BinaryOperator, left: &Value, right: &Value) -> FormulaResult<Value> {
    match op {
        BinaryOperator::Add => Ok(runtime::add(left, right)),
        BinaryOperator::Subtract => runtime::subtract(left, right),
        BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Remainder
        | BinaryOperator::Power => runtime::binary_operator(op.symbol(), left, right),
        BinaryOperator::LessThan => Ok(runtime::less_than(left, right)),
        BinaryOperator::LessEqual => Ok(runtime::less_than_or_equal(left, right)),
        BinaryOperator::GreaterThan => Ok(runtime::greater_than(left, right)),
        BinaryOperator::GreaterEqual => Ok(runtime::greater_than_or_equal(left, right)),
        BinaryOperator::Equal | BinaryOperator::StrictEqual => {
            Ok(runtime::strict_equals(left, right))
        }
        BinaryOperator::NotEqual | BinaryOperator::StrictNotEqual => {
            Ok(runtime::strict_not_equals(left, right))
        }
        BinaryOperator::And => Ok(if left.is_truthy() {
            right.clone()
        } else {
            left.clone()
        }),
        BinaryOperator::Or => Ok(if left.is_truthy() {
            left.clone()
        } else {
            right.clone()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionDef;
    use crate::parser::parse_expression;
    use crate::simple_context::SimpleContext;
    use casebook_core::ErrorValue;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::rc::Rc;

    fn eval(source: &str) -> FormulaResult<Value> {
        let ast = parse_expression(source).map_err(FormulaError::from)?;
        let ctx = SimpleContext::with_standard_functions();
        evaluate(&ast, &ctx, &EvalContext::new().with("x", 10).with("name", "Ada"))
    }

    #[test]
    fn test_evaluate_literals() {
        assert_eq!(eval("42").unwrap(), Value::Number(42.0));
        assert_eq!(eval("3.5").unwrap(), Value::Number(3.5));
        assert_eq!(eval("\"Hello\"").unwrap(), Value::string("Hello"));
        assert_eq!(eval("true").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_evaluate_arithmetic() {
        assert_eq!(eval("1+2").unwrap(), Value::Number(3.0));
        assert_eq!(eval("10-3").unwrap(), Value::Number(7.0));
        assert_eq!(eval("4*5").unwrap(), Value::Number(20.0));
        assert_eq!(eval("20/4").unwrap(), Value::Number(5.0));
        assert_eq!(eval("2^10").unwrap(), Value::Number(1024.0));
        assert_eq!(eval("7%4").unwrap(), Value::Number(3.0));
    }

    #[test]
    fn test_evaluate_precedence() {
        assert_eq!(eval("1+2*3").unwrap(), Value::Number(7.0));
        assert_eq!(eval("(1+2)*3").unwrap(), Value::Number(9.0));
        assert_eq!(eval("2+3*4-5").unwrap(), Value::Number(9.0));
    }

    #[test]
    fn test_evaluate_unary() {
        assert_eq!(eval("-5").unwrap(), Value::Number(-5.0));
        assert_eq!(eval("--5").unwrap(), Value::Number(5.0));
        assert_eq!(eval("+\"4\"").unwrap(), Value::Number(4.0));
        assert_eq!(eval("!0").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_unknown_unary_operator_is_syntax_error() {
        let ast = FormulaExpr::unary("~", FormulaExpr::Number(1.0));
        let ctx = SimpleContext::new();
        assert!(matches!(
            evaluate(&ast, &ctx, &EvalContext::new()),
            Err(FormulaError::Syntax(msg)) if msg.contains('~')
        ));
    }

    #[test]
    fn test_unknown_binary_operator_is_syntax_error() {
        let ast = FormulaExpr::binary("<>", FormulaExpr::Number(1.0), FormulaExpr::Number(2.0));
        let ctx = SimpleContext::new();
        assert!(matches!(
            evaluate(&ast, &ctx, &EvalContext::new()),
            Err(FormulaError::Syntax(msg)) if msg.contains("<>")
        ));
    }

    #[test]
    fn test_evaluate_comparison() {
        assert_eq!(eval("1<2").unwrap(), Value::Boolean(true));
        assert_eq!(eval("1>2").unwrap(), Value::Boolean(false));
        assert_eq!(eval("5<=5").unwrap(), Value::Boolean(true));
        assert_eq!(eval("5>=6").unwrap(), Value::Boolean(false));
        assert_eq!(eval("\"b\" > \"a\"").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_equality_does_not_coerce() {
        assert_eq!(eval("5==5").unwrap(), Value::Boolean(true));
        assert_eq!(eval("5=\"5\"").unwrap(), Value::Boolean(false));
        assert_eq!(eval("5!==\"5\"").unwrap(), Value::Boolean(true));
        assert_eq!(eval("name === \"Ada\"").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_logical_operators_return_operands() {
        assert_eq!(eval("0 || \"fallback\"").unwrap(), Value::string("fallback"));
        assert_eq!(eval("x && name").unwrap(), Value::string("Ada"));
        assert_eq!(eval("\"\" && undefinedName").unwrap(), Value::string(""));
        assert_eq!(eval("1 || undefinedName").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_evaluate_concatenation() {
        assert_eq!(eval("\"Hello \" + name").unwrap(), Value::string("Hello Ada"));
        assert_eq!(eval("\"Value: \" + 42").unwrap(), Value::string("Value: 42"));
    }

    #[test]
    fn test_evaluate_type_error() {
        assert_eq!(
            eval("\"a\" * \"b\""),
            Err(FormulaError::type_error("*"))
        );
        assert_eq!(
            eval("\"a\" - 1"),
            Err(FormulaError::type_error(runtime::MINUS_SIGN))
        );
    }

    #[test]
    fn test_evaluate_variables() {
        assert_eq!(eval("x * 2").unwrap(), Value::Number(20.0));
        assert_eq!(
            eval("missing + 1"),
            Err(FormulaError::UnknownVariable("missing".into()))
        );
    }

    #[test]
    fn test_evaluate_functions() {
        assert_eq!(eval("sum(1, 2, 3)").unwrap(), Value::Number(6.0));
        assert_eq!(eval("max(x, 2 * x)").unwrap(), Value::Number(20.0));
        assert_eq!(eval("round(abs(-2.5))").unwrap(), Value::Number(3.0));
        assert_eq!(
            eval("nope(1)"),
            Err(FormulaError::UnknownFunction("nope".into()))
        );
    }

    #[test]
    fn test_evaluate_conditional() {
        assert_eq!(eval("x > 5 ? \"big\" : \"small\"").unwrap(), Value::string("big"));
        assert_eq!(eval("x < 5 ? \"big\" : \"small\"").unwrap(), Value::string("small"));
        // the untaken branch is never evaluated
        assert_eq!(eval("true ? 1 : missing").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_conditional_runs_only_taken_branch() {
        let ctx = SimpleContext::new();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        ctx.register_function(FunctionDef::new("tick", 0, Some(0), move |_| {
            counter.set(counter.get() + 1);
            Ok(Value::Number(1.0))
        }));

        let ast = parse_expression("false ? tick() : 2").unwrap();
        assert_eq!(
            evaluate(&ast, &ctx, &EvalContext::new()).unwrap(),
            Value::Number(2.0)
        );
        assert_eq!(calls.get(), 0);

        let ast = parse_expression("true ? tick() : tick()").unwrap();
        evaluate(&ast, &ctx, &EvalContext::new()).unwrap();
        assert_eq!(calls.get(), 1);
    }

    fn negations(depth: usize) -> FormulaExpr {
        let mut expr = FormulaExpr::Number(1.0);
        for _ in 1..depth {
            expr = FormulaExpr::unary("-", expr);
        }
        expr
    }

    #[test]
    fn test_depth_limit() {
        let ctx = SimpleContext::new();
        let eval = EvalContext::new();

        let at_limit = negations(MAX_DEPTH);
        assert_eq!(at_limit.depth(), MAX_DEPTH);
        assert!(evaluate(&at_limit, &ctx, &eval).is_ok());

        assert_eq!(
            evaluate(&negations(10_000), &ctx, &eval),
            Err(FormulaError::Syntax(
                "Syntax error: the formula is nested too deeply".into()
            ))
        );
    }

    #[test]
    fn test_error_markers_flow_through() {
        let ctx = SimpleContext::new();
        ctx.register_function(FunctionDef::new("na", 0, Some(0), |_| {
            Ok(Value::Error(ErrorValue::Na))
        }));
        let ast = parse_expression("na() * 2 + 1").unwrap();
        assert_eq!(
            evaluate(&ast, &ctx, &EvalContext::new()).unwrap(),
            Value::Error(ErrorValue::Na)
        );
    }
}
