//! Code generation
//!
//! Turns an expression tree into script text (see [`crate::script`]) and hands it to the context
//! to become a callable. Variable and function fragments come from the context so it can scope
//! them to the enclosing aggregate calls.

use crate::ast::{BinaryOperator, FormulaExpr, UnaryOperator, MAX_DEPTH};
use crate::context::{ContextFunction, EvalContext, FormulaContext, FunctionFrame};
use crate::error::{FormulaError, FormulaResult};
use crate::script;
use casebook_core::Value;
use std::fmt;

/// A formula compiled against a context
pub struct CompiledFormula {
    code: String,
    function: ContextFunction,
    has_aggregates: bool,
}

impl CompiledFormula {
    /// Generated script text
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Whether compilation referenced an aggregate function
    pub fn has_aggregates(&self) -> bool {
        self.has_aggregates
    }

    pub fn call(&self, ctx: &dyn FormulaContext, eval: &EvalContext) -> FormulaResult<Value> {
        (self.function)(ctx, eval)
    }
}

impl fmt::Debug for CompiledFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFormula")
            .field("code", &self.code)
            .field("has_aggregates", &self.has_aggregates)
            .finish()
    }
}

/// Generate code for `expr` and turn it into a callable through the context
pub fn compile(expr: &FormulaExpr, ctx: &dyn FormulaContext) -> FormulaResult<CompiledFormula> {
    let code = generate(expr, ctx)?;
    let function = ctx.create_context_function(&code)?;
    Ok(CompiledFormula {
        code,
        function,
        has_aggregates: ctx.has_aggregates(),
    })
}

/// Generate script text for an expression tree.
///
/// The context sees `will_compile` before the first fragment and `did_compile` followed by
/// `complete_compile` after the last one, also when generation fails. Trees deeper than
/// [`MAX_DEPTH`] fail with a syntax error.
pub fn generate(expr: &FormulaExpr, ctx: &dyn FormulaContext) -> FormulaResult<String> {
    ctx.will_compile();
    let _bracket = CompileBracket { ctx };

    if expr.depth() > MAX_DEPTH {
        return Err(FormulaError::too_deep());
    }

    let code = CodeGenerator { ctx }.visit(expr)?;
    tracing::trace!(%code, "generated formula code");
    Ok(code)
}

struct CompileBracket<'a> {
    ctx: &'a dyn FormulaContext,
}

impl Drop for CompileBracket<'_> {
    fn drop(&mut self) {
        self.ctx.did_compile();
        self.ctx.complete_compile();
    }
}

struct CodeGenerator<'a> {
    ctx: &'a dyn FormulaContext,
}

impl CodeGenerator<'_> {
    fn visit(&self, expr: &FormulaExpr) -> FormulaResult<String> {
        match expr {
            // === Literals ===
            FormulaExpr::Boolean(b) => Ok(b.to_string()),
            FormulaExpr::Number(n) => Ok(script::number_literal(*n)),
            FormulaExpr::String(s) => Ok(script::quote(s)),

            // === References ===
            FormulaExpr::Variable(name) => {
                let indices = self.ctx.aggregate_function_indices();
                self.ctx.compile_variable(name, &indices)
            }

            // === Functions ===
            FormulaExpr::Function { name, args } => self.visit_function(name, args),

            // === Operators ===
            FormulaExpr::UnaryOp { op, operand } => {
                let op = UnaryOperator::from_symbol(op)
                    .ok_or_else(|| FormulaError::unknown_operator(op))?;
                let operand = self.operand(operand)?;
                Ok(match op {
                    UnaryOperator::Plus => format!("plus({operand})"),
                    UnaryOperator::Negate => format!("negate({operand})"),
                    UnaryOperator::Not => format!("!{operand}"),
                })
            }

            FormulaExpr::BinaryOp { op, left, right } => {
                let op = BinaryOperator::from_symbol(op)
                    .ok_or_else(|| FormulaError::unknown_operator(op))?;
                let left = self.operand(left)?;
                let right = self.operand(right)?;
                Ok(binary_code(op, &left, &right))
            }

            FormulaExpr::Conditional {
                condition,
                if_true,
                if_false,
            } => Ok(format!(
                "({} ? {} : {})",
                self.visit(condition)?,
                self.visit(if_true)?,
                self.visit(if_false)?
            )),
        }
    }

    fn visit_function(&self, name: &str, args: &[FormulaExpr]) -> FormulaResult<String> {
        let frame = FunctionFrame {
            name,
            is_aggregate: self.ctx.is_aggregate(name),
        };

        let mut compiled = Vec::with_capacity(args.len());
        for arg in args {
            self.ctx.begin_function_context(&frame);
            let code = self.visit(arg);
            self.ctx.end_function_context(name);
            compiled.push(code?);
        }

        let indices = self.ctx.aggregate_function_indices();
        self.ctx.compile_function(name, &compiled, &indices)
    }

    /// Operand code, parenthesized when the operand is itself a binary operation
    fn operand(&self, expr: &FormulaExpr) -> FormulaResult<String> {
        let code = self.visit(expr)?;
        Ok(if expr.is_binary() {
            format!("({code})")
        } else {
            code
        })
    }
}

fn binary_code(op: BinaryOperator, left: &str, right: &str) -> String {
    let runtime_call = match op {
        BinaryOperator::Add => "add",
        BinaryOperator::Subtract => "subtract",
        BinaryOperator::LessThan => "less_than",
        BinaryOperator::LessEqual => "less_than_or_equal",
        BinaryOperator::GreaterThan => "greater_than",
        BinaryOperator::GreaterEqual => "greater_than_or_equal",
        BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Remainder
        | BinaryOperator::Power => {
            return format!(
                "binary_operator({}, {left}, {right})",
                script::quote(op.symbol())
            )
        }
        // equality and logical operators are native to the script
        _ => return format!("{left} {} {right}", op.symbol()),
    };
    format!("{runtime_call}({left}, {right})")
}
