//! # casebook-formula
//!
//! Formula engine for casebook computed columns.
//!
//! This crate provides:
//! - Formula parsing (text → AST)
//! - Three interchangeable evaluation strategies: tree walking, code generation, postfix
//! - The coercion runtime shared by all of them
//! - A [`Formula`] facade that caches parse and compile results and tracks context changes
//!
//! ## Example
//!
//! ```rust
//! use casebook_formula::{EvalContext, Formula, SimpleContext};
//! use casebook_core::Value;
//! use std::rc::Rc;
//!
//! let context = Rc::new(SimpleContext::with_standard_functions().with_variable("price", 4));
//! let formula = Formula::new("max(price, 10) * 2").with_context(context);
//!
//! assert_eq!(formula.evaluate(&EvalContext::new()).unwrap(), Value::Number(20.0));
//! assert_eq!(
//!     formula.evaluate(&EvalContext::new().with("price", 12)).unwrap(),
//!     Value::Number(24.0)
//! );
//! ```

pub mod ast;
pub mod codegen;
pub mod context;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod formula;
pub mod functions;
pub mod messages;
pub mod parser;
pub mod postfix;
pub mod runtime;
pub mod script;
pub mod simple_context;

pub use ast::{BinaryOperator, FormulaExpr, UnaryOperator, MAX_DEPTH};
pub use codegen::CompiledFormula;
pub use context::{ContextFunction, EvalContext, FormulaContext, FunctionFrame};
pub use dependency::References;
pub use error::{FormulaError, FormulaResult, ParseError, ParseErrorKind};
pub use evaluator::evaluate;
pub use events::{ChangeEvent, EventChannel, Subscription};
pub use formula::{EvaluationStrategy, Formula, FormulaOptions};
pub use functions::{FunctionDef, FunctionRegistry};
pub use parser::{parse_expression, DefaultParser, ExpressionParser};
pub use simple_context::SimpleContext;
