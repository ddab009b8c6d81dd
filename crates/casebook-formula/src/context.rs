//! Formula context capability
//!
//! A [`FormulaContext`] resolves variables and functions for the evaluators, supplies code
//! fragments to the code generator, tracks aggregate-function scope during compilation, and
//! announces namespace changes to attached formulas.

use crate::error::FormulaResult;
use crate::events::{ChangeEvent, EventChannel};
use crate::script;
use ahash::AHashMap;
use casebook_core::Value;
use std::rc::Rc;

/// Compiled artifact: generated code wrapped into a callable
pub type ContextFunction = Rc<dyn Fn(&dyn FormulaContext, &EvalContext) -> FormulaResult<Value>>;

/// Per-evaluation state: variable bindings that apply to a single call
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    bindings: AHashMap<String, Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style binding
    pub fn with<S: Into<String>, V: Into<Value>>(mut self, name: S, value: V) -> Self {
        self.bind(name, value);
        self
    }

    pub fn bind<S: Into<String>, V: Into<Value>>(&mut self, name: S, value: V) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// Function-call frame announced to the context while its arguments are compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionFrame<'a> {
    pub name: &'a str,
    pub is_aggregate: bool,
}

/// Name resolution, code fragments and compilation bookkeeping for formulas.
///
/// Only [`evaluate_variable`](Self::evaluate_variable),
/// [`evaluate_function`](Self::evaluate_function) and [`events`](Self::events) are required. The
/// compile-side defaults emit fragments understood by [`script::load`], which is also the default
/// [`create_context_function`](Self::create_context_function).
pub trait FormulaContext {
    /// Value of a variable for one evaluation
    fn evaluate_variable(&self, name: &str, eval: &EvalContext) -> FormulaResult<Value>;

    /// Value of a variable referenced inside the given enclosing aggregate calls.
    ///
    /// Compiled formulas resolve variables through this method. `aggregate_indices` are the ones
    /// this context handed out while compiling; they let a host resolve a name per aggregate
    /// scope, such as the current row of each enclosing `sum`. The default ignores the scope.
    fn evaluate_scoped_variable(
        &self,
        name: &str,
        _aggregate_indices: &[usize],
        eval: &EvalContext,
    ) -> FormulaResult<Value> {
        self.evaluate_variable(name, eval)
    }

    /// Call a function with already evaluated arguments
    fn evaluate_function(&self, name: &str, args: Vec<Value>) -> FormulaResult<Value>;

    /// Code fragment that reads a variable at call time
    fn compile_variable(&self, name: &str, aggregate_indices: &[usize]) -> FormulaResult<String> {
        Ok(script::variable_fragment(name, aggregate_indices))
    }

    /// Code fragment that calls a function with compiled argument fragments
    fn compile_function(
        &self,
        name: &str,
        args: &[String],
        _aggregate_indices: &[usize],
    ) -> FormulaResult<String> {
        Ok(script::call_fragment(name, args))
    }

    fn is_aggregate(&self, _name: &str) -> bool {
        false
    }

    fn begin_function_context(&self, _frame: &FunctionFrame<'_>) {}

    fn end_function_context(&self, _name: &str) {}

    /// Indices of the aggregate calls enclosing the current compilation point, outermost first
    fn aggregate_function_indices(&self) -> Vec<usize> {
        Vec::new()
    }

    fn will_compile(&self) {}

    fn did_compile(&self) {}

    fn complete_compile(&self) {}

    /// Whether the last compilation referenced an aggregate function
    fn has_aggregates(&self) -> bool {
        false
    }

    /// Channel announcing namespace and dependent changes
    fn events(&self) -> &EventChannel<ChangeEvent>;

    /// Wrap generated code into an invocable unit
    fn create_context_function(&self, code: &str) -> FormulaResult<ContextFunction> {
        script::load(code)
    }
}
