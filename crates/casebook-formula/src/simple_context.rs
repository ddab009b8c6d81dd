//! In-memory formula context
//!
//! [`SimpleContext`] keeps a table of named values and a [`FunctionRegistry`]. Within one
//! compilation every argument of an aggregate call opens a scope with a fresh index, and variables
//! compiled inside carry the indices of their enclosing scopes, outermost first.
//!
//! The indices only shape the generated code. A `SimpleContext` holds one value per name, so it
//! keeps the default [`FormulaContext::evaluate_scoped_variable`] and resolves every scope to that
//! value; hosts that iterate rows inside aggregates override it to pick the value per scope.

use crate::context::{EvalContext, FormulaContext, FunctionFrame};
use crate::error::{FormulaError, FormulaResult};
use crate::events::{ChangeEvent, EventChannel};
use crate::functions::{FunctionDef, FunctionRegistry};
use crate::script;
use ahash::AHashMap;
use casebook_core::Value;
use std::cell::RefCell;

#[derive(Debug, Default)]
struct AggregateScope {
    frames: Vec<Frame>,
    next_index: usize,
    /// Set while compiling when an aggregate call is emitted
    pending: bool,
    /// Result of the last completed compilation
    has_aggregates: bool,
}

#[derive(Debug)]
struct Frame {
    name: String,
    aggregate_index: Option<usize>,
}

/// Variables and functions held in memory
#[derive(Debug, Default)]
pub struct SimpleContext {
    variables: RefCell<AHashMap<String, Value>>,
    functions: RefCell<FunctionRegistry>,
    scope: RefCell<AggregateScope>,
    events: EventChannel<ChangeEvent>,
}

impl SimpleContext {
    /// Context with no variables and no functions
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with the built-in functions registered
    pub fn with_standard_functions() -> Self {
        Self {
            functions: RefCell::new(FunctionRegistry::standard()),
            ..Self::default()
        }
    }

    /// Builder-style [`set_variable`](Self::set_variable)
    pub fn with_variable<S: Into<String>, V: Into<Value>>(self, name: S, value: V) -> Self {
        self.set_variable(name, value);
        self
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.borrow().get(name).cloned()
    }

    /// Set a variable. A new name changes the namespace; a new value for a known name only changes
    /// dependents.
    pub fn set_variable<S: Into<String>, V: Into<Value>>(&self, name: S, value: V) {
        let name = name.into();
        let existed = self
            .variables
            .borrow_mut()
            .insert(name.clone(), value.into())
            .is_some();

        let event = if existed {
            ChangeEvent::DependentChanged { name: Some(name) }
        } else {
            ChangeEvent::NamespaceChanged { name }
        };
        tracing::debug!(?event, "variable set");
        self.events.notify(&event);
    }

    pub fn remove_variable(&self, name: &str) -> Option<Value> {
        let removed = self.variables.borrow_mut().remove(name);
        if removed.is_some() {
            self.events.notify(&ChangeEvent::NamespaceChanged { name: name.into() });
        }
        removed
    }

    /// Register a function; formulas compiled against this context are rebuilt
    pub fn register_function(&self, def: FunctionDef) {
        let name = def.name.clone();
        self.functions.borrow_mut().register(def);
        self.events.notify(&ChangeEvent::NamespaceChanged { name });
    }
}

impl FormulaContext for SimpleContext {
    fn evaluate_variable(&self, name: &str, eval: &EvalContext) -> FormulaResult<Value> {
        if let Some(value) = eval.get(name) {
            return Ok(value.clone());
        }
        self.variables
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| FormulaError::UnknownVariable(name.into()))
    }

    fn evaluate_function(&self, name: &str, args: Vec<Value>) -> FormulaResult<Value> {
        let implementation = {
            let functions = self.functions.borrow();
            let def = functions
                .get(name)
                .ok_or_else(|| FormulaError::UnknownFunction(name.into()))?;
            def.check_arity(args.len())?;
            def.implementation.clone()
        };
        implementation(&args)
    }

    fn compile_function(
        &self,
        name: &str,
        args: &[String],
        _aggregate_indices: &[usize],
    ) -> FormulaResult<String> {
        if self.is_aggregate(name) {
            self.scope.borrow_mut().pending = true;
        }
        Ok(script::call_fragment(name, args))
    }

    fn is_aggregate(&self, name: &str) -> bool {
        self.functions
            .borrow()
            .get(name)
            .map_or(false, |def| def.aggregate)
    }

    fn begin_function_context(&self, frame: &FunctionFrame<'_>) {
        let mut scope = self.scope.borrow_mut();
        let aggregate_index = frame.is_aggregate.then(|| {
            let index = scope.next_index;
            scope.next_index += 1;
            index
        });
        scope.frames.push(Frame {
            name: frame.name.to_string(),
            aggregate_index,
        });
    }

    fn end_function_context(&self, name: &str) {
        let mut scope = self.scope.borrow_mut();
        match scope.frames.pop() {
            Some(frame) if frame.name == name => {}
            other => tracing::warn!(
                expected = name,
                found = ?other.map(|frame| frame.name),
                "unbalanced function context"
            ),
        }
    }

    fn aggregate_function_indices(&self) -> Vec<usize> {
        self.scope
            .borrow()
            .frames
            .iter()
            .filter_map(|frame| frame.aggregate_index)
            .collect()
    }

    fn will_compile(&self) {
        let mut scope = self.scope.borrow_mut();
        scope.frames.clear();
        scope.next_index = 0;
        scope.pending = false;
    }

    fn did_compile(&self) {
        let mut scope = self.scope.borrow_mut();
        if !scope.frames.is_empty() {
            tracing::warn!(open = scope.frames.len(), "function contexts left open after compile");
            scope.frames.clear();
        }
    }

    fn complete_compile(&self) {
        let mut scope = self.scope.borrow_mut();
        scope.has_aggregates = scope.pending;
    }

    fn has_aggregates(&self) -> bool {
        self.scope.borrow().has_aggregates
    }

    fn events(&self) -> &EventChannel<ChangeEvent> {
        &self.events
    }
}
