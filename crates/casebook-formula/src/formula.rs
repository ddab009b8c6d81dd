//! Formula facade
//!
//! A [`Formula`] owns a source string and lazily derives its parse tree and compiled form. Both are
//! cached until something invalidates them: a new source clears both, a new context or a namespace
//! change announced by the context clears only the compiled form. Notifications from the context
//! are forwarded to the formula's own [`events`](Formula::events) channel.

use crate::ast::FormulaExpr;
use crate::codegen::{self, CompiledFormula};
use crate::context::{EvalContext, FormulaContext};
use crate::dependency::References;
use crate::error::FormulaResult;
use crate::events::{ChangeEvent, EventChannel, Subscription};
use crate::evaluator;
use crate::parser::{DefaultParser, ExpressionParser};
use crate::postfix;
use crate::simple_context::SimpleContext;
use casebook_core::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// How [`Formula::run`] evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationStrategy {
    /// Generate code once, then call it
    #[default]
    Compiled,
    /// Walk the parse tree
    Direct,
    /// Run the flattened parse tree on a value stack
    Postfix,
}

/// Options for formula evaluation
#[derive(Debug, Clone, Default)]
pub struct FormulaOptions {
    /// Strategy used by [`Formula::run`]
    pub strategy: EvaluationStrategy,
}

type Cached<T> = RefCell<Option<FormulaResult<Option<Rc<T>>>>>;

/// State reachable from the context's listener
#[derive(Default)]
struct Shared {
    /// Set by namespace changes; the compiled form is dropped on the next read
    compile_stale: Cell<bool>,
    events: EventChannel<ChangeEvent>,
}

impl Shared {
    fn forward(&self, event: &ChangeEvent) {
        match event {
            ChangeEvent::NamespaceChanged { name } => {
                tracing::debug!(%name, "namespace changed, formula will recompile");
                self.compile_stale.set(true);
                self.events.notify(event);
                self.events
                    .notify(&ChangeEvent::DependentChanged { name: None });
            }
            ChangeEvent::DependentChanged { .. } => self.events.notify(event),
        }
    }
}

/// A formula with cached parse and compile results
pub struct Formula {
    source: String,
    parser: Rc<dyn ExpressionParser>,
    options: FormulaOptions,
    context: RefCell<Option<Rc<dyn FormulaContext>>>,
    subscription: RefCell<Option<Subscription>>,
    parsed: Cached<FormulaExpr>,
    compiled: Cached<CompiledFormula>,
    shared: Rc<Shared>,
}

impl Formula {
    /// Formula using the built-in grammar
    pub fn new<S: Into<String>>(source: S) -> Self {
        Self::with_parser(source, Rc::new(DefaultParser))
    }

    pub fn with_parser<S: Into<String>>(source: S, parser: Rc<dyn ExpressionParser>) -> Self {
        Self {
            source: source.into(),
            parser,
            options: FormulaOptions::default(),
            context: RefCell::new(None),
            subscription: RefCell::new(None),
            parsed: RefCell::new(None),
            compiled: RefCell::new(None),
            shared: Rc::new(Shared::default()),
        }
    }

    /// Builder-style [`set_context`](Self::set_context)
    pub fn with_context(mut self, context: Rc<dyn FormulaContext>) -> Self {
        self.set_context(Some(context));
        self
    }

    pub fn with_options(mut self, options: FormulaOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &FormulaOptions {
        &self.options
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Replace the source; the next read reparses
    pub fn set_source<S: Into<String>>(&mut self, source: S) {
        self.source = source.into();
        self.invalidate();
    }

    pub fn context(&self) -> Option<Rc<dyn FormulaContext>> {
        self.context.borrow().clone()
    }

    /// Attach a context (or detach with `None`); the next read recompiles
    pub fn set_context(&mut self, context: Option<Rc<dyn FormulaContext>>) {
        self.attach(context);
        self.invalidate_context();
    }

    /// Channel re-publishing the context's change notifications
    pub fn events(&self) -> &EventChannel<ChangeEvent> {
        &self.shared.events
    }

    /// Parse tree, or `None` when the source is blank.
    ///
    /// Parse failures are cached and returned again on every read until the source changes or
    /// [`invalidate`](Self::invalidate) is called.
    pub fn parsed(&self) -> FormulaResult<Option<Rc<FormulaExpr>>> {
        if let Some(cached) = self.parsed.borrow().as_ref() {
            return cached.clone();
        }
        let result = self.parse();
        *self.parsed.borrow_mut() = Some(result.clone());
        result
    }

    /// Compiled form, or `None` when the source is blank
    pub fn compiled(&self) -> FormulaResult<Option<Rc<CompiledFormula>>> {
        if self.shared.compile_stale.replace(false) {
            *self.compiled.borrow_mut() = None;
        }
        if let Some(cached) = self.compiled.borrow().as_ref() {
            return cached.clone();
        }
        let result = self.compile();
        *self.compiled.borrow_mut() = Some(result.clone());
        result
    }

    /// Whether the formula calls an aggregate function. Compiles if needed; a formula that fails
    /// to parse or compile has no aggregates.
    pub fn has_aggregates(&self) -> bool {
        match self.compiled() {
            Ok(compiled) => compiled.map_or(false, |c| c.has_aggregates()),
            Err(err) => {
                tracing::debug!(%err, "formula does not compile, reporting no aggregates");
                false
            }
        }
    }

    /// Evaluate through the compiled form. A blank formula evaluates to [`Value::Empty`].
    pub fn evaluate(&self, eval: &EvalContext) -> FormulaResult<Value> {
        let Some(compiled) = self.compiled()? else {
            return Ok(Value::Empty);
        };
        let context = self.ensure_context();
        compiled.call(context.as_ref(), eval)
    }

    /// Evaluate by walking the parse tree, without compiling
    pub fn evaluate_direct(&self, eval: &EvalContext) -> FormulaResult<Value> {
        let Some(expr) = self.parsed()? else {
            return Ok(Value::Empty);
        };
        let context = self.ensure_context();
        evaluator::evaluate(&expr, context.as_ref(), eval)
    }

    /// Evaluate by running the flattened parse tree
    pub fn evaluate_postfix(&self, eval: &EvalContext) -> FormulaResult<Value> {
        let Some(expr) = self.parsed()? else {
            return Ok(Value::Empty);
        };
        let context = self.ensure_context();
        postfix::evaluate(&expr, context.as_ref(), eval)
    }

    /// Evaluate with the configured [`EvaluationStrategy`]
    pub fn run(&self, eval: &EvalContext) -> FormulaResult<Value> {
        match self.options.strategy {
            EvaluationStrategy::Compiled => self.evaluate(eval),
            EvaluationStrategy::Direct => self.evaluate_direct(eval),
            EvaluationStrategy::Postfix => self.evaluate_postfix(eval),
        }
    }

    /// Names the formula refers to
    pub fn references(&self) -> FormulaResult<References> {
        Ok(self
            .parsed()?
            .map(|expr| References::collect(&expr))
            .unwrap_or_default())
    }

    /// Drop the parse tree and the compiled form
    pub fn invalidate(&self) {
        tracing::debug!(source = %self.source, "formula invalidated");
        *self.parsed.borrow_mut() = None;
        *self.compiled.borrow_mut() = None;
    }

    /// Drop the compiled form, keeping the parse tree
    pub fn invalidate_context(&self) {
        tracing::debug!(source = %self.source, "formula context invalidated");
        *self.compiled.borrow_mut() = None;
        self.shared.compile_stale.set(false);
    }

    fn parse(&self) -> FormulaResult<Option<Rc<FormulaExpr>>> {
        if self.source.trim().is_empty() {
            return Ok(None);
        }
        tracing::debug!(source = %self.source, "parsing formula");
        let expr = self.parser.parse(&self.source)?;
        Ok(Some(Rc::new(expr)))
    }

    fn compile(&self) -> FormulaResult<Option<Rc<CompiledFormula>>> {
        let Some(expr) = self.parsed()? else {
            return Ok(None);
        };
        let context = self.ensure_context();
        tracing::debug!(source = %self.source, "compiling formula");
        let compiled = codegen::compile(&expr, context.as_ref())?;
        Ok(Some(Rc::new(compiled)))
    }

    /// The attached context, creating an empty one on first use
    fn ensure_context(&self) -> Rc<dyn FormulaContext> {
        if let Some(context) = self.context.borrow().as_ref() {
            return Rc::clone(context);
        }
        tracing::debug!("attaching an empty default context");
        let context: Rc<dyn FormulaContext> = Rc::new(SimpleContext::new());
        self.attach(Some(Rc::clone(&context)));
        context
    }

    fn attach(&self, context: Option<Rc<dyn FormulaContext>>) {
        // unsubscribe from the previous context first
        drop(self.subscription.borrow_mut().take());

        let subscription = context.as_deref().map(|context| {
            let shared = Rc::downgrade(&self.shared);
            context.events().subscribe(move |event: &ChangeEvent| {
                if let Some(shared) = shared.upgrade() {
                    shared.forward(event);
                }
            })
        });
        *self.subscription.borrow_mut() = subscription;
        *self.context.borrow_mut() = context;
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula")
            .field("source", &self.source)
            .field("options", &self.options)
            .field("has_context", &self.context.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormulaError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_blank_source() {
        let formula = Formula::new("   ");
        assert_eq!(formula.parsed().unwrap(), None);
        assert!(formula.compiled().unwrap().is_none());
        assert_eq!(formula.evaluate(&EvalContext::new()).unwrap(), Value::Empty);
        assert_eq!(formula.evaluate_direct(&EvalContext::new()).unwrap(), Value::Empty);
        assert!(!formula.has_aggregates());
    }

    #[test]
    fn test_parse_error_is_cached_and_raised() {
        let formula = Formula::new("1 +");
        let first = formula.parsed().unwrap_err();
        assert!(matches!(first, FormulaError::Syntax(_)));
        assert_eq!(formula.parsed().unwrap_err(), first);
        assert_eq!(formula.evaluate(&EvalContext::new()).unwrap_err(), first);
        assert!(!formula.has_aggregates());
    }

    #[test]
    fn test_default_context_is_created_lazily() {
        let formula = Formula::new("1 + 2");
        assert!(formula.context().is_none());
        assert_eq!(formula.evaluate(&EvalContext::new()).unwrap(), Value::Number(3.0));
        assert!(formula.context().is_some());
    }

    #[test]
    fn test_run_dispatches_on_strategy() {
        let context: Rc<dyn FormulaContext> = Rc::new(SimpleContext::with_standard_functions());
        for strategy in [
            EvaluationStrategy::Compiled,
            EvaluationStrategy::Direct,
            EvaluationStrategy::Postfix,
        ] {
            let formula = Formula::new("max(x, 3) * 2")
                .with_context(Rc::clone(&context))
                .with_options(FormulaOptions { strategy });
            assert_eq!(
                formula.run(&EvalContext::new().with("x", 5)).unwrap(),
                Value::Number(10.0),
                "{strategy:?}"
            );
        }
    }

    #[test]
    fn test_set_source_reparses() {
        let mut formula = Formula::new("1");
        assert_eq!(formula.evaluate(&EvalContext::new()).unwrap(), Value::Number(1.0));
        formula.set_source("2");
        assert_eq!(formula.source(), "2");
        assert_eq!(formula.evaluate(&EvalContext::new()).unwrap(), Value::Number(2.0));
    }
}
