//! Built-in functions

pub mod math;
pub mod statistical;

use crate::error::{FormulaError, FormulaResult};
use ahash::AHashMap;
use casebook_core::{parse_number, ErrorValue, Value};
use std::fmt;
use std::rc::Rc;

/// Function implementation signature
pub type FunctionImpl = Rc<dyn Fn(&[Value]) -> FormulaResult<Value>>;

/// Function definition
#[derive(Clone)]
pub struct FunctionDef {
    /// Function name as written in formulas
    pub name: String,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
    /// Reduces over a collection; arguments are compiled inside an aggregate scope
    pub aggregate: bool,
}

impl FunctionDef {
    pub fn new<S, F>(name: S, min_args: usize, max_args: Option<usize>, implementation: F) -> Self
    where
        S: Into<String>,
        F: Fn(&[Value]) -> FormulaResult<Value> + 'static,
    {
        Self {
            name: name.into(),
            min_args,
            max_args,
            implementation: Rc::new(implementation),
            aggregate: false,
        }
    }

    /// Mark as an aggregate function
    pub fn aggregate(mut self) -> Self {
        self.aggregate = true;
        self
    }

    /// Fail unless `count` arguments are acceptable
    pub fn check_arity(&self, count: usize) -> FormulaResult<()> {
        let too_few = count < self.min_args;
        let too_many = self.max_args.map_or(false, |max| count > max);
        if !too_few && !too_many {
            return Ok(());
        }

        let expected = match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        };
        Err(FormulaError::ArgumentCount {
            function: self.name.clone(),
            expected,
            actual: count,
        })
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("aggregate", &self.aggregate)
            .finish()
    }
}

/// Function registry
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: AHashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in functions
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register_math_functions();
        registry.register_statistical_functions();
        registry
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Register a function, replacing any previous definition with the same name
    pub fn register(&mut self, def: FunctionDef) -> Option<FunctionDef> {
        self.functions.insert(def.name.clone(), def)
    }

    fn register_math_functions(&mut self) {
        self.register(FunctionDef::new("abs", 1, Some(1), math::fn_abs));
        self.register(FunctionDef::new("round", 1, Some(2), math::fn_round));
        self.register(FunctionDef::new("sqrt", 1, Some(1), math::fn_sqrt));
        self.register(FunctionDef::new("min", 1, None, math::fn_min));
        self.register(FunctionDef::new("max", 1, None, math::fn_max));
    }

    fn register_statistical_functions(&mut self) {
        self.register(FunctionDef::new("sum", 1, None, statistical::fn_sum).aggregate());
        self.register(FunctionDef::new("mean", 1, None, statistical::fn_mean).aggregate());
        self.register(FunctionDef::new("count", 0, None, statistical::fn_count).aggregate());
    }
}

/// Numeric reading of a function argument: numbers and numeric strings
pub(crate) fn numeric_arg(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Single numeric argument; empty stays empty, errors pass through
pub(crate) fn unary_numeric(args: &[Value], f: impl Fn(f64) -> f64) -> FormulaResult<Value> {
    let Some(arg) = args.first() else {
        return Ok(Value::Empty);
    };
    if let Some(e) = arg.get_error() {
        return Ok(Value::Error(e));
    }
    if arg.is_empty() {
        return Ok(Value::Empty);
    }
    Ok(match numeric_arg(arg) {
        Some(n) => Value::Number(f(n)),
        None => Value::Error(ErrorValue::Value),
    })
}
