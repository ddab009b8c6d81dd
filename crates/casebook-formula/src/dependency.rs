//! Reference collection for formulas
//!
//! Lists the names a formula depends on so callers can tell which change notifications concern it.

use crate::ast::FormulaExpr;
use ahash::AHashSet;

/// Variable and function names referenced by an expression, in first-occurrence order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    variables: Vec<String>,
    functions: Vec<String>,
}

impl References {
    /// Walk a tree and collect its references
    pub fn collect(expr: &FormulaExpr) -> Self {
        let mut collector = Collector::default();
        collector.visit(expr);
        collector.references
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    /// Whether a change to `name` can affect the expression
    pub fn depends_on(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name) || self.functions.iter().any(|f| f == name)
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.functions.is_empty()
    }
}

#[derive(Default)]
struct Collector {
    references: References,
    seen_variables: AHashSet<String>,
    seen_functions: AHashSet<String>,
}

impl Collector {
    /// Pre-order walk, children left to right
    fn visit(&mut self, expr: &FormulaExpr) {
        let mut pending = vec![expr];
        while let Some(expr) = pending.pop() {
            match expr {
                FormulaExpr::Variable(name) => {
                    if self.seen_variables.insert(name.clone()) {
                        self.references.variables.push(name.clone());
                    }
                }
                FormulaExpr::Function { name, .. } => {
                    if self.seen_functions.insert(name.clone()) {
                        self.references.functions.push(name.clone());
                    }
                }
                _ => {}
            }

            let first_child = pending.len();
            expr.for_each_child(|child| pending.push(child));
            pending[first_child..].reverse();
        }
    }
}
