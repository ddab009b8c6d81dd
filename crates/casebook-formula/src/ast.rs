//! Formula Abstract Syntax Tree types
//!
//! Operator nodes carry the operator *symbol* as produced by the parser. Symbols are resolved to
//! [`BinaryOperator`] / [`UnaryOperator`] when a tree is evaluated or compiled, and an
//! unrecognized symbol fails at that point with a syntax error.

/// Deepest expression tree the parser, the code generator and the tree-walking evaluator accept
pub const MAX_DEPTH: usize = 100;

/// Formula expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    // === Literals ===
    /// Boolean literal
    Boolean(bool),
    /// Numeric literal
    Number(f64),
    /// String literal (already unescaped)
    String(String),

    // === References ===
    /// Variable reference, resolved through the context
    Variable(String),

    // === Function call ===
    Function { name: String, args: Vec<FormulaExpr> },

    // === Operators ===
    /// Unary operation
    UnaryOp { op: String, operand: Box<FormulaExpr> },
    /// Binary operation
    BinaryOp {
        op: String,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },
    /// `condition ? if_true : if_false`
    Conditional {
        condition: Box<FormulaExpr>,
        if_true: Box<FormulaExpr>,
        if_false: Box<FormulaExpr>,
    },
}

impl FormulaExpr {
    pub fn string<S: Into<String>>(s: S) -> Self {
        FormulaExpr::String(s.into())
    }

    pub fn variable<S: Into<String>>(name: S) -> Self {
        FormulaExpr::Variable(name.into())
    }

    pub fn call<S: Into<String>>(name: S, args: Vec<FormulaExpr>) -> Self {
        FormulaExpr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn unary<S: Into<String>>(op: S, operand: FormulaExpr) -> Self {
        FormulaExpr::UnaryOp {
            op: op.into(),
            operand: Box::new(operand),
        }
    }

    pub fn binary<S: Into<String>>(op: S, left: FormulaExpr, right: FormulaExpr) -> Self {
        FormulaExpr::BinaryOp {
            op: op.into(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn conditional(condition: FormulaExpr, if_true: FormulaExpr, if_false: FormulaExpr) -> Self {
        FormulaExpr::Conditional {
            condition: Box::new(condition),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    /// Whether this node is a binary operation (and needs parentheses when embedded)
    pub fn is_binary(&self) -> bool {
        matches!(self, FormulaExpr::BinaryOp { .. })
    }

    /// Number of nodes in the tree rooted here
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(expr) = pending.pop() {
            count += 1;
            expr.for_each_child(|child| pending.push(child));
        }
        count
    }

    /// Length of the longest root-to-leaf path; a single literal has depth 1
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 1)];
        while let Some((expr, level)) = pending.pop() {
            deepest = deepest.max(level);
            expr.for_each_child(|child| pending.push((child, level + 1)));
        }
        deepest
    }

    /// Visit the direct children in evaluation order
    pub fn for_each_child<'a>(&'a self, mut f: impl FnMut(&'a FormulaExpr)) {
        match self {
            FormulaExpr::Boolean(_)
            | FormulaExpr::Number(_)
            | FormulaExpr::String(_)
            | FormulaExpr::Variable(_) => {}
            FormulaExpr::Function { args, .. } => args.iter().for_each(f),
            FormulaExpr::UnaryOp { operand, .. } => f(operand.as_ref()),
            FormulaExpr::BinaryOp { left, right, .. } => {
                f(left.as_ref());
                f(right.as_ref());
            }
            FormulaExpr::Conditional {
                condition,
                if_true,
                if_false,
            } => {
                f(condition.as_ref());
                f(if_true.as_ref());
                f(if_false.as_ref());
            }
        }
    }

    /// Move the direct children out, leaving leaves behind
    fn take_children(&mut self, out: &mut Vec<FormulaExpr>) {
        fn take(boxed: &mut FormulaExpr, out: &mut Vec<FormulaExpr>) {
            out.push(std::mem::replace(boxed, FormulaExpr::Boolean(false)));
        }
        match self {
            FormulaExpr::Boolean(_)
            | FormulaExpr::Number(_)
            | FormulaExpr::String(_)
            | FormulaExpr::Variable(_) => {}
            FormulaExpr::Function { args, .. } => out.extend(args.drain(..)),
            FormulaExpr::UnaryOp { operand, .. } => take(operand, out),
            FormulaExpr::BinaryOp { left, right, .. } => {
                take(left, out);
                take(right, out);
            }
            FormulaExpr::Conditional {
                condition,
                if_true,
                if_false,
            } => {
                take(condition, out);
                take(if_true, out);
                take(if_false, out);
            }
        }
    }
}

// Trees built by hand can be far deeper than the parser allows
impl Drop for FormulaExpr {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        while let Some(mut expr) = pending.pop() {
            expr.take_children(&mut pending);
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Power,

    // Comparison
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Equality (no coercion)
    Equal,
    StrictEqual,
    NotEqual,
    StrictNotEqual,

    // Logical (short-circuit)
    And,
    Or,
}

impl BinaryOperator {
    /// Resolve an operator symbol
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Subtract,
            "*" => BinaryOperator::Multiply,
            "/" => BinaryOperator::Divide,
            "%" => BinaryOperator::Remainder,
            "^" => BinaryOperator::Power,
            "<" => BinaryOperator::LessThan,
            "<=" => BinaryOperator::LessEqual,
            ">" => BinaryOperator::GreaterThan,
            ">=" => BinaryOperator::GreaterEqual,
            "==" => BinaryOperator::Equal,
            "===" => BinaryOperator::StrictEqual,
            "!=" => BinaryOperator::NotEqual,
            "!==" => BinaryOperator::StrictNotEqual,
            "&&" => BinaryOperator::And,
            "||" => BinaryOperator::Or,
            _ => return None,
        })
    }

    /// The operator's source symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Remainder => "%",
            BinaryOperator::Power => "^",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Equal => "==",
            BinaryOperator::StrictEqual => "===",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::StrictNotEqual => "!==",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// `+x`, numeric coercion
    Plus,
    /// `-x`
    Negate,
    /// `!x`
    Not,
}

impl UnaryOperator {
    /// Resolve an operator symbol
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(UnaryOperator::Plus),
            "-" => Some(UnaryOperator::Negate),
            "!" => Some(UnaryOperator::Not),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOperator::Plus => "+",
            UnaryOperator::Negate => "-",
            UnaryOperator::Not => "!",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_symbols_round_trip() {
        for symbol in [
            "+", "-", "*", "/", "%", "^", "<", "<=", ">", ">=", "==", "===", "!=", "!==", "&&",
            "||",
        ] {
            let op = BinaryOperator::from_symbol(symbol).unwrap();
            assert_eq!(op.symbol(), symbol);
        }
        assert_eq!(BinaryOperator::from_symbol("<>"), None);
        assert_eq!(UnaryOperator::from_symbol("~"), None);
    }

    #[test]
    fn test_node_count() {
        let expr = FormulaExpr::conditional(
            FormulaExpr::Boolean(true),
            FormulaExpr::call("f", vec![FormulaExpr::Number(1.0), FormulaExpr::variable("x")]),
            FormulaExpr::unary("-", FormulaExpr::Number(2.0)),
        );
        assert_eq!(expr.node_count(), 7);
        assert_eq!(expr.depth(), 3);
        assert_eq!(FormulaExpr::Number(1.0).depth(), 1);
    }

    #[test]
    fn test_deep_tree_drops_without_recursion() {
        let mut expr = FormulaExpr::Number(0.0);
        for _ in 0..200_000 {
            expr = FormulaExpr::unary("-", expr);
        }
        assert_eq!(expr.depth(), 200_001);
        assert_eq!(expr.node_count(), 200_001);
        drop(expr);
    }
}
