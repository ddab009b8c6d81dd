//! Formula error types

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur during formula parsing, compilation or evaluation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// Malformed source text or an unrecognized operator symbol; the message is localized
    #[error("{0}")]
    Syntax(String),

    /// Operator applied to operands with no valid coercion
    #[error("Type error: invalid operands for '{operator}'")]
    Type { operator: String },

    /// Variable not known to the context
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// Function not known to the context
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Any other evaluation failure reported by a context or function
    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

impl FormulaError {
    pub fn type_error<S: Into<String>>(operator: S) -> Self {
        FormulaError::Type {
            operator: operator.into(),
        }
    }

    pub fn unknown_operator(operator: &str) -> Self {
        FormulaError::Syntax(crate::messages::translate(
            "formula.syntax.operator",
            &[operator],
        ))
    }

    /// An expression tree nests deeper than [`MAX_DEPTH`](crate::ast::MAX_DEPTH)
    pub fn too_deep() -> Self {
        FormulaError::Syntax(crate::messages::translate("formula.syntax.depth", &[]))
    }
}

/// Diagnostic produced by an expression parser
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at offset {offset}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Byte offset into the source where the problem was detected
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    /// A specific token was found where it was not allowed
    #[error("expected {options}, found '{found}'", options = .expected.join(" or "))]
    UnexpectedToken { found: String, expected: Vec<String> },

    /// Input ended early
    #[error("expected {options}, found end of input", options = .expected.join(" or "))]
    UnexpectedEnd { expected: Vec<String> },

    /// Sub-expressions nest deeper than the engine evaluates
    #[error("expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },
}

impl ParseError {
    pub fn unexpected_token<S: Into<String>>(found: S, expected: Vec<String>, offset: usize) -> Self {
        ParseError {
            kind: ParseErrorKind::UnexpectedToken {
                found: found.into(),
                expected,
            },
            offset,
        }
    }

    pub fn unexpected_end(expected: Vec<String>, offset: usize) -> Self {
        ParseError {
            kind: ParseErrorKind::UnexpectedEnd { expected },
            offset,
        }
    }

    pub fn too_deep(offset: usize) -> Self {
        ParseError {
            kind: ParseErrorKind::TooDeep {
                limit: crate::ast::MAX_DEPTH,
            },
            offset,
        }
    }
}

impl From<ParseError> for FormulaError {
    /// Wrap a parser diagnostic with a localized message keyed on the kind of diagnostic
    fn from(err: ParseError) -> Self {
        let message = match &err.kind {
            ParseErrorKind::UnexpectedToken { found, .. } => {
                crate::messages::translate("formula.syntax.found", &[found.as_str()])
            }
            ParseErrorKind::UnexpectedEnd { .. } => {
                crate::messages::translate("formula.syntax.end", &[])
            }
            ParseErrorKind::TooDeep { .. } => {
                crate::messages::translate("formula.syntax.depth", &[])
            }
        };
        FormulaError::Syntax(message)
    }
}
