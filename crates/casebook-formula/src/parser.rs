//! Formula parser
//!
//! A recursive descent parser for formula expressions with proper operator precedence. The
//! formula facade only depends on the [`ExpressionParser`] trait; [`DefaultParser`] is the
//! implementation used when no other parser is supplied.

use crate::ast::{BinaryOperator, FormulaExpr, MAX_DEPTH};
use crate::error::ParseError;

/// Turns formula source text into an expression tree
pub trait ExpressionParser {
    fn parse(&self, source: &str) -> Result<FormulaExpr, ParseError>;
}

/// The built-in formula grammar
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParser;

impl ExpressionParser for DefaultParser {
    fn parse(&self, source: &str) -> Result<FormulaExpr, ParseError> {
        parse_expression(source)
    }
}

/// Parse a formula string into an AST
///
/// # Example
/// ```rust
/// use casebook_formula::parse_expression;
///
/// let ast = parse_expression("1 + 2").unwrap();
/// let ast = parse_expression("sum(`Sale Price`) / count(x)").unwrap();
/// let ast = parse_expression("x > 0 ? \"pos\" : 'neg'").unwrap();
/// ```
///
/// Trees deeper than [`MAX_DEPTH`] are rejected, including long operator chains such as a sum
/// of thousands of terms.
pub fn parse_expression(source: &str) -> Result<FormulaExpr, ParseError> {
    let mut parser = FormulaParser::new(source)?;
    let expr = parser.parse_conditional()?;

    // Make sure we consumed all input
    if parser.current != Token::Eof {
        return Err(parser.unexpected(&["end of input"]));
    }

    // Operator chains are built in loops and never trip the recursion guard
    if expr.depth() > MAX_DEPTH {
        return Err(ParseError::too_deep(0));
    }

    Ok(expr)
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
enum Token {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),

    // Names, plain or `quoted`
    Identifier(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Bang,
    Equal,
    StrictEqual,
    NotEqual,
    StrictNotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    And,
    Or,
    Question,
    Colon,
    Comma,

    // Delimiters
    LeftParen,
    RightParen,

    // End of input
    Eof,
}

/// Formula parser
struct FormulaParser<'a> {
    input: &'a str,
    pos: usize,
    current: Token,
    /// Byte offset where `current` starts
    token_start: usize,
    /// Active nested sub-expressions
    depth: usize,
}

impl<'a> FormulaParser<'a> {
    fn new(input: &'a str) -> Result<Self, ParseError> {
        let mut parser = Self {
            input,
            pos: 0,
            current: Token::Eof,
            token_start: 0,
            depth: 0,
        };
        parser.advance_token()?;
        Ok(parser)
    }

    // === Token scanning ===

    fn advance_token(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        self.token_start = self.pos;
        self.current = self.scan_token()?;
        Ok(())
    }

    fn scan_token(&mut self) -> Result<Token, ParseError> {
        let Some(c) = self.peek_char() else {
            return Ok(Token::Eof);
        };

        // Single-character tokens
        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '^' => Some(Token::Caret),
            '?' => Some(Token::Question),
            ':' => Some(Token::Colon),
            ',' => Some(Token::Comma),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        // Multi-character operators
        match c {
            '=' => {
                self.advance();
                if self.eat('=') && self.eat('=') {
                    return Ok(Token::StrictEqual);
                }
                return Ok(Token::Equal);
            }
            '!' => {
                self.advance();
                if self.eat('=') {
                    if self.eat('=') {
                        return Ok(Token::StrictNotEqual);
                    }
                    return Ok(Token::NotEqual);
                }
                return Ok(Token::Bang);
            }
            '<' => {
                self.advance();
                if self.eat('=') {
                    return Ok(Token::LessEqual);
                }
                if self.eat('>') {
                    return Ok(Token::NotEqual);
                }
                return Ok(Token::LessThan);
            }
            '>' => {
                self.advance();
                if self.eat('=') {
                    return Ok(Token::GreaterEqual);
                }
                return Ok(Token::GreaterThan);
            }
            '&' | '|' => {
                self.advance();
                if self.eat(c) {
                    return Ok(if c == '&' { Token::And } else { Token::Or });
                }
                return Err(ParseError::unexpected_token(
                    c.to_string(),
                    vec![format!("'{c}{c}'")],
                    self.token_start,
                ));
            }
            _ => {}
        }

        // String literal
        if c == '"' || c == '\'' {
            return self.scan_string(c);
        }

        // Quoted name
        if c == '`' {
            return self.scan_quoted_name();
        }

        // Number
        if c.is_ascii_digit()
            || (c == '.' && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit()))
        {
            return self.scan_number();
        }

        // Identifier or boolean
        if c.is_alphabetic() || c == '_' {
            return Ok(self.scan_identifier());
        }

        Err(ParseError::unexpected_token(
            c.to_string(),
            vec!["expression".into()],
            self.token_start,
        ))
    }

    fn scan_string(&mut self, quote: char) -> Result<Token, ParseError> {
        self.advance(); // Skip opening quote

        let mut s = String::new();
        loop {
            match self.peek_char() {
                None => {
                    return Err(ParseError::unexpected_end(
                        vec![format!("closing {quote}")],
                        self.pos,
                    ))
                }
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(Token::String(s));
                }
                Some('\\') => {
                    self.advance();
                    let Some(escaped) = self.peek_char() else {
                        continue;
                    };
                    s.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                    self.advance();
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
    }

    fn scan_quoted_name(&mut self) -> Result<Token, ParseError> {
        self.advance(); // Skip opening backtick
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == '`' {
                let name = self.input[start..self.pos].to_string();
                self.advance();
                return Ok(Token::Identifier(name));
            }
            self.advance();
        }
        Err(ParseError::unexpected_end(vec!["closing `".into()], self.pos))
    }

    fn scan_number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;

        // Integer part
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        // Decimal part
        if self.peek_char() == Some('.') {
            self.advance();
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // Exponent part
        if self.peek_char().map_or(false, |c| c == 'e' || c == 'E') {
            self.advance();
            if self.peek_char().map_or(false, |c| c == '+' || c == '-') {
                self.advance();
            }
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let num_str = &self.input[start..self.pos];
        num_str
            .parse()
            .map(Token::Number)
            .map_err(|_| ParseError::unexpected_token(num_str, vec!["number".into()], start))
    }

    fn scan_identifier(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek_char()
            .map_or(false, |c| c.is_alphanumeric() || c == '_')
        {
            self.advance();
        }

        match &self.input[start..self.pos] {
            "true" => Token::Boolean(true),
            "false" => Token::Boolean(false),
            name => Token::Identifier(name.to_string()),
        }
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn consume(&mut self) -> Result<Token, ParseError> {
        let token = std::mem::replace(&mut self.current, Token::Eof);
        self.advance_token()?;
        Ok(token)
    }

    fn expect(&mut self, expected: Token, name: &str) -> Result<(), ParseError> {
        if self.current == expected {
            self.consume()?;
            Ok(())
        } else {
            Err(self.unexpected(&[name]))
        }
    }

    /// Error describing the current token
    fn unexpected(&self, expected: &[&str]) -> ParseError {
        let expected = expected.iter().map(|s| s.to_string()).collect();
        if self.current == Token::Eof {
            ParseError::unexpected_end(expected, self.token_start)
        } else {
            ParseError::unexpected_token(
                &self.input[self.token_start..self.pos],
                expected,
                self.token_start,
            )
        }
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Conditional: ? :
    // 2. Logical or: ||
    // 3. Logical and: &&
    // 4. Equality: ==, =, !=, <>, ===, !==
    // 5. Comparison: <, <=, >, >=
    // 6. Additive: +, -
    // 7. Multiplicative: *, /, %
    // 8. Unary: +, -, !
    // 9. Exponentiation: ^
    // 10. Primary: literals, names, function calls, parentheses

    /// Run a nested parse, failing once nesting passes [`MAX_DEPTH`]
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::too_deep(self.token_start));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_conditional(&mut self) -> Result<FormulaExpr, ParseError> {
        self.nested(Self::parse_conditional_branches)
    }

    fn parse_conditional_branches(&mut self) -> Result<FormulaExpr, ParseError> {
        let condition = self.parse_or()?;

        if self.current != Token::Question {
            return Ok(condition);
        }
        self.consume()?;
        let if_true = self.parse_conditional()?;
        self.expect(Token::Colon, "':'")?;
        let if_false = self.parse_conditional()?;

        Ok(FormulaExpr::conditional(condition, if_true, if_false))
    }

    fn parse_or(&mut self) -> Result<FormulaExpr, ParseError> {
        let mut left = self.parse_and()?;

        while self.current == Token::Or {
            self.consume()?;
            let right = self.parse_and()?;
            left = binary(BinaryOperator::Or, left, right);
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<FormulaExpr, ParseError> {
        let mut left = self.parse_equality()?;

        while self.current == Token::And {
            self.consume()?;
            let right = self.parse_equality()?;
            left = binary(BinaryOperator::And, left, right);
        }

        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<FormulaExpr, ParseError> {
        let mut left = self.parse_comparison()?;

        loop {
            let op = match self.current {
                Token::Equal => BinaryOperator::Equal,
                Token::StrictEqual => BinaryOperator::StrictEqual,
                Token::NotEqual => BinaryOperator::NotEqual,
                Token::StrictNotEqual => BinaryOperator::StrictNotEqual,
                _ => break,
            };

            self.consume()?;
            let right = self.parse_comparison()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<FormulaExpr, ParseError> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match self.current {
                Token::LessThan => BinaryOperator::LessThan,
                Token::LessEqual => BinaryOperator::LessEqual,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::GreaterEqual => BinaryOperator::GreaterEqual,
                _ => break,
            };

            self.consume()?;
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<FormulaExpr, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };

            self.consume()?;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<FormulaExpr, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                Token::Percent => BinaryOperator::Remainder,
                _ => break,
            };

            self.consume()?;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<FormulaExpr, ParseError> {
        let op = match self.current {
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Bang => "!",
            _ => return self.parse_power(),
        };

        self.consume()?;
        let operand = self.nested(Self::parse_unary)?;
        Ok(FormulaExpr::unary(op, operand))
    }

    fn parse_power(&mut self) -> Result<FormulaExpr, ParseError> {
        let base = self.parse_primary()?;

        if self.current == Token::Caret {
            self.consume()?;
            // Right associative; the exponent may carry its own sign
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(binary(BinaryOperator::Power, base, exponent));
        }

        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<FormulaExpr, ParseError> {
        match self.current.clone() {
            Token::Number(n) => {
                self.consume()?;
                Ok(FormulaExpr::Number(n))
            }

            Token::String(s) => {
                self.consume()?;
                Ok(FormulaExpr::String(s))
            }

            Token::Boolean(b) => {
                self.consume()?;
                Ok(FormulaExpr::Boolean(b))
            }

            Token::LeftParen => {
                self.consume()?;
                let expr = self.parse_conditional()?;
                self.expect(Token::RightParen, "')'")?;
                Ok(expr)
            }

            Token::Identifier(name) => {
                self.consume()?;
                // Check if it's a function call
                if self.current == Token::LeftParen {
                    self.parse_function_call(name)
                } else {
                    Ok(FormulaExpr::Variable(name))
                }
            }

            _ => Err(self.unexpected(&["expression"])),
        }
    }

    fn parse_function_call(&mut self, name: String) -> Result<FormulaExpr, ParseError> {
        self.expect(Token::LeftParen, "'('")?;

        let mut args = Vec::new();

        // Parse arguments
        if self.current != Token::RightParen {
            args.push(self.parse_conditional()?);

            while self.current == Token::Comma {
                self.consume()?;
                args.push(self.parse_conditional()?);
            }
        }

        self.expect(Token::RightParen, "')'")?;

        Ok(FormulaExpr::Function { name, args })
    }
}

fn binary(op: BinaryOperator, left: FormulaExpr, right: FormulaExpr) -> FormulaExpr {
    FormulaExpr::binary(op.symbol(), left, right)
}
