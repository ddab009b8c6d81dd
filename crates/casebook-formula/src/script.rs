//! Generated-code representation
//!
//! The code generator emits a small expression script. [`load`] parses a script once into a tree
//! of closures; calling the result with a context and an evaluation context runs it.
//!
//! Script vocabulary:
//! - literals: numbers (optionally signed, `NaN`, `Infinity`), double-quoted strings, `true`, `false`
//! - runtime calls: `add`, `subtract`, `less_than`, `less_than_or_equal`, `greater_than`,
//!   `greater_than_or_equal`, `binary_operator("op", a, b)`, `plus`, `negate`
//! - context fragments: `var("name", index...)`, `call("name", arg...)`
//! - native operators: `==`, `===`, `!=`, `!==`, `&&`, `||`, prefix `!`, `c ? a : b`, parentheses

use crate::ast::MAX_DEPTH;
use crate::context::{ContextFunction, EvalContext, FormulaContext};
use crate::error::{FormulaError, FormulaResult};
use crate::messages::translate;
use crate::runtime;
use casebook_core::Value;
use std::rc::Rc;

type Thunk = Box<dyn Fn(&dyn FormulaContext, &EvalContext) -> FormulaResult<Value>>;

fn wrap<F>(f: F) -> Thunk
where
    F: Fn(&dyn FormulaContext, &EvalContext) -> FormulaResult<Value> + 'static,
{
    Box::new(f)
}

/// Quote a string as a script literal
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Render a number as a script literal
pub fn number_literal(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format!("{}", n)
    }
}

/// `var("name", i, j)`
pub fn variable_fragment(name: &str, aggregate_indices: &[usize]) -> String {
    let indices: String = aggregate_indices
        .iter()
        .map(|index| format!(", {}", index))
        .collect();
    format!("var({}{})", quote(name), indices)
}

/// `call("name", a, b)`
pub fn call_fragment(name: &str, args: &[String]) -> String {
    let args: String = args.iter().map(|arg| format!(", {}", arg)).collect();
    format!("call({}{})", quote(name), args)
}

/// Sub-expression nesting a script may use; generated code needs at most two levels per tree level
const MAX_SCRIPT_DEPTH: usize = 2 * MAX_DEPTH + 2;

/// Parse a script into a callable
pub fn load(code: &str) -> FormulaResult<ContextFunction> {
    let tokens = tokenize(code)?;
    let mut parser = ScriptParser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let thunk = parser.parse_expression()?;
    if parser.current() != &Token::Eof {
        return Err(parser.error("end of code"));
    }
    Ok(Rc::from(thunk))
}

fn invalid(offset: usize, detail: &str) -> FormulaError {
    FormulaError::Syntax(translate(
        "formula.script.invalid",
        &[&offset.to_string(), detail],
    ))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    String(String),
    Identifier(String),
    LeftParen,
    RightParen,
    Comma,
    Question,
    Colon,
    Minus,
    Bang,
    Equal,
    StrictEqual,
    NotEqual,
    StrictNotEqual,
    And,
    Or,
    Eof,
}

fn tokenize(code: &str) -> FormulaResult<Vec<(Token, usize)>> {
    let chars: Vec<(usize, char)> = code.char_indices().collect();
    let at = |i: usize| chars.get(i).map(|&(_, c)| c);
    let mut tokens = Vec::new();
    let mut i = 0;

    while let Some(&(offset, c)) = chars.get(i) {
        let (token, width) = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => (Token::LeftParen, 1),
            ')' => (Token::RightParen, 1),
            ',' => (Token::Comma, 1),
            '?' => (Token::Question, 1),
            ':' => (Token::Colon, 1),
            '-' => (Token::Minus, 1),
            '!' => match (at(i + 1), at(i + 2)) {
                (Some('='), Some('=')) => (Token::StrictNotEqual, 3),
                (Some('='), _) => (Token::NotEqual, 2),
                _ => (Token::Bang, 1),
            },
            '=' => match (at(i + 1), at(i + 2)) {
                (Some('='), Some('=')) => (Token::StrictEqual, 3),
                (Some('='), _) => (Token::Equal, 2),
                _ => return Err(invalid(offset, "'='")),
            },
            '&' if at(i + 1) == Some('&') => (Token::And, 2),
            '|' if at(i + 1) == Some('|') => (Token::Or, 2),
            '"' => {
                let mut text = String::new();
                let mut j = i + 1;
                loop {
                    match at(j) {
                        None => return Err(invalid(offset, "unterminated string")),
                        Some('"') => break,
                        Some('\\') => {
                            let escaped = match at(j + 1) {
                                Some('n') => '\n',
                                Some('r') => '\r',
                                Some('t') => '\t',
                                Some(c @ ('"' | '\\')) => c,
                                _ => return Err(invalid(offset, "bad escape")),
                            };
                            text.push(escaped);
                            j += 2;
                        }
                        Some(c) => {
                            text.push(c);
                            j += 1;
                        }
                    }
                }
                (Token::String(text), j + 1 - i)
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut j = i;
                while matches!(at(j), Some(c) if c.is_ascii_digit() || c == '.') {
                    j += 1;
                }
                if matches!(at(j), Some('e' | 'E')) {
                    j += 1;
                    if matches!(at(j), Some('+' | '-')) {
                        j += 1;
                    }
                    while matches!(at(j), Some(c) if c.is_ascii_digit()) {
                        j += 1;
                    }
                }
                let end = chars.get(j).map_or(code.len(), |&(o, _)| o);
                let n = code[offset..end]
                    .parse()
                    .map_err(|_| invalid(offset, &code[offset..end]))?;
                (Token::Number(n), j - i)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut j = i;
                while matches!(at(j), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
                    j += 1;
                }
                let end = chars.get(j).map_or(code.len(), |&(o, _)| o);
                (Token::Identifier(code[offset..end].to_string()), j - i)
            }
            c => return Err(invalid(offset, &format!("'{}'", c))),
        };
        tokens.push((token, offset));
        i += width;
    }

    tokens.push((Token::Eof, code.len()));
    Ok(tokens)
}

struct ScriptParser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl ScriptParser {
    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> FormulaResult<Thunk>,
    ) -> FormulaResult<Thunk> {
        if self.depth >= MAX_SCRIPT_DEPTH {
            return Err(FormulaError::too_deep());
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].0.clone();
        if token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.current() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> FormulaResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(what))
        }
    }

    fn error(&self, expected: &str) -> FormulaError {
        let (token, offset) = &self.tokens[self.pos];
        invalid(*offset, &format!("expected {}, found {:?}", expected, token))
    }

    fn expect_string(&mut self) -> FormulaResult<String> {
        let start = self.pos;
        match self.advance() {
            Token::String(s) => Ok(s),
            _ => {
                self.pos = start;
                Err(self.error("string"))
            }
        }
    }

    fn parse_expression(&mut self) -> FormulaResult<Thunk> {
        self.nested(Self::parse_conditional)
    }

    fn parse_conditional(&mut self) -> FormulaResult<Thunk> {
        let condition = self.parse_or()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let if_true = self.parse_expression()?;
        self.expect(&Token::Colon, "':'")?;
        let if_false = self.parse_expression()?;
        Ok(wrap(move |ctx, eval| {
            if condition(ctx, eval)?.is_truthy() {
                if_true(ctx, eval)
            } else {
                if_false(ctx, eval)
            }
        }))
    }

    fn parse_or(&mut self) -> FormulaResult<Thunk> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            let first = left;
            left = wrap(move |ctx, eval| {
                let value = first(ctx, eval)?;
                if value.is_truthy() {
                    Ok(value)
                } else {
                    right(ctx, eval)
                }
            });
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> FormulaResult<Thunk> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::And) {
            let right = self.parse_equality()?;
            let first = left;
            left = wrap(move |ctx, eval| {
                let value = first(ctx, eval)?;
                if value.is_truthy() {
                    right(ctx, eval)
                } else {
                    Ok(value)
                }
            });
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> FormulaResult<Thunk> {
        let mut left = self.parse_unary()?;
        loop {
            let op: fn(&Value, &Value) -> Value = match self.current() {
                Token::Equal | Token::StrictEqual => runtime::strict_equals,
                Token::NotEqual | Token::StrictNotEqual => runtime::strict_not_equals,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            let first = left;
            left = wrap(move |ctx, eval| {
                let l = first(ctx, eval)?;
                let r = right(ctx, eval)?;
                Ok(op(&l, &r))
            });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> FormulaResult<Thunk> {
        if self.eat(&Token::Bang) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(wrap(move |ctx, eval| Ok(runtime::not(&operand(ctx, eval)?))));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> FormulaResult<Thunk> {
        let start = self.pos;
        let value = match self.advance() {
            Token::Number(n) => Value::Number(n),
            Token::Minus => match self.advance() {
                Token::Number(n) => Value::Number(-n),
                Token::Identifier(name) if name == "Infinity" => Value::Number(f64::NEG_INFINITY),
                _ => {
                    self.pos = start + 1;
                    return Err(self.error("number"));
                }
            },
            Token::String(s) => Value::String(s),
            Token::Identifier(name) => match name.as_str() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                "NaN" => Value::Number(f64::NAN),
                "Infinity" => Value::Number(f64::INFINITY),
                _ => return self.parse_call(&name),
            },
            Token::LeftParen => {
                let inner = self.parse_expression()?;
                self.expect(&Token::RightParen, "')'")?;
                return Ok(inner);
            }
            _ => {
                self.pos = start;
                return Err(self.error("expression"));
            }
        };
        Ok(wrap(move |_, _| Ok(value.clone())))
    }

    fn parse_call(&mut self, name: &str) -> FormulaResult<Thunk> {
        self.expect(&Token::LeftParen, "'('")?;

        let thunk = match name {
            "var" => {
                let variable = self.expect_string()?;
                let mut indices = Vec::new();
                while self.eat(&Token::Comma) {
                    match self.current() {
                        Token::Number(n) if *n >= 0.0 && n.fract() == 0.0 => {
                            indices.push(*n as usize);
                            self.advance();
                        }
                        _ => return Err(self.error("aggregate index")),
                    }
                }
                wrap(move |ctx, eval| ctx.evaluate_scoped_variable(&variable, &indices, eval))
            }
            "call" => {
                let function = self.expect_string()?;
                let mut args = Vec::new();
                while self.eat(&Token::Comma) {
                    args.push(self.parse_expression()?);
                }
                wrap(move |ctx, eval| {
                    let values = args
                        .iter()
                        .map(|arg| arg(ctx, eval))
                        .collect::<FormulaResult<Vec<_>>>()?;
                    ctx.evaluate_function(&function, values)
                })
            }
            "binary_operator" => {
                let symbol = self.expect_string()?;
                self.expect(&Token::Comma, "','")?;
                let left = self.parse_expression()?;
                self.expect(&Token::Comma, "','")?;
                let right = self.parse_expression()?;
                wrap(move |ctx, eval| {
                    let l = left(ctx, eval)?;
                    let r = right(ctx, eval)?;
                    runtime::binary_operator(&symbol, &l, &r)
                })
            }
            "add"
            | "subtract"
            | "less_than"
            | "less_than_or_equal"
            | "greater_than"
            | "greater_than_or_equal" => {
                let op: fn(&Value, &Value) -> FormulaResult<Value> = match name {
                    "add" => |a, b| Ok(runtime::add(a, b)),
                    "subtract" => runtime::subtract,
                    "less_than" => |a, b| Ok(runtime::less_than(a, b)),
                    "less_than_or_equal" => |a, b| Ok(runtime::less_than_or_equal(a, b)),
                    "greater_than" => |a, b| Ok(runtime::greater_than(a, b)),
                    _ => |a, b| Ok(runtime::greater_than_or_equal(a, b)),
                };
                let left = self.parse_expression()?;
                self.expect(&Token::Comma, "','")?;
                let right = self.parse_expression()?;
                wrap(move |ctx, eval| {
                    let l = left(ctx, eval)?;
                    let r = right(ctx, eval)?;
                    op(&l, &r)
                })
            }
            "plus" | "negate" => {
                let op: fn(&Value) -> Value = if name == "plus" {
                    runtime::plus
                } else {
                    runtime::negate
                };
                let operand = self.parse_expression()?;
                wrap(move |ctx, eval| Ok(op(&operand(ctx, eval)?)))
            }
            _ => return Err(invalid(self.tokens[self.pos].1, &format!("unknown function '{}'", name))),
        };

        self.expect(&Token::RightParen, "')'")?;
        Ok(thunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChangeEvent, EventChannel};
    use pretty_assertions::assert_eq;

    struct Fixture {
        events: EventChannel<ChangeEvent>,
    }

    impl FormulaContext for Fixture {
        fn evaluate_variable(&self, name: &str, eval: &EvalContext) -> FormulaResult<Value> {
            eval.get(name)
                .cloned()
                .ok_or_else(|| FormulaError::UnknownVariable(name.to_string()))
        }

        fn evaluate_function(&self, name: &str, args: Vec<Value>) -> FormulaResult<Value> {
            match name {
                "count" => Ok(Value::Number(args.len() as f64)),
                _ => Err(FormulaError::UnknownFunction(name.to_string())),
            }
        }

        fn events(&self) -> &EventChannel<ChangeEvent> {
            &self.events
        }
    }

    fn run(code: &str) -> FormulaResult<Value> {
        let fixture = Fixture {
            events: EventChannel::new(),
        };
        let eval = EvalContext::new().with("x", 4).with("s", "text");
        let function = load(code)?;
        function(&fixture, &eval)
    }

    #[test]
    fn test_literals() {
        assert_eq!(run("42").unwrap(), Value::Number(42.0));
        assert_eq!(run("-2.5").unwrap(), Value::Number(-2.5));
        assert_eq!(run("-Infinity").unwrap(), Value::Number(f64::NEG_INFINITY));
        assert!(run("NaN").unwrap().is_nan());
        assert_eq!(run(r#""a\"b\\c""#).unwrap(), Value::string("a\"b\\c"));
        assert_eq!(run("true").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_runtime_calls() {
        assert_eq!(run("add(1, \"2\")").unwrap(), Value::Number(3.0));
        assert_eq!(
            run("binary_operator(\"*\", var(\"x\"), 2)").unwrap(),
            Value::Number(8.0)
        );
        assert_eq!(run("greater_than(var(\"x\"), 3)").unwrap(), Value::Boolean(true));
        assert_eq!(run("negate(plus(\"3\"))").unwrap(), Value::Number(-3.0));
        assert_eq!(
            run("subtract(\"a\", 1)"),
            Err(FormulaError::type_error(runtime::MINUS_SIGN))
        );
    }

    #[test]
    fn test_native_operators() {
        assert_eq!(run("(var(\"x\") == 4) && \"yes\"").unwrap(), Value::string("yes"));
        assert_eq!(run("0 || var(\"s\")").unwrap(), Value::string("text"));
        assert_eq!(run("!(1 === 1)").unwrap(), Value::Boolean(false));
        assert_eq!(run("1 !== \"1\"").unwrap(), Value::Boolean(true));
        assert_eq!(run("(false ? 1 : 2)").unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_short_circuit_skips_failures() {
        assert_eq!(run("(true ? 1 : var(\"missing\"))").unwrap(), Value::Number(1.0));
        assert_eq!(run("false && var(\"missing\")").unwrap(), Value::Boolean(false));
        assert_eq!(
            run("var(\"missing\")"),
            Err(FormulaError::UnknownVariable("missing".into()))
        );
    }

    #[test]
    fn test_context_calls() {
        assert_eq!(run("call(\"count\", 1, 2, 3)").unwrap(), Value::Number(3.0));
        assert_eq!(run("call(\"count\")").unwrap(), Value::Number(0.0));
        assert_eq!(run("var(\"x\", 0, 1)").unwrap(), Value::Number(4.0));
    }

    #[test]
    fn test_fragments() {
        assert_eq!(variable_fragment("x", &[]), "var(\"x\")");
        assert_eq!(variable_fragment("a b", &[0, 2]), "var(\"a b\", 0, 2)");
        assert_eq!(
            call_fragment("mean", &["var(\"x\")".to_string()]),
            "call(\"mean\", var(\"x\"))"
        );
        assert_eq!(quote("say \"hi\"\n"), r#""say \"hi\"\n""#);
        assert_eq!(number_literal(3.0), "3");
        assert_eq!(number_literal(-0.5), "-0.5");
        assert_eq!(number_literal(f64::INFINITY), "Infinity");
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "negate(".repeat(5000), ")".repeat(5000));
        assert_eq!(
            load(&deep).err(),
            Some(FormulaError::Syntax(
                "Syntax error: the formula is nested too deeply".into()
            ))
        );

        let nots = format!("{}true", "!".repeat(5000));
        assert_eq!(load(&nots).err(), Some(FormulaError::too_deep()));

        let shallow = format!("{}1{}", "negate(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(run(&shallow).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_invalid_code() {
        assert!(matches!(load("add(1"), Err(FormulaError::Syntax(_))));
        assert!(matches!(load("unknown(1)"), Err(FormulaError::Syntax(_))));
        assert!(matches!(load("1 2"), Err(FormulaError::Syntax(_))));
        assert!(matches!(load("\"open"), Err(FormulaError::Syntax(_))));
        assert!(matches!(load("1 = 2"), Err(FormulaError::Syntax(_))));
    }
}
