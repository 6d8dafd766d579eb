/**
 * Host Expression Evaluator
 *
 * A small expression language for the in-memory host: literals, member
 * paths, arithmetic, and assignment into scope data.
 */

use std::rc::Rc;

use serde_json::{Map, Number, Value};

use super::{ExprLocals, Expression, ExpressionParser};
use crate::error::{HostError, Result};

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    String(String),
    Identifier(String),
    Keyword(&'static str),
    Operator(char),
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    index: usize,
    kind: TokenKind,
}

const KEYWORDS: &[&str] = &["true", "false", "null", "undefined"];

struct Scanner<'a> {
    input: &'a str,
    index: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Scanner { input, index: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.index..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek() {
            self.index += ch.len_utf8();
        }
    }

    fn scan(mut self) -> std::result::Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        while let Some(ch) = self.peek() {
            let start = self.index;
            if ch.is_whitespace() {
                self.advance();
                continue;
            }
            let kind = if ch.is_ascii_digit() || (ch == '.' && self.next_is_digit()) {
                self.scan_number()?
            } else if is_identifier_start(ch) {
                self.scan_identifier()
            } else if ch == '\'' || ch == '"' {
                self.scan_string(ch)?
            } else if "+-*/%=!().[]".contains(ch) {
                self.advance();
                TokenKind::Operator(ch)
            } else {
                return Err(format!("Unexpected character [{}] at column {}", ch, start));
            };
            tokens.push(Token { index: start, kind });
        }
        Ok(tokens)
    }

    fn next_is_digit(&self) -> bool {
        self.input[self.index..]
            .chars()
            .nth(1)
            .is_some_and(|c| c.is_ascii_digit())
    }

    fn scan_number(&mut self) -> std::result::Result<TokenKind, String> {
        let start = self.index;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.advance();
        }
        let text = &self.input[start..self.index];
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| format!("Invalid number {}", text))
    }

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.index;
        while matches!(self.peek(), Some(c) if is_identifier_part(c)) {
            self.advance();
        }
        let text = &self.input[start..self.index];
        match KEYWORDS.iter().copied().find(|k| *k == text) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Identifier(text.to_string()),
        }
    }

    fn scan_string(&mut self, quote: char) -> std::result::Result<TokenKind, String> {
        let start = self.index;
        self.advance();
        let mut buffer = String::new();
        loop {
            match self.peek() {
                None => return Err(format!("Unterminated quote at column {}", start)),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(TokenKind::String(buffer));
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.peek() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some(c) => c,
                        None => return Err(format!("Unterminated quote at column {}", start)),
                    };
                    buffer.push(escaped);
                    self.advance();
                }
                Some(c) => {
                    buffer.push(c);
                    self.advance();
                }
            }
        }
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_identifier_part(ch: char) -> bool {
    is_identifier_start(ch) || ch.is_ascii_digit()
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Field(String),
    Index(Box<Ast>),
}

#[derive(Debug, Clone, PartialEq)]
enum Ast {
    Literal(Value),
    Path(String, Vec<Segment>),
    Unary(char, Box<Ast>),
    Binary(char, Box<Ast>, Box<Ast>),
    Assign(Box<Ast>, Box<Ast>),
}

struct ParseAst {
    tokens: Vec<Token>,
    index: usize,
}

impl ParseAst {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn consume_operator(&mut self, op: char) -> bool {
        if matches!(self.current(), Some(Token { kind: TokenKind::Operator(c), .. }) if *c == op) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect_operator(&mut self, op: char) -> std::result::Result<(), String> {
        if self.consume_operator(op) {
            Ok(())
        } else {
            Err(format!("Missing expected {}", op))
        }
    }

    fn parse(mut self) -> std::result::Result<Ast, String> {
        let ast = self.parse_assignment()?;
        match self.current() {
            None => Ok(ast),
            Some(token) => Err(format!("Unexpected token at column {}", token.index)),
        }
    }

    fn parse_assignment(&mut self) -> std::result::Result<Ast, String> {
        let lhs = self.parse_additive()?;
        if self.consume_operator('=') {
            if !matches!(lhs, Ast::Path(..)) {
                return Err("Expression is not assignable".to_string());
            }
            let rhs = self.parse_assignment()?;
            return Ok(Ast::Assign(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> std::result::Result<Ast, String> {
        let mut result = self.parse_multiplicative()?;
        loop {
            let op = if self.consume_operator('+') {
                '+'
            } else if self.consume_operator('-') {
                '-'
            } else {
                return Ok(result);
            };
            let right = self.parse_multiplicative()?;
            result = Ast::Binary(op, Box::new(result), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> std::result::Result<Ast, String> {
        let mut result = self.parse_prefix()?;
        loop {
            let op = if self.consume_operator('*') {
                '*'
            } else if self.consume_operator('/') {
                '/'
            } else if self.consume_operator('%') {
                '%'
            } else {
                return Ok(result);
            };
            let right = self.parse_prefix()?;
            result = Ast::Binary(op, Box::new(result), Box::new(right));
        }
    }

    fn parse_prefix(&mut self) -> std::result::Result<Ast, String> {
        for op in ['-', '!'] {
            if self.consume_operator(op) {
                let operand = self.parse_prefix()?;
                return Ok(Ast::Unary(op, Box::new(operand)));
            }
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> std::result::Result<Ast, String> {
        if self.consume_operator('(') {
            let inner = self.parse_assignment()?;
            self.expect_operator(')')?;
            return Ok(inner);
        }

        let token = self
            .current()
            .cloned()
            .ok_or_else(|| "Unexpected end of expression".to_string())?;
        self.index += 1;

        match token.kind {
            TokenKind::Number(n) => Ok(Ast::Literal(number(n))),
            TokenKind::String(s) => Ok(Ast::Literal(Value::String(s))),
            TokenKind::Keyword("true") => Ok(Ast::Literal(Value::Bool(true))),
            TokenKind::Keyword("false") => Ok(Ast::Literal(Value::Bool(false))),
            TokenKind::Keyword(_) => Ok(Ast::Literal(Value::Null)),
            TokenKind::Identifier(root) => {
                let mut segments = Vec::new();
                loop {
                    if self.consume_operator('.') {
                        match self.current().map(|t| t.kind.clone()) {
                            Some(TokenKind::Identifier(name)) => {
                                self.index += 1;
                                segments.push(Segment::Field(name));
                            }
                            _ => return Err("Expected identifier after '.'".to_string()),
                        }
                    } else if self.consume_operator('[') {
                        let key = self.parse_assignment()?;
                        self.expect_operator(']')?;
                        segments.push(Segment::Index(Box::new(key)));
                    } else {
                        return Ok(Ast::Path(root, segments));
                    }
                }
            }
            TokenKind::Operator(op) => Err(format!(
                "Unexpected token {} at column {}",
                op, token.index
            )),
        }
    }
}

/// Scope data an expression may read and assign.
pub trait EvalScope {
    fn lookup(&self, name: &str) -> Option<Value>;
    fn assign(&self, name: &str, value: Value);
}

/// A parsed expression.
#[derive(Debug, Clone)]
pub struct ParsedExpression {
    source: String,
    ast: Ast,
}

impl ParsedExpression {
    pub fn parse(source: &str) -> Result<Self> {
        let fail = |reason: String| HostError::Expression {
            expression: source.to_string(),
            reason,
        };
        let tokens = Scanner::new(source).scan().map_err(fail)?;
        if tokens.is_empty() {
            return Ok(Self {
                source: source.to_string(),
                ast: Ast::Literal(Value::Null),
            });
        }
        let ast = ParseAst { tokens, index: 0 }.parse().map_err(fail)?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_assignment(&self) -> bool {
        matches!(self.ast, Ast::Assign(..))
    }

    /// Evaluate with `locals` shadowing `scope`.
    pub fn evaluate_in(&self, scope: Option<&dyn EvalScope>, locals: &ExprLocals) -> Result<Value> {
        Evaluator {
            source: &self.source,
            scope,
            locals,
        }
        .eval(&self.ast)
    }
}

impl Expression for ParsedExpression {
    fn evaluate(&self, locals: &ExprLocals) -> Result<Value> {
        self.evaluate_in(None, locals)
    }
}

/// The `$parse` service of the in-memory host.
#[derive(Debug, Default)]
pub struct MemoryParser;

impl ExpressionParser for MemoryParser {
    fn parse(&self, text: &str) -> Result<Rc<dyn Expression>> {
        Ok(Rc::new(ParsedExpression::parse(text)?))
    }
}

struct Evaluator<'a> {
    source: &'a str,
    scope: Option<&'a dyn EvalScope>,
    locals: &'a ExprLocals,
}

impl Evaluator<'_> {
    fn eval(&self, ast: &Ast) -> Result<Value> {
        match ast {
            Ast::Literal(value) => Ok(value.clone()),
            Ast::Path(root, segments) => {
                let mut current = self.root(root);
                for segment in segments {
                    let key = self.key(segment)?;
                    current = member(&current, &key);
                }
                Ok(current)
            }
            Ast::Unary('-', operand) => Ok(number(-to_number(&self.eval(operand)?))),
            Ast::Unary(_, operand) => Ok(Value::Bool(!truthy(&self.eval(operand)?))),
            Ast::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(binary(*op, &left, &right))
            }
            Ast::Assign(target, value) => {
                let value = self.eval(value)?;
                self.assign(target, value.clone())?;
                Ok(value)
            }
        }
    }

    fn root(&self, name: &str) -> Value {
        if let Some(value) = self.locals.get(name) {
            return value.clone();
        }
        self.scope
            .and_then(|scope| scope.lookup(name))
            .unwrap_or(Value::Null)
    }

    fn key(&self, segment: &Segment) -> Result<String> {
        Ok(match segment {
            Segment::Field(name) => name.clone(),
            Segment::Index(ast) => match self.eval(ast)? {
                Value::String(s) => s,
                other => other.to_string(),
            },
        })
    }

    fn assign(&self, target: &Ast, value: Value) -> Result<()> {
        let (Ast::Path(root, segments), Some(scope)) = (target, self.scope) else {
            return Err(HostError::NonAssignable(self.source.to_string()).into());
        };
        if segments.is_empty() {
            scope.assign(root, value);
            return Ok(());
        }

        let keys = segments
            .iter()
            .map(|segment| self.key(segment))
            .collect::<Result<Vec<_>>>()?;
        let mut root_value = scope.lookup(root).unwrap_or(Value::Null);
        set_path(&mut root_value, &keys, value);
        scope.assign(root, root_value);
        Ok(())
    }
}

fn member(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
        Value::Array(items) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn set_path(target: &mut Value, keys: &[String], value: Value) {
    let Some((first, rest)) = keys.split_first() else {
        *target = value;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let slot = map.entry(first.clone()).or_insert(Value::Null);
        set_path(slot, rest, value);
    }
}

fn binary(op: char, left: &Value, right: &Value) -> Value {
    if op == '+' && (left.is_string() || right.is_string()) {
        return Value::String(format!("{}{}", to_text(left), to_text(right)));
    }
    let (l, r) = (to_number(left), to_number(right));
    number(match op {
        '+' => l + r,
        '-' => l - r,
        '*' => l * r,
        '/' => l / r,
        _ => l % r,
    })
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => 0.0,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Integral results stay integers.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}
