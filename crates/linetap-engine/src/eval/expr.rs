//! Built-in watch/condition expression parser and interpreter.
//!
//! Expressions are operator-authored and side-effect free by
//! construction: the grammar has no assignment, no calls, and
//! evaluation only reads captured bindings.

#![allow(missing_docs)]

use std::cmp::Ordering;

use indexmap::IndexMap;
use smol_str::SmolStr;

use super::EvalError;
use crate::value::Value;

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(SmolStr),
    Field(Box<Expr>, SmolStr),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(SmolStr),
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(&'static str),
}

fn tokenize(text: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = pos;
                while let Some(&(next, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        end = next + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(SmolStr::new(&text[pos..end])));
            }
            c if c.is_ascii_digit() => {
                let mut end = pos;
                let mut is_float = false;
                while let Some(&(next, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        end = next + 1;
                        chars.next();
                    } else if c == '.' && !is_float {
                        // Only consume the dot when a digit follows, so
                        // `list[0].len` style paths still tokenize.
                        let mut ahead = chars.clone();
                        ahead.next();
                        if matches!(ahead.peek(), Some(&(_, d)) if d.is_ascii_digit()) {
                            is_float = true;
                            end = next + 1;
                            chars.next();
                        } else {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                let literal = &text[pos..end];
                if is_float {
                    let value = literal
                        .parse::<f64>()
                        .map_err(|_| EvalError::Parse(SmolStr::new(literal)))?;
                    tokens.push(Token::Float(value));
                } else {
                    let value = literal
                        .parse::<i64>()
                        .map_err(|_| EvalError::Parse(SmolStr::new(literal)))?;
                    tokens.push(Token::Int(value));
                }
            }
            '"' | '\'' => {
                let quote = ch;
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    if c == '\\' {
                        match chars.next() {
                            Some((_, 'n')) => literal.push('\n'),
                            Some((_, 't')) => literal.push('\t'),
                            Some((_, other)) => literal.push(other),
                            None => break,
                        }
                    } else {
                        literal.push(c);
                    }
                }
                if !closed {
                    return Err(EvalError::Parse(SmolStr::new("unterminated string")));
                }
                tokens.push(Token::Str(literal));
            }
            '=' | '!' | '<' | '>' | '&' | '|' => {
                chars.next();
                let paired = matches!(chars.peek(), Some(&(_, next))
                    if (next == '=' && ch != '&' && ch != '|')
                        || (next == '&' && ch == '&')
                        || (next == '|' && ch == '|'));
                if paired {
                    chars.next();
                }
                let symbol = match (ch, paired) {
                    ('=', true) => "==",
                    ('!', true) => "!=",
                    ('<', true) => "<=",
                    ('>', true) => ">=",
                    ('<', false) => "<",
                    ('>', false) => ">",
                    ('!', false) => "!",
                    ('&', true) => "&&",
                    ('|', true) => "||",
                    _ => return Err(EvalError::Parse(SmolStr::new(format!("'{ch}'")))),
                };
                tokens.push(Token::Symbol(symbol));
            }
            '(' | ')' | '[' | ']' | '.' | '-' => {
                chars.next();
                let symbol = match ch {
                    '(' => "(",
                    ')' => ")",
                    '[' => "[",
                    ']' => "]",
                    '.' => ".",
                    _ => "-",
                };
                tokens.push(Token::Symbol(symbol));
            }
            other => return Err(EvalError::Parse(SmolStr::new(format!("'{other}'")))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: &'static str) -> Result<(), EvalError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(EvalError::Parse(SmolStr::new(format!("expected '{symbol}'"))))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_and()?;
        while self.eat_symbol("||") {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_comparison()?;
        while self.eat_symbol("&&") {
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let lhs = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Symbol("==")) => BinaryOp::Eq,
            Some(Token::Symbol("!=")) => BinaryOp::Ne,
            Some(Token::Symbol("<=")) => BinaryOp::Le,
            Some(Token::Symbol(">=")) => BinaryOp::Ge,
            Some(Token::Symbol("<")) => BinaryOp::Lt,
            Some(Token::Symbol(">")) => BinaryOp::Gt,
            _ => return Ok(lhs),
        };
        self.position += 1;
        let rhs = self.parse_unary()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        if self.eat_symbol("!") {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        if self.eat_symbol("-") {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_symbol(".") {
                match self.next() {
                    Some(Token::Ident(name)) => {
                        expr = Expr::Field(Box::new(expr), name);
                    }
                    _ => return Err(EvalError::Parse(SmolStr::new("expected field name"))),
                }
            } else if self.eat_symbol("[") {
                let index = self.parse_or()?;
                self.expect_symbol("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" | "True" => Expr::Literal(Value::Bool(true)),
                "false" | "False" => Expr::Literal(Value::Bool(false)),
                "null" | "None" => Expr::Literal(Value::Null),
                _ => Expr::Name(name),
            }),
            Some(Token::Int(value)) => Ok(Expr::Literal(Value::Int(value))),
            Some(Token::Float(value)) => Ok(Expr::Literal(Value::Float(value))),
            Some(Token::Str(value)) => Ok(Expr::Literal(Value::Str(value))),
            Some(Token::Symbol("(")) => {
                let inner = self.parse_or()?;
                self.expect_symbol(")")?;
                Ok(inner)
            }
            _ => Err(EvalError::Parse(SmolStr::new("expected expression"))),
        }
    }
}

/// Parse an expression string.
pub fn parse(text: &str) -> Result<Expr, EvalError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EvalError::Parse(SmolStr::new("empty expression")));
    }
    let mut parser = Parser {
        tokens: tokenize(text)?,
        position: 0,
    };
    let expr = parser.parse_or()?;
    if parser.position != parser.tokens.len() {
        return Err(EvalError::Parse(SmolStr::new("trailing input")));
    }
    Ok(expr)
}

/// Evaluate a parsed expression against captured bindings.
pub fn eval(expr: &Expr, bindings: &IndexMap<SmolStr, Value>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => bindings
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
        Expr::Field(base, name) => match eval(base, bindings)? {
            Value::Map(fields) => fields
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedField(name.clone())),
            other => Err(EvalError::TypeMismatch {
                expected: "map",
                got: other.type_name(),
            }),
        },
        Expr::Index(base, index) => {
            let base = eval(base, bindings)?;
            let index = eval(index, bindings)?;
            match (base, index) {
                (Value::Seq(items), Value::Int(i)) => {
                    let len = items.len();
                    usize::try_from(i)
                        .ok()
                        .and_then(|i| items.into_iter().nth(i))
                        .ok_or(EvalError::IndexOutOfBounds { index: i, len })
                }
                (Value::Map(fields), Value::Str(key)) => fields
                    .get(key.as_str())
                    .cloned()
                    .ok_or_else(|| EvalError::UndefinedField(SmolStr::new(key))),
                (base, _) => Err(EvalError::TypeMismatch {
                    expected: "sequence or map",
                    got: base.type_name(),
                }),
            }
        }
        Expr::Unary(op, operand) => {
            let operand = eval(operand, bindings)?;
            match (op, operand) {
                (UnaryOp::Not, Value::Bool(value)) => Ok(Value::Bool(!value)),
                (UnaryOp::Neg, Value::Int(value)) => Ok(Value::Int(value.wrapping_neg())),
                (UnaryOp::Neg, Value::Float(value)) => Ok(Value::Float(-value)),
                (UnaryOp::Not, other) => Err(EvalError::TypeMismatch {
                    expected: "bool",
                    got: other.type_name(),
                }),
                (UnaryOp::Neg, other) => Err(EvalError::TypeMismatch {
                    expected: "number",
                    got: other.type_name(),
                }),
            }
        }
        Expr::Binary(op, lhs, rhs) => match op {
            BinaryOp::And | BinaryOp::Or => {
                let lhs = expect_bool(eval(lhs, bindings)?)?;
                // Short-circuit: the right side may name bindings that
                // only exist when the left side holds.
                if *op == BinaryOp::And && !lhs {
                    return Ok(Value::Bool(false));
                }
                if *op == BinaryOp::Or && lhs {
                    return Ok(Value::Bool(true));
                }
                let rhs = expect_bool(eval(rhs, bindings)?)?;
                Ok(Value::Bool(rhs))
            }
            BinaryOp::Eq => Ok(Value::Bool(values_equal(
                &eval(lhs, bindings)?,
                &eval(rhs, bindings)?,
            ))),
            BinaryOp::Ne => Ok(Value::Bool(!values_equal(
                &eval(lhs, bindings)?,
                &eval(rhs, bindings)?,
            ))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = compare(&eval(lhs, bindings)?, &eval(rhs, bindings)?)?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }))
            }
        },
    }
}

fn expect_bool(value: Value) -> Result<bool, EvalError> {
    match value {
        Value::Bool(value) => Ok(value),
        other => Err(EvalError::TypeMismatch {
            expected: "bool",
            got: other.type_name(),
        }),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
            (*a as f64) == *b
        }
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Result<Ordering, EvalError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a
            .partial_cmp(b)
            .ok_or(EvalError::TypeMismatch {
                expected: "comparable number",
                got: "nan",
            }),
        (Value::Int(a), Value::Float(b)) => (*a as f64)
            .partial_cmp(b)
            .ok_or(EvalError::TypeMismatch {
                expected: "comparable number",
                got: "nan",
            }),
        (Value::Float(a), Value::Int(b)) => a
            .partial_cmp(&(*b as f64))
            .ok_or(EvalError::TypeMismatch {
                expected: "comparable number",
                got: "nan",
            }),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (lhs, _) => Err(EvalError::TypeMismatch {
            expected: "number or string",
            got: lhs.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> IndexMap<SmolStr, Value> {
        let mut locals = IndexMap::new();
        locals.insert(SmolStr::new("x"), Value::Int(5));
        locals.insert(SmolStr::new("name"), Value::Str("order".into()));
        locals.insert(
            SmolStr::new("items"),
            Value::Seq(vec![Value::Int(10), Value::Int(20)]),
        );
        let mut user = IndexMap::new();
        user.insert(SmolStr::new("id"), Value::Int(7));
        locals.insert(SmolStr::new("user"), Value::Map(user));
        locals
    }

    fn eval_str(text: &str) -> Result<Value, EvalError> {
        eval(&parse(text)?, &bindings())
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval_str("x == 5").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("x > 5").unwrap(), Value::Bool(false));
        assert_eq!(eval_str("x >= 5 && name == 'order'").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("x < 0 || x != 4").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("!(x == 5)").unwrap(), Value::Bool(false));
    }

    #[test]
    fn paths_and_indexing() {
        assert_eq!(eval_str("user.id").unwrap(), Value::Int(7));
        assert_eq!(eval_str("items[1]").unwrap(), Value::Int(20));
        assert_eq!(eval_str("items[1] > items[0]").unwrap(), Value::Bool(true));
        assert!(matches!(
            eval_str("items[9]"),
            Err(EvalError::IndexOutOfBounds { index: 9, len: 2 })
        ));
    }

    #[test]
    fn numeric_coercion_in_equality() {
        assert_eq!(eval_str("x == 5.0").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("-x == -5").unwrap(), Value::Bool(true));
    }

    #[test]
    fn python_style_keywords_accepted() {
        assert_eq!(eval_str("True").unwrap(), Value::Bool(true));
        assert_eq!(eval_str("None == null").unwrap(), Value::Bool(true));
    }

    #[test]
    fn undefined_names_error() {
        assert!(matches!(
            eval_str("missing == 1"),
            Err(EvalError::UndefinedVariable(_))
        ));
        assert!(matches!(
            eval_str("user.missing"),
            Err(EvalError::UndefinedField(_))
        ));
    }

    #[test]
    fn parse_errors_are_reported() {
        assert!(parse("").is_err());
        assert!(parse("x ==").is_err());
        assert!(parse("'unterminated").is_err());
        assert!(parse("x # y").is_err());
    }
}
