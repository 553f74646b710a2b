//! Arithmetic without `eval`
//!
//! A small recursive-descent evaluator over integers and floats.
//! `**` is right-associative and binds tighter than a unary minus on its
//! left, `//` floors, `%` takes the sign of the divisor and `/` always
//! produces a float.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::agent::tool::{required_str, Tool, ToolParameter};
use crate::error::{AideError, Result};

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform mathematical calculations"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::new(
            "expression",
            "string",
            "Mathematical expression to evaluate",
        )]
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<Value> {
        let expression = required_str(params, "expression", self.name())?;
        let result = evaluate(expression)
            .and_then(Number::to_json)
            .map_err(|e| AideError::ToolExecutionFailed {
                tool_name: self.name().to_string(),
                error: format!("Calculation failed: {}", e),
            })?;

        Ok(json!({
            "expression": expression,
            "result": result,
            "type": "calculation"
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    fn to_json(self) -> std::result::Result<Value, String> {
        match self {
            Number::Int(i) => Ok(json!(i)),
            Number::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| "result is not a finite real number".to_string()),
        }
    }
}

/// Evaluate an arithmetic expression
pub fn evaluate(expression: &str) -> std::result::Result<Number, String> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err("invalid syntax".to_string());
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(Number),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Power,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let (token, width) = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' if next == Some('*') => (Token::Power, 2),
            '*' => (Token::Star, 1),
            '/' if next == Some('/') => (Token::DoubleSlash, 2),
            '/' => (Token::Slash, 1),
            '%' => (Token::Percent, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(parse_number(&literal)?));
                continue;
            }
            other => return Err(format!("unexpected character '{}'", other)),
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

fn parse_number(literal: &str) -> std::result::Result<Number, String> {
    let invalid = || format!("invalid number '{}'", literal);
    if literal.contains('.') {
        if literal == "." || literal.matches('.').count() > 1 {
            return Err(invalid());
        }
        return literal.parse::<f64>().map(Number::Float).map_err(|_| invalid());
    }
    match literal.parse::<i64>() {
        Ok(i) => Ok(Number::Int(i)),
        Err(_) => literal.parse::<f64>().map(Number::Float).map_err(|_| invalid()),
    }
}

/// Nesting allowed for parentheses, unary signs and exponent chains
const MAX_DEPTH: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Run `f` one level deeper, refusing input nested past `MAX_DEPTH`
    fn nested(
        &mut self,
        f: impl FnOnce(&mut Self) -> std::result::Result<Number, String>,
    ) -> std::result::Result<Number, String> {
        if self.depth >= MAX_DEPTH {
            return Err("expression too deeply nested".to_string());
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> std::result::Result<Number, String> {
        let mut value = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = apply(op, value, rhs)?;
        }
        Ok(value)
    }

    // term := factor (('*' | '/' | '//' | '%') factor)*
    fn term(&mut self) -> std::result::Result<Number, String> {
        let mut value = self.factor()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::DoubleSlash | Token::Percent)) =
            self.peek()
        {
            self.pos += 1;
            let rhs = self.factor()?;
            value = apply(op, value, rhs)?;
        }
        Ok(value)
    }

    // factor := ('+' | '-') factor | power
    fn factor(&mut self) -> std::result::Result<Number, String> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(Self::factor)
            }
            Some(Token::Minus) => {
                self.pos += 1;
                negate(self.nested(Self::factor)?)
            }
            _ => self.power(),
        }
    }

    // power := atom ['**' factor]
    fn power(&mut self) -> std::result::Result<Number, String> {
        let base = self.atom()?;
        if self.peek() == Some(Token::Power) {
            self.pos += 1;
            let exponent = self.nested(Self::factor)?;
            return apply(Token::Power, base, exponent);
        }
        Ok(base)
    }

    fn atom(&mut self) -> std::result::Result<Number, String> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.nested(Self::expr)?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            _ => Err("invalid syntax".to_string()),
        }
    }
}

fn negate(n: Number) -> std::result::Result<Number, String> {
    Ok(match n {
        Number::Int(i) => i.checked_neg().map(Number::Int).unwrap_or(Number::Float(-(i as f64))),
        Number::Float(f) => Number::Float(-f),
    })
}

fn apply(op: Token, lhs: Number, rhs: Number) -> std::result::Result<Number, String> {
    use Number::{Float, Int};

    match op {
        Token::Slash | Token::DoubleSlash if rhs.is_zero() => {
            return Err("Division by zero".to_string())
        }
        Token::Percent if rhs.is_zero() => return Err("Modulo by zero".to_string()),
        _ => {}
    }

    let result = match (op, lhs, rhs) {
        (Token::Plus, Int(a), Int(b)) => a.checked_add(b).map(Int),
        (Token::Minus, Int(a), Int(b)) => a.checked_sub(b).map(Int),
        (Token::Star, Int(a), Int(b)) => a.checked_mul(b).map(Int),
        (Token::DoubleSlash, Int(a), Int(b)) => floor_div(a, b).map(Int),
        (Token::Percent, Int(a), Int(b)) => a.checked_rem(b).map(|r| {
            if r != 0 && (r < 0) != (b < 0) {
                Int(r + b)
            } else {
                Int(r)
            }
        }),
        (Token::Power, Int(a), Int(b)) if b >= 0 => u32::try_from(b)
            .ok()
            .and_then(|exp| a.checked_pow(exp))
            .map(Int),
        _ => None,
    };
    if let Some(result) = result {
        return Ok(result);
    }

    let (a, b) = (lhs.as_f64(), rhs.as_f64());
    let value = match op {
        Token::Plus => a + b,
        Token::Minus => a - b,
        Token::Star => a * b,
        Token::Slash => a / b,
        Token::DoubleSlash => (a / b).floor(),
        Token::Percent => {
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }
        }
        Token::Power => {
            if a == 0.0 && b < 0.0 {
                return Err("Division by zero".to_string());
            }
            let value = a.powf(b);
            if value.is_nan() {
                return Err("result is not a real number".to_string());
            }
            value
        }
        _ => return Err("invalid syntax".to_string()),
    };
    Ok(Float(value))
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}
