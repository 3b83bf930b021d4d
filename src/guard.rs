//! The guard mini-language: `#( … )` bodies and `filter_guard` strings.
//!
//! Guards are Pratt-parsed into a small expression tree and evaluated
//! against the current bindings. Every failure mode here is branch-local:
//! a type error or `%` by zero makes the guard fail, never the query.
//! Division is intentionally absent (a `/` would collide with regex
//! literals at the lexer level).

use crate::value::{num_eq, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum GuardExpr {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    /// `$name`
    Var(String),
    /// `_`: the current match root
    Root,
    Unary {
        op: UnaryOp,
        sub: Box<GuardExpr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<GuardExpr>,
        rhs: Box<GuardExpr>,
    },
    Call {
        func: GuardFunc,
        arg: Box<GuardExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardFunc {
    Number,
    String,
    Boolean,
    Size,
}

/// Why a guard did not pass. All variants are treated as a mismatch of
/// the current branch by the matcher.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardFailure {
    TypeError,
    DivByZero,
    Unbound(String),
}

impl GuardExpr {
    /// Collects every `$name` the expression reads.
    pub fn free_vars(&self, out: &mut Vec<String>) {
        match self {
            GuardExpr::Var(name) => {
                if !out.iter().any(|n| n == name) {
                    out.push(name.clone());
                }
            }
            GuardExpr::Unary { sub, .. } => sub.free_vars(out),
            GuardExpr::Binary { lhs, rhs, .. } => {
                lhs.free_vars(out);
                rhs.free_vars(out);
            }
            GuardExpr::Call { arg, .. } => arg.free_vars(out),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

pub type Resolver<'a> = dyn Fn(&str) -> Option<Value> + 'a;

pub fn eval(
    expr: &GuardExpr,
    resolve: &Resolver<'_>,
    root: &Value,
) -> Result<Value, GuardFailure> {
    match expr {
        GuardExpr::Num(n) => Ok(Value::Number(*n)),
        GuardExpr::Str(s) => Ok(Value::String(s.clone())),
        GuardExpr::Bool(b) => Ok(Value::Bool(*b)),
        GuardExpr::Null => Ok(Value::Null),
        GuardExpr::Root => Ok(root.clone()),
        GuardExpr::Var(name) => {
            resolve(name).ok_or_else(|| GuardFailure::Unbound(name.clone()))
        }
        GuardExpr::Unary { op, sub } => {
            let v = eval(sub, resolve, root)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.truthy())),
                UnaryOp::Neg => match v {
                    Value::Number(n) => Ok(Value::Number(-n)),
                    _ => Err(GuardFailure::TypeError),
                },
            }
        }
        GuardExpr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, resolve, root),
        GuardExpr::Call { func, arg } => {
            let v = eval(arg, resolve, root)?;
            eval_call(*func, v)
        }
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &GuardExpr,
    rhs: &GuardExpr,
    resolve: &Resolver<'_>,
    root: &Value,
) -> Result<Value, GuardFailure> {
    // Short-circuit forms first.
    match op {
        BinaryOp::Or => {
            let l = eval(lhs, resolve, root)?;
            return if l.truthy() { Ok(l) } else { eval(rhs, resolve, root) };
        }
        BinaryOp::And => {
            let l = eval(lhs, resolve, root)?;
            return if l.truthy() { eval(rhs, resolve, root) } else { Ok(l) };
        }
        _ => {}
    }

    let l = eval(lhs, resolve, root)?;
    let r = eval(rhs, resolve, root)?;
    match op {
        BinaryOp::Eq => Ok(Value::Bool(l == r)),
        BinaryOp::Ne => Ok(Value::Bool(l != r)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => {
                    if num_eq(*a, *b) {
                        std::cmp::Ordering::Equal
                    } else if a < b {
                        std::cmp::Ordering::Less
                    } else if a > b {
                        std::cmp::Ordering::Greater
                    } else {
                        // NaN against a non-NaN number: no ordering holds.
                        return Ok(Value::Bool(false));
                    }
                }
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => return Err(GuardFailure::TypeError),
            };
            let pass = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Le => ordering.is_le(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(pass))
        }
        BinaryOp::Add => match (&l, &r) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            _ => Err(GuardFailure::TypeError),
        },
        BinaryOp::Sub => numeric(l, r).map(|(a, b)| Value::Number(a - b)),
        BinaryOp::Mul => numeric(l, r).map(|(a, b)| Value::Number(a * b)),
        BinaryOp::Rem => {
            let (a, b) = numeric(l, r)?;
            if b == 0.0 {
                Err(GuardFailure::DivByZero)
            } else {
                Ok(Value::Number(a % b))
            }
        }
        BinaryOp::Or | BinaryOp::And => unreachable!("short-circuited above"),
    }
}

fn numeric(l: Value, r: Value) -> Result<(f64, f64), GuardFailure> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => Ok((a, b)),
        _ => Err(GuardFailure::TypeError),
    }
}

fn eval_call(func: GuardFunc, v: Value) -> Result<Value, GuardFailure> {
    match func {
        GuardFunc::Number => match v {
            Value::Number(n) => Ok(Value::Number(n)),
            Value::Bool(b) => Ok(Value::Number(if b { 1.0 } else { 0.0 })),
            Value::Null => Ok(Value::Number(0.0)),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Ok(Value::Number(0.0))
                } else {
                    Ok(Value::Number(trimmed.parse().unwrap_or(f64::NAN)))
                }
            }
            _ => Err(GuardFailure::TypeError),
        },
        GuardFunc::String => match v {
            Value::String(s) => Ok(Value::String(s)),
            Value::Number(n) => {
                let mut out = String::new();
                Value::Number(n).write_structural_key(&mut out);
                Ok(Value::String(out))
            }
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            Value::Null => Ok(Value::String("null".to_string())),
            _ => Err(GuardFailure::TypeError),
        },
        GuardFunc::Boolean => Ok(Value::Bool(v.truthy())),
        GuardFunc::Size => v.size().map(|n| Value::Number(n as f64)).ok_or(GuardFailure::TypeError),
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum GTok {
    Num(f64),
    Str(String),
    Ident(String),
    Var(String),
    Root,
    OrOr,
    AndAnd,
    EqEq,
    NotEq,
    Le,
    Ge,
    Lt,
    Gt,
    Plus,
    Minus,
    Star,
    Percent,
    Bang,
    LParen,
    RParen,
    End,
}

fn guard_lex(src: &str) -> Result<Vec<GTok>, String> {
    let bytes = src.as_bytes();
    let mut pos = 0;
    let mut out = Vec::new();
    while pos < bytes.len() {
        let b = bytes[pos];
        match b {
            b' ' | b'\t' | b'\n' | b'\r' => pos += 1,
            b'(' => {
                out.push(GTok::LParen);
                pos += 1;
            }
            b')' => {
                out.push(GTok::RParen);
                pos += 1;
            }
            b'+' => {
                out.push(GTok::Plus);
                pos += 1;
            }
            b'-' => {
                out.push(GTok::Minus);
                pos += 1;
            }
            b'*' => {
                out.push(GTok::Star);
                pos += 1;
            }
            b'%' => {
                out.push(GTok::Percent);
                pos += 1;
            }
            b'|' => {
                if bytes.get(pos + 1) == Some(&b'|') {
                    out.push(GTok::OrOr);
                    pos += 2;
                } else {
                    return Err("single '|' (use '||')".to_string());
                }
            }
            b'&' => {
                if bytes.get(pos + 1) == Some(&b'&') {
                    out.push(GTok::AndAnd);
                    pos += 2;
                } else {
                    return Err("single '&' (use '&&')".to_string());
                }
            }
            b'=' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    out.push(GTok::EqEq);
                    pos += 2;
                } else {
                    return Err("single '=' (use '==')".to_string());
                }
            }
            b'!' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    out.push(GTok::NotEq);
                    pos += 2;
                } else {
                    out.push(GTok::Bang);
                    pos += 1;
                }
            }
            b'<' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    out.push(GTok::Le);
                    pos += 2;
                } else {
                    out.push(GTok::Lt);
                    pos += 1;
                }
            }
            b'>' => {
                if bytes.get(pos + 1) == Some(&b'=') {
                    out.push(GTok::Ge);
                    pos += 2;
                } else {
                    out.push(GTok::Gt);
                    pos += 1;
                }
            }
            b'$' => {
                let start = pos + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                    end += 1;
                }
                if end == start {
                    return Err("'$' without a variable name".to_string());
                }
                out.push(GTok::Var(src[start..end].to_string()));
                pos = end;
            }
            b'"' => {
                let mut end = pos + 1;
                let mut text = String::new();
                loop {
                    if end >= bytes.len() {
                        return Err("unterminated string".to_string());
                    }
                    match bytes[end] {
                        b'"' => break,
                        b'\\' => {
                            if end + 1 >= bytes.len() {
                                return Err("unterminated string".to_string());
                            }
                            match bytes[end + 1] {
                                b'"' => text.push('"'),
                                b'\\' => text.push('\\'),
                                b'n' => text.push('\n'),
                                b't' => text.push('\t'),
                                b'r' => text.push('\r'),
                                other => return Err(format!("invalid escape '\\{}'", other as char)),
                            }
                            end += 2;
                        }
                        _ => {
                            let c = src[end..].chars().next().unwrap();
                            text.push(c);
                            end += c.len_utf8();
                        }
                    }
                }
                out.push(GTok::Str(text));
                pos = end + 1;
            }
            b'0'..=b'9' => {
                let start = pos;
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.' || bytes[pos] == b'e'
                        || bytes[pos] == b'E')
                {
                    pos += 1;
                }
                let n: f64 = src[start..pos]
                    .parse()
                    .map_err(|_| format!("malformed number '{}'", &src[start..pos]))?;
                out.push(GTok::Num(n));
            }
            b'_' if !bytes
                .get(pos + 1)
                .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_') =>
            {
                out.push(GTok::Root);
                pos += 1;
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let start = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                    pos += 1;
                }
                out.push(GTok::Ident(src[start..pos].to_string()));
            }
            other => return Err(format!("unexpected character '{}'", other as char)),
        }
    }
    out.push(GTok::End);
    Ok(out)
}

struct GuardParser {
    tokens: Vec<GTok>,
    pos: usize,
}

impl GuardParser {
    fn peek(&self) -> &GTok {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> GTok {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn binding_power(tok: &GTok) -> Option<(BinaryOp, u8)> {
        Some(match tok {
            GTok::OrOr => (BinaryOp::Or, 1),
            GTok::AndAnd => (BinaryOp::And, 2),
            GTok::EqEq => (BinaryOp::Eq, 3),
            GTok::NotEq => (BinaryOp::Ne, 3),
            GTok::Lt => (BinaryOp::Lt, 4),
            GTok::Gt => (BinaryOp::Gt, 4),
            GTok::Le => (BinaryOp::Le, 4),
            GTok::Ge => (BinaryOp::Ge, 4),
            GTok::Plus => (BinaryOp::Add, 5),
            GTok::Minus => (BinaryOp::Sub, 5),
            GTok::Star => (BinaryOp::Mul, 6),
            GTok::Percent => (BinaryOp::Rem, 6),
            _ => return None,
        })
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<GuardExpr, String> {
        let mut lhs = self.parse_prefix()?;
        while let Some((op, bp)) = Self::binding_power(self.peek()) {
            if bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(bp + 1)?;
            lhs = GuardExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<GuardExpr, String> {
        match self.advance() {
            GTok::Num(n) => Ok(GuardExpr::Num(n)),
            GTok::Str(s) => Ok(GuardExpr::Str(s)),
            GTok::Var(name) => Ok(GuardExpr::Var(name)),
            GTok::Root => Ok(GuardExpr::Root),
            GTok::Bang => Ok(GuardExpr::Unary {
                op: UnaryOp::Not,
                sub: Box::new(self.parse_prefix()?),
            }),
            GTok::Minus => Ok(GuardExpr::Unary {
                op: UnaryOp::Neg,
                sub: Box::new(self.parse_prefix()?),
            }),
            GTok::LParen => {
                let inner = self.parse_expr(0)?;
                match self.advance() {
                    GTok::RParen => Ok(inner),
                    other => Err(format!("expected ')', found {:?}", other)),
                }
            }
            GTok::Ident(word) => match word.as_str() {
                "true" => Ok(GuardExpr::Bool(true)),
                "false" => Ok(GuardExpr::Bool(false)),
                "null" => Ok(GuardExpr::Null),
                "number" | "string" | "boolean" | "size" => {
                    let func = match word.as_str() {
                        "number" => GuardFunc::Number,
                        "string" => GuardFunc::String,
                        "boolean" => GuardFunc::Boolean,
                        _ => GuardFunc::Size,
                    };
                    match self.advance() {
                        GTok::LParen => {}
                        other => return Err(format!("expected '(' after {}, found {:?}", word, other)),
                    }
                    let arg = self.parse_expr(0)?;
                    match self.advance() {
                        GTok::RParen => {}
                        other => return Err(format!("expected ')', found {:?}", other)),
                    }
                    Ok(GuardExpr::Call {
                        func,
                        arg: Box::new(arg),
                    })
                }
                other => Err(format!("unknown word '{}'", other)),
            },
            other => Err(format!("unexpected token {:?}", other)),
        }
    }
}

/// Parses a guard expression. Errors are plain strings; the caller wraps
/// them with a source span.
pub fn parse_guard(src: &str) -> Result<GuardExpr, String> {
    let tokens = guard_lex(src)?;
    let mut parser = GuardParser { tokens, pos: 0 };
    let expr = parser.parse_expr(0)?;
    match parser.peek() {
        GTok::End => Ok(expr),
        other => Err(format!("trailing input {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_closed(src: &str, vars: &[(&str, Value)]) -> Result<Value, GuardFailure> {
        let expr = parse_guard(src).unwrap();
        let resolve = |name: &str| {
            vars.iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.clone())
        };
        eval(&expr, &resolve, &Value::Null)
    }

    #[test]
    fn precedence_reads_naturally() {
        let v = eval_closed("1 + 2 * 3 == 7", &[]).unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn same_value_zero_equality() {
        let v = eval_closed("$a == $a", &[("a", Value::Number(f64::NAN))]).unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn rem_by_zero_fails_branch() {
        assert_eq!(eval_closed("5 % 0 == 0", &[]), Err(GuardFailure::DivByZero));
    }

    #[test]
    fn plus_concatenates_strings_only() {
        assert_eq!(
            eval_closed("\"a\" + \"b\" == \"ab\"", &[]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(eval_closed("\"a\" + 1", &[]), Err(GuardFailure::TypeError));
    }

    #[test]
    fn size_of_string_sequence_mapping() {
        assert_eq!(
            eval_closed("size($s) == 3", &[("s", Value::String("abc".into()))]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(eval_closed("size(1)", &[]), Err(GuardFailure::TypeError));
    }

    #[test]
    fn unbound_var_reports_name() {
        assert_eq!(
            eval_closed("$missing == 1", &[]),
            Err(GuardFailure::Unbound("missing".to_string()))
        );
    }

    #[test]
    fn short_circuit_skips_rhs_failure() {
        assert_eq!(eval_closed("true || 1 % 0", &[]).unwrap().truthy(), true);
        assert_eq!(eval_closed("false && 1 % 0", &[]).unwrap().truthy(), false);
    }
}
