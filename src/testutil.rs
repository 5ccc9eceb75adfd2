//! A reference `Backend` implementation used by this crate's own tests,
//! demos, and benchmarks (§4.2 names this exact role: "a CEL-like
//! language, or anything else").
//!
//! The expression language is intentionally small: boolean literals,
//! variable lookups against `Data`, the reserved `self` value, and `!`,
//! `&&`, `||` with parentheses. It exists to exercise the engine, not to
//! be a product in its own right.

use crate::backend::{Backend, Schema};
use crate::error::{IndigoError, Result as IndigoResult};
use crate::value::{Data, Diagnostics, ResultType, Value};

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Lit(bool),
    SelfRef,
    Var(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// The trivial boolean-expression backend.
#[derive(Debug, Default, Clone)]
pub struct ExprBackend;

impl Backend for ExprBackend {
    type Program = Expr;

    fn compile(
        &self,
        expr: &str,
        _schema: &dyn Schema,
        _result_type: ResultType,
        _collect_diagnostics: bool,
        _dry_run: bool,
    ) -> Result<Self::Program, IndigoError> {
        parse(expr)
    }

    fn evaluate(
        &self,
        program: Option<&Self::Program>,
        data: &Data,
        self_value: Option<&Value>,
        _result_type: ResultType,
        return_diagnostics: bool,
    ) -> Result<(Value, Option<Diagnostics>), IndigoError> {
        let Some(program) = program else {
            return Ok((Value::Bool(true), None));
        };
        let value = Value::Bool(eval(program, data, self_value)?);
        let diagnostics = return_diagnostics.then(|| Diagnostics {
            text: format!("{program:?} => {value:?}"),
        });
        Ok((value, diagnostics))
    }
}

fn eval(expr: &Expr, data: &Data, self_value: Option<&Value>) -> IndigoResult<bool> {
    match expr {
        Expr::Lit(b) => Ok(*b),
        Expr::SelfRef => Ok(self_value.and_then(Value::as_bool).unwrap_or(false)),
        Expr::Var(name) => data
            .get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| IndigoError::Evaluation {
                rule_id: String::new(),
                message: format!("variable '{name}' is not a bound boolean"),
            }),
        Expr::Not(inner) => Ok(!eval(inner, data, self_value)?),
        Expr::And(lhs, rhs) => Ok(eval(lhs, data, self_value)? && eval(rhs, data, self_value)?),
        Expr::Or(lhs, rhs) => Ok(eval(lhs, data, self_value)? || eval(rhs, data, self_value)?),
    }
}

/// A small recursive-descent parser: `expr := or`, `or := and ('||' and)*`,
/// `and := unary ('&&' unary)*`, `unary := '!'? atom`,
/// `atom := 'true' | 'false' | 'self' | ident | '(' expr ')'`.
fn parse(src: &str) -> Result<Expr, IndigoError> {
    parse_inner(src).map_err(|message| IndigoError::Compile {
        rule_id: String::new(),
        message,
        location: None,
        snippet: Some(src.to_string()),
    })
}

fn parse_inner(src: &str) -> Result<Expr, String> {
    let tokens = tokenize(src)?;
    let mut pos = 0usize;
    let expr = parse_or(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err("unexpected trailing input".to_string());
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    True,
    False,
    SelfKw,
    Ident(String),
    Not,
    And,
    Or,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "self" => Token::SelfKw,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

fn parse_or(tokens: &[Token], pos: &mut usize) -> Result<Expr, String> {
    let mut lhs = parse_and(tokens, pos)?;
    while tokens.get(*pos) == Some(&Token::Or) {
        *pos += 1;
        let rhs = parse_and(tokens, pos)?;
        lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_and(tokens: &[Token], pos: &mut usize) -> Result<Expr, String> {
    let mut lhs = parse_unary(tokens, pos)?;
    while tokens.get(*pos) == Some(&Token::And) {
        *pos += 1;
        let rhs = parse_unary(tokens, pos)?;
        lhs = Expr::And(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_unary(tokens: &[Token], pos: &mut usize) -> Result<Expr, String> {
    if tokens.get(*pos) == Some(&Token::Not) {
        *pos += 1;
        return Ok(Expr::Not(Box::new(parse_unary(tokens, pos)?)));
    }
    parse_atom(tokens, pos)
}

fn parse_atom(tokens: &[Token], pos: &mut usize) -> Result<Expr, String> {
    match tokens.get(*pos) {
        Some(Token::True) => {
            *pos += 1;
            Ok(Expr::Lit(true))
        }
        Some(Token::False) => {
            *pos += 1;
            Ok(Expr::Lit(false))
        }
        Some(Token::SelfKw) => {
            *pos += 1;
            Ok(Expr::SelfRef)
        }
        Some(Token::Ident(name)) => {
            let name = name.clone();
            *pos += 1;
            Ok(Expr::Var(name))
        }
        Some(Token::LParen) => {
            *pos += 1;
            let inner = parse_or(tokens, pos)?;
            if tokens.get(*pos) != Some(&Token::RParen) {
                return Err("expected closing ')'".to_string());
            }
            *pos += 1;
            Ok(inner)
        }
        other => Err(format!("unexpected token {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EmptySchema;

    fn eval_str(expr: &str, data: &Data) -> bool {
        let backend = ExprBackend;
        let program = backend
            .compile(expr, &EmptySchema, ResultType::Bool, false, false)
            .unwrap();
        let (value, _) = backend
            .evaluate(Some(&program), data, None, ResultType::Bool, false)
            .unwrap();
        value.as_bool().unwrap()
    }

    #[test]
    fn literals_and_boolean_operators() {
        let data = Data::new();
        assert!(eval_str("true", &data));
        assert!(!eval_str("false", &data));
        assert!(eval_str("!false", &data));
        assert!(eval_str("true && !false", &data));
        assert!(eval_str("false || true", &data));
        assert!(eval_str("(false || true) && true", &data));
    }

    #[test]
    fn variable_lookup() {
        let mut data = Data::new();
        data.insert("flag".to_string(), Value::Bool(true));
        assert!(eval_str("flag", &data));
        assert!(eval_str("flag && true", &data));

        let missing = ExprBackend
            .compile("missing", &EmptySchema, ResultType::Bool, false, false)
            .and_then(|p| ExprBackend.evaluate(Some(&p), &data, None, ResultType::Bool, false));
        assert!(missing.is_err());
    }

    #[test]
    fn rejects_malformed_expressions() {
        let backend = ExprBackend;
        assert!(backend
            .compile("true &&", &EmptySchema, ResultType::Bool, false, false)
            .is_err());
        assert!(backend
            .compile("(true", &EmptySchema, ResultType::Bool, false, false)
            .is_err());
    }
}
